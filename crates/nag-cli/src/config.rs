use chrono::{Duration, FixedOffset};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use nag_core::error::CoreError;
use nag_core::models::{
    ReminderConfig, DEFAULT_CHASE_OFFSET_MINUTES, DEFAULT_SKIP_HOURS, DEFAULT_SNOOZE_MINUTES,
};
use nag_core::stats::DEFAULT_HEATMAP_DAYS;
use nag_core::timezone::parse_utc_offset;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "nag.toml";

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    pub database_path: String,
    /// Chat id of the person being reminded; also the partition key
    pub owner_id: String,
    /// Fixed offset used for every calendar-date computation, e.g. `+05:30`
    pub utc_offset: String,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RemindersConfig {
    pub chase_offset_minutes: i64,
    pub snooze_minutes: i64,
    pub skip_hours: i64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            chase_offset_minutes: DEFAULT_CHASE_OFFSET_MINUTES,
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            skip_hours: DEFAULT_SKIP_HOURS,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    /// How often the dispatcher looks for due triggers
    pub poll_interval_secs: u64,
    pub heatmap_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
            poll_interval_secs: 15,
            heatmap_days: DEFAULT_HEATMAP_DAYS,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TelegramConfig {
    /// Without a token reminders are only logged
    pub bot_token: Option<String>,
    pub api_base: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "nag.db".to_string(),
            owner_id: "local".to_string(),
            utc_offset: "+00:00".to_string(),
            reminders: RemindersConfig::default(),
            server: ServerConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then `nag.toml`, then `NAG_*` variables (`NAG_SERVER__LISTEN`
    /// sets `server.listen`).
    pub fn new() -> Result<Self, figment::Error> {
        Self::figment(CONFIG_FILE).extract()
    }

    pub fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("NAG_").split("__"))
    }

    pub fn offset(&self) -> Result<FixedOffset, CoreError> {
        parse_utc_offset(&self.utc_offset)
    }

    pub fn reminder_config(&self) -> Result<ReminderConfig, CoreError> {
        let r = &self.reminders;
        if r.chase_offset_minutes <= 0 || r.snooze_minutes <= 0 || r.skip_hours <= 0 {
            return Err(CoreError::Validation(
                "reminder durations must be positive".to_string(),
            ));
        }
        let out_of_range = || CoreError::Validation("reminder durations are out of range".to_string());
        Ok(ReminderConfig {
            chase_offset: Duration::try_minutes(r.chase_offset_minutes).ok_or_else(out_of_range)?,
            snooze: Duration::try_minutes(r.snooze_minutes).ok_or_else(out_of_range)?,
            skip: Duration::try_hours(r.skip_hours).ok_or_else(out_of_range)?,
        })
    }
}
