use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use nag_core::calendar::CalendarService;
use nag_core::db;
use nag_core::dispatch::TriggerDispatcher;
use nag_core::escalation::EscalationStateMachine;
use nag_core::notify::{LogNotifier, Notifier, TelegramNotifier};
use nag_core::recurrence::RecurrenceExpander;
use nag_core::repository::SqliteRepository;
use nag_core::scheduler::ReminderScheduler;
use nag_core::stats::StreakAndHeatmapCalculator;
use nag_core::triggers::SqliteTriggerStore;

use crate::config::Config;

/// Everything a command needs, wired once from the config.
pub struct App {
    pub config: Config,
    pub owner_id: String,
    pub offset: FixedOffset,
    pub repo: Arc<SqliteRepository>,
    pub triggers: Arc<SqliteTriggerStore>,
    pub notifier: Arc<dyn Notifier>,
    pub machine: Arc<EscalationStateMachine>,
    pub calendar: Arc<CalendarService>,
    pub dispatcher: Arc<TriggerDispatcher>,
}

impl App {
    pub async fn build(config: Config) -> Result<Self> {
        let offset = config.offset()?;
        let reminders = config.reminder_config()?;
        let pool = db::establish_connection(&config.database_path)
            .await
            .with_context(|| format!("failed to open database '{}'", config.database_path))?;

        let notifier: Arc<dyn Notifier> = match &config.telegram.bot_token {
            Some(token) if !token.trim().is_empty() => Arc::new(TelegramNotifier::new(
                token.trim(),
                config.telegram.api_base.clone(),
            )),
            _ => {
                tracing::debug!("no telegram bot token configured; reminders are only logged");
                Arc::new(LogNotifier)
            }
        };

        let repo = Arc::new(SqliteRepository::new(pool.clone()));
        let triggers = Arc::new(SqliteTriggerStore::new(pool));
        let scheduler = ReminderScheduler::new(triggers.clone(), reminders.chase_offset);
        let machine = Arc::new(EscalationStateMachine::new(
            repo.clone(),
            scheduler,
            notifier.clone(),
            reminders,
        ));
        let calendar = Arc::new(CalendarService::new(
            repo.clone(),
            machine.clone(),
            RecurrenceExpander::new(offset),
            StreakAndHeatmapCalculator::new(offset, config.server.heatmap_days),
        ));
        let dispatcher = Arc::new(TriggerDispatcher::new(triggers.clone(), machine.clone()));

        Ok(Self {
            owner_id: config.owner_id.clone(),
            config,
            offset,
            repo,
            triggers,
            notifier,
            machine,
            calendar,
            dispatcher,
        })
    }
}
