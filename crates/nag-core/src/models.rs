use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
    Snoozed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Snoozed => "snoozed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Snoozed and skipped occurrences behave like pending ones in a new cycle.
    pub fn is_open(&self) -> bool {
        !matches!(self, TaskStatus::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task status: {0}")]
pub struct ParseTaskStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "done" => Ok(TaskStatus::Done),
            "snoozed" => Ok(TaskStatus::Snoozed),
            "skipped" => Ok(TaskStatus::Skipped),
            _ => Err(ParseTaskStatusError(s.to_string())),
        }
    }
}

/// Discriminator of a persisted item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Task,
    Template,
    Exception,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Task => "task",
            ItemKind::Template => "template",
            ItemKind::Exception => "exception",
        }
    }
}

// ============================================================================
// Recurrence
// ============================================================================

/// A day code of a recurrence set. `Daily` is a sentinel matching every day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayCode {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
    Daily,
}

impl DayCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayCode::Mon => "MON",
            DayCode::Tue => "TUE",
            DayCode::Wed => "WED",
            DayCode::Thu => "THU",
            DayCode::Fri => "FRI",
            DayCode::Sat => "SAT",
            DayCode::Sun => "SUN",
            DayCode::Daily => "DAILY",
        }
    }

    pub fn for_date(date: NaiveDate) -> Self {
        Self::from(date.weekday())
    }
}

impl From<Weekday> for DayCode {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayCode::Mon,
            Weekday::Tue => DayCode::Tue,
            Weekday::Wed => DayCode::Wed,
            Weekday::Thu => DayCode::Thu,
            Weekday::Fri => DayCode::Fri,
            Weekday::Sat => DayCode::Sat,
            Weekday::Sun => DayCode::Sun,
        }
    }
}

impl fmt::Display for DayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid day code: {0}")]
pub struct ParseDayCodeError(String);

impl FromStr for DayCode {
    type Err = ParseDayCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MON" | "MONDAY" => Ok(DayCode::Mon),
            "TUE" | "TUESDAY" => Ok(DayCode::Tue),
            "WED" | "WEDNESDAY" => Ok(DayCode::Wed),
            "THU" | "THURSDAY" => Ok(DayCode::Thu),
            "FRI" | "FRIDAY" => Ok(DayCode::Fri),
            "SAT" | "SATURDAY" => Ok(DayCode::Sat),
            "SUN" | "SUNDAY" => Ok(DayCode::Sun),
            "DAILY" => Ok(DayCode::Daily),
            _ => Err(ParseDayCodeError(s.to_string())),
        }
    }
}

/// The recurrence set of a template, e.g. `["MON", "WED"]` or `["DAILY"]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Recurrence(Vec<DayCode>);

impl Recurrence {
    pub fn new(mut days: Vec<DayCode>) -> Self {
        days.sort();
        days.dedup();
        Self(days)
    }

    pub fn daily() -> Self {
        Self(vec![DayCode::Daily])
    }

    pub fn days(&self) -> &[DayCode] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether an occurrence of this recurrence falls on `date`.
    pub fn matches(&self, date: NaiveDate) -> bool {
        let code = DayCode::for_date(date);
        self.0.iter().any(|d| *d == DayCode::Daily || *d == code)
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.0.iter().map(DayCode::as_str).collect();
        f.write_str(&codes.join(","))
    }
}

impl FromStr for Recurrence {
    type Err = ParseDayCodeError;

    /// Parses the comma separated storage form, e.g. `MON,WED`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let days = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(DayCode::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(days))
    }
}

// ============================================================================
// Persisted items
// ============================================================================

/// One concrete reminder occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    /// Absolute due timestamp of the current cycle
    pub remind_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub snooze_count: u32,
    /// Back-reference to the template this occurrence was materialized from
    pub from_template_id: Option<Uuid>,
    /// Template slot date; stays fixed when the occurrence is snoozed or skipped
    pub occurrence_date: Option<NaiveDate>,
    /// `remind_at` of the cycle whose primary notification was delivered
    pub notified_for: Option<DateTime<Utc>>,
    /// Scheduled time of the latest chase that was handled
    pub chased_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id: String::new(),
            title: String::new(),
            remind_at: Utc::now(),
            status: TaskStatus::Pending,
            snooze_count: 0,
            from_template_id: None,
            occurrence_date: None,
            notified_for: None,
            chased_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A recurring occurrence definition. Never scheduled directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    /// Owner-local time of day of every occurrence
    pub time_of_day: NaiveTime,
    pub recurrence: Recurrence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Suppresses the virtual occurrence of a template on one calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exception {
    pub owner_id: String,
    pub template_id: Uuid,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Exception {
    /// Deterministic item id, so repeated suppression of the same slot is an upsert.
    pub fn item_id(template_id: Uuid, date: NaiveDate) -> String {
        format!("exception-{}-{}", template_id, date.format("%Y-%m-%d"))
    }
}

/// Everything stored for one owner, split by discriminator.
#[derive(Debug, Clone, Default)]
pub struct OwnerItems {
    pub tasks: Vec<Task>,
    pub templates: Vec<Template>,
    pub exceptions: Vec<Exception>,
}

// ============================================================================
// Data Transfer Objects (DTOs)
// ============================================================================

/// Body of a create request. A recurrence (or `type: template`) creates a template.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskData {
    /// Missing and blank titles are both rejected by validation
    #[serde(default)]
    pub title: String,
    pub remind_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: Option<ItemKind>,
    pub recurrence: Option<Recurrence>,
    /// Set when materializing a virtual occurrence of this template
    pub from_template_id: Option<Uuid>,
}

impl NewTaskData {
    pub fn is_template(&self) -> bool {
        self.recurrence.is_some() || self.kind == Some(ItemKind::Template)
    }
}

/// Body of a partial update. `task_id` may be a virtual occurrence id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskData {
    pub task_id: String,
    pub status: Option<TaskStatus>,
    pub title: Option<String>,
    pub remind_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    #[default]
    Single,
    Series,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub task_id: String,
    #[serde(default)]
    pub mode: DeleteMode,
    pub date: Option<NaiveDate>,
    pub template_id: Option<Uuid>,
}

// ============================================================================
// Reminder policy
// ============================================================================

pub const DEFAULT_CHASE_OFFSET_MINUTES: i64 = 10;
pub const DEFAULT_SNOOZE_MINUTES: i64 = 60;
pub const DEFAULT_SKIP_HOURS: i64 = 24;

/// Timing constants shared by the scheduler and the escalation state machine.
/// This is separate from the CLI config to allow for type differences
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Delay between the primary trigger and the first chase, and between chases
    pub chase_offset: Duration,
    /// Delay offered by the Snooze button
    pub snooze: Duration,
    /// Delay applied by Skip
    pub skip: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            chase_offset: Duration::minutes(DEFAULT_CHASE_OFFSET_MINUTES),
            snooze: Duration::minutes(DEFAULT_SNOOZE_MINUTES),
            skip: Duration::hours(DEFAULT_SKIP_HOURS),
        }
    }
}

/// A user response to a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderAction {
    Done,
    Snooze { minutes: i64 },
    Skip,
}

impl fmt::Display for ReminderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderAction::Done => f.write_str("done"),
            ReminderAction::Snooze { minutes } => write!(f, "snooze({}m)", minutes),
            ReminderAction::Skip => f.write_str("skip"),
        }
    }
}
