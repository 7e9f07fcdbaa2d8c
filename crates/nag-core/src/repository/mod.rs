use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{Exception, OwnerItems, Task, TaskStatus, Template};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

pub mod exceptions;
pub mod materialization;
pub mod tasks;
pub mod templates;

/// Domain-specific trait for occurrence operations.
///
/// The conditional updates (`mark_done`, `reschedule_task`, `claim_*`) are
/// the serialization points for concurrent events on one occurrence: each
/// carries a `WHERE` guard and reports whether it won.
#[async_trait]
pub trait TaskRepository {
    async fn insert_task(&self, task: &Task) -> Result<(), CoreError>;
    async fn find_task(&self, owner_id: &str, id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn find_tasks(&self, owner_id: &str) -> Result<Vec<Task>, CoreError>;
    async fn find_tasks_by_short_id_prefix(&self, owner_id: &str, short_id: &str) -> Result<Vec<Task>, CoreError>;
    /// Overwrites title and/or due time. A new due time starts a fresh cycle.
    async fn update_task_fields(
        &self,
        owner_id: &str,
        id: Uuid,
        title: Option<&str>,
        remind_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, CoreError>;
    /// Puts a task back to `pending`, clearing its completion stamp.
    async fn reopen_task(&self, owner_id: &str, id: Uuid, now: DateTime<Utc>) -> Result<Option<Task>, CoreError>;
    async fn delete_task(&self, owner_id: &str, id: Uuid) -> Result<bool, CoreError>;
    /// `Some` only for the call that moved the task to `done`.
    async fn mark_done(&self, owner_id: &str, id: Uuid, at: DateTime<Utc>) -> Result<Option<Task>, CoreError>;
    /// Starts a new cycle at `due`, bumping the snooze counter. `None` if the task is done or gone.
    async fn reschedule_task(
        &self,
        owner_id: &str,
        id: Uuid,
        due: DateTime<Utc>,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, CoreError>;
    /// Records that the primary notification for the cycle due at `scheduled_for` is being sent.
    async fn claim_primary(&self, owner_id: &str, id: Uuid, scheduled_for: DateTime<Utc>) -> Result<bool, CoreError>;
    async fn release_primary(&self, owner_id: &str, id: Uuid, scheduled_for: DateTime<Utc>) -> Result<(), CoreError>;
    /// Records that the chase scheduled at `scheduled_for` is being handled.
    async fn claim_chase(&self, owner_id: &str, id: Uuid, scheduled_for: DateTime<Utc>) -> Result<bool, CoreError>;
    async fn release_chase(
        &self,
        owner_id: &str,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError>;
}

/// Domain-specific trait for template operations
#[async_trait]
pub trait TemplateRepository {
    async fn add_template(&self, template: &Template) -> Result<(), CoreError>;
    async fn find_template(&self, owner_id: &str, id: Uuid) -> Result<Option<Template>, CoreError>;
    async fn find_templates(&self, owner_id: &str) -> Result<Vec<Template>, CoreError>;
    async fn find_templates_by_short_id_prefix(&self, owner_id: &str, short_id: &str) -> Result<Vec<Template>, CoreError>;
    async fn update_template(&self, template: &Template) -> Result<(), CoreError>;
    async fn delete_template(&self, owner_id: &str, id: Uuid) -> Result<bool, CoreError>;
}

/// Domain-specific trait for materializing template slots
#[async_trait]
pub trait MaterializationRepository {
    /// Inserts `task` unless its (template, date) slot is taken. Returns the
    /// stored instance and whether this call created it.
    async fn materialize_instance(&self, task: &Task) -> Result<(Task, bool), CoreError>;
    async fn find_instance(&self, owner_id: &str, template_id: Uuid, date: NaiveDate) -> Result<Option<Task>, CoreError>;
}

/// Domain-specific trait for per-date template suppressions
#[async_trait]
pub trait ExceptionRepository {
    /// Idempotent upsert of the (template, date) suppression.
    async fn suppress(&self, owner_id: &str, template_id: Uuid, date: NaiveDate, now: DateTime<Utc>) -> Result<Exception, CoreError>;
    async fn find_exceptions(&self, owner_id: &str) -> Result<Vec<Exception>, CoreError>;
}

/// Main repository trait that composes all domain traits
#[async_trait]
pub trait Repository:
    TaskRepository + TemplateRepository + MaterializationRepository + ExceptionRepository + Send + Sync
{
    /// Everything stored for `owner_id`, read in one pass.
    async fn load_owner(&self, owner_id: &str) -> Result<OwnerItems, CoreError>;
}

/// SQLite implementation of the repository pattern
#[derive(Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn load_owner(&self, owner_id: &str) -> Result<OwnerItems, CoreError> {
        let rows = sqlx::query("SELECT * FROM items WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_all(self.pool())
            .await?;

        let mut items = OwnerItems::default();
        for row in &rows {
            let item_type: String = row.try_get("item_type")?;
            match item_type.as_str() {
                "task" => items.tasks.push(task_from_row(row)?),
                "template" => items.templates.push(template_from_row(row)?),
                "exception" => items.exceptions.push(exception_from_row(row)?),
                other => tracing::warn!(owner_id, item_type = other, "skipping unknown item type"),
            }
        }
        Ok(items)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

pub(crate) const TIME_OF_DAY_FORMAT: &str = "%H:%M";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn decode_err<E>(err: E) -> CoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CoreError::Database(sqlx::Error::Decode(Box::new(err)))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, CoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CoreError::Validation(format!("Timestamp out of range: {}", ms)))
}

fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, CoreError> {
    ms.map(from_millis).transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(raw).map_err(decode_err)
}

fn parse_date(raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(decode_err)
}

pub(crate) fn task_from_row(row: &SqliteRow) -> Result<Task, CoreError> {
    let id: String = row.try_get("item_id")?;
    let status: String = row.try_get("status")?;
    let from_template_id: Option<String> = row.try_get("from_template_id")?;
    let occurrence_date: Option<String> = row.try_get("occurrence_date")?;
    let snooze_count: i64 = row.try_get("snooze_count")?;

    Ok(Task {
        id: parse_uuid(&id)?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        remind_at: from_millis(row.try_get("remind_at")?)?,
        status: status.parse::<TaskStatus>().map_err(decode_err)?,
        snooze_count: u32::try_from(snooze_count).unwrap_or(u32::MAX),
        from_template_id: from_template_id.as_deref().map(parse_uuid).transpose()?,
        occurrence_date: occurrence_date.as_deref().map(parse_date).transpose()?,
        notified_for: opt_from_millis(row.try_get("notified_for")?)?,
        chased_until: opt_from_millis(row.try_get("chased_until")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        completed_at: opt_from_millis(row.try_get("completed_at")?)?,
    })
}

pub(crate) fn template_from_row(row: &SqliteRow) -> Result<Template, CoreError> {
    let id: String = row.try_get("item_id")?;
    let time_of_day: String = row.try_get("time_of_day")?;
    let recurrence: String = row.try_get("recurrence")?;

    Ok(Template {
        id: parse_uuid(&id)?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        time_of_day: NaiveTime::parse_from_str(&time_of_day, TIME_OF_DAY_FORMAT).map_err(decode_err)?,
        recurrence: recurrence.parse().map_err(decode_err)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

pub(crate) fn exception_from_row(row: &SqliteRow) -> Result<Exception, CoreError> {
    let template_id: String = row.try_get("from_template_id")?;
    let date: String = row.try_get("occurrence_date")?;

    Ok(Exception {
        owner_id: row.try_get("owner_id")?,
        template_id: parse_uuid(&template_id)?,
        date: parse_date(&date)?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}
