use crate::error::CoreError;
use crate::models::{Task, TaskStatus};
use crate::repository::{task_from_row, to_millis, SqliteRepository, DATE_FORMAT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const TASK_FILTER: &str = "owner_id = ? AND item_id = ? AND item_type = 'task'";

impl SqliteRepository {
    pub(crate) async fn insert_task_row(
        executor: impl sqlx::SqliteExecutor<'_>,
        task: &Task,
        on_conflict_ignore: bool,
    ) -> Result<u64, CoreError> {
        let verb = if on_conflict_ignore { "INSERT OR IGNORE" } else { "INSERT" };
        let sql = format!(
            "{} INTO items (owner_id, item_id, item_type, title, remind_at, status, snooze_count, \
             from_template_id, occurrence_date, notified_for, chased_until, created_at, updated_at, completed_at) \
             VALUES (?, ?, 'task', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            verb
        );
        let result = sqlx::query(&sql)
            .bind(&task.owner_id)
            .bind(task.id.to_string())
            .bind(&task.title)
            .bind(to_millis(task.remind_at))
            .bind(task.status.as_str())
            .bind(i64::from(task.snooze_count))
            .bind(task.from_template_id.map(|id| id.to_string()))
            .bind(task.occurrence_date.map(|d| d.format(DATE_FORMAT).to_string()))
            .bind(task.notified_for.map(to_millis))
            .bind(task.chased_until.map(to_millis))
            .bind(to_millis(task.created_at))
            .bind(to_millis(task.updated_at))
            .bind(task.completed_at.map(to_millis))
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Re-reads the task after a guarded update; `None` when the guard lost.
    async fn reread_if(&self, affected: u64, owner_id: &str, id: Uuid) -> Result<Option<Task>, CoreError> {
        if affected == 0 {
            return Ok(None);
        }
        super::TaskRepository::find_task(self, owner_id, id).await
    }
}

#[async_trait]
impl super::TaskRepository for SqliteRepository {
    async fn insert_task(&self, task: &Task) -> Result<(), CoreError> {
        if task.title.trim().is_empty() {
            return Err(CoreError::Validation("Task title cannot be empty".to_string()));
        }
        Self::insert_task_row(self.pool(), task, false).await?;
        Ok(())
    }

    async fn find_task(&self, owner_id: &str, id: Uuid) -> Result<Option<Task>, CoreError> {
        let sql = format!("SELECT * FROM items WHERE {}", TASK_FILTER);
        let row = sqlx::query(&sql)
            .bind(owner_id)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn find_tasks(&self, owner_id: &str) -> Result<Vec<Task>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_type = 'task' ORDER BY remind_at",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn find_tasks_by_short_id_prefix(&self, owner_id: &str, short_id: &str) -> Result<Vec<Task>, CoreError> {
        let mut pattern = String::with_capacity(short_id.len() + 1);
        pattern.push_str(short_id);
        pattern.push('%');

        let rows = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_type = 'task' AND item_id LIKE ?",
        )
        .bind(owner_id)
        .bind(pattern)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn update_task_fields(
        &self,
        owner_id: &str,
        id: Uuid,
        title: Option<&str>,
        remind_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, CoreError> {
        if let Some(title) = title {
            if title.trim().is_empty() {
                return Err(CoreError::Validation("Task title cannot be empty".to_string()));
            }
        }

        // A moved due time invalidates the escalation bookkeeping of the old cycle.
        let sql = format!(
            "UPDATE items SET \
                title = COALESCE(?, title), \
                notified_for = CASE WHEN ? IS NULL THEN notified_for ELSE NULL END, \
                chased_until = CASE WHEN ? IS NULL THEN chased_until ELSE NULL END, \
                remind_at = COALESCE(?, remind_at), \
                updated_at = ? \
             WHERE {}",
            TASK_FILTER
        );
        let remind_ms = remind_at.map(to_millis);
        let result = sqlx::query(&sql)
            .bind(title)
            .bind(remind_ms)
            .bind(remind_ms)
            .bind(remind_ms)
            .bind(to_millis(now))
            .bind(owner_id)
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        self.reread_if(result.rows_affected(), owner_id, id).await
    }

    async fn reopen_task(&self, owner_id: &str, id: Uuid, now: DateTime<Utc>) -> Result<Option<Task>, CoreError> {
        let sql = format!(
            "UPDATE items SET status = 'pending', completed_at = NULL, notified_for = NULL, \
             chased_until = NULL, updated_at = ? WHERE {}",
            TASK_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(to_millis(now))
            .bind(owner_id)
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        self.reread_if(result.rows_affected(), owner_id, id).await
    }

    async fn delete_task(&self, owner_id: &str, id: Uuid) -> Result<bool, CoreError> {
        let sql = format!("DELETE FROM items WHERE {}", TASK_FILTER);
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_done(&self, owner_id: &str, id: Uuid, at: DateTime<Utc>) -> Result<Option<Task>, CoreError> {
        let sql = format!(
            "UPDATE items SET status = 'done', completed_at = ?, updated_at = ? \
             WHERE {} AND status != 'done'",
            TASK_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(to_millis(at))
            .bind(to_millis(at))
            .bind(owner_id)
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        self.reread_if(result.rows_affected(), owner_id, id).await
    }

    async fn reschedule_task(
        &self,
        owner_id: &str,
        id: Uuid,
        due: DateTime<Utc>,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, CoreError> {
        let sql = format!(
            "UPDATE items SET remind_at = ?, status = ?, snooze_count = snooze_count + 1, \
             notified_for = NULL, chased_until = NULL, updated_at = ? \
             WHERE {} AND status != 'done'",
            TASK_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(to_millis(due))
            .bind(status.as_str())
            .bind(to_millis(now))
            .bind(owner_id)
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        self.reread_if(result.rows_affected(), owner_id, id).await
    }

    async fn claim_primary(&self, owner_id: &str, id: Uuid, scheduled_for: DateTime<Utc>) -> Result<bool, CoreError> {
        let sql = format!(
            "UPDATE items SET notified_for = remind_at \
             WHERE {} AND status != 'done' AND remind_at = ? \
               AND (notified_for IS NULL OR notified_for != remind_at)",
            TASK_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .bind(id.to_string())
            .bind(to_millis(scheduled_for))
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_primary(&self, owner_id: &str, id: Uuid, scheduled_for: DateTime<Utc>) -> Result<(), CoreError> {
        let sql = format!("UPDATE items SET notified_for = NULL WHERE {} AND notified_for = ?", TASK_FILTER);
        sqlx::query(&sql)
            .bind(owner_id)
            .bind(id.to_string())
            .bind(to_millis(scheduled_for))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn claim_chase(&self, owner_id: &str, id: Uuid, scheduled_for: DateTime<Utc>) -> Result<bool, CoreError> {
        let scheduled_ms = to_millis(scheduled_for);
        let sql = format!(
            "UPDATE items SET chased_until = ?, notified_for = remind_at \
             WHERE {} AND status != 'done' AND remind_at <= ? \
               AND (chased_until IS NULL OR chased_until < ?)",
            TASK_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(scheduled_ms)
            .bind(owner_id)
            .bind(id.to_string())
            .bind(scheduled_ms)
            .bind(scheduled_ms)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_chase(
        &self,
        owner_id: &str,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        let sql = format!("UPDATE items SET chased_until = ? WHERE {} AND chased_until = ?", TASK_FILTER);
        sqlx::query(&sql)
            .bind(previous.map(to_millis))
            .bind(owner_id)
            .bind(id.to_string())
            .bind(to_millis(scheduled_for))
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
