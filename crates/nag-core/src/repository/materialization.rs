use crate::error::CoreError;
use crate::models::Task;
use crate::repository::{task_from_row, SqliteRepository, DATE_FORMAT};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

#[async_trait]
impl super::MaterializationRepository for SqliteRepository {
    async fn materialize_instance(&self, task: &Task) -> Result<(Task, bool), CoreError> {
        let (template_id, date) = match (task.from_template_id, task.occurrence_date) {
            (Some(template_id), Some(date)) => (template_id, date),
            _ => {
                return Err(CoreError::Validation(
                    "Only template instances with a slot date can be materialized".to_string(),
                ))
            }
        };

        // The unique slot index makes a concurrent second insert a no-op.
        let inserted = Self::insert_task_row(self.pool(), task, true).await? > 0;

        let stored = super::MaterializationRepository::find_instance(self, &task.owner_id, template_id, date)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!("Instance of template {} on {} not found", template_id, date))
            })?;

        if inserted {
            tracing::debug!(owner_id = %task.owner_id, %template_id, %date, task_id = %stored.id, "materialized occurrence");
        }
        Ok((stored, inserted))
    }

    async fn find_instance(&self, owner_id: &str, template_id: Uuid, date: NaiveDate) -> Result<Option<Task>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_type = 'task' \
             AND from_template_id = ? AND occurrence_date = ?",
        )
        .bind(owner_id)
        .bind(template_id.to_string())
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(task_from_row).transpose()
    }
}
