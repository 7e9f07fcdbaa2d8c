use crate::error::CoreError;
use crate::models::Exception;
use crate::repository::{exception_from_row, to_millis, SqliteRepository, DATE_FORMAT};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[async_trait]
impl super::ExceptionRepository for SqliteRepository {
    async fn suppress(
        &self,
        owner_id: &str,
        template_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Exception, CoreError> {
        // The deterministic item id turns a repeated suppression into a no-op.
        sqlx::query(
            "INSERT INTO items (owner_id, item_id, item_type, from_template_id, occurrence_date, created_at, updated_at) \
             VALUES (?, ?, 'exception', ?, ?, ?, ?) \
             ON CONFLICT (owner_id, item_id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(owner_id)
        .bind(Exception::item_id(template_id, date))
        .bind(template_id.to_string())
        .bind(date.format(DATE_FORMAT).to_string())
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(self.pool())
        .await?;

        let row = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_id = ? AND item_type = 'exception'",
        )
        .bind(owner_id)
        .bind(Exception::item_id(template_id, date))
        .fetch_one(self.pool())
        .await?;

        tracing::debug!(owner_id, %template_id, %date, "occurrence suppressed");
        exception_from_row(&row)
    }

    async fn find_exceptions(&self, owner_id: &str) -> Result<Vec<Exception>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_type = 'exception' ORDER BY occurrence_date",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(exception_from_row).collect()
    }
}
