use crate::error::CoreError;
use crate::models::Template;
use crate::repository::{template_from_row, to_millis, SqliteRepository, TIME_OF_DAY_FORMAT};
use async_trait::async_trait;
use uuid::Uuid;

fn validate(template: &Template) -> Result<(), CoreError> {
    if template.title.trim().is_empty() {
        return Err(CoreError::Validation("Template title cannot be empty".to_string()));
    }
    if template.recurrence.is_empty() {
        return Err(CoreError::Validation(
            "Template recurrence needs at least one day code".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl super::TemplateRepository for SqliteRepository {
    async fn add_template(&self, template: &Template) -> Result<(), CoreError> {
        validate(template)?;
        sqlx::query(
            "INSERT INTO items (owner_id, item_id, item_type, title, time_of_day, recurrence, created_at, updated_at) \
             VALUES (?, ?, 'template', ?, ?, ?, ?, ?)",
        )
        .bind(&template.owner_id)
        .bind(template.id.to_string())
        .bind(&template.title)
        .bind(template.time_of_day.format(TIME_OF_DAY_FORMAT).to_string())
        .bind(template.recurrence.to_string())
        .bind(to_millis(template.created_at))
        .bind(to_millis(template.updated_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn find_template(&self, owner_id: &str, id: Uuid) -> Result<Option<Template>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_id = ? AND item_type = 'template'",
        )
        .bind(owner_id)
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(template_from_row).transpose()
    }

    async fn find_templates(&self, owner_id: &str) -> Result<Vec<Template>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_type = 'template' ORDER BY time_of_day",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(template_from_row).collect()
    }

    async fn find_templates_by_short_id_prefix(&self, owner_id: &str, short_id: &str) -> Result<Vec<Template>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE owner_id = ? AND item_type = 'template' AND item_id LIKE ?",
        )
        .bind(owner_id)
        .bind(format!("{}%", short_id))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(template_from_row).collect()
    }

    async fn update_template(&self, template: &Template) -> Result<(), CoreError> {
        validate(template)?;
        let result = sqlx::query(
            "UPDATE items SET title = ?, time_of_day = ?, recurrence = ?, updated_at = ? \
             WHERE owner_id = ? AND item_id = ? AND item_type = 'template'",
        )
        .bind(&template.title)
        .bind(template.time_of_day.format(TIME_OF_DAY_FORMAT).to_string())
        .bind(template.recurrence.to_string())
        .bind(to_millis(template.updated_at))
        .bind(&template.owner_id)
        .bind(template.id.to_string())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Template with id {} not found", template.id)));
        }
        Ok(())
    }

    async fn delete_template(&self, owner_id: &str, id: Uuid) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "DELETE FROM items WHERE owner_id = ? AND item_id = ? AND item_type = 'template'",
        )
        .bind(owner_id)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
