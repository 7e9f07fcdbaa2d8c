//! Named one-shot timers.
//!
//! Every trigger is identified by a [`TriggerKey`], rendered as
//! `"{owner}:{occurrence}:{kind}"`. Registering a key that is already armed
//! overwrites it, so an occurrence can never hold two primaries or two chases.

use crate::db::DbPool;
use crate::error::CoreError;
use crate::repository::to_millis;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Primary,
    Chase,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Primary => "primary",
            TriggerKind::Chase => "chase",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(TriggerKind::Primary),
            "chase" => Ok(TriggerKind::Chase),
            other => Err(CoreError::Validation(format!("Unknown trigger kind: {}", other))),
        }
    }
}

/// Stable identity of a trigger. The only way triggers are named.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    pub owner_id: String,
    pub occurrence_id: Uuid,
    pub kind: TriggerKind,
}

impl TriggerKey {
    pub fn new(owner_id: impl Into<String>, occurrence_id: Uuid, kind: TriggerKind) -> Self {
        Self {
            owner_id: owner_id.into(),
            occurrence_id,
            kind,
        }
    }

    pub fn primary(owner_id: impl Into<String>, occurrence_id: Uuid) -> Self {
        Self::new(owner_id, occurrence_id, TriggerKind::Primary)
    }

    pub fn chase(owner_id: impl Into<String>, occurrence_id: Uuid) -> Self {
        Self::new(owner_id, occurrence_id, TriggerKind::Chase)
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.owner_id, self.occurrence_id, self.kind)
    }
}

/// What a trigger delivers when it fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    pub owner_id: String,
    pub occurrence_id: Uuid,
    pub title: String,
    pub kind: TriggerKind,
    /// The fire time this payload was armed for; lets handlers spot superseded cycles
    pub scheduled_for: DateTime<Utc>,
}

impl TriggerPayload {
    pub fn key(&self) -> TriggerKey {
        TriggerKey::new(self.owner_id.clone(), self.occurrence_id, self.kind)
    }
}

/// A registered trigger as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmedTrigger {
    pub name: String,
    pub fire_at: DateTime<Utc>,
    pub payload: TriggerPayload,
}

/// The named-timer collaborator.
#[async_trait]
pub trait TriggerService: Send + Sync {
    /// Creates or overwrites the timer named by `key`.
    async fn register(&self, key: &TriggerKey, fire_at: DateTime<Utc>, payload: &TriggerPayload) -> Result<(), CoreError>;
    /// Removes the timer named by `key`. Removing an absent timer succeeds.
    async fn unregister(&self, key: &TriggerKey) -> Result<(), CoreError>;
}

/// Trigger table in the application database, polled by the dispatcher.
#[derive(Clone)]
pub struct SqliteTriggerStore {
    pool: DbPool,
}

fn scheduling_err(err: impl fmt::Display) -> CoreError {
    CoreError::Scheduling(err.to_string())
}

fn armed_from_row(row: &SqliteRow) -> Result<ArmedTrigger, CoreError> {
    let payload: String = row.try_get("payload")?;
    let fire_at: i64 = row.try_get("fire_at")?;
    Ok(ArmedTrigger {
        name: row.try_get("name")?,
        fire_at: DateTime::from_timestamp_millis(fire_at)
            .ok_or_else(|| CoreError::Validation(format!("Timestamp out of range: {}", fire_at)))?,
        payload: serde_json::from_str(&payload)?,
    })
}

impl SqliteTriggerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Triggers whose fire time has passed, oldest first.
    pub async fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ArmedTrigger>, CoreError> {
        let rows = sqlx::query("SELECT * FROM triggers WHERE fire_at <= ? ORDER BY fire_at, name LIMIT ?")
            .bind(to_millis(now))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(armed_from_row).collect()
    }

    /// Removes a delivered trigger unless it was re-armed meanwhile.
    /// Returns whether the row was removed.
    pub async fn acknowledge(&self, trigger: &ArmedTrigger) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM triggers WHERE name = ? AND fire_at = ?")
            .bind(&trigger.name)
            .bind(to_millis(trigger.fire_at))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find(&self, key: &TriggerKey) -> Result<Option<ArmedTrigger>, CoreError> {
        let row = sqlx::query("SELECT * FROM triggers WHERE name = ?")
            .bind(key.name())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(armed_from_row).transpose()
    }

    /// Every armed trigger of one occurrence.
    pub async fn list_for(&self, owner_id: &str, occurrence_id: Uuid) -> Result<Vec<ArmedTrigger>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM triggers WHERE owner_id = ? AND occurrence_id = ? ORDER BY fire_at",
        )
        .bind(owner_id)
        .bind(occurrence_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(armed_from_row).collect()
    }

    /// Every armed trigger of one owner.
    pub async fn list_owner(&self, owner_id: &str) -> Result<Vec<ArmedTrigger>, CoreError> {
        let rows = sqlx::query("SELECT * FROM triggers WHERE owner_id = ? ORDER BY fire_at")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(armed_from_row).collect()
    }
}

#[async_trait]
impl TriggerService for SqliteTriggerStore {
    async fn register(&self, key: &TriggerKey, fire_at: DateTime<Utc>, payload: &TriggerPayload) -> Result<(), CoreError> {
        let body = serde_json::to_string(payload)?;
        sqlx::query(
            "INSERT INTO triggers (name, owner_id, occurrence_id, kind, fire_at, payload, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (name) DO UPDATE SET \
                fire_at = excluded.fire_at, payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(key.name())
        .bind(&key.owner_id)
        .bind(key.occurrence_id.to_string())
        .bind(key.kind.as_str())
        .bind(to_millis(fire_at))
        .bind(body)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(scheduling_err)?;

        tracing::debug!(trigger = %key, %fire_at, "trigger armed");
        Ok(())
    }

    async fn unregister(&self, key: &TriggerKey) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM triggers WHERE name = ?")
            .bind(key.name())
            .execute(&self.pool)
            .await
            .map_err(scheduling_err)?;
        Ok(())
    }
}
