use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::Task;
use crate::triggers::{TriggerKey, TriggerKind, TriggerPayload, TriggerService};

/// Fire times registered for one cycle of an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimes {
    pub primary_at: DateTime<Utc>,
    pub chase_at: DateTime<Utc>,
}

/// ReminderScheduler: registers, replaces and cancels the two timers of an
/// occurrence.
///
/// Both timers are always addressed through [`TriggerKey`], so a reschedule
/// overwrites the previous registration instead of leaving it behind.
#[derive(Clone)]
pub struct ReminderScheduler {
    triggers: Arc<dyn TriggerService>,
    chase_offset: Duration,
}

impl ReminderScheduler {
    pub fn new(triggers: Arc<dyn TriggerService>, chase_offset: Duration) -> Self {
        Self { triggers, chase_offset }
    }

    pub fn chase_offset(&self) -> Duration {
        self.chase_offset
    }

    fn payload(task: &Task, kind: TriggerKind, scheduled_for: DateTime<Utc>) -> TriggerPayload {
        TriggerPayload {
            owner_id: task.owner_id.clone(),
            occurrence_id: task.id,
            title: task.title.clone(),
            kind,
            scheduled_for,
        }
    }

    /// Arms the primary at the due time and the first chase one offset later.
    pub async fn schedule(&self, task: &Task) -> Result<ScheduledTimes, CoreError> {
        self.schedule_at(task, task.remind_at).await
    }

    /// Re-arms both timers of `task` for a new due time, under the same names.
    pub async fn reschedule(&self, task: &Task, new_due: DateTime<Utc>) -> Result<ScheduledTimes, CoreError> {
        self.schedule_at(task, new_due).await
    }

    async fn schedule_at(&self, task: &Task, due: DateTime<Utc>) -> Result<ScheduledTimes, CoreError> {
        let times = ScheduledTimes {
            primary_at: due,
            chase_at: due + self.chase_offset,
        };

        let primary = TriggerKey::primary(task.owner_id.clone(), task.id);
        self.triggers
            .register(&primary, times.primary_at, &Self::payload(task, TriggerKind::Primary, times.primary_at))
            .await?;
        self.arm_chase(task, times.chase_at).await?;

        tracing::info!(
            owner_id = %task.owner_id,
            task_id = %task.id,
            primary_at = %times.primary_at,
            chase_at = %times.chase_at,
            "reminder scheduled"
        );
        Ok(times)
    }

    /// Registers (or moves) the chase of `task` to fire at `at`.
    pub async fn arm_chase(&self, task: &Task, at: DateTime<Utc>) -> Result<(), CoreError> {
        let chase = TriggerKey::chase(task.owner_id.clone(), task.id);
        self.triggers
            .register(&chase, at, &Self::payload(task, TriggerKind::Chase, at))
            .await
    }

    /// Removes the chase. Never fails: an absent chase is the goal either way.
    pub async fn cancel_chase(&self, owner_id: &str, occurrence_id: Uuid) {
        self.cancel(TriggerKey::chase(owner_id, occurrence_id)).await;
    }

    /// Removes both timers of an occurrence. Never fails.
    pub async fn cancel_all(&self, owner_id: &str, occurrence_id: Uuid) {
        self.cancel(TriggerKey::primary(owner_id, occurrence_id)).await;
        self.cancel(TriggerKey::chase(owner_id, occurrence_id)).await;
    }

    async fn cancel(&self, key: TriggerKey) {
        if let Err(e) = self.triggers.unregister(&key).await {
            tracing::warn!(trigger = %key, error = %e, "trigger cancellation failed; ignoring");
        }
    }
}
