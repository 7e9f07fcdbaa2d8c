//! The per-occurrence escalation state machine.
//!
//! State is never held in memory: it is derived from the persisted task on
//! every event, and every transition is guarded by a conditional update so
//! duplicate or racing events resolve to a single winner.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{ReminderAction, ReminderConfig, Task, TaskStatus};
use crate::notify::{reminder_buttons, CallbackEvent, Notifier};
use crate::repository::{Repository, TaskRepository};
use crate::scheduler::{ReminderScheduler, ScheduledTimes};
use crate::triggers::{TriggerKind, TriggerPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// No notification sent for the current cycle yet
    Pending,
    /// Primary notification delivered; the chase is armed
    AwaitingAck,
    /// Done
    Resolved,
}

impl EscalationState {
    pub fn of(task: &Task) -> Self {
        if task.status == TaskStatus::Done {
            EscalationState::Resolved
        } else if task.notified_for == Some(task.remind_at) {
            EscalationState::AwaitingAck
        } else {
            EscalationState::Pending
        }
    }
}

/// How the chase repeats once the primary has fired.
///
/// `Unbounded` re-arms the chase at a fixed interval after every firing, with
/// no backoff and no retry limit. The loop ends only from outside: Done,
/// Snooze, Skip or deletion of the occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChasePolicy {
    Unbounded { interval: Duration },
}

impl ChasePolicy {
    pub fn next_chase(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ChasePolicy::Unbounded { interval } => now + *interval,
        }
    }
}

/// Why an event was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The occurrence was deleted
    Missing,
    /// The occurrence is already done
    Resolved,
    /// The firing belongs to a cycle that was rescheduled since
    Superseded,
    /// A concurrent or earlier delivery of the same event won
    AlreadyHandled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Pending → AwaitingAck
    Notified { task_id: Uuid, chase_at: DateTime<Utc> },
    /// AwaitingAck → AwaitingAck, chase re-armed
    Escalated { task_id: Uuid, next_chase_at: DateTime<Utc> },
    /// → Resolved
    Completed { task: Task },
    /// → Pending in a new cycle
    Rescheduled { task: Task, action: ReminderAction, times: ScheduledTimes },
    /// Nothing to do
    Stale(StaleReason),
}

pub struct EscalationStateMachine {
    repo: Arc<dyn Repository>,
    scheduler: ReminderScheduler,
    notifier: Arc<dyn Notifier>,
    config: ReminderConfig,
    policy: ChasePolicy,
}

impl EscalationStateMachine {
    pub fn new(
        repo: Arc<dyn Repository>,
        scheduler: ReminderScheduler,
        notifier: Arc<dyn Notifier>,
        config: ReminderConfig,
    ) -> Self {
        let policy = ChasePolicy::Unbounded {
            interval: scheduler.chase_offset(),
        };
        Self {
            repo,
            scheduler,
            notifier,
            config,
            policy,
        }
    }

    pub fn policy(&self) -> ChasePolicy {
        self.policy
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    /// Handles one delivery of a trigger firing.
    pub async fn on_trigger(&self, payload: &TriggerPayload, now: DateTime<Utc>) -> Result<Transition, CoreError> {
        let transition = match payload.kind {
            TriggerKind::Primary => self.fire_primary(payload).await?,
            TriggerKind::Chase => self.fire_chase(payload, now).await?,
        };
        if let Transition::Stale(reason) = transition {
            tracing::debug!(trigger = %payload.key(), ?reason, "ignoring stale firing");
        }
        Ok(transition)
    }

    async fn fire_primary(&self, payload: &TriggerPayload) -> Result<Transition, CoreError> {
        let owner = payload.owner_id.as_str();
        let Some(task) = self.repo.find_task(owner, payload.occurrence_id).await? else {
            return Ok(Transition::Stale(StaleReason::Missing));
        };
        if task.status == TaskStatus::Done {
            return Ok(Transition::Stale(StaleReason::Resolved));
        }
        if task.remind_at != payload.scheduled_for {
            return Ok(Transition::Stale(StaleReason::Superseded));
        }
        if !self.repo.claim_primary(owner, task.id, payload.scheduled_for).await? {
            return Ok(Transition::Stale(StaleReason::AlreadyHandled));
        }

        let text = format!("Time for {}! ⏰", task.title);
        let buttons = reminder_buttons(task.id, self.config.snooze.num_minutes());
        if let Err(e) = self.notifier.send(owner, &text, &buttons).await {
            // Let the redelivery try again.
            self.repo.release_primary(owner, task.id, payload.scheduled_for).await?;
            return Err(e);
        }

        let chase_at = task.remind_at + self.scheduler.chase_offset();
        tracing::info!(owner_id = owner, task_id = %task.id, %chase_at, "reminder sent");
        Ok(Transition::Notified {
            task_id: task.id,
            chase_at,
        })
    }

    async fn fire_chase(&self, payload: &TriggerPayload, now: DateTime<Utc>) -> Result<Transition, CoreError> {
        let owner = payload.owner_id.as_str();
        let Some(task) = self.repo.find_task(owner, payload.occurrence_id).await? else {
            return Ok(Transition::Stale(StaleReason::Missing));
        };
        if task.status == TaskStatus::Done {
            self.scheduler.cancel_chase(owner, task.id).await;
            return Ok(Transition::Stale(StaleReason::Resolved));
        }
        if payload.scheduled_for < task.remind_at {
            return Ok(Transition::Stale(StaleReason::Superseded));
        }

        let previous = task.chased_until;
        if !self.repo.claim_chase(owner, task.id, payload.scheduled_for).await? {
            return Ok(Transition::Stale(StaleReason::AlreadyHandled));
        }

        // Re-arm first: a failed send below must not end the loop.
        let next_chase_at = self.policy.next_chase(now);
        if let Err(e) = self.scheduler.arm_chase(&task, next_chase_at).await {
            self.repo.release_chase(owner, task.id, payload.scheduled_for, previous).await?;
            return Err(e);
        }
        if let Some(reason) = self.settle_chase(owner, task.id, payload.scheduled_for).await? {
            return Ok(Transition::Stale(reason));
        }

        let text = format!(
            "🚨 *URGENT*: You haven't done this yet!\n\n*{}*\n\nDo it NOW!",
            task.title
        );
        let buttons = reminder_buttons(task.id, self.config.snooze.num_minutes());
        self.notifier.send(owner, &text, &buttons).await?;

        tracing::info!(owner_id = owner, task_id = %task.id, %next_chase_at, "chase sent");
        Ok(Transition::Escalated {
            task_id: task.id,
            next_chase_at,
        })
    }

    /// Re-reads the task after a chase re-arm. A Done, Snooze, Skip or delete
    /// that landed after the claim may have had its registrations overwritten
    /// by the re-arm, so the chase is cancelled or moved back to the new
    /// cycle. Returns why the firing went stale, if it did.
    async fn settle_chase(
        &self,
        owner: &str,
        task_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<StaleReason>, CoreError> {
        let mut restored_for = None;
        loop {
            let Some(task) = self.repo.find_task(owner, task_id).await? else {
                self.scheduler.cancel_chase(owner, task_id).await;
                return Ok(Some(StaleReason::Missing));
            };
            if task.status == TaskStatus::Done {
                self.scheduler.cancel_chase(owner, task_id).await;
                return Ok(Some(StaleReason::Resolved));
            }
            if task.remind_at <= scheduled_for {
                return Ok(None);
            }
            // Stable once a re-read shows the cycle we just restored.
            if restored_for == Some(task.remind_at) {
                return Ok(Some(StaleReason::Superseded));
            }
            let chase_at = task.remind_at + self.scheduler.chase_offset();
            tracing::debug!(owner_id = owner, %task_id, %chase_at, "cycle moved during chase; restoring its chase");
            self.scheduler.arm_chase(&task, chase_at).await?;
            restored_for = Some(task.remind_at);
        }
    }

    /// Applies a user action. Unknown ids are `NotFound`; acting on a done
    /// occurrence is `Stale`.
    pub async fn apply(
        &self,
        owner_id: &str,
        task_id: Uuid,
        action: ReminderAction,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        if self.repo.find_task(owner_id, task_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("Task with id {} not found", task_id)));
        }

        match action {
            ReminderAction::Done => {
                let completed = self.repo.mark_done(owner_id, task_id, now).await?;
                // Both racing callers cancel; unregister is idempotent.
                self.scheduler.cancel_all(owner_id, task_id).await;
                match completed {
                    Some(task) => {
                        tracing::info!(owner_id, %task_id, "task completed");
                        Ok(Transition::Completed { task })
                    }
                    None => Ok(Transition::Stale(StaleReason::Resolved)),
                }
            }
            ReminderAction::Snooze { minutes } => {
                if minutes <= 0 {
                    return Err(CoreError::Validation(format!(
                        "Snooze duration must be positive, got {} minutes",
                        minutes
                    )));
                }
                let due = Duration::try_minutes(minutes)
                    .and_then(|snooze| now.checked_add_signed(snooze))
                    .ok_or_else(|| CoreError::Validation(format!("Snooze of {} minutes is out of range", minutes)))?;
                self.reschedule(owner_id, task_id, action, due, TaskStatus::Snoozed, now)
                    .await
            }
            ReminderAction::Skip => {
                self.reschedule(owner_id, task_id, action, now + self.config.skip, TaskStatus::Skipped, now)
                    .await
            }
        }
    }

    async fn reschedule(
        &self,
        owner_id: &str,
        task_id: Uuid,
        action: ReminderAction,
        due: DateTime<Utc>,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        let Some(task) = self.repo.reschedule_task(owner_id, task_id, due, status, now).await? else {
            return Ok(Transition::Stale(StaleReason::Resolved));
        };
        // Replaces both registrations; the fresh chase must stay armed.
        let times = self.scheduler.reschedule(&task, due).await?;
        tracing::info!(owner_id, %task_id, %action, snooze_count = task.snooze_count, due = %due, "task rescheduled");
        Ok(Transition::Rescheduled { task, action, times })
    }

    /// Handles a button press: applies the action, then edits the reminder
    /// message and answers the callback. Edit and ack failures are logged only.
    pub async fn on_callback(&self, event: &CallbackEvent, now: DateTime<Utc>) -> Result<Transition, CoreError> {
        let result = self.apply(&event.from_user_id, event.occurrence_id, event.action, now).await;

        let (edit, ack) = match &result {
            Ok(Transition::Completed { task }) => (Some(format!("✅ Completed: {}", task.title)), "Great job! 🔥"),
            Ok(Transition::Rescheduled {
                action: ReminderAction::Snooze { minutes },
                ..
            }) => (Some(format!("💤 Snoozed for {}m.", minutes)), "Snoozed."),
            Ok(Transition::Rescheduled { .. }) => (Some("⏭️ Skipped to tomorrow.".to_string()), "Skipped."),
            Ok(_) => (None, "Already handled."),
            Err(CoreError::NotFound(_)) => (None, "Task not found."),
            Err(_) => (None, "Something went wrong, try again."),
        };

        if let (Some(text), Some(message)) = (edit, event.message.as_ref()) {
            if let Err(e) = self.notifier.edit(message, &text).await {
                tracing::warn!(error = %e, "failed to edit reminder message");
            }
        }
        if let Err(e) = self.notifier.ack(&event.callback_id, ack).await {
            tracing::warn!(error = %e, "failed to answer callback");
        }

        result
    }

    /// Current state of an occurrence, or `None` if it does not exist.
    pub async fn state(&self, owner_id: &str, task_id: Uuid) -> Result<Option<EscalationState>, CoreError> {
        Ok(self
            .repo
            .find_task(owner_id, task_id)
            .await?
            .as_ref()
            .map(EscalationState::of))
    }
}
