use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::CoreError;
use crate::escalation::{EscalationStateMachine, Transition};
use crate::triggers::SqliteTriggerStore;

const BATCH_SIZE: u32 = 100;

/// Outcome counts of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub stale: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.delivered + self.stale + self.failed
    }
}

/// TriggerDispatcher: delivers due triggers to the state machine.
///
/// Delivery is at-least-once: a trigger is acknowledged only after the
/// handler succeeded (or found the firing stale). Failed firings stay in the
/// table and are retried on the next pass.
pub struct TriggerDispatcher {
    store: Arc<SqliteTriggerStore>,
    machine: Arc<EscalationStateMachine>,
}

impl TriggerDispatcher {
    pub fn new(store: Arc<SqliteTriggerStore>, machine: Arc<EscalationStateMachine>) -> Self {
        Self { store, machine }
    }

    /// Handles every trigger due at `now`.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<DispatchSummary, CoreError> {
        let mut summary = DispatchSummary::default();

        for trigger in self.store.due(now, BATCH_SIZE).await? {
            match self.machine.on_trigger(&trigger.payload, now).await {
                Ok(transition) => {
                    if matches!(transition, Transition::Stale(_)) {
                        summary.stale += 1;
                    } else {
                        summary.delivered += 1;
                    }
                    // A chase re-armed during handling has a new fire_at and survives this.
                    self.store.acknowledge(&trigger).await?;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        trigger = %trigger.name,
                        retryable = e.is_retryable(),
                        error = %e,
                        "trigger handling failed; will retry"
                    );
                    if !e.is_retryable() {
                        self.store.acknowledge(&trigger).await?;
                    }
                }
            }
        }

        if summary.total() > 0 {
            tracing::info!(
                delivered = summary.delivered,
                stale = summary.stale,
                failed = summary.failed,
                "dispatch pass finished"
            );
        }
        Ok(summary)
    }

    /// Polls every `interval` until `shutdown` flips to `true`.
    pub async fn run(&self, interval: StdDuration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_due(crate::timezone::now()).await {
                        tracing::error!(error = %e, "dispatch pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("trigger dispatcher stopped");
                        break;
                    }
                }
            }
        }
    }
}
