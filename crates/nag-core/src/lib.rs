//! # Nag Core Library
//!
//! Recurring reminders that keep chasing until they are answered.
//!
//! ## Core Modules
//!
//! - [`recurrence`]: Template expansion into real and virtual occurrences
//! - [`repository`]: Owner-partitioned item store (tasks, templates, exceptions)
//! - [`triggers`]: Named one-shot timers and their SQLite store
//! - [`scheduler`]: Primary and chase trigger registration
//! - [`escalation`]: The per-occurrence state machine
//! - [`dispatch`]: At-least-once delivery of due triggers
//! - [`notify`]: Chat channel trait, Telegram adapter, callback format
//! - [`calendar`]: Day view, CRUD and the daily rollover
//! - [`stats`]: Streak, heatmap and weekly report
//! - [`timezone`]: Fixed UTC offset helpers
//! - [`db`]: Connection and migrations
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nag_core::{
//!     db, models::ReminderConfig, notify::LogNotifier, repository::SqliteRepository,
//!     scheduler::ReminderScheduler, triggers::SqliteTriggerStore,
//!     escalation::EscalationStateMachine, dispatch::TriggerDispatcher,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("nag.db").await?;
//!     let config = ReminderConfig::default();
//!
//!     let triggers = Arc::new(SqliteTriggerStore::new(pool.clone()));
//!     let scheduler = ReminderScheduler::new(triggers.clone(), config.chase_offset);
//!     let machine = Arc::new(EscalationStateMachine::new(
//!         Arc::new(SqliteRepository::new(pool)),
//!         scheduler,
//!         Arc::new(LogNotifier),
//!         config,
//!     ));
//!
//!     let dispatcher = TriggerDispatcher::new(triggers, machine);
//!     let summary = dispatcher.run_due(chrono::Utc::now()).await?;
//!     println!("delivered {} reminders", summary.delivered);
//!     Ok(())
//! }
//! ```

pub mod calendar;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod escalation;
pub mod models;
pub mod notify;
pub mod recurrence;
pub mod repository;
pub mod scheduler;
pub mod stats;
pub mod timezone;
pub mod triggers;
