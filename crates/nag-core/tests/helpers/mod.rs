#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use nag_core::calendar::CalendarService;
use nag_core::db::establish_connection;
use nag_core::dispatch::TriggerDispatcher;
use nag_core::error::CoreError;
use nag_core::escalation::EscalationStateMachine;
use nag_core::models::ReminderConfig;
use nag_core::notify::{ActionButton, MessageRef, Notifier};
use nag_core::recurrence::RecurrenceExpander;
use nag_core::repository::SqliteRepository;
use nag_core::scheduler::ReminderScheduler;
use nag_core::stats::{StreakAndHeatmapCalculator, DEFAULT_HEATMAP_DAYS};
use nag_core::triggers::SqliteTriggerStore;
use tempfile::TempDir;

pub const OWNER: &str = "1069945118";

/// A message captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    pub buttons: Vec<ActionButton>,
}

/// Notifier that records everything instead of talking to a chat service.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<SentMessage>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub acks: Mutex<Vec<(String, String)>>,
    pub fail_edits: bool,
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: &str, text: &str, actions: &[ActionButton]) -> Result<MessageRef, CoreError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            buttons: actions.to_vec(),
        });
        Ok(MessageRef {
            chat_id: chat_id.to_string(),
            message_id: sent.len() as i64,
        })
    }

    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), CoreError> {
        if self.fail_edits {
            return Err(CoreError::Delivery("message to edit not found".to_string()));
        }
        self.edits.lock().unwrap().push((message.clone(), text.to_string()));
        Ok(())
    }

    async fn ack(&self, callback_id: &str, text: &str) -> Result<(), CoreError> {
        self.acks.lock().unwrap().push((callback_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Fully wired engine over a temporary database.
pub struct TestEnv {
    pub repo: Arc<SqliteRepository>,
    pub triggers: Arc<SqliteTriggerStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub machine: Arc<EscalationStateMachine>,
    pub calendar: CalendarService,
    pub dispatcher: TriggerDispatcher,
    _temp_dir: TempDir,
}

pub async fn setup() -> TestEnv {
    setup_with(FixedOffset::east_opt(0).unwrap(), RecordingNotifier::default()).await
}

pub async fn setup_with(offset: FixedOffset, notifier: RecordingNotifier) -> TestEnv {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("nag.db");
    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    let config = ReminderConfig::default();
    let repo = Arc::new(SqliteRepository::new(pool.clone()));
    let triggers = Arc::new(SqliteTriggerStore::new(pool));
    let notifier = Arc::new(notifier);
    let scheduler = ReminderScheduler::new(triggers.clone(), config.chase_offset);
    let machine = Arc::new(EscalationStateMachine::new(
        repo.clone(),
        scheduler,
        notifier.clone(),
        config,
    ));
    let calendar = CalendarService::new(
        repo.clone(),
        machine.clone(),
        RecurrenceExpander::new(offset),
        StreakAndHeatmapCalculator::new(offset, DEFAULT_HEATMAP_DAYS),
    );
    let dispatcher = TriggerDispatcher::new(triggers.clone(), machine.clone());

    TestEnv {
        repo,
        triggers,
        notifier,
        machine,
        calendar,
        dispatcher,
        _temp_dir: temp_dir,
    }
}

pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC 3339 timestamp")
}

pub fn day(s: &str) -> NaiveDate {
    s.parse().expect("valid date")
}
