//! The chat notification channel: outbound reminders with action buttons,
//! message edits, callback acknowledgements, and the callback data format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::ReminderAction;

pub mod telegram;

pub use telegram::{CallbackEvent, TelegramNotifier, TelegramUpdate};

/// One labelled callback button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub label: String,
    pub callback_data: String,
}

impl ActionButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Handle of a delivered message, used to edit it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: String,
    pub message_id: i64,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str, actions: &[ActionButton]) -> Result<MessageRef, CoreError>;
    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), CoreError>;
    async fn ack(&self, callback_id: &str, text: &str) -> Result<(), CoreError>;
}

/// Encodes `action` for `occurrence_id` as button callback data.
pub fn encode_callback(action: ReminderAction, occurrence_id: Uuid) -> String {
    match action {
        ReminderAction::Done => format!("DONE:{}", occurrence_id),
        ReminderAction::Snooze { minutes } => format!("SNOOZE:{}:{}", occurrence_id, minutes),
        ReminderAction::Skip => format!("SKIP:{}", occurrence_id),
    }
}

/// Parses `DONE:{id}`, `SNOOZE:{id}:{minutes}` or `SKIP:{id}`.
pub fn parse_callback(data: &str) -> Result<(ReminderAction, Uuid), CoreError> {
    let invalid = || CoreError::Validation(format!("Unrecognized callback data: {}", data));
    let mut parts = data.split(':');
    let verb = parts.next().ok_or_else(invalid)?;
    let id = parts
        .next()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(invalid)?;

    let action = match verb {
        "DONE" => ReminderAction::Done,
        "SKIP" => ReminderAction::Skip,
        "SNOOZE" => {
            let minutes = parts
                .next()
                .and_then(|raw| raw.parse::<i64>().ok())
                .ok_or_else(invalid)?;
            ReminderAction::Snooze { minutes }
        }
        _ => return Err(invalid()),
    };

    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok((action, id))
}

/// The button row attached to every reminder: Done, Snooze, Skip.
pub fn reminder_buttons(occurrence_id: Uuid, snooze_minutes: i64) -> Vec<ActionButton> {
    let snooze_label = if snooze_minutes % 60 == 0 {
        format!("Snooze {}hr 💤", snooze_minutes / 60)
    } else {
        format!("Snooze {}m 💤", snooze_minutes)
    };
    vec![
        ActionButton::new("Done ✅", encode_callback(ReminderAction::Done, occurrence_id)),
        ActionButton::new(
            snooze_label,
            encode_callback(ReminderAction::Snooze { minutes: snooze_minutes }, occurrence_id),
        ),
        ActionButton::new("Skip ⏭️", encode_callback(ReminderAction::Skip, occurrence_id)),
    ]
}

/// Notifier that only logs. Used when no bot token is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, chat_id: &str, text: &str, actions: &[ActionButton]) -> Result<MessageRef, CoreError> {
        let labels: Vec<&str> = actions.iter().map(|a| a.label.as_str()).collect();
        tracing::info!(chat_id, ?labels, "notify: {}", text);
        Ok(MessageRef {
            chat_id: chat_id.to_string(),
            message_id: 0,
        })
    }

    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), CoreError> {
        tracing::info!(chat_id = %message.chat_id, message_id = message.message_id, "edit: {}", text);
        Ok(())
    }

    async fn ack(&self, callback_id: &str, text: &str) -> Result<(), CoreError> {
        tracing::info!(callback_id, "ack: {}", text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_formats() {
        let id = Uuid::now_v7();
        assert_eq!(encode_callback(ReminderAction::Done, id), format!("DONE:{}", id));
        assert_eq!(
            parse_callback(&format!("SNOOZE:{}:60", id)).unwrap(),
            (ReminderAction::Snooze { minutes: 60 }, id)
        );
        assert_eq!(parse_callback(&format!("SKIP:{}", id)).unwrap(), (ReminderAction::Skip, id));
    }

    #[test]
    fn test_rejects_malformed_callbacks() {
        let id = Uuid::now_v7();
        for data in [
            "DONE".to_string(),
            "DONE:not-a-uuid".to_string(),
            format!("SNOOZE:{}", id),
            format!("SNOOZE:{}:soon", id),
            format!("NUKE:{}", id),
            format!("DONE:{}:extra", id),
        ] {
            assert!(parse_callback(&data).is_err(), "{data} should be rejected");
        }
    }

    #[test]
    fn test_reminder_buttons_order() {
        let id = Uuid::now_v7();
        let buttons = reminder_buttons(id, 60);
        let labels: Vec<&str> = buttons.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["Done ✅", "Snooze 1hr 💤", "Skip ⏭️"]);
        assert_eq!(buttons[1].callback_data, format!("SNOOZE:{}:60", id));
    }

    #[test]
    fn test_log_notifier_never_fails() {
        let message = tokio_test::block_on(LogNotifier.send("42", "hello", &[])).unwrap();
        assert_eq!(message.chat_id, "42");
        tokio_test::block_on(LogNotifier.edit(&message, "edited")).unwrap();
        tokio_test::block_on(LogNotifier.ack("cb", "ok")).unwrap();
    }
}
