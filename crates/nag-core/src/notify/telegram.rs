use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{parse_callback, ActionButton, MessageRef, Notifier};
use crate::error::CoreError;
use crate::models::ReminderAction;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API adapter.
pub struct TelegramNotifier {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, api_base: Option<String>) -> Self {
        Self {
            token: token.into(),
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value, CoreError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Delivery(format!("telegram {method}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Delivery(format!("telegram {method} failed ({status}): {body}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CoreError::Delivery(format!("telegram {method}: {e}")))?;
        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(CoreError::Delivery(format!("telegram {method} rejected: {payload}")));
        }
        Ok(payload)
    }
}

/// Inline keyboard with two buttons per row.
pub(crate) fn inline_keyboard(actions: &[ActionButton]) -> Value {
    let rows: Vec<Value> = actions
        .chunks(2)
        .map(|row| {
            Value::Array(
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.callback_data }))
                    .collect(),
            )
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: &str, text: &str, actions: &[ActionButton]) -> Result<MessageRef, CoreError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if !actions.is_empty() {
            body["reply_markup"] = inline_keyboard(actions);
        }

        let payload = self.call("sendMessage", &body).await?;
        let message_id = payload
            .pointer("/result/message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| CoreError::Delivery("telegram sendMessage: missing message_id".to_string()))?;

        Ok(MessageRef {
            chat_id: chat_id.to_string(),
            message_id,
        })
    }

    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), CoreError> {
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "text": text,
        });
        self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn ack(&self, callback_id: &str, text: &str) -> Result<(), CoreError> {
        let body = json!({ "callback_query_id": callback_id, "text": text });
        self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

// ============================================================================
// Inbound webhook updates
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// A button press, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub callback_id: String,
    pub action: ReminderAction,
    pub occurrence_id: Uuid,
    pub from_user_id: String,
    /// The reminder message the button belonged to
    pub message: Option<MessageRef>,
}

impl TelegramUpdate {
    /// The decoded button press, if this update carries one.
    pub fn callback_event(&self) -> Result<Option<CallbackEvent>, CoreError> {
        let Some(query) = &self.callback_query else {
            return Ok(None);
        };
        let Some(data) = &query.data else {
            return Ok(None);
        };

        let (action, occurrence_id) = parse_callback(data)?;
        Ok(Some(CallbackEvent {
            callback_id: query.id.clone(),
            action,
            occurrence_id,
            from_user_id: query.from.id.to_string(),
            message: query.message.as_ref().map(|m| MessageRef {
                chat_id: m.chat.id.to_string(),
                message_id: m.message_id,
            }),
        }))
    }
}
