//! JSON API for the dashboard and the Telegram webhook.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use nag_core::calendar::{CalendarEntry, CalendarService, Created, DayView, Updated};
use nag_core::error::CoreError;
use nag_core::escalation::EscalationStateMachine;
use nag_core::models::{DeleteRequest, ItemKind, NewTaskData, Recurrence, Template, UpdateTaskData};
use nag_core::notify::TelegramUpdate;
use nag_core::recurrence::DayEntry;
use nag_core::timezone;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub owner_id: String,
    pub calendar: Arc<CalendarService>,
    pub machine: Arc<EscalationStateMachine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/tasks",
            get(get_tasks)
                .post(create_task)
                .put(update_task)
                .delete(delete_task),
        )
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// `CoreError` as an HTTP response: `{"error": "..."}` with a mapped status.
#[derive(Debug)]
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

// Malformed bodies and query strings get the same `{"error": ...}` shape.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(CoreError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(CoreError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Validation(_) | CoreError::InvalidOffset(_) | CoreError::AmbiguousId(_) => {
                StatusCode::BAD_REQUEST
            }
            CoreError::Scheduling(_) | CoreError::Delivery(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Responses
// ============================================================================

/// A created or edited template.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateResponse {
    id: Uuid,
    #[serde(rename = "type")]
    kind: ItemKind,
    title: String,
    time_of_day: NaiveTime,
    recurrence: Recurrence,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Instance materialized for the first day, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    instance: Option<CalendarEntry>,
}

impl TemplateResponse {
    fn new(template: Template, instance: Option<CalendarEntry>) -> Self {
        Self {
            id: template.id,
            kind: ItemKind::Template,
            title: template.title,
            time_of_day: template.time_of_day,
            recurrence: template.recurrence,
            created_at: template.created_at,
            updated_at: template.updated_at,
            instance,
        }
    }
}

fn entry(task: nag_core::models::Task) -> CalendarEntry {
    CalendarEntry::from(DayEntry::Materialized(task))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    date: Option<NaiveDate>,
}

async fn get_tasks(
    State(state): State<AppState>,
    query: Result<Query<DayQuery>, QueryRejection>,
) -> ApiResult<DayView> {
    let Query(query) = query?;
    let now = timezone::now();
    let date = query.date.unwrap_or_else(|| state.calendar.today(now));
    Ok(Json(state.calendar.day_view(&state.owner_id, date, now).await?))
}

async fn create_task(
    State(state): State<AppState>,
    data: Result<Json<NewTaskData>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(data) = data?;
    let created = state.calendar.create(&state.owner_id, data, timezone::now()).await?;
    let body = match created {
        Created::Task(task) => serde_json::to_value(entry(task)),
        Created::Template { template, instance } => {
            serde_json::to_value(TemplateResponse::new(template, instance.map(entry)))
        }
    }
    .map_err(CoreError::from)?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn update_task(
    State(state): State<AppState>,
    data: Result<Json<UpdateTaskData>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(data) = data?;
    let updated = state.calendar.update(&state.owner_id, data, timezone::now()).await?;
    let body = match updated {
        Updated::Task(task) => serde_json::to_value(entry(task)),
        Updated::Template(template) => serde_json::to_value(TemplateResponse::new(template, None)),
    }
    .map_err(CoreError::from)?;
    Ok(Json(body))
}

async fn delete_task(
    State(state): State<AppState>,
    request: Result<Query<DeleteRequest>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(request) = request?;
    let outcome = state.calendar.delete(&state.owner_id, request, timezone::now()).await?;
    Ok(Json(json!({
        "deletedTask": outcome.deleted_task,
        "deletedTemplate": outcome.deleted_template,
        "suppressedDate": outcome.suppressed.map(|e| e.date),
    })))
}

/// Telegram expects 200 for every update, or it redelivers it forever. The
/// body is read raw so that even non-JSON posts are answered with 200.
async fn telegram_webhook(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed telegram update");
            return StatusCode::OK;
        }
    };

    let event = match update.callback_event() {
        Ok(Some(event)) => event,
        Ok(None) => return StatusCode::OK,
        Err(e) => {
            tracing::warn!(update_id = update.update_id, error = %e, "ignoring unreadable callback");
            return StatusCode::OK;
        }
    };

    if event.from_user_id != state.owner_id {
        tracing::warn!(from = %event.from_user_id, "callback from unknown user ignored");
        return StatusCode::OK;
    }

    if let Err(e) = state.machine.on_callback(&event, timezone::now()).await {
        tracing::warn!(occurrence_id = %event.occurrence_id, error = %e, "callback handling failed");
    }
    StatusCode::OK
}
