//! `/add` trigger endpoint.

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::echo::OutboundMessage;
use crate::server::AppState;

/// Why a trigger request was rejected.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// The body is not valid JSON.
    #[error("Invalid JSON")]
    MalformedInput(#[from] serde_json::Error),
    /// The body is JSON but not an object.
    #[error("Invalid JSON")]
    NotAnObject,
    /// Anything but `POST`.
    #[error("POST request required")]
    MethodNotAllowed,
}

impl TriggerError {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedInput(_) | Self::NotAnObject => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Extract `data` from a trigger body. A missing `data` key defaults to `1`.
pub fn parse_trigger_body(body: &[u8]) -> Result<Value, TriggerError> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(mut fields) => Ok(fields.remove("data").unwrap_or_else(|| json!(1))),
        _ => Err(TriggerError::NotAnObject),
    }
}

/// Any method on `/add`. `POST {"data": x}` broadcasts `{"added": x}` to the
/// configured group and answers `{"result": x}`.
pub async fn add_handler(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Json<Value>, TriggerError> {
    if method != Method::POST {
        return Err(TriggerError::MethodNotAllowed);
    }
    let data = parse_trigger_body(&body).inspect_err(|e| {
        debug!(error = ?e, len = body.len(), "rejected trigger body");
    })?;

    let group = &state.settings.app.group;
    let report = state
        .hub
        .broadcast_to_group(group, OutboundMessage::Added(data.clone()).encode());
    info!(
        group = %group,
        delivered = report.delivered_count,
        failed = report.failed.len(),
        "trigger broadcast"
    );

    Ok(Json(json!({ "result": data })))
}
