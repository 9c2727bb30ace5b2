//! Workflow job webhook endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use runner_events::{route, WorkflowJobEvent};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::orchestrator::Outcome;
use crate::signature::{self, SignatureError, SIGNATURE_HEADER};
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of an accepted delivery.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub outcome: Outcome,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(receive))
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn authenticate(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
    let config = state.config();
    if config.disable_auth {
        return Ok(());
    }

    let signature = match headers.get(SIGNATURE_HEADER) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| SignatureError::Malformed)?),
    };
    signature::verify(config.api_secret.as_bytes(), body, signature)
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let request_id = request_id(&headers);

    if let Err(e) = authenticate(&state, &headers, &body) {
        warn!(request_id = %request_id, error = %e, "Rejected webhook delivery");
        return Err(
            ApiError::unauthorized("invalid_signature", e.to_string()).with_request_id(request_id)
        );
    }

    let event = WorkflowJobEvent::from_slice(&body).map_err(|e| {
        let detail = if e.is_eof() {
            "request body is empty".to_string()
        } else {
            format!("request body is not a workflow job event: {e}")
        };
        ApiError::bad_request("malformed_event", detail).with_request_id(request_id.clone())
    })?;

    match state.scheduler().handle(&event).await {
        Ok(outcome) => Ok(Json(WebhookResponse { outcome })),
        Err(e) => {
            let target = route(event.labels(), &state.config().label_prefix);
            error!(
                request_id = %request_id,
                action = %event.action,
                runner = ?target,
                error = %e,
                "Failed to handle workflow job event"
            );
            Err(ApiError::internal("scheduling_failed", e.to_string()).with_request_id(request_id))
        }
    }
}
