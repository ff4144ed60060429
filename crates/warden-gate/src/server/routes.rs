//! Axum routes.
//!
//! - `GET  /approve`  approval link target (always `200 text/html`)
//! - `POST /findings` detection events
//! - `POST /restore`  direct restore requests
//! - `GET  /health`

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::gate::{ApprovalGate, ApprovalRequest, page};
use crate::responder::{IncidentResponder, ResponderError};
use crate::restore::{RestoreOrchestrator, RestoreRequest};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<ApprovalGate>,
    pub responder: Arc<IncidentResponder>,
    pub restore: Arc<RestoreOrchestrator>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/approve", get(approve))
        .route("/findings", post(findings))
        .route("/restore", post(restore))
        .route("/health", get(health))
        .fallback(fallback)
        .with_state(state)
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

/// `GET /approve`
pub async fn approve(State(state): State<AppState>, RawQuery(query): RawQuery) -> Html<String> {
    let request = ApprovalRequest::from_query(query.as_deref().unwrap_or_default());
    let outcome = state.gate.handle(&request).await;
    Html(page::render(&outcome, &request).into_html())
}

/// `POST /findings`
pub async fn findings(State(state): State<AppState>, body: Bytes) -> Response {
    let event: Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, format!("invalid JSON: {e}")),
    };

    match state.responder.handle_event(&event).await {
        Ok(report) => axum::Json(json!({
            "status": "done",
            "instanceId": report.finding.instance_id,
        }))
        .into_response(),
        Err(e @ ResponderError::Normalize(_)) => {
            warn!(error = %e, "Rejected detection event");
            json_error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Incident response failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `POST /restore`
pub async fn restore(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RestoreRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, format!("invalid JSON: {e}")),
    };
    if request.instance_ids().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Must supply instanceId(s) in payload",
        );
    }
    axum::Json(state.restore.restore(&request).await).into_response()
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// Browsers ask for a favicon next to whatever path the link used.
async fn fallback(uri: Uri) -> StatusCode {
    if uri.path().ends_with("/favicon.ico") {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
