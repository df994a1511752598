//! API routes for relayd

use crate::server::AppState;
use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use relay_shared::{PendingReport, RelayError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

type AppStateArc = Arc<AppState>;

/// Body of `POST /chat`, as form fields or JSON
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub user_id: String,
    pub message: String,
}

impl ChatRequest {
    async fn extract(request: Request) -> Result<Self, RelayError> {
        let is_json = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let req = if is_json {
            Json::<ChatRequest>::from_request(request, &())
                .await
                .map(|Json(req)| req)
                .map_err(|e| RelayError::InvalidRequest(e.body_text()))?
        } else {
            Form::<ChatRequest>::from_request(request, &())
                .await
                .map(|Form(req)| req)
                .map_err(|e| RelayError::InvalidRequest(e.body_text()))?
        };
        req.validate()
    }

    fn validate(self) -> Result<Self, RelayError> {
        if self.user_id.trim().is_empty() {
            return Err(RelayError::InvalidRequest("user_id is required".to_string()));
        }
        if self.message.trim().is_empty() {
            return Err(RelayError::InvalidRequest("message is required".to_string()));
        }
        Ok(self)
    }
}

/// Map a relay error to the status and body returned to the client
fn error_response(e: RelayError) -> (StatusCode, String) {
    let status = match &e {
        RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        e if e.is_ledger() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("{} (code {})", e, e.code()))
}

// ============================================================================
// Chat
// ============================================================================

pub fn chat_routes() -> Router<AppStateArc> {
    Router::new().route("/chat", post(chat))
}

async fn chat(
    State(state): State<AppStateArc>,
    request: Request,
) -> Result<String, (StatusCode, String)> {
    let orchestrator = state.orchestrator.as_ref().ok_or_else(|| {
        error_response(RelayError::LedgerUnavailable(
            "not opened at startup".to_string(),
        ))
    })?;

    let req = ChatRequest::extract(request).await.map_err(|e| {
        debug!("  Rejected /chat body: {}", e);
        error_response(e)
    })?;

    info!("  Question from {}", req.user_id);
    let outcome = orchestrator
        .handle(req.request_id, &req.user_id, &req.message)
        .await;
    Ok(outcome.text().to_string())
}

// ============================================================================
// Pending
// ============================================================================

pub fn pending_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/pending", get(pending))
}

async fn pending(State(state): State<AppStateArc>) -> Json<PendingReport> {
    let report = state
        .orchestrator
        .as_ref()
        .map(|o| o.pending_report())
        .unwrap_or_default();
    Json(report)
}

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health))
}

async fn health() -> &'static str {
    "OK"
}
