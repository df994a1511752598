//! Stand-in receiver for the callback endpoint.
//!
//! Logs what the dispatcher sends and keeps the messages in memory so a test
//! or an operator can check the contract end to end.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Form, Router,
};
use relay_shared::CallbackMessage;
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Content length the real notification service accepts
pub const SINK_CONTENT_LIMIT: usize = 2048;

#[derive(Debug, Clone, Default)]
pub struct SinkState {
    received: Arc<Mutex<Vec<CallbackMessage>>>,
}

impl SinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<CallbackMessage> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

pub fn router(state: SinkState) -> Router {
    Router::new()
        .route("/send_custom_message", post(receive))
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn receive(State(state): State<SinkState>, Form(msg): Form<CallbackMessage>) -> &'static str {
    let length = msg.content.chars().count();
    info!(
        "Callback for {} ({}, {} chars): {}",
        msg.recipient, msg.message_type, length, msg.content
    );
    if length > SINK_CONTENT_LIMIT {
        warn!(
            "Callback content for {} exceeds {} chars",
            msg.recipient, SINK_CONTENT_LIMIT
        );
    }
    state
        .received
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(msg);
    "OK"
}

async fn root() -> &'static str {
    "relayd callback sink is running"
}

async fn health() -> &'static str {
    "OK"
}

pub async fn run(bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("Callback sink listening on http://{}/send_custom_message", bind);
    axum::serve(listener, router(SinkState::new())).await?;
    Ok(())
}
