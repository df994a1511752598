//! HTTP server for relayd

use crate::orchestrator::Orchestrator;
use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use relay_shared::LedgerState;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    /// Absent when the ledger could not be opened at startup
    pub orchestrator: Option<Arc<Orchestrator>>,
    pub ledger_state: LedgerState,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator: Some(orchestrator),
            ledger_state: LedgerState::Ready,
            start_time: Instant::now(),
        }
    }

    /// Serve without a ledger: `/chat` answers 503
    pub fn degraded() -> Self {
        Self {
            orchestrator: None,
            ledger_state: LedgerState::Unavailable,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::chat_routes())
        .merge(routes::pending_routes())
        .merge(routes::health_routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until `shutdown` resolves
pub async fn run<F>(state: AppState, bind: &str, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if state.ledger_state == LedgerState::Unavailable {
        warn!("Ledger unavailable, /chat will answer 503");
    }
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("  Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
