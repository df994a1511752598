//! Diagnostic views served by relayd.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One outstanding request as shown to operators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingItem {
    pub request_id: String,
    pub user_id: String,
    pub question: String,
    pub start_time: DateTime<Utc>,
    pub age_seconds: i64,
}

/// Response of the pending-requests endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PendingReport {
    pub pending: Vec<PendingItem>,
    pub active_continuations: usize,
}

/// Whether the ledger was reachable at startup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    Ready,
    Unavailable,
}

impl std::fmt::Display for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerState::Ready => write!(f, "READY"),
            LedgerState::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}
