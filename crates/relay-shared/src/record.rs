//! Records kept by the query ledger and the pending registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome stored with a finalized request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RecordStatus::Success),
            "error" => Some(RecordStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finalized (user, question, answer) interaction.
///
/// Never mutated after it reaches the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    pub request_id: String,
    pub user_id: String,
    pub question: String,
    pub answer: String,
    /// Seconds from acceptance to completion
    pub response_time: f64,
    pub status: RecordStatus,
    pub timestamp: DateTime<Utc>,
}

impl RequestRecord {
    pub fn success(
        request_id: &str,
        user_id: &str,
        question: &str,
        answer: &str,
        response_time: f64,
    ) -> Self {
        Self::new(request_id, user_id, question, answer, response_time, RecordStatus::Success)
    }

    /// Error records store the failure description as the answer.
    pub fn error(
        request_id: &str,
        user_id: &str,
        question: &str,
        error_text: &str,
        response_time: f64,
    ) -> Self {
        Self::new(request_id, user_id, question, error_text, response_time, RecordStatus::Error)
    }

    fn new(
        request_id: &str,
        user_id: &str,
        question: &str,
        answer: &str,
        response_time: f64,
        status: RecordStatus,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            response_time,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// Per-user running totals, derived from ledger rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAggregate {
    pub user_id: String,
    pub total_queries: u64,
    pub first_query_time: DateTime<Utc>,
    pub last_query_time: DateTime<Utc>,
    pub total_response_time: f64,
}

impl UserAggregate {
    pub fn avg_response_time(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.total_response_time / self.total_queries as f64
        }
    }
}

/// Metadata for a request still waiting on the engine after its caller
/// received the placeholder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingEntry {
    pub user_id: String,
    pub question: String,
    pub start_time: DateTime<Utc>,
}

impl PendingEntry {
    pub fn new(user_id: &str, question: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            question: question.to_string(),
            start_time,
        }
    }
}

/// Mint a fresh request identifier
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
