//! Callback dispatcher: ships late answers to the notification endpoint.
//!
//! One attempt per answer, no retry. Delivery is a side channel; the ledger
//! row is already committed by the time anything is sent.

use crate::settings::SettingsHandle;
use async_trait::async_trait;
use relay_shared::{CallbackMessage, RelayError, ELLIPSIS};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("callback transport error: {0}")]
    Transport(String),

    #[error("callback rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<DeliveryError> for RelayError {
    fn from(e: DeliveryError) -> Self {
        RelayError::Delivery(e.to_string())
    }
}

/// What was actually sent
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub truncated: bool,
    pub content_chars: usize,
}

/// Delivery seam used by the orchestrator
#[async_trait]
pub trait CallbackSink: Send + Sync {
    async fn deliver(&self, user_id: &str, text: &str) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Cut `text` to `cap` characters plus the ellipsis marker.
///
/// Counts chars, not bytes. Text at or under the cap is returned as is, so a
/// second pass over already truncated text changes nothing.
pub fn truncate_content(text: &str, cap: usize) -> (String, bool) {
    match text.char_indices().nth(cap) {
        None => (text.to_string(), false),
        Some((byte_idx, _)) => {
            let head = &text[..byte_idx];
            let candidate = format!("{}{}", head, ELLIPSIS);
            if candidate == text {
                (candidate, false)
            } else {
                (candidate, true)
            }
        }
    }
}

/// Form-POST dispatcher reading endpoint, cap and timeout from settings
pub struct HttpCallbackDispatcher {
    http_client: reqwest::Client,
    settings: SettingsHandle,
}

impl HttpCallbackDispatcher {
    pub fn new(settings: SettingsHandle) -> Result<Self, RelayError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Config(format!("callback client: {}", e)))?;
        Ok(Self {
            http_client,
            settings,
        })
    }
}

#[async_trait]
impl CallbackSink for HttpCallbackDispatcher {
    async fn deliver(&self, user_id: &str, text: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let settings = self.settings.snapshot();
        let (content, truncated) = truncate_content(text, settings.max_response_length);
        if truncated {
            debug!(
                "Callback content for {} truncated to {} chars",
                user_id, settings.max_response_length
            );
        }

        let message = CallbackMessage::text(user_id, &content);
        let response = self
            .http_client
            .post(&settings.callback_url)
            .timeout(settings.api_timeout())
            .form(&message)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        info!("Callback delivered to {} (HTTP {})", user_id, status.as_u16());
        Ok(DeliveryReceipt {
            status: status.as_u16(),
            truncated,
            content_chars: content.chars().count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        let (out, truncated) = truncate_content("hello", 5);
        assert_eq!(out, "hello");
        assert!(!truncated);
    }

    #[test]
    fn test_long_text_cut_to_cap_plus_marker() {
        let (out, truncated) = truncate_content("abcdefghij", 4);
        assert_eq!(out, "abcd...");
        assert!(truncated);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let text = "交通事故责任认定需要看具体情况";
        let (out, truncated) = truncate_content(text, 4);
        assert_eq!(out, "交通事故...");
        assert!(truncated);
        assert_eq!(out.chars().count(), 4 + ELLIPSIS.len());
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let (once, _) = truncate_content(&"x".repeat(50), 10);
        let (twice, truncated_again) = truncate_content(&once, 10);
        assert_eq!(once, twice);
        assert!(!truncated_again);
    }

    #[test]
    fn test_zero_cap() {
        let (out, truncated) = truncate_content("abc", 0);
        assert_eq!(out, "...");
        assert!(truncated);
        assert_eq!(truncate_content("", 0), (String::new(), false));
    }
}
