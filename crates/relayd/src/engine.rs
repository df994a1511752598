//! Answer engine client.
//!
//! The engine is an external service that may take arbitrarily long. It streams
//! newline-delimited JSON chunks; only the concatenated text matters here.

use async_trait::async_trait;
use relay_shared::RelayError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Transport(String),

    #[error("engine returned HTTP {0}: {1}")]
    Status(u16, String),

    #[error("engine response malformed: {0}")]
    Malformed(String),

    #[error("engine failed: {0}")]
    Failed(String),
}

impl From<EngineError> for RelayError {
    fn from(e: EngineError) -> Self {
        RelayError::Engine(e.to_string())
    }
}

/// Producer of full answers
#[async_trait]
pub trait AnswerEngine: Send + Sync {
    async fn generate(&self, conversation_id: &str, message: &str) -> Result<String, EngineError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    conversation_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Node name whose chunks carry tool output rather than answer text
const TOOLS_NODE: &str = "tools";

/// Concatenate the answer text out of a newline-delimited chunk stream
pub fn collect_stream(body: &str) -> Result<String, EngineError> {
    let mut answer = String::new();
    for (lineno, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let chunk: StreamChunk = serde_json::from_str(line)
            .map_err(|e| EngineError::Malformed(format!("line {}: {}", lineno + 1, e)))?;
        if let Some(err) = chunk.error {
            return Err(EngineError::Failed(err));
        }
        if chunk.node.as_deref() == Some(TOOLS_NODE) {
            continue;
        }
        if let Some(content) = chunk.content {
            answer.push_str(&content);
        }
    }
    Ok(answer)
}

/// HTTP engine client
pub struct HttpAnswerEngine {
    url: String,
    http_client: reqwest::Client,
}

impl HttpAnswerEngine {
    /// `request_timeout` of `None` lets a call run as long as the engine needs
    pub fn new(url: &str, request_timeout: Option<Duration>) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("engine client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl AnswerEngine for HttpAnswerEngine {
    async fn generate(&self, conversation_id: &str, message: &str) -> Result<String, EngineError> {
        debug!("Engine call for conversation {}", conversation_id);

        let response = self
            .http_client
            .post(&self.url)
            .json(&GenerateRequest {
                conversation_id,
                message,
            })
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(EngineError::Status(status.as_u16(), truncate_for_log(&body)));
        }

        collect_stream(&body)
    }
}

fn truncate_for_log(body: &str) -> String {
    body.chars().take(200).collect()
}
