//! Wire format of the outbound notification call.

use serde::{Deserialize, Serialize};

/// Message type sent for every relayed answer
pub const MESSAGE_TYPE_TEXT: &str = "text";

/// Form body posted to the callback endpoint.
///
/// The receiving service names the recipient field `openid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackMessage {
    #[serde(rename = "openid")]
    pub recipient: String,
    pub message_type: String,
    pub content: String,
}

impl CallbackMessage {
    pub fn text(recipient: &str, content: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            message_type: MESSAGE_TYPE_TEXT.to_string(),
            content: content.to_string(),
        }
    }
}
