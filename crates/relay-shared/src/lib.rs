//! Shared types for the answer relay.

pub mod callback;
pub mod error;
pub mod record;
pub mod status;
pub mod version;

pub use callback::{CallbackMessage, MESSAGE_TYPE_TEXT};
pub use error::RelayError;
pub use record::{new_request_id, PendingEntry, RecordStatus, RequestRecord, UserAggregate};
pub use status::{LedgerState, PendingItem, PendingReport};
pub use version::{VersionInfo, BUILD_DATE, GIT_SHA, VERSION};

/// Default ledger database path
pub const DB_PATH: &str = "/var/lib/relayd/relay.sqlite";

/// Returned to the caller when the answer is not ready within the time budget
pub const PLACEHOLDER_REPLY: &str =
    "Your question is being processed. The full answer will be sent to you shortly.";

/// Returned in place of raw engine errors
pub const FAILURE_REPLY: &str =
    "Sorry, something went wrong while answering your question. Please try again later.";

/// Marker appended to truncated callback content
pub const ELLIPSIS: &str = "...";
