//! Error types for the relay.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn code(&self) -> i32 {
        match self {
            RelayError::LedgerUnavailable(_) => -32004,
            RelayError::Engine(_) => -32002,
            RelayError::Delivery(_) => -32003,
            RelayError::Config(_) => -32005,
            RelayError::InvalidRequest(_) => -32600,
            RelayError::Io(_) => -32006,
            RelayError::Internal(_) => -32603,
        }
    }

    /// True for failures of the durable store.
    pub fn is_ledger(&self) -> bool {
        matches!(self, RelayError::LedgerUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            RelayError::LedgerUnavailable(String::new()),
            RelayError::Engine(String::new()),
            RelayError::Delivery(String::new()),
            RelayError::Config(String::new()),
            RelayError::InvalidRequest(String::new()),
            RelayError::Internal(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = RelayError::LedgerUnavailable("database is locked".to_string());
        assert_eq!(err.to_string(), "Ledger unavailable: database is locked");
        assert!(err.is_ledger());
    }
}
