//! Wire-facing error taxonomy shared by the core and the server.
//!
//! `CoreError` maps 1:1 onto the stable `code` values clients see in
//! `{"type":"err", "code": ..., "message": ...}` responses. A handful of
//! internal-only variants exist purely so server-side logs keep the real
//! cause; they all collapse to the `internal` wire code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("project is stopped")]
    Stopped,

    #[error("{resource_type} not found: {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("stale epoch: expected {expected}, got {got}")]
    StaleEpoch { expected: u64, got: u64 },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Caller tried to operate as an agent that never registered. Folded
    /// into the `forbidden` wire code (see SPEC_FULL.md §4.5) but kept
    /// distinct here so logs stay precise.
    #[error("agent not registered: {0}")]
    NotRegistered(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// The stable wire code from SPEC_FULL.md §7.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unauthenticated => "unauthenticated",
            Self::Stopped => "stopped",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) | Self::NotRegistered(_) => "forbidden",
            Self::StaleEpoch { .. } => "stale_epoch",
            Self::Precondition(_) => "precondition",
            Self::InvalidPath(_) => "invalid_path",
            Self::Internal(_) | Self::Io(_) | Self::Serialization(_) => "internal",
        }
    }

    /// Clients may retry these without changing anything about the request.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::Stopped | Self::StaleEpoch { .. }
        )
    }

    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notregistered_collapses_to_forbidden_wire_code() {
        assert_eq!(CoreError::NotRegistered("bob".to_string()).code(), "forbidden");
        assert_eq!(CoreError::Forbidden("nope".to_string()).code(), "forbidden");
    }

    #[test]
    fn retriable_codes_match_spec() {
        assert!(CoreError::Stopped.is_retriable());
        assert!(CoreError::Conflict("x".to_string()).is_retriable());
        assert!(CoreError::StaleEpoch { expected: 1, got: 2 }.is_retriable());
        assert!(!CoreError::InvalidPath("x".to_string()).is_retriable());
        assert!(!CoreError::NotFound { resource_type: "task".to_string(), resource_id: "1".to_string() }.is_retriable());
    }

    #[test]
    fn io_and_serialization_errors_are_internal() {
        let io = CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.code(), "internal");
    }
}
