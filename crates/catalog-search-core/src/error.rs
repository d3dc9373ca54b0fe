//! Typed error conditions surfaced by the engine.
//!
//! Most functions return [`anyhow::Result`]. Conditions a caller must be able
//! to tell apart (a missing item, a rejected request) are raised as an
//! [`EngineError`] inside the `anyhow::Error` and recovered with
//! [`EngineError::from_anyhow`].

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("embedding provider timed out after {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Find an `EngineError` anywhere in an `anyhow` error chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&EngineError> {
        err.chain().find_map(|e| e.downcast_ref::<EngineError>())
    }

    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(Self::from_anyhow(err), Some(EngineError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_not_found_survives_context() {
        let err: anyhow::Result<()> = Err(EngineError::not_found("item", "abc").into());
        let err = err.context("loading item").unwrap_err();
        assert!(EngineError::is_not_found(&err));
        assert_eq!(
            EngineError::from_anyhow(&err).unwrap().to_string(),
            "item not found: abc"
        );
    }

    #[test]
    fn test_plain_error_is_not_typed() {
        let err = anyhow::anyhow!("disk full");
        assert!(EngineError::from_anyhow(&err).is_none());
        assert!(!EngineError::is_not_found(&err));
    }
}
