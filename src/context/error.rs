// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context store error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Lookup failures. Callers branch on the variant: a missing entry never
/// existed (or was deleted), an expired one is stale and can be re-fetched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    #[error("Context entry '{0}' not found")]
    NotFound(String),

    #[error("Context entry '{id}' expired at {expired_at}")]
    Expired {
        id: String,
        expired_at: DateTime<Utc>,
    },
}

impl ContextError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ContextError::NotFound("abc".into());
        assert_eq!(err.to_string(), "Context entry 'abc' not found");
        assert!(err.is_not_found());
        assert!(!err.is_expired());

        let err = ContextError::Expired {
            id: "abc".into(),
            expired_at: Utc::now(),
        };
        assert!(err.to_string().starts_with("Context entry 'abc' expired at"));
        assert!(err.is_expired());
    }
}
