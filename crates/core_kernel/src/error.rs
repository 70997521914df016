//! Core error taxonomy shared across the billing crates
//!
//! Every failure surfaced to a caller carries a stable kind and a
//! human-readable message; store-specific codes never leak through.

use thiserror::Error;

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input violates an invariant; never retried automatically
    #[error("{message}")]
    Validation {
        message: String,
        /// Offending field path, when known (e.g. `card.exp_year`)
        field: Option<String>,
    },

    /// The referenced record does not exist or belongs to another tenant
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation lost a read-modify-write race
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Infrastructure failure the caller cannot act on
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_entity_and_id() {
        let err = CoreError::not_found("Invoice", "abc-123");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Invoice"));
        assert!(err.to_string().contains("abc-123"));
    }

    #[test]
    fn validation_carries_field_path() {
        let err = CoreError::validation_field("card has expired", "card.exp_year");
        match err {
            CoreError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("card.exp_year"));
            }
            _ => panic!("expected validation error"),
        }
    }
}
