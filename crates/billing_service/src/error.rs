//! Service-layer error taxonomy
//!
//! Entity validation errors pass through unchanged; service-level decisions
//! (the void guard, the method cap, stale revisions) are raised here.

use thiserror::Error;

use core_kernel::{CoreError, StoreError};
use domain_billing::BillingError;

/// Errors surfaced to callers of the billing services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input violates an invariant; never retried automatically
    #[error("{message}")]
    Validation {
        message: String,
        /// Offending field path, when known
        field: Option<String>,
    },

    /// The record does not exist or belongs to another tenant.
    /// Ownership failures are folded in here to avoid leaking existence
    /// across tenants.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A read-modify-write lost the race against a concurrent writer
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    /// Store-layer failure, propagated as an internal error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Entity could not be mapped to or from its document form
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ServiceError::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }
}

impl From<BillingError> for ServiceError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation { message, field } => {
                ServiceError::Validation { message, field }
            }
            other @ BillingError::InvalidStatus { .. } => ServiceError::Validation {
                message: other.to_string(),
                field: None,
            },
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

/// Collapse into the kernel taxonomy for embedding interfaces that only
/// distinguish the stable error kinds.
impl From<ServiceError> for CoreError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation { message, field } => CoreError::Validation { message, field },
            ServiceError::NotFound { entity, id } => CoreError::NotFound {
                entity: entity.to_string(),
                id,
            },
            ServiceError::Conflict { entity, id } => CoreError::Conflict {
                message: format!("{entity} {id} was modified concurrently"),
            },
            ServiceError::Store(inner) => CoreError::internal(inner.to_string()),
            ServiceError::Serialization(message) => CoreError::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_validation_keeps_its_field_path() {
        let err: ServiceError =
            BillingError::validation_field("card has expired", "card.exp_year").into();
        match err {
            ServiceError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("card.exp_year"));
            }
            other => panic!("expected validation, got {other}"),
        }
    }

    #[test]
    fn conflict_collapses_to_the_kernel_kind() {
        let core: CoreError = ServiceError::conflict("invoice", "inv-1").into();
        assert!(matches!(core, CoreError::Conflict { .. }));
        assert!(core.to_string().contains("inv-1"));
    }

    #[test]
    fn store_failures_become_internal() {
        let core: CoreError = ServiceError::Store(StoreError::Backend("down".into())).into();
        assert!(matches!(core, CoreError::Internal { .. }));
    }
}
