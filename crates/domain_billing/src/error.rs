//! Billing domain errors

use thiserror::Error;

use crate::invoice::InvoiceStatus;
use core_kernel::MoneyCheckError;

/// Errors raised by entity validation and lifecycle methods
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BillingError {
    /// Input violates an invariant; carries the offending field when known
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// The invoice is not in a status that permits the operation
    #[error("cannot {action} an invoice in status {status}")]
    InvalidStatus {
        action: &'static str,
        status: InvoiceStatus,
    },
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        BillingError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// The offending field path, when known
    pub fn field_path(&self) -> Option<&str> {
        match self {
            BillingError::Validation { field, .. } => field.as_deref(),
            BillingError::InvalidStatus { .. } => None,
        }
    }
}

impl From<MoneyCheckError> for BillingError {
    fn from(err: MoneyCheckError) -> Self {
        let field = err.field().map(str::to_string);
        BillingError::Validation {
            message: err.to_string(),
            field,
        }
    }
}
