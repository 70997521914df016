//! Billing use-case orchestration
//!
//! Services in this crate compose the `domain_billing` entities against the
//! `core_kernel` ports: they load documents, run entity transitions, persist
//! the result and emit events. Single-record invariants live on the entities;
//! cross-record invariants (the default-method swap, the per-tenant method
//! cap, the void-paid guard) live here, where the whole collection is
//! visible.
//!
//! Every read is scoped by tenant: a record owned by another tenant is
//! indistinguishable from a missing one.

mod error;
mod invoice_service;
mod payment_method_service;

pub use error::ServiceError;
pub use invoice_service::{InvoiceService, INVOICE_COLLECTION};
pub use payment_method_service::{PaymentMethodService, PAYMENT_METHOD_COLLECTION};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use core_kernel::Document;

/// Maps an entity to its stored document form.
pub(crate) fn to_document<T: Serialize>(entity: &T) -> Result<Document, ServiceError> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(ServiceError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Maps a stored document back to its entity.
pub(crate) fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, ServiceError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}
