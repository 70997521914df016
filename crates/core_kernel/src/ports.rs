//! Port traits for the external collaborators of the billing core
//!
//! The domain layer never talks to a store directly; the service layer
//! composes entities against these ports. Adapters implement them for real
//! backends, and an in-memory adapter ships in `infra_memstore` for tests
//! and embedding.
//!
//! Four collaborators are modelled:
//! - [`DocumentStore`]: per-collection CRUD, equality/range queries, and an
//!   atomic multi-document batch write
//! - [`Clock`]: current timestamp
//! - [`IdGenerator`]: identifiers for new records
//! - [`NotificationDispatcher`]: fire-and-forget billing events; failures
//!   never roll back billing state

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::identifiers::{InvoiceId, PaymentMethodId, TenantId};

/// A stored document: a flat JSON object keyed by field name.
pub type Document = serde_json::Map<String, Value>;

/// Errors raised by document store adapters
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Comparison operator for a query filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A single field filter
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Sort direction for query ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A store query: conjunctive filters, optional single-field ordering,
/// optional limit/offset.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter with an explicit operator
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Adds an equality filter
    pub fn filter_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    /// Sets the ordering field and direction
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// One operation queued in a [`WriteBatch`]
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Full document write (create or replace)
    Set {
        collection: String,
        id: String,
        data: Document,
    },
    /// Shallow patch of an existing document
    Update {
        collection: String,
        id: String,
        patch: Document,
    },
    /// Document removal
    Delete { collection: String, id: String },
}

/// A queued set of writes applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: impl Into<String>, id: impl Into<String>, data: Document) {
        self.ops.push(WriteOp::Set {
            collection: collection.into(),
            id: id.into(),
            data,
        });
    }

    pub fn update(&mut self, collection: impl Into<String>, id: impl Into<String>, patch: Document) {
        self.ops.push(WriteOp::Update {
            collection: collection.into(),
            id: id.into(),
            patch,
        });
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Consumes the batch, yielding its operations in queue order
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Abstract document store required by the billing core.
///
/// Adapters must provide per-document atomicity for every method and
/// all-or-nothing semantics for [`commit`](DocumentStore::commit): a reader
/// never observes a batch half-applied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a document by id, `None` when absent
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Runs a filtered query against a collection
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Inserts a document under a store-assigned id, returning the id
    async fn add(&self, collection: &str, data: Document) -> Result<String, StoreError>;

    /// Creates or replaces the document with the given id
    async fn set(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError>;

    /// Replaces the document only when its stored `revision` field equals
    /// `expected_revision`.
    ///
    /// Returns `Ok(false)` on a stale revision so callers can surface a
    /// conflict instead of silently clobbering a concurrent write. Errors
    /// with [`StoreError::NotFound`] when the document does not exist.
    async fn set_checked(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        expected_revision: u64,
    ) -> Result<bool, StoreError>;

    /// Shallow-merges a patch into an existing document
    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<(), StoreError>;

    /// Deletes a document; deleting an absent document is an error
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Applies every queued write atomically, or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Current-time source, injected so entities and services stay deterministic
/// under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation of [`Clock`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Identifier source for new records.
///
/// Ids are allocated before any write so that a new record can participate
/// in the same atomic batch as updates to its siblings.
pub trait IdGenerator: Send + Sync {
    fn next_uuid(&self) -> Uuid;
}

/// Random (v4) UUID implementation of [`IdGenerator`]
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Billing events emitted after successful state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    InvoiceCreated {
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        invoice_number: String,
    },
    InvoicePaid {
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    },
    InvoiceVoided {
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    },
    PaymentMethodCreated {
        tenant_id: TenantId,
        payment_method_id: PaymentMethodId,
        is_default: bool,
    },
    PaymentMethodDeleted {
        tenant_id: TenantId,
        payment_method_id: PaymentMethodId,
    },
}

/// Error from a notification dispatch attempt
#[derive(Debug, Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget event sink.
///
/// Dispatch failures are logged by the caller and never propagate: billing
/// state is already persisted by the time an event is emitted.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: BillingEvent) -> Result<(), NotifyError>;
}

/// Dispatcher that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn dispatch(&self, _event: BillingEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}
