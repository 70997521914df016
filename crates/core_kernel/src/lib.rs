//! Core Kernel - Foundational types for the billing ledger core
//!
//! This crate provides the building blocks shared by the billing domain and
//! service layers:
//! - Monetary validation with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Port traits for the external collaborators (document store, clock,
//!   identifier generator, notification dispatcher)

pub mod error;
pub mod identifiers;
pub mod money;
pub mod ports;

pub use error::CoreError;
pub use identifiers::{InvoiceId, PaymentMethodId, SubscriptionId, TenantId};
pub use money::{ensure_non_negative, ensure_sums_to_total, Currency, MoneyCheckError, AMOUNT_TOLERANCE};
pub use ports::{
    BillingEvent, Clock, Document, DocumentStore, Filter, FilterOp, IdGenerator,
    NoopDispatcher, NotificationDispatcher, NotifyError, Query, SortOrder, StoreError,
    SystemClock, UuidGenerator, WriteBatch, WriteOp,
};
