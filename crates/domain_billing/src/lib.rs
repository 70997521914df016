#![feature(int_roundings)]
//! Billing Domain - Invoice Lifecycle and Payment Methods
//!
//! This crate implements the billing ledger core entities:
//!
//! - [`Invoice`]: the invoice lifecycle state machine with monetary
//!   reconciliation (payments applied against the amount due)
//! - [`PaymentMethod`]: per-type validated payment instruments carrying the
//!   tenant-scoped default flag
//!
//! Entities here are store-agnostic and memory-only. They validate and
//! mutate themselves; persistence and cross-record invariants (the single
//! default per tenant, the method cap) are orchestrated by the service
//! layer on top of the document-store port.
//!
//! # Monetary invariants
//!
//! - `total_amount == subtotal + tax_amount - discount_amount` (±0.01)
//! - `amount_due == max(0, total_amount - amount_paid)`, always
//! - every line item satisfies `total_amount == quantity * unit_amount` (±0.01)

pub mod error;
pub mod invoice;
pub mod payment_method;

pub use error::BillingError;
pub use invoice::{Invoice, InvoiceStatus, InvoiceUpdate, LineItem, NewInvoice, NewLineItem};
pub use payment_method::{
    BankAccountDetails, CardDetails, NewPaymentMethod, PaymentMethod, PaymentMethodDetails,
    PaymentMethodKind, PaymentMethodUpdate, PaymentProvider, WalletDetails,
    MAX_PAYMENT_METHODS_PER_TENANT,
};
