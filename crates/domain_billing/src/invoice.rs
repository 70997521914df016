//! Invoice entity and lifecycle state machine
//!
//! An invoice moves through `Open -> Paid` via payment application or
//! `Open -> Void` via voiding; `Draft` and `Uncollectible` exist as persisted
//! statuses but the creation factory always produces `Open` invoices, since
//! it is only ever supplied complete, payable data. `Paid`, `Void` and
//! `Uncollectible` are terminal.
//!
//! Invoices are financial records: they are mutated in place by lifecycle
//! methods on an owned instance and never deleted.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use core_kernel::{
    ensure_non_negative, ensure_sums_to_total, Currency, InvoiceId, SubscriptionId, TenantId,
    AMOUNT_TOLERANCE,
};

use crate::error::BillingError;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Being assembled; never produced by the creation factory
    Draft,
    /// Issued and payable
    Open,
    /// Fully paid (terminal)
    Paid,
    /// Voided (terminal)
    Void,
    /// Written off after exhausted collection (terminal)
    Uncollectible,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Open => "OPEN",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Void => "VOID",
            InvoiceStatus::Uncollectible => "UNCOLLECTIBLE",
        };
        write!(f, "{s}")
    }
}

/// One priced component of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_amount: Decimal,
    pub total_amount: Decimal,
}

/// Line item data for invoice creation
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_amount: Decimal,
    pub total_amount: Decimal,
}

/// Creation request for an invoice
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub tenant_id: TenantId,
    pub subscription_id: Option<SubscriptionId>,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub line_items: Vec<NewLineItem>,
    pub due_date: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// Partial update applied by the service layer
#[derive(Debug, Clone, Default)]
pub struct InvoiceUpdate {
    pub due_date: Option<DateTime<Utc>>,
    /// Merged into the existing metadata, not replacing it
    pub metadata: Option<Map<String, Value>>,
}

/// An invoice for a tenant's charges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub tenant_id: TenantId,
    pub subscription_id: Option<SubscriptionId>,
    /// Human-readable number, generated at creation; uniqueness is
    /// probabilistic (time + random), not structural
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub line_items: Vec<LineItem>,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub payment_attempt_count: u32,
    pub last_payment_attempt: Option<DateTime<Utc>>,
    pub metadata: Map<String, Value>,
    /// Optimistic-concurrency token; bumped by the service layer on every write
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Builds an invoice from a creation request.
    ///
    /// Validates every monetary field and line item, computes
    /// `total_amount = subtotal + tax - discount` and sets the full total as
    /// due. The factory always produces an `Open` invoice.
    ///
    /// # Errors
    ///
    /// Returns a validation error when any amount is negative, a line item
    /// is inconsistent, the line items do not sum to the subtotal, the
    /// discount exceeds subtotal plus tax, or the due date precedes creation.
    pub fn create(request: NewInvoice, id: InvoiceId, now: DateTime<Utc>) -> Result<Self, BillingError> {
        if request.line_items.is_empty() {
            return Err(BillingError::validation_field(
                "at least one line item is required",
                "line_items",
            ));
        }

        let mut line_items = Vec::with_capacity(request.line_items.len());
        for (i, item) in request.line_items.iter().enumerate() {
            validate_line_item(item, i)?;
            line_items.push(LineItem {
                id: Uuid::new_v4(),
                description: item.description.clone(),
                quantity: item.quantity,
                unit_amount: item.unit_amount,
                total_amount: item.total_amount,
            });
        }

        ensure_non_negative(request.subtotal, "subtotal")?;
        ensure_non_negative(request.tax_amount, "tax_amount")?;
        ensure_non_negative(request.discount_amount, "discount_amount")?;

        let item_totals: Vec<Decimal> = line_items.iter().map(|i| i.total_amount).collect();
        ensure_sums_to_total(&item_totals, request.subtotal, AMOUNT_TOLERANCE).map_err(|e| {
            BillingError::validation_field(
                format!("line items do not sum to subtotal: {e}"),
                "subtotal",
            )
        })?;

        let total_amount = request.subtotal + request.tax_amount - request.discount_amount;
        if total_amount < Decimal::ZERO {
            return Err(BillingError::validation_field(
                "discount exceeds subtotal plus tax",
                "discount_amount",
            ));
        }

        if request.due_date < now {
            return Err(BillingError::validation_field(
                "due date must not precede invoice creation",
                "due_date",
            ));
        }

        Ok(Self {
            id,
            tenant_id: request.tenant_id,
            subscription_id: request.subscription_id,
            invoice_number: generate_invoice_number(now),
            status: InvoiceStatus::Open,
            currency: request.currency,
            subtotal: request.subtotal,
            tax_amount: request.tax_amount,
            discount_amount: request.discount_amount,
            total_amount,
            amount_paid: Decimal::ZERO,
            amount_due: total_amount,
            line_items,
            due_date: request.due_date,
            paid_at: None,
            voided_at: None,
            payment_attempt_count: 0,
            last_payment_attempt: None,
            metadata: request.metadata,
            revision: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Settles the invoice in full: `Open -> Paid`, amount paid becomes the
    /// total and nothing remains due.
    pub fn mark_as_paid(&mut self, paid_at: DateTime<Utc>) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Open {
            return Err(BillingError::InvalidStatus {
                action: "mark as paid",
                status: self.status,
            });
        }
        validate_event_date(paid_at, self.created_at, "paid_at")?;

        self.amount_paid = self.total_amount;
        self.amount_due = Decimal::ZERO;
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(paid_at);
        self.updated_at = paid_at;
        Ok(())
    }

    /// Applies a payment against the amount due.
    ///
    /// The due amount is clamped at zero: overpayment is silently absorbed,
    /// never rejected or refunded. The invoice becomes `Paid` exactly when
    /// the due amount first reaches zero.
    pub fn add_payment(
        &mut self,
        amount: Decimal,
        payment_date: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        if !self.can_be_paid() {
            return Err(BillingError::InvalidStatus {
                action: "apply a payment to",
                status: self.status,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(BillingError::validation_field(
                "payment amount must be positive",
                "amount",
            ));
        }
        validate_event_date(payment_date, self.created_at, "payment_date")?;

        self.amount_paid += amount;
        self.amount_due = (self.total_amount - self.amount_paid).max(Decimal::ZERO);
        if self.amount_due.is_zero() {
            self.status = InvoiceStatus::Paid;
            self.paid_at = Some(payment_date);
        }
        self.updated_at = payment_date;
        Ok(())
    }

    /// Voids the invoice.
    ///
    /// The "must not be paid" precondition is enforced by the service layer,
    /// not here: it depends on cross-cutting context the entity does not own.
    pub fn mark_as_void(&mut self, voided_at: DateTime<Utc>) -> Result<(), BillingError> {
        validate_event_date(voided_at, self.created_at, "voided_at")?;
        self.status = InvoiceStatus::Void;
        self.voided_at = Some(voided_at);
        self.updated_at = voided_at;
        Ok(())
    }

    /// Records a payment attempt; valid in any status
    pub fn increment_payment_attempt(&mut self, now: DateTime<Utc>) {
        self.payment_attempt_count += 1;
        self.last_payment_attempt = Some(now);
        self.updated_at = now;
    }

    /// Shallow-merges the patch into the metadata bag
    pub fn set_metadata(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.metadata.insert(key, value);
        }
    }

    /// Bumps the updated timestamp without other changes
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// Open with a positive amount due
    pub fn can_be_paid(&self) -> bool {
        self.status == InvoiceStatus::Open && self.amount_due > Decimal::ZERO
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Open && self.due_date < now
    }

    /// Whole days elapsed since the due date, rounded up; 0 when not overdue
    pub fn days_overdue(&self, now: DateTime<Utc>) -> u32 {
        if !self.is_overdue(now) {
            return 0;
        }
        let elapsed_secs = (now - self.due_date).num_seconds();
        if elapsed_secs <= 0 {
            return 0;
        }
        elapsed_secs.div_ceil(86_400) as u32
    }
}

fn validate_line_item(item: &NewLineItem, index: usize) -> Result<(), BillingError> {
    if item.quantity <= Decimal::ZERO {
        return Err(BillingError::validation_field(
            "quantity must be positive",
            format!("line_items[{index}].quantity"),
        ));
    }
    ensure_non_negative(item.unit_amount, &format!("line_items[{index}].unit_amount"))?;
    ensure_non_negative(item.total_amount, &format!("line_items[{index}].total_amount"))?;
    ensure_sums_to_total(
        &[item.quantity * item.unit_amount],
        item.total_amount,
        AMOUNT_TOLERANCE,
    )
    .map_err(|_| {
        BillingError::validation_field(
            "total must equal quantity times unit amount",
            format!("line_items[{index}].total_amount"),
        )
    })?;
    Ok(())
}

fn validate_event_date(
    date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    field: &str,
) -> Result<(), BillingError> {
    if date < created_at {
        return Err(BillingError::validation_field(
            format!("{field} must not precede invoice creation"),
            field,
        ));
    }
    Ok(())
}

/// Generates an invoice number of the form
/// `INV-<year><month>-<6-digit-timestamp-suffix>-<3-char-random>`.
///
/// Collisions are astronomically unlikely, not structurally prevented.
fn generate_invoice_number(now: DateTime<Utc>) -> String {
    let stamp = now.timestamp_millis().unsigned_abs() % 1_000_000;
    let random: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(3)
        .collect::<String>()
        .to_uppercase();
    format!("INV-{:04}{:02}-{:06}-{}", now.year(), now.month(), stamp, random)
}
