//! Invoice use cases
//!
//! Writes go through optimistic concurrency: every invoice document carries
//! a `revision` field, bumped here on each write and checked by the store.
//! A caller may additionally pass the revision it last observed; a mismatch
//! on either check surfaces as [`ServiceError::Conflict`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use core_kernel::{
    BillingEvent, Clock, DocumentStore, IdGenerator, InvoiceId, NotificationDispatcher, Query,
    SortOrder, TenantId,
};
use domain_billing::{Invoice, InvoiceStatus, InvoiceUpdate, NewInvoice};

use crate::{from_document, to_document, ServiceError};

/// Store collection holding invoice documents
pub const INVOICE_COLLECTION: &str = "invoices";

/// Orchestrates the invoice lifecycle over the document store.
pub struct InvoiceService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl InvoiceService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            notifier,
        }
    }

    /// Creates and persists a new invoice.
    ///
    /// The entity factory validates the monetary identity and line items and
    /// always produces an `Open` invoice.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    pub async fn create_invoice(&self, request: NewInvoice) -> Result<Invoice, ServiceError> {
        let id = InvoiceId::from_uuid(self.ids.next_uuid());
        let now = self.clock.now();
        let invoice = Invoice::create(request, id, now)?;

        let doc = to_document(&invoice)?;
        self.store
            .set(INVOICE_COLLECTION, &invoice.id.to_string(), doc)
            .await?;

        self.notify(BillingEvent::InvoiceCreated {
            tenant_id: invoice.tenant_id,
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
        })
        .await;
        Ok(invoice)
    }

    /// Fetches a tenant's invoice by id.
    #[instrument(skip(self))]
    pub async fn get_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, ServiceError> {
        self.load(tenant_id, invoice_id).await
    }

    /// Lists a tenant's invoices, newest first, optionally narrowed to one
    /// status.
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        tenant_id: TenantId,
        status: Option<InvoiceStatus>,
    ) -> Result<Vec<Invoice>, ServiceError> {
        let mut query = Query::new()
            .filter_eq("tenant_id", tenant_id.to_string())
            .order_by("created_at", SortOrder::Descending);
        if let Some(status) = status {
            query = query.filter_eq("status", status.to_string());
        }

        let docs = self.store.query(INVOICE_COLLECTION, &query).await?;
        docs.into_iter().map(from_document).collect()
    }

    /// Applies a partial update to the mutable fields of an open invoice.
    #[instrument(skip(self, update))]
    pub async fn update_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        update: InvoiceUpdate,
        expected_revision: Option<u64>,
    ) -> Result<Invoice, ServiceError> {
        let mut invoice = self.load(tenant_id, invoice_id).await?;
        self.check_expected(&invoice, expected_revision)?;
        let now = self.clock.now();

        if let Some(due_date) = update.due_date {
            if invoice.status != InvoiceStatus::Open {
                return Err(ServiceError::validation(format!(
                    "cannot reschedule an invoice in status {}",
                    invoice.status
                )));
            }
            if due_date < invoice.created_at {
                return Err(ServiceError::Validation {
                    message: "due date must not precede invoice creation".to_string(),
                    field: Some("due_date".to_string()),
                });
            }
            invoice.due_date = due_date;
        }
        if let Some(metadata) = update.metadata {
            invoice.set_metadata(metadata);
        }
        invoice.touch(now);

        self.persist(&mut invoice).await?;
        Ok(invoice)
    }

    /// Applies a payment against the invoice.
    ///
    /// Overpayment is absorbed by the entity (the due amount clamps at
    /// zero); the invoice becomes `Paid` exactly when nothing remains due.
    /// The payment date defaults to now when the caller does not supply the
    /// settlement timestamp from an upstream processor.
    #[instrument(skip(self))]
    pub async fn record_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        amount: Decimal,
        payment_date: Option<DateTime<Utc>>,
        expected_revision: Option<u64>,
    ) -> Result<Invoice, ServiceError> {
        let mut invoice = self.load(tenant_id, invoice_id).await?;
        self.check_expected(&invoice, expected_revision)?;

        let when = payment_date.unwrap_or_else(|| self.clock.now());
        invoice.add_payment(amount, when)?;
        self.persist(&mut invoice).await?;

        if invoice.is_paid() {
            self.notify(BillingEvent::InvoicePaid {
                tenant_id: invoice.tenant_id,
                invoice_id: invoice.id,
            })
            .await;
        }
        Ok(invoice)
    }

    /// Settles an open invoice in full.
    #[instrument(skip(self))]
    pub async fn mark_invoice_paid(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        paid_at: Option<DateTime<Utc>>,
        expected_revision: Option<u64>,
    ) -> Result<Invoice, ServiceError> {
        let mut invoice = self.load(tenant_id, invoice_id).await?;
        self.check_expected(&invoice, expected_revision)?;

        let when = paid_at.unwrap_or_else(|| self.clock.now());
        invoice.mark_as_paid(when)?;
        self.persist(&mut invoice).await?;

        self.notify(BillingEvent::InvoicePaid {
            tenant_id: invoice.tenant_id,
            invoice_id: invoice.id,
        })
        .await;
        Ok(invoice)
    }

    /// Voids an invoice, optionally recording a reason in its metadata.
    ///
    /// A paid invoice can never be voided: money already moved, so the
    /// correction path is a credit note, not a void.
    #[instrument(skip(self))]
    pub async fn void_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        reason: Option<String>,
        expected_revision: Option<u64>,
    ) -> Result<Invoice, ServiceError> {
        let mut invoice = self.load(tenant_id, invoice_id).await?;
        self.check_expected(&invoice, expected_revision)?;

        if invoice.is_paid() {
            return Err(ServiceError::validation("Cannot void a paid invoice"));
        }

        let now = self.clock.now();
        invoice.mark_as_void(now)?;
        if let Some(reason) = reason {
            let mut patch = Map::new();
            patch.insert("void_reason".to_string(), Value::String(reason));
            invoice.set_metadata(patch);
        }
        self.persist(&mut invoice).await?;

        self.notify(BillingEvent::InvoiceVoided {
            tenant_id: invoice.tenant_id,
            invoice_id: invoice.id,
        })
        .await;
        Ok(invoice)
    }

    /// Records a payment attempt against the invoice; valid in any status.
    #[instrument(skip(self))]
    pub async fn record_payment_attempt(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, ServiceError> {
        let mut invoice = self.load(tenant_id, invoice_id).await?;
        let now = self.clock.now();
        invoice.increment_payment_attempt(now);
        self.persist(&mut invoice).await?;
        Ok(invoice)
    }

    /// Loads an invoice scoped to its owning tenant.
    ///
    /// A record owned by another tenant is reported as not found, never as
    /// a permission failure.
    async fn load(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, ServiceError> {
        let doc = self
            .store
            .get(INVOICE_COLLECTION, &invoice_id.to_string())
            .await?
            .ok_or_else(|| ServiceError::not_found("invoice", invoice_id))?;
        let invoice: Invoice = from_document(doc)?;
        if invoice.tenant_id != tenant_id {
            return Err(ServiceError::not_found("invoice", invoice_id));
        }
        Ok(invoice)
    }

    /// Writes the invoice back under a revision check, bumping its token.
    async fn persist(&self, invoice: &mut Invoice) -> Result<(), ServiceError> {
        let observed = invoice.revision;
        invoice.revision += 1;
        let doc = to_document(invoice)?;

        let applied = self
            .store
            .set_checked(INVOICE_COLLECTION, &invoice.id.to_string(), doc, observed)
            .await?;
        if !applied {
            return Err(ServiceError::conflict("invoice", invoice.id));
        }
        Ok(())
    }

    fn check_expected(
        &self,
        invoice: &Invoice,
        expected_revision: Option<u64>,
    ) -> Result<(), ServiceError> {
        if let Some(expected) = expected_revision {
            if expected != invoice.revision {
                return Err(ServiceError::conflict("invoice", invoice.id));
            }
        }
        Ok(())
    }

    async fn notify(&self, event: BillingEvent) {
        if let Err(err) = self.notifier.dispatch(event).await {
            warn!(error = %err, "billing event dispatch failed");
        }
    }
}
