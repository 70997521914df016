//! Payment method use cases
//!
//! The two cross-record invariants live here: a tenant holds at most
//! [`MAX_PAYMENT_METHODS_PER_TENANT`] methods, and at most one of them is
//! the default. Default promotion is a single atomic batch that clears the
//! flag on every sibling and writes the promoted method, so no reader ever
//! observes two defaults or zero where one was intended.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{instrument, warn};

use core_kernel::{
    BillingEvent, Clock, DocumentStore, IdGenerator, NotificationDispatcher, PaymentMethodId,
    Query, SortOrder, TenantId, WriteBatch,
};
use domain_billing::{
    NewPaymentMethod, PaymentMethod, PaymentMethodUpdate, MAX_PAYMENT_METHODS_PER_TENANT,
};

use crate::{from_document, to_document, ServiceError};

/// Store collection holding payment method documents
pub const PAYMENT_METHOD_COLLECTION: &str = "payment_methods";

/// Manages a tenant's payment instruments.
pub struct PaymentMethodService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl PaymentMethodService {
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

    /// Validates and persists a new payment method.
    ///
    /// When the method is created as default, the write rides in the same
    /// atomic batch that demotes the tenant's previous default; a failing
    /// batch aborts the whole operation.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    pub async fn create_payment_method(
        &self,
        request: NewPaymentMethod,
    ) -> Result<PaymentMethod, ServiceError> {
        let tenant_id = request.tenant_id;
        let existing = self.list_payment_methods(tenant_id).await?;
        if existing.len() >= MAX_PAYMENT_METHODS_PER_TENANT {
            return Err(ServiceError::validation(format!(
                "a tenant may hold at most {MAX_PAYMENT_METHODS_PER_TENANT} payment methods"
            )));
        }

        let id = PaymentMethodId::from_uuid(self.ids.next_uuid());
        let now = self.clock.now();
        let method = PaymentMethod::create(request, id, now)?;

        if method.is_default {
            self.commit_default_swap(&method).await?;
        } else {
            let doc = to_document(&method)?;
            self.store
                .set(PAYMENT_METHOD_COLLECTION, &method.id.to_string(), doc)
                .await?;
        }

        self.notify(BillingEvent::PaymentMethodCreated {
            tenant_id: method.tenant_id,
            payment_method_id: method.id,
            is_default: method.is_default,
        })
        .await;
        Ok(method)
    }

    /// Fetches a tenant's payment method by id.
    #[instrument(skip(self))]
    pub async fn get_payment_method(
        &self,
        tenant_id: TenantId,
        method_id: PaymentMethodId,
    ) -> Result<PaymentMethod, ServiceError> {
        self.load(tenant_id, method_id).await
    }

    /// Lists a tenant's payment methods, oldest first.
    #[instrument(skip(self))]
    pub async fn list_payment_methods(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<PaymentMethod>, ServiceError> {
        let query = Query::new()
            .filter_eq("tenant_id", tenant_id.to_string())
            .order_by("created_at", SortOrder::Ascending);
        let docs = self.store.query(PAYMENT_METHOD_COLLECTION, &query).await?;
        docs.into_iter().map(from_document).collect()
    }

    /// The tenant's current default method, if any.
    ///
    /// A tenant with no default is a valid state; callers decide whether
    /// that blocks a charge.
    #[instrument(skip(self))]
    pub async fn default_payment_method(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<PaymentMethod>, ServiceError> {
        let docs = self
            .store
            .query(PAYMENT_METHOD_COLLECTION, &self.defaults_query(tenant_id))
            .await?;
        docs.into_iter().next().map(from_document).transpose()
    }

    /// Applies a partial update to a payment method.
    ///
    /// Replacement details are re-validated in full before anything is
    /// written. Promoting to default runs the same atomic swap as creation.
    #[instrument(skip(self, update))]
    pub async fn update_payment_method(
        &self,
        tenant_id: TenantId,
        method_id: PaymentMethodId,
        update: PaymentMethodUpdate,
    ) -> Result<PaymentMethod, ServiceError> {
        let mut method = self.load(tenant_id, method_id).await?;
        let now = self.clock.now();

        if let Some(details) = update.details {
            details.validate(now)?;
            method.details = details;
        }
        if let Some(metadata) = update.metadata {
            method.set_metadata(metadata);
        }
        method.updated_at = now;

        match update.is_default {
            Some(true) if !method.is_default => {
                method.is_default = true;
                self.commit_default_swap(&method).await?;
            }
            other => {
                if other == Some(false) {
                    method.is_default = false;
                }
                let doc = to_document(&method)?;
                self.store
                    .set(PAYMENT_METHOD_COLLECTION, &method.id.to_string(), doc)
                    .await?;
            }
        }
        Ok(method)
    }

    /// Deletes a tenant's payment method.
    ///
    /// Deleting the default leaves the tenant with none; no sibling is
    /// auto-promoted.
    #[instrument(skip(self))]
    pub async fn delete_payment_method(
        &self,
        tenant_id: TenantId,
        method_id: PaymentMethodId,
    ) -> Result<(), ServiceError> {
        let method = self.load(tenant_id, method_id).await?;
        self.store
            .delete(PAYMENT_METHOD_COLLECTION, &method.id.to_string())
            .await?;

        self.notify(BillingEvent::PaymentMethodDeleted {
            tenant_id: method.tenant_id,
            payment_method_id: method.id,
        })
        .await;
        Ok(())
    }

    async fn load(
        &self,
        tenant_id: TenantId,
        method_id: PaymentMethodId,
    ) -> Result<PaymentMethod, ServiceError> {
        let doc = self
            .store
            .get(PAYMENT_METHOD_COLLECTION, &method_id.to_string())
            .await?
            .ok_or_else(|| ServiceError::not_found("payment method", method_id))?;
        let method: PaymentMethod = from_document(doc)?;
        if method.tenant_id != tenant_id {
            return Err(ServiceError::not_found("payment method", method_id));
        }
        Ok(method)
    }

    /// Demotes every other default for the tenant and writes `method` as the
    /// new default, in one atomic batch.
    async fn commit_default_swap(&self, method: &PaymentMethod) -> Result<(), ServiceError> {
        let defaults = self
            .store
            .query(
                PAYMENT_METHOD_COLLECTION,
                &self.defaults_query(method.tenant_id),
            )
            .await?;

        let mut batch = WriteBatch::new();
        let own_id = method.id.to_string();
        for doc in defaults {
            let Some(id) = doc.get("id").and_then(Value::as_str) else {
                continue;
            };
            if id == own_id {
                continue;
            }
            let mut patch = Map::new();
            patch.insert("is_default".to_string(), Value::Bool(false));
            patch.insert(
                "updated_at".to_string(),
                serde_json::to_value(method.updated_at)?,
            );
            batch.update(PAYMENT_METHOD_COLLECTION, id, patch);
        }
        batch.set(PAYMENT_METHOD_COLLECTION, own_id, to_document(method)?);

        self.store.commit(batch).await?;
        Ok(())
    }

    fn defaults_query(&self, tenant_id: TenantId) -> Query {
        Query::new()
            .filter_eq("tenant_id", tenant_id.to_string())
            .filter_eq("is_default", true)
    }

    async fn notify(&self, event: BillingEvent) {
        if let Err(err) = self.notifier.dispatch(event).await {
            warn!(error = %err, "billing event dispatch failed");
        }
    }
}
