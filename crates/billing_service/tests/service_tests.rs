//! End-to-end service tests over the in-memory store.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Map, Value};

use billing_service::{InvoiceService, PaymentMethodService, ServiceError};
use core_kernel::{BillingEvent, Clock, Currency, InvoiceId, TenantId, UuidGenerator};
use domain_billing::{
    InvoiceStatus, InvoiceUpdate, NewLineItem, PaymentMethodDetails, PaymentMethodUpdate,
    MAX_PAYMENT_METHODS_PER_TENANT,
};
use infra_memstore::MemoryStore;
use test_utils::{
    expired_card, valid_bank_account, valid_card, CommitFailingStore, FailingDispatcher,
    FixedClock, InvoiceRequestBuilder, PaymentMethodRequestBuilder, RecordingDispatcher,
};

struct Harness {
    clock: Arc<FixedClock>,
    dispatcher: Arc<RecordingDispatcher>,
    invoices: InvoiceService,
    methods: PaymentMethodService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::default());
    let ids = Arc::new(UuidGenerator);
    let dispatcher = Arc::new(RecordingDispatcher::new());
    Harness {
        clock: clock.clone(),
        dispatcher: dispatcher.clone(),
        invoices: InvoiceService::new(
            store.clone(),
            clock.clone(),
            ids.clone(),
            dispatcher.clone(),
        ),
        methods: PaymentMethodService::new(store, clock, ids, dispatcher),
    }
}

fn invoice_request(tenant_id: TenantId) -> InvoiceRequestBuilder {
    InvoiceRequestBuilder::new()
        .with_tenant_id(tenant_id)
        .with_due_date(FixedClock::default_instant() + chrono::Days::new(30))
}

mod invoice_service_tests {
    use super::*;

    #[tokio::test]
    async fn creates_an_open_invoice_with_computed_totals() {
        let h = harness();
        let tenant = TenantId::new();

        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Open);
        assert_eq!(invoice.total_amount, dec!(110.00));
        assert_eq!(invoice.amount_due, dec!(110.00));
        assert_eq!(invoice.amount_paid, Decimal::ZERO);
        assert!(invoice.invoice_number.starts_with("INV-"));

        let events = h.dispatcher.events();
        assert!(matches!(
            &events[..],
            [BillingEvent::InvoiceCreated { invoice_id, .. }] if *invoice_id == invoice.id
        ));
    }

    #[tokio::test]
    async fn create_rejects_broken_monetary_identity() {
        let h = harness();
        let request = invoice_request(TenantId::new())
            .with_line_items(vec![NewLineItem {
                description: "Plan".to_string(),
                quantity: dec!(2),
                unit_amount: dec!(30.00),
                total_amount: dec!(70.00),
            }])
            .build();

        let err = h.invoices.create_invoice(request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
        assert!(h.dispatcher.events().is_empty());
    }

    #[tokio::test]
    async fn partial_payments_accumulate_until_paid() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();

        let after_first = h
            .invoices
            .record_payment(tenant, invoice.id, dec!(50.00), None, None)
            .await
            .unwrap();
        assert_eq!(after_first.status, InvoiceStatus::Open);
        assert_eq!(after_first.amount_due, dec!(60.00));
        assert!(after_first.paid_at.is_none());

        let after_second = h
            .invoices
            .record_payment(tenant, invoice.id, dec!(60.00), None, None)
            .await
            .unwrap();
        assert_eq!(after_second.status, InvoiceStatus::Paid);
        assert_eq!(after_second.amount_due, Decimal::ZERO);
        assert_eq!(after_second.amount_paid, dec!(110.00));
        assert!(after_second.paid_at.is_some());

        let paid_events = h
            .dispatcher
            .events()
            .into_iter()
            .filter(|e| matches!(e, BillingEvent::InvoicePaid { .. }))
            .count();
        assert_eq!(paid_events, 1);
    }

    #[tokio::test]
    async fn overpayment_clamps_the_due_amount_at_zero() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();

        let paid = h
            .invoices
            .record_payment(tenant, invoice.id, dec!(200.00), None, None)
            .await
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.amount_due, Decimal::ZERO);
        assert_eq!(paid.amount_paid, dec!(200.00));
    }

    #[tokio::test]
    async fn paid_invoice_rejects_further_payments() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();
        h.invoices
            .mark_invoice_paid(tenant, invoice.id, None, None)
            .await
            .unwrap();

        let err = h
            .invoices
            .record_payment(tenant, invoice.id, dec!(10.00), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn voiding_a_paid_invoice_is_rejected() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();
        h.invoices
            .mark_invoice_paid(tenant, invoice.id, None, None)
            .await
            .unwrap();

        let err = h
            .invoices
            .void_invoice(tenant, invoice.id, None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot void a paid invoice"));

        let reloaded = h.invoices.get_invoice(tenant, invoice.id).await.unwrap();
        assert_eq!(reloaded.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn voiding_records_the_reason_and_emits_an_event() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();

        let voided = h
            .invoices
            .void_invoice(
                tenant,
                invoice.id,
                Some("duplicate charge".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(voided.status, InvoiceStatus::Void);
        assert!(voided.voided_at.is_some());
        assert_eq!(voided.metadata["void_reason"], json!("duplicate charge"));

        assert!(h
            .dispatcher
            .events()
            .iter()
            .any(|e| matches!(e, BillingEvent::InvoiceVoided { .. })));
    }

    #[tokio::test]
    async fn stale_caller_revision_surfaces_a_conflict() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();

        // First write bumps the revision past what the stale caller saw
        h.invoices
            .record_payment(tenant, invoice.id, dec!(10.00), None, Some(invoice.revision))
            .await
            .unwrap();

        let err = h
            .invoices
            .record_payment(tenant, invoice.id, dec!(10.00), None, Some(invoice.revision))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn invoices_are_invisible_across_tenants() {
        let h = harness();
        let owner = TenantId::new();
        let intruder = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(owner).build())
            .await
            .unwrap();

        let err = h
            .invoices
            .get_invoice(intruder, invoice.id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = h
            .invoices
            .record_payment(intruder, invoice.id, dec!(10.00), None, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn missing_invoice_is_not_found() {
        let h = harness();
        let err = h
            .invoices
            .get_invoice(TenantId::new(), InvoiceId::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let h = harness();
        let tenant = TenantId::new();
        let first = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();
        h.invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();
        h.invoices
            .mark_invoice_paid(tenant, first.id, None, None)
            .await
            .unwrap();

        let all = h.invoices.list_invoices(tenant, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let open = h
            .invoices
            .list_invoices(tenant, Some(InvoiceStatus::Open))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);

        let paid = h
            .invoices
            .list_invoices(tenant, Some(InvoiceStatus::Paid))
            .await
            .unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id, first.id);
    }

    #[tokio::test]
    async fn update_merges_metadata_and_reschedules() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(
                invoice_request(tenant)
                    .with_metadata_entry("source", "signup")
                    .build(),
            )
            .await
            .unwrap();

        let new_due = invoice.due_date + chrono::Days::new(15);
        let mut metadata = Map::new();
        metadata.insert("note".to_string(), Value::String("extended".to_string()));

        let updated = h
            .invoices
            .update_invoice(
                tenant,
                invoice.id,
                InvoiceUpdate {
                    due_date: Some(new_due),
                    metadata: Some(metadata),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.due_date, new_due);
        assert_eq!(updated.metadata["source"], json!("signup"));
        assert_eq!(updated.metadata["note"], json!("extended"));
        assert_eq!(updated.revision, invoice.revision + 1);
    }

    #[tokio::test]
    async fn payment_attempts_are_counted() {
        let h = harness();
        let tenant = TenantId::new();
        let invoice = h
            .invoices
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();

        h.invoices
            .record_payment_attempt(tenant, invoice.id)
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::minutes(30));
        let after = h
            .invoices
            .record_payment_attempt(tenant, invoice.id)
            .await
            .unwrap();

        assert_eq!(after.payment_attempt_count, 2);
        assert_eq!(after.last_payment_attempt, Some(h.clock.now()));
        assert_eq!(
            after.last_payment_attempt,
            Some(FixedClock::default_instant() + chrono::Duration::minutes(30))
        );
    }

    #[tokio::test]
    async fn new_invoices_use_pre_allocated_ids() {
        let store = Arc::new(MemoryStore::new());
        let ids = Arc::new(test_utils::RecordingIdGenerator::new());
        let service = InvoiceService::new(
            store,
            Arc::new(FixedClock::default()),
            ids.clone(),
            Arc::new(RecordingDispatcher::new()),
        );
        let tenant = TenantId::new();

        let invoice = service
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();
        assert_eq!(ids.issued(), vec![*invoice.id.as_uuid()]);
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_roll_back_the_write() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::default());
        let service = InvoiceService::new(
            store,
            clock.clone(),
            Arc::new(UuidGenerator),
            Arc::new(FailingDispatcher),
        );
        let tenant = TenantId::new();

        let invoice = service
            .create_invoice(invoice_request(tenant).build())
            .await
            .unwrap();
        let reloaded = service.get_invoice(tenant, invoice.id).await.unwrap();
        assert_eq!(reloaded.id, invoice.id);
    }
}

mod payment_method_service_tests {
    use super::*;

    #[tokio::test]
    async fn creates_and_fetches_a_method() {
        let h = harness();
        let tenant = TenantId::new();

        let method = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .build(),
            )
            .await
            .unwrap();
        assert!(!method.is_default);

        let fetched = h
            .methods
            .get_payment_method(tenant, method.id)
            .await
            .unwrap();
        assert_eq!(fetched.id, method.id);

        assert_eq!(h.dispatcher.event_count(), 1);
        assert!(matches!(
            &h.dispatcher.events()[..],
            [BillingEvent::PaymentMethodCreated { is_default: false, .. }]
        ));
    }

    #[tokio::test]
    async fn failed_default_swap_batch_aborts_the_create() {
        let store = Arc::new(CommitFailingStore::new(Arc::new(MemoryStore::new())));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let service = PaymentMethodService::new(
            store,
            Arc::new(FixedClock::default()),
            Arc::new(UuidGenerator),
            dispatcher.clone(),
        );
        let tenant = TenantId::new();

        let err = service
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .as_default()
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));

        // The whole create aborted: nothing persisted, no event emitted
        assert!(service.list_payment_methods(tenant).await.unwrap().is_empty());
        assert_eq!(dispatcher.event_count(), 0);
    }

    #[tokio::test]
    async fn later_default_demotes_the_earlier_one() {
        let h = harness();
        let tenant = TenantId::new();

        let first = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .as_default()
                    .build(),
            )
            .await
            .unwrap();
        let second = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .with_bank_account(valid_bank_account())
                    .as_default()
                    .build(),
            )
            .await
            .unwrap();

        let default = h
            .methods
            .default_payment_method(tenant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(default.id, second.id);

        let first_reloaded = h.methods.get_payment_method(tenant, first.id).await.unwrap();
        assert!(!first_reloaded.is_default);

        let defaults = h
            .methods
            .list_payment_methods(tenant)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.is_default)
            .count();
        assert_eq!(defaults, 1);
    }

    #[tokio::test]
    async fn update_can_promote_a_method_to_default() {
        let h = harness();
        let tenant = TenantId::new();

        let first = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .as_default()
                    .build(),
            )
            .await
            .unwrap();
        let second = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .build(),
            )
            .await
            .unwrap();

        let promoted = h
            .methods
            .update_payment_method(
                tenant,
                second.id,
                PaymentMethodUpdate {
                    is_default: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(promoted.is_default);

        let first_reloaded = h.methods.get_payment_method(tenant, first.id).await.unwrap();
        assert!(!first_reloaded.is_default);
    }

    #[tokio::test]
    async fn tenant_method_cap_is_enforced() {
        let h = harness();
        let tenant = TenantId::new();

        for _ in 0..MAX_PAYMENT_METHODS_PER_TENANT {
            h.methods
                .create_payment_method(
                    PaymentMethodRequestBuilder::new()
                        .with_tenant_id(tenant)
                        .build(),
                )
                .await
                .unwrap();
        }

        let err = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));

        let methods = h.methods.list_payment_methods(tenant).await.unwrap();
        assert_eq!(methods.len(), MAX_PAYMENT_METHODS_PER_TENANT);
    }

    #[tokio::test]
    async fn the_cap_is_per_tenant() {
        let h = harness();
        let crowded = TenantId::new();
        let fresh = TenantId::new();

        for _ in 0..MAX_PAYMENT_METHODS_PER_TENANT {
            h.methods
                .create_payment_method(
                    PaymentMethodRequestBuilder::new()
                        .with_tenant_id(crowded)
                        .build(),
                )
                .await
                .unwrap();
        }

        h.methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(fresh)
                    .build(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_card_is_rejected_with_its_field_path() {
        let h = harness();

        let err = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_card(expired_card())
                    .build(),
            )
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation { message, field } => {
                assert!(message.contains("expired"));
                assert_eq!(field.as_deref(), Some("card.exp_year"));
            }
            other => panic!("expected a validation error, got {other}"),
        }
    }

    #[tokio::test]
    async fn deleting_the_default_leaves_none() {
        let h = harness();
        let tenant = TenantId::new();

        let method = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .as_default()
                    .build(),
            )
            .await
            .unwrap();
        h.methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .build(),
            )
            .await
            .unwrap();

        h.methods
            .delete_payment_method(tenant, method.id)
            .await
            .unwrap();

        assert!(h
            .methods
            .default_payment_method(tenant)
            .await
            .unwrap()
            .is_none());
        assert!(h
            .dispatcher
            .events()
            .iter()
            .any(|e| matches!(e, BillingEvent::PaymentMethodDeleted { .. })));
    }

    #[tokio::test]
    async fn methods_are_invisible_across_tenants() {
        let h = harness();
        let owner = TenantId::new();
        let intruder = TenantId::new();

        let method = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(owner)
                    .build(),
            )
            .await
            .unwrap();

        let err = h
            .methods
            .delete_payment_method(intruder, method.id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // Still present for its owner
        h.methods.get_payment_method(owner, method.id).await.unwrap();
    }

    #[tokio::test]
    async fn update_revalidates_replacement_details() {
        let h = harness();
        let tenant = TenantId::new();
        let method = h
            .methods
            .create_payment_method(
                PaymentMethodRequestBuilder::new()
                    .with_tenant_id(tenant)
                    .build(),
            )
            .await
            .unwrap();

        let err = h
            .methods
            .update_payment_method(
                tenant,
                method.id,
                PaymentMethodUpdate {
                    details: Some(PaymentMethodDetails::Card(expired_card())),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));

        // The stored method kept its original details
        let reloaded = h.methods.get_payment_method(tenant, method.id).await.unwrap();
        assert_eq!(
            reloaded.details,
            PaymentMethodDetails::Card(valid_card())
        );
    }
}

// Currency is carried through untouched
#[tokio::test]
async fn invoice_preserves_its_currency() {
    let h = harness();
    let tenant = TenantId::new();
    let invoice = h
        .invoices
        .create_invoice(invoice_request(tenant).with_currency(Currency::EUR).build())
        .await
        .unwrap();
    let reloaded = h.invoices.get_invoice(tenant, invoice.id).await.unwrap();
    assert_eq!(reloaded.currency, Currency::EUR);
}
