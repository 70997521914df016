//! Request builders with sensible defaults.
//!
//! Each builder produces a valid creation request out of the box; tests
//! override only the fields they exercise.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Map, Value};

use core_kernel::{Currency, SubscriptionId, TenantId};
use domain_billing::{
    BankAccountDetails, CardDetails, NewInvoice, NewLineItem, NewPaymentMethod,
    PaymentMethodDetails, PaymentProvider, WalletDetails,
};

/// Builds a [`NewInvoice`] for a single-line invoice of 100.00 USD subtotal,
/// 20.00 tax and 10.00 discount, due in 30 days.
pub struct InvoiceRequestBuilder {
    tenant_id: TenantId,
    subscription_id: Option<SubscriptionId>,
    currency: Currency,
    subtotal: Decimal,
    tax_amount: Decimal,
    discount_amount: Decimal,
    line_items: Vec<NewLineItem>,
    due_date: DateTime<Utc>,
    metadata: Map<String, Value>,
}

impl Default for InvoiceRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceRequestBuilder {
    pub fn new() -> Self {
        Self {
            tenant_id: TenantId::new(),
            subscription_id: None,
            currency: Currency::USD,
            subtotal: dec!(100.00),
            tax_amount: dec!(20.00),
            discount_amount: dec!(10.00),
            line_items: vec![NewLineItem {
                description: "Monthly subscription".to_string(),
                quantity: dec!(1),
                unit_amount: dec!(100.00),
                total_amount: dec!(100.00),
            }],
            due_date: Utc::now() + chrono::Days::new(30),
            metadata: Map::new(),
        }
    }

    pub fn with_tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_subscription_id(mut self, subscription_id: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Sets the subtotal and replaces the line items with a single matching
    /// item, keeping the request internally consistent.
    pub fn with_subtotal(mut self, subtotal: Decimal) -> Self {
        self.subtotal = subtotal;
        self.line_items = vec![NewLineItem {
            description: "Monthly subscription".to_string(),
            quantity: dec!(1),
            unit_amount: subtotal,
            total_amount: subtotal,
        }];
        self
    }

    pub fn with_tax_amount(mut self, tax_amount: Decimal) -> Self {
        self.tax_amount = tax_amount;
        self
    }

    pub fn with_discount_amount(mut self, discount_amount: Decimal) -> Self {
        self.discount_amount = discount_amount;
        self
    }

    pub fn with_line_items(mut self, line_items: Vec<NewLineItem>) -> Self {
        self.line_items = line_items;
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> NewInvoice {
        NewInvoice {
            tenant_id: self.tenant_id,
            subscription_id: self.subscription_id,
            currency: self.currency,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            line_items: self.line_items,
            due_date: self.due_date,
            metadata: self.metadata,
        }
    }
}

/// Builds a [`NewPaymentMethod`] for a non-default Visa card expiring two
/// years out.
pub struct PaymentMethodRequestBuilder {
    tenant_id: TenantId,
    provider: PaymentProvider,
    details: PaymentMethodDetails,
    is_default: bool,
    metadata: Map<String, Value>,
}

impl Default for PaymentMethodRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentMethodRequestBuilder {
    pub fn new() -> Self {
        Self {
            tenant_id: TenantId::new(),
            provider: PaymentProvider::Stripe,
            details: PaymentMethodDetails::Card(valid_card()),
            is_default: false,
            metadata: Map::new(),
        }
    }

    pub fn with_tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_provider(mut self, provider: PaymentProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_details(mut self, details: PaymentMethodDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_card(mut self, card: CardDetails) -> Self {
        self.details = PaymentMethodDetails::Card(card);
        self
    }

    pub fn with_bank_account(mut self, bank: BankAccountDetails) -> Self {
        self.details = PaymentMethodDetails::BankAccount(bank);
        self
    }

    pub fn with_wallet(mut self, wallet: WalletDetails) -> Self {
        self.details = PaymentMethodDetails::Wallet(wallet);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> NewPaymentMethod {
        NewPaymentMethod {
            tenant_id: self.tenant_id,
            provider: self.provider,
            details: self.details,
            is_default: self.is_default,
            metadata: self.metadata,
        }
    }
}

/// A card that passes validation today
pub fn valid_card() -> CardDetails {
    CardDetails {
        brand: "visa".to_string(),
        last4: "4242".to_string(),
        exp_month: 12,
        exp_year: Utc::now().year() + 2,
    }
}

/// A card whose expiry year has already passed
pub fn expired_card() -> CardDetails {
    CardDetails {
        brand: "visa".to_string(),
        last4: "4242".to_string(),
        exp_month: 12,
        // Relative to the harness clock, not the wall clock: services
        // validate expiry against FixedClock's pinned instant.
        exp_year: crate::FixedClock::default_instant().year() - 1,
    }
}

/// A bank account that passes validation
pub fn valid_bank_account() -> BankAccountDetails {
    BankAccountDetails {
        bank_name: "First National".to_string(),
        account_type: "checking".to_string(),
        last4: "6789".to_string(),
        country: "US".to_string(),
    }
}
