//! Payment method entity and per-type validation
//!
//! A payment method carries exactly one detail block matching its type;
//! the serde-tagged [`PaymentMethodDetails`] enum makes that structural
//! rather than checked. Validation is all-or-nothing and runs before any
//! persistence.
//!
//! Cross-record invariants (a tenant holds at most one default method and
//! at most [`MAX_PAYMENT_METHODS_PER_TENANT`] methods in total) are enforced
//! by the service layer, which can see the tenant's whole collection.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use core_kernel::{PaymentMethodId, TenantId};

use crate::error::BillingError;

/// Hard cap on stored methods per tenant
pub const MAX_PAYMENT_METHODS_PER_TENANT: usize = 5;

/// Upstream provider the method is vaulted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Stripe,
    Braintree,
    Adyen,
    Manual,
}

/// The method type, derived from which detail block is populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    Card,
    BankAccount,
    Wallet,
}

impl fmt::Display for PaymentMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentMethodKind::Card => "card",
            PaymentMethodKind::BankAccount => "bank_account",
            PaymentMethodKind::Wallet => "wallet",
        };
        write!(f, "{s}")
    }
}

/// Card detail block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: i32,
}

/// Bank account detail block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountDetails {
    pub bank_name: String,
    pub account_type: String,
    pub last4: String,
    pub country: String,
}

/// Wallet detail block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDetails {
    pub wallet_type: String,
    pub email: Option<String>,
}

/// Exactly one detail block, tagged by method type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethodDetails {
    Card(CardDetails),
    BankAccount(BankAccountDetails),
    Wallet(WalletDetails),
}

impl PaymentMethodDetails {
    pub fn kind(&self) -> PaymentMethodKind {
        match self {
            PaymentMethodDetails::Card(_) => PaymentMethodKind::Card,
            PaymentMethodDetails::BankAccount(_) => PaymentMethodKind::BankAccount,
            PaymentMethodDetails::Wallet(_) => PaymentMethodKind::Wallet,
        }
    }

    /// Runs type-specific validation against the current time.
    ///
    /// All-or-nothing: the first invalid field fails the whole method with
    /// its field path.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), BillingError> {
        match self {
            PaymentMethodDetails::Card(card) => card.validate(now.year()),
            PaymentMethodDetails::BankAccount(bank) => bank.validate(),
            PaymentMethodDetails::Wallet(wallet) => wallet.validate(),
        }
    }
}

impl CardDetails {
    fn validate(&self, current_year: i32) -> Result<(), BillingError> {
        require_present(&self.brand, "card.brand")?;
        if !is_four_digits(&self.last4) {
            return Err(BillingError::validation_field(
                "last4 must be exactly 4 digits",
                "card.last4",
            ));
        }
        if !(1..=12).contains(&self.exp_month) {
            return Err(BillingError::validation_field(
                "expiration month must be between 1 and 12",
                "card.exp_month",
            ));
        }
        // An earlier year fails regardless of the month
        if self.exp_year < current_year {
            return Err(BillingError::validation_field(
                "card has expired",
                "card.exp_year",
            ));
        }
        Ok(())
    }
}

impl BankAccountDetails {
    fn validate(&self) -> Result<(), BillingError> {
        require_present(&self.bank_name, "bank_account.bank_name")?;
        require_present(&self.account_type, "bank_account.account_type")?;
        require_present(&self.country, "bank_account.country")?;
        if !is_four_digits(&self.last4) {
            return Err(BillingError::validation_field(
                "last4 must be exactly 4 digits",
                "bank_account.last4",
            ));
        }
        Ok(())
    }
}

impl WalletDetails {
    fn validate(&self) -> Result<(), BillingError> {
        require_present(&self.wallet_type, "wallet.type")?;
        if let Some(email) = &self.email {
            if !is_basic_email(email) {
                return Err(BillingError::validation_field(
                    "email address is not valid",
                    "wallet.email",
                ));
            }
        }
        Ok(())
    }
}

fn require_present(value: &str, field: &str) -> Result<(), BillingError> {
    if value.trim().is_empty() {
        return Err(BillingError::validation_field(
            format!("{field} is required"),
            field,
        ));
    }
    Ok(())
}

fn is_four_digits(s: &str) -> bool {
    s.len() == 4 && s.chars().all(|c| c.is_ascii_digit())
}

/// Basic `local@domain.tld` shape; not RFC 5322
fn is_basic_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

/// Creation request for a payment method
#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub tenant_id: TenantId,
    pub provider: PaymentProvider,
    pub details: PaymentMethodDetails,
    pub is_default: bool,
    pub metadata: Map<String, Value>,
}

/// Partial update applied by the service layer
#[derive(Debug, Clone, Default)]
pub struct PaymentMethodUpdate {
    pub is_default: Option<bool>,
    /// Replaces the detail block; re-validated before persistence
    pub details: Option<PaymentMethodDetails>,
    /// Merged into the existing metadata, not replacing it
    pub metadata: Option<Map<String, Value>>,
}

/// A tenant-owned payment instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub tenant_id: TenantId,
    pub provider: PaymentProvider,
    pub details: PaymentMethodDetails,
    /// At most one method per tenant carries this flag
    pub is_default: bool,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentMethod {
    /// Builds a payment method from a creation request, running the
    /// type-specific validation first.
    pub fn create(
        request: NewPaymentMethod,
        id: PaymentMethodId,
        now: DateTime<Utc>,
    ) -> Result<Self, BillingError> {
        request.details.validate(now)?;
        Ok(Self {
            id,
            tenant_id: request.tenant_id,
            provider: request.provider,
            details: request.details,
            is_default: request.is_default,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn kind(&self) -> PaymentMethodKind {
        self.details.kind()
    }

    /// Shallow-merges the patch into the metadata bag
    pub fn set_metadata(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.metadata.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_card() -> CardDetails {
        CardDetails {
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: Utc::now().year() + 2,
        }
    }

    #[test]
    fn card_validation_accepts_valid_card() {
        assert!(PaymentMethodDetails::Card(valid_card())
            .validate(Utc::now())
            .is_ok());
    }

    #[test]
    fn card_expired_regardless_of_month() {
        let mut card = valid_card();
        card.exp_year = Utc::now().year() - 1;
        card.exp_month = 12;
        let err = PaymentMethodDetails::Card(card)
            .validate(Utc::now())
            .unwrap_err();
        assert_eq!(err.field_path(), Some("card.exp_year"));
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn card_last4_must_be_digits() {
        let mut card = valid_card();
        card.last4 = "42a2".to_string();
        let err = PaymentMethodDetails::Card(card)
            .validate(Utc::now())
            .unwrap_err();
        assert_eq!(err.field_path(), Some("card.last4"));
    }

    #[test]
    fn wallet_email_shape() {
        assert!(is_basic_email("user@example.com"));
        assert!(is_basic_email("a.b@sub.example.co"));
        assert!(!is_basic_email("no-at-sign"));
        assert!(!is_basic_email("@example.com"));
        assert!(!is_basic_email("user@nodot"));
        assert!(!is_basic_email("user@dot."));
        assert!(!is_basic_email("sp ace@example.com"));
    }

    #[test]
    fn details_serde_tag_matches_kind() {
        let details = PaymentMethodDetails::Wallet(WalletDetails {
            wallet_type: "apple_pay".to_string(),
            email: None,
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "wallet");
        let back: PaymentMethodDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), PaymentMethodKind::Wallet);
    }
}
