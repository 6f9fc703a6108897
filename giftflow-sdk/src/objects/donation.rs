//! Donation lifecycle request and response types.
//!
//! These are sent by the application backend to the Service API on behalf of
//! a donor, authenticated or anonymous.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rails::{Currency, PaymentProvider};
use crate::signature::Signature;

/// Donation state for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `giftflow-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationState {
    Pending,
    Paid,
    Cancelled,
    Failed,
}

impl DonationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DonationState::Pending)
    }
}

impl std::fmt::Display for DonationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DonationState::Pending => write!(f, "pending"),
            DonationState::Paid => write!(f, "paid"),
            DonationState::Cancelled => write!(f, "cancelled"),
            DonationState::Failed => write!(f, "failed"),
        }
    }
}

/// Who is donating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Donor {
    /// An authenticated user of the application.
    User { user_id: i64 },
    /// A donor without an account, optionally leaving a contact email.
    Anonymous {
        #[serde(default)]
        email: Option<String>,
    },
}

impl Donor {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Donor::User { user_id } => Some(*user_id),
            Donor::Anonymous { .. } => None,
        }
    }
}

/// Request payload for starting a new donation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InitiateDonationRequest {
    pub donor: Donor,
    pub amount: Decimal,
    pub currency: Currency,
    pub provider: PaymentProvider,
    #[serde(default)]
    pub message: Option<String>,
    /// Required for [`PaymentProvider::MobileMoney`]; local or international format.
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl Signature for InitiateDonationRequest {}

/// What the caller has to do next to complete the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Continuation {
    /// Send the donor to the provider's hosted checkout page.
    Redirect { checkout_url: String },
    /// The provider pushed an approval prompt to the donor's handset.
    AwaitApproval { transaction_id: String },
}

/// A donation as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationResponse {
    pub donation_id: Uuid,
    pub user_id: Option<i64>,
    pub amount: Decimal,
    pub currency: Currency,
    pub provider: PaymentProvider,
    pub provider_reference: Option<String>,
    pub state: DonationState,
    pub message: Option<String>,
    pub failure_reason: Option<String>,
    /// Unix timestamp of when the donation was created.
    pub created_at: i64,
    /// Unix timestamp of the last state transition.
    pub updated_at: i64,
}

/// Response returned after a donation was started with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateDonationResponse {
    pub donation: DonationResponse,
    pub continuation: Continuation,
    /// Capability token allowing an anonymous donor to cancel. Returned once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_token: Option<String>,
}

/// Request payload for cancelling a pending donation.
///
/// Exactly one of `user_id` (owner) or `cancel_token` (anonymous holder) is
/// expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CancelDonationRequest {
    pub donation_id: Uuid,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub cancel_token: Option<String>,
}

impl Signature for CancelDonationRequest {}

/// Request payload for checking (and reconciling) a donation by provider reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckStatusRequest {
    pub provider_reference: String,
}

impl Signature for CheckStatusRequest {}
