//! Payment provider adapters.
//!
//! Each rail implements [`ProviderAdapter`]. The engine only ever sees the
//! normalized [`ProviderHandle`], [`PaymentOutcome`] and [`WebhookEvent`]
//! values; everything provider-specific (wire formats, signing schemes,
//! status vocabularies) stays inside the adapter.
//!
//! - [`CardAdapter`]: hosted card checkout, redirect based, signed webhooks.
//! - [`MobileMoneyAdapter`]: push payments approved on the payer's handset,
//!   status polling plus optional signed callbacks.

pub mod card;
pub mod mobile_money;

pub use card::{CardAdapter, CardConfig};
pub use mobile_money::{MobileMoneyAdapter, MobileMoneyConfig};

use crate::entities::{Currency, PaymentProvider};
use async_trait::async_trait;
use giftflow_sdk::objects::Continuation;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors that adapters report back to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network failure or provider outage. Safe to retry.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The request can never succeed as sent (bad amount, currency, phone).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider refused the payment for a business reason.
    #[error("rejected by provider: {0}")]
    Rejected(String),

    /// A webhook failed authentication and must not be trusted.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// An authenticated webhook whose body could not be understood.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Unavailable(e.to_string())
    }
}

/// Who is paying, as far as the provider needs to know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DonorContext {
    pub user_id: Option<i64>,
    pub email: Option<String>,
    /// International format, already normalized.
    pub phone_number: Option<String>,
}

/// Everything an adapter needs to open a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Also used as the idempotency key towards the provider.
    pub donation_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub donor: DonorContext,
    pub message: Option<String>,
}

/// A provider's acknowledgement of a new payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHandle {
    pub reference: String,
    pub continuation: Continuation,
}

/// Normalized payment status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Pending,
    Paid,
    Failed { reason: Option<String> },
}

/// An authenticated provider notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub provider_reference: String,
    pub outcome: PaymentOutcome,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    fn supports_currency(&self, currency: Currency) -> bool;

    /// Open a payment. Succeeds once the provider acknowledged the request,
    /// not once the donor has paid.
    async fn create_payment(&self, request: &PaymentRequest)
    -> Result<ProviderHandle, ProviderError>;

    /// Side-effect-free status check.
    async fn query_status(&self, reference: &str) -> Result<PaymentOutcome, ProviderError>;

    /// Authenticate and decode a webhook. Fails closed with
    /// [`ProviderError::InvalidSignature`].
    fn parse_webhook(&self, payload: &[u8], headers: &HeaderMap)
    -> Result<WebhookEvent, ProviderError>;
}

/// Truncate on a char boundary.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
