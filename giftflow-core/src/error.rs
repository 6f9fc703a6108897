use crate::entities::DonationState;
use crate::phone::InvalidPhoneNumber;
use crate::providers::ProviderError;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the donation operations.
#[derive(Debug, Error)]
pub enum DonationError {
    /// Bad input. Never retried, reported to the caller verbatim.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider refused the request as malformed. Carries the
    /// provider's own wording.
    #[error("invalid request: {0}")]
    ProviderInvalidRequest(String),

    #[error(transparent)]
    InvalidPhoneNumber(#[from] InvalidPhoneNumber),

    /// Transient provider failure; safe to retry with backoff.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("payment rejected by provider: {0}")]
    ProviderRejected(String),

    /// The user must resume or cancel this donation before starting another.
    #[error("user already has pending donation {donation_id}")]
    PendingDonationExists { donation_id: Uuid },

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("not allowed to modify donation {0}")]
    Forbidden(Uuid),

    #[error("donation {donation_id} is already {state}")]
    AlreadyTerminal {
        donation_id: Uuid,
        state: DonationState,
    },

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl DonationError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            DonationError::InvalidRequest(_) | DonationError::ProviderInvalidRequest(_) => {
                "invalid_request"
            }
            DonationError::InvalidPhoneNumber(_) => "invalid_phone_number",
            DonationError::ProviderUnavailable(_) => "provider_unavailable",
            DonationError::ProviderRejected(_) => "provider_rejected",
            DonationError::PendingDonationExists { .. } => "pending_donation_exists",
            DonationError::InvalidSignature(_) => "invalid_signature",
            DonationError::NotFound(_) => "not_found",
            DonationError::Forbidden(_) => "forbidden",
            DonationError::AlreadyTerminal { .. } => "already_terminal",
            DonationError::Store(_) => "internal",
        }
    }

    /// Message safe to show to the donor.
    ///
    /// Provider reasons are only passed through to authenticated donors.
    pub fn user_message(&self, anonymous: bool) -> String {
        match self {
            DonationError::ProviderUnavailable(_) => {
                "The payment provider is temporarily unavailable. Please try again.".to_string()
            }
            DonationError::ProviderRejected(reason) if !anonymous => {
                format!("The payment provider declined this payment: {reason}")
            }
            DonationError::ProviderRejected(_) => {
                "The payment provider declined this payment.".to_string()
            }
            DonationError::ProviderInvalidRequest(_) if anonymous => {
                "The payment provider could not process these payment details.".to_string()
            }
            DonationError::PendingDonationExists { .. } => {
                "You already have a donation in progress. Resume or cancel it first.".to_string()
            }
            DonationError::InvalidSignature(_) => "Invalid signature.".to_string(),
            DonationError::Store(_) => "Something went wrong. Please try again later.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for DonationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PendingDonationExists { donation_id } => {
                DonationError::PendingDonationExists { donation_id }
            }
            StoreError::NotFound(id) => DonationError::NotFound(format!("donation {id}")),
            other => DonationError::Store(other),
        }
    }
}

impl From<ProviderError> for DonationError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(m) => DonationError::ProviderUnavailable(m),
            ProviderError::InvalidRequest(m) => DonationError::ProviderInvalidRequest(m),
            ProviderError::MalformedPayload(m) => DonationError::InvalidRequest(m),
            ProviderError::Rejected(m) => DonationError::ProviderRejected(m),
            ProviderError::InvalidSignature(m) => DonationError::InvalidSignature(m),
        }
    }
}
