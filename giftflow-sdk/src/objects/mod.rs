pub mod donation;
pub mod rails;
pub mod status;

pub use donation::{
    CancelDonationRequest, CheckStatusRequest, Continuation, DonationResponse, DonationState,
    Donor, InitiateDonationRequest, InitiateDonationResponse,
};
pub use rails::{Currency, PaymentProvider};
pub use status::{
    CurrencyTotal, DonationSummaryResponse, ListDonationsRequest, ListDonationsResponse,
    OrganizationTotalsRequest, OrganizationTotalsResponse, PaymentValidityRequest,
    PaymentValidityResponse, SummaryRequest,
};

/// Error body returned by every Service API endpoint on failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Stable, machine-readable error kind (e.g. `pending_donation_exists`).
    pub kind: String,
    /// Human-readable message, safe to show to the donor.
    pub message: String,
    /// Present for `pending_donation_exists`, so the caller can offer
    /// "resume or cancel".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<uuid::Uuid>,
}
