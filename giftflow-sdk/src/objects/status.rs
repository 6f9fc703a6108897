//! Read-side request and response types (history, summaries, gating).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::donation::DonationResponse;
use super::rails::Currency;
use crate::signature::Signature;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListDonationsRequest {
    pub user_id: i64,
}

impl Signature for ListDonationsRequest {}

/// A user's donations, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDonationsResponse {
    pub donations: Vec<DonationResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub user_id: i64,
}

impl Signature for SummaryRequest {}

/// Paid amount in a single currency. Amounts in different currencies are
/// never added together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTotal {
    pub currency: Currency,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationSummaryResponse {
    pub user_id: i64,
    pub completed_count: u64,
    pub pending_count: u64,
    pub total_paid: Vec<CurrencyTotal>,
}

/// Request payload for the assessment-gating check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentValidityRequest {
    pub user_id: i64,
}

impl Signature for PaymentValidityRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentValidityResponse {
    pub user_id: i64,
    pub valid: bool,
}

/// Request payload for organization-wide paid totals. Carries no fields; the
/// signature alone authenticates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationTotalsRequest {}

impl Signature for OrganizationTotalsRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationTotalsResponse {
    pub totals: Vec<CurrencyTotal>,
}
