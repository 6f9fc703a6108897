//! Read-side queries over the donation store.
//!
//! Used by other features to decide whether a user counts as having paid,
//! and to show donation history.

use crate::entities::donation::Donation;
use crate::entities::{Currency, DonationState};
use crate::store::{DonationStore, StoreError};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// What counts as proof of payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentValidityPolicy {
    /// Any paid donation, ever.
    #[default]
    AnyPaidDonation,
    /// A paid donation created within the window.
    PaidWithin(Duration),
}

impl PaymentValidityPolicy {
    pub fn accepts(&self, donation: &Donation, now: OffsetDateTime) -> bool {
        if donation.state != DonationState::Paid {
            return false;
        }
        match self {
            PaymentValidityPolicy::AnyPaidDonation => true,
            PaymentValidityPolicy::PaidWithin(window) => donation.created_at >= now - *window,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DonationSummary {
    pub completed_count: u64,
    pub pending_count: u64,
    /// Never summed across currencies.
    pub total_paid: BTreeMap<Currency, Decimal>,
}

pub struct StatusQueryService {
    store: Arc<dyn DonationStore>,
    policy: PaymentValidityPolicy,
}

impl StatusQueryService {
    pub fn new(store: Arc<dyn DonationStore>, policy: PaymentValidityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> PaymentValidityPolicy {
        self.policy
    }

    /// Whether the user holds a paid donation under the configured policy.
    pub async fn is_payment_valid(&self, user_id: i64) -> Result<bool, StoreError> {
        self.is_payment_valid_under(user_id, self.policy).await
    }

    pub async fn is_payment_valid_under(
        &self,
        user_id: i64,
        policy: PaymentValidityPolicy,
    ) -> Result<bool, StoreError> {
        let now = OffsetDateTime::now_utc();
        let donations = self.store.list_for_user(user_id).await?;
        Ok(donations.iter().any(|d| policy.accepts(d, now)))
    }

    /// Newest first.
    pub async fn list_donations(&self, user_id: i64) -> Result<Vec<Donation>, StoreError> {
        self.store.list_for_user(user_id).await
    }

    pub async fn summary_for(&self, user_id: i64) -> Result<DonationSummary, StoreError> {
        let donations = self.store.list_for_user(user_id).await?;
        let mut summary = DonationSummary::default();
        for donation in &donations {
            match donation.state {
                DonationState::Paid => {
                    summary.completed_count += 1;
                    *summary
                        .total_paid
                        .entry(donation.currency)
                        .or_insert(Decimal::ZERO) += donation.amount;
                }
                DonationState::Pending => summary.pending_count += 1,
                DonationState::Cancelled | DonationState::Failed => {}
            }
        }
        Ok(summary)
    }

    /// Paid totals per currency over all donors, anonymous included.
    pub async fn organization_totals(&self) -> Result<BTreeMap<Currency, Decimal>, StoreError> {
        Ok(self
            .store
            .paid_totals()
            .await?
            .into_iter()
            .map(|row| (row.currency, row.total))
            .collect())
    }
}
