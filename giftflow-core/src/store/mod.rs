//! Durable record of every donation attempt.
//!
//! [`DonationStore`] is the single source of truth for donation state. Its
//! [`update`](DonationStore::update) is the only way out of `pending` and is
//! atomic: when several callers race to move the same donation, exactly one
//! gets [`TransitionOutcome::Applied`] and the others observe the terminal
//! row through [`TransitionOutcome::Rejected`].

mod memory;
mod postgres;

pub use memory::InMemoryDonationStore;
pub use postgres::PgDonationStore;

use crate::entities::donation::{CurrencyTotalRow, Donation, NewDonation, Transition};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by donation persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The user already holds a pending donation.
    #[error("user already has pending donation {donation_id}")]
    PendingDonationExists { donation_id: Uuid },

    #[error("provider reference {0} is already used by another donation")]
    DuplicateProviderReference(String),

    #[error("donation {0} already has a provider reference")]
    ReferenceAlreadySet(Uuid),

    #[error("donation {0} not found")]
    NotFound(Uuid),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

/// Result of an attempted state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The donation was `pending` and now holds the requested state.
    Applied(Donation),
    /// The donation was already terminal; carries the unchanged row.
    Rejected(Donation),
}

#[async_trait]
pub trait DonationStore: Send + Sync {
    /// Persist a new `pending` donation.
    ///
    /// For authenticated donors the existence check and the insert are one
    /// atomic step; a second pending donation for the same user fails with
    /// [`StoreError::PendingDonationExists`].
    async fn create(&self, donation: NewDonation) -> Result<Donation, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Donation>, StoreError>;

    async fn get_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Donation>, StoreError>;

    async fn get_pending_for_user(&self, user_id: i64) -> Result<Option<Donation>, StoreError>;

    /// Record the provider reference. Allowed in any state, but only once.
    async fn attach_provider_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<Donation, StoreError>;

    /// Atomically move a `pending` donation to a terminal state.
    async fn update(&self, id: Uuid, transition: Transition)
    -> Result<TransitionOutcome, StoreError>;

    /// Donations of a user, newest first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Donation>, StoreError>;

    /// Pending donations created before `cutoff`, oldest first.
    async fn list_pending_created_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError>;

    /// Paid totals per currency over every donation.
    async fn paid_totals(&self) -> Result<Vec<CurrencyTotalRow>, StoreError>;
}

fn check_transition(transition: &Transition) -> Result<(), StoreError> {
    if transition.to.is_terminal() {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition(format!(
            "cannot transition into {}",
            transition.to
        )))
    }
}
