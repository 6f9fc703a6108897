use super::{DonationStore, StoreError, TransitionOutcome, check_transition};
use crate::entities::DonationState;
use crate::entities::donation::{CurrencyTotalRow, Donation, NewDonation, Transition};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    donations: HashMap<Uuid, Donation>,
    by_reference: HashMap<String, Uuid>,
    pending_by_user: HashMap<i64, Uuid>,
}

/// A thread-safe in-memory donation store.
///
/// All indexes live behind one `RwLock`, so the pending-per-user check and
/// the insert (or the state check and the transition) happen under the same
/// write guard. Used by `--ephemeral` runs and by tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDonationStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryDonationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored donations, whatever their state.
    pub async fn len(&self) -> usize {
        self.tables.read().await.donations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DonationStore for InMemoryDonationStore {
    async fn create(&self, donation: NewDonation) -> Result<Donation, StoreError> {
        let mut tables = self.tables.write().await;
        let existing = donation
            .user_id
            .and_then(|user_id| tables.pending_by_user.get(&user_id));
        if let Some(existing) = existing {
            return Err(StoreError::PendingDonationExists {
                donation_id: *existing,
            });
        }
        let record = donation.into_pending(Uuid::now_v7(), OffsetDateTime::now_utc());
        if let Some(user_id) = record.user_id {
            tables.pending_by_user.insert(user_id, record.id);
        }
        tables.donations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Donation>, StoreError> {
        Ok(self.tables.read().await.donations.get(&id).cloned())
    }

    async fn get_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Donation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_reference
            .get(reference)
            .and_then(|id| tables.donations.get(id))
            .cloned())
    }

    async fn get_pending_for_user(&self, user_id: i64) -> Result<Option<Donation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .pending_by_user
            .get(&user_id)
            .and_then(|id| tables.donations.get(id))
            .cloned())
    }

    async fn attach_provider_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<Donation, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.by_reference.get(reference) {
            Some(owner) if *owner != id => {
                return Err(StoreError::DuplicateProviderReference(reference.to_owned()));
            }
            _ => {}
        }
        let donation = tables.donations.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if donation.provider_reference.is_some() {
            return Err(StoreError::ReferenceAlreadySet(id));
        }
        donation.provider_reference = Some(reference.to_owned());
        let updated = donation.clone();
        tables.by_reference.insert(reference.to_owned(), id);
        Ok(updated)
    }

    async fn update(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<TransitionOutcome, StoreError> {
        check_transition(&transition)?;
        let mut tables = self.tables.write().await;
        let donation = tables.donations.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if donation.state.is_terminal() {
            return Ok(TransitionOutcome::Rejected(donation.clone()));
        }
        donation.state = transition.to;
        if transition.reason.is_some() {
            donation.failure_reason = transition.reason;
        }
        donation.version += 1;
        donation.updated_at = OffsetDateTime::now_utc();
        let updated = donation.clone();
        if let Some(user_id) = updated.user_id {
            tables.pending_by_user.remove(&user_id);
        }
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Donation>, StoreError> {
        let tables = self.tables.read().await;
        let mut donations: Vec<Donation> = tables
            .donations
            .values()
            .filter(|d| d.user_id == Some(user_id))
            .cloned()
            .collect();
        donations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(donations)
    }

    async fn list_pending_created_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        let tables = self.tables.read().await;
        let mut donations: Vec<Donation> = tables
            .donations
            .values()
            .filter(|d| d.state == DonationState::Pending && d.created_at < cutoff)
            .cloned()
            .collect();
        donations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(donations)
    }

    async fn paid_totals(&self) -> Result<Vec<CurrencyTotalRow>, StoreError> {
        let tables = self.tables.read().await;
        let mut totals = BTreeMap::new();
        for donation in tables
            .donations
            .values()
            .filter(|d| d.state == DonationState::Paid)
        {
            *totals.entry(donation.currency).or_insert(Decimal::ZERO) += donation.amount;
        }
        Ok(totals
            .into_iter()
            .map(|(currency, total)| CurrencyTotalRow { currency, total })
            .collect())
    }
}
