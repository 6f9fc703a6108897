use super::{DonationStore, StoreError, TransitionOutcome, check_transition};
use crate::entities::donation::{
    CurrencyTotalRow, Donation, GetDonationById, GetDonationByProviderReference,
    GetPendingDonationForUser, InsertDonation, ListDonationsForUser,
    ListPendingDonationsCreatedBefore, NewDonation, ONE_PENDING_PER_USER_CONSTRAINT,
    PROVIDER_REFERENCE_CONSTRAINT, SetProviderReference, SumPaidDonationsByCurrency, Transition,
    TransitionPendingDonation,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// PostgreSQL-backed donation store.
///
/// One-pending-per-user is enforced by the `donations_one_pending_per_user`
/// partial unique index; transitions use a conditional
/// `UPDATE ... WHERE state = 'pending'`.
#[derive(Debug, Clone)]
pub struct PgDonationStore {
    processor: DatabaseProcessor,
}

impl PgDonationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            processor: DatabaseProcessor { pool },
        }
    }
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

#[async_trait]
impl DonationStore for PgDonationStore {
    async fn create(&self, donation: NewDonation) -> Result<Donation, StoreError> {
        let user_id = donation.user_id;
        let insert = InsertDonation {
            id: Uuid::now_v7(),
            donation,
        };
        match self.processor.process(insert).await {
            Ok(created) => Ok(created),
            Err(e) if violated_constraint(&e) == Some(ONE_PENDING_PER_USER_CONSTRAINT) => {
                let Some(user_id) = user_id else {
                    return Err(StoreError::Database(e));
                };
                match self
                    .processor
                    .process(GetPendingDonationForUser { user_id })
                    .await?
                {
                    Some(existing) => Err(StoreError::PendingDonationExists {
                        donation_id: existing.id,
                    }),
                    // The conflicting row settled between the insert and the lookup.
                    None => {
                        warn!(user_id, "pending donation vanished after unique violation");
                        Err(StoreError::Database(e))
                    }
                }
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Donation>, StoreError> {
        Ok(self.processor.process(GetDonationById { id }).await?)
    }

    async fn get_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Donation>, StoreError> {
        Ok(self
            .processor
            .process(GetDonationByProviderReference {
                reference: reference.to_owned(),
            })
            .await?)
    }

    async fn get_pending_for_user(&self, user_id: i64) -> Result<Option<Donation>, StoreError> {
        Ok(self
            .processor
            .process(GetPendingDonationForUser { user_id })
            .await?)
    }

    async fn attach_provider_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<Donation, StoreError> {
        let update = SetProviderReference {
            id,
            reference: reference.to_owned(),
        };
        match self.processor.process(update).await {
            Ok(Some(donation)) => Ok(donation),
            Ok(None) => match self.processor.process(GetDonationById { id }).await? {
                Some(_) => Err(StoreError::ReferenceAlreadySet(id)),
                None => Err(StoreError::NotFound(id)),
            },
            Err(e) if violated_constraint(&e) == Some(PROVIDER_REFERENCE_CONSTRAINT) => {
                Err(StoreError::DuplicateProviderReference(reference.to_owned()))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn update(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<TransitionOutcome, StoreError> {
        check_transition(&transition)?;
        let updated = self
            .processor
            .process(TransitionPendingDonation { id, transition })
            .await?;
        if let Some(donation) = updated {
            return Ok(TransitionOutcome::Applied(donation));
        }
        // Lost the race or already terminal: report the row as it stands.
        match self.processor.process(GetDonationById { id }).await? {
            Some(current) => Ok(TransitionOutcome::Rejected(current)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Donation>, StoreError> {
        Ok(self
            .processor
            .process(ListDonationsForUser { user_id })
            .await?)
    }

    async fn list_pending_created_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        Ok(self
            .processor
            .process(ListPendingDonationsCreatedBefore { cutoff })
            .await?)
    }

    async fn paid_totals(&self) -> Result<Vec<CurrencyTotalRow>, StoreError> {
        Ok(self.processor.process(SumPaidDonationsByCurrency).await?)
    }
}
