use crate::entities::{Currency, DonationState, PaymentProvider};
use crate::framework::DatabaseProcessor;
use giftflow_sdk::objects::DonationResponse;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

/// A single donation attempt and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Donation {
    pub id: Uuid,
    /// `None` for anonymous donations.
    pub user_id: Option<i64>,
    pub contact_email: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub provider: PaymentProvider,
    /// Provider-assigned session/transaction id. Set at most once.
    pub provider_reference: Option<String>,
    pub state: DonationState,
    pub message: Option<String>,
    pub failure_reason: Option<String>,
    pub cancel_token_hash: Option<String>,
    /// Incremented on every state transition.
    pub version: i32,
    pub created_at: OffsetDateTime,
    /// Only changes on state transition.
    pub updated_at: OffsetDateTime,
}

impl Donation {
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

impl From<&Donation> for DonationResponse {
    fn from(d: &Donation) -> Self {
        DonationResponse {
            donation_id: d.id,
            user_id: d.user_id,
            amount: d.amount,
            currency: d.currency.into(),
            provider: d.provider.into(),
            provider_reference: d.provider_reference.clone(),
            state: d.state.into(),
            message: d.message.clone(),
            failure_reason: d.failure_reason.clone(),
            created_at: d.created_at.unix_timestamp(),
            updated_at: d.updated_at.unix_timestamp(),
        }
    }
}

/// Data for inserting a new `pending` donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDonation {
    pub user_id: Option<i64>,
    pub contact_email: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub provider: PaymentProvider,
    pub message: Option<String>,
    pub cancel_token_hash: Option<String>,
}

impl NewDonation {
    /// Materialize the row as it is first persisted.
    pub fn into_pending(self, id: Uuid, now: OffsetDateTime) -> Donation {
        Donation {
            id,
            user_id: self.user_id,
            contact_email: self.contact_email,
            amount: self.amount,
            currency: self.currency,
            provider: self.provider,
            provider_reference: None,
            state: DonationState::Pending,
            message: self.message,
            failure_reason: None,
            cancel_token_hash: self.cancel_token_hash,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A requested move out of `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: DonationState,
    /// Recorded as `failure_reason`.
    pub reason: Option<String>,
}

impl Transition {
    pub fn paid() -> Self {
        Self {
            to: DonationState::Paid,
            reason: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            to: DonationState::Cancelled,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            to: DonationState::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// Paid amount for one currency.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CurrencyTotalRow {
    pub currency: Currency,
    pub total: Decimal,
}

macro_rules! donation_columns {
    () => {
        "id, user_id, contact_email, amount, currency, provider, provider_reference, \
         state, message, failure_reason, cancel_token_hash, version, created_at, updated_at"
    };
}

/// Constraint backing the one-pending-donation-per-user rule.
pub const ONE_PENDING_PER_USER_CONSTRAINT: &str = "donations_one_pending_per_user";

/// Constraint backing provider reference uniqueness.
pub const PROVIDER_REFERENCE_CONSTRAINT: &str = "donations_provider_reference_key";

#[derive(Debug, Clone)]
/// Insert a new donation in `pending` state.
///
/// Fails with a unique violation on [`ONE_PENDING_PER_USER_CONSTRAINT`] when
/// the user already has a pending donation.
pub struct InsertDonation {
    pub id: Uuid,
    pub donation: NewDonation,
}

impl Processor<InsertDonation> for DatabaseProcessor {
    type Output = Donation;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertDonation")]
    async fn process(&self, insert: InsertDonation) -> Result<Donation, sqlx::Error> {
        let InsertDonation { id, donation } = insert;
        sqlx::query_as::<_, Donation>(concat!(
            "INSERT INTO donations \
             (id, user_id, contact_email, amount, currency, provider, message, cancel_token_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING ",
            donation_columns!()
        ))
        .bind(id)
        .bind(donation.user_id)
        .bind(donation.contact_email)
        .bind(donation.amount)
        .bind(donation.currency)
        .bind(donation.provider)
        .bind(donation.message)
        .bind(donation.cancel_token_hash)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetDonationById {
    pub id: Uuid,
}

impl Processor<GetDonationById> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDonationById")]
    async fn process(&self, query: GetDonationById) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(concat!(
            "SELECT ",
            donation_columns!(),
            " FROM donations WHERE id = $1"
        ))
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetDonationByProviderReference {
    pub reference: String,
}

impl Processor<GetDonationByProviderReference> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDonationByProviderReference")]
    async fn process(
        &self,
        query: GetDonationByProviderReference,
    ) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(concat!(
            "SELECT ",
            donation_columns!(),
            " FROM donations WHERE provider_reference = $1"
        ))
        .bind(query.reference)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetPendingDonationForUser {
    pub user_id: i64,
}

impl Processor<GetPendingDonationForUser> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPendingDonationForUser")]
    async fn process(
        &self,
        query: GetPendingDonationForUser,
    ) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(concat!(
            "SELECT ",
            donation_columns!(),
            " FROM donations WHERE user_id = $1 AND state = 'pending'"
        ))
        .bind(query.user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Record the provider reference if none is set yet.
///
/// Returns `None` when the donation does not exist or already carries a
/// reference. `updated_at` is left untouched.
pub struct SetProviderReference {
    pub id: Uuid,
    pub reference: String,
}

impl Processor<SetProviderReference> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetProviderReference")]
    async fn process(&self, update: SetProviderReference) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(concat!(
            "UPDATE donations SET provider_reference = $2 \
             WHERE id = $1 AND provider_reference IS NULL \
             RETURNING ",
            donation_columns!()
        ))
        .bind(update.id)
        .bind(update.reference)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Move a donation out of `pending`.
///
/// The `state = 'pending'` guard makes this the single atomic arbiter for
/// concurrent transitions: exactly one caller gets the row back, every other
/// caller gets `None`.
pub struct TransitionPendingDonation {
    pub id: Uuid,
    pub transition: Transition,
}

impl Processor<TransitionPendingDonation> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:TransitionPendingDonation")]
    async fn process(
        &self,
        update: TransitionPendingDonation,
    ) -> Result<Option<Donation>, sqlx::Error> {
        let TransitionPendingDonation { id, transition } = update;
        sqlx::query_as::<_, Donation>(concat!(
            "UPDATE donations \
             SET state = $2, \
                 failure_reason = COALESCE($3, failure_reason), \
                 version = version + 1, \
                 updated_at = now() \
             WHERE id = $1 AND state = 'pending' \
             RETURNING ",
            donation_columns!()
        ))
        .bind(id)
        .bind(transition.to)
        .bind(transition.reason)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// All donations of a user, newest first.
pub struct ListDonationsForUser {
    pub user_id: i64,
}

impl Processor<ListDonationsForUser> for DatabaseProcessor {
    type Output = Vec<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListDonationsForUser")]
    async fn process(&self, query: ListDonationsForUser) -> Result<Vec<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(concat!(
            "SELECT ",
            donation_columns!(),
            " FROM donations WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(query.user_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Pending donations created before `cutoff`, oldest first.
pub struct ListPendingDonationsCreatedBefore {
    pub cutoff: OffsetDateTime,
}

impl Processor<ListPendingDonationsCreatedBefore> for DatabaseProcessor {
    type Output = Vec<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListPendingDonationsCreatedBefore")]
    async fn process(
        &self,
        query: ListPendingDonationsCreatedBefore,
    ) -> Result<Vec<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(concat!(
            "SELECT ",
            donation_columns!(),
            " FROM donations WHERE state = 'pending' AND created_at < $1 ORDER BY created_at ASC"
        ))
        .bind(query.cutoff)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Sum of paid amounts per currency across all donations.
pub struct SumPaidDonationsByCurrency;

impl Processor<SumPaidDonationsByCurrency> for DatabaseProcessor {
    type Output = Vec<CurrencyTotalRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SumPaidDonationsByCurrency")]
    async fn process(
        &self,
        _: SumPaidDonationsByCurrency,
    ) -> Result<Vec<CurrencyTotalRow>, sqlx::Error> {
        sqlx::query_as::<_, CurrencyTotalRow>(
            r#"
            SELECT currency, SUM(amount) AS total
            FROM donations
            WHERE state = 'paid'
            GROUP BY currency
            ORDER BY currency
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}
