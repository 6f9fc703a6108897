//! Donation lifecycle orchestration.
//!
//! The [`ReconciliationEngine`] owns every write to donation state. It opens
//! payments with the provider adapters, ingests their webhooks, polls them,
//! and handles cancellation. It holds no state of its own between calls:
//! concurrent operations on the same donation are arbitrated by
//! [`DonationStore::update`], and whichever transition reaches the store first
//! wins.
//!
//! ```text
//!            ┌──────► paid
//! pending ───┼──────► cancelled
//!            └──────► failed
//! ```

use crate::entities::donation::{Donation, NewDonation, Transition};
use crate::entities::{Currency, DonationState, PaymentProvider};
use crate::error::DonationError;
use crate::phone::PhoneNumberRules;
use crate::providers::{
    DonorContext, PaymentOutcome, PaymentRequest, ProviderAdapter, ProviderError, ProviderHandle,
};
use crate::store::{DonationStore, TransitionOutcome};
use giftflow_sdk::objects::Continuation;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound for a single provider call.
    pub provider_timeout: Duration,
    pub phone_rules: PhoneNumberRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(20),
            phone_rules: PhoneNumberRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DonorIdentity {
    User(i64),
    Anonymous { email: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateDonation {
    pub donor: DonorIdentity,
    pub amount: Decimal,
    pub currency: Currency,
    pub provider: PaymentProvider,
    pub message: Option<String>,
    /// Required for mobile money, in local or international format.
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedDonation {
    pub donation: Donation,
    pub continuation: Continuation,
    /// Only for anonymous donations. Not recoverable later.
    pub cancel_token: Option<String>,
}

/// Who is asking to cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAuthority {
    /// The owning user.
    User(i64),
    /// Holder of the capability token issued for an anonymous donation.
    Token(String),
}

/// What a provider notification did to the stored donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    Applied(Donation),
    /// The donation was already terminal; nothing changed.
    AlreadyTerminal(Donation),
    /// Not one of ours, dropped.
    UnknownReference(String),
    /// The provider still reports the payment as in progress.
    StillPending(Donation),
}

pub struct ReconciliationEngine {
    store: Arc<dyn DonationStore>,
    adapters: HashMap<PaymentProvider, Arc<dyn ProviderAdapter>>,
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn DonationStore>, config: EngineConfig) -> Self {
        Self {
            store,
            adapters: HashMap::new(),
            config,
        }
    }

    /// Register the adapter for its rail, replacing any previous one.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn store(&self) -> &Arc<dyn DonationStore> {
        &self.store
    }

    fn adapter(&self, provider: PaymentProvider) -> Result<&Arc<dyn ProviderAdapter>, DonationError> {
        self.adapters.get(&provider).ok_or_else(|| {
            DonationError::InvalidRequest(format!("payment provider {provider} is not enabled"))
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Unavailable(format!(
                "no response within {}ms",
                self.config.provider_timeout.as_millis()
            ))),
        }
    }

    /// Start a donation.
    ///
    /// The pending row is created before the provider is contacted so the
    /// per-user slot is reserved atomically. If the provider call fails or
    /// times out the row is moved to `failed` with the reason, which frees
    /// the slot and keeps the attempt for audit.
    #[tracing::instrument(skip_all, fields(provider = %request.provider, currency = %request.currency))]
    pub async fn initiate(
        &self,
        request: InitiateDonation,
    ) -> Result<InitiatedDonation, DonationError> {
        if request.amount <= Decimal::ZERO {
            return Err(DonationError::InvalidRequest(
                "amount must be greater than zero".into(),
            ));
        }
        if request.currency.to_minor_units(request.amount).is_none() {
            return Err(DonationError::InvalidRequest(format!(
                "amount {} has more precision than {} allows",
                request.amount, request.currency
            )));
        }
        let adapter = Arc::clone(self.adapter(request.provider)?);
        if !adapter.supports_currency(request.currency) {
            return Err(DonationError::InvalidRequest(format!(
                "{} does not accept {}",
                request.provider, request.currency
            )));
        }
        let phone_number = match request.provider {
            PaymentProvider::MobileMoney => {
                let raw = request.phone_number.as_deref().ok_or_else(|| {
                    DonationError::InvalidRequest(
                        "a phone number is required for mobile money".into(),
                    )
                })?;
                Some(self.config.phone_rules.normalize(raw)?)
            }
            PaymentProvider::Card => None,
        };

        let (user_id, email) = match &request.donor {
            DonorIdentity::User(user_id) => (Some(*user_id), None),
            DonorIdentity::Anonymous { email } => (None, email.clone()),
        };
        if let Some(user_id) = user_id {
            // Fast path; `create` enforces the limit atomically.
            if let Some(existing) = self.store.get_pending_for_user(user_id).await? {
                debug!(user_id, donation_id = %existing.id, "User already has a pending donation");
                return Err(DonationError::PendingDonationExists {
                    donation_id: existing.id,
                });
            }
        }

        let cancel_token = user_id.is_none().then(generate_cancel_token);
        let donation = self
            .store
            .create(NewDonation {
                user_id,
                contact_email: email.clone(),
                amount: request.amount,
                currency: request.currency,
                provider: request.provider,
                message: request.message.clone(),
                cancel_token_hash: cancel_token.as_deref().map(hash_cancel_token),
            })
            .await?;
        info!(donation_id = %donation.id, user_id = ?user_id, amount = %donation.amount, "Donation created");

        let payment = PaymentRequest {
            donation_id: donation.id,
            amount: donation.amount,
            currency: donation.currency,
            donor: DonorContext {
                user_id,
                email,
                phone_number,
            },
            message: request.message,
        };
        let handle = match self.bounded(adapter.create_payment(&payment)).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(donation_id = %donation.id, error = %e, "Provider did not accept the payment");
                self.fail_quietly(donation.id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        let ProviderHandle {
            reference,
            continuation,
        } = handle;
        let donation = match self
            .store
            .attach_provider_reference(donation.id, &reference)
            .await
        {
            Ok(donation) => donation,
            Err(e) => {
                error!(donation_id = %donation.id, reference = %reference, error = %e, "Failed to record provider reference");
                self.fail_quietly(donation.id, "provider reference could not be recorded")
                    .await;
                return Err(e.into());
            }
        };

        if donation.state.is_terminal() {
            // Cancelled while the provider call was in flight. The reference
            // is kept so late webhooks are recognised and dropped.
            info!(donation_id = %donation.id, state = %donation.state, "Donation settled before the provider acknowledged");
            return Err(DonationError::AlreadyTerminal {
                donation_id: donation.id,
                state: donation.state,
            });
        }

        info!(donation_id = %donation.id, reference = %reference, "Payment opened with provider");
        Ok(InitiatedDonation {
            donation,
            continuation,
            cancel_token,
        })
    }

    async fn fail_quietly(&self, id: Uuid, reason: &str) {
        match self.store.update(id, Transition::failed(reason)).await {
            Ok(TransitionOutcome::Applied(d)) => {
                info!(donation_id = %d.id, from = %DonationState::Pending, to = %d.state, "Donation transitioned");
            }
            Ok(TransitionOutcome::Rejected(d)) => {
                debug!(donation_id = %d.id, state = %d.state, "Donation already terminal, not marking failed");
            }
            Err(e) => {
                error!(donation_id = %id, error = %e, "Failed to mark donation as failed");
            }
        }
    }

    /// Ingest a provider notification.
    ///
    /// Unauthenticated payloads never touch a donation. Deliveries for
    /// unknown references or for donations that are already terminal are
    /// dropped, so repeated deliveries are harmless.
    #[tracing::instrument(skip_all, fields(provider = %provider))]
    pub async fn handle_webhook(
        &self,
        provider: PaymentProvider,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookDisposition, DonationError> {
        let adapter = self.adapter(provider)?;
        let event = match adapter.parse_webhook(payload, headers) {
            Ok(event) => event,
            Err(ProviderError::InvalidSignature(reason)) => {
                error!(%provider, reason = %reason, "Rejected webhook with invalid signature");
                return Err(DonationError::InvalidSignature(reason));
            }
            Err(e) => {
                warn!(%provider, error = %e, "Rejected malformed webhook");
                return Err(e.into());
            }
        };
        self.apply_outcome(&event.provider_reference, event.outcome)
            .await
    }

    /// Ask the provider for the current status and apply it.
    ///
    /// Terminal donations are returned as stored without contacting the
    /// provider. A still-pending result is not an error.
    #[tracing::instrument(skip_all, fields(reference = %reference))]
    pub async fn poll_status(&self, reference: &str) -> Result<Donation, DonationError> {
        let donation = self
            .store
            .get_by_provider_reference(reference)
            .await?
            .ok_or_else(|| DonationError::NotFound(format!("provider reference {reference}")))?;
        if donation.state.is_terminal() {
            return Ok(donation);
        }
        let adapter = Arc::clone(self.adapter(donation.provider)?);
        let outcome = self.bounded(adapter.query_status(reference)).await?;
        match self.apply_outcome(reference, outcome).await? {
            WebhookDisposition::UnknownReference(_) => Ok(donation),
            WebhookDisposition::Applied(d)
            | WebhookDisposition::AlreadyTerminal(d)
            | WebhookDisposition::StillPending(d) => Ok(d),
        }
    }

    async fn apply_outcome(
        &self,
        reference: &str,
        outcome: PaymentOutcome,
    ) -> Result<WebhookDisposition, DonationError> {
        let Some(donation) = self.store.get_by_provider_reference(reference).await? else {
            info!(reference = %reference, "No donation for provider reference, dropping");
            return Ok(WebhookDisposition::UnknownReference(reference.to_owned()));
        };

        let transition = match outcome {
            PaymentOutcome::Pending => {
                debug!(donation_id = %donation.id, "Provider reports payment still pending");
                return Ok(if donation.state.is_terminal() {
                    WebhookDisposition::AlreadyTerminal(donation)
                } else {
                    WebhookDisposition::StillPending(donation)
                });
            }
            PaymentOutcome::Paid => Transition::paid(),
            PaymentOutcome::Failed { reason } => {
                Transition::failed(reason.unwrap_or_else(|| "payment failed".to_string()))
            }
        };

        if donation.state.is_terminal() {
            log_late_outcome(&donation, transition.to);
            return Ok(WebhookDisposition::AlreadyTerminal(donation));
        }

        let target = transition.to;
        match self.store.update(donation.id, transition).await? {
            TransitionOutcome::Applied(d) => {
                info!(donation_id = %d.id, from = %DonationState::Pending, to = %d.state, "Donation transitioned");
                Ok(WebhookDisposition::Applied(d))
            }
            TransitionOutcome::Rejected(current) => {
                log_late_outcome(&current, target);
                Ok(WebhookDisposition::AlreadyTerminal(current))
            }
        }
    }

    /// Cancel a pending donation on behalf of its owner.
    ///
    /// Losing a race against a concurrent settlement is not an error: the
    /// donation is returned in whatever state won.
    #[tracing::instrument(skip_all, fields(donation_id = %id))]
    pub async fn cancel(
        &self,
        id: Uuid,
        authority: CancelAuthority,
    ) -> Result<Donation, DonationError> {
        let donation = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| DonationError::NotFound(format!("donation {id}")))?;

        let authorized = match (&authority, donation.user_id) {
            (CancelAuthority::User(requester), Some(owner)) => *requester == owner,
            (CancelAuthority::Token(token), None) => donation
                .cancel_token_hash
                .as_deref()
                .is_some_and(|stored| stored == hash_cancel_token(token)),
            _ => false,
        };
        if !authorized {
            warn!(donation_id = %id, "Cancellation refused");
            return Err(DonationError::Forbidden(id));
        }
        if donation.state.is_terminal() {
            return Err(DonationError::AlreadyTerminal {
                donation_id: id,
                state: donation.state,
            });
        }

        match self.store.update(id, Transition::cancelled()).await? {
            TransitionOutcome::Applied(d) => {
                info!(donation_id = %d.id, from = %DonationState::Pending, to = %d.state, "Donation transitioned");
                Ok(d)
            }
            TransitionOutcome::Rejected(current) => {
                info!(donation_id = %id, state = %current.state, "Cancellation lost the race, keeping settled state");
                Ok(current)
            }
        }
    }

    /// Give up on a pending donation (`pending → failed`). No-op on terminal
    /// donations.
    pub async fn expire(&self, id: Uuid, reason: &str) -> Result<TransitionOutcome, DonationError> {
        let outcome = self.store.update(id, Transition::failed(reason)).await?;
        match &outcome {
            TransitionOutcome::Applied(d) => {
                info!(donation_id = %d.id, from = %DonationState::Pending, to = %d.state, reason, "Donation transitioned");
            }
            TransitionOutcome::Rejected(d) => {
                debug!(donation_id = %d.id, state = %d.state, "Donation already terminal, not expiring");
            }
        }
        Ok(outcome)
    }

    pub async fn get(&self, id: Uuid) -> Result<Donation, DonationError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| DonationError::NotFound(format!("donation {id}")))
    }
}

fn log_late_outcome(donation: &Donation, wanted: DonationState) {
    if donation.state == wanted {
        debug!(donation_id = %donation.id, state = %donation.state, "Duplicate provider outcome ignored");
    } else {
        warn!(
            donation_id = %donation.id,
            state = %donation.state,
            reported = %wanted,
            "Provider outcome conflicts with terminal donation, discarded"
        );
    }
}

/// A fresh 256-bit capability token.
fn generate_cancel_token() -> String {
    let bytes: [u8; 32] = rand::random();
    fast32::base64::RFC4648_NOPAD.encode(&bytes)
}

/// Only this hash is persisted.
pub fn hash_cancel_token(token: &str) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, token.as_bytes());
    fast32::base64::RFC4648_NOPAD.encode(digest.as_ref())
}
