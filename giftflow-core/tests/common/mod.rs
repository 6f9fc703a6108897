#![allow(dead_code)]

use async_trait::async_trait;
use giftflow_core::engine::{EngineConfig, ReconciliationEngine};
use giftflow_core::entities::{Currency, PaymentProvider};
use giftflow_core::providers::{
    PaymentOutcome, PaymentRequest, ProviderAdapter, ProviderError, ProviderHandle, WebhookEvent,
};
use giftflow_core::store::InMemoryDonationStore;
use giftflow_sdk::objects::Continuation;
use reqwest::header::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const FAKE_SIGNATURE_HEADER: &str = "x-fake-signature";
pub const FAKE_SIGNATURE: &str = "trusted";

/// How the fake answers `create_payment`.
#[derive(Debug, Clone)]
pub enum CreateBehavior {
    Accept,
    Fail(ProviderError),
    /// Never answers in time.
    Hang,
    /// Blocks until `release()` is called, then accepts.
    WaitForRelease,
}

/// A scripted provider.
///
/// Webhooks are JSON `{"reference": "...", "outcome": "paid|failed|pending"}`
/// and are trusted only when `x-fake-signature: trusted` is present.
pub struct FakeProvider {
    provider: PaymentProvider,
    currencies: Vec<Currency>,
    behavior: Mutex<CreateBehavior>,
    statuses: Mutex<HashMap<String, PaymentOutcome>>,
    query_failure: Mutex<Option<ProviderError>>,
    release: Notify,
    pub create_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn card() -> Arc<Self> {
        Arc::new(Self::new(
            PaymentProvider::Card,
            vec![Currency::Usd, Currency::Eur, Currency::Ghs],
        ))
    }

    pub fn mobile_money() -> Arc<Self> {
        Arc::new(Self::new(
            PaymentProvider::MobileMoney,
            vec![Currency::Ghs, Currency::Eur],
        ))
    }

    fn new(provider: PaymentProvider, currencies: Vec<Currency>) -> Self {
        Self {
            provider,
            currencies,
            behavior: Mutex::new(CreateBehavior::Accept),
            statuses: Mutex::new(HashMap::new()),
            query_failure: Mutex::new(None),
            release: Notify::new(),
            create_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: CreateBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_status(&self, reference: &str, outcome: PaymentOutcome) {
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.to_string(), outcome);
    }

    /// Make every `query_status` fail with `error` until cleared.
    pub fn fail_queries(&self, error: Option<ProviderError>) {
        *self.query_failure.lock().unwrap() = error;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// The reference handed out for a donation.
    pub fn reference_for(&self, request_id: uuid::Uuid) -> String {
        match self.provider {
            PaymentProvider::Card => format!("sess_{}", request_id.simple()),
            PaymentProvider::MobileMoney => request_id.to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        self.currencies.contains(&currency)
    }

    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderHandle, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            CreateBehavior::Accept => {}
            CreateBehavior::Fail(e) => return Err(e),
            CreateBehavior::Hang => tokio::time::sleep(Duration::from_secs(3600)).await,
            CreateBehavior::WaitForRelease => self.release.notified().await,
        }
        let reference = self.reference_for(request.donation_id);
        let continuation = match self.provider {
            PaymentProvider::Card => Continuation::Redirect {
                checkout_url: format!("https://checkout.test/{reference}"),
            },
            PaymentProvider::MobileMoney => Continuation::AwaitApproval {
                transaction_id: reference.clone(),
            },
        };
        Ok(ProviderHandle {
            reference,
            continuation,
        })
    }

    async fn query_status(&self, reference: &str) -> Result<PaymentOutcome, ProviderError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.query_failure.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or(PaymentOutcome::Pending))
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, ProviderError> {
        if headers.get(FAKE_SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) != Some(FAKE_SIGNATURE)
        {
            return Err(ProviderError::InvalidSignature("untrusted".into()));
        }
        let body: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        let reference = body["reference"].as_str().unwrap_or_default().to_string();
        let outcome = match body["outcome"].as_str() {
            Some("paid") => PaymentOutcome::Paid,
            Some("failed") => PaymentOutcome::Failed {
                reason: Some("declined".into()),
            },
            _ => PaymentOutcome::Pending,
        };
        Ok(WebhookEvent {
            provider_reference: reference,
            outcome,
        })
    }
}

pub fn webhook(reference: &str, outcome: &str) -> (Vec<u8>, HeaderMap) {
    let payload = serde_json::json!({"reference": reference, "outcome": outcome})
        .to_string()
        .into_bytes();
    let mut headers = HeaderMap::new();
    headers.insert(FAKE_SIGNATURE_HEADER, HeaderValue::from_static(FAKE_SIGNATURE));
    (payload, headers)
}

pub struct Harness {
    pub engine: Arc<ReconciliationEngine>,
    pub store: InMemoryDonationStore,
    pub card: Arc<FakeProvider>,
    pub mobile_money: Arc<FakeProvider>,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig {
        provider_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    })
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let store = InMemoryDonationStore::new();
    let card = FakeProvider::card();
    let mobile_money = FakeProvider::mobile_money();
    let engine = ReconciliationEngine::new(Arc::new(store.clone()), config)
        .with_adapter(card.clone())
        .with_adapter(mobile_money.clone());
    Harness {
        engine: Arc::new(engine),
        store,
        card,
        mobile_money,
    }
}
