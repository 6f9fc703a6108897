//! Hosted card checkout adapter.
//!
//! Payments are opened as checkout sessions: the donor is redirected to the
//! gateway's hosted page and the gateway reports the result through a signed
//! webhook (`Card-Signature: t={unix},v1={base64 hmac}`). Sessions can also
//! be polled.

use super::{
    PaymentOutcome, PaymentRequest, ProviderAdapter, ProviderError, ProviderHandle, WebhookEvent,
    truncate,
};
use crate::entities::{Currency, PaymentProvider};
use async_trait::async_trait;
use giftflow_sdk::objects::Continuation;
use giftflow_sdk::signature::{check_timestamp, decode_signature, verify_payload};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Maximum length of the donor message forwarded as session metadata.
const MAX_METADATA_MESSAGE: usize = 500;

#[derive(Debug, Clone)]
pub struct CardConfig {
    pub api_base: Url,
    pub secret_key: String,
    pub webhook_secret: String,
    /// Where the gateway sends the donor after paying.
    pub success_url: String,
    /// Where the gateway sends the donor after abandoning checkout.
    pub cancel_url: String,
    pub currencies: Vec<Currency>,
}

pub struct CardAdapter {
    config: CardConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayError,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardEvent {
    #[serde(rename = "type")]
    kind: String,
    data: CardEventData,
}

#[derive(Debug, Deserialize)]
struct CardEventData {
    object: CheckoutSession,
}

impl CardAdapter {
    pub const SIGNATURE_HEADER: &'static str = "card-signature";

    pub fn new(config: CardConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(config, http_client)
    }

    pub fn with_client(config: CardConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/v1/checkout/sessions",
            self.config.api_base.as_str().trim_end_matches('/')
        )
    }

    fn form_for(&self, request: &PaymentRequest) -> Result<Vec<(String, String)>, ProviderError> {
        let unit_amount = request
            .currency
            .to_minor_units(request.amount)
            .ok_or_else(|| {
                ProviderError::InvalidRequest(format!(
                    "amount {} is not representable in {}",
                    request.amount, request.currency
                ))
            })?;
        let donation_id = request.donation_id.to_string();
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            (
                "line_items[0][price_data][currency]".into(),
                request.currency.code_lowercase().into(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                "Donation".into(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            ("success_url".into(), self.config.success_url.clone()),
            ("cancel_url".into(), self.config.cancel_url.clone()),
            ("client_reference_id".into(), donation_id.clone()),
            ("metadata[donation_id]".into(), donation_id),
            ("metadata[purpose]".into(), "donation".into()),
        ];
        match (request.donor.user_id, &request.donor.email) {
            (Some(user_id), _) => form.push(("metadata[user_id]".into(), user_id.to_string())),
            (None, Some(email)) => form.push(("customer_email".into(), email.clone())),
            (None, None) => {}
        }
        if let Some(message) = &request.message {
            form.push((
                "metadata[message]".into(),
                truncate(message, MAX_METADATA_MESSAGE),
            ));
        }
        Ok(form)
    }

    async fn error_from_response(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        if status.is_server_error()
            || matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            )
        {
            return ProviderError::Unavailable(format!("card gateway returned {status}"));
        }
        let body = match response.json::<GatewayErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => return ProviderError::Rejected(format!("card gateway returned {status}")),
        };
        let message = body
            .message
            .unwrap_or_else(|| format!("card gateway returned {status}"));
        let is_amount_param = body
            .param
            .as_deref()
            .is_some_and(|p| p.contains("amount") || p.contains("currency"));
        if body.kind.as_deref() == Some("invalid_request_error") && is_amount_param {
            ProviderError::InvalidRequest(message)
        } else {
            ProviderError::Rejected(message)
        }
    }

    fn verify_signature(&self, payload: &[u8], headers: &HeaderMap) -> Result<(), ProviderError> {
        let header = headers
            .get(Self::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ProviderError::InvalidSignature("missing signature header".into()))?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp
            .ok_or_else(|| ProviderError::InvalidSignature("missing timestamp".into()))?;

        let secret = self.config.webhook_secret.as_bytes();
        let matched = candidates.into_iter().any(|candidate| {
            decode_signature(candidate)
                .ok()
                .is_some_and(|sig| verify_payload(timestamp, payload, &sig, secret).is_ok())
        });
        if !matched {
            return Err(ProviderError::InvalidSignature("no matching signature".into()));
        }
        check_timestamp(timestamp).map_err(|e| ProviderError::InvalidSignature(e.to_string()))
    }
}

fn session_outcome(session: &CheckoutSession) -> PaymentOutcome {
    match (session.payment_status.as_deref(), session.status.as_deref()) {
        (Some("paid"), _) => PaymentOutcome::Paid,
        (_, Some("expired")) => PaymentOutcome::Failed {
            reason: Some("checkout session expired".into()),
        },
        _ => PaymentOutcome::Pending,
    }
}

fn event_outcome(event: &CardEvent) -> PaymentOutcome {
    match event.kind.as_str() {
        "checkout.session.completed" => session_outcome(&event.data.object),
        "checkout.session.async_payment_succeeded" => PaymentOutcome::Paid,
        "checkout.session.async_payment_failed" => PaymentOutcome::Failed {
            reason: Some("card payment failed".into()),
        },
        "checkout.session.expired" => PaymentOutcome::Failed {
            reason: Some("checkout session expired".into()),
        },
        other => {
            debug!(event_type = other, "Ignoring card event type");
            PaymentOutcome::Pending
        }
    }
}

#[async_trait]
impl ProviderAdapter for CardAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Card
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        self.config.currencies.contains(&currency)
    }

    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderHandle, ProviderError> {
        let form = self.form_for(request)?;
        let response = self
            .http_client
            .post(self.sessions_url())
            .bearer_auth(&self.config.secret_key)
            .header("Idempotency-Key", request.donation_id.to_string())
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = Self::error_from_response(response).await;
            warn!(donation_id = %request.donation_id, error = %error, "Card session creation failed");
            return Err(error);
        }

        let session: CheckoutSession = response.json().await?;
        let checkout_url = session.url.ok_or_else(|| {
            ProviderError::Unavailable("checkout session without redirect url".into())
        })?;
        debug!(donation_id = %request.donation_id, session_id = %session.id, "Card session created");
        Ok(ProviderHandle {
            reference: session.id,
            continuation: Continuation::Redirect { checkout_url },
        })
    }

    async fn query_status(&self, reference: &str) -> Result<PaymentOutcome, ProviderError> {
        let response = self
            .http_client
            .get(format!(
                "{}/{}",
                self.sessions_url(),
                urlencoding::encode(reference)
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let session: CheckoutSession = response.json().await?;
        Ok(session_outcome(&session))
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, ProviderError> {
        self.verify_signature(payload, headers)?;
        let event: CardEvent = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        let outcome = event_outcome(&event);
        Ok(WebhookEvent {
            provider_reference: event.data.object.id,
            outcome,
        })
    }
}
