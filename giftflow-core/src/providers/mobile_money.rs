//! Mobile-money "request to pay" adapter.
//!
//! Opening a payment pushes an approval prompt to the payer's handset; the
//! provider only acknowledges receipt (`202 Accepted`). The outcome is learnt
//! by polling `requesttopay/{reference}` or, when a callback secret is
//! configured, from signed callbacks.

use super::{
    PaymentOutcome, PaymentRequest, ProviderAdapter, ProviderError, ProviderHandle, WebhookEvent,
    truncate,
};
use crate::entities::{Currency, PaymentProvider};
use async_trait::async_trait;
use giftflow_sdk::objects::Continuation;
use giftflow_sdk::signature::{check_timestamp, parse_signature_header, verify_payload};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Refresh the access token this long before the provider expires it.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Maximum length of the message shown on the payer's handset.
const MAX_PAYER_MESSAGE: usize = 160;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Clone)]
pub struct MobileMoneyConfig {
    pub api_base: Url,
    pub target_environment: String,
    pub subscription_key: String,
    pub api_user: String,
    pub api_key: String,
    pub callback_url: Option<String>,
    /// Without a secret every callback is rejected.
    pub callback_secret: Option<String>,
    pub currencies: Vec<Currency>,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

pub struct MobileMoneyAdapter {
    config: MobileMoneyConfig,
    http_client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestToPay<'a> {
    amount: String,
    currency: String,
    external_id: String,
    payer: Party<'a>,
    payer_message: String,
    payee_note: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Party<'a> {
    party_id_type: &'a str,
    party_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestToPayStatus {
    status: String,
    #[serde(default)]
    reason: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackBody {
    reference_id: String,
    status: String,
    #[serde(default)]
    financial_transaction_id: Option<String>,
    #[serde(default)]
    reason: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl MobileMoneyAdapter {
    pub const SIGNATURE_HEADER: &'static str = "x-callback-signature";

    pub fn new(config: MobileMoneyConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(config, http_client)
    }

    pub fn with_client(config: MobileMoneyConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            token: Mutex::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/collection/{}",
            self.config.api_base.as_str().trim_end_matches('/'),
            path
        )
    }

    /// Returns a cached access token, fetching a new one when it is about to
    /// expire. Concurrent callers wait on the same refresh.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.access_token.clone());
        }

        let response = self
            .http_client
            .post(self.endpoint("token/"))
            .basic_auth(&self.config.api_user, Some(&self.config.api_key))
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.subscription_key)
            .header("X-Target-Environment", &self.config.target_environment)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(expires_in = token.expires_in, "Obtained mobile-money access token");
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    async fn error_from_response(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.forget_token().await;
        }
        if status.is_server_error()
            || matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            )
        {
            return ProviderError::Unavailable(format!("mobile-money provider returned {status}"));
        }
        let body = response.json::<ProviderErrorBody>().await.ok();
        let code = body.as_ref().and_then(|b| b.code.clone());
        let message = body
            .and_then(|b| b.message)
            .or_else(|| code.clone())
            .unwrap_or_else(|| format!("mobile-money provider returned {status}"));
        match code.as_deref() {
            Some("INVALID_CURRENCY" | "NOT_ALLOWED_TARGET_ENVIRONMENT" | "INVALID_AMOUNT") => {
                ProviderError::InvalidRequest(message)
            }
            _ => ProviderError::Rejected(message),
        }
    }
}

fn reason_text(reason: Option<serde_json::Value>) -> Option<String> {
    match reason? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("code"))
            .and_then(|v| v.as_str())
            .map(str::to_owned),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn status_outcome(status: &str, reason: Option<String>) -> PaymentOutcome {
    match status {
        "SUCCESSFUL" => PaymentOutcome::Paid,
        "FAILED" | "REJECTED" | "TIMEOUT" => PaymentOutcome::Failed {
            reason: reason.or_else(|| Some(status.to_lowercase())),
        },
        "PENDING" | "CREATED" | "ONGOING" => PaymentOutcome::Pending,
        other => {
            warn!(status = other, "Unknown mobile-money status, treating as pending");
            PaymentOutcome::Pending
        }
    }
}

#[async_trait]
impl ProviderAdapter for MobileMoneyAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::MobileMoney
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        self.config.currencies.contains(&currency)
    }

    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderHandle, ProviderError> {
        let phone = request.donor.phone_number.as_deref().ok_or_else(|| {
            ProviderError::InvalidRequest("mobile money requires a phone number".into())
        })?;
        let reference = request.donation_id.to_string();
        let payer_message = match &request.message {
            Some(message) => truncate(message, MAX_PAYER_MESSAGE),
            None => format!("Donation - {} {}", request.amount, request.currency),
        };
        let body = RequestToPay {
            amount: request.amount.to_string(),
            currency: request.currency.to_string(),
            external_id: reference.clone(),
            payer: Party {
                party_id_type: "MSISDN",
                party_id: phone,
            },
            payer_message,
            payee_note: "Thank you for your donation",
        };

        let token = self.access_token().await?;
        let mut builder = self
            .http_client
            .post(self.endpoint("v1_0/requesttopay"))
            .bearer_auth(token)
            .header("X-Reference-Id", &reference)
            .header("X-Target-Environment", &self.config.target_environment)
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.subscription_key)
            .json(&body);
        if let Some(callback_url) = &self.config.callback_url {
            builder = builder.header("X-Callback-Url", callback_url);
        }
        let response = builder.send().await?;

        match response.status() {
            // 409: the reference was already submitted, i.e. a retried request.
            StatusCode::ACCEPTED | StatusCode::CONFLICT => {
                info!(donation_id = %request.donation_id, "Mobile-money request to pay accepted");
                Ok(ProviderHandle {
                    reference: reference.clone(),
                    continuation: Continuation::AwaitApproval {
                        transaction_id: reference,
                    },
                })
            }
            _ => {
                let error = self.error_from_response(response).await;
                warn!(donation_id = %request.donation_id, error = %error, "Mobile-money request to pay failed");
                Err(error)
            }
        }
    }

    async fn query_status(&self, reference: &str) -> Result<PaymentOutcome, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(self.endpoint(&format!(
                "v1_0/requesttopay/{}",
                urlencoding::encode(reference)
            )))
            .bearer_auth(token)
            .header("X-Target-Environment", &self.config.target_environment)
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.subscription_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        let status: RequestToPayStatus = response.json().await?;
        Ok(status_outcome(&status.status, reason_text(status.reason)))
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, ProviderError> {
        let secret = self.config.callback_secret.as_deref().ok_or_else(|| {
            ProviderError::InvalidSignature("no callback secret configured".into())
        })?;
        let header = headers
            .get(Self::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ProviderError::InvalidSignature("missing signature header".into()))?;
        let (timestamp, signature) = parse_signature_header(header)
            .map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;
        verify_payload(timestamp, payload, &signature, secret.as_bytes())
            .map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;
        check_timestamp(timestamp).map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;

        let body: CallbackBody = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        if let Some(financial_id) = &body.financial_transaction_id {
            debug!(reference = %body.reference_id, financial_transaction_id = %financial_id, "Mobile-money callback");
        }
        let outcome = status_outcome(&body.status, reason_text(body.reason));
        Ok(WebhookEvent {
            provider_reference: body.reference_id,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giftflow_sdk::signature::{format_signature_header, sign_payload};
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    const CALLBACK_SECRET: &str = "callback-secret";

    fn adapter(callback_secret: Option<&str>) -> MobileMoneyAdapter {
        MobileMoneyAdapter::new(MobileMoneyConfig {
            api_base: Url::parse("https://momo.example").unwrap(),
            target_environment: "sandbox".into(),
            subscription_key: "sub".into(),
            api_user: "user".into(),
            api_key: "key".into(),
            callback_url: None,
            callback_secret: callback_secret.map(str::to_owned),
            currencies: vec![Currency::Ghs, Currency::Eur],
        })
    }

    fn signed(payload: &[u8], secret: &str) -> HeaderMap {
        let ts = time::OffsetDateTime::now_utc().unix_timestamp();
        let signature = sign_payload(ts, payload, secret.as_bytes());
        let mut headers = HeaderMap::new();
        headers.insert(
            MobileMoneyAdapter::SIGNATURE_HEADER,
            HeaderValue::from_str(&format_signature_header(ts, &signature)).unwrap(),
        );
        headers
    }

    #[rstest]
    #[case::successful("SUCCESSFUL", None, PaymentOutcome::Paid)]
    #[case::pending("PENDING", None, PaymentOutcome::Pending)]
    #[case::failed_with_reason(
        "FAILED",
        Some(serde_json::json!({"code": "PAYER_LIMIT_REACHED", "message": "limit reached"})),
        PaymentOutcome::Failed { reason: Some("limit reached".into()) }
    )]
    #[case::rejected_plain_reason(
        "REJECTED",
        Some(serde_json::json!("APPROVAL_REJECTED")),
        PaymentOutcome::Failed { reason: Some("APPROVAL_REJECTED".into()) }
    )]
    #[case::timeout("TIMEOUT", None, PaymentOutcome::Failed { reason: Some("timeout".into()) })]
    #[case::unknown("SOMETHING_NEW", None, PaymentOutcome::Pending)]
    fn statuses_map_to_outcomes(
        #[case] status: &str,
        #[case] reason: Option<serde_json::Value>,
        #[case] expected: PaymentOutcome,
    ) {
        assert_eq!(status_outcome(status, reason_text(reason)), expected);
    }

    #[test]
    fn signed_callback_is_accepted() {
        let payload = br#"{"referenceId":"ref-1","status":"SUCCESSFUL","financialTransactionId":"9912"}"#;
        let event = adapter(Some(CALLBACK_SECRET))
            .parse_webhook(payload, &signed(payload, CALLBACK_SECRET))
            .unwrap();
        assert_eq!(event.provider_reference, "ref-1");
        assert_eq!(event.outcome, PaymentOutcome::Paid);
    }

    #[test]
    fn callbacks_fail_closed_without_secret() {
        let payload = br#"{"referenceId":"ref-1","status":"SUCCESSFUL"}"#;
        assert!(matches!(
            adapter(None).parse_webhook(payload, &signed(payload, CALLBACK_SECRET)),
            Err(ProviderError::InvalidSignature(_))
        ));
    }

    #[test]
    fn forged_callback_is_rejected() {
        let payload = br#"{"referenceId":"ref-1","status":"SUCCESSFUL"}"#;
        assert!(matches!(
            adapter(Some(CALLBACK_SECRET)).parse_webhook(payload, &signed(payload, "guess")),
            Err(ProviderError::InvalidSignature(_))
        ));
    }

    #[test]
    fn signed_garbage_is_malformed() {
        let payload = b"not json";
        assert!(matches!(
            adapter(Some(CALLBACK_SECRET)).parse_webhook(payload, &signed(payload, CALLBACK_SECRET)),
            Err(ProviderError::MalformedPayload(_))
        ));
    }

    #[test]
    fn supported_currencies() {
        let adapter = adapter(None);
        assert!(adapter.supports_currency(Currency::Ghs));
        assert!(!adapter.supports_currency(Currency::Usd));
    }
}
