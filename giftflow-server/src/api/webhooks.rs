//! Provider webhook endpoints.
//!
//! The raw body and headers go to the engine untouched; each adapter
//! authenticates its own signature scheme. Providers retry on non-2xx, so
//! anything the engine handled or deliberately dropped is acknowledged with
//! 200 and only storage failures ask for a redelivery.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use giftflow_core::engine::WebhookDisposition;
use giftflow_core::entities::PaymentProvider;
use giftflow_core::error::DonationError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/card", post(card_webhook))
        .route("/mobile-money", post(mobile_money_webhook))
}

async fn card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    ingest(&state, PaymentProvider::Card, &headers, &body).await
}

async fn mobile_money_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    ingest(&state, PaymentProvider::MobileMoney, &headers, &body).await
}

async fn ingest(
    state: &AppState,
    provider: PaymentProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> StatusCode {
    match state.engine.handle_webhook(provider, body, headers).await {
        Ok(disposition) => {
            match &disposition {
                WebhookDisposition::Applied(d) => {
                    tracing::debug!(%provider, donation_id = %d.id, state = %d.state, "Webhook applied");
                }
                WebhookDisposition::AlreadyTerminal(d) | WebhookDisposition::StillPending(d) => {
                    tracing::debug!(%provider, donation_id = %d.id, state = %d.state, "Webhook changed nothing");
                }
                WebhookDisposition::UnknownReference(reference) => {
                    tracing::debug!(%provider, %reference, "Webhook for unknown reference");
                }
            }
            StatusCode::OK
        }
        Err(DonationError::InvalidSignature(_)) => StatusCode::UNAUTHORIZED,
        Err(
            DonationError::InvalidRequest(reason) | DonationError::ProviderInvalidRequest(reason),
        ) => {
            tracing::warn!(%provider, %reason, "Unusable webhook");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            tracing::error!(%provider, error = %e, "Failed to process webhook");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
