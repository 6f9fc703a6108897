//! Service API handlers.
//!
//! These endpoints are called by the application backend and require
//! a signed body verified via the `Giftflow-Signature` header.
//!
//! # Endpoints
//!
//! - `POST /donations`          – start a donation
//! - `POST /donations/cancel`   – cancel a pending donation
//! - `POST /donations/status`   – poll the provider and return the donation
//! - `POST /donations/list`     – a user's donation history
//! - `POST /donations/summary`  – a user's donation summary
//! - `POST /payment-validity`   – whether a user counts as having paid
//! - `POST /totals`             – paid totals per currency

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use giftflow_core::engine::{CancelAuthority, DonorIdentity, InitiateDonation};
use giftflow_core::error::DonationError;
use giftflow_core::entities::Currency;
use giftflow_sdk::objects::{
    CancelDonationRequest, CheckStatusRequest, CurrencyTotal, DonationResponse,
    DonationSummaryResponse, Donor, InitiateDonationRequest, InitiateDonationResponse,
    ListDonationsRequest, ListDonationsResponse, OrganizationTotalsRequest,
    OrganizationTotalsResponse, PaymentValidityRequest, PaymentValidityResponse, SummaryRequest,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::api::ApiError;
use crate::api::extractors::SignedBody;
use crate::state::AppState;

/// Build the Service API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/donations", post(initiate_donation))
        .route("/donations/cancel", post(cancel_donation))
        .route("/donations/status", post(check_status))
        .route("/donations/list", post(list_donations))
        .route("/donations/summary", post(donation_summary))
        .route("/payment-validity", post(payment_validity))
        .route("/totals", post(organization_totals))
}

fn currency_totals(totals: BTreeMap<Currency, Decimal>) -> Vec<CurrencyTotal> {
    totals
        .into_iter()
        .map(|(currency, amount)| CurrencyTotal {
            currency: currency.into(),
            amount,
        })
        .collect()
}

/// `POST /donations`: start a donation and return how the donor continues.
async fn initiate_donation(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<InitiateDonationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let donor = match payload.donor {
        Donor::User { user_id } => DonorIdentity::User(user_id),
        Donor::Anonymous { email } => DonorIdentity::Anonymous { email },
    };
    let anonymous = matches!(donor, DonorIdentity::Anonymous { .. });

    let initiated = state
        .engine
        .initiate(InitiateDonation {
            donor,
            amount: payload.amount,
            currency: payload.currency.into(),
            provider: payload.provider.into(),
            message: payload.message,
            phone_number: payload.phone_number,
        })
        .await
        .map_err(|e| {
            if anonymous {
                ApiError::anonymous(e)
            } else {
                ApiError::from(e)
            }
        })?;

    Ok((
        StatusCode::CREATED,
        Json(InitiateDonationResponse {
            donation: DonationResponse::from(&initiated.donation),
            continuation: initiated.continuation,
            cancel_token: initiated.cancel_token,
        }),
    ))
}

/// `POST /donations/cancel` takes exactly one of `user_id` or `cancel_token`.
async fn cancel_donation(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<CancelDonationRequest>,
) -> Result<Json<DonationResponse>, ApiError> {
    let authority = match (payload.user_id, payload.cancel_token) {
        (Some(user_id), None) => CancelAuthority::User(user_id),
        (None, Some(token)) => CancelAuthority::Token(token),
        _ => {
            return Err(DonationError::InvalidRequest(
                "exactly one of user_id or cancel_token is required".into(),
            )
            .into());
        }
    };
    let donation = state.engine.cancel(payload.donation_id, authority).await?;
    Ok(Json(DonationResponse::from(&donation)))
}

/// `POST /donations/status`: reconcile one donation with its provider.
///
/// Errors for anonymous donations, or for references we cannot place, hide
/// the provider's wording.
async fn check_status(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<CheckStatusRequest>,
) -> Result<Json<DonationResponse>, ApiError> {
    let reference = payload.provider_reference;
    match state.engine.poll_status(&reference).await {
        Ok(donation) => Ok(Json(DonationResponse::from(&donation))),
        Err(e) => {
            let anonymous = state
                .engine
                .store()
                .get_by_provider_reference(&reference)
                .await
                .ok()
                .flatten()
                .is_none_or(|d| d.is_anonymous());
            Err(if anonymous {
                ApiError::anonymous(e)
            } else {
                ApiError::from(e)
            })
        }
    }
}

async fn list_donations(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<ListDonationsRequest>,
) -> Result<Json<ListDonationsResponse>, ApiError> {
    let donations = state.status.list_donations(payload.user_id).await?;
    Ok(Json(ListDonationsResponse {
        donations: donations.iter().map(DonationResponse::from).collect(),
    }))
}

async fn donation_summary(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<SummaryRequest>,
) -> Result<Json<DonationSummaryResponse>, ApiError> {
    let summary = state.status.summary_for(payload.user_id).await?;
    Ok(Json(DonationSummaryResponse {
        user_id: payload.user_id,
        completed_count: summary.completed_count,
        pending_count: summary.pending_count,
        total_paid: currency_totals(summary.total_paid),
    }))
}

/// `POST /payment-validity`, evaluated under the currently loaded policy.
async fn payment_validity(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<PaymentValidityRequest>,
) -> Result<Json<PaymentValidityResponse>, ApiError> {
    let policy = *state.config.payment_validity.read().await;
    let valid = state
        .status
        .is_payment_valid_under(payload.user_id, policy)
        .await?;
    Ok(Json(PaymentValidityResponse {
        user_id: payload.user_id,
        valid,
    }))
}

async fn organization_totals(
    State(state): State<AppState>,
    SignedBody(_): SignedBody<OrganizationTotalsRequest>,
) -> Result<Json<OrganizationTotalsResponse>, ApiError> {
    let totals = state.status.organization_totals().await?;
    Ok(Json(OrganizationTotalsResponse {
        totals: currency_totals(totals),
    }))
}
