//! HTTP API.
//!
//! - `service`: signed endpoints for the application backend
//! - `webhooks`: provider notifications

pub mod extractors;
pub mod service;
pub mod webhooks;


use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use giftflow_core::error::DonationError;
use giftflow_core::store::StoreError;
use giftflow_sdk::objects::ErrorResponse;
use uuid::Uuid;

pub(crate) fn error_response(
    status: StatusCode,
    kind: &str,
    message: String,
    donation_id: Option<Uuid>,
) -> Response {
    (
        status,
        Json(ErrorResponse {
            kind: kind.to_string(),
            message,
            donation_id,
        }),
    )
        .into_response()
}

/// A [`DonationError`] on its way to the caller.
///
/// `anonymous` controls whether provider reasons are passed through.
#[derive(Debug)]
pub struct ApiError {
    error: DonationError,
    anonymous: bool,
}

impl ApiError {
    pub fn anonymous(error: DonationError) -> Self {
        Self {
            error,
            anonymous: true,
        }
    }
}

impl From<DonationError> for ApiError {
    fn from(error: DonationError) -> Self {
        Self {
            error,
            anonymous: false,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        DonationError::from(error).into()
    }
}

fn status_for(error: &DonationError) -> StatusCode {
    match error {
        DonationError::InvalidRequest(_)
        | DonationError::ProviderInvalidRequest(_)
        | DonationError::InvalidPhoneNumber(_) => StatusCode::BAD_REQUEST,
        DonationError::PendingDonationExists { .. } | DonationError::AlreadyTerminal { .. } => {
            StatusCode::CONFLICT
        }
        DonationError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
        DonationError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DonationError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
        DonationError::Forbidden(_) => StatusCode::FORBIDDEN,
        DonationError::NotFound(_) => StatusCode::NOT_FOUND,
        DonationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        if status.is_server_error() {
            tracing::error!(error = %self.error, "Service API request failed");
        } else {
            tracing::debug!(error = %self.error, "Service API request refused");
        }
        let donation_id = match &self.error {
            DonationError::PendingDonationExists { donation_id }
            | DonationError::AlreadyTerminal { donation_id, .. } => Some(*donation_id),
            DonationError::Forbidden(id) => Some(*id),
            _ => None,
        };
        error_response(
            status,
            self.error.kind(),
            self.error.user_message(self.anonymous),
            donation_id,
        )
    }
}
