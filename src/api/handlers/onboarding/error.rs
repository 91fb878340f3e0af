//! Onboarding failures and the JSON shapes they are reported with.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::types::{FieldErrors, MessageResponse, RedirectResponse, ValidationResponse};
use crate::identity::IdentityError;

const SERVER_ERROR_MESSAGE: &str = "Server error";

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("too many requests")]
    RateLimited,
    #[error("no provisional session")]
    Unauthorized,
    #[error("invalid antiforgery token")]
    InvalidAntiforgeryToken,
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("unsupported media type")]
    UnsupportedMediaType,
    #[error("missing body")]
    MissingBody,
    #[error("malformed body: {0}")]
    MalformedBody(String),
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("principal is missing the `{0}` claim")]
    MissingClaim(&'static str),
    #[error("external identity is already onboarded")]
    DuplicateIdentity,
    #[error("identity store: {0}")]
    Store(IdentityError),
    #[error("session: {0}")]
    Session(String),
}

impl From<IdentityError> for OnboardingError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::DuplicateIdentity { .. } => Self::DuplicateIdentity,
            other => Self::Store(other),
        }
    }
}

/// Result of a JSON onboarding endpoint.
#[derive(Debug)]
pub enum OnboardingResponse {
    Redirect { redirect_url: String },
    Validation(FieldErrors),
    Message {
        status: StatusCode,
        message: &'static str,
    },
}

impl From<OnboardingError> for OnboardingResponse {
    fn from(err: OnboardingError) -> Self {
        let (status, message) = match err {
            OnboardingError::Validation(errors) => return Self::Validation(errors),
            OnboardingError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
            OnboardingError::Unauthorized => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            OnboardingError::InvalidAntiforgeryToken => {
                (StatusCode::BAD_REQUEST, "Invalid antiforgery token")
            }
            OnboardingError::PayloadTooLarge => (StatusCode::BAD_REQUEST, "Request too large"),
            OnboardingError::UnsupportedMediaType => {
                (StatusCode::BAD_REQUEST, "Expected application/json")
            }
            OnboardingError::MissingBody => (StatusCode::BAD_REQUEST, "Missing body"),
            OnboardingError::MalformedBody(_) => (StatusCode::BAD_REQUEST, "Malformed JSON"),
            OnboardingError::MissingClaim(_)
            | OnboardingError::DuplicateIdentity
            | OnboardingError::Store(_)
            | OnboardingError::Session(_) => {
                error!("Onboarding failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
            }
        };
        Self::Message { status, message }
    }
}

impl IntoResponse for OnboardingResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect { redirect_url } => (
                StatusCode::OK,
                Json(RedirectResponse {
                    success: true,
                    redirect_url,
                }),
            )
                .into_response(),
            Self::Validation(validation) => (
                StatusCode::BAD_REQUEST,
                Json(ValidationResponse {
                    success: false,
                    validation,
                }),
            )
                .into_response(),
            Self::Message { status, message } => (
                status,
                Json(MessageResponse {
                    success: false,
                    message: message.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for OnboardingError {
    fn into_response(self) -> Response {
        OnboardingResponse::from(self).into_response()
    }
}
