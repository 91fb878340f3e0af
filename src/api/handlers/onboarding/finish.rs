//! `POST /onboarding/finish`: record the new user and hand off the session.
//!
//! Checks run in a fixed order and each failure has its own response:
//! rate limit, provisional session, anti-forgery token, body size, content
//! type, JSON shape, then field validation.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Extension},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap,
    },
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, info, instrument};

use super::{
    antiforgery,
    claims::{transform_principal, SUBJECT},
    error::{OnboardingError, OnboardingResponse},
    handoff::{establish, BrowserSession, Handoff},
    rate_limit::{RateLimitAction, RateLimitDecision},
    return_url::{sanitize, DEFAULT_RETURN_URL},
    state::{AuthState, APP_SCHEME},
    types::{MessageResponse, OnboardingInput, RedirectResponse, ValidationResponse},
    utils::extract_client_ip,
    validation,
};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024;

#[utoipa::path(
    post,
    path = "/onboarding/finish",
    request_body = OnboardingInput,
    params(
        ("X-CSRF-TOKEN" = String, Header, description = "Token from GET /antiforgery/token")
    ),
    responses(
        (status = 200, description = "User created and session established", body = RedirectResponse),
        (status = 400, description = "Invalid token, body, or fields", body = ValidationResponse),
        (status = 401, description = "No provisional session", body = MessageResponse),
        (status = 429, description = "Too many requests", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    ),
    tag = "onboarding"
)]
pub async fn finish(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    body: Body,
) -> Response {
    match complete(&auth_state, &headers, peer.map(|ConnectInfo(addr)| addr), body).await {
        Ok(handoff) => {
            let mut response = OnboardingResponse::Redirect {
                redirect_url: handoff.redirect_url.clone(),
            }
            .into_response();
            handoff.write_cookies(response.headers_mut());
            response
        }
        Err(err) => err.into_response(),
    }
}

#[instrument(skip_all)]
async fn complete(
    auth_state: &AuthState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    body: Body,
) -> Result<Handoff, OnboardingError> {
    let client_ip = extract_client_ip(
        headers,
        peer,
        auth_state.config().trust_forwarded_headers(),
    );
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Onboarding)
        == RateLimitDecision::Limited
    {
        return Err(OnboardingError::RateLimited);
    }

    let BrowserSession::Provisional(provisional) =
        BrowserSession::provisional(auth_state.sessions(), headers).await
    else {
        return Err(OnboardingError::Unauthorized);
    };

    if !antiforgery::validate(headers, provisional.session()) {
        return Err(OnboardingError::InvalidAntiforgeryToken);
    }

    let input = read_input(headers, body).await?;
    let display_name = validation::validate(&input).map_err(OnboardingError::Validation)?;

    let principal = provisional.session().principal.clone();
    let properties = provisional.session().properties.clone();
    let subject = principal
        .subject()
        .ok_or(OnboardingError::MissingClaim(SUBJECT))?
        .to_string();

    let user = auth_state
        .identity_store()
        .create(auth_state.config().active_scheme(), &subject, &display_name)
        .await?;
    info!(user_id = %user.id, "Onboarding completed");

    let (app_principal, mut app_properties) =
        transform_principal(&principal, properties, APP_SCHEME, user.id, &user.display_name);
    let redirect_url = sanitize(
        app_properties.take_return_url().as_deref(),
        DEFAULT_RETURN_URL,
    );

    establish(
        auth_state.sessions(),
        provisional,
        app_principal,
        app_properties,
        redirect_url,
    )
    .await
    .inspect_err(|err| {
        // The user now exists without a session; a retry will hit DuplicateIdentity.
        error!(user_id = %user.id, "Handoff failed after user creation: {err}");
    })
}

/// Enforce size and media type, then parse the body.
async fn read_input(headers: &HeaderMap, body: Body) -> Result<OnboardingInput, OnboardingError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    if declared.is_some_and(|length| length > MAX_BODY_BYTES as u64) {
        return Err(OnboardingError::PayloadTooLarge);
    }
    let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|err| {
        debug!("Rejected onboarding body: {err}");
        OnboardingError::PayloadTooLarge
    })?;

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(is_json_media_type);
    if !is_json {
        return Err(OnboardingError::UnsupportedMediaType);
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(OnboardingError::MissingBody);
    }
    match serde_json::from_slice::<Option<OnboardingInput>>(&bytes) {
        Ok(Some(input)) => Ok(input),
        Ok(None) => Err(OnboardingError::MissingBody),
        Err(err) => Err(OnboardingError::MalformedBody(err.to_string())),
    }
}

/// `application/json` or an `application/*+json` type, parameters ignored.
fn is_json_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || essence
            .strip_prefix("application/")
            .is_some_and(|subtype| subtype.len() > "+json".len() && subtype.ends_with("+json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[tokio::test]
    async fn read_input_parses_display_name() {
        let input = read_input(&json_headers(), Body::from(r#"{"displayName":"Alice Smith"}"#)).await;
        assert_eq!(
            input.ok().and_then(|input| input.display_name),
            Some("Alice Smith".to_string())
        );
    }

    #[tokio::test]
    async fn read_input_accepts_json_with_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        let input = read_input(&headers, Body::from(r#"{"displayName":"Alice Smith"}"#)).await;
        assert!(input.is_ok());
    }

    #[tokio::test]
    async fn read_input_rejects_oversized_body_without_length_header() {
        let body = format!(r#"{{"displayName":"{}"}}"#, "a".repeat(MAX_BODY_BYTES));
        let input = read_input(&json_headers(), Body::from(body)).await;
        assert!(matches!(input, Err(OnboardingError::PayloadTooLarge)));
    }

    #[tokio::test]
    async fn read_input_rejects_declared_oversized_body() {
        let mut headers = json_headers();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4096"));
        let input = read_input(&headers, Body::from("{}")).await;
        assert!(matches!(input, Err(OnboardingError::PayloadTooLarge)));
    }

    #[tokio::test]
    async fn read_input_rejects_form_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let input = read_input(&headers, Body::from("displayName=Alice")).await;
        assert!(matches!(input, Err(OnboardingError::UnsupportedMediaType)));
    }

    #[test]
    fn json_media_type_is_matched_on_essence() {
        for accepted in [
            "application/json",
            "Application/JSON; charset=utf-8",
            "application/merge-patch+json",
        ] {
            assert!(is_json_media_type(accepted), "expected {accepted:?}");
        }
        for rejected in [
            "text/plain; x=application/json",
            "text/plain",
            "application/jsonx",
            "application/+json",
            "text/json",
            "",
        ] {
            assert!(!is_json_media_type(rejected), "expected {rejected:?} rejected");
        }
    }

    #[tokio::test]
    async fn read_input_rejects_json_hidden_in_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; x=application/json"),
        );
        let input = read_input(&headers, Body::from(r#"{"displayName":"Alice Smith"}"#)).await;
        assert!(matches!(input, Err(OnboardingError::UnsupportedMediaType)));
    }

    #[tokio::test]
    async fn read_input_distinguishes_missing_and_malformed() {
        let input = read_input(&json_headers(), Body::from("null")).await;
        assert!(matches!(input, Err(OnboardingError::MissingBody)));

        let input = read_input(&json_headers(), Body::empty()).await;
        assert!(matches!(input, Err(OnboardingError::MissingBody)));

        let input = read_input(&json_headers(), Body::from("{not json")).await;
        assert!(matches!(input, Err(OnboardingError::MalformedBody(_))));
    }

    #[tokio::test]
    async fn read_input_rejects_unknown_fields() {
        let input = read_input(
            &json_headers(),
            Body::from(r#"{"displayName":"Alice Smith","isAdmin":true}"#),
        )
        .await;
        assert!(matches!(input, Err(OnboardingError::MalformedBody(_))));
    }
}
