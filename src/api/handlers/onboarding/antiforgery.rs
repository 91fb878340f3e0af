//! Anti-forgery tokens bound to the provisional session.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error};

use super::{
    error::OnboardingError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    session::{idp_token, ProvisionalSession},
    state::AuthState,
    types::{AntiforgeryTokenResponse, MessageResponse},
    utils::{extract_client_ip, generate_token, hash_token},
};

pub const ANTIFORGERY_HEADER: &str = "x-csrf-token";

#[utoipa::path(
    get,
    path = "/antiforgery/token",
    responses(
        (status = 200, description = "Token issued for the provisional session", body = AntiforgeryTokenResponse),
        (status = 401, description = "No provisional session", body = MessageResponse),
        (status = 429, description = "Too many requests", body = MessageResponse)
    ),
    tag = "onboarding"
)]
pub async fn antiforgery_token(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    match issue(&auth_state, &headers, peer.map(|ConnectInfo(addr)| addr)).await {
        Ok(token) => (StatusCode::OK, Json(AntiforgeryTokenResponse { token })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn issue(
    auth_state: &AuthState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<String, OnboardingError> {
    let client_ip = extract_client_ip(
        headers,
        peer,
        auth_state.config().trust_forwarded_headers(),
    );
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Antiforgery)
        == RateLimitDecision::Limited
    {
        return Err(OnboardingError::RateLimited);
    }

    let session_token = idp_token(headers).ok_or(OnboardingError::Unauthorized)?;
    let token = generate_token().map_err(|err| {
        error!("Failed to generate antiforgery token: {err}");
        OnboardingError::Session(err.to_string())
    })?;
    if !auth_state
        .sessions()
        .set_antiforgery_hash(&session_token, hash_token(&token))
        .await
    {
        return Err(OnboardingError::Unauthorized);
    }
    debug!("Issued antiforgery token");
    Ok(token)
}

/// Whether the request header carries the token issued to this session.
pub(super) fn validate(headers: &HeaderMap, session: &ProvisionalSession) -> bool {
    let Some(expected) = session.antiforgery_hash.as_deref() else {
        return false;
    };
    headers
        .get(ANTIFORGERY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .is_some_and(|token| hash_token(token) == expected)
}

#[cfg(test)]
mod tests {
    use super::super::claims::{ClaimSet, Principal, TicketProperties};
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn session_with(token: Option<&str>) -> ProvisionalSession {
        let mut session = ProvisionalSession::new(
            Principal::new("cookie-idp", ClaimSet::default()),
            TicketProperties::new(),
            Duration::from_secs(60),
        );
        session.antiforgery_hash = token.map(hash_token);
        session
    }

    fn headers_with(token: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ANTIFORGERY_HEADER, HeaderValue::from_static(token));
        headers
    }

    #[test]
    fn accepts_issued_token() {
        assert!(validate(&headers_with("issued"), &session_with(Some("issued"))));
    }

    #[test]
    fn rejects_wrong_missing_or_unissued_token() {
        assert!(!validate(&headers_with("forged"), &session_with(Some("issued"))));
        assert!(!validate(&HeaderMap::new(), &session_with(Some("issued"))));
        assert!(!validate(&headers_with("issued"), &session_with(None)));
    }
}
