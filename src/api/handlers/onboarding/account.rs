//! App session endpoints for the browser: current claims and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::{
    handoff::{reset, BrowserSession},
    state::AuthState,
    types::SessionResponse,
};

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Established session claims", body = SessionResponse),
        (status = 204, description = "No established session")
    ),
    tag = "session"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // A provisional session does not count as signed in.
    match BrowserSession::resolve(auth_state.sessions(), &headers).await {
        BrowserSession::Established(established) => {
            let response = SessionResponse {
                claims: established.session.principal.claims().iter().cloned().collect(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        BrowserSession::Provisional(_) | BrowserSession::Anonymous => {
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Sessions cleared")
    ),
    tag = "session"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Always clear the cookies, even if no record was found.
    let response_headers = reset(auth_state.sessions(), &headers).await;
    info!("Session reset");
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
