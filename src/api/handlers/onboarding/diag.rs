//! `GET /diag/idp`: inspect the provisional IDP ticket before onboarding.
//!
//! Only routed when auth diagnostics are enabled.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::{collections::BTreeMap, sync::Arc};

use super::{
    error::OnboardingError,
    handoff::BrowserSession,
    state::AuthState,
    types::{IdpDiagnosticsResponse, MessageResponse},
};

const TOKEN_PREVIEW_CHARS: usize = 80;

#[utoipa::path(
    get,
    path = "/diag/idp",
    responses(
        (status = 200, description = "Provisional IDP ticket", body = IdpDiagnosticsResponse),
        (status = 401, description = "No provisional session", body = MessageResponse)
    ),
    tag = "diagnostics"
)]
pub async fn idp_diagnostics(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let BrowserSession::Provisional(provisional) =
        BrowserSession::provisional(auth_state.sessions(), &headers).await
    else {
        return OnboardingError::Unauthorized.into_response();
    };
    let session = provisional.session();

    let tokens: BTreeMap<String, String> = session
        .properties
        .tokens()
        .iter()
        .map(|(name, value)| (name.clone(), preview(value)))
        .collect();
    let response = IdpDiagnosticsResponse {
        scheme: session.principal.scheme().to_string(),
        claims: session.principal.claims().iter().cloned().collect(),
        properties: session.properties.items().clone(),
        tokens,
        continue_url: auth_state.config().onboarding_path().to_string(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Shorten a token for display.
fn preview(value: &str) -> String {
    if value.chars().count() <= TOKEN_PREVIEW_CHARS {
        return value.to_string();
    }
    let head: String = value.chars().take(TOKEN_PREVIEW_CHARS).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_tokens() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(200);
        let shown = preview(&long);
        assert_eq!(shown.len(), TOKEN_PREVIEW_CHARS + 3);
        assert!(shown.ends_with("..."));
    }
}
