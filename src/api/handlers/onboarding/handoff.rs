//! Provisional to established session transition.
//!
//! A browser session is either `Provisional` (IDP ticket parked, no app
//! session) or `Established` (app session, IDP ticket gone). [`establish`] is
//! the only code that writes both cookies: it records the app session first
//! and drops the provisional record second, so a failure in between leaves
//! the caller with a usable session and a stale IDP cookie rather than none.

use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};
use tracing::{debug, error, info};

use super::{
    claims::{Principal, TicketProperties},
    error::OnboardingError,
    session::{
        app_token, clear_cookie, idp_token, session_cookie, EstablishedSession,
        ProvisionalSession, SessionStore, APP_COOKIE_NAME, IDP_COOKIE_NAME,
    },
    utils::generate_token,
};

/// A provisional session ready to be promoted.
///
/// Built either from a stored record (onboarding completion) or straight from
/// an IDP ticket that has not been persisted (returning user callback).
#[derive(Debug)]
pub struct ProvisionalHandle {
    token: Option<String>,
    session: ProvisionalSession,
}

impl ProvisionalHandle {
    pub(super) fn ticket(session: ProvisionalSession) -> Self {
        Self {
            token: None,
            session,
        }
    }

    pub(super) fn stored(token: String, session: ProvisionalSession) -> Self {
        Self {
            token: Some(token),
            session,
        }
    }

    #[must_use]
    pub fn session(&self) -> &ProvisionalSession {
        &self.session
    }
}

#[derive(Debug)]
pub struct EstablishedHandle {
    pub token: String,
    pub session: EstablishedSession,
}

#[derive(Debug)]
pub enum BrowserSession {
    Anonymous,
    Provisional(ProvisionalHandle),
    Established(EstablishedHandle),
}

impl BrowserSession {
    /// Resolve the caller's session from its cookies.
    ///
    /// A live app session wins over a leftover IDP cookie.
    pub async fn resolve(sessions: &SessionStore, headers: &HeaderMap) -> Self {
        if let Some(token) = app_token(headers) {
            if let Some(session) = sessions.established(&token).await {
                return Self::Established(EstablishedHandle { token, session });
            }
        }
        Self::provisional(sessions, headers).await
    }

    /// Resolve only the provisional session, ignoring any app cookie.
    pub async fn provisional(sessions: &SessionStore, headers: &HeaderMap) -> Self {
        if let Some(token) = idp_token(headers) {
            if let Some(session) = sessions.provisional(&token).await {
                return Self::Provisional(ProvisionalHandle::stored(token, session));
            }
        }
        Self::Anonymous
    }
}

/// Completed transition: where to go next and the cookies to send.
#[derive(Debug)]
pub struct Handoff {
    pub redirect_url: String,
    set_app_cookie: HeaderValue,
    clear_idp_cookie: HeaderValue,
}

impl Handoff {
    /// Append the cookies in transition order: app set, then IDP cleared.
    pub fn write_cookies(&self, headers: &mut HeaderMap) {
        headers.append(SET_COOKIE, self.set_app_cookie.clone());
        headers.append(SET_COOKIE, self.clear_idp_cookie.clone());
    }
}

/// Promote `provisional` to an established session for `principal`.
///
/// # Errors
/// Returns `OnboardingError::Session` if the app token or cookies cannot be
/// built; nothing has been written at that point.
pub async fn establish(
    sessions: &SessionStore,
    provisional: ProvisionalHandle,
    principal: Principal,
    properties: TicketProperties,
    redirect_url: String,
) -> Result<Handoff, OnboardingError> {
    let app_token = generate_token().map_err(|err| {
        error!("Failed to generate app session token: {err}");
        OnboardingError::Session(err.to_string())
    })?;
    let set_app_cookie = session_cookie(APP_COOKIE_NAME, &app_token, sessions.app_ttl())
        .map_err(|err| OnboardingError::Session(err.to_string()))?;
    let clear_idp_cookie =
        clear_cookie(IDP_COOKIE_NAME).map_err(|err| OnboardingError::Session(err.to_string()))?;

    // Sign in to the app scheme before signing out of the IDP scheme.
    sessions
        .insert_established(&app_token, principal, properties)
        .await;
    if let Some(token) = provisional.token.as_deref() {
        if !sessions.remove_provisional(token).await {
            debug!("Provisional session already gone at handoff");
        }
    }

    info!("Session established");
    Ok(Handoff {
        redirect_url,
        set_app_cookie,
        clear_idp_cookie,
    })
}

/// Drop the app session and clear both cookies.
pub async fn reset(sessions: &SessionStore, headers: &HeaderMap) -> HeaderMap {
    if let Some(token) = app_token(headers) {
        sessions.remove_established(&token).await;
    }
    if let Some(token) = idp_token(headers) {
        sessions.remove_provisional(&token).await;
    }

    let mut response_headers = HeaderMap::new();
    for name in [APP_COOKIE_NAME, IDP_COOKIE_NAME] {
        if let Ok(cookie) = clear_cookie(name) {
            response_headers.append(SET_COOKIE, cookie);
        }
    }
    response_headers
}
