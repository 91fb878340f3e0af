//! Decision point run when the OIDC callback delivers a validated ticket.
//!
//! Returning users are handed off immediately. New users get a provisional
//! session, their return URL is stashed in the ticket properties, and they are
//! sent to onboarding. The gate never creates users: that only happens when
//! onboarding completes, so abandoned onboarding leaves no record behind.

use axum::{
    http::{header::SET_COOKIE, HeaderValue},
    response::{IntoResponse, Redirect, Response},
};
use tracing::{error, info, instrument};

use super::{
    claims::{on_token_validated, transform_principal, ClaimSet, Principal, TicketProperties, SUBJECT},
    error::OnboardingError,
    handoff::{establish, Handoff, ProvisionalHandle},
    return_url::{sanitize, DEFAULT_RETURN_URL},
    session::{session_cookie, ProvisionalSession, IDP_COOKIE_NAME},
    state::{AuthState, APP_SCHEME, IDP_SCHEME},
};

/// Validated IDP sign-in as delivered by the OIDC client.
#[derive(Clone, Debug)]
pub struct IdpTicket {
    pub principal: Principal,
    pub properties: TicketProperties,
    pub return_uri: Option<String>,
}

impl IdpTicket {
    /// Wrap IDP claims under the IDP scheme, adding a `sid` when absent.
    #[must_use]
    pub fn new(claims: ClaimSet, properties: TicketProperties, return_uri: Option<String>) -> Self {
        Self {
            principal: on_token_validated(Principal::new(IDP_SCHEME, claims)),
            properties,
            return_uri,
        }
    }
}

#[derive(Debug)]
pub enum GateOutcome {
    /// Known user: app session created, IDP session dropped.
    Established(Handoff),
    /// New user: provisional session created, onboarding pending.
    Onboarding {
        idp_cookie: HeaderValue,
        redirect_url: String,
    },
}

impl GateOutcome {
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        match self {
            Self::Established(handoff) => &handoff.redirect_url,
            Self::Onboarding { redirect_url, .. } => redirect_url,
        }
    }
}

impl IntoResponse for GateOutcome {
    fn into_response(self) -> Response {
        let mut response = Redirect::to(self.redirect_url()).into_response();
        match self {
            Self::Established(handoff) => handoff.write_cookies(response.headers_mut()),
            Self::Onboarding { idp_cookie, .. } => {
                response.headers_mut().append(SET_COOKIE, idp_cookie);
            }
        }
        response
    }
}

/// Route a freshly authenticated IDP principal.
///
/// # Errors
/// `MissingClaim` when the principal has no subject, `Store` when the lookup
/// fails, `Session` when session state cannot be written.
#[instrument(skip_all, fields(idp = %auth_state.config().active_scheme()))]
pub async fn on_ticket_received(
    auth_state: &AuthState,
    ticket: IdpTicket,
) -> Result<GateOutcome, OnboardingError> {
    let IdpTicket {
        principal,
        mut properties,
        return_uri,
    } = ticket;
    let return_url = sanitize(return_uri.as_deref(), DEFAULT_RETURN_URL);

    let subject = principal
        .subject()
        .ok_or(OnboardingError::MissingClaim(SUBJECT))?
        .to_string();
    let idp_name = auth_state.config().active_scheme();

    if let Some(user) = auth_state.identity_store().find(idp_name, &subject).await? {
        info!(user_id = %user.id, "Returning user signed in");
        let (app_principal, app_properties) = transform_principal(
            &principal,
            properties.clone(),
            APP_SCHEME,
            user.id,
            &user.display_name,
        );
        let ticket = ProvisionalSession::new(
            principal,
            properties,
            auth_state.sessions().idp_ttl(),
        );
        let handoff = establish(
            auth_state.sessions(),
            ProvisionalHandle::ticket(ticket),
            app_principal,
            app_properties,
            return_url,
        )
        .await?;
        return Ok(GateOutcome::Established(handoff));
    }

    properties.stash_return_url(return_url);
    let token = auth_state
        .sessions()
        .insert_provisional(principal, properties)
        .await
        .map_err(|err| {
            error!("Failed to create provisional session: {err}");
            OnboardingError::Session(err.to_string())
        })?;
    let idp_cookie = session_cookie(IDP_COOKIE_NAME, &token, auth_state.sessions().idp_ttl())
        .map_err(|err| OnboardingError::Session(err.to_string()))?;

    info!("New external identity, onboarding required");
    Ok(GateOutcome::Onboarding {
        idp_cookie,
        redirect_url: auth_state.config().onboarding_entry().to_string(),
    })
}
