//! Onboarding gate and session handoff.
//!
//! A browser signs in at the IDP and the OIDC client hands the validated
//! ticket to [`gate::on_ticket_received`]. From there:
//!
//! - **Returning user:** claims are mapped onto the app scheme and the
//!   session is handed off at once.
//! - **New user:** the ticket is parked in a short-lived provisional session
//!   (`__Host-handoff-idp`, 15 minutes by default) and the browser is sent to
//!   onboarding. `POST /onboarding/finish` then creates the user, maps the
//!   claims and hands off.
//!
//! ## Handoff
//!
//! The app cookie (`__Host-handoff-app`) is always written before the IDP
//! cookie is cleared. Both cookies are host-only, `Secure`, and `HttpOnly`.
//! Only the SHA-256 hash of a cookie token is kept server-side.
//!
//! ## Abuse Limits
//!
//! - **Completion:** 5 requests per caller address per 15 minutes.
//! - **Anti-forgery issuance:** 10 requests per caller address per 5 minutes.
//! - **Body:** at most 1 KiB of `application/json`.

pub(crate) mod account;
pub(crate) mod antiforgery;
pub mod claims;
pub(crate) mod diag;
mod error;
pub(crate) mod finish;
pub mod gate;
pub mod handoff;
mod rate_limit;
pub mod return_url;
pub mod session;
mod state;
pub(crate) mod types;
mod utils;
pub mod validation;

pub use error::{OnboardingError, OnboardingResponse};
pub use gate::{on_ticket_received, GateOutcome, IdpTicket};
pub use rate_limit::{
    FixedWindowRateLimiter, NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter,
    WindowPolicy,
};
pub use state::{AuthConfig, AuthState, APP_SCHEME, IDP_SCHEME};
