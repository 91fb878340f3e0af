//! Onboarding configuration and shared handler state.

use std::sync::Arc;
use std::time::Duration;

use super::rate_limit::RateLimiter;
use super::session::SessionStore;
use crate::identity::IdentityStore;

pub const IDP_SCHEME: &str = "cookie-idp";
pub const APP_SCHEME: &str = "cookie-app";

const DEFAULT_IDP_SESSION_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_APP_SESSION_TTL_SECONDS: u64 = 8 * 60 * 60;
const DEFAULT_ONBOARDING_PATH: &str = "/onboarding";
const DIAGNOSTICS_PATH: &str = "/diag/idp";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    active_scheme: String,
    enable_auth_diagnostics: bool,
    trust_forwarded_headers: bool,
    idp_session_ttl_seconds: u64,
    app_session_ttl_seconds: u64,
    onboarding_path: String,
}

impl AuthConfig {
    /// `active_scheme` names the IDP recorded with every application user.
    #[must_use]
    pub fn new(active_scheme: String) -> Self {
        Self {
            active_scheme,
            enable_auth_diagnostics: false,
            trust_forwarded_headers: false,
            idp_session_ttl_seconds: DEFAULT_IDP_SESSION_TTL_SECONDS,
            app_session_ttl_seconds: DEFAULT_APP_SESSION_TTL_SECONDS,
            onboarding_path: DEFAULT_ONBOARDING_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_auth_diagnostics(mut self, enabled: bool) -> Self {
        self.enable_auth_diagnostics = enabled;
        self
    }

    /// Key rate limits on `X-Forwarded-For` / `X-Real-IP` instead of the peer address.
    #[must_use]
    pub fn with_trust_forwarded_headers(mut self, enabled: bool) -> Self {
        self.trust_forwarded_headers = enabled;
        self
    }

    #[must_use]
    pub fn with_idp_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.idp_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_app_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.app_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_onboarding_path(mut self, path: String) -> Self {
        self.onboarding_path = path;
        self
    }

    #[must_use]
    pub fn active_scheme(&self) -> &str {
        &self.active_scheme
    }

    #[must_use]
    pub fn auth_diagnostics_enabled(&self) -> bool {
        self.enable_auth_diagnostics
    }

    #[must_use]
    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    #[must_use]
    pub fn idp_session_ttl_seconds(&self) -> u64 {
        self.idp_session_ttl_seconds
    }

    #[must_use]
    pub fn app_session_ttl_seconds(&self) -> u64 {
        self.app_session_ttl_seconds
    }

    #[must_use]
    pub fn onboarding_path(&self) -> &str {
        &self.onboarding_path
    }

    /// Where a new user is sent after the IDP callback.
    pub(super) fn onboarding_entry(&self) -> &str {
        if self.enable_auth_diagnostics {
            DIAGNOSTICS_PATH
        } else {
            &self.onboarding_path
        }
    }
}

pub struct AuthState {
    config: AuthConfig,
    sessions: SessionStore,
    identities: Arc<dyn IdentityStore>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        identities: Arc<dyn IdentityStore>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let sessions = SessionStore::new(
            Duration::from_secs(config.idp_session_ttl_seconds()),
            Duration::from_secs(config.app_session_ttl_seconds()),
        );
        Self {
            config,
            sessions,
            identities,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn identity_store(&self) -> &dyn IdentityStore {
        self.identities.as_ref()
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
