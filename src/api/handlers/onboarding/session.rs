//! Server-side session records and their cookies.
//!
//! Each scheme has its own host-only cookie. The cookie carries a random
//! token; the store is keyed by the token's SHA-256 hash so raw tokens never
//! live server-side. Records expire after the scheme's TTL.

use anyhow::Result;
use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::claims::{Principal, TicketProperties};
use super::utils::{extract_cookie, generate_token, hash_token};

pub const IDP_COOKIE_NAME: &str = "__Host-handoff-idp";
pub const APP_COOKIE_NAME: &str = "__Host-handoff-app";

/// Longest lifetime a session record or cookie is given.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Expiry for a record created at `now`, with `ttl` capped at [`MAX_SESSION_TTL`].
fn expires_after(now: Instant, ttl: Duration) -> Instant {
    let ttl = ttl.min(MAX_SESSION_TTL);
    now.checked_add(ttl).unwrap_or(now)
}

/// IDP ticket parked between the callback and onboarding completion.
#[derive(Clone, Debug)]
pub struct ProvisionalSession {
    pub principal: Principal,
    pub properties: TicketProperties,
    pub(super) antiforgery_hash: Option<Vec<u8>>,
    expires_at: Instant,
}

impl ProvisionalSession {
    pub(super) fn new(principal: Principal, properties: TicketProperties, ttl: Duration) -> Self {
        Self {
            principal,
            properties,
            antiforgery_hash: None,
            expires_at: expires_after(Instant::now(), ttl),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EstablishedSession {
    pub principal: Principal,
    pub properties: TicketProperties,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    idp_ttl: Duration,
    app_ttl: Duration,
    provisional: Mutex<HashMap<Vec<u8>, ProvisionalSession>>,
    established: Mutex<HashMap<Vec<u8>, EstablishedSession>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(idp_ttl: Duration, app_ttl: Duration) -> Self {
        Self {
            idp_ttl: idp_ttl.min(MAX_SESSION_TTL),
            app_ttl: app_ttl.min(MAX_SESSION_TTL),
            provisional: Mutex::new(HashMap::new()),
            established: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn idp_ttl(&self) -> Duration {
        self.idp_ttl
    }

    #[must_use]
    pub fn app_ttl(&self) -> Duration {
        self.app_ttl
    }

    /// Park an IDP ticket and return the cookie token for it.
    ///
    /// # Errors
    /// Returns an error if the token cannot be generated.
    pub async fn insert_provisional(
        &self,
        principal: Principal,
        properties: TicketProperties,
    ) -> Result<String> {
        let token = generate_token()?;
        let session = ProvisionalSession::new(principal, properties, self.idp_ttl);
        let now = Instant::now();
        let mut sessions = self.provisional.lock().await;
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(hash_token(&token), session);
        Ok(token)
    }

    pub async fn provisional(&self, token: &str) -> Option<ProvisionalSession> {
        let key = hash_token(token);
        let mut sessions = self.provisional.lock().await;
        let session = sessions.get(&key).cloned()?;
        if session.expires_at > Instant::now() {
            Some(session)
        } else {
            sessions.remove(&key);
            None
        }
    }

    /// Replace the anti-forgery hash on a live provisional record.
    pub(super) async fn set_antiforgery_hash(&self, token: &str, hash: Vec<u8>) -> bool {
        let mut sessions = self.provisional.lock().await;
        match sessions.get_mut(&hash_token(token)) {
            Some(session) if session.expires_at > Instant::now() => {
                session.antiforgery_hash = Some(hash);
                true
            }
            _ => false,
        }
    }

    pub(super) async fn remove_provisional(&self, token: &str) -> bool {
        self.provisional
            .lock()
            .await
            .remove(&hash_token(token))
            .is_some()
    }

    pub(super) async fn insert_established(
        &self,
        token: &str,
        principal: Principal,
        properties: TicketProperties,
    ) {
        let now = Instant::now();
        let mut sessions = self.established.lock().await;
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            hash_token(token),
            EstablishedSession {
                principal,
                properties,
                expires_at: expires_after(now, self.app_ttl),
            },
        );
    }

    pub async fn established(&self, token: &str) -> Option<EstablishedSession> {
        let key = hash_token(token);
        let mut sessions = self.established.lock().await;
        let session = sessions.get(&key).cloned()?;
        if session.expires_at > Instant::now() {
            Some(session)
        } else {
            sessions.remove(&key);
            None
        }
    }

    pub(super) async fn remove_established(&self, token: &str) -> bool {
        self.established
            .lock()
            .await
            .remove(&hash_token(token))
            .is_some()
    }

    /// Count of live established sessions.
    pub async fn established_count(&self) -> usize {
        let now = Instant::now();
        self.established
            .lock()
            .await
            .values()
            .filter(|session| session.expires_at > now)
            .count()
    }
}

/// Build a host-only, secure, `HttpOnly` session cookie.
pub(super) fn session_cookie(
    name: &str,
    token: &str,
    ttl: Duration,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = ttl.as_secs();
    HeaderValue::from_str(&format!(
        "{name}={token}; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    ))
}

pub(super) fn clear_cookie(name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{name}=; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age=0"
    ))
}

pub(super) fn idp_token(headers: &HeaderMap) -> Option<String> {
    extract_cookie(headers, IDP_COOKIE_NAME)
}

pub(super) fn app_token(headers: &HeaderMap) -> Option<String> {
    extract_cookie(headers, APP_COOKIE_NAME)
}

#[cfg(test)]
mod tests {
    use super::super::claims::{Claim, ClaimSet, SUBJECT};
    use super::*;
    use anyhow::Result;

    fn principal() -> Principal {
        Principal::new(
            "cookie-idp",
            ClaimSet::new(vec![Claim::new(SUBJECT, "abc")]),
        )
    }

    #[tokio::test]
    async fn provisional_round_trip() -> Result<()> {
        let store = SessionStore::new(Duration::from_secs(60), Duration::from_secs(60));
        let token = store
            .insert_provisional(principal(), TicketProperties::new())
            .await?;

        let session = store.provisional(&token).await;
        assert_eq!(
            session.map(|session| session.principal),
            Some(principal())
        );
        assert!(store.provisional("not-a-token").await.is_none());

        assert!(store.remove_provisional(&token).await);
        assert!(store.provisional(&token).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn expired_provisional_is_rejected() -> Result<()> {
        let store = SessionStore::new(Duration::ZERO, Duration::from_secs(60));
        let token = store
            .insert_provisional(principal(), TicketProperties::new())
            .await?;
        assert!(store.provisional(&token).await.is_none());
        assert!(!store.set_antiforgery_hash(&token, vec![1]).await);
        Ok(())
    }

    #[tokio::test]
    async fn established_round_trip() {
        let store = SessionStore::new(Duration::from_secs(60), Duration::from_secs(60));
        store
            .insert_established("app-token", principal(), TicketProperties::new())
            .await;
        assert!(store.established("app-token").await.is_some());
        assert_eq!(store.established_count().await, 1);
        assert!(store.remove_established("app-token").await);
        assert!(store.established("app-token").await.is_none());
    }

    #[tokio::test]
    async fn oversized_ttls_are_capped() -> Result<()> {
        let store = SessionStore::new(Duration::MAX, Duration::MAX);
        assert_eq!(store.idp_ttl(), MAX_SESSION_TTL);
        assert_eq!(store.app_ttl(), MAX_SESSION_TTL);

        let token = store
            .insert_provisional(principal(), TicketProperties::new())
            .await?;
        assert!(store.provisional(&token).await.is_some());
        store
            .insert_established("app-token", principal(), TicketProperties::new())
            .await;
        assert!(store.established("app-token").await.is_some());

        let session =
            ProvisionalSession::new(principal(), TicketProperties::new(), Duration::MAX);
        assert!(session.expires_at > Instant::now());
        Ok(())
    }

    #[test]
    fn cookies_are_host_scoped_and_http_only() -> Result<()> {
        let cookie = session_cookie(IDP_COOKIE_NAME, "tok", Duration::from_secs(900))?;
        assert_eq!(
            cookie.to_str()?,
            "__Host-handoff-idp=tok; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age=900"
        );
        let cleared = clear_cookie(APP_COOKIE_NAME)?;
        assert!(cleared.to_str()?.starts_with("__Host-handoff-app=;"));
        assert!(cleared.to_str()?.ends_with("Max-Age=0"));
        Ok(())
    }
}
