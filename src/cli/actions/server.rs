use crate::{
    api::{
        self,
        handlers::onboarding::{AuthConfig, AuthState, FixedWindowRateLimiter},
    },
    cli::{commands::auth, telemetry},
    identity::{IdentityStore, MemoryIdentityStore, PgIdentityStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub auth: auth::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = identity_store(args.dsn.as_ref()).await?;

    let config = AuthConfig::new(args.auth.active_scheme)
        .with_auth_diagnostics(args.auth.enable_auth_diagnostics)
        .with_trust_forwarded_headers(args.auth.trust_proxy_headers)
        .with_idp_session_ttl_seconds(args.auth.idp_session_ttl_seconds)
        .with_app_session_ttl_seconds(args.auth.app_session_ttl_seconds)
        .with_onboarding_path(args.auth.onboarding_path);

    let auth_state = Arc::new(AuthState::new(
        config,
        store,
        Arc::new(FixedWindowRateLimiter::default()),
    ));

    let result = api::new(args.port, auth_state).await;

    telemetry::shutdown_tracer();

    result
}

async fn identity_store(dsn: Option<&SecretString>) -> Result<Arc<dyn IdentityStore>> {
    let Some(dsn) = dsn else {
        warn!("No DSN configured, local identities are kept in memory and lost on restart");
        return Ok(Arc::new(MemoryIdentityStore::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    Ok(Arc::new(PgIdentityStore::new(pool)))
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        active_scheme = %args.auth.active_scheme,
        auth_diagnostics = args.auth.enable_auth_diagnostics,
        trust_proxy_headers = args.auth.trust_proxy_headers,
        idp_session_ttl_seconds = args.auth.idp_session_ttl_seconds,
        app_session_ttl_seconds = args.auth.app_session_ttl_seconds,
        onboarding_path = %args.auth.onboarding_path,
        identity_store = if args.dsn.is_some() { "postgresql" } else { "memory" },
        "Starting handoff"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_store_without_dsn_is_memory() -> anyhow::Result<()> {
        let store = identity_store(None).await?;
        assert_eq!(store.backend(), "memory");
        Ok(())
    }
}
