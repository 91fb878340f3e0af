use crate::cli::{
    actions::{server::Args, Action},
    commands::auth,
};
use anyhow::Result;
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| SecretString::from(dsn.clone()));
    let auth = auth::Options::parse(matches)?;

    Ok(Action::Server(Args { port, dsn, auth }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use anyhow::Result;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "handoff",
            "--port",
            "9090",
            "--dsn",
            "postgres://user@localhost:5432/handoff",
            "--active-scheme",
            "oidc",
            "--enable-auth-diagnostics",
            "--trust-proxy-headers",
            "--onboarding-path",
            "/welcome",
        ])?;

        let Action::Server(args) = handler(&matches)?;
        assert_eq!(args.port, 9090);
        assert_eq!(
            args.dsn.as_ref().map(|dsn| dsn.expose_secret().to_string()),
            Some("postgres://user@localhost:5432/handoff".to_string())
        );
        assert_eq!(args.auth.active_scheme, "oidc");
        assert!(args.auth.enable_auth_diagnostics);
        assert!(args.auth.trust_proxy_headers);
        assert_eq!(args.auth.onboarding_path, "/welcome");
        assert_eq!(args.auth.idp_session_ttl_seconds, 900);
        assert_eq!(args.auth.app_session_ttl_seconds, 28_800);
        Ok(())
    }

    #[test]
    fn handler_without_dsn_uses_memory_store() -> Result<()> {
        temp_env::with_vars(
            [
                ("HANDOFF_DSN", None::<&str>),
                ("HANDOFF_ACTIVE_SCHEME", Some("oidc")),
            ],
            || {
                let matches = commands::new().try_get_matches_from(vec!["handoff"])?;
                let Action::Server(args) = handler(&matches)?;
                assert!(args.dsn.is_none());
                assert!(!args.auth.trust_proxy_headers);
                Ok(())
            },
        )
    }

    #[test]
    fn handler_reads_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("HANDOFF_ACTIVE_SCHEME", Some("keycloak")),
                ("HANDOFF_IDP_SESSION_TTL_SECONDS", Some("60")),
                ("HANDOFF_PORT", Some("8443")),
            ],
            || {
                let matches = commands::new().try_get_matches_from(vec!["handoff"])?;
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 8443);
                assert_eq!(args.auth.active_scheme, "keycloak");
                assert_eq!(args.auth.idp_session_ttl_seconds, 60);
                Ok(())
            },
        )
    }
}
