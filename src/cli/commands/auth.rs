use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_ACTIVE_SCHEME: &str = "active-scheme";
pub const ARG_AUTH_DIAGNOSTICS: &str = "enable-auth-diagnostics";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";
pub const ARG_IDP_SESSION_TTL: &str = "idp-session-ttl-seconds";
pub const ARG_APP_SESSION_TTL: &str = "app-session-ttl-seconds";
pub const ARG_ONBOARDING_PATH: &str = "onboarding-path";

/// Longest accepted session TTL (30 days).
pub const MAX_SESSION_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Options {
    pub active_scheme: String,
    pub enable_auth_diagnostics: bool,
    pub trust_proxy_headers: bool,
    pub idp_session_ttl_seconds: u64,
    pub app_session_ttl_seconds: u64,
    pub onboarding_path: String,
}

impl Options {
    /// Read the auth options from validated matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let active_scheme = matches
            .get_one::<String>(ARG_ACTIVE_SCHEME)
            .cloned()
            .context("missing required argument: --active-scheme")?;
        Ok(Self {
            active_scheme,
            enable_auth_diagnostics: matches.get_flag(ARG_AUTH_DIAGNOSTICS),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
            idp_session_ttl_seconds: matches
                .get_one::<u64>(ARG_IDP_SESSION_TTL)
                .copied()
                .unwrap_or(900),
            app_session_ttl_seconds: matches
                .get_one::<u64>(ARG_APP_SESSION_TTL)
                .copied()
                .unwrap_or(28_800),
            onboarding_path: matches
                .get_one::<String>(ARG_ONBOARDING_PATH)
                .cloned()
                .unwrap_or_else(|| "/onboarding".to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACTIVE_SCHEME)
                .long(ARG_ACTIVE_SCHEME)
                .help("Name of the OIDC identity provider recorded with every user")
                .env("HANDOFF_ACTIVE_SCHEME")
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTH_DIAGNOSTICS)
                .long(ARG_AUTH_DIAGNOSTICS)
                .help("Send new users to the /diag/idp view before onboarding")
                .env("HANDOFF_ENABLE_AUTH_DIAGNOSTICS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Rate limit on X-Forwarded-For / X-Real-IP instead of the peer address")
                .long_help(
                    "Rate limit on the first X-Forwarded-For hop, then X-Real-IP, instead of the socket peer address. Only enable behind a proxy that overwrites these headers.",
                )
                .env("HANDOFF_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_IDP_SESSION_TTL)
                .long(ARG_IDP_SESSION_TTL)
                .help("Provisional IDP session TTL in seconds")
                .env("HANDOFF_IDP_SESSION_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_SESSION_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_APP_SESSION_TTL)
                .long(ARG_APP_SESSION_TTL)
                .help("Established app session TTL in seconds")
                .env("HANDOFF_APP_SESSION_TTL_SECONDS")
                .default_value("28800")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_SESSION_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_ONBOARDING_PATH)
                .long(ARG_ONBOARDING_PATH)
                .help("Local path of the onboarding page new users are sent to")
                .env("HANDOFF_ONBOARDING_PATH")
                .default_value("/onboarding"),
        )
}
