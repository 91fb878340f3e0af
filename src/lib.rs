//! # Handoff (OIDC onboarding gate)
//!
//! `handoff` sits between an OIDC identity provider and the application. A
//! validated IDP login either maps onto an existing local user, in which case
//! the browser gets an application session straight away, or it parks in a
//! short-lived provisional session until the user finishes onboarding.
//!
//! ## Sessions
//!
//! - **Provisional (`cookie-idp`):** holds the raw IDP claims and the stashed
//!   return URL. It is only good for `/antiforgery/token` and `/onboarding/finish`.
//! - **Established (`cookie-app`):** carries the local user id, display name and
//!   IDP session id. Issuing it always revokes the provisional session.
//!
//! ## Onboarding
//!
//! `POST /onboarding/finish` requires the provisional cookie plus a matching
//! `X-CSRF-TOKEN` header. The local identity is keyed by `(idp_name, idp_subject)`
//! and a second insert for the same pair fails with a duplicate identity error.
//!
//! Return URLs are only followed when they are local paths; anything else falls
//! back to `/`.

pub mod api;
pub mod cli;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
