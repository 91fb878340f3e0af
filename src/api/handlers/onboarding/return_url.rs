//! Return URL checks guarding every redirect issued after sign-in.

/// Landing path used whenever a candidate return URL is rejected.
pub const DEFAULT_RETURN_URL: &str = "/";

/// Whether `candidate` is a local path that is safe to redirect to.
///
/// Accepts `/`, `/path` (not `//` or `/\`), `~/`, and `~/path` (not `~//` or
/// `~/\`). Anything carrying a control character is rejected.
#[must_use]
pub fn is_local(candidate: &str) -> bool {
    let rest = if let Some(rest) = candidate.strip_prefix("~/") {
        rest
    } else if let Some(rest) = candidate.strip_prefix('/') {
        rest
    } else {
        return false;
    };

    if rest.starts_with('/') || rest.starts_with('\\') {
        return false;
    }
    !rest.chars().any(char::is_control)
}

/// Use `candidate` when it is local, else `default`.
#[must_use]
pub fn sanitize(candidate: Option<&str>, default: &str) -> String {
    match candidate {
        Some(url) if is_local(url) => url.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_local_paths() {
        for url in ["/", "/foo", "/foo/bar?x=1#top", "~/", "~/foo", "/a//b"] {
            assert!(is_local(url), "expected {url:?} to be local");
        }
    }

    #[test]
    fn rejects_remote_and_malformed_targets() {
        for url in [
            "",
            "//evil.com",
            "/\\evil",
            "https://evil.com",
            "evil.com",
            "~",
            "~//evil.com",
            "~/\\evil",
            "/foo\nbar",
            "/\u{7f}",
            "~/tab\there",
        ] {
            assert!(!is_local(url), "expected {url:?} to be rejected");
        }
    }

    #[test]
    fn sanitize_falls_back_to_default() {
        assert_eq!(sanitize(Some("/orders"), DEFAULT_RETURN_URL), "/orders");
        assert_eq!(sanitize(Some("//evil.com"), DEFAULT_RETURN_URL), "/");
        assert_eq!(sanitize(Some(""), DEFAULT_RETURN_URL), "/");
        assert_eq!(sanitize(None, DEFAULT_RETURN_URL), "/");
    }
}
