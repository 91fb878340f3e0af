//! Rate limiting primitives for onboarding endpoints.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

const ANONYMOUS_KEY: &str = "anon";
const ONBOARDING_LIMIT: u32 = 5;
const ONBOARDING_WINDOW: Duration = Duration::from_secs(15 * 60);
const ANTIFORGERY_LIMIT: u32 = 10;
const ANTIFORGERY_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Onboarding,
    Antiforgery,
}

impl RateLimitAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Antiforgery => "antiforgery",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WindowPolicy {
    pub permits: u32,
    pub window: Duration,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by caller address.
///
/// Callers without an address share the `anon` bucket.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    onboarding: WindowPolicy,
    antiforgery: WindowPolicy,
    windows: Mutex<HashMap<(RateLimitAction, String), Window>>,
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new(
            WindowPolicy {
                permits: ONBOARDING_LIMIT,
                window: ONBOARDING_WINDOW,
            },
            WindowPolicy {
                permits: ANTIFORGERY_LIMIT,
                window: ANTIFORGERY_WINDOW,
            },
        )
    }
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(onboarding: WindowPolicy, antiforgery: WindowPolicy) -> Self {
        Self {
            onboarding,
            antiforgery,
            windows: Mutex::new(HashMap::new()),
        }
    }

    const fn policy(&self, action: RateLimitAction) -> WindowPolicy {
        match action {
            RateLimitAction::Onboarding => self.onboarding,
            RateLimitAction::Antiforgery => self.antiforgery,
        }
    }

    fn check_at(&self, ip: Option<&str>, action: RateLimitAction, now: Instant) -> RateLimitDecision {
        let policy = self.policy(action);
        let key = (action, ip.unwrap_or(ANONYMOUS_KEY).to_string());

        let Ok(mut windows) = self.windows.lock() else {
            warn!("Rate limiter state poisoned; rejecting request");
            return RateLimitDecision::Limited;
        };
        windows.retain(|(kind, _), window| {
            now.duration_since(window.started) < self.policy(*kind).window
        });

        let window = windows.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });
        if window.count >= policy.permits {
            warn!(action = action.as_str(), "Rate limit exceeded");
            return RateLimitDecision::Limited;
        }
        window.count += 1;
        RateLimitDecision::Allowed
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        self.check_at(ip, action, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Onboarding),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn onboarding_allows_five_per_window() {
        let limiter = FixedWindowRateLimiter::default();
        for _ in 0..5 {
            assert_eq!(
                limiter.check_ip(Some("10.0.0.1"), RateLimitAction::Onboarding),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_ip(Some("10.0.0.1"), RateLimitAction::Onboarding),
            RateLimitDecision::Limited
        );
        // Other callers and actions keep their own windows.
        assert_eq!(
            limiter.check_ip(Some("10.0.0.2"), RateLimitAction::Onboarding),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("10.0.0.1"), RateLimitAction::Antiforgery),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn antiforgery_allows_ten_per_window() {
        let limiter = FixedWindowRateLimiter::default();
        for _ in 0..10 {
            assert_eq!(
                limiter.check_ip(None, RateLimitAction::Antiforgery),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Antiforgery),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = FixedWindowRateLimiter::new(
            WindowPolicy {
                permits: 1,
                window: Duration::from_secs(60),
            },
            WindowPolicy {
                permits: 1,
                window: Duration::from_secs(60),
            },
        );
        let start = Instant::now();
        assert_eq!(
            limiter.check_at(Some("ip"), RateLimitAction::Onboarding, start),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_at(Some("ip"), RateLimitAction::Onboarding, start),
            RateLimitDecision::Limited
        );
        let later = start + Duration::from_secs(61);
        assert_eq!(
            limiter.check_at(Some("ip"), RateLimitAction::Onboarding, later),
            RateLimitDecision::Allowed
        );
    }
}
