//! API handlers for the handoff service.

pub mod health;
pub mod onboarding;
