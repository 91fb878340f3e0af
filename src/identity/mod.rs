//! Local identity store.
//!
//! Application users are keyed by the `(idp_name, idp_subject)` pair asserted
//! by the identity provider. The store only supports lookup and creation:
//! records are never mutated by the onboarding flow, and the pair is unique
//! across all records. A concurrent second `create` for the same pair fails
//! with [`IdentityError::DuplicateIdentity`].

mod memory;
mod postgres;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Longest display name the `app_users` column accepts.
pub const DISPLAY_NAME_COLUMN_MAX: usize = 80;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppUser {
    pub id: Uuid,
    pub idp_name: String,
    pub idp_subject: String,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("user with idp `{idp_name}` and subject `{idp_subject}` already exists")]
    DuplicateIdentity {
        idp_name: String,
        idp_subject: String,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Short backend name reported by `/health`.
    fn backend(&self) -> &'static str;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), IdentityError> {
        Ok(())
    }

    /// Look up a user by external identity.
    async fn find(&self, idp_name: &str, idp_subject: &str)
        -> Result<Option<AppUser>, IdentityError>;

    /// Record a new user for the external identity.
    ///
    /// # Errors
    /// `DuplicateIdentity` when the pair is already recorded, `InvalidArgument`
    /// when any argument is blank.
    async fn create(
        &self,
        idp_name: &str,
        idp_subject: &str,
        display_name: &str,
    ) -> Result<AppUser, IdentityError>;
}

/// Reject blank arguments before touching the backend.
fn check_arguments(
    idp_name: &str,
    idp_subject: &str,
    display_name: Option<&str>,
) -> Result<(), IdentityError> {
    if idp_name.trim().is_empty() {
        return Err(IdentityError::InvalidArgument("idp_name is empty"));
    }
    if idp_subject.trim().is_empty() {
        return Err(IdentityError::InvalidArgument("idp_subject is empty"));
    }
    if let Some(display_name) = display_name {
        if display_name.trim().is_empty() {
            return Err(IdentityError::InvalidArgument("display_name is empty"));
        }
        if display_name.chars().count() > DISPLAY_NAME_COLUMN_MAX {
            return Err(IdentityError::InvalidArgument("display_name is too long"));
        }
    }
    Ok(())
}

/// Build a new user with a time-ordered id.
fn new_user(idp_name: &str, idp_subject: &str, display_name: &str) -> AppUser {
    AppUser {
        id: Uuid::now_v7(),
        idp_name: idp_name.to_string(),
        idp_subject: idp_subject.to_string(),
        display_name: display_name.to_string(),
    }
}
