//! In-process identity store used when no database is configured and in tests.

use super::{check_arguments, new_user, AppUser, IdentityError, IdentityStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

type IdentityKey = (String, String);

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    users: Mutex<HashMap<IdentityKey, AppUser>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded users.
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find(
        &self,
        idp_name: &str,
        idp_subject: &str,
    ) -> Result<Option<AppUser>, IdentityError> {
        check_arguments(idp_name, idp_subject, None)?;
        let users = self.users.lock().await;
        Ok(users
            .get(&(idp_name.to_string(), idp_subject.to_string()))
            .cloned())
    }

    async fn create(
        &self,
        idp_name: &str,
        idp_subject: &str,
        display_name: &str,
    ) -> Result<AppUser, IdentityError> {
        check_arguments(idp_name, idp_subject, Some(display_name))?;
        let key = (idp_name.to_string(), idp_subject.to_string());

        // Check and insert under one lock so concurrent creates cannot both win.
        let mut users = self.users.lock().await;
        if users.contains_key(&key) {
            return Err(IdentityError::DuplicateIdentity {
                idp_name: key.0,
                idp_subject: key.1,
            });
        }
        let user = new_user(idp_name, idp_subject, display_name);
        users.insert(key, user.clone());
        debug!(user_id = %user.id, "Recorded application user");
        Ok(user)
    }
}
