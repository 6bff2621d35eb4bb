//! Single-record in-memory credential store.
//!
//! Intended for bootstrapping and tests only. It holds at most one user,
//! and `register` replaces that user unconditionally. Not for production.

use std::sync::RwLock;

use crate::auth::store::{AuthError, CredentialStore, User};

/// In-memory store with zero or one record.
#[derive(Debug, Default)]
pub struct EphemeralStore {
    user: RwLock<Option<User>>,
}

impl EphemeralStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with one administrative user.
    pub fn with_user(username: &str, password: &str) -> Self {
        let mut user = User::with_password(username, password);
        user.admin = true;
        Self {
            user: RwLock::new(Some(user)),
        }
    }
}

impl CredentialStore for EphemeralStore {
    fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut slot = self
            .user
            .write()
            .map_err(|_| AuthError::Storage("ephemeral store lock poisoned".into()))?;
        *slot = Some(User::with_password(username, password));
        Ok(())
    }

    fn get(&self, username: &str) -> Result<User, AuthError> {
        let slot = self
            .user
            .read()
            .map_err(|_| AuthError::Storage("ephemeral store lock poisoned".into()))?;
        match slot.as_ref() {
            Some(user) if user.name == username => Ok(user.clone()),
            _ => Err(AuthError::UnknownUser),
        }
    }

    fn update(&self, user: User) -> Result<(), AuthError> {
        let mut slot = self
            .user
            .write()
            .map_err(|_| AuthError::Storage("ephemeral store lock poisoned".into()))?;
        match slot.as_mut() {
            Some(current) if current.name == user.name => {
                *current = user;
                Ok(())
            }
            _ => Err(AuthError::UnknownUser),
        }
    }
}
