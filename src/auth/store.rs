//! Credential store contract shared by all backends.

use thiserror::Error;

use crate::auth::hasher::{self, DIGEST_LEN, SALT_LEN};

/// A registered user and their password verification material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique username.
    pub name: String,
    /// Administrative flag.
    pub admin: bool,
    /// `hash(password, salt)`.
    pub password_digest: Vec<u8>,
    /// Per-user random salt, fixed at registration.
    pub salt: Vec<u8>,
}

impl User {
    /// Build a record for `name` with a fresh salt.
    pub fn with_password(name: &str, password: &str) -> Self {
        let salt = hasher::generate_salt();
        Self {
            name: name.to_string(),
            admin: false,
            password_digest: hasher::hash(password, &salt),
            salt,
        }
    }

    /// Replace the digest for a new password, keeping the salt.
    pub fn set_password(&mut self, password: &str) {
        self.password_digest = hasher::hash(password, &self.salt);
    }

    /// Check `password` against this record.
    pub fn verify(&self, password: &str) -> Result<(), AuthError> {
        if hasher::compare(&hasher::hash(password, &self.salt), &self.password_digest) {
            Ok(())
        } else {
            Err(AuthError::WrongPassword)
        }
    }
}

/// Credential and storage errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User does not exist")]
    UnknownUser,
    #[error("User already exists")]
    UserExists,
    #[error("Wrong password")]
    WrongPassword,
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<sled::Error> for AuthError {
    fn from(e: sled::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}

/// Mapping of username to verification record.
///
/// Implementations must be safe to share between request tasks.
pub trait CredentialStore: Send + Sync {
    /// True iff `username` exists and `password` matches its digest.
    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.check(username, password).is_ok()
    }

    /// Like `authenticate`, but reports why a login failed.
    fn check(&self, username: &str, password: &str) -> Result<(), AuthError> {
        match self.get(username) {
            Ok(user) => user.verify(password),
            Err(AuthError::UnknownUser) => {
                burn_verification(password);
                Err(AuthError::UnknownUser)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a record for `username`. Fails with `UserExists` if one is present.
    fn register(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Fetch the record for `username`.
    fn get(&self, username: &str) -> Result<User, AuthError>;

    /// Replace the record for an existing user.
    fn update(&self, user: User) -> Result<(), AuthError>;
}

/// Hash and compare against a throwaway record so unknown usernames cost
/// the same as a wrong password.
pub(crate) fn burn_verification(password: &str) {
    const DUMMY_SALT: [u8; SALT_LEN] = [0x5a; SALT_LEN];
    const DUMMY_DIGEST: [u8; DIGEST_LEN] = [0xa5; DIGEST_LEN];
    let digest = hasher::hash(password, &DUMMY_SALT);
    let _ = hasher::compare(&digest, &DUMMY_DIGEST);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_verify() {
        let mut user = User::with_password("alice", "secret");
        assert!(user.verify("secret").is_ok());
        assert!(matches!(user.verify("secretx"), Err(AuthError::WrongPassword)));

        let salt = user.salt.clone();
        user.set_password("changed");
        assert_eq!(user.salt, salt);
        assert!(user.verify("changed").is_ok());
        assert!(user.verify("secret").is_err());
    }
}
