//! Durable credential store backed by sled.
//!
//! # Responsibilities
//! - Own the database directory (sled holds an exclusive file lock while open)
//! - Keep one `users` tree keyed by username
//! - Run registrations and updates as single read-check-write transactions
//!
//! # Design Decisions
//! - Salt and digest are computed before the transaction starts, so a
//!   retried transaction never re-rolls the salt
//! - Writes are flushed before returning success
//! - Values use the explicit layout in [`crate::auth::record`]

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::auth::record;
use crate::auth::store::{AuthError, CredentialStore, User};

const USERS_TREE: &str = "users";

/// Transactional credential store.
pub struct SledStore {
    db: sled::Db,
    users: sled::Tree,
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            tracing::error!(error = %e, file = %path.display(), "Opening credential database");
            AuthError::from(e)
        })?;
        let users = db.open_tree(USERS_TREE).map_err(|e| {
            tracing::error!(error = %e, file = %path.display(), "Creating users tree");
            AuthError::from(e)
        })?;
        tracing::debug!(file = %path.display(), "Sled credential store initialized");
        Ok(Self { db, users })
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn flush(&self) -> Result<(), AuthError> {
        self.db.flush()?;
        Ok(())
    }
}

fn finish(result: Result<(), TransactionError<AuthError>>) -> Result<(), AuthError> {
    match result {
        Ok(()) => Ok(()),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(e.into()),
    }
}

impl CredentialStore for SledStore {
    fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let encoded = record::encode(&User::with_password(username, password))?;

        let result = self.users.transaction(|tx| {
            if tx.get(username.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(AuthError::UserExists));
            }
            tx.insert(username.as_bytes(), encoded.as_slice())?;
            Ok(())
        });
        finish(result)?;
        self.flush()
    }

    fn get(&self, username: &str) -> Result<User, AuthError> {
        match self.users.get(username.as_bytes())? {
            Some(data) => record::decode(&data),
            None => Err(AuthError::UnknownUser),
        }
    }

    fn update(&self, user: User) -> Result<(), AuthError> {
        let encoded = record::encode(&user)?;

        let result = self.users.transaction(|tx| {
            if tx.get(user.name.as_bytes())?.is_none() {
                return Err(ConflictableTransactionError::Abort(AuthError::UnknownUser));
            }
            tx.insert(user.name.as_bytes(), encoded.as_slice())?;
            Ok(())
        });
        finish(result)?;
        self.flush()
    }
}
