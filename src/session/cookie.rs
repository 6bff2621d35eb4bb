//! Signed, encrypted cookie sessions.
//!
//! # Responsibilities
//! - Materialize a [`Session`] from the request's cookie on every request
//! - Seal a session back into a `Set-Cookie` header
//!
//! # Cookie format
//! ```text
//! base64url( timestamp:u64 | nonce:12 | ChaCha20-Poly1305(json) | HMAC-SHA512 )
//! ```
//! The MAC covers the cookie name and everything before it, so a value
//! cannot be replayed under another cookie name.
//!
//! # Design Decisions
//! - No server-side session table; the cookie is the only copy
//! - Both keys are fixed at startup; rotating either logs everyone out
//! - Anything that fails to verify is treated as an empty session

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;

use crate::config::SessionConfig;

/// Signing (HMAC) key length.
pub const SIGNING_KEY_LEN: usize = 64;
/// Encryption key length.
pub const ENCRYPTION_KEY_LEN: usize = 32;

const TIMESTAMP_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MAC_LEN: usize = 64;

type HmacSha512 = Hmac<Sha512>;

/// Per-client session state carried in the cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "loggedin", default)]
    pub logged_in: bool,
}

/// Session sealing/opening errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("signing key must be 64 bytes, got {0}")]
    SigningKeyLength(usize),
    #[error("encryption key must be 32 bytes, got {0}")]
    EncryptionKeyLength(usize),
    #[error("invalid session cookie: {0}")]
    Invalid(&'static str),
    #[error("failed to seal session: {0}")]
    Seal(String),
}

/// Cookie codec keyed by the process-wide signing and encryption keys.
#[derive(Clone)]
pub struct SessionStore {
    mac: HmacSha512,
    cipher: ChaCha20Poly1305,
    cookie_name: String,
    max_age: Duration,
    secure: bool,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("cookie_name", &self.cookie_name)
            .field("max_age", &self.max_age)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Build a store from raw keys.
    pub fn new(
        signing_key: &[u8],
        encryption_key: &[u8],
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        if signing_key.len() != SIGNING_KEY_LEN {
            return Err(SessionError::SigningKeyLength(signing_key.len()));
        }
        if encryption_key.len() != ENCRYPTION_KEY_LEN {
            return Err(SessionError::EncryptionKeyLength(encryption_key.len()));
        }
        let mac = <HmacSha512 as Mac>::new_from_slice(signing_key)
            .map_err(|_| SessionError::SigningKeyLength(signing_key.len()))?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(encryption_key));

        Ok(Self {
            mac,
            cipher,
            cookie_name: config.cookie_name.clone(),
            max_age: Duration::from_secs(config.max_age_secs),
            secure: config.secure,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Read the session from request headers.
    ///
    /// Missing, expired or tampered cookies yield an empty session.
    pub fn load(&self, headers: &HeaderMap) -> Session {
        let Some(value) = find_cookie(headers, &self.cookie_name) else {
            return Session::default();
        };
        match self.open(value) {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(error = %e, cookie = %self.cookie_name, "Discarding session cookie");
                Session::default()
            }
        }
    }

    /// Append a `Set-Cookie` header carrying `session`.
    pub fn save(&self, session: &Session, headers: &mut HeaderMap) -> Result<(), SessionError> {
        let value = self.seal(session)?;
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name,
            value,
            self.max_age.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        let header = HeaderValue::from_str(&cookie)
            .map_err(|e| SessionError::Seal(e.to_string()))?;
        headers.append(SET_COOKIE, header);
        Ok(())
    }

    /// Encode a session into a cookie value.
    pub fn seal(&self, session: &Session) -> Result<String, SessionError> {
        let plaintext =
            serde_json::to_vec(session).map_err(|e| SessionError::Seal(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| SessionError::Seal(e.to_string()))?;

        let mut payload = Vec::with_capacity(TIMESTAMP_LEN + NONCE_LEN + ciphertext.len() + MAC_LEN);
        payload.extend_from_slice(&unix_now().to_be_bytes());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        let tag = self.sign(&payload).finalize().into_bytes();
        payload.extend_from_slice(&tag);
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decode and verify a cookie value.
    pub fn open(&self, value: &str) -> Result<Session, SessionError> {
        let raw = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| SessionError::Invalid("not base64"))?;
        if raw.len() < TIMESTAMP_LEN + NONCE_LEN + TAG_LEN + MAC_LEN {
            return Err(SessionError::Invalid("too short"));
        }

        let (payload, tag) = raw.split_at(raw.len() - MAC_LEN);
        self.sign(payload)
            .verify_slice(tag)
            .map_err(|_| SessionError::Invalid("bad signature"))?;

        let (timestamp, rest) = payload.split_at(TIMESTAMP_LEN);
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(timestamp);
        let issued = u64::from_be_bytes(ts);
        let now = unix_now();
        if issued > now.saturating_add(60) {
            return Err(SessionError::Invalid("issued in the future"));
        }
        if now.saturating_sub(issued) > self.max_age.as_secs() {
            return Err(SessionError::Invalid("expired"));
        }

        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SessionError::Invalid("decryption failed"))?;
        serde_json::from_slice(&plaintext).map_err(|_| SessionError::Invalid("malformed payload"))
    }

    fn sign(&self, payload: &[u8]) -> HmacSha512 {
        let mut mac = self.mac.clone();
        mac.update(self.cookie_name.as_bytes());
        mac.update(b"|");
        mac.update(payload);
        mac
    }
}

fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
