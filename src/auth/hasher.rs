//! Salted password hashing and timing-safe digest comparison.
//!
//! # Responsibilities
//! - Derive a fixed-length digest from a password and a per-user salt
//! - Generate salts from the OS random source
//! - Compare digests without revealing where they first differ
//!
//! # Design Decisions
//! - The hash algorithm is a type parameter; `Sha512` is the default
//! - Salts are only ever produced here, never from user input

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// Digest length of the default algorithm (SHA-512).
pub const DIGEST_LEN: usize = 64;

/// Hash `password` with `salt` using the default algorithm.
pub fn hash(password: &str, salt: &[u8]) -> Vec<u8> {
    hash_with::<Sha512>(password, salt)
}

/// Hash `password` with `salt` using the digest algorithm `D`.
pub fn hash_with<D: Digest>(password: &str, salt: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    hasher.finalize().to_vec()
}

/// Compare two digests.
///
/// Returns false immediately on a length mismatch. Otherwise every byte
/// position is visited, even after a difference has been found.
pub fn compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    std::hint::black_box(diff) == 0
}

/// Generate a fresh salt from the OS CSPRNG.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
