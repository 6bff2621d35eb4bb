//! On-disk encoding of [`User`] records.
//!
//! # Layout (version 1)
//! ```text
//! u8   schema version (1)
//! u8   flags (bit 0 = admin)
//! u16  name length      | name bytes (UTF-8)
//! u16  digest length    | digest bytes
//! u16  salt length      | salt bytes
//! ```
//! All integers are big-endian. Decoders reject unknown versions and
//! trailing bytes instead of guessing.

use bytes::{Buf, BufMut};

use crate::auth::store::{AuthError, User};

/// Current schema version written by [`encode`].
pub const SCHEMA_VERSION: u8 = 1;

const FLAG_ADMIN: u8 = 0b0000_0001;

/// Serialize a user record.
///
/// Fails if any field is longer than a `u16` length prefix can describe.
pub fn encode(user: &User) -> Result<Vec<u8>, AuthError> {
    let mut buf = Vec::with_capacity(
        2 + 6 + user.name.len() + user.password_digest.len() + user.salt.len(),
    );
    buf.put_u8(SCHEMA_VERSION);
    buf.put_u8(if user.admin { FLAG_ADMIN } else { 0 });
    put_field(&mut buf, "name", user.name.as_bytes())?;
    put_field(&mut buf, "digest", &user.password_digest)?;
    put_field(&mut buf, "salt", &user.salt)?;
    Ok(buf)
}

/// Deserialize a user record.
pub fn decode(mut data: &[u8]) -> Result<User, AuthError> {
    if data.remaining() < 2 {
        return Err(corrupt("record too short"));
    }
    let version = data.get_u8();
    if version != SCHEMA_VERSION {
        return Err(corrupt(&format!("unsupported schema version {}", version)));
    }
    let flags = data.get_u8();

    let name = take_field(&mut data)?;
    let password_digest = take_field(&mut data)?;
    let salt = take_field(&mut data)?;
    if data.has_remaining() {
        return Err(corrupt("trailing bytes"));
    }

    let name = String::from_utf8(name).map_err(|_| corrupt("name is not UTF-8"))?;
    Ok(User {
        name,
        admin: flags & FLAG_ADMIN != 0,
        password_digest,
        salt,
    })
}

fn put_field(buf: &mut Vec<u8>, label: &str, field: &[u8]) -> Result<(), AuthError> {
    let len = u16::try_from(field.len()).map_err(|_| {
        AuthError::Storage(format!("{} is too long to store ({} bytes)", label, field.len()))
    })?;
    buf.put_u16(len);
    buf.put_slice(field);
    Ok(())
}

fn take_field(data: &mut &[u8]) -> Result<Vec<u8>, AuthError> {
    if data.remaining() < 2 {
        return Err(corrupt("truncated length prefix"));
    }
    let len = data.get_u16() as usize;
    if data.remaining() < len {
        return Err(corrupt("truncated field"));
    }
    let field = data[..len].to_vec();
    data.advance(len);
    Ok(field)
}

fn corrupt(reason: &str) -> AuthError {
    AuthError::Storage(format!("corrupt user record: {}", reason))
}
