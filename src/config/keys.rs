//! Secret key material stored as base64 in the config file.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Raw key bytes. Serialized as standard base64.
///
/// Non-empty keys must be 32 or 64 bytes long.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    /// Generate `len` random bytes from the OS CSPRNG.
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// Never print key material.
impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({} bytes)", self.0.len())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            return Ok(Self::default());
        }
        let bytes = STANDARD.decode(text.trim()).map_err(serde::de::Error::custom)?;
        if !(bytes.len() == 32 || bytes.len() == 64) {
            return Err(serde::de::Error::custom(format!(
                "Invalid key length {}. Expected 32 or 64 bytes.",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Holder {
        key: Key,
    }

    #[test]
    fn base64_round_trip_in_toml() {
        let original = Holder { key: Key::generate(64) };
        let text = toml::to_string(&original).unwrap();
        let parsed: Holder = toml::from_str(&text).unwrap();
        assert_eq!(parsed.key, original.key);
    }

    #[test]
    fn rejects_odd_lengths() {
        let text = format!("key = \"{}\"", STANDARD.encode([0u8; 16]));
        assert!(toml::from_str::<Holder>(&text).is_err());
    }

    #[test]
    fn debug_hides_bytes() {
        assert_eq!(format!("{:?}", Key::from(vec![1, 2, 3])), "Key(3 bytes)");
    }
}
