//! Canonical byte-array <-> hex-string codec
//!
//! Every serialization boundary (persisted identities, transported channels
//! and packages) encodes binary fields through this module, either directly
//! or via the serde adapters [`hex_bytes`] and [`hex_array`].

use crate::error::{CryptoError, CryptoResult};

/// Encode bytes as lowercase hex
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into bytes
pub fn decode(input: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(input).map_err(|e| CryptoError::Encoding(format!("invalid hex: {}", e)))
}

/// Decode a hex string into a fixed-size array
pub fn decode_array<const N: usize>(input: &str) -> CryptoResult<[u8; N]> {
    let bytes = decode(input)?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::Encoding(format!(
            "expected {} bytes, got {}",
            N,
            bytes.len()
        ))
    })
}

/// Serde adapter for variable-length byte fields
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]> + ?Sized,
        S: Serializer,
    {
        serializer.serialize_str(&super::encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for fixed-size byte arrays (nonces, tags, salts, hashes)
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::decode_array::<N>(&s).map_err(serde::de::Error::custom)
    }
}
