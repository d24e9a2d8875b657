//! Serde helpers rendering byte payloads as lowercase hex strings
//!
//! Use with `#[serde(with = "tapread_core::serde_hex")]` on `Vec<u8>` fields,
//! or one of the submodules for optional values, lists and fixed-size arrays.

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

/// Serialize bytes as a hex string
pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&hex::encode(bytes))
}

/// Deserialize bytes from a hex string
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    hex::decode(s).map_err(D::Error::custom)
}

/// Optional byte payloads, `null` when absent
pub mod option {
    use super::*;

    /// Serialize optional bytes
    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional bytes
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(D::Error::custom))
            .transpose()
    }
}

/// Lists of byte payloads
pub mod list {
    use super::*;
    use serde::ser::SerializeSeq;

    /// Serialize a list of byte payloads
    pub fn serialize<S>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&hex::encode(item))?;
        }
        seq.end()
    }

    /// Deserialize a list of byte payloads
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|s| hex::decode(s).map_err(D::Error::custom))
            .collect()
    }
}

/// Fixed-size byte arrays
pub mod array {
    use super::*;

    /// Serialize a fixed-size array
    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize a fixed-size array, rejecting any other length
    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = super::deserialize(deserializer)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"a fixed number of bytes"))
    }
}
