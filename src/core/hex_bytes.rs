//! core::hex_bytes
//!
//! Serde helpers that store arbitrary byte strings as lowercase hex inside
//! JSON records. Property values and journaled record bodies are not assumed
//! to be UTF-8, so they never go into JSON as raw strings.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Blob {
//!     #[serde(with = "revfs::core::hex_bytes")]
//!     data: Vec<u8>,
//! }
//!
//! let json = serde_json::to_string(&Blob { data: vec![0xff, 0x00] }).unwrap();
//! assert_eq!(json, r#"{"data":"ff00"}"#);
//! ```

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(&s).map_err(D::Error::custom)
}

/// Same encoding for `BTreeMap<String, Vec<u8>>` values.
pub mod map {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, String> = map
            .iter()
            .map(|(k, v)| (k.as_str(), hex::encode(v)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| hex::decode(&v).map(|bytes| (k, bytes)).map_err(D::Error::custom))
            .collect()
    }
}
