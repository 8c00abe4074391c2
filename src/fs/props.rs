//! fs::props
//!
//! Property lists for node-revisions, revisions and transactions.
//!
//! # Reserved Names
//!
//! Names starting with [`SYSTEM_PREFIX`] are reserved. On nodes they carry
//! the flags upstream layers query on hot paths (special file, executable,
//! needs-lock, externals). Every node record caches a [`SystemProps`]
//! snapshot of just that subset, so those queries never load the full list.
//!
//! On revisions, `sys:author`, `sys:date` and `sys:log` hold the commit
//! metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Prefix of reserved property names.
pub const SYSTEM_PREFIX: &str = "sys:";

/// Node is a special file (e.g. a symlink).
pub const PROP_SPECIAL: &str = "sys:special";
/// Node is executable.
pub const PROP_EXECUTABLE: &str = "sys:executable";
/// Node must be locked before editing.
pub const PROP_NEEDS_LOCK: &str = "sys:needs-lock";
/// Externals definition on a directory.
pub const PROP_EXTERNALS: &str = "sys:externals";

/// Revision author.
pub const PROP_REVISION_AUTHOR: &str = "sys:author";
/// Revision timestamp (RFC3339).
pub const PROP_REVISION_DATE: &str = "sys:date";
/// Revision log message.
pub const PROP_REVISION_LOG: &str = "sys:log";

/// Whether `name` is in the reserved namespace.
pub fn is_system_prop(name: &str) -> bool {
    name.starts_with(SYSTEM_PREFIX)
}

/// An ordered name to byte-string mapping.
///
/// Values are arbitrary bytes and are stored hex-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropList {
    #[serde(with = "crate::core::hex_bytes::map")]
    props: BTreeMap<String, Vec<u8>>,
}

impl PropList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.props.get(name).map(Vec::as_slice)
    }

    /// Set a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.props.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.props.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.props.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Get a property as UTF-8 text, lossily.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Snapshot of the reserved subset.
    pub fn system_props(&self) -> SystemProps {
        SystemProps {
            props: self
                .props
                .iter()
                .filter(|(k, _)| is_system_prop(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl FromIterator<(String, Vec<u8>)> for PropList {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            props: iter.into_iter().collect(),
        }
    }
}

/// The reserved properties of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProps {
    #[serde(with = "crate::core::hex_bytes::map")]
    props: BTreeMap<String, Vec<u8>>,
}

impl SystemProps {
    pub fn is_special(&self) -> bool {
        self.props.contains_key(PROP_SPECIAL)
    }

    pub fn is_executable(&self) -> bool {
        self.props.contains_key(PROP_EXECUTABLE)
    }

    pub fn needs_lock(&self) -> bool {
        self.props.contains_key(PROP_NEEDS_LOCK)
    }

    pub fn externals(&self) -> Option<&[u8]> {
        self.props.get(PROP_EXTERNALS).map(Vec::as_slice)
    }

    /// Whether a reserved property is present.
    pub fn has(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}
