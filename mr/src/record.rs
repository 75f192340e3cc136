//! The data units exchanged between ranks.
//!
//! A [`KeyValue`] is the only record type that crosses the shuffle. Its key is
//! a [`Key`], a string bounded to [`KEY_CAPACITY`] bytes: longer input is cut
//! down to the longest prefix that fits and still ends on a UTF-8 character
//! boundary, so `"abcdefghij"` and `"abcdefghXY"` are the same key. Shorter
//! input is kept as-is.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Maximum length of a [`Key`] in bytes.
pub const KEY_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Builds a key, truncating to [`KEY_CAPACITY`] bytes.
    pub fn new(raw: &str) -> Self {
        let mut end = raw.len().min(KEY_CAPACITY);
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        Key(raw[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Key::new(raw)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Re-applies truncation so an over-long key can't arrive from a peer.
impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Key::new(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    key: Key,
    value: i32,
}

impl KeyValue {
    pub fn new(key: impl Into<Key>, value: i32) -> Self {
        KeyValue {
            key: key.into(),
            value,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn value(&self) -> i32 {
        self.value
    }
}

/// Everything one map call produced for one work unit, in emission order.
pub type MapTaskOutput = Vec<KeyValue>;

/// The raw contents of one input file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit(Vec<u8>);

impl WorkUnit {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        WorkUnit(bytes.into())
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

impl From<&str> for WorkUnit {
    fn from(text: &str) -> Self {
        WorkUnit(text.as_bytes().to_vec())
    }
}
