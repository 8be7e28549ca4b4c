//! Key/value save boundary.
//!
//! The save system owns the container format. The core only writes plain
//! values under string keys through [`SaveArchive`]. [`MemoryArchive`] is an
//! in-memory implementation used by tools and tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveValue {
    /// Integer value.
    Int(i64),
    /// Fixed-point value, stored as raw bits.
    Fixed(#[serde(with = "fixed_serde")] Fixed),
    /// Text value.
    Text(String),
}

impl SaveValue {
    /// Name of the value kind, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Fixed(_) => "fixed",
            Self::Text(_) => "text",
        }
    }
}

/// Opaque key/value store provided by the save system.
pub trait SaveArchive {
    /// Store a value, replacing any previous one.
    fn put(&mut self, key: &str, value: SaveValue);

    /// Look up a value.
    fn get(&self, key: &str) -> Option<&SaveValue>;

    /// Store an integer.
    fn put_int(&mut self, key: &str, value: i64) {
        self.put(key, SaveValue::Int(value));
    }

    /// Store a fixed-point number.
    fn put_fixed(&mut self, key: &str, value: Fixed) {
        self.put(key, SaveValue::Fixed(value));
    }

    /// Store a vector as `{key}.x` and `{key}.y`.
    fn put_vec(&mut self, key: &str, value: Vec2Fixed) {
        self.put_fixed(&format!("{key}.x"), value.x);
        self.put_fixed(&format!("{key}.y"), value.y);
    }

    /// Read a required integer.
    fn get_int(&self, key: &str) -> Result<i64> {
        match self.get(key) {
            Some(SaveValue::Int(value)) => Ok(*value),
            Some(other) => Err(type_error(key, "int", other)),
            None => Err(GameError::ArchiveMissing(key.to_string())),
        }
    }

    /// Read a required fixed-point number.
    fn get_fixed(&self, key: &str) -> Result<Fixed> {
        match self.get(key) {
            Some(SaveValue::Fixed(value)) => Ok(*value),
            Some(other) => Err(type_error(key, "fixed", other)),
            None => Err(GameError::ArchiveMissing(key.to_string())),
        }
    }

    /// Read a required text value.
    fn get_text(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(SaveValue::Text(value)) => Ok(value),
            Some(other) => Err(type_error(key, "text", other)),
            None => Err(GameError::ArchiveMissing(key.to_string())),
        }
    }

    /// Read a vector written by [`SaveArchive::put_vec`].
    fn get_vec(&self, key: &str) -> Result<Vec2Fixed> {
        Ok(Vec2Fixed::new(
            self.get_fixed(&format!("{key}.x"))?,
            self.get_fixed(&format!("{key}.y"))?,
        ))
    }
}

fn type_error(key: &str, expected: &'static str, found: &SaveValue) -> GameError {
    GameError::ArchiveType {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Sorted in-memory archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryArchive {
    entries: BTreeMap<String, SaveValue>,
}

impl MemoryArchive {
    /// Create an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<SaveValue> {
        self.entries.remove(key)
    }

    /// Serialize the archive to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize archive: {}", e)))
    }

    /// Deserialize an archive from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize archive: {}", e)))
    }
}

impl SaveArchive for MemoryArchive {
    fn put(&mut self, key: &str, value: SaveValue) {
        self.entries.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<&SaveValue> {
        self.entries.get(key)
    }
}
