//! Data structures for unit archetype configuration.
//!
//! Archetypes are deserialized from RON documents. Fixed-point values are
//! written as raw `I32F32` bits, so `4294967296` is `1.0`.
//!
//! **Note:** This module contains no IO. Callers read files and hand the
//! text to [`ArchetypeSet::from_ron`].

mod archetype_data;

pub use archetype_data::{ArchetypeData, ArchetypeSet, Traversal};
