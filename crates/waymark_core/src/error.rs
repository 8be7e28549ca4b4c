//! Error types for the movement core.

use thiserror::Error;

use crate::components::EntityId;
use crate::math::Vec2Fixed;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the movement core.
#[derive(Debug, Error)]
pub enum GameError {
    /// The search frontier was exhausted without reaching the goal.
    #[error("No path from {from} to {to}")]
    NoPathFound {
        /// Start position of the query.
        from: Vec2Fixed,
        /// Requested destination.
        to: Vec2Fixed,
    },

    /// `advance` was called on an executor that is not moving.
    #[error("Unit {0} is not moving")]
    NotMoving(EntityId),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Loaded state does not match the entity it belongs to.
    #[error("Corrupt state for entity {entity}: {reason}")]
    StateCorruption {
        /// Entity whose load was aborted.
        entity: EntityId,
        /// What was inconsistent.
        reason: String,
    },

    /// A building footprint could not be placed.
    #[error("Cannot place building {building} at ({x}, {y}): {reason}")]
    PlacementBlocked {
        /// Building entity.
        building: EntityId,
        /// Footprint origin column.
        x: i32,
        /// Footprint origin row.
        y: i32,
        /// Why placement failed.
        reason: String,
    },

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the document that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// A key expected in a save archive was absent.
    #[error("Save archive is missing key '{0}'")]
    ArchiveMissing(String),

    /// A save archive value had the wrong type.
    #[error("Save archive key '{key}' holds {found}, expected {expected}")]
    ArchiveType {
        /// Offending key.
        key: String,
        /// Expected value kind.
        expected: &'static str,
        /// Actual value kind.
        found: &'static str,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
