//! Scenario loading and configuration.
//!
//! Scenarios describe a map, the archetypes available on it, the units and
//! structures placed at tick 0, and a schedule of orders. Positions and
//! heights are written as plain decimals; archetype stats use the raw
//! fixed-point bits of the core data format.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use waymark_core::data::ArchetypeData;
use waymark_core::error::GameError;
use waymark_core::math::{Fixed, Vec2Fixed};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A unit names an archetype the scenario does not define.
    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),
    /// An order names a unit the scenario does not place.
    #[error("Unknown unit label: {0}")]
    UnknownUnit(String),
    /// Two units share a label.
    #[error("Duplicate unit label: {0}")]
    DuplicateUnit(String),
    /// A decimal value does not fit the fixed-point range.
    #[error("Value out of range for {field}: {value}")]
    OutOfRange {
        /// Which field held the value.
        field: &'static str,
        /// The offending value.
        value: f64,
    },
    /// The core rejected part of the setup.
    #[error(transparent)]
    Core(#[from] GameError),
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Terrain layout.
    pub map: MapSetup,
    /// Archetypes units may use.
    #[serde(default)]
    pub archetypes: Vec<ArchetypeData>,
    /// Buildings placed before the first tick.
    #[serde(default)]
    pub structures: Vec<StructurePlacement>,
    /// Units placed before the first tick.
    #[serde(default)]
    pub units: Vec<UnitPlacement>,
    /// Orders issued at given ticks.
    #[serde(default)]
    pub orders: Vec<TimedOrder>,
    /// Tick limit when the command line does not override it.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

fn default_max_ticks() -> u64 {
    1200
}

fn default_tile_size() -> f64 {
    1.0
}

/// Terrain layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSetup {
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    /// Edge length of a tile in world units.
    #[serde(default = "default_tile_size")]
    pub tile_size: f64,
    /// Unwalkable tiles.
    #[serde(default)]
    pub blocked: Vec<(i32, i32)>,
    /// Vertex heights; unlisted vertices stay at zero.
    #[serde(default)]
    pub heights: Vec<VertexHeight>,
}

/// Height of one heightmap vertex.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VertexHeight {
    /// Vertex column, `0..=width`.
    pub x: u32,
    /// Vertex row, `0..=height`.
    pub y: u32,
    /// Height in world units.
    pub height: f64,
}

/// A building footprint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StructurePlacement {
    /// Lower-left tile.
    pub origin: (i32, i32),
    /// Width and height in tiles.
    #[serde(default = "default_structure_size")]
    pub size: (u8, u8),
    /// Owning team.
    #[serde(default)]
    pub team: u8,
}

fn default_structure_size() -> (u8, u8) {
    (1, 1)
}

/// A unit placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Name used by orders and in the report.
    pub label: String,
    /// Archetype name.
    pub archetype: String,
    /// World position.
    pub position: (f64, f64),
    /// Owning team.
    #[serde(default)]
    pub team: u8,
}

/// An order issued just before the given tick runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedOrder {
    /// Tick at which the order is submitted.
    #[serde(default)]
    pub tick: u64,
    /// Label of the ordered unit.
    pub unit: String,
    /// What to do.
    pub order: OrderSpec,
}

/// Scenario form of an order, referring to units by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderSpec {
    /// Walk to a world position.
    Move(f64, f64),
    /// Hunt a labeled unit.
    Attack(String),
    /// Fire at a world position.
    ShootAt(f64, f64),
    /// Fire at a labeled unit.
    ShootUnit(String),
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Look up an archetype by name. Archetypes that cannot move are rejected.
    pub fn archetype(&self, name: &str) -> Result<&ArchetypeData, ScenarioError> {
        let archetype = self
            .archetypes
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| ScenarioError::UnknownArchetype(name.to_string()))?;
        if archetype.speed <= Fixed::ZERO {
            return Err(ScenarioError::OutOfRange {
                field: "archetype.speed",
                value: archetype.speed.to_num::<f64>(),
            });
        }
        Ok(archetype)
    }
}

/// Convert a decimal to fixed point, rejecting values that do not fit.
pub fn to_fixed(field: &'static str, value: f64) -> Result<Fixed, ScenarioError> {
    Fixed::checked_from_num(value).ok_or(ScenarioError::OutOfRange { field, value })
}

/// Convert a decimal pair to a fixed-point position.
pub fn to_position(field: &'static str, (x, y): (f64, f64)) -> Result<Vec2Fixed, ScenarioError> {
    Ok(Vec2Fixed::new(to_fixed(field, x)?, to_fixed(field, y)?))
}
