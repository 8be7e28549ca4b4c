//! # Waymark Core
//!
//! Deterministic unit movement for tile-based strategy games.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No floating-point math (uses fixed-point)
//!
//! Two clients fed the same map and orders plan the same paths and walk
//! them to the same positions, tick for tick.
//!
//! ## Crate Structure
//!
//! - [`map`] - Tile graph, heights and building occupancy
//! - [`cost`] - Per-archetype edge costs and heuristics
//! - [`pathfinding`] - A* over tiles and temporary anchors
//! - [`movement`] - Per-unit movement state machine
//! - [`orders`] - Move/attack/shoot dispatch and target tracking
//! - [`simulation`] - Context object and tick loop
//! - [`persistence`] - Key/value save boundary
//! - [`data`] - RON archetype definitions
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod components;
pub mod cost;
pub mod data;
pub mod error;
pub mod events;
pub mod map;
pub mod math;
pub mod movement;
pub mod orders;
pub mod pathfinding;
pub mod persistence;
pub mod simulation;
pub mod targeting;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::*;
    pub use crate::cost::{ClimbingPolicy, CostPolicy, GroundPolicy};
    pub use crate::error::{GameError, Result};
    pub use crate::map::{TileCoord, TileMap, TileNode};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::movement::{MoveState, MovementEvent, MovementExecutor};
    pub use crate::orders::{CombatEvent, IssuedOrder, Order, ShotTarget};
    pub use crate::pathfinding::{find_path, Path, Waypoint};
    pub use crate::simulation::{Simulation, TickEvents, UnitSpawnParams};
}
