//! Test fixtures and helpers.
//!
//! Pre-built maps, policies and units for consistent testing.

use std::sync::Arc;

use fixed::types::I32F32;
use waymark_core::components::{EntityId, Owner, Weapon};
use waymark_core::cost::{ClimbingPolicy, CostPolicy, GroundPolicy};
use waymark_core::map::{TileCoord, TileMap};
use waymark_core::math::Vec2Fixed;
use waymark_core::simulation::{Simulation, UnitSpawnParams};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Position from float coordinates (for tests only).
#[must_use]
pub fn pos(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(fixed_f(x), fixed_f(y))
}

/// Center of tile `(x, y)` on a map with unit-sized tiles.
#[must_use]
pub fn tile_center(x: i32, y: i32) -> Vec2Fixed {
    let half = fixed_f(0.5);
    Vec2Fixed::new(fixed(x) + half, fixed(y) + half)
}

/// Flat, fully walkable map with unit-sized tiles.
#[must_use]
pub fn open_map(width: u32, height: u32) -> TileMap {
    TileMap::new(width, height, I32F32::ONE)
}

/// Map with a solid block of buildings, `size` tiles wide, centered on `center`.
///
/// # Panics
///
/// Panics if the block does not fit on the map.
#[must_use]
pub fn map_with_block(width: u32, height: u32, center: TileCoord, size: u8) -> TileMap {
    let mut map = open_map(width, height);
    let half = i32::from(size) / 2;
    map.place_building(9_999, center.offset(-half, -half), size, size)
        .expect("block must fit on the map");
    map
}

/// Ground policy with unit step height.
#[must_use]
pub fn ground_policy(speed: i32) -> Arc<dyn CostPolicy> {
    Arc::new(GroundPolicy::new(fixed(speed), I32F32::ONE))
}

/// Climbing policy.
#[must_use]
pub fn climbing_policy(speed: i32, climb_penalty: i32) -> Arc<dyn CostPolicy> {
    Arc::new(ClimbingPolicy::new(fixed(speed), fixed(climb_penalty)))
}

/// Spawn an unarmed ground unit.
pub fn spawn_walker(sim: &mut Simulation, position: Vec2Fixed, team: u8) -> EntityId {
    sim.spawn_unit(UnitSpawnParams {
        position,
        owner: Owner::new(team, team),
        policy: Some(ground_policy(4)),
        weapon: None,
    })
}

/// Spawn an armed ground unit with hitscan weapon range `range`.
pub fn spawn_soldier(sim: &mut Simulation, position: Vec2Fixed, team: u8, range: i32) -> EntityId {
    sim.spawn_unit(UnitSpawnParams {
        position,
        owner: Owner::new(team, team),
        policy: Some(ground_policy(2)),
        weapon: Some(Weapon::new(fixed(range))),
    })
}
