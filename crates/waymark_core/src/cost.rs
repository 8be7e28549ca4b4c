//! Pluggable edge-cost and heuristic functions.
//!
//! Costs are travel times: world-space lengths divided by the unit's planar
//! speed. Each archetype supplies a [`CostPolicy`]; blocked edges are
//! reported as `None` and simply pruned by the search.
//!
//! Every edge is costed as a 3D polyline whose length is rounded up, then one
//! ulp is added after the division. The heuristic uses the planar straight
//! line rounded down. This keeps the heuristic a strict lower bound on any
//! edge sequence, so A* stays optimal.

use std::fmt;

use crate::map::{TileMap, TileNode};
use crate::math::{length_ceil, Fixed, Vec2Fixed};
use crate::pathfinding::{NodeRef, Waypoint};

/// Per-archetype traversal rules.
pub trait CostPolicy: fmt::Debug {
    /// Planar speed in world units per second.
    fn speed(&self) -> Fixed;

    /// Cost of moving between two adjacent tile nodes.
    ///
    /// Returns `None` when the tiles are not 8-adjacent, when the move cuts
    /// a diagonal between two buildings, or when the archetype cannot make
    /// the move.
    fn tile_edge_cost(&self, map: &TileMap, from: &TileNode, to: &TileNode) -> Option<Fixed>;

    /// Multiplier applied to height differences when measuring lengths.
    fn vertical_scale(&self) -> Fixed {
        Fixed::ONE
    }

    /// Whether the archetype can climb or drop from `from_height` to
    /// `to_height` in one edge. Applies to every edge kind.
    fn step_allowed(&self, _from_height: Fixed, _to_height: Fixed) -> bool {
        true
    }

    /// Lower bound on the travel time between two positions.
    fn heuristic(&self, from: Vec2Fixed, to: Vec2Fixed) -> Fixed {
        from.distance(to).saturating_div(self.speed())
    }

    /// Cost from a start anchor to a tile it may link to.
    fn temp_to_tile_cost(&self, map: &TileMap, anchor: Vec2Fixed, tile: &TileNode) -> Option<Fixed> {
        if !start_link_allowed(map, anchor, tile) || !self.step_allowed(map.height_at(anchor), tile.height) {
            return None;
        }
        Some(self.straight_cost(map, anchor, tile.center))
    }

    /// Cost from a tile to a goal anchor it may link to.
    fn tile_to_temp_cost(&self, map: &TileMap, tile: &TileNode, anchor: Vec2Fixed) -> Option<Fixed> {
        if !goal_link_allowed(map, tile, anchor) || !self.step_allowed(tile.height, map.height_at(anchor)) {
            return None;
        }
        Some(self.straight_cost(map, tile.center, anchor))
    }

    /// Cost between two anchors; only valid inside one usable cell.
    fn temp_edge_cost(&self, map: &TileMap, from: Vec2Fixed, to: Vec2Fixed) -> Option<Fixed> {
        let cell = map.cell_at(from)?;
        if map.cell_at(to) != Some(cell) || !map.is_usable(cell) {
            return None;
        }
        if !self.step_allowed(map.height_at(from), map.height_at(to)) {
            return None;
        }
        Some(self.straight_cost(map, from, to))
    }

    /// Straight 3D segment over the terrain.
    fn straight_cost(&self, map: &TileMap, from: Vec2Fixed, to: Vec2Fixed) -> Fixed {
        let dz = (map.height_at(to) - map.height_at(from)).saturating_mul(self.vertical_scale());
        let length = length_ceil(&[to.x - from.x, to.y - from.y, dz]);
        travel_time(length, self.speed())
    }

    /// Cost between two waypoints, dispatched on the node kinds.
    ///
    /// A temp node at the head of an edge is treated as a start anchor and
    /// one at the tail as a goal anchor.
    fn edge_cost(&self, map: &TileMap, from: &Waypoint, to: &Waypoint) -> Option<Fixed> {
        match (from.node, to.node) {
            (NodeRef::Tile(a), NodeRef::Tile(b)) => {
                let a = map.tile_node(a)?;
                let b = map.tile_node(b)?;
                self.tile_edge_cost(map, &a, &b)
            }
            (NodeRef::Temp, NodeRef::Tile(b)) => {
                let b = map.tile_node(b)?;
                self.temp_to_tile_cost(map, from.position, &b)
            }
            (NodeRef::Tile(a), NodeRef::Temp) => {
                let a = map.tile_node(a)?;
                self.tile_to_temp_cost(map, &a, to.position)
            }
            (NodeRef::Temp, NodeRef::Temp) => self.temp_edge_cost(map, from.position, to.position),
        }
    }
}

/// Convert a length to a travel time, never rounding below the true quotient.
#[must_use]
pub fn travel_time(length: Fixed, speed: Fixed) -> Fixed {
    length.saturating_div(speed).saturating_add(Fixed::DELTA)
}

/// Length of the center → shared edge → center polyline between two
/// adjacent tiles, with heights scaled by `vertical_scale`.
#[must_use]
pub fn via_edge_length(map: &TileMap, from: &TileNode, to: &TileNode, vertical_scale: Fixed) -> Fixed {
    let mid = map.edge_midpoint(from.coord, to.coord);
    let mid_height = map.height_at(mid);

    let first = length_ceil(&[
        mid.x - from.center.x,
        mid.y - from.center.y,
        (mid_height - from.height).saturating_mul(vertical_scale),
    ]);
    let second = length_ceil(&[
        to.center.x - mid.x,
        to.center.y - mid.y,
        (to.height - mid_height).saturating_mul(vertical_scale),
    ]);
    first.saturating_add(second)
}

/// Shared adjacency checks for tile-to-tile moves.
#[must_use]
pub fn tiles_linked(map: &TileMap, from: &TileNode, to: &TileNode) -> bool {
    from.coord.is_adjacent(to.coord) && !map.diagonal_blocked(from.coord, to.coord)
}

/// A start anchor links to its own usable cell and that cell's neighbors.
/// Standing on an unusable cell, it may only step to the closest usable tile.
#[must_use]
pub fn start_link_allowed(map: &TileMap, anchor: Vec2Fixed, tile: &TileNode) -> bool {
    match map.cell_at(anchor).filter(|&cell| map.is_usable(cell)) {
        Some(home) => {
            tile.coord == home
                || (home.is_adjacent(tile.coord) && !map.diagonal_blocked(home, tile.coord))
        }
        None => map
            .closest_node(anchor)
            .is_some_and(|closest| closest.coord == tile.coord),
    }
}

/// A goal anchor is reachable from its own cell and that cell's neighbors,
/// and only when its own cell is usable.
#[must_use]
pub fn goal_link_allowed(map: &TileMap, tile: &TileNode, anchor: Vec2Fixed) -> bool {
    let Some(home) = map.cell_at(anchor).filter(|&cell| map.is_usable(cell)) else {
        return false;
    };
    tile.coord == home || (tile.coord.is_adjacent(home) && !map.diagonal_blocked(tile.coord, home))
}

/// Ground units: blocked by steep steps between tile centers and anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroundPolicy {
    /// Planar speed in world units per second.
    pub speed: Fixed,
    /// Largest height difference a single edge may span.
    pub max_step: Fixed,
}

impl GroundPolicy {
    /// Create a ground policy.
    ///
    /// # Panics
    ///
    /// Panics if `speed` is not positive.
    #[must_use]
    pub fn new(speed: Fixed, max_step: Fixed) -> Self {
        assert!(speed > Fixed::ZERO, "GroundPolicy speed must be positive");
        Self { speed, max_step }
    }
}

impl CostPolicy for GroundPolicy {
    fn speed(&self) -> Fixed {
        self.speed
    }

    fn step_allowed(&self, from_height: Fixed, to_height: Fixed) -> bool {
        (to_height - from_height).abs() <= self.max_step
    }

    fn tile_edge_cost(&self, map: &TileMap, from: &TileNode, to: &TileNode) -> Option<Fixed> {
        if !tiles_linked(map, from, to) {
            return None;
        }
        if !self.step_allowed(from.height, to.height) {
            return None;
        }
        let length = via_edge_length(map, from, to, Fixed::ONE);
        Some(travel_time(length, self.speed))
    }
}

/// Climbing units: any slope is passable, but height changes cost extra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimbingPolicy {
    /// Planar speed in world units per second.
    pub speed: Fixed,
    /// Multiplier on vertical distance, at least one.
    pub climb_penalty: Fixed,
}

impl ClimbingPolicy {
    /// Create a climbing policy. Penalties below one are raised to one.
    ///
    /// # Panics
    ///
    /// Panics if `speed` is not positive.
    #[must_use]
    pub fn new(speed: Fixed, climb_penalty: Fixed) -> Self {
        assert!(speed > Fixed::ZERO, "ClimbingPolicy speed must be positive");
        Self {
            speed,
            climb_penalty: climb_penalty.max(Fixed::ONE),
        }
    }
}

impl CostPolicy for ClimbingPolicy {
    fn speed(&self) -> Fixed {
        self.speed
    }

    fn vertical_scale(&self) -> Fixed {
        self.climb_penalty
    }

    fn tile_edge_cost(&self, map: &TileMap, from: &TileNode, to: &TileNode) -> Option<Fixed> {
        if !tiles_linked(map, from, to) {
            return None;
        }
        let length = via_edge_length(map, from, to, self.climb_penalty);
        Some(travel_time(length, self.speed))
    }
}
