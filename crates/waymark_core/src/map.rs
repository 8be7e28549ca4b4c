//! Tile map graph provider.
//!
//! The map is the node model for path search. Every usable cell (walkable
//! terrain with no building on it) is a tile node; everything else is
//! invisible to the search. Terrain height lives on a vertex heightmap one
//! larger than the tile grid in each direction, so tile centers and shared
//! edges both have well-defined heights.
//!
//! The search only reads from the map. Edits (buildings, terrain) happen
//! between ticks.

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::error::{GameError, Result};
use crate::math::{Fixed, Vec2Fixed};

/// Integer grid coordinate of a tile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TileCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl TileCoord {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Coordinate shifted by an offset.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev (king-move) distance.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// True for the 8 surrounding tiles.
    #[must_use]
    pub fn is_adjacent(self, other: Self) -> bool {
        self.chebyshev(other) == 1
    }

    /// True when `other` is a diagonal neighbor.
    #[must_use]
    pub fn is_diagonal_to(self, other: Self) -> bool {
        self.x.abs_diff(other.x) == 1 && self.y.abs_diff(other.y) == 1
    }
}

/// A usable grid cell as seen by the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileNode {
    /// Grid coordinate.
    pub coord: TileCoord,
    /// World-space center on the ground plane.
    pub center: Vec2Fixed,
    /// Terrain height at the center.
    pub height: Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tile {
    walkable: bool,
    building: Option<EntityId>,
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            walkable: true,
            building: None,
        }
    }
}

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

/// Grid of tiles with terrain heights and building occupancy.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: u32,
    height: u32,
    tile_size: Fixed,
    /// Row-major tile data.
    tiles: Vec<Tile>,
    /// Row-major vertex heights, `(width + 1) * (height + 1)` entries.
    heights: Vec<Fixed>,
}

impl TileMap {
    /// Create a flat map with every tile walkable.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero, or if `tile_size` is not positive.
    #[must_use]
    pub fn new(width: u32, height: u32, tile_size: Fixed) -> Self {
        assert!(width > 0, "TileMap width must be positive");
        assert!(height > 0, "TileMap height must be positive");
        assert!(tile_size > Fixed::ZERO, "TileMap tile_size must be positive");

        let tile_count = (width as usize) * (height as usize);
        let vertex_count = (width as usize + 1) * (height as usize + 1);
        Self {
            width,
            height,
            tile_size,
            tiles: vec![Tile::default(); tile_count],
            heights: vec![Fixed::ZERO; vertex_count],
        }
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Tile edge length in world units.
    #[must_use]
    pub const fn tile_size(&self) -> Fixed {
        self.tile_size
    }

    /// Check if a coordinate lies on the map.
    #[must_use]
    pub fn in_bounds(&self, coord: TileCoord) -> bool {
        coord.x >= 0 && coord.y >= 0 && (coord.x as u32) < self.width && (coord.y as u32) < self.height
    }

    #[inline]
    fn index(&self, coord: TileCoord) -> Option<usize> {
        self.in_bounds(coord)
            .then(|| (coord.y as usize) * (self.width as usize) + (coord.x as usize))
    }

    #[inline]
    fn vertex_index(&self, vx: u32, vy: u32) -> Option<usize> {
        (vx <= self.width && vy <= self.height)
            .then(|| (vy as usize) * (self.width as usize + 1) + (vx as usize))
    }

    /// Check if the terrain of a tile can be walked on (ignores buildings).
    #[must_use]
    pub fn is_walkable(&self, coord: TileCoord) -> bool {
        self.index(coord).is_some_and(|i| self.tiles[i].walkable)
    }

    /// Set terrain walkability. Returns `false` if out of bounds.
    pub fn set_walkable(&mut self, coord: TileCoord, walkable: bool) -> bool {
        match self.index(coord) {
            Some(i) => {
                self.tiles[i].walkable = walkable;
                true
            }
            None => false,
        }
    }

    /// Building occupying a tile, if any.
    #[must_use]
    pub fn building_at(&self, coord: TileCoord) -> Option<EntityId> {
        self.index(coord).and_then(|i| self.tiles[i].building)
    }

    /// Check if a building stands on a tile.
    #[must_use]
    pub fn has_building(&self, coord: TileCoord) -> bool {
        self.building_at(coord).is_some()
    }

    /// A tile is usable when it is in bounds, walkable and free of buildings.
    #[must_use]
    pub fn is_usable(&self, coord: TileCoord) -> bool {
        self.index(coord)
            .is_some_and(|i| self.tiles[i].walkable && self.tiles[i].building.is_none())
    }

    /// World-space center of a tile (does not check bounds).
    #[must_use]
    pub fn tile_center(&self, coord: TileCoord) -> Vec2Fixed {
        let half = self.tile_size / Fixed::from_num(2);
        Vec2Fixed::new(
            Fixed::from_num(coord.x) * self.tile_size + half,
            Fixed::from_num(coord.y) * self.tile_size + half,
        )
    }

    /// Look up the node for a tile.
    ///
    /// Returns `None` if the coordinate is off the map or not usable.
    #[must_use]
    pub fn tile_node(&self, coord: TileCoord) -> Option<TileNode> {
        if !self.is_usable(coord) {
            return None;
        }
        let center = self.tile_center(coord);
        Some(TileNode {
            coord,
            center,
            height: self.height_at(center),
        })
    }

    /// Every usable tile in row-major order.
    pub fn tile_nodes(&self) -> impl Iterator<Item = TileNode> + '_ {
        (0..self.height as i32)
            .flat_map(move |y| (0..self.width as i32).map(move |x| TileCoord::new(x, y)))
            .filter_map(|coord| self.tile_node(coord))
    }

    /// Usable neighbors of a tile, in fixed E, SE, S, SW, W, NW, N, NE order.
    ///
    /// Diagonals are listed unconditionally; whether the move is allowed is
    /// up to the cost policy.
    pub fn neighbors(&self, coord: TileCoord) -> impl Iterator<Item = TileNode> + '_ {
        DIRECTIONS
            .iter()
            .filter_map(move |&(dx, dy)| self.tile_node(coord.offset(dx, dy)))
    }

    /// Tile containing a world position, if on the map.
    #[must_use]
    pub fn cell_at(&self, position: Vec2Fixed) -> Option<TileCoord> {
        if position.x < Fixed::ZERO || position.y < Fixed::ZERO {
            return None;
        }
        let x = position.x.checked_div(self.tile_size)?.floor().to_num::<i64>();
        let y = position.y.checked_div(self.tile_size)?.floor().to_num::<i64>();
        if x < self.width as i64 && y < self.height as i64 {
            Some(TileCoord::new(x as i32, y as i32))
        } else {
            None
        }
    }

    /// Pull a position onto the map area.
    fn clamp_position(&self, position: Vec2Fixed) -> Vec2Fixed {
        let max_x = Fixed::from_num(self.width) * self.tile_size - Fixed::DELTA;
        let max_y = Fixed::from_num(self.height) * self.tile_size - Fixed::DELTA;
        Vec2Fixed::new(
            position.x.clamp(Fixed::ZERO, max_x),
            position.y.clamp(Fixed::ZERO, max_y),
        )
    }

    /// Height of a heightmap vertex.
    #[must_use]
    pub fn vertex_height(&self, vx: u32, vy: u32) -> Option<Fixed> {
        self.vertex_index(vx, vy).map(|i| self.heights[i])
    }

    /// Set the height of a heightmap vertex. Returns `false` if out of bounds.
    pub fn set_vertex_height(&mut self, vx: u32, vy: u32, height: Fixed) -> bool {
        match self.vertex_index(vx, vy) {
            Some(i) => {
                self.heights[i] = height;
                true
            }
            None => false,
        }
    }

    /// Terrain height at a world position, bilinear over the heightmap.
    ///
    /// Positions off the map take the height of the nearest border point.
    #[must_use]
    pub fn height_at(&self, position: Vec2Fixed) -> Fixed {
        let u = position
            .x
            .saturating_div(self.tile_size)
            .clamp(Fixed::ZERO, Fixed::from_num(self.width));
        let v = position
            .y
            .saturating_div(self.tile_size)
            .clamp(Fixed::ZERO, Fixed::from_num(self.height));

        let i = u.floor().to_num::<u32>().min(self.width - 1);
        let j = v.floor().to_num::<u32>().min(self.height - 1);
        let fu = u - Fixed::from_num(i);
        let fv = v - Fixed::from_num(j);

        let h = |vx, vy| self.vertex_height(vx, vy).unwrap_or(Fixed::ZERO);
        let one = Fixed::ONE;
        h(i, j) * (one - fu) * (one - fv)
            + h(i + 1, j) * fu * (one - fv)
            + h(i, j + 1) * (one - fu) * fv
            + h(i + 1, j + 1) * fu * fv
    }

    /// Point on the boundary shared by two adjacent tiles.
    ///
    /// For orthogonal neighbors this is the middle of the common edge; for
    /// diagonal neighbors it is the common corner.
    #[must_use]
    pub fn edge_midpoint(&self, a: TileCoord, b: TileCoord) -> Vec2Fixed {
        self.tile_center(a).midpoint(self.tile_center(b))
    }

    /// Diagonal-cut rule: a diagonal move is blocked when buildings stand on
    /// both tiles that share its corner.
    #[must_use]
    pub fn diagonal_blocked(&self, from: TileCoord, to: TileCoord) -> bool {
        if !from.is_diagonal_to(to) {
            return false;
        }
        self.has_building(TileCoord::new(to.x, from.y)) && self.has_building(TileCoord::new(from.x, to.y))
    }

    /// Nearest usable tile to a world position, by distance to tile centers.
    ///
    /// Positions off the map are clamped onto the border first. Equal
    /// distances prefer the lower `(y, x)`. Returns `None` only when no tile
    /// on the map is usable.
    #[must_use]
    pub fn closest_node(&self, position: Vec2Fixed) -> Option<TileNode> {
        let target = self.clamp_position(position);
        let origin = self.cell_at(target)?;
        let half = Fixed::from_num(0.5);
        let max_ring = self.width.max(self.height) as i32;

        let mut best: Option<(Fixed, TileCoord)> = None;
        for ring in 0..=max_ring {
            if let Some((best_dist_sq, _)) = best {
                // Every tile on this ring is at least (ring - 1/2) tiles away.
                let min_dist = (Fixed::from_num(ring) - half) * self.tile_size;
                if min_dist.saturating_mul(min_dist) > best_dist_sq {
                    break;
                }
            }

            for coord in ring_coords(origin, ring) {
                if !self.is_usable(coord) {
                    continue;
                }
                let dist_sq = self.tile_center(coord).distance_squared(target);
                let better = match best {
                    None => true,
                    Some((d, c)) => dist_sq < d || (dist_sq == d && (coord.y, coord.x) < (c.y, c.x)),
                };
                if better {
                    best = Some((dist_sq, coord));
                }
            }
        }

        best.and_then(|(_, coord)| self.tile_node(coord))
    }

    /// Tile a temporary anchor links from: its own cell when usable,
    /// otherwise the closest usable tile.
    #[must_use]
    pub fn anchor_home(&self, position: Vec2Fixed) -> Option<TileNode> {
        self.cell_at(position)
            .and_then(|coord| self.tile_node(coord))
            .or_else(|| self.closest_node(position))
    }

    /// Occupy a rectangular footprint with a building.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::PlacementBlocked`] if any footprint tile is off
    /// the map, unwalkable or already occupied. The map is left untouched.
    pub fn place_building(
        &mut self,
        building: EntityId,
        origin: TileCoord,
        width: u8,
        height: u8,
    ) -> Result<()> {
        let blocked = |reason: &str| GameError::PlacementBlocked {
            building,
            x: origin.x,
            y: origin.y,
            reason: reason.to_string(),
        };

        let cells: Vec<TileCoord> = (0..height as i32)
            .flat_map(|dy| (0..width as i32).map(move |dx| origin.offset(dx, dy)))
            .collect();

        for &cell in &cells {
            if !self.in_bounds(cell) {
                return Err(blocked("footprint leaves the map"));
            }
            if !self.is_walkable(cell) {
                return Err(blocked("terrain is not walkable"));
            }
            if let Some(other) = self.building_at(cell) {
                return Err(blocked(&format!("tile occupied by building {other}")));
            }
        }

        for cell in cells {
            if let Some(i) = self.index(cell) {
                self.tiles[i].building = Some(building);
            }
        }
        tracing::debug!(building, x = origin.x, y = origin.y, width, height, "Building placed");
        Ok(())
    }

    /// Clear every tile occupied by a building. Returns the number of tiles freed.
    pub fn remove_building(&mut self, building: EntityId) -> usize {
        let mut freed = 0;
        for tile in &mut self.tiles {
            if tile.building == Some(building) {
                tile.building = None;
                freed += 1;
            }
        }
        freed
    }
}

/// Perimeter of the square `ring` tiles away from `origin`.
fn ring_coords(origin: TileCoord, ring: i32) -> Vec<TileCoord> {
    if ring == 0 {
        return vec![origin];
    }
    let mut coords = Vec::with_capacity((ring as usize) * 8);
    for dx in -ring..=ring {
        coords.push(origin.offset(dx, -ring));
        coords.push(origin.offset(dx, ring));
    }
    for dy in (-ring + 1)..ring {
        coords.push(origin.offset(-ring, dy));
        coords.push(origin.offset(ring, dy));
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn coord(x: i32, y: i32) -> TileCoord {
        TileCoord::new(x, y)
    }

    #[test]
    fn test_tile_node_lookup() {
        let mut map = TileMap::new(4, 4, fixed(2));
        let node = map.tile_node(coord(1, 2)).unwrap();
        assert_eq!(node.center, Vec2Fixed::from_int(3, 5));
        assert_eq!(node.height, Fixed::ZERO);

        assert!(map.tile_node(coord(4, 0)).is_none());
        assert!(map.tile_node(coord(-1, 0)).is_none());

        map.set_walkable(coord(1, 2), false);
        assert!(map.tile_node(coord(1, 2)).is_none());
    }

    #[test]
    fn test_cell_at_conversion() {
        let map = TileMap::new(10, 10, fixed(2));
        assert_eq!(map.cell_at(Vec2Fixed::from_int(1, 1)), Some(coord(0, 0)));
        assert_eq!(map.cell_at(Vec2Fixed::from_int(3, 3)), Some(coord(1, 1)));
        assert_eq!(map.cell_at(Vec2Fixed::from_int(19, 19)), Some(coord(9, 9)));
        assert_eq!(map.cell_at(Vec2Fixed::from_int(20, 20)), None);
        assert_eq!(map.cell_at(Vec2Fixed::from_int(-1, 0)), None);
    }

    #[test]
    fn test_corner_tile_has_three_neighbors() {
        let map = TileMap::new(5, 5, fixed(1));
        let coords: Vec<_> = map.neighbors(coord(0, 0)).map(|n| n.coord).collect();
        assert_eq!(coords, vec![coord(1, 0), coord(1, 1), coord(0, 1)]);
        assert_eq!(map.neighbors(coord(2, 2)).count(), 8);
    }

    #[test]
    fn test_buildings_remove_nodes() {
        let mut map = TileMap::new(6, 6, fixed(1));
        map.place_building(7, coord(2, 2), 2, 2).unwrap();
        assert!(map.tile_node(coord(3, 3)).is_none());
        assert_eq!(map.building_at(coord(2, 3)), Some(7));
        assert_eq!(map.neighbors(coord(1, 1)).count(), 7);

        assert_eq!(map.remove_building(7), 4);
        assert!(map.tile_node(coord(3, 3)).is_some());
    }

    #[test]
    fn test_overlapping_placement_rejected() {
        let mut map = TileMap::new(6, 6, fixed(1));
        map.place_building(1, coord(0, 0), 2, 2).unwrap();
        let result = map.place_building(2, coord(1, 1), 2, 2);
        assert!(matches!(result, Err(GameError::PlacementBlocked { building: 2, .. })));
        // Failed placement leaves no partial footprint.
        assert!(!map.has_building(coord(2, 2)));

        assert!(map.place_building(3, coord(5, 5), 2, 1).is_err());
    }

    #[test]
    fn test_diagonal_blocked_needs_both_corners() {
        let mut map = TileMap::new(2, 2, fixed(1));
        map.place_building(1, coord(1, 0), 1, 1).unwrap();
        assert!(!map.diagonal_blocked(coord(0, 0), coord(1, 1)));

        map.place_building(2, coord(0, 1), 1, 1).unwrap();
        assert!(map.diagonal_blocked(coord(0, 0), coord(1, 1)));
        assert!(map.diagonal_blocked(coord(1, 1), coord(0, 0)));
        // Orthogonal moves are never diagonal-cut.
        assert!(!map.diagonal_blocked(coord(0, 0), coord(1, 0)));
    }

    #[test]
    fn test_height_is_bilinear() {
        let mut map = TileMap::new(1, 1, fixed(2));
        map.set_vertex_height(1, 0, fixed(4));
        map.set_vertex_height(1, 1, fixed(4));

        // Center averages the four corners.
        assert_eq!(map.height_at(Vec2Fixed::from_int(1, 1)), fixed(2));
        // East edge sits on the raised vertices.
        assert_eq!(map.height_at(Vec2Fixed::from_int(2, 1)), fixed(4));
        assert_eq!(map.height_at(Vec2Fixed::from_int(0, 0)), Fixed::ZERO);
    }

    #[test]
    fn test_edge_midpoint_on_shared_boundary() {
        let map = TileMap::new(4, 4, fixed(2));
        assert_eq!(map.edge_midpoint(coord(0, 0), coord(1, 0)), Vec2Fixed::from_int(2, 1));
        assert_eq!(map.edge_midpoint(coord(0, 0), coord(1, 1)), Vec2Fixed::from_int(2, 2));
    }

    #[test]
    fn test_closest_node_skips_buildings() {
        let mut map = TileMap::new(7, 7, fixed(1));
        map.place_building(1, coord(2, 2), 3, 3).unwrap();

        // Center of the building block: all 12 edge-adjacent ring tiles are
        // equidistant, lower (y, x) wins.
        let node = map.closest_node(Vec2Fixed::new(Fixed::from_num(3.5), Fixed::from_num(3.5)));
        assert_eq!(node.map(|n| n.coord), Some(coord(3, 1)));

        // Near the east face of the block.
        let node = map.closest_node(Vec2Fixed::new(Fixed::from_num(4.9), Fixed::from_num(3.5)));
        assert_eq!(node.map(|n| n.coord), Some(coord(5, 3)));
    }

    #[test]
    fn test_closest_node_clamps_off_map_positions() {
        let map = TileMap::new(3, 3, fixed(1));
        let node = map.closest_node(Vec2Fixed::from_int(-10, 1)).unwrap();
        assert_eq!(node.coord, coord(0, 1));
    }

    #[test]
    fn test_far_positions_on_small_tiles() {
        let mut map = TileMap::new(8, 8, Fixed::from_num(0.5));
        map.set_vertex_height(8, 1, fixed(3));
        let far = Vec2Fixed::new(Fixed::from_num(2_000_000_000), Fixed::from_num(0.5));

        assert_eq!(map.cell_at(far), None);
        assert_eq!(map.height_at(far), fixed(3));
        let far_row = Vec2Fixed::new(far.x, Fixed::from_num(0.6));
        assert_eq!(map.closest_node(far_row).map(|n| n.coord), Some(coord(7, 1)));
    }

    #[test]
    fn test_closest_node_none_when_nothing_usable() {
        let mut map = TileMap::new(2, 1, fixed(1));
        map.set_walkable(coord(0, 0), false);
        map.set_walkable(coord(1, 0), false);
        assert!(map.closest_node(Vec2Fixed::ZERO).is_none());
    }

    #[test]
    fn test_anchor_home_prefers_own_cell() {
        let mut map = TileMap::new(4, 4, fixed(1));
        let inside = Vec2Fixed::new(Fixed::from_num(1.2), Fixed::from_num(1.8));
        assert_eq!(map.anchor_home(inside).map(|n| n.coord), Some(coord(1, 1)));

        map.place_building(1, coord(1, 1), 1, 1).unwrap();
        let home = map.anchor_home(inside).unwrap();
        assert_ne!(home.coord, coord(1, 1));
        assert!(home.coord.is_adjacent(coord(1, 1)));
    }
}
