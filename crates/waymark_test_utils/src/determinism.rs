//! Determinism testing utilities.
//!
//! Two clients that plan from the same map must agree on every waypoint,
//! so path queries and whole simulations are run repeatedly and their
//! results hashed.
//!
//! The usual suspects for divergence are float math (all movement math is
//! [`waymark_core::math::Fixed`], square roots included) and hash-order
//! iteration (entities are visited in sorted id order and the A* frontier
//! breaks ties by insertion sequence).

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use waymark_core::cost::CostPolicy;
use waymark_core::map::TileMap;
use waymark_core::math::Vec2Fixed;
use waymark_core::pathfinding::find_path;
use waymark_core::simulation::Simulation;

/// Final hashes of several runs of the same workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatOutcome {
    /// One hash per run, in run order.
    pub hashes: Vec<u64>,
    /// Ticks advanced per run. Zero for one-shot queries.
    pub ticks: u64,
}

impl RepeatOutcome {
    /// True when every run ended on the same hash.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.distinct().len() <= 1
    }

    /// The set of distinct final hashes.
    #[must_use]
    pub fn distinct(&self) -> BTreeSet<u64> {
        self.hashes.iter().copied().collect()
    }

    /// # Panics
    ///
    /// Panics when the runs disagree.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "{} runs over {} ticks ended on {} distinct hashes: {:?}",
            self.hashes.len(),
            self.ticks,
            self.distinct().len(),
            self.hashes
        );
    }
}

/// Build fresh state `runs` times, advance each copy `ticks` steps and hash it.
pub fn repeat_runs<S>(
    runs: usize,
    ticks: u64,
    setup: impl Fn() -> S,
    step: impl Fn(&mut S),
    hash: impl Fn(&S) -> u64,
) -> RepeatOutcome {
    let hashes = (0..runs)
        .map(|_| {
            let mut state = setup();
            (0..ticks).for_each(|_| step(&mut state));
            hash(&state)
        })
        .collect();
    RepeatOutcome { hashes, ticks }
}

/// Run a `Simulation` twice from the same setup and compare final hashes.
pub fn verify_simulation_determinism<F>(setup: F, ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    repeat_runs(
        2,
        ticks,
        &setup,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic()
}

/// Step two simulations in lockstep and report the first tick where their
/// events or state hashes differ. Tick 0 means the setups already disagree.
pub fn find_first_divergence<F>(setup: F, ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let (mut left, mut right) = (setup(), setup());
    if left.state_hash() != right.state_hash() {
        return Some(0);
    }

    (1..=ticks).find(|&tick| {
        let diverged = left.tick() != right.tick() || left.state_hash() != right.state_hash();
        if diverged {
            tracing::warn!(tick, "Simulations diverged");
        }
        diverged
    })
}

/// Hash of a path query result: waypoint positions, node kinds and cost,
/// or a sentinel for failure.
#[must_use]
pub fn path_hash(map: &TileMap, start: Vec2Fixed, goal: Vec2Fixed, policy: &dyn CostPolicy) -> u64 {
    let mut hasher = DefaultHasher::new();
    match find_path(map, start, goal, policy) {
        Ok(path) => {
            path.cost.to_bits().hash(&mut hasher);
            for waypoint in &path.waypoints {
                waypoint.position.hash(&mut hasher);
                waypoint.node.hash(&mut hasher);
            }
        }
        Err(_) => u64::MAX.hash(&mut hasher),
    }
    hasher.finish()
}

/// Run the same path query `runs` times and collect the result hashes.
pub fn verify_path_determinism(
    runs: usize,
    map: &TileMap,
    start: Vec2Fixed,
    goal: Vec2Fixed,
    policy: &dyn CostPolicy,
) -> RepeatOutcome {
    repeat_runs(runs, 0, || (), |()| {}, |()| path_hash(map, start, goal, policy))
}

/// Proptest strategies for path and simulation testing.
///
/// These strategies generate small random maps that are cheap enough to
/// search exhaustively.
pub mod strategies {
    use proptest::prelude::*;
    use waymark_core::map::{TileCoord, TileMap};
    use waymark_core::math::{Fixed, Vec2Fixed};

    /// Description of a small random map.
    #[derive(Debug, Clone)]
    pub struct MapSpec {
        /// Width in tiles.
        pub width: u32,
        /// Height in tiles.
        pub height: u32,
        /// Unwalkable cells.
        pub blocked: Vec<(i32, i32)>,
        /// 1x1 or 2x2 buildings as `(x, y, size)`.
        pub buildings: Vec<(i32, i32, u8)>,
        /// Vertex heights in quarter units, row-major.
        pub heights: Vec<i32>,
    }

    impl MapSpec {
        /// Build the tile map. Buildings that do not fit are skipped.
        #[must_use]
        pub fn build(&self) -> TileMap {
            let mut map = TileMap::new(self.width, self.height, Fixed::ONE);
            for &(x, y) in &self.blocked {
                map.set_walkable(TileCoord::new(x, y), false);
            }
            for (i, &(x, y, size)) in self.buildings.iter().enumerate() {
                let _ = map.place_building(1_000 + i as u64, TileCoord::new(x, y), size, size);
            }
            let stride = self.width + 1;
            for (i, &h) in self.heights.iter().enumerate() {
                let i = i as u32;
                map.set_vertex_height(i % stride, i / stride, Fixed::from_num(h) / Fixed::from_num(4));
            }
            map
        }
    }

    /// Generate a map between 3x3 and 8x8 tiles with obstacles and hills.
    pub fn arb_map_spec() -> impl Strategy<Value = MapSpec> {
        (3u32..=8, 3u32..=8).prop_flat_map(|(width, height)| {
            let cell = (0..width as i32, 0..height as i32);
            let vertices = ((width + 1) * (height + 1)) as usize;
            (
                Just(width),
                Just(height),
                proptest::collection::vec(cell.clone(), 0..6),
                proptest::collection::vec((0..width as i32, 0..height as i32, 1u8..=2), 0..3),
                proptest::collection::vec(0i32..6, vertices),
            )
                .prop_map(|(width, height, blocked, buildings, heights)| MapSpec {
                    width,
                    height,
                    blocked,
                    buildings,
                    heights,
                })
        })
    }

    /// Generate a position strictly inside a `width` x `height` unit-tile map.
    pub fn arb_position(width: u32, height: u32) -> impl Strategy<Value = Vec2Fixed> {
        let max_x = i64::from(width) * 100 - 1;
        let max_y = i64::from(height) * 100 - 1;
        (1i64..max_x, 1i64..max_y).prop_map(|(x, y)| {
            Vec2Fixed::new(
                Fixed::from_num(x) / Fixed::from_num(100),
                Fixed::from_num(y) / Fixed::from_num(100),
            )
        })
    }

    /// Generate a map together with a start and goal position on it.
    pub fn arb_query() -> impl Strategy<Value = (MapSpec, Vec2Fixed, Vec2Fixed)> {
        arb_map_spec().prop_flat_map(|spec| {
            let (w, h) = (spec.width, spec.height);
            (Just(spec), arb_position(w, h), arb_position(w, h))
        })
    }

    /// Generate a fixed-point speed between 1 and 8.
    pub fn arb_speed() -> impl Strategy<Value = Fixed> {
        (1i32..=8).prop_map(Fixed::from_num)
    }
}
