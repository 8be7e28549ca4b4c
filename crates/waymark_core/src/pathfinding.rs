//! A* path search over tile nodes and temporary anchors.
//!
//! Start and goal positions that sit exactly on a usable tile center are
//! searched as that tile. Any other position becomes a temporary anchor that
//! only exists for the duration of one query and links into the grid through
//! its home cell (see [`crate::cost`]).
//!
//! The frontier is ordered by `f = g + h`; ties go to the lower `h`, then to
//! the entry pushed first. Every call is a fresh search.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cost::CostPolicy;
use crate::error::{GameError, Result};
use crate::map::{TileCoord, TileMap, TileNode};
use crate::math::{Fixed, Vec2Fixed};

/// Node a waypoint was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    /// A grid tile.
    Tile(TileCoord),
    /// A query anchor off the tile centers.
    Temp,
}

/// One step of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    /// World position to walk to.
    pub position: Vec2Fixed,
    /// Originating node.
    pub node: NodeRef,
}

/// Ordered, contiguous waypoint list from a start to a goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    /// Waypoints, start and goal inclusive.
    pub waypoints: Vec<Waypoint>,
    /// Total travel time.
    pub cost: Fixed,
}

impl Path {
    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// True when the path has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Number of edges walked.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }

    /// Final waypoint position.
    #[must_use]
    pub fn destination(&self) -> Option<Vec2Fixed> {
        self.waypoints.last().map(|w| w.position)
    }

    /// Check that every consecutive pair is still a valid edge under `policy`.
    #[must_use]
    pub fn is_valid(&self, map: &TileMap, policy: &dyn CostPolicy) -> bool {
        self.waypoints
            .windows(2)
            .all(|pair| policy.edge_cost(map, &pair[0], &pair[1]).is_some())
    }
}

/// A query endpoint resolved against the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Exactly on a usable tile center.
    Tile(TileNode),
    /// Anywhere else.
    Temp(Vec2Fixed),
}

impl Anchor {
    /// Resolve a world position into a search anchor.
    #[must_use]
    pub fn resolve(map: &TileMap, position: Vec2Fixed) -> Self {
        map.cell_at(position)
            .and_then(|coord| map.tile_node(coord))
            .filter(|node| node.center == position)
            .map_or(Self::Temp(position), Self::Tile)
    }

    /// World position of the anchor.
    #[must_use]
    pub fn position(&self) -> Vec2Fixed {
        match self {
            Self::Tile(node) => node.center,
            Self::Temp(position) => *position,
        }
    }

    /// Waypoint standing on this anchor.
    #[must_use]
    pub fn waypoint(&self) -> Waypoint {
        match self {
            Self::Tile(node) => Waypoint {
                position: node.center,
                node: NodeRef::Tile(node.coord),
            },
            Self::Temp(position) => Waypoint {
                position: *position,
                node: NodeRef::Temp,
            },
        }
    }
}

/// Vertex identity inside one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SearchNode {
    Start,
    Tile(TileCoord),
    Goal,
}

/// Frontier entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    node: SearchNode,
    g: Fixed,
    h: Fixed,
    f: Fixed,
    /// Push order, for FIFO tie-breaking.
    seq: u64,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse everything for min-first.
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-query state.
struct Search<'a> {
    map: &'a TileMap,
    policy: &'a dyn CostPolicy,
    start: Anchor,
    goal: Anchor,
    /// Tiles that link into a temporary goal, with their edge costs.
    goal_links: HashMap<TileCoord, Fixed>,
}

impl Search<'_> {
    fn position(&self, node: SearchNode) -> Vec2Fixed {
        match node {
            SearchNode::Start => self.start.position(),
            SearchNode::Goal => self.goal.position(),
            SearchNode::Tile(coord) => self.map.tile_center(coord),
        }
    }

    fn waypoint(&self, node: SearchNode) -> Waypoint {
        match node {
            SearchNode::Start => self.start.waypoint(),
            SearchNode::Goal => self.goal.waypoint(),
            SearchNode::Tile(coord) => Waypoint {
                position: self.map.tile_center(coord),
                node: NodeRef::Tile(coord),
            },
        }
    }

    /// Map a tile onto the goal node when it is the goal anchor itself.
    fn tile_id(&self, coord: TileCoord) -> SearchNode {
        match self.goal {
            Anchor::Tile(goal) if goal.coord == coord => SearchNode::Goal,
            _ => SearchNode::Tile(coord),
        }
    }

    fn successors(&self, node: SearchNode, out: &mut Vec<(SearchNode, Fixed)>) {
        out.clear();
        match node {
            SearchNode::Start => {
                let Anchor::Temp(anchor) = self.start else {
                    return;
                };
                if let Some(home) = self.map.anchor_home(anchor) {
                    let candidates = std::iter::once(home).chain(self.map.neighbors(home.coord));
                    for tile in candidates {
                        if let Some(cost) = self.policy.temp_to_tile_cost(self.map, anchor, &tile) {
                            out.push((self.tile_id(tile.coord), cost));
                        }
                    }
                }
                if let Anchor::Temp(goal) = self.goal {
                    if let Some(cost) = self.policy.temp_edge_cost(self.map, anchor, goal) {
                        out.push((SearchNode::Goal, cost));
                    }
                }
            }
            SearchNode::Tile(coord) => {
                let Some(current) = self.map.tile_node(coord) else {
                    return;
                };
                for next in self.map.neighbors(coord) {
                    if let Some(cost) = self.policy.tile_edge_cost(self.map, &current, &next) {
                        out.push((self.tile_id(next.coord), cost));
                    }
                }
                if let Some(&cost) = self.goal_links.get(&coord) {
                    out.push((SearchNode::Goal, cost));
                }
            }
            SearchNode::Goal => {}
        }
    }

    fn source(&self) -> SearchNode {
        match self.start {
            Anchor::Tile(node) => self.tile_id(node.coord),
            Anchor::Temp(_) => SearchNode::Start,
        }
    }
}

/// Tiles that may link into a temporary goal anchor.
fn collect_goal_links(
    map: &TileMap,
    policy: &dyn CostPolicy,
    goal: Vec2Fixed,
) -> HashMap<TileCoord, Fixed> {
    let mut links = HashMap::new();
    let Some(home) = map.cell_at(goal).and_then(|coord| map.tile_node(coord)) else {
        return links;
    };
    for tile in std::iter::once(home).chain(map.neighbors(home.coord)) {
        if let Some(cost) = policy.tile_to_temp_cost(map, &tile, goal) {
            links.insert(tile.coord, cost);
        }
    }
    links
}

/// Find the cheapest path from `start` to `goal` under `policy`.
///
/// The returned path starts exactly at `start` and ends exactly at `goal`.
///
/// # Errors
///
/// Returns [`GameError::NoPathFound`] when the goal cannot be reached.
pub fn find_path(
    map: &TileMap,
    start: Vec2Fixed,
    goal: Vec2Fixed,
    policy: &dyn CostPolicy,
) -> Result<Path> {
    let not_found = || GameError::NoPathFound {
        from: start,
        to: goal,
    };

    let start_anchor = Anchor::resolve(map, start);
    if start == goal {
        return Ok(Path {
            waypoints: vec![start_anchor.waypoint()],
            cost: Fixed::ZERO,
        });
    }

    let goal_anchor = Anchor::resolve(map, goal);
    let goal_links = match goal_anchor {
        Anchor::Temp(position) => collect_goal_links(map, policy, position),
        Anchor::Tile(_) => HashMap::new(),
    };
    if let Anchor::Temp(position) = goal_anchor {
        let direct = matches!(start_anchor, Anchor::Temp(s) if policy.temp_edge_cost(map, s, position).is_some());
        if goal_links.is_empty() && !direct {
            return Err(not_found());
        }
    }

    let search = Search {
        map,
        policy,
        start: start_anchor,
        goal: goal_anchor,
        goal_links,
    };

    let source = search.source();
    let mut open_set: BinaryHeap<OpenEntry> = BinaryHeap::new();
    let mut g_score: HashMap<SearchNode, Fixed> = HashMap::new();
    let mut came_from: HashMap<SearchNode, SearchNode> = HashMap::new();
    let mut closed: HashSet<SearchNode> = HashSet::new();
    let mut successors = Vec::with_capacity(10);
    let mut seq = 0u64;

    let start_h = policy.heuristic(start, goal);
    g_score.insert(source, Fixed::ZERO);
    open_set.push(OpenEntry {
        node: source,
        g: Fixed::ZERO,
        h: start_h,
        f: start_h,
        seq,
    });

    while let Some(current) = open_set.pop() {
        if current.node == SearchNode::Goal {
            return Ok(reconstruct_path(&search, &came_from, current.g));
        }
        if !closed.insert(current.node) {
            continue;
        }

        search.successors(current.node, &mut successors);
        for &(next, edge) in &successors {
            if closed.contains(&next) {
                continue;
            }
            let tentative_g = current.g.saturating_add(edge);
            let known = g_score.get(&next).copied().unwrap_or(Fixed::MAX);
            if tentative_g < known {
                g_score.insert(next, tentative_g);
                came_from.insert(next, current.node);

                let h = policy.heuristic(search.position(next), goal);
                seq += 1;
                open_set.push(OpenEntry {
                    node: next,
                    g: tentative_g,
                    h,
                    f: tentative_g.saturating_add(h),
                    seq,
                });
            }
        }
    }

    tracing::trace!(expanded = closed.len(), %start, %goal, "Path search exhausted");
    Err(not_found())
}

fn reconstruct_path(
    search: &Search<'_>,
    came_from: &HashMap<SearchNode, SearchNode>,
    cost: Fixed,
) -> Path {
    let mut waypoints = vec![search.waypoint(SearchNode::Goal)];
    let mut current = SearchNode::Goal;
    while let Some(&prev) = came_from.get(&current) {
        waypoints.push(search.waypoint(prev));
        current = prev;
    }
    waypoints.reverse();
    Path { waypoints, cost }
}
