//! Scenario runner: builds a simulation from a scenario and reports on it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use waymark_core::components::{EntityId, Owner};
use waymark_core::map::{TileCoord, TileMap};
use waymark_core::math::{Fixed, Vec2Fixed};
use waymark_core::movement::{MoveState, MovementEvent};
use waymark_core::orders::{CombatEvent, Order, ShotTarget};
use waymark_core::pathfinding::{find_path, NodeRef};
use waymark_core::simulation::{Simulation, TickEvents, UnitSpawnParams};

use crate::scenario::{to_fixed, to_position, OrderSpec, Scenario, ScenarioError};

/// World position as JSON-friendly decimals.
pub type Point = [f64; 2];

fn point(v: Vec2Fixed) -> Point {
    [v.x.to_num::<f64>(), v.y.to_num::<f64>()]
}

/// Something that happened during a run, with units named by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventRecord {
    /// A path was planned.
    Started {
        tick: u64,
        unit: String,
        destination: Point,
    },
    /// The destination was reached.
    Finished { tick: u64, unit: String },
    /// No path existed.
    Failed {
        tick: u64,
        unit: String,
        destination: Point,
    },
    /// Movement was stopped.
    Canceled { tick: u64, unit: String },
    /// An attacker came into range.
    Engaged {
        tick: u64,
        attacker: String,
        target: String,
    },
    /// A shot was fired.
    ShotFired {
        tick: u64,
        attacker: String,
        aim: Point,
        target: Option<String>,
    },
    /// A tracked target disappeared.
    TargetLost {
        tick: u64,
        attacker: String,
        target: String,
    },
}

/// Outcome of one scheduled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Tick the order was submitted before.
    pub tick: u64,
    /// Ordered unit.
    pub unit: String,
    /// Whether the order had any effect.
    pub executed: bool,
}

/// Final state of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Scenario label.
    pub label: String,
    /// Simulation id.
    pub id: EntityId,
    /// Final position.
    pub position: Point,
    /// Movement state name.
    pub state: String,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks actually simulated.
    pub ticks: u64,
    /// Final simulation hash, for comparing runs.
    pub state_hash: u64,
    /// Order outcomes in submission order.
    pub orders: Vec<OrderRecord>,
    /// Events in emission order.
    pub events: Vec<EventRecord>,
    /// Final unit states, sorted by label.
    pub units: Vec<UnitReport>,
    /// Listener calls that failed.
    pub listener_failures: usize,
}

/// Result of a single path query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathReport {
    /// Archetype whose rules were used.
    pub archetype: String,
    /// Query start.
    pub from: Point,
    /// Query goal.
    pub to: Point,
    /// Whether a path exists.
    pub found: bool,
    /// Total travel time in seconds.
    pub cost: Option<f64>,
    /// Waypoints from start to goal.
    pub waypoints: Vec<WaypointReport>,
}

/// One waypoint of a reported path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointReport {
    /// World position.
    pub position: Point,
    /// Tile the waypoint sits on, `None` for temporary anchors.
    pub tile: Option<(i32, i32)>,
}

/// Build the tile map a scenario describes.
pub fn build_map(scenario: &Scenario) -> Result<TileMap, ScenarioError> {
    let setup = &scenario.map;
    let tile_size = to_fixed("map.tile_size", setup.tile_size)?;
    if tile_size <= Fixed::ZERO {
        return Err(ScenarioError::OutOfRange {
            field: "map.tile_size",
            value: setup.tile_size,
        });
    }
    for (field, tiles) in [("map.width", setup.width), ("map.height", setup.height)] {
        let extent = Fixed::checked_from_num(tiles).and_then(|n| n.checked_mul(tile_size));
        if tiles == 0 || extent.is_none() {
            return Err(ScenarioError::OutOfRange {
                field,
                value: f64::from(tiles),
            });
        }
    }

    let mut map = TileMap::new(setup.width, setup.height, tile_size);
    for &(x, y) in &setup.blocked {
        if !map.set_walkable(TileCoord::new(x, y), false) {
            tracing::warn!(x, y, "Blocked tile outside the map ignored");
        }
    }
    for vertex in &setup.heights {
        let height = to_fixed("map.heights", vertex.height)?;
        if !map.set_vertex_height(vertex.x, vertex.y, height) {
            tracing::warn!(x = vertex.x, y = vertex.y, "Height vertex outside the map ignored");
        }
    }
    Ok(map)
}

/// Drives a scenario tick by tick.
#[derive(Debug)]
pub struct ScenarioRunner {
    name: String,
    sim: Simulation,
    labels: BTreeMap<String, EntityId>,
    names: BTreeMap<EntityId, String>,
    /// Pending orders, sorted by tick.
    schedule: Vec<(u64, String, Order)>,
    next_order: usize,
}

impl ScenarioRunner {
    /// Set up the simulation: map, structures, units, then the order schedule.
    pub fn new(scenario: &Scenario) -> Result<Self, ScenarioError> {
        let mut sim = Simulation::new(build_map(scenario)?);

        for structure in &scenario.structures {
            let (w, h) = structure.size;
            let origin = TileCoord::new(structure.origin.0, structure.origin.1);
            let owner = Owner::new(structure.team, structure.team);
            sim.spawn_structure(origin, w, h, owner)?;
        }

        let mut labels = BTreeMap::new();
        let mut names = BTreeMap::new();
        for unit in &scenario.units {
            if labels.contains_key(&unit.label) {
                return Err(ScenarioError::DuplicateUnit(unit.label.clone()));
            }
            let archetype = scenario.archetype(&unit.archetype)?;
            let position = to_position("units.position", unit.position)?;
            let owner = Owner::new(unit.team, unit.team);
            let id = sim.spawn_unit(UnitSpawnParams::from_archetype(archetype, position, owner));
            labels.insert(unit.label.clone(), id);
            names.insert(id, unit.label.clone());
        }

        let lookup = |label: &str| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| ScenarioError::UnknownUnit(label.to_string()))
        };
        let mut schedule = Vec::with_capacity(scenario.orders.len());
        for timed in &scenario.orders {
            lookup(&timed.unit)?;
            let order = match &timed.order {
                OrderSpec::Move(x, y) => Order::Move(to_position("orders.move", (*x, *y))?),
                OrderSpec::Attack(target) => Order::Attack(lookup(target)?),
                OrderSpec::ShootAt(x, y) => {
                    Order::Shoot(ShotTarget::Position(to_position("orders.shoot", (*x, *y))?))
                }
                OrderSpec::ShootUnit(target) => Order::Shoot(ShotTarget::Entity(lookup(target)?)),
            };
            schedule.push((timed.tick, timed.unit.clone(), order));
        }
        // Stable, so orders on the same tick keep file order.
        schedule.sort_by_key(|(tick, _, _)| *tick);

        tracing::info!(
            scenario = %scenario.name,
            units = labels.len(),
            orders = schedule.len(),
            "Scenario loaded"
        );
        Ok(Self {
            name: scenario.name.clone(),
            sim,
            labels,
            names,
            schedule,
            next_order: 0,
        })
    }

    /// The simulation being driven.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Simulation id of a labeled unit.
    #[must_use]
    pub fn unit_id(&self, label: &str) -> Option<EntityId> {
        self.labels.get(label).copied()
    }

    fn name_of(&self, id: EntityId) -> String {
        self.names.get(&id).cloned().unwrap_or_else(|| format!("#{id}"))
    }

    /// True once every order is submitted and no unit is walking.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.next_order >= self.schedule.len()
            && self
                .labels
                .values()
                .all(|&id| self.sim.get_entity(id).map_or(true, |e| !e.is_moving()))
    }

    /// Run up to `max_ticks` ticks, stopping early once the scenario settles.
    pub fn run(&mut self, max_ticks: u64) -> RunReport {
        let mut orders = Vec::new();
        let mut events = Vec::new();
        let mut listener_failures = 0;

        for _ in 0..max_ticks {
            let tick = self.sim.get_tick();
            while let Some((due, unit, order)) = self.schedule.get(self.next_order).cloned() {
                if due > tick {
                    break;
                }
                self.next_order += 1;
                let executed = self
                    .labels
                    .get(&unit)
                    .is_some_and(|&id| self.sim.submit(id, order));
                orders.push(OrderRecord {
                    tick,
                    unit,
                    executed,
                });
            }

            let tick_events = self.sim.tick();
            listener_failures += tick_events.listener_failures;
            self.record(tick, &tick_events, &mut events);

            if self.is_settled() {
                tracing::debug!(tick = self.sim.get_tick(), "Scenario settled");
                break;
            }
        }

        RunReport {
            scenario: self.name.clone(),
            ticks: self.sim.get_tick(),
            state_hash: self.sim.state_hash(),
            orders,
            events,
            units: self.unit_reports(),
            listener_failures,
        }
    }

    fn record(&self, tick: u64, tick_events: &TickEvents, out: &mut Vec<EventRecord>) {
        for event in &tick_events.movement {
            out.push(match *event {
                MovementEvent::Started { unit, destination } => EventRecord::Started {
                    tick,
                    unit: self.name_of(unit),
                    destination: point(destination),
                },
                MovementEvent::Finished { unit } => EventRecord::Finished {
                    tick,
                    unit: self.name_of(unit),
                },
                MovementEvent::Failed { unit, destination } => EventRecord::Failed {
                    tick,
                    unit: self.name_of(unit),
                    destination: point(destination),
                },
                MovementEvent::Canceled { unit } => EventRecord::Canceled {
                    tick,
                    unit: self.name_of(unit),
                },
            });
        }
        for event in &tick_events.combat {
            out.push(match *event {
                CombatEvent::Engaged { attacker, target } => EventRecord::Engaged {
                    tick,
                    attacker: self.name_of(attacker),
                    target: self.name_of(target),
                },
                CombatEvent::ShotFired {
                    attacker,
                    aim,
                    target,
                } => EventRecord::ShotFired {
                    tick,
                    attacker: self.name_of(attacker),
                    aim: point(aim),
                    target: target.map(|t| self.name_of(t)),
                },
                CombatEvent::TargetLost { attacker, target } => EventRecord::TargetLost {
                    tick,
                    attacker: self.name_of(attacker),
                    target: self.name_of(target),
                },
            });
        }
    }

    fn unit_reports(&self) -> Vec<UnitReport> {
        self.labels
            .iter()
            .filter_map(|(label, &id)| {
                let entity = self.sim.get_entity(id)?;
                let state = entity
                    .mover
                    .as_ref()
                    .map_or(MoveState::Idle, |m| m.state());
                Some(UnitReport {
                    label: label.clone(),
                    id,
                    position: point(entity.position),
                    state: format!("{state:?}"),
                })
            })
            .collect()
    }
}

/// Answer a single path query on the scenario's map, with its structures.
pub fn query_path(
    scenario: &Scenario,
    archetype: &str,
    from: (f64, f64),
    to: (f64, f64),
) -> Result<PathReport, ScenarioError> {
    let data = scenario.archetype(archetype)?;
    let mut map = build_map(scenario)?;
    for (i, structure) in scenario.structures.iter().enumerate() {
        let (w, h) = structure.size;
        let origin = TileCoord::new(structure.origin.0, structure.origin.1);
        map.place_building(i as EntityId + 1, origin, w, h)?;
    }

    let start = to_position("from", from)?;
    let goal = to_position("to", to)?;
    let policy = data.build_policy();

    let (found, cost, waypoints) = match find_path(&map, start, goal, policy.as_ref()) {
        Ok(path) => {
            let waypoints = path
                .waypoints
                .iter()
                .map(|w| WaypointReport {
                    position: point(w.position),
                    tile: match w.node {
                        NodeRef::Tile(c) => Some((c.x, c.y)),
                        NodeRef::Temp => None,
                    },
                })
                .collect();
            (true, Some(path.cost.to_num::<f64>()), waypoints)
        }
        Err(err) => {
            tracing::info!(%err, "No path");
            (false, None, Vec::new())
        }
    };

    Ok(PathReport {
        archetype: archetype.to_string(),
        from: point(start),
        to: point(goal),
        found,
        cost,
        waypoints,
    })
}
