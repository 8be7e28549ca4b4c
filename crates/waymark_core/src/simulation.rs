//! Simulation context and per-tick update.
//!
//! [`Simulation`] is the explicit context object for the movement core: it
//! owns the tile map, the entities, target subscriptions and the listener
//! lists. Nothing in the core reaches for global state.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - Consistent iteration order (sorted entity IDs)
//! - Path search is a pure function of map state
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use waymark_core::cost::GroundPolicy;
//! use waymark_core::map::TileMap;
//! use waymark_core::math::{Fixed, Vec2Fixed};
//! use waymark_core::orders::Order;
//! use waymark_core::simulation::{Simulation, UnitSpawnParams};
//!
//! let mut sim = Simulation::new(TileMap::new(16, 16, Fixed::ONE));
//! let unit = sim.spawn_unit(UnitSpawnParams {
//!     position: Vec2Fixed::new(Fixed::from_num(0.5), Fixed::from_num(0.5)),
//!     policy: Some(Arc::new(GroundPolicy::new(Fixed::from_num(4), Fixed::ONE))),
//!     ..Default::default()
//! });
//!
//! assert!(sim.submit(unit, Order::Move(Vec2Fixed::from_int(10, 10))));
//! let events = sim.tick();
//! assert_eq!(events.movement.len(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Footprint, Owner, Weapon};
use crate::cost::CostPolicy;
use crate::data::ArchetypeData;
use crate::error::{GameError, Result};
use crate::events::{ListenerError, ListenerId, Listeners};
use crate::map::{TileCoord, TileMap};
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{MovementEvent, MovementExecutor, MovementSnapshot};
use crate::orders::CombatEvent;
use crate::persistence::SaveArchive;
use crate::targeting::{TargetSubscriptions, TargetView, Targeting};

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// Simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Ticks per simulated second.
    pub tick_rate: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
        }
    }
}

impl SimConfig {
    /// Simulated seconds per tick.
    #[must_use]
    pub fn tick_duration(&self) -> Fixed {
        Fixed::ONE / Fixed::from_num(self.tick_rate.max(1))
    }
}

/// An entity with optional components.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Unique identifier for this entity.
    pub id: EntityId,
    /// World position.
    pub position: Vec2Fixed,
    /// Owning player and team.
    pub owner: Owner,
    /// Movement executor for mobile units.
    pub mover: Option<MovementExecutor>,
    /// Weapon for armed entities.
    pub weapon: Option<Weapon>,
    /// Explicit target tracking.
    pub targeting: Targeting,
    /// Building footprint for structures.
    pub footprint: Option<Footprint>,
}

impl Entity {
    /// Create a bare entity.
    #[must_use]
    pub fn new(id: EntityId, position: Vec2Fixed, owner: Owner) -> Self {
        Self {
            id,
            position,
            owner,
            mover: None,
            weapon: None,
            targeting: Targeting::default(),
            footprint: None,
        }
    }

    /// Check if the entity is walking a path.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.mover.as_ref().is_some_and(MovementExecutor::is_moving)
    }
}

/// Parameters for spawning a unit.
///
/// A unit is mobile when it gets a cost policy.
#[derive(Debug, Clone, Default)]
pub struct UnitSpawnParams {
    /// Initial position in world space.
    pub position: Vec2Fixed,
    /// Owner.
    pub owner: Owner,
    /// Traversal rules; `None` for immobile units.
    pub policy: Option<Arc<dyn CostPolicy>>,
    /// Weapon, if armed.
    pub weapon: Option<Weapon>,
}

impl UnitSpawnParams {
    /// Parameters for a unit of a data-defined archetype.
    #[must_use]
    pub fn from_archetype(archetype: &ArchetypeData, position: Vec2Fixed, owner: Owner) -> Self {
        Self {
            position,
            owner,
            policy: Some(archetype.build_policy()),
            weapon: archetype.weapon,
        }
    }
}

/// Storage for all entities in the simulation.
///
/// Uses a `HashMap` for O(1) entity lookup by ID, with deterministic
/// iteration via sorted keys when processing systems.
#[derive(Debug, Clone, Default)]
pub struct EntityStorage {
    entities: HashMap<EntityId, Entity>,
    next_id: EntityId,
}

impl EntityStorage {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a new entity and return its ID.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    /// Remove an entity by ID.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get sorted entity IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Events generated during a simulation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Movement lifecycle events, in emission order.
    pub movement: Vec<MovementEvent>,
    /// Engagements and shots.
    pub combat: Vec<CombatEvent>,
    /// Listener calls that failed or panicked.
    pub listener_failures: usize,
}

/// Events waiting for the next fan-out.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub(crate) movement: Vec<MovementEvent>,
    pub(crate) combat: Vec<CombatEvent>,
}

/// The movement simulation.
///
/// # Tick Order
///
/// 1. **Target evaluation** - deferred re-plans and engagements
/// 2. **Movement** - advance every moving executor
/// 3. **Notices** - flag watchers of entities that moved
/// 4. **Fan-out** - deliver this tick's events to listeners
#[derive(Debug)]
pub struct Simulation {
    pub(crate) tick: u64,
    pub(crate) config: SimConfig,
    pub(crate) map: TileMap,
    pub(crate) entities: EntityStorage,
    pub(crate) subscriptions: TargetSubscriptions,
    pub(crate) outbox: Outbox,
    movement_listeners: Listeners<MovementEvent>,
    combat_listeners: Listeners<CombatEvent>,
}

impl Simulation {
    /// Create a simulation over `map` with default settings.
    #[must_use]
    pub fn new(map: TileMap) -> Self {
        Self::with_config(map, SimConfig::default())
    }

    /// Create a simulation with explicit settings.
    #[must_use]
    pub fn with_config(map: TileMap, config: SimConfig) -> Self {
        Self {
            tick: 0,
            config,
            map,
            entities: EntityStorage::new(),
            subscriptions: TargetSubscriptions::new(),
            outbox: Outbox::default(),
            movement_listeners: Listeners::new(),
            combat_listeners: Listeners::new(),
        }
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Simulation settings.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The tile map.
    #[must_use]
    pub const fn map(&self) -> &TileMap {
        &self.map
    }

    /// Mutable tile map access for edits between ticks.
    pub fn map_mut(&mut self) -> &mut TileMap {
        &mut self.map
    }

    /// Get a reference to the entity storage.
    #[must_use]
    pub const fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Target subscriptions currently held.
    #[must_use]
    pub const fn subscriptions(&self) -> &TargetSubscriptions {
        &self.subscriptions
    }

    /// Register a movement-event listener.
    pub fn on_movement<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&MovementEvent) -> std::result::Result<(), ListenerError> + 'static,
    {
        self.movement_listeners.subscribe(listener)
    }

    /// Register a combat-event listener.
    pub fn on_combat<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&CombatEvent) -> std::result::Result<(), ListenerError> + 'static,
    {
        self.combat_listeners.subscribe(listener)
    }

    /// Spawn a unit.
    pub fn spawn_unit(&mut self, params: UnitSpawnParams) -> EntityId {
        let mut entity = Entity::new(0, params.position, params.owner);
        entity.weapon = params.weapon;
        let id = self.entities.insert(entity);

        if let Some(policy) = params.policy {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.mover = Some(MovementExecutor::new(id, policy));
            }
        }
        tracing::debug!(entity = id, position = %params.position, "Unit spawned");
        id
    }

    /// Spawn a building occupying a rectangle of tiles.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::PlacementBlocked`] if the footprint cannot be placed.
    pub fn spawn_structure(
        &mut self,
        origin: TileCoord,
        width: u8,
        height: u8,
        owner: Owner,
    ) -> Result<EntityId> {
        let size = self.map.tile_size();
        let corner = Vec2Fixed::new(
            Fixed::from_num(origin.x) * size,
            Fixed::from_num(origin.y) * size,
        );
        let extent = Vec2Fixed::new(
            Fixed::from_num(width) * size / Fixed::from_num(2),
            Fixed::from_num(height) * size / Fixed::from_num(2),
        );

        let mut entity = Entity::new(0, corner + extent, owner);
        entity.footprint = Some(Footprint {
            origin,
            width,
            height,
        });
        let id = self.entities.insert(entity);

        if let Err(err) = self.map.place_building(id, origin, width, height) {
            self.entities.remove(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Remove an entity.
    ///
    /// Watchers targeting it lose their target, its own target subscription
    /// is released and any building footprint is cleared from the map.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the entity doesn't exist.
    pub fn despawn_entity(&mut self, id: EntityId) -> Result<()> {
        let mut entity = self
            .entities
            .remove(id)
            .ok_or(GameError::EntityNotFound(id))?;

        entity.targeting.clear(&mut self.subscriptions);
        if entity.footprint.is_some() {
            self.map.remove_building(id);
        }
        for watcher in self.subscriptions.watchers_of(id) {
            self.target_destroyed(watcher, id);
        }
        tracing::debug!(entity = id, "Entity despawned");
        Ok(())
    }

    /// Teleport an entity, raising a movement notice for its watchers.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the entity doesn't exist.
    pub fn move_entity(&mut self, id: EntityId, position: Vec2Fixed) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(GameError::EntityNotFound(id))?;
        entity.position = position;
        self.raise_movement_notice(id);
        Ok(())
    }

    /// Current position and moving flag of a potential target.
    #[must_use]
    pub fn range_target(&self, id: EntityId) -> Option<TargetView> {
        self.entities.get(id).map(|entity| TargetView {
            position: entity.position,
            moving: entity.is_moving(),
        })
    }

    /// Flag every watcher of `id` for a re-plan on the next evaluation.
    fn raise_movement_notice(&mut self, id: EntityId) {
        for watcher in self.subscriptions.watchers_of(id) {
            if let Some(entity) = self.entities.get_mut(watcher) {
                entity.targeting.notice_moved(id);
            }
        }
    }

    /// Advance the simulation by one tick.
    ///
    /// Returns every event produced since the previous tick, including
    /// those from orders submitted in between.
    pub fn tick(&mut self) -> TickEvents {
        let entity_ids = self.entities.sorted_ids();

        // 1. Target evaluation
        self.run_target_evaluation(&entity_ids);

        // 2. Movement
        let moved = self.run_movement_system(&entity_ids);

        // 3. Movement notices, consumed by next tick's evaluation
        for id in moved {
            self.raise_movement_notice(id);
        }

        // 4. Fan-out
        let outbox = std::mem::take(&mut self.outbox);
        let listener_failures = self.movement_listeners.emit_all(&outbox.movement)
            + self.combat_listeners.emit_all(&outbox.combat);

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        TickEvents {
            movement: outbox.movement,
            combat: outbox.combat,
            listener_failures,
        }
    }

    /// Step every moving executor. Returns the entities whose position changed.
    fn run_movement_system(&mut self, entity_ids: &[EntityId]) -> Vec<EntityId> {
        let dt = self.config.tick_duration();
        let mut moved = Vec::new();

        for &id in entity_ids {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            let Some(mover) = entity.mover.as_mut() else {
                continue;
            };
            if !mover.is_moving() {
                continue;
            }

            let before = entity.position;
            if let Err(err) = mover.advance(&self.map, &mut entity.position, dt, &mut self.outbox.movement) {
                tracing::warn!(entity = id, %err, "Movement step rejected");
            }
            if entity.position != before {
                moved.push(id);
            }
        }
        moved
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Two simulations with identical state produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);

        let ids = self.entities.sorted_ids();
        ids.len().hash(&mut hasher);

        for id in ids {
            if let Some(entity) = self.entities.get(id) {
                id.hash(&mut hasher);
                entity.position.x.to_bits().hash(&mut hasher);
                entity.position.y.to_bits().hash(&mut hasher);

                if let Some(ref mover) = entity.mover {
                    let snapshot = mover.snapshot();
                    snapshot.state.code().hash(&mut hasher);
                    snapshot.index.hash(&mut hasher);
                }

                entity.targeting.target.map(|t| t.entity).hash(&mut hasher);
                entity.targeting.engaged.hash(&mut hasher);
            }
        }

        hasher.finish()
    }

    /// Write positions and movement snapshots of every mobile unit.
    pub fn save_movement(&self, archive: &mut dyn SaveArchive) {
        let ids: Vec<EntityId> = self
            .entities
            .sorted_ids()
            .into_iter()
            .filter(|&id| self.entities.get(id).is_some_and(|e| e.mover.is_some()))
            .collect();

        archive.put_int("movement.count", ids.len() as i64);
        for (i, id) in ids.into_iter().enumerate() {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let Some(mover) = entity.mover.as_ref() else {
                continue;
            };
            let prefix = format!("movement.{i}");
            archive.put_int(&format!("{prefix}.entity"), id as i64);
            archive.put_vec(&format!("{prefix}.position"), entity.position);
            mover.snapshot().write(archive, &prefix);
        }
    }

    /// Restore positions and movement state written by [`Simulation::save_movement`].
    ///
    /// Entities are matched by id. An entity that is missing or has no
    /// movement executor aborts only its own load; the per-entity failures
    /// are returned.
    ///
    /// # Errors
    ///
    /// Returns an archive error if the unit list itself cannot be read.
    pub fn restore_movement(
        &mut self,
        archive: &dyn SaveArchive,
    ) -> Result<Vec<(EntityId, GameError)>> {
        let count = archive.get_int("movement.count")?;
        let mut failures = Vec::new();

        for i in 0..count {
            let prefix = format!("movement.{i}");
            let raw_id = archive.get_int(&format!("{prefix}.entity"))?;
            let id = EntityId::try_from(raw_id).map_err(|_| {
                GameError::InvalidState(format!("Negative entity id {raw_id} in archive"))
            })?;

            if let Err(err) = self.restore_unit(archive, &prefix, id) {
                tracing::error!(entity = id, %err, "Failed to restore movement state");
                failures.push((id, err));
            }
        }
        Ok(failures)
    }

    fn restore_unit(&mut self, archive: &dyn SaveArchive, prefix: &str, id: EntityId) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| GameError::StateCorruption {
                entity: id,
                reason: "entity does not exist".into(),
            })?;
        let mover = entity
            .mover
            .as_mut()
            .ok_or_else(|| GameError::StateCorruption {
                entity: id,
                reason: "saved movement state but entity has no movement executor".into(),
            })?;

        let position = archive.get_vec(&format!("{prefix}.position"))?;
        let snapshot = MovementSnapshot::read(archive, prefix)?;
        mover.restore(&self.map, &snapshot)?;
        entity.position = position;
        Ok(())
    }
}
