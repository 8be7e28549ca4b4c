//! Order dispatch and target tracking.
//!
//! Orders are a closed set matched in [`Simulation::dispatch`]. An order
//! either has an effect right away (a path was planned, an engagement
//! started, a shot fired) or reports `executed = false` and changes nothing
//! else.
//!
//! Target movement is handled lazily: a movement notice only marks the
//! watcher, and the re-plan happens in the next tick's evaluation.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Weapon};
use crate::movement::MoveState;
use crate::math::Vec2Fixed;
use crate::simulation::Simulation;
use crate::targeting::TargetView;

/// What a shot is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotTarget {
    /// An entity, led if it is moving.
    Entity(EntityId),
    /// A fixed point on the ground.
    Position(Vec2Fixed),
}

/// Player or AI intent for a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Walk to a position.
    Move(Vec2Fixed),
    /// Engage a hostile entity, approaching it if needed.
    Attack(EntityId),
    /// Fire once without moving.
    Shoot(ShotTarget),
}

/// An order together with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedOrder {
    /// The intent.
    pub order: Order,
    executed: bool,
}

impl IssuedOrder {
    /// Wrap an order that has not been dispatched yet.
    #[must_use]
    pub const fn new(order: Order) -> Self {
        Self {
            order,
            executed: false,
        }
    }

    /// Whether dispatch produced an effect.
    #[must_use]
    pub const fn executed(&self) -> bool {
        self.executed
    }
}

/// Combat notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// Attacker is in range of its target and engaging.
    Engaged {
        /// Attacking unit.
        attacker: EntityId,
        /// Engaged entity.
        target: EntityId,
    },
    /// A shot was fired.
    ShotFired {
        /// Shooter.
        attacker: EntityId,
        /// Point the shot was aimed at.
        aim: Vec2Fixed,
        /// Targeted entity, if any.
        target: Option<EntityId>,
    },
    /// The tracked target no longer exists.
    TargetLost {
        /// Unit that was tracking it.
        attacker: EntityId,
        /// Vanished entity.
        target: EntityId,
    },
}

impl Simulation {
    /// Dispatch an order. Returns whether it had any effect.
    ///
    /// A `false` result means nothing happened; it is not an error.
    pub fn submit(&mut self, unit: EntityId, order: Order) -> bool {
        let mut issued = IssuedOrder::new(order);
        self.dispatch(unit, &mut issued);
        issued.executed()
    }

    /// Dispatch an order and record the outcome in `issued`.
    pub fn dispatch(&mut self, unit: EntityId, issued: &mut IssuedOrder) {
        if !self.entities.contains(unit) {
            tracing::warn!(entity = unit, order = ?issued.order, "Order for unknown entity");
            issued.executed = false;
            return;
        }

        issued.executed = match issued.order {
            Order::Move(destination) => self.order_move(unit, destination),
            Order::Attack(target) => self.order_attack(unit, target),
            Order::Shoot(target) => self.order_shoot(unit, target),
        };
        tracing::debug!(entity = unit, order = ?issued.order, executed = issued.executed, "Order dispatched");
    }

    fn order_move(&mut self, unit: EntityId, destination: Vec2Fixed) -> bool {
        let Some(entity) = self.entities.get_mut(unit) else {
            return false;
        };
        let Some(mover) = entity.mover.as_mut() else {
            return false;
        };

        entity.targeting.clear(&mut self.subscriptions);
        let state = mover.go_to(&self.map, entity.position, destination, &mut self.outbox.movement);
        state == MoveState::Moving
    }

    fn order_attack(&mut self, unit: EntityId, target: EntityId) -> bool {
        if unit == target {
            return false;
        }
        let Some(attacker) = self.entities.get(unit) else {
            return false;
        };
        let Some(weapon) = attacker.weapon else {
            return false;
        };
        let Some(victim) = self.entities.get(target) else {
            return false;
        };
        if !attacker.owner.is_enemy(&victim.owner) {
            return false;
        }
        let (origin, target_position) = (attacker.position, victim.position);

        if let Some(entity) = self.entities.get_mut(unit) {
            entity.targeting.set(&mut self.subscriptions, unit, target);
        }

        if weapon.in_range(origin, target_position) {
            self.engage(unit, target);
            return true;
        }
        if self.approach(unit, target_position) {
            return true;
        }

        if let Some(entity) = self.entities.get_mut(unit) {
            entity.targeting.clear(&mut self.subscriptions);
        }
        false
    }

    fn order_shoot(&mut self, unit: EntityId, target: ShotTarget) -> bool {
        let Some(shooter) = self.entities.get(unit) else {
            return false;
        };
        let Some(weapon) = shooter.weapon else {
            return false;
        };
        let origin = shooter.position;

        let (aim, target) = match target {
            ShotTarget::Entity(id) => {
                let Some(view) = self.range_target(id) else {
                    return false;
                };
                if !weapon.in_range(origin, view.position) {
                    return false;
                }
                (self.lead_aim(id, origin, view, &weapon), Some(id))
            }
            ShotTarget::Position(position) => {
                if !weapon.in_range(origin, position) {
                    return false;
                }
                (position, None)
            }
        };

        self.outbox.combat.push(CombatEvent::ShotFired {
            attacker: unit,
            aim,
            target,
        });
        true
    }

    /// Aim point for a shot at `target`, leading it along its path.
    fn lead_aim(&self, target: EntityId, origin: Vec2Fixed, view: TargetView, weapon: &Weapon) -> Vec2Fixed {
        if !view.moving || !weapon.uses_projectiles() {
            return view.position;
        }
        let flight_time = origin.distance(view.position) / weapon.projectile_speed;
        self.entities
            .get(target)
            .and_then(|entity| entity.mover.as_ref())
            .map_or(view.position, |mover| {
                mover.predict_position(view.position, flight_time)
            })
    }

    /// Stop and start engaging `target`.
    fn engage(&mut self, unit: EntityId, target: EntityId) {
        let Some(entity) = self.entities.get_mut(unit) else {
            return;
        };
        if let Some(mover) = entity.mover.as_mut() {
            mover.stop(&mut self.outbox.movement);
        }
        entity.targeting.engaged = true;
        entity.targeting.replan_pending = false;
        self.outbox.combat.push(CombatEvent::Engaged {
            attacker: unit,
            target,
        });
    }

    /// Walk toward the usable tile closest to `target_position`.
    fn approach(&mut self, unit: EntityId, target_position: Vec2Fixed) -> bool {
        let Some(node) = self.map.closest_node(target_position) else {
            return false;
        };
        let Some(entity) = self.entities.get_mut(unit) else {
            return false;
        };
        let Some(mover) = entity.mover.as_mut() else {
            return false;
        };
        mover.go_to(&self.map, entity.position, node.center, &mut self.outbox.movement)
            == MoveState::Moving
    }

    /// Drop a destroyed target from `watcher`.
    ///
    /// Returns `false` when the watcher was not (or no longer) tracking it,
    /// so repeated or late notices are harmless.
    pub fn target_destroyed(&mut self, watcher: EntityId, target: EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(watcher) else {
            return false;
        };
        if entity.targeting.target.map(|t| t.entity) != Some(target) {
            return false;
        }

        entity.targeting.clear(&mut self.subscriptions);
        if let Some(mover) = entity.mover.as_mut() {
            mover.stop(&mut self.outbox.movement);
        }
        self.outbox.combat.push(CombatEvent::TargetLost {
            attacker: watcher,
            target,
        });
        tracing::debug!(entity = watcher, target, "Target lost");
        true
    }

    /// Evaluate every tracked target: engage in range, re-plan pending approaches.
    pub(crate) fn run_target_evaluation(&mut self, entity_ids: &[EntityId]) {
        for &id in entity_ids {
            self.evaluate_target(id);
        }
    }

    fn evaluate_target(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        let Some(handle) = entity.targeting.target else {
            return;
        };
        let Some(view) = self.range_target(handle.entity) else {
            self.target_destroyed(id, handle.entity);
            return;
        };

        let in_range = entity
            .weapon
            .is_some_and(|weapon| weapon.in_range(entity.position, view.position));
        if in_range {
            if !entity.targeting.engaged {
                self.engage(id, handle.entity);
            }
            return;
        }

        let replan = entity.targeting.replan_pending;
        if let Some(entity) = self.entities.get_mut(id) {
            entity.targeting.engaged = false;
            entity.targeting.replan_pending = false;
        }
        if replan {
            tracing::trace!(entity = id, target = handle.entity, "Re-planning toward moved target");
            self.approach(id, view.position);
        }
    }
}
