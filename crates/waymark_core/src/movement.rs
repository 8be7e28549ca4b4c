//! Per-unit movement state machine.
//!
//! An executor owns the unit's current path and walks it one tick at a time.
//! Lifecycle changes are reported as [`MovementEvent`]s pushed onto a caller
//! supplied buffer, never as errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::cost::CostPolicy;
use crate::error::{GameError, Result};
use crate::map::TileMap;
use crate::math::{Fixed, Vec2Fixed};
use crate::pathfinding::{find_path, Path, Waypoint};
use crate::persistence::SaveArchive;

/// Distance at which a waypoint counts as reached.
pub const ARRIVAL_EPSILON: Fixed = Fixed::from_bits(1 << 16);

/// Executor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveState {
    /// Never commanded.
    #[default]
    Idle,
    /// Walking a path.
    Moving,
    /// Reached the destination.
    Finished,
    /// No path to the destination.
    Failed,
    /// Stopped before arriving.
    Canceled,
}

impl MoveState {
    /// Check if this is an outcome of a finished command.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }

    /// Stable numeric code used in save archives.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Moving => 1,
            Self::Finished => 2,
            Self::Failed => 3,
            Self::Canceled => 4,
        }
    }

    /// Inverse of [`MoveState::code`].
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Moving),
            2 => Some(Self::Finished),
            3 => Some(Self::Failed),
            4 => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// Movement lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementEvent {
    /// A new path was accepted.
    Started {
        /// Moving unit.
        unit: EntityId,
        /// Where it is heading.
        destination: Vec2Fixed,
    },
    /// The unit arrived.
    Finished {
        /// Arriving unit.
        unit: EntityId,
    },
    /// No path could be found.
    Failed {
        /// Commanded unit.
        unit: EntityId,
        /// Unreachable destination.
        destination: Vec2Fixed,
    },
    /// Movement was stopped.
    Canceled {
        /// Stopped unit.
        unit: EntityId,
    },
}

impl MovementEvent {
    /// Unit the event is about.
    #[must_use]
    pub const fn unit(&self) -> EntityId {
        match self {
            Self::Started { unit, .. }
            | Self::Finished { unit }
            | Self::Failed { unit, .. }
            | Self::Canceled { unit } => *unit,
        }
    }
}

/// Minimal resumable executor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSnapshot {
    /// Lifecycle state.
    pub state: MoveState,
    /// Where the current path was planned from.
    pub origin: Vec2Fixed,
    /// Commanded destination.
    pub destination: Option<Vec2Fixed>,
    /// Index of the waypoint being walked toward.
    pub index: u32,
}

impl MovementSnapshot {
    /// Write under `{prefix}.*` keys.
    pub fn write(&self, archive: &mut dyn SaveArchive, prefix: &str) {
        archive.put_int(&format!("{prefix}.state"), self.state.code());
        archive.put_vec(&format!("{prefix}.origin"), self.origin);
        archive.put_int(&format!("{prefix}.index"), i64::from(self.index));
        archive.put_int(
            &format!("{prefix}.has_destination"),
            i64::from(self.destination.is_some()),
        );
        if let Some(destination) = self.destination {
            archive.put_vec(&format!("{prefix}.destination"), destination);
        }
    }

    /// Read a snapshot written by [`MovementSnapshot::write`].
    ///
    /// # Errors
    ///
    /// Returns an archive error when a key is missing or mistyped, and
    /// [`GameError::InvalidState`] for out-of-range values.
    pub fn read(archive: &dyn SaveArchive, prefix: &str) -> Result<Self> {
        let code = archive.get_int(&format!("{prefix}.state"))?;
        let state = MoveState::from_code(code)
            .ok_or_else(|| GameError::InvalidState(format!("Unknown movement state code {code}")))?;
        let index = archive.get_int(&format!("{prefix}.index"))?;
        let index = u32::try_from(index)
            .map_err(|_| GameError::InvalidState(format!("Waypoint index {index} out of range")))?;
        let destination = if archive.get_int(&format!("{prefix}.has_destination"))? != 0 {
            Some(archive.get_vec(&format!("{prefix}.destination"))?)
        } else {
            None
        };

        Ok(Self {
            state,
            origin: archive.get_vec(&format!("{prefix}.origin"))?,
            destination,
            index,
        })
    }
}

/// Walks a unit along planned paths.
#[derive(Debug, Clone)]
pub struct MovementExecutor {
    unit: EntityId,
    policy: Arc<dyn CostPolicy>,
    path: Option<Path>,
    /// Waypoint currently walked toward.
    index: usize,
    state: MoveState,
    origin: Vec2Fixed,
    destination: Option<Vec2Fixed>,
}

impl MovementExecutor {
    /// Create an idle executor using `policy` for every plan.
    #[must_use]
    pub fn new(unit: EntityId, policy: Arc<dyn CostPolicy>) -> Self {
        Self {
            unit,
            policy,
            path: None,
            index: 0,
            state: MoveState::Idle,
            origin: Vec2Fixed::ZERO,
            destination: None,
        }
    }

    /// Owning unit.
    #[must_use]
    pub const fn unit(&self) -> EntityId {
        self.unit
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> MoveState {
        self.state
    }

    /// True while walking a path.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.state == MoveState::Moving
    }

    /// Last commanded destination.
    #[must_use]
    pub const fn destination(&self) -> Option<Vec2Fixed> {
        self.destination
    }

    /// Injected cost policy.
    #[must_use]
    pub fn policy(&self) -> &dyn CostPolicy {
        self.policy.as_ref()
    }

    /// Path being walked, if moving.
    #[must_use]
    pub const fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    /// Plan a path from `position` to `destination` and start walking it.
    ///
    /// Replaces any path in progress without a `Canceled` event. Returns
    /// [`MoveState::Moving`] on success and [`MoveState::Failed`] otherwise.
    pub fn go_to(
        &mut self,
        map: &TileMap,
        position: Vec2Fixed,
        destination: Vec2Fixed,
        events: &mut Vec<MovementEvent>,
    ) -> MoveState {
        self.origin = position;
        self.destination = Some(destination);
        self.index = 0;

        match find_path(map, position, destination, self.policy.as_ref()) {
            Ok(path) => {
                tracing::debug!(unit = self.unit, steps = path.steps(), %destination, "Path planned");
                self.path = Some(path);
                self.state = MoveState::Moving;
                events.push(MovementEvent::Started {
                    unit: self.unit,
                    destination,
                });
            }
            Err(err) => {
                tracing::debug!(unit = self.unit, %err, "Path planning failed");
                self.path = None;
                self.state = MoveState::Failed;
                events.push(MovementEvent::Failed {
                    unit: self.unit,
                    destination,
                });
            }
        }
        self.state
    }

    /// Step along the path for `dt` seconds, updating `position` in place.
    ///
    /// Leftover distance after reaching a waypoint carries on toward the
    /// next one. If the segment ahead has become blocked the executor
    /// re-plans from where it stands.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotMoving`] when called outside the `Moving` state.
    pub fn advance(
        &mut self,
        map: &TileMap,
        position: &mut Vec2Fixed,
        dt: Fixed,
        events: &mut Vec<MovementEvent>,
    ) -> Result<()> {
        if self.state != MoveState::Moving {
            return Err(GameError::NotMoving(self.unit));
        }
        if self.segment_blocked(map) {
            self.replan(map, *position, events);
            return Ok(());
        }

        let mut budget = self.policy.speed().saturating_mul(dt);
        loop {
            let Some(target) = self.current_waypoint() else {
                self.finish(events);
                return Ok(());
            };

            let remaining = position.distance(target.position);
            if remaining <= ARRIVAL_EPSILON {
                *position = target.position;
                self.index += 1;
                if self.current_waypoint().is_none() {
                    self.finish(events);
                    return Ok(());
                }
                if self.segment_blocked(map) {
                    self.replan(map, *position, events);
                    return Ok(());
                }
                continue;
            }

            if budget <= Fixed::ZERO {
                return Ok(());
            }
            let (next, covered) = position.move_towards(target.position, budget);
            *position = next;
            budget -= covered;
        }
    }

    /// Halt and discard the path. Returns `false` when not moving.
    pub fn stop(&mut self, events: &mut Vec<MovementEvent>) -> bool {
        if self.state != MoveState::Moving {
            return false;
        }
        self.path = None;
        self.index = 0;
        self.state = MoveState::Canceled;
        events.push(MovementEvent::Canceled { unit: self.unit });
        true
    }

    /// Waypoints not yet reached, skipping `offset` of them.
    pub fn rest_of_path(&self, offset: usize) -> impl Iterator<Item = &Waypoint> + '_ {
        self.path
            .iter()
            .flat_map(|path| path.waypoints.iter())
            .skip(self.index.saturating_add(offset))
    }

    /// Where the unit will be after `seconds` if it keeps walking from `from`.
    #[must_use]
    pub fn predict_position(&self, from: Vec2Fixed, seconds: Fixed) -> Vec2Fixed {
        let mut budget = self.policy.speed().saturating_mul(seconds);
        let mut position = from;
        for waypoint in self.rest_of_path(0) {
            if budget <= Fixed::ZERO {
                break;
            }
            let (next, covered) = position.move_towards(waypoint.position, budget);
            position = next;
            budget -= covered;
        }
        position
    }

    /// Capture the resumable state.
    #[must_use]
    pub fn snapshot(&self) -> MovementSnapshot {
        MovementSnapshot {
            state: self.state,
            origin: self.origin,
            destination: self.destination,
            index: u32::try_from(self.index).unwrap_or(u32::MAX),
        }
    }

    /// Restore from a snapshot. A `Moving` snapshot re-plans its original
    /// query, which yields the same path the index refers to.
    ///
    /// Restores as `Failed` if the re-plan no longer finds a path.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::StateCorruption`] when a `Moving` snapshot has no
    /// destination or its index lies past the end of the path.
    pub fn restore(&mut self, map: &TileMap, snapshot: &MovementSnapshot) -> Result<MoveState> {
        let (state, path, index) = if snapshot.state == MoveState::Moving {
            self.replan_snapshot(map, snapshot)?
        } else {
            (snapshot.state, None, 0)
        };

        self.origin = snapshot.origin;
        self.destination = snapshot.destination;
        self.state = state;
        self.path = path;
        self.index = index;
        Ok(state)
    }

    /// Re-run a `Moving` snapshot's query without touching `self`.
    fn replan_snapshot(
        &self,
        map: &TileMap,
        snapshot: &MovementSnapshot,
    ) -> Result<(MoveState, Option<Path>, usize)> {
        let destination = snapshot.destination.ok_or_else(|| GameError::StateCorruption {
            entity: self.unit,
            reason: "moving without a destination".into(),
        })?;

        match find_path(map, snapshot.origin, destination, self.policy.as_ref()) {
            Ok(path) => {
                let index = snapshot.index as usize;
                if index >= path.len() {
                    return Err(GameError::StateCorruption {
                        entity: self.unit,
                        reason: format!("waypoint index {index} past path of {}", path.len()),
                    });
                }
                Ok((MoveState::Moving, Some(path), index))
            }
            Err(err) => {
                tracing::warn!(unit = self.unit, %err, "Restored path no longer exists");
                Ok((MoveState::Failed, None, 0))
            }
        }
    }

    fn current_waypoint(&self) -> Option<Waypoint> {
        self.path
            .as_ref()
            .and_then(|path| path.waypoints.get(self.index))
            .copied()
    }

    /// True when the edge leading to the current waypoint is no longer valid.
    fn segment_blocked(&self, map: &TileMap) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        if self.index == 0 {
            return false;
        }
        match (path.waypoints.get(self.index - 1), path.waypoints.get(self.index)) {
            (Some(from), Some(to)) => self.policy.edge_cost(map, from, to).is_none(),
            _ => false,
        }
    }

    fn replan(&mut self, map: &TileMap, position: Vec2Fixed, events: &mut Vec<MovementEvent>) {
        let Some(destination) = self.destination else {
            return;
        };
        tracing::debug!(unit = self.unit, %position, "Path blocked, re-planning");
        self.go_to(map, position, destination, events);
    }

    fn finish(&mut self, events: &mut Vec<MovementEvent>) {
        self.path = None;
        self.index = 0;
        self.state = MoveState::Finished;
        events.push(MovementEvent::Finished { unit: self.unit });
        tracing::debug!(unit = self.unit, "Movement finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::GroundPolicy;
    use crate::map::TileCoord;
    use crate::persistence::MemoryArchive;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn center(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(
            Fixed::from_num(x) + Fixed::from_num(0.5),
            Fixed::from_num(y) + Fixed::from_num(0.5),
        )
    }

    fn executor() -> MovementExecutor {
        MovementExecutor::new(1, Arc::new(GroundPolicy::new(fixed(2), fixed(1))))
    }

    fn run_until_done(
        exec: &mut MovementExecutor,
        map: &TileMap,
        pos: &mut Vec2Fixed,
        events: &mut Vec<MovementEvent>,
    ) {
        let dt = Fixed::from_num(0.25);
        for _ in 0..1000 {
            if !exec.is_moving() {
                return;
            }
            exec.advance(map, pos, dt, events).unwrap();
        }
        panic!("unit never stopped moving");
    }

    #[test]
    fn test_go_to_and_arrive() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        let mut events = Vec::new();
        let mut pos = center(0, 0);

        assert_eq!(exec.go_to(&map, pos, center(4, 0), &mut events), MoveState::Moving);
        run_until_done(&mut exec, &map, &mut pos, &mut events);

        assert_eq!(pos, center(4, 0));
        assert_eq!(exec.state(), MoveState::Finished);
        assert_eq!(
            events,
            vec![
                MovementEvent::Started { unit: 1, destination: center(4, 0) },
                MovementEvent::Finished { unit: 1 },
            ]
        );
    }

    #[test]
    fn test_speed_carries_over_waypoints() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        let mut events = Vec::new();
        let mut pos = center(0, 0);
        exec.go_to(&map, pos, center(5, 0), &mut events);

        // Speed 2 for 1.25s crosses two waypoints and a half tile.
        exec.advance(&map, &mut pos, Fixed::from_num(1.25), &mut events).unwrap();
        assert_eq!(pos, Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(0.5)));
        assert!(exec.is_moving());
    }

    #[test]
    fn test_unreachable_fails() {
        let mut map = TileMap::new(6, 6, fixed(1));
        map.place_building(5, TileCoord::new(4, 4), 1, 1).unwrap();
        let mut exec = executor();
        let mut events = Vec::new();

        assert_eq!(exec.go_to(&map, center(0, 0), center(4, 4), &mut events), MoveState::Failed);
        assert_eq!(events, vec![MovementEvent::Failed { unit: 1, destination: center(4, 4) }]);
        assert_eq!(exec.rest_of_path(0).count(), 0);
    }

    #[test]
    fn test_advance_outside_moving_is_error() {
        let map = TileMap::new(2, 2, fixed(1));
        let mut exec = executor();
        let mut pos = center(0, 0);
        let result = exec.advance(&map, &mut pos, Fixed::ONE, &mut Vec::new());
        assert!(matches!(result, Err(GameError::NotMoving(1))));
    }

    #[test]
    fn test_stop_cancels_once() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        let mut events = Vec::new();
        exec.go_to(&map, center(0, 0), center(9, 9), &mut events);
        events.clear();

        assert!(exec.stop(&mut events));
        assert!(!exec.stop(&mut events));
        assert_eq!(events, vec![MovementEvent::Canceled { unit: 1 }]);
        assert_eq!(exec.state(), MoveState::Canceled);
    }

    #[test]
    fn test_replan_while_moving_emits_single_start() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        let mut events = Vec::new();
        let mut pos = center(0, 0);
        exec.go_to(&map, pos, center(9, 0), &mut events);
        exec.advance(&map, &mut pos, Fixed::ONE, &mut events).unwrap();
        events.clear();

        exec.go_to(&map, pos, center(0, 9), &mut events);
        run_until_done(&mut exec, &map, &mut pos, &mut events);

        assert_eq!(
            events,
            vec![
                MovementEvent::Started { unit: 1, destination: center(0, 9) },
                MovementEvent::Finished { unit: 1 },
            ]
        );
        assert_eq!(pos, center(0, 9));
    }

    #[test]
    fn test_blocked_segment_triggers_replan() {
        let mut map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        let mut events = Vec::new();
        let mut pos = center(0, 5);
        exec.go_to(&map, pos, center(9, 5), &mut events);
        exec.advance(&map, &mut pos, Fixed::ONE, &mut events).unwrap();

        map.place_building(42, TileCoord::new(4, 3), 1, 5).unwrap();
        events.clear();
        run_until_done(&mut exec, &map, &mut pos, &mut events);

        assert_eq!(pos, center(9, 5));
        assert_eq!(events.first(), Some(&MovementEvent::Started { unit: 1, destination: center(9, 5) }));
        assert_eq!(events.last(), Some(&MovementEvent::Finished { unit: 1 }));
    }

    #[test]
    fn test_rest_of_path_is_read_only() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        exec.go_to(&map, center(0, 0), center(3, 0), &mut Vec::new());

        let all: Vec<_> = exec.rest_of_path(0).map(|w| w.position).collect();
        assert_eq!(all.len(), 4);
        assert_eq!(exec.rest_of_path(2).count(), 2);
        assert_eq!(exec.rest_of_path(10).count(), 0);
        assert_eq!(exec.rest_of_path(0).count(), 4);
    }

    #[test]
    fn test_predict_position_follows_path() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        exec.go_to(&map, center(0, 0), center(3, 0), &mut Vec::new());

        assert_eq!(exec.predict_position(center(0, 0), Fixed::ONE), center(2, 0));
        assert_eq!(exec.predict_position(center(0, 0), fixed(100)), center(3, 0));
    }

    #[test]
    fn test_snapshot_restore_resumes_same_path() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        let mut pos = center(1, 1);
        exec.go_to(&map, pos, center(8, 6), &mut Vec::new());
        exec.advance(&map, &mut pos, fixed(1), &mut Vec::new()).unwrap();

        let mut archive = MemoryArchive::new();
        exec.snapshot().write(&mut archive, "unit.1");
        let snapshot = MovementSnapshot::read(&archive, "unit.1").unwrap();
        assert_eq!(snapshot, exec.snapshot());

        let mut restored = executor();
        assert_eq!(restored.restore(&map, &snapshot).unwrap(), MoveState::Moving);
        let left: Vec<_> = exec.rest_of_path(0).collect();
        let right: Vec<_> = restored.rest_of_path(0).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_restore_fails_when_path_gone() {
        let mut map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        exec.go_to(&map, center(0, 0), center(9, 9), &mut Vec::new());
        let snapshot = exec.snapshot();

        map.place_building(3, TileCoord::new(9, 9), 1, 1).unwrap();
        let mut restored = executor();
        assert_eq!(restored.restore(&map, &snapshot).unwrap(), MoveState::Failed);
    }

    #[test]
    fn test_restore_rejects_bad_index() {
        let map = TileMap::new(10, 10, fixed(1));
        let snapshot = MovementSnapshot {
            state: MoveState::Moving,
            origin: center(0, 0),
            destination: Some(center(2, 0)),
            index: 40,
        };
        let mut exec = executor();
        assert!(matches!(
            exec.restore(&map, &snapshot),
            Err(GameError::StateCorruption { entity: 1, .. })
        ));
    }

    #[test]
    fn test_corrupt_restore_leaves_executor_untouched() {
        let map = TileMap::new(10, 10, fixed(1));
        let mut exec = executor();
        let mut pos = center(0, 0);
        exec.go_to(&map, pos, center(6, 3), &mut Vec::new());
        exec.advance(&map, &mut pos, fixed(1), &mut Vec::new()).unwrap();
        let before = exec.snapshot();
        let path_before = exec.path().cloned();

        let corrupt = MovementSnapshot {
            state: MoveState::Moving,
            origin: center(0, 5),
            destination: Some(center(1, 5)),
            index: 40,
        };
        assert!(exec.restore(&map, &corrupt).is_err());
        let missing = MovementSnapshot {
            destination: None,
            ..corrupt
        };
        assert!(exec.restore(&map, &missing).is_err());

        assert_eq!(exec.snapshot(), before);
        assert_eq!(exec.state(), MoveState::Moving);
        assert_eq!(exec.path().cloned(), path_before);
    }
}
