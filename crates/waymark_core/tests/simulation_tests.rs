//! End-to-end simulation tests: orders, movement, targets, listeners and saves.

use std::cell::RefCell;
use std::rc::Rc;

use waymark_core::components::{EntityId, Owner};
use waymark_core::data::ArchetypeSet;
use waymark_core::events::ListenerError;
use waymark_core::map::TileCoord;
use waymark_core::movement::{MoveState, MovementEvent};
use waymark_core::orders::{CombatEvent, IssuedOrder, Order};
use waymark_core::persistence::MemoryArchive;
use waymark_core::simulation::{Simulation, TickEvents, UnitSpawnParams};
use waymark_test_utils::determinism::{find_first_divergence, verify_simulation_determinism};
use waymark_test_utils::fixtures::{fixed, open_map, spawn_soldier, spawn_walker, tile_center};

/// Tick until `done` returns true for a tick's events, collecting everything.
fn run_until<F>(sim: &mut Simulation, max_ticks: u32, mut done: F) -> TickEvents
where
    F: FnMut(&TickEvents) -> bool,
{
    let mut all = TickEvents::default();
    for _ in 0..max_ticks {
        let events = sim.tick();
        let finished = done(&events);
        all.movement.extend(events.movement);
        all.combat.extend(events.combat);
        all.listener_failures += events.listener_failures;
        if finished {
            break;
        }
    }
    all
}

fn movement_of(events: &TickEvents, unit: EntityId) -> Vec<MovementEvent> {
    events
        .movement
        .iter()
        .copied()
        .filter(|e| e.unit() == unit)
        .collect()
}

fn state_of(sim: &Simulation, unit: EntityId) -> Option<MoveState> {
    sim.get_entity(unit)
        .and_then(|e| e.mover.as_ref())
        .map(|m| m.state())
}

// =============================================================================
// Move orders
// =============================================================================

mod move_orders {
    use super::*;

    #[test]
    fn test_move_lifecycle() {
        let mut sim = Simulation::new(open_map(10, 10));
        let unit = spawn_walker(&mut sim, tile_center(0, 0), 0);

        let mut issued = IssuedOrder::new(Order::Move(tile_center(9, 0)));
        sim.dispatch(unit, &mut issued);
        assert!(issued.executed());

        let events = run_until(&mut sim, 200, |e| {
            e.movement.iter().any(|m| matches!(m, MovementEvent::Finished { .. }))
        });

        assert_eq!(
            movement_of(&events, unit),
            vec![
                MovementEvent::Started {
                    unit,
                    destination: tile_center(9, 0),
                },
                MovementEvent::Finished { unit },
            ]
        );
        assert_eq!(sim.get_entity(unit).unwrap().position, tile_center(9, 0));
        assert_eq!(state_of(&sim, unit), Some(MoveState::Finished));
    }

    #[test]
    fn test_new_order_replaces_path_without_cancel() {
        let mut sim = Simulation::new(open_map(10, 10));
        let unit = spawn_walker(&mut sim, tile_center(0, 0), 0);

        assert!(sim.submit(unit, Order::Move(tile_center(9, 0))));
        sim.tick();
        assert!(sim.submit(unit, Order::Move(tile_center(0, 9))));

        let events = run_until(&mut sim, 200, |e| !e.movement.is_empty());
        assert_eq!(
            movement_of(&events, unit),
            vec![MovementEvent::Started {
                unit,
                destination: tile_center(0, 9),
            }]
        );
    }

    #[test]
    fn test_unreachable_destination_fails() {
        let mut sim = Simulation::new(open_map(6, 6));
        sim.spawn_structure(TileCoord::new(4, 4), 2, 2, Owner::default())
            .unwrap();
        let unit = spawn_walker(&mut sim, tile_center(0, 0), 0);

        assert!(!sim.submit(unit, Order::Move(tile_center(5, 5))));
        let events = sim.tick();
        assert_eq!(
            events.movement,
            vec![MovementEvent::Failed {
                unit,
                destination: tile_center(5, 5),
            }]
        );
    }

    #[test]
    fn test_structure_placed_ahead_triggers_replan() {
        let mut sim = Simulation::new(open_map(10, 3));
        let unit = spawn_walker(&mut sim, tile_center(0, 0), 0);
        assert!(sim.submit(unit, Order::Move(tile_center(9, 0))));

        for _ in 0..3 {
            sim.tick();
        }
        sim.spawn_structure(TileCoord::new(5, 0), 1, 1, Owner::default())
            .unwrap();

        let events = run_until(&mut sim, 400, |e| {
            e.movement.iter().any(|m| matches!(m, MovementEvent::Finished { .. }))
        });
        let own = movement_of(&events, unit);

        assert!(matches!(own.first(), Some(MovementEvent::Started { .. })));
        assert_eq!(own.last(), Some(&MovementEvent::Finished { unit }));
        assert!(!own.iter().any(|e| matches!(e, MovementEvent::Canceled { .. })));
        assert_eq!(sim.get_entity(unit).unwrap().position, tile_center(9, 0));
    }

    #[test]
    fn test_archetype_unit_climbs_hill() {
        const SOURCE: &str = r#"
            ArchetypeSet(archetypes: [
                ArchetypeData(
                    name: "goat",
                    speed: 8589934592,
                    traversal: Climbing(climb_penalty: 12884901888),
                ),
            ])
        "#;
        let set = ArchetypeSet::from_ron("goats", SOURCE).unwrap();
        let goat = set.get("goat").unwrap();

        let mut map = open_map(5, 1);
        map.set_vertex_height(2, 0, fixed(6));
        map.set_vertex_height(2, 1, fixed(6));
        let mut sim = Simulation::new(map);
        let unit = sim.spawn_unit(UnitSpawnParams::from_archetype(
            goat,
            tile_center(0, 0),
            Owner::new(1, 1),
        ));

        assert!(sim.submit(unit, Order::Move(tile_center(4, 0))));
        run_until(&mut sim, 1_000, sim_done);
        assert_eq!(sim.get_entity(unit).unwrap().position, tile_center(4, 0));
    }

    fn sim_done(events: &TickEvents) -> bool {
        events
            .movement
            .iter()
            .any(|m| matches!(m, MovementEvent::Finished { .. }))
    }
}

// =============================================================================
// Attack orders
// =============================================================================

mod attack_orders {
    use super::*;

    #[test]
    fn test_approach_then_engage() {
        let mut sim = Simulation::new(open_map(16, 16));
        let attacker = spawn_soldier(&mut sim, tile_center(0, 8), 0, 2);
        let target = spawn_walker(&mut sim, tile_center(10, 8), 1);

        assert!(sim.submit(attacker, Order::Attack(target)));
        let events = run_until(&mut sim, 400, |e| !e.combat.is_empty());

        assert_eq!(events.combat, vec![CombatEvent::Engaged { attacker, target }]);
        assert_eq!(
            movement_of(&events, attacker).last(),
            Some(&MovementEvent::Canceled { unit: attacker })
        );
        let a = sim.get_entity(attacker).unwrap().position;
        let b = sim.get_entity(target).unwrap().position;
        assert!(a.distance(b) <= fixed(2));
    }

    #[test]
    fn test_target_moving_away_replans_next_tick() {
        let mut sim = Simulation::new(open_map(24, 24));
        let attacker = spawn_soldier(&mut sim, tile_center(0, 12), 0, 2);
        let target = spawn_walker(&mut sim, tile_center(22, 12), 1);

        assert!(sim.submit(attacker, Order::Attack(target)));
        sim.tick();

        sim.move_entity(target, tile_center(22, 2)).unwrap();
        let events = sim.tick();

        assert_eq!(
            movement_of(&events, attacker),
            vec![MovementEvent::Started {
                unit: attacker,
                destination: tile_center(22, 2),
            }]
        );
    }

    #[test]
    fn test_despawned_target_is_lost_once() {
        let mut sim = Simulation::new(open_map(16, 16));
        let attacker = spawn_soldier(&mut sim, tile_center(0, 0), 0, 2);
        let target = spawn_walker(&mut sim, tile_center(12, 12), 1);

        assert!(sim.submit(attacker, Order::Attack(target)));
        sim.tick();
        sim.despawn_entity(target).unwrap();

        let events = sim.tick();
        assert_eq!(events.combat, vec![CombatEvent::TargetLost { attacker, target }]);
        assert!(sim.subscriptions().is_empty());
        assert!(!sim.target_destroyed(attacker, target));

        let later = sim.tick();
        assert!(later.combat.is_empty());
    }

    #[test]
    fn test_friendly_attack_is_a_no_op() {
        let mut sim = Simulation::new(open_map(8, 8));
        let a = spawn_soldier(&mut sim, tile_center(0, 0), 0, 2);
        let b = spawn_soldier(&mut sim, tile_center(5, 5), 0, 2);

        assert!(!sim.submit(a, Order::Attack(b)));
        assert_eq!(sim.tick(), TickEvents::default());
    }
}

// =============================================================================
// Listeners
// =============================================================================

mod listeners {
    use super::*;

    #[test]
    fn test_failing_listeners_do_not_block_others() {
        let mut sim = Simulation::new(open_map(8, 8));
        let seen = Rc::new(RefCell::new(Vec::new()));

        sim.on_movement(|_| panic!("listener exploded"));
        sim.on_movement(|_| Err(ListenerError::Rejected("not interested".into())));
        let sink = Rc::clone(&seen);
        sim.on_movement(move |event| {
            sink.borrow_mut().push(*event);
            Ok(())
        });

        let unit = spawn_walker(&mut sim, tile_center(0, 0), 0);
        assert!(sim.submit(unit, Order::Move(tile_center(3, 0))));
        let events = sim.tick();

        assert_eq!(events.listener_failures, 2);
        assert_eq!(
            *seen.borrow(),
            vec![MovementEvent::Started {
                unit,
                destination: tile_center(3, 0),
            }]
        );
    }

    #[test]
    fn test_combat_listener_sees_engagement() {
        let mut sim = Simulation::new(open_map(8, 8));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        sim.on_combat(move |event| {
            sink.borrow_mut().push(*event);
            Ok(())
        });

        let attacker = spawn_soldier(&mut sim, tile_center(0, 0), 0, 3);
        let target = spawn_walker(&mut sim, tile_center(2, 0), 1);
        assert!(sim.submit(attacker, Order::Attack(target)));
        sim.tick();

        assert_eq!(*seen.borrow(), vec![CombatEvent::Engaged { attacker, target }]);
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence {
    use super::*;

    fn walkers() -> (Simulation, EntityId, EntityId) {
        let mut sim = Simulation::new(open_map(12, 12));
        let a = spawn_walker(&mut sim, tile_center(0, 0), 0);
        let b = spawn_walker(&mut sim, tile_center(11, 0), 0);
        (sim, a, b)
    }

    #[test]
    fn test_saved_walk_resumes_identically() {
        let (mut original, a, b) = walkers();
        assert!(original.submit(a, Order::Move(tile_center(11, 11))));
        for _ in 0..12 {
            original.tick();
        }

        let mut archive = MemoryArchive::new();
        original.save_movement(&mut archive);
        let bytes = archive.to_bytes().unwrap();

        let (mut restored, ra, rb) = walkers();
        assert_eq!((ra, rb), (a, b));
        let failures = restored
            .restore_movement(&MemoryArchive::from_bytes(&bytes).unwrap())
            .unwrap();
        assert!(failures.is_empty());
        assert_eq!(state_of(&restored, a), Some(MoveState::Moving));
        assert_eq!(state_of(&restored, b), Some(MoveState::Idle));

        for _ in 0..200 {
            let left = original.tick();
            let right = restored.tick();
            assert_eq!(left.movement, right.movement);
            assert_eq!(
                original.get_entity(a).unwrap().position,
                restored.get_entity(a).unwrap().position
            );
        }
        assert_eq!(state_of(&restored, a), Some(MoveState::Finished));
    }

    #[test]
    fn test_missing_entity_fails_only_itself() {
        let (mut original, a, b) = walkers();
        assert!(original.submit(a, Order::Move(tile_center(5, 5))));
        assert!(original.submit(b, Order::Move(tile_center(6, 6))));
        original.tick();

        let mut archive = MemoryArchive::new();
        original.save_movement(&mut archive);

        let mut restored = Simulation::new(open_map(12, 12));
        let only = spawn_walker(&mut restored, tile_center(0, 0), 0);
        assert_eq!(only, a);

        let failures = restored.restore_movement(&archive).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, b);
        assert_eq!(state_of(&restored, a), Some(MoveState::Moving));
    }
}

// =============================================================================
// Determinism
// =============================================================================

mod determinism {
    use super::*;

    fn contested_field() -> Simulation {
        let mut sim = Simulation::new(open_map(20, 20));
        sim.spawn_structure(TileCoord::new(8, 6), 3, 8, Owner::new(2, 2))
            .unwrap();
        let scouts: Vec<_> = (0..5)
            .map(|i| spawn_walker(&mut sim, tile_center(0, i * 3), 0))
            .collect();
        for &s in &scouts {
            sim.submit(s, Order::Move(tile_center(19, 10)));
        }
        let hunter = spawn_soldier(&mut sim, tile_center(19, 0), 1, 2);
        sim.submit(hunter, Order::Attack(scouts[2]));
        sim
    }

    #[test]
    fn test_contested_field_is_deterministic() {
        assert!(verify_simulation_determinism(contested_field, 400));
    }

    #[test]
    fn test_contested_field_never_diverges() {
        assert_eq!(find_first_divergence(contested_field, 400), None);
    }
}
