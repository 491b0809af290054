//! Scenario tests for the group coordinator

use super::*;
use crate::backend::MemoryBackend;
use crate::sink::RecordingSink;
use crate::state::{GroupId, MixerEvent, MuteSoloMachine};
use std::sync::Arc;

fn setup(levels: &[(&str, u8)]) -> (Arc<MemoryBackend>, MuteSoloMachine, GroupCoordinator) {
    let backend = Arc::new(MemoryBackend::with_levels(levels));
    let machine = MuteSoloMachine::new(backend.clone(), &["Main-Out"]);
    let coordinator =
        GroupCoordinator::with_channels(&machine, GridLayout::default(), SnapRules::default());
    (backend, machine, coordinator)
}

fn mics() -> (Arc<MemoryBackend>, MuteSoloMachine, GroupCoordinator) {
    setup(&[("Mic-AN1", 80), ("Mic-AN2", 40), ("PCM-AN1-AN1", 60)])
}

/// Drag `name` so its left edge meets `target`'s right edge
fn drag_next_to(coordinator: &mut GroupCoordinator, name: &str, target: &str) {
    let rect = coordinator.block_rect(target).unwrap();
    assert!(coordinator.move_block(name, rect.right(), rect.y));
}

#[test]
fn test_pair_seeds_from_raw_levels_without_pushing() {
    let (backend, mut machine, mut coordinator) = mics();
    let sink = Arc::new(RecordingSink::default());
    machine.subscribe(sink.clone());

    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    let group = coordinator.group(id).unwrap();
    assert_eq!(group.macro_level, 60);
    assert_eq!(group.balance, 67);

    // Creation leaves the hardware exactly where it was
    assert!(backend.writes().is_empty());
    assert_eq!(backend.peek("Mic-AN1"), Some(80));
    assert_eq!(backend.peek("Mic-AN2"), Some(40));
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, MixerEvent::GroupChanged { macro_level: 60, balance: 67, .. })));

    // Pushing the same setting applies the pan law, which lands elsewhere
    assert!(coordinator.set_macro_level(&mut machine, id, 60));
    assert_eq!(backend.peek("Mic-AN1"), Some(30));
    assert_eq!(backend.peek("Mic-AN2"), Some(52));
}

#[test]
fn test_center_balance_is_constant_power() {
    let (backend, mut machine, mut coordinator) = mics();
    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();

    coordinator.set_balance(&mut machine, id, 50);
    coordinator.set_macro_level(&mut machine, id, 100);
    assert_eq!(backend.peek("Mic-AN1"), Some(71));
    assert_eq!(backend.peek("Mic-AN2"), Some(71));

    let group = coordinator.group(id).unwrap();
    assert_eq!((group.macro_level, group.balance), (100, 50));
}

#[test]
fn test_balance_extremes() {
    let (backend, mut machine, mut coordinator) = mics();
    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    coordinator.set_macro_level(&mut machine, id, 90);

    coordinator.set_balance(&mut machine, id, 0);
    assert_eq!(backend.peek("Mic-AN1"), Some(90));
    assert_eq!(backend.peek("Mic-AN2"), Some(0));

    coordinator.set_balance(&mut machine, id, 100);
    assert_eq!(backend.peek("Mic-AN1"), Some(0));
    assert_eq!(backend.peek("Mic-AN2"), Some(90));
}

#[test]
fn test_invalid_pairings_rejected() {
    let (_backend, machine, mut coordinator) = mics();

    assert_eq!(
        coordinator.pair(&machine, "Mic-AN1", "Mic-AN1"),
        Err(PairingError::SelfPair("Mic-AN1".to_string()))
    );
    assert_eq!(
        coordinator.pair(&machine, "Mic-AN1", "ghost"),
        Err(PairingError::UnknownChannel("ghost".to_string()))
    );

    coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    assert_eq!(
        coordinator.pair(&machine, "PCM-AN1-AN1", "Mic-AN2"),
        Err(PairingError::AlreadyGrouped("Mic-AN2".to_string()))
    );
    assert_eq!(coordinator.groups().count(), 1);
}

#[test]
fn test_snap_after_drag() {
    let (_backend, machine, mut coordinator) = mics();

    // Grid spacing keeps fresh blocks apart
    assert_eq!(coordinator.drag_finished(&machine, "Mic-AN2"), None);

    drag_next_to(&mut coordinator, "Mic-AN2", "Mic-AN1");
    let id = coordinator.drag_finished(&machine, "Mic-AN2").unwrap();
    let group = coordinator.group(id).unwrap();
    assert_eq!(group.member_a, "Mic-AN2");
    assert_eq!(group.member_b, "Mic-AN1");
    assert_eq!(coordinator.group_of("Mic-AN1"), Some(id));
}

#[test]
fn test_snap_tie_break_takes_first_in_scan_order() {
    let (_backend, machine, mut coordinator) =
        setup(&[("A", 10), ("B", 20), ("C", 30), ("D", 40)]);

    // B sits right of A, C sits left of A at the same height; drop D under A
    let a = coordinator.block_rect("A").unwrap();
    coordinator.move_block("B", a.right(), a.y);
    coordinator.move_block("C", a.x - a.width, a.y);
    coordinator.move_block("D", a.x, a.bottom());

    // D only touches A (B and C share no span with D beyond a corner)
    let id = coordinator.drag_finished(&machine, "D").unwrap();
    assert_eq!(coordinator.group(id).unwrap().member_b, "A");

    // A is taken, so B has no free neighbour left
    assert_eq!(coordinator.find_snap_candidate("B"), None);

    // With two free neighbours, the earlier one in the scene wins
    let (_backend, machine, mut coordinator) = setup(&[("A", 10), ("B", 20), ("C", 30)]);
    let b = coordinator.block_rect("B").unwrap();
    coordinator.move_block("A", b.x - b.width, b.y);
    coordinator.move_block("C", b.right(), b.y);
    assert_eq!(coordinator.find_snap_candidate("B"), Some("A".to_string()));
    let id = coordinator.drag_finished(&machine, "B").unwrap();
    assert_eq!(coordinator.group(id).unwrap().member_b, "A");
}

#[test]
fn test_grouped_blocks_are_not_candidates() {
    let (_backend, machine, mut coordinator) = mics();
    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();

    // Members cannot be dragged on their own
    assert!(!coordinator.move_block("Mic-AN1", 0.0, 0.0));

    // A block dropped right next to the group does not join it
    let group_rect = coordinator.group(id).unwrap().rect;
    coordinator.move_block("PCM-AN1-AN1", group_rect.right(), group_rect.y);
    assert_eq!(coordinator.drag_finished(&machine, "PCM-AN1-AN1"), None);
}

#[test]
fn test_reconcile_once_per_change() {
    let (backend, mut machine, mut coordinator) = mics();
    let sink = Arc::new(RecordingSink::default());
    machine.subscribe(sink.clone());

    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    coordinator.set_macro_level(&mut machine, id, 60);
    backend.clear_writes();
    sink.clear();

    // A second controller moves Mic-AN1; the poller reports it
    backend.external_change("Mic-AN1", 50);
    if machine.observe_level("Mic-AN1", 50) {
        coordinator.reconcile_member(&machine, "Mic-AN1");
    }
    // The next tick sees no delta and reconciles nothing
    if machine.observe_level("Mic-AN1", 50) {
        coordinator.reconcile_member(&machine, "Mic-AN1");
    }

    let group = coordinator.group(id).unwrap();
    assert_eq!(group.macro_level, 51);
    assert_eq!(group.balance, 49);

    let group_events = sink
        .events()
        .iter()
        .filter(|e| matches!(e, MixerEvent::GroupChanged { .. }))
        .count();
    assert_eq!(group_events, 1);

    // Reconciliation never writes back
    assert!(backend.writes().is_empty());
}

#[test]
fn test_reconcile_free_block_is_noop() {
    let (_backend, machine, mut coordinator) = mics();
    assert_eq!(coordinator.reconcile_member(&machine, "PCM-AN1-AN1"), None);
}

#[test]
fn test_ungroup_keeps_levels_and_mutes() {
    let (backend, mut machine, mut coordinator) = mics();
    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    coordinator.set_macro_level(&mut machine, id, 80);
    coordinator.set_balance(&mut machine, id, 25);
    machine.set_mute("Mic-AN2", true, true, false);

    let pushed_a = backend.peek("Mic-AN1");
    let remembered_b = machine.level("Mic-AN2");
    backend.clear_writes();

    let group_rect = coordinator.group(id).unwrap().rect;
    assert!(coordinator.ungroup(&machine, id));
    assert!(coordinator.group(id).is_none());
    assert!(!coordinator.ungroup(&machine, id));

    assert!(backend.writes().is_empty());
    assert_eq!(backend.peek("Mic-AN1"), pushed_a);
    assert_eq!(machine.level("Mic-AN2"), remembered_b);
    assert!(machine.get_mute("Mic-AN2"));
    assert!(!machine.get_mute("Mic-AN1"));

    // Side by side at the group's origin, directly drivable again
    let a = coordinator.block_rect("Mic-AN1").unwrap();
    let b = coordinator.block_rect("Mic-AN2").unwrap();
    assert_eq!((a.x, a.y), (group_rect.x, group_rect.y));
    assert_eq!((b.x, b.y), (a.right(), a.y));
    assert!(coordinator.move_block("Mic-AN1", 900.0, 900.0));

    assert!(machine.set_level("Mic-AN1", 15));
    assert_eq!(backend.peek("Mic-AN1"), Some(15));
}

#[test]
fn test_regroup_recomputes_from_raw_levels() {
    let (_backend, mut machine, mut coordinator) = mics();
    let first = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    coordinator.set_macro_level(&mut machine, first, 100);
    coordinator.set_balance(&mut machine, first, 50);
    coordinator.ungroup(&machine, first);

    let second = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    assert_ne!(first, second);
    let group = coordinator.group(second).unwrap();
    assert_eq!((group.macro_level, group.balance), (71, 50));
}

#[test]
fn test_group_push_respects_member_mute() {
    let (backend, mut machine, mut coordinator) = mics();
    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    machine.set_mute("Mic-AN1", true, true, false);

    coordinator.set_balance(&mut machine, id, 0);
    coordinator.set_macro_level(&mut machine, id, 90);

    // Muted member stays silent but remembers its share
    assert_eq!(backend.peek("Mic-AN1"), Some(0));
    assert_eq!(machine.level("Mic-AN1"), Some(90));

    machine.set_mute("Mic-AN1", false, true, false);
    assert_eq!(backend.peek("Mic-AN1"), Some(90));
}

#[test]
fn test_group_mute_and_solo_toggle_both_members() {
    let (_backend, mut machine, mut coordinator) = mics();
    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    let sink = Arc::new(RecordingSink::default());
    machine.subscribe(sink.clone());

    // One member muted: toggling mutes both
    machine.set_mute("Mic-AN1", true, true, false);
    sink.clear();
    assert!(coordinator.toggle_group_mute(&mut machine, id));
    assert!(machine.get_mute("Mic-AN1") && machine.get_mute("Mic-AN2"));
    assert_eq!(sink.count_state_changed(), 1);

    assert!(coordinator.toggle_group_mute(&mut machine, id));
    assert!(!machine.get_mute("Mic-AN1") && !machine.get_mute("Mic-AN2"));

    assert!(coordinator.toggle_group_solo(&mut machine, id));
    assert!(machine.get_solo("Mic-AN1") && machine.get_solo("Mic-AN2"));
    assert!(machine.get_mute("PCM-AN1-AN1"));
    assert!(!machine.get_effective_mute("Mic-AN2"));

    assert!(coordinator.toggle_group_solo(&mut machine, id));
    assert!(!machine.any_soloed());
    assert!(!machine.get_mute("PCM-AN1-AN1"));

    assert!(!coordinator.toggle_group_mute(&mut machine, GroupId(99)));
}

#[test]
fn test_move_group() {
    let (_backend, machine, mut coordinator) = mics();
    let id = coordinator.pair(&machine, "Mic-AN1", "Mic-AN2").unwrap();
    assert!(coordinator.move_group(id, 400.0, 50.0));
    let rect = coordinator.group(id).unwrap().rect;
    assert_eq!((rect.x, rect.y), (400.0, 50.0));
    assert!(!coordinator.move_group(GroupId(42), 0.0, 0.0));
}

#[test]
fn test_scene_order_after_pairing() {
    let (_backend, machine, mut coordinator) = mics();
    coordinator.pair(&machine, "Mic-AN2", "PCM-AN1-AN1").unwrap();

    let items = coordinator.items();
    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], SceneItem::Block { name, .. } if name == "Mic-AN1"));
    assert!(matches!(&items[1], SceneItem::Group(g) if g.member_a == "Mic-AN2"));
}

#[test]
#[should_panic(expected = "missing from the channel map")]
fn test_group_over_foreign_channel_panics() {
    let (_backend, mut machine, mut coordinator) = mics();
    // A block the state machine never heard of
    coordinator.add_block("Stranger", Rect::new(0.0, 0.0, 120.0, 300.0));
    coordinator.add_block("Other", Rect::new(120.0, 0.0, 120.0, 300.0));

    let other = Arc::new(MemoryBackend::with_levels(&[("Stranger", 10), ("Other", 20)]));
    let foreign = MuteSoloMachine::new(other, &["Main-Out"]);
    let id = coordinator.pair(&foreign, "Stranger", "Other").unwrap();

    coordinator.set_macro_level(&mut machine, id, 50);
}
