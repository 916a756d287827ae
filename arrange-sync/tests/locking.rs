mod common;

use std::time::{Duration, Instant};

use serde_json::json;

use arrange_sync::{
    AcquireResult, EditOutcome, LockStatus, LockTarget, MemoryHub, PeerRole, StateStore,
    StreamKind, SyncConfig, SyncEvent,
};

fn region_lock() -> LockTarget {
    LockTarget::Region("region-1".into())
}

#[test]
fn test_owner_grant_blocks_other_members() {
    let hub = MemoryHub::new();
    let mut owner = common::peer(&hub, "owner", PeerRole::Owner);
    let mut alice = common::peer(&hub, "alice", PeerRole::Member);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let now = Instant::now();

    assert!(alice.acquire_lock(&region_lock()).is_granted());
    common::pump(&mut [&mut owner, &mut alice, &mut bob], now);

    assert_eq!(owner.lock_status(&region_lock()), LockStatus::LockedByOther("alice".into()));
    assert_eq!(bob.lock_status(&region_lock()), LockStatus::LockedByOther("alice".into()));
    assert_eq!(alice.lock_status(&region_lock()), LockStatus::LockedByMe);

    let before = bob.store().state().clone();
    let outcome = bob.update_region(&"region-1".into(), common::patch(json!({ "name": "verse" })));
    assert!(matches!(outcome, EditOutcome::Locked(ref c) if c.holder.as_str() == "alice"));
    assert_eq!(bob.store().state(), &before);

    match bob.acquire_lock(&region_lock()) {
        AcquireResult::Conflict { holder, .. } => assert_eq!(holder.as_str(), "alice"),
        other => panic!("Expected conflict, got {:?}", other),
    }
}

#[test]
fn test_simultaneous_requests_resolved_by_owner() {
    let hub = MemoryHub::new();
    let mut owner = common::peer(&hub, "owner", PeerRole::Owner);
    let mut alice = common::peer(&hub, "alice", PeerRole::Member);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let now = Instant::now();

    // Both succeed optimistically before either hears from the owner.
    assert!(alice.acquire_lock(&region_lock()).is_granted());
    assert!(bob.acquire_lock(&region_lock()).is_granted());
    common::pump(&mut [&mut owner, &mut alice, &mut bob], now);

    assert_eq!(alice.lock_status(&region_lock()), LockStatus::LockedByMe);
    assert_eq!(bob.lock_status(&region_lock()), LockStatus::LockedByOther("alice".into()));
    assert_eq!(owner.lock_status(&region_lock()), LockStatus::LockedByOther("alice".into()));

    let events = bob.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::LockLost { holder, .. } if holder.as_str() == "alice")));
    assert!(events
        .iter()
        .any(|e| matches!(
            e,
            SyncEvent::LockConflict { holder, .. } if holder.as_str() == "alice"
        )));
}

#[test]
fn test_release_frees_element() {
    let hub = MemoryHub::new();
    let mut owner = common::peer(&hub, "owner", PeerRole::Owner);
    let mut alice = common::peer(&hub, "alice", PeerRole::Member);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let now = Instant::now();

    assert!(alice.acquire_lock(&region_lock()).is_granted());
    common::pump(&mut [&mut owner, &mut alice, &mut bob], now);
    assert!(alice.release_lock(&region_lock()));
    assert!(!alice.release_lock(&region_lock()));
    common::pump(&mut [&mut owner, &mut alice, &mut bob], now);

    assert_eq!(owner.lock_status(&region_lock()), LockStatus::Unlocked);
    assert_eq!(bob.lock_status(&region_lock()), LockStatus::Unlocked);
    assert!(bob
        .update_region(&"region-1".into(), common::patch(json!({ "name": "chorus" })))
        .is_applied());
}

#[test]
fn test_departed_user_locks_are_released() {
    let hub = MemoryHub::new();
    let mut owner = common::peer(&hub, "owner", PeerRole::Owner);
    let mut alice = common::peer(&hub, "alice", PeerRole::Member);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let now = Instant::now();

    assert!(alice.acquire_lock(&region_lock()).is_granted());
    assert!(alice
        .acquire_lock(&LockTarget::Track("t2".into()))
        .is_granted());
    common::pump(&mut [&mut owner, &mut alice, &mut bob], now);
    assert_eq!(bob.locks().len(), 2);

    hub.leave(&"alice".into());
    common::pump(&mut [&mut owner, &mut bob], now);

    assert!(bob.locks().is_empty());
    assert!(owner.locks().is_empty());
    let events = bob.drain_events();
    assert!(events.contains(&SyncEvent::UserLeft("alice".into())));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SyncEvent::LockReleased { .. }))
            .count(),
        2
    );
}

#[test]
fn test_abandoned_lock_expires() {
    let hub = MemoryHub::new();
    let mut config = SyncConfig::default();
    config.set_lock_timeout(Some(Duration::from_secs(1)));
    let mut bob = arrange_sync::SyncDispatcher::new(
        common::ROOM.into(),
        "bob".into(),
        PeerRole::Member,
        hub.join(common::ROOM.into(), "bob".into()),
        arrange_sync::MemoryStore::new(common::base_project()),
        &config,
    );
    let mut alice = common::peer(&hub, "alice", PeerRole::Member);

    assert!(alice.acquire_lock(&region_lock()).is_granted());
    bob.tick(Instant::now());
    assert_eq!(bob.lock_status(&region_lock()), LockStatus::LockedByOther("alice".into()));

    std::thread::sleep(Duration::from_millis(1100));
    bob.tick(Instant::now());

    assert_eq!(bob.lock_status(&region_lock()), LockStatus::Unlocked);
    assert!(bob
        .drain_events()
        .iter()
        .any(|e| matches!(
            e,
            SyncEvent::LockReleased { holder, .. } if holder.as_str() == "alice"
        )));
}

#[test]
fn test_held_lock_outlives_timeout_while_renewed() {
    let hub = MemoryHub::new();
    let mut config = SyncConfig::default();
    config.set_lock_timeout(Some(Duration::from_secs(1)));
    let join = |user: &str| {
        arrange_sync::SyncDispatcher::new(
            common::ROOM.into(),
            user.into(),
            PeerRole::Member,
            hub.join(common::ROOM.into(), user.into()),
            arrange_sync::MemoryStore::new(common::base_project()),
            &config,
        )
    };
    let mut alice = join("alice");
    let mut bob = join("bob");

    assert!(alice.acquire_lock(&region_lock()).is_granted());
    bob.tick(Instant::now());

    std::thread::sleep(Duration::from_millis(600));
    alice.tick(Instant::now());
    bob.tick(Instant::now());

    std::thread::sleep(Duration::from_millis(600));
    alice.tick(Instant::now());
    bob.tick(Instant::now());

    assert_eq!(alice.lock_status(&region_lock()), LockStatus::LockedByMe);
    assert_eq!(bob.lock_status(&region_lock()), LockStatus::LockedByOther("alice".into()));
}

#[test]
fn test_locked_children_block_track_edits() {
    let hub = MemoryHub::new();
    let mut owner = common::peer(&hub, "owner", PeerRole::Owner);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let now = Instant::now();
    let volume = LockTarget::TrackProperty {
        track_id: "t1".into(),
        property: "volume".into(),
    };

    assert!(owner.acquire_lock(&region_lock()).is_granted());
    assert!(owner.acquire_lock(&volume).is_granted());
    common::pump(&mut [&mut owner, &mut bob], now);

    assert!(matches!(
        bob.update_track(&"t1".into(), common::patch(json!({ "volume": 0.1 }))),
        EditOutcome::Locked(ref c) if c.holder.as_str() == "owner"
    ));
    assert!(matches!(bob.delete_track(&"t1".into()), EditOutcome::Locked(_)));
    assert!(matches!(
        bob.add_region(arrange_types::Region::new("region-1", "t2", 0.0, 1.0)),
        EditOutcome::Locked(_)
    ));
    common::pump(&mut [&mut owner, &mut bob], now);

    for peer in [&owner, &bob] {
        let state = peer.store().state();
        assert_eq!(state.track(&"t1".into()).unwrap().volume, 0.8);
        assert_eq!(state.region(&"region-1".into()).unwrap().track_id.as_str(), "t1");
    }
}

#[test]
fn test_notes_lock_with_their_region() {
    let hub = MemoryHub::new();
    let mut owner = common::peer(&hub, "owner", PeerRole::Owner);
    let mut alice = common::peer(&hub, "alice", PeerRole::Member);
    let now = Instant::now();

    assert!(owner.acquire_lock(&region_lock()).is_granted());
    common::pump(&mut [&mut owner, &mut alice], now);

    let outcome = alice.update_note(
        &"region-1".into(),
        &"n1".into(),
        common::patch(json!({ "pitch": 38 })),
        now,
    );
    assert!(matches!(outcome, EditOutcome::Locked(_)));
    assert_eq!(alice.pending(StreamKind::NoteDrag), 0);
    let note = &alice.store().state().region(&"region-1".into()).unwrap().notes[0];
    assert_eq!(note.pitch, 36);
}

#[test]
fn test_gesture_streams_under_lock() {
    let hub = MemoryHub::new();
    let mut owner = common::peer(&hub, "owner", PeerRole::Owner);
    let mut alice = common::peer(&hub, "alice", PeerRole::Member);
    let t0 = Instant::now();

    {
        let mut gesture = alice
            .begin_gesture(StreamKind::RegionDrag, region_lock())
            .unwrap();
        for start in [0.5, 1.0, 1.5] {
            let updates = common::patch(json!({ "start": start }));
            let _ = gesture.drag_region(&"region-1".into(), updates, t0);
        }
        assert_eq!(gesture.finish(), 1);
    }
    common::pump(&mut [&mut owner, &mut alice], t0);

    assert_eq!(owner.store().state().region(&"region-1".into()).unwrap().start, 1.5);
    assert_eq!(owner.lock_status(&region_lock()), LockStatus::Unlocked);
}
