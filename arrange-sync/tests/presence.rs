mod common;

use std::time::{Duration, Instant};

use arrange_sync::{MemoryHub, PeerRole, StateStore, StreamKind, SyncEvent};
use arrange_types::{RecordingPreview, Selection, UserId};

#[test]
fn test_selection_is_tracked_per_user() {
    let hub = MemoryHub::new();
    let mut alice = common::peer(&hub, "alice", PeerRole::Owner);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let now = Instant::now();

    let selection = Selection {
        region_ids: vec!["region-1".into()],
        ..Selection::default()
    };
    alice.change_selection(selection.clone());
    common::pump(&mut [&mut alice, &mut bob], now);
    assert_eq!(bob.selections().get(&UserId::new("alice")), Some(&selection));

    alice.change_selection(Selection::default());
    common::pump(&mut [&mut alice, &mut bob], now);
    assert!(bob.selections().is_empty());

    // Presence never touches the project.
    assert_eq!(bob.store().state(), &common::base_project());
}

#[test]
fn test_recording_preview_streams_and_ends() {
    let hub = MemoryHub::new();
    let mut alice = common::peer(&hub, "alice", PeerRole::Owner);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let t0 = Instant::now();

    for length in [0.5, 1.0, 1.5] {
        alice.publish_recording_preview(
            RecordingPreview {
                track_id: "t1".into(),
                start: 0.0,
                length,
                peaks: vec![0.25; 4],
            },
            t0,
        );
    }
    assert_eq!(alice.pending(StreamKind::RecordingPreview), 1);
    common::pump(&mut [&mut alice, &mut bob], t0 + Duration::from_millis(200));

    let preview = bob.previews().get(&UserId::new("alice")).unwrap();
    assert_eq!(preview.length, 1.5);

    alice.end_recording_preview(&"t1".into());
    common::pump(&mut [&mut alice, &mut bob], t0 + Duration::from_millis(400));
    assert!(bob.previews().is_empty());
}

#[test]
fn test_departure_clears_presence() {
    let hub = MemoryHub::new();
    let mut alice = common::peer(&hub, "alice", PeerRole::Owner);
    let mut bob = common::peer(&hub, "bob", PeerRole::Member);
    let now = Instant::now();

    alice.change_selection(Selection {
        track_ids: vec!["t1".into()],
        ..Selection::default()
    });
    common::pump(&mut [&mut alice, &mut bob], now);
    assert_eq!(bob.selections().len(), 1);

    hub.leave(&UserId::new("alice"));
    bob.tick(now);
    assert!(bob.selections().is_empty());
    assert!(bob
        .drain_events()
        .contains(&SyncEvent::UserLeft("alice".into())));
}
