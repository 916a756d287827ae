//! Local edit entry points.
//!
//! Every public edit first consults the lock table and refuses to touch
//! anything another user holds. The `edit_*` functions below the public ones
//! do the actual commit; remote application reuses them under the sync gate.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value;

use arrange_types::{
    Effect, Instrument, Mutation, Note, NoteId, Patch, RecordingPreview, Region, RegionId,
    Selection, TimeSignature, Track, TrackId,
};

use super::outbound::{Feed, Outbound};
use super::{EditOutcome, LockConflict, SyncDispatcher};
use crate::lock_id::LockTarget;
use crate::locks::LockStatus;
use crate::protocol::ArrangeMessage;
use crate::sanitize::{sanitize_instrument, Sanitize};
use crate::store::StateStore;
use crate::transport::Transport;

impl<T: Transport, S: StateStore> SyncDispatcher<T, S> {
    pub fn add_track(&mut self, track: Track) -> EditOutcome {
        self.edit_add_track(track).into()
    }

    /// Discrete track update (rename, mute, ...). Each updated field is also
    /// checked against its track-property lock.
    pub fn update_track(&mut self, track_id: &TrackId, updates: Patch) -> EditOutcome {
        let mut targets = vec![LockTarget::Track(track_id.clone())];
        targets.extend(updates.keys().map(|property| LockTarget::TrackProperty {
            track_id: track_id.clone(),
            property: property.clone(),
        }));
        if let Some(locked) = self.blocked_by(&targets) {
            return locked;
        }
        if updates.is_empty() {
            return EditOutcome::Unchanged;
        }
        self.edit_update_track(track_id.clone(), updates).into()
    }

    /// Continuous track property change (fader, pan knob), sent on the
    /// track-property stream.
    pub fn stream_track_property(
        &mut self,
        track_id: &TrackId,
        property: &str,
        value: Value,
        now: Instant,
    ) -> EditOutcome {
        let targets = [
            LockTarget::Track(track_id.clone()),
            LockTarget::TrackProperty {
                track_id: track_id.clone(),
                property: property.to_string(),
            },
        ];
        if let Some(locked) = self.blocked_by(&targets) {
            return locked;
        }
        let mut updates = Patch::new();
        updates.insert(property.to_string(), value);
        let mutation = Mutation::UpdateTrack {
            track_id: track_id.clone(),
            updates: updates.clone(),
        };
        self.commit(
            mutation,
            Outbound::Feed(Feed::TrackProperty(track_id.clone(), updates), now),
        )
        .into()
    }

    /// Deletes the track's regions too, so their locks count.
    pub fn delete_track(&mut self, track_id: &TrackId) -> EditOutcome {
        let mut targets = vec![LockTarget::Track(track_id.clone())];
        targets.extend(
            self.store
                .state()
                .regions_for_track(track_id)
                .into_iter()
                .map(|region| LockTarget::Region(region.id.clone())),
        );
        if let Some(locked) = self.blocked_by(&targets) {
            return locked;
        }
        self.edit_delete_track(track_id.clone()).into()
    }

    pub fn reorder_tracks(&mut self, order: Vec<TrackId>) -> EditOutcome {
        if order == self.store.state().track_order() {
            return EditOutcome::Unchanged;
        }
        self.edit_reorder_tracks(order).into()
    }

    pub fn change_instrument(
        &mut self,
        track_id: &TrackId,
        instrument: Instrument,
    ) -> EditOutcome {
        let targets = [
            LockTarget::Track(track_id.clone()),
            LockTarget::TrackProperty {
                track_id: track_id.clone(),
                property: "instrument".to_string(),
            },
        ];
        if let Some(locked) = self.blocked_by(&targets) {
            return locked;
        }
        self.edit_change_instrument(track_id.clone(), instrument).into()
    }

    /// Adding under an existing id replaces that region, so its lock counts.
    pub fn add_region(&mut self, region: Region) -> EditOutcome {
        if self.store.state().region(&region.id).is_some() {
            if let Some(locked) = self.blocked_by(&[LockTarget::Region(region.id.clone())]) {
                return locked;
            }
        }
        self.edit_add_region(region).into()
    }

    pub fn update_region(&mut self, region_id: &RegionId, updates: Patch) -> EditOutcome {
        if let Some(locked) = self.blocked_by(&[LockTarget::Region(region_id.clone())]) {
            return locked;
        }
        if updates.is_empty() {
            return EditOutcome::Unchanged;
        }
        self.edit_update_region(region_id.clone(), updates).into()
    }

    /// One frame of a region drag or resize.
    pub fn drag_region(
        &mut self,
        region_id: &RegionId,
        updates: Patch,
        now: Instant,
    ) -> EditOutcome {
        if let Some(locked) = self.blocked_by(&[LockTarget::Region(region_id.clone())]) {
            return locked;
        }
        if updates.is_empty() {
            return EditOutcome::Unchanged;
        }
        self.edit_drag_region(region_id.clone(), updates, now).into()
    }

    pub fn delete_region(&mut self, region_id: &RegionId) -> EditOutcome {
        if let Some(locked) = self.blocked_by(&[LockTarget::Region(region_id.clone())]) {
            return locked;
        }
        self.edit_delete_region(region_id.clone()).into()
    }

    pub fn add_note(&mut self, region_id: &RegionId, note: Note) -> EditOutcome {
        let target = LockTarget::Note {
            region_id: region_id.clone(),
            note_id: note.id.clone(),
        };
        if let Some(locked) = self.blocked_by(&[target]) {
            return locked;
        }
        self.edit_add_note(region_id.clone(), note).into()
    }

    /// Note move/resize/velocity, sent on the note stream.
    pub fn update_note(
        &mut self,
        region_id: &RegionId,
        note_id: &NoteId,
        updates: Patch,
        now: Instant,
    ) -> EditOutcome {
        let target = LockTarget::Note {
            region_id: region_id.clone(),
            note_id: note_id.clone(),
        };
        if let Some(locked) = self.blocked_by(&[target]) {
            return locked;
        }
        if updates.is_empty() {
            return EditOutcome::Unchanged;
        }
        self.edit_update_note(region_id.clone(), note_id.clone(), updates, now)
            .into()
    }

    pub fn delete_note(&mut self, region_id: &RegionId, note_id: &NoteId) -> EditOutcome {
        let target = LockTarget::Note {
            region_id: region_id.clone(),
            note_id: note_id.clone(),
        };
        if let Some(locked) = self.blocked_by(&[target]) {
            return locked;
        }
        self.edit_delete_note(region_id.clone(), note_id.clone()).into()
    }

    pub fn set_bpm(&mut self, bpm: f64) -> EditOutcome {
        if self.store.state().bpm == bpm {
            return EditOutcome::Unchanged;
        }
        self.edit_set_bpm(bpm).into()
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) -> EditOutcome {
        if self.store.state().time_signature == time_signature {
            return EditOutcome::Unchanged;
        }
        self.edit_set_time_signature(time_signature).into()
    }

    pub fn update_synth_params(
        &mut self,
        track_id: &TrackId,
        params: BTreeMap<String, f64>,
        now: Instant,
    ) -> EditOutcome {
        let mut targets = vec![LockTarget::Track(track_id.clone())];
        targets.extend(params.keys().map(|param| LockTarget::SynthParam {
            track_id: track_id.clone(),
            param: param.clone(),
        }));
        if let Some(locked) = self.blocked_by(&targets) {
            return locked;
        }
        if params.is_empty() {
            return EditOutcome::Unchanged;
        }
        self.edit_synth_params(track_id.clone(), params, now).into()
    }

    /// Replace a track's effect chain. A chain equal to the current one is a
    /// no-op; a chain equal to the last one sent or received for the track is
    /// applied but not sent again.
    pub fn update_effect_chain(
        &mut self,
        track_id: &TrackId,
        effects: Vec<Effect>,
        now: Instant,
    ) -> EditOutcome {
        let targets = [
            LockTarget::Track(track_id.clone()),
            LockTarget::TrackProperty {
                track_id: track_id.clone(),
                property: "effects".to_string(),
            },
        ];
        if let Some(locked) = self.blocked_by(&targets) {
            return locked;
        }
        let current = self.store.state().track(track_id).map(|t| &t.effects);
        if current == Some(&effects) {
            return EditOutcome::Unchanged;
        }
        if self.effect_memory.get(track_id) == Some(&effects) {
            log::debug!("effect chain for {} back to last sent, not sending", track_id);
            self.streams.forget_effect_chain(track_id);
            let mutation = Mutation::SetEffectChain {
                track_id: track_id.clone(),
                effects,
            };
            return self.store.apply(&mutation).into();
        }
        self.edit_effect_chain(track_id.clone(), effects, now).into()
    }

    /// Live waveform of an in-progress recording. Not part of the project.
    pub fn publish_recording_preview(&mut self, preview: RecordingPreview, now: Instant) {
        self.publish(Outbound::Feed(Feed::RecordingPreview(preview), now));
    }

    pub fn end_recording_preview(&mut self, track_id: &TrackId) {
        self.streams.forget_preview(track_id);
        self.publish(Outbound::Now(ArrangeMessage::RecordingPreviewEnd {
            track_id: track_id.clone(),
        }));
    }

    pub fn change_selection(&mut self, selection: Selection) {
        self.publish(Outbound::Now(ArrangeMessage::SelectionChange { selection }));
    }

    /// Ask the room for a full snapshot.
    pub fn request_state(&mut self) {
        self.send_now(ArrangeMessage::StateRequest);
    }

    /// First lock among `targets` held by another user, as an outcome.
    fn blocked_by(&self, targets: &[LockTarget]) -> Option<EditOutcome> {
        targets.iter().find_map(|target| {
            let lock_id = target.lock_id();
            match self.locks.status(&lock_id, &self.local_user) {
                LockStatus::LockedByOther(holder) => {
                    log::debug!("{} is locked by {}", lock_id, holder);
                    Some(EditOutcome::Locked(LockConflict { lock_id, holder }))
                }
                LockStatus::Unlocked | LockStatus::LockedByMe => None,
            }
        })
    }

    pub(super) fn edit_add_track(&mut self, track: Track) -> bool {
        let message = ArrangeMessage::TrackAdd {
            track: track.sanitize(),
        };
        self.commit(Mutation::AddTrack(track), Outbound::Now(message))
    }

    pub(super) fn edit_update_track(&mut self, track_id: TrackId, updates: Patch) -> bool {
        let message = ArrangeMessage::TrackUpdate {
            track_id: track_id.clone(),
            updates: updates.clone(),
        };
        self.commit(
            Mutation::UpdateTrack { track_id, updates },
            Outbound::Now(message),
        )
    }

    pub(super) fn edit_delete_track(&mut self, track_id: TrackId) -> bool {
        self.streams.forget_track(&track_id);
        for region in self.store.state().regions_for_track(&track_id) {
            self.streams.forget_region(&region.id);
            for note in &region.notes {
                self.streams.forget_note(&region.id, &note.id);
            }
        }
        self.effect_memory.remove(&track_id);
        let message = ArrangeMessage::TrackDelete {
            track_id: track_id.clone(),
        };
        self.commit(Mutation::DeleteTrack(track_id), Outbound::Now(message))
    }

    pub(super) fn edit_reorder_tracks(&mut self, order: Vec<TrackId>) -> bool {
        let message = ArrangeMessage::TrackReorder {
            track_ids: order.clone(),
        };
        self.commit(Mutation::ReorderTracks(order), Outbound::Now(message))
    }

    pub(super) fn edit_change_instrument(
        &mut self,
        track_id: TrackId,
        instrument: Instrument,
    ) -> bool {
        let message = ArrangeMessage::TrackInstrumentChange {
            track_id: track_id.clone(),
            instrument: sanitize_instrument(&track_id, &instrument),
        };
        self.commit(
            Mutation::ChangeInstrument {
                track_id,
                instrument,
            },
            Outbound::Now(message),
        )
    }

    pub(super) fn edit_add_region(&mut self, region: Region) -> bool {
        let message = ArrangeMessage::RegionAdd {
            region: region.sanitize(),
        };
        self.commit(Mutation::AddRegion(region), Outbound::Now(message))
    }

    pub(super) fn edit_update_region(&mut self, region_id: RegionId, updates: Patch) -> bool {
        let message = ArrangeMessage::RegionUpdate {
            region_id: region_id.clone(),
            updates: updates.clone(),
        };
        self.commit(
            Mutation::UpdateRegion { region_id, updates },
            Outbound::Now(message),
        )
    }

    pub(super) fn edit_drag_region(
        &mut self,
        region_id: RegionId,
        updates: Patch,
        now: Instant,
    ) -> bool {
        let feed = Feed::RegionDrag(region_id.clone(), updates.clone());
        self.commit(
            Mutation::UpdateRegion { region_id, updates },
            Outbound::Feed(feed, now),
        )
    }

    pub(super) fn edit_delete_region(&mut self, region_id: RegionId) -> bool {
        self.streams.forget_region(&region_id);
        if let Some(region) = self.store.state().region(&region_id) {
            for note in &region.notes {
                self.streams.forget_note(&region_id, &note.id);
            }
        }
        let message = ArrangeMessage::RegionDelete {
            region_id: region_id.clone(),
        };
        self.commit(Mutation::DeleteRegion(region_id), Outbound::Now(message))
    }

    pub(super) fn edit_add_note(&mut self, region_id: RegionId, note: Note) -> bool {
        let message = ArrangeMessage::NoteAdd {
            region_id: region_id.clone(),
            note: note.clone(),
        };
        self.commit(Mutation::AddNote { region_id, note }, Outbound::Now(message))
    }

    pub(super) fn edit_update_note(
        &mut self,
        region_id: RegionId,
        note_id: NoteId,
        updates: Patch,
        now: Instant,
    ) -> bool {
        let feed = Feed::Note(region_id.clone(), note_id.clone(), updates.clone());
        self.commit(
            Mutation::UpdateNote {
                region_id,
                note_id,
                updates,
            },
            Outbound::Feed(feed, now),
        )
    }

    pub(super) fn edit_delete_note(&mut self, region_id: RegionId, note_id: NoteId) -> bool {
        self.streams.forget_note(&region_id, &note_id);
        let message = ArrangeMessage::NoteDelete {
            region_id: region_id.clone(),
            note_id: note_id.clone(),
        };
        self.commit(
            Mutation::DeleteNote { region_id, note_id },
            Outbound::Now(message),
        )
    }

    pub(super) fn edit_set_bpm(&mut self, bpm: f64) -> bool {
        self.commit(
            Mutation::SetBpm(bpm),
            Outbound::Now(ArrangeMessage::BpmChange { bpm }),
        )
    }

    pub(super) fn edit_set_time_signature(&mut self, time_signature: TimeSignature) -> bool {
        let message = ArrangeMessage::TimeSignatureChange {
            numerator: time_signature.numerator,
            denominator: time_signature.denominator,
        };
        self.commit(Mutation::SetTimeSignature(time_signature), Outbound::Now(message))
    }

    pub(super) fn edit_synth_params(
        &mut self,
        track_id: TrackId,
        params: BTreeMap<String, f64>,
        now: Instant,
    ) -> bool {
        let patch: Patch = params
            .iter()
            .filter_map(|(name, value)| {
                serde_json::Number::from_f64(*value).map(|n| (name.clone(), Value::Number(n)))
            })
            .collect();
        let feed = Feed::SynthParams(track_id.clone(), patch);
        self.commit(
            Mutation::UpdateSynthParams { track_id, params },
            Outbound::Feed(feed, now),
        )
    }

    pub(super) fn edit_effect_chain(
        &mut self,
        track_id: TrackId,
        effects: Vec<Effect>,
        now: Instant,
    ) -> bool {
        let feed = Feed::EffectChain(track_id.clone(), effects.clone());
        self.commit(
            Mutation::SetEffectChain { track_id, effects },
            Outbound::Feed(feed, now),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::dispatcher::PeerRole;
    use crate::locks::{LockKind, LockRecord};
    use crate::protocol::Envelope;
    use crate::store::MemoryStore;
    use crate::transport::TransportError;
    use arrange_types::ProjectState;
    use serde_json::json;
    use std::time::Duration;

    /// Records everything sent.
    #[derive(Default)]
    struct Recorder {
        sent: Vec<Envelope>,
        fail: bool,
    }

    impl Transport for Recorder {
        fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Disconnected);
            }
            self.sent.push(envelope.clone());
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<crate::transport::TransportEvent> {
            Vec::new()
        }
    }

    fn patch(v: Value) -> Patch {
        v.as_object().cloned().unwrap()
    }

    fn dispatcher() -> SyncDispatcher<Recorder, MemoryStore> {
        let mut state = ProjectState::new();
        state.tracks.push(Track::new("t1", "Bass"));
        let mut region = Region::new("region-1", "t1", 0.0, 4.0);
        region.notes.push(Note::new("n1", 36, 0.0, 1.0));
        state.regions.push(region);
        SyncDispatcher::new(
            "room-1".into(),
            "userA".into(),
            PeerRole::Member,
            Recorder::default(),
            MemoryStore::new(state),
            &SyncConfig::default(),
        )
    }

    fn sent_names(d: &SyncDispatcher<Recorder, MemoryStore>) -> Vec<&'static str> {
        d.transport().sent.iter().map(|e| e.message.name()).collect()
    }

    fn lock_for_other(d: &mut SyncDispatcher<Recorder, MemoryStore>, target: LockTarget) {
        d.locks.insert(LockRecord {
            lock_id: target.lock_id(),
            holder_user_id: "userB".into(),
            kind: target.kind(),
            acquired_at: crate::locks::now_millis(),
        });
    }

    #[test]
    fn discrete_edit_is_sent_immediately() {
        let mut d = dispatcher();
        assert!(d.add_note(&"region-1".into(), Note::new("n2", 40, 1.0, 1.0)).is_applied());
        assert_eq!(sent_names(&d), vec!["note_add"]);
        assert_eq!(d.transport().sent[0].sender_user_id.as_str(), "userA");
        assert_eq!(d.transport().sent[0].room_id.as_str(), "room-1");
    }

    #[test]
    fn drag_frames_coalesce_until_interval() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        for start in 0..3 {
            let updates = patch(json!({"start": start as f64}));
            assert!(d.drag_region(&"region-1".into(), updates, t0).is_applied());
        }
        assert!(d.transport().sent.is_empty());
        assert_eq!(d.store().state().regions[0].start, 2.0);

        d.flush_due(t0 + Duration::from_millis(200));
        assert_eq!(sent_names(&d), vec!["region_drag"]);
        match &d.transport().sent[0].message {
            ArrangeMessage::RegionDrag { updates, .. } => assert_eq!(updates["start"], 2.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn locked_by_other_short_circuits() {
        let mut d = dispatcher();
        lock_for_other(&mut d, LockTarget::Region("region-1".into()));
        let before = d.store().state().clone();

        let outcome = d.update_note(
            &"region-1".into(),
            &"n1".into(),
            patch(json!({"pitch": 37})),
            Instant::now(),
        );
        match outcome {
            EditOutcome::Locked(conflict) => assert_eq!(conflict.holder.as_str(), "userB"),
            other => panic!("expected locked, got {:?}", other),
        }
        assert!(matches!(d.delete_region(&"region-1".into()), EditOutcome::Locked(_)));
        assert_eq!(d.store().state(), &before);
        assert_eq!(d.pending(crate::stream::StreamKind::NoteDrag), 0);
        assert!(d.transport().sent.is_empty());
    }

    #[test]
    fn synth_param_lock_blocks_only_that_param() {
        let mut d = dispatcher();
        lock_for_other(
            &mut d,
            LockTarget::SynthParam {
                track_id: "t1".into(),
                param: "cutoff".into(),
            },
        );
        let mut blocked = BTreeMap::new();
        blocked.insert("cutoff".to_string(), 0.1);
        assert!(matches!(
            d.update_synth_params(&"t1".into(), blocked, Instant::now()),
            EditOutcome::Locked(_)
        ));
        let mut free = BTreeMap::new();
        free.insert("attack".to_string(), 0.01);
        assert!(d.update_synth_params(&"t1".into(), free, Instant::now()).is_applied());
    }

    #[test]
    fn identical_effect_chain_is_not_resent() {
        let mut d = dispatcher();
        let chain = vec![Effect::new("fx1", "delay").with_param("time", 0.25)];
        let t0 = Instant::now();
        assert!(d.update_effect_chain(&"t1".into(), chain.clone(), t0).is_applied());
        d.flush_stream(crate::stream::StreamKind::EffectChain);
        assert_eq!(sent_names(&d), vec!["effect_chain_update"]);

        assert_eq!(d.update_effect_chain(&"t1".into(), chain, t0), EditOutcome::Unchanged);
        d.flush_stream(crate::stream::StreamKind::EffectChain);
        assert_eq!(d.transport().sent.len(), 1);
    }

    #[test]
    fn effect_chain_revert_within_window_is_not_lost() {
        let mut d = dispatcher();
        let a = vec![Effect::new("fx1", "delay").with_param("time", 0.25)];
        let mut b = a.clone();
        b[0].enabled = false;
        let t0 = Instant::now();

        assert!(d.update_effect_chain(&"t1".into(), a.clone(), t0).is_applied());
        d.flush_stream(crate::stream::StreamKind::EffectChain);

        assert!(d.update_effect_chain(&"t1".into(), b, t0).is_applied());
        assert_eq!(d.pending(crate::stream::StreamKind::EffectChain), 1);
        assert!(d.update_effect_chain(&"t1".into(), a.clone(), t0).is_applied());
        assert_eq!(d.pending(crate::stream::StreamKind::EffectChain), 0);

        d.flush_due(t0 + Duration::from_millis(200));
        assert_eq!(sent_names(&d), vec!["effect_chain_update"]);
        assert_eq!(d.store().state().track(&"t1".into()).unwrap().effects, a);
    }

    #[test]
    fn track_property_lock_blocks_discrete_updates() {
        let mut d = dispatcher();
        lock_for_other(
            &mut d,
            LockTarget::TrackProperty {
                track_id: "t1".into(),
                property: "volume".into(),
            },
        );
        lock_for_other(
            &mut d,
            LockTarget::TrackProperty {
                track_id: "t1".into(),
                property: "instrument".into(),
            },
        );

        assert!(matches!(
            d.update_track(&"t1".into(), patch(json!({"volume": 0.1}))),
            EditOutcome::Locked(_)
        ));
        assert!(matches!(
            d.change_instrument(&"t1".into(), Instrument::synth("pad")),
            EditOutcome::Locked(_)
        ));
        assert_eq!(d.store().state().track(&"t1".into()).unwrap().volume, 0.8);

        assert!(d
            .update_track(&"t1".into(), patch(json!({"name": "Sub"})))
            .is_applied());
        assert_eq!(sent_names(&d), vec!["track_update"]);
    }

    #[test]
    fn region_lock_blocks_track_delete_and_region_replace() {
        let mut d = dispatcher();
        lock_for_other(&mut d, LockTarget::Region("region-1".into()));

        assert!(matches!(d.delete_track(&"t1".into()), EditOutcome::Locked(_)));
        assert!(matches!(
            d.add_region(Region::new("region-1", "t1", 8.0, 1.0)),
            EditOutcome::Locked(_)
        ));
        let region = d.store().state().region(&"region-1".into()).unwrap();
        assert_eq!(region.start, 0.0);
        assert!(d.transport().sent.is_empty());

        assert!(d.add_region(Region::new("region-9", "t1", 8.0, 1.0)).is_applied());
    }

    #[test]
    fn deleting_region_drops_its_pending_note_frames() {
        let mut d = dispatcher();
        let now = Instant::now();
        assert!(d
            .update_note(&"region-1".into(), &"n1".into(), patch(json!({"pitch": 40})), now)
            .is_applied());
        assert_eq!(d.pending(crate::stream::StreamKind::NoteDrag), 1);

        assert!(d.delete_region(&"region-1".into()).is_applied());
        assert_eq!(d.pending(crate::stream::StreamKind::NoteDrag), 0);
    }

    #[test]
    fn deleting_track_drops_pending_note_frames_of_its_regions() {
        let mut d = dispatcher();
        let now = Instant::now();
        assert!(d
            .update_note(&"region-1".into(), &"n1".into(), patch(json!({"pitch": 40})), now)
            .is_applied());

        assert!(d.delete_track(&"t1".into()).is_applied());
        assert_eq!(d.pending(crate::stream::StreamKind::NoteDrag), 0);
        d.flush_due(now + Duration::from_millis(200));
        assert_eq!(sent_names(&d), vec!["track_delete"]);
    }

    #[test]
    fn own_locks_are_renewed_instead_of_expiring() {
        let mut d = dispatcher();
        d.lock_timeout = Some(Duration::from_secs(60));
        let target = LockTarget::Region("region-1".into());
        assert!(d.acquire_lock(&target).is_granted());

        let stale = crate::locks::now_millis().saturating_sub(120_000);
        d.locks.insert(LockRecord {
            lock_id: target.lock_id(),
            holder_user_id: "userA".into(),
            kind: target.kind(),
            acquired_at: stale,
        });
        let other = LockTarget::Track("t1".into());
        d.locks.insert(LockRecord {
            lock_id: other.lock_id(),
            holder_user_id: "userB".into(),
            kind: other.kind(),
            acquired_at: stale,
        });

        d.tick(Instant::now());

        assert_eq!(d.lock_status(&target), LockStatus::LockedByMe);
        assert_eq!(d.lock_status(&other), LockStatus::Unlocked);
        assert_eq!(sent_names(&d), vec!["lock_acquire", "lock_acquire"]);
        match &d.transport().sent[1].message {
            ArrangeMessage::LockAcquire { acquired_at, .. } => assert!(*acquired_at > stale),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn transport_failure_is_swallowed() {
        let mut d = dispatcher();
        d.transport_mut().fail = true;
        assert!(d.set_bpm(90.0).is_applied());
        assert_eq!(d.store().state().bpm, 90.0);
        assert_eq!(d.set_bpm(90.0), EditOutcome::Unchanged);
    }

    #[test]
    fn edits_under_gate_are_not_published() {
        let mut d = dispatcher();
        let gate = d.gate();
        gate.apply_remote(|| {
            assert!(d.set_bpm(100.0).is_applied());
            assert!(d
                .drag_region(&"region-1".into(), patch(json!({"start": 3.0})), Instant::now())
                .is_applied());
        });
        d.flush_stream(crate::stream::StreamKind::RegionDrag);
        assert!(d.transport().sent.is_empty());
        assert_eq!(d.store().state().bpm, 100.0);
    }

    #[test]
    fn rejected_edit_sends_nothing() {
        let mut d = dispatcher();
        assert_eq!(
            d.update_region(&"missing".into(), patch(json!({"start": 1.0}))),
            EditOutcome::Rejected
        );
        assert_eq!(d.set_bpm(-5.0), EditOutcome::Rejected);
        assert!(d.transport().sent.is_empty());
    }

    #[test]
    fn own_lock_does_not_block() {
        let mut d = dispatcher();
        let target = LockTarget::Region("region-1".into());
        assert!(d.acquire_lock(&target).is_granted());
        assert!(d
            .update_region(&"region-1".into(), patch(json!({"name": "chorus"})))
            .is_applied());
        assert_eq!(sent_names(&d), vec!["lock_acquire", "region_update"]);
        match &d.transport().sent[0].message {
            ArrangeMessage::LockAcquire { kind, .. } => assert_eq!(*kind, LockKind::Region),
            other => panic!("unexpected {:?}", other),
        }
    }
}
