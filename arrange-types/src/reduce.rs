//! Pure state reducer for [`Mutation`]s.
//!
//! The reducer is the single place where project state changes. It returns
//! `true` when the mutation was applicable (its target exists and its values
//! are well-formed), `false` when it was dropped.

use crate::patch::apply_patch;
use crate::{Mutation, ProjectState, MAX_BPM, MIN_BPM};

/// Identity fields that a patch may never overwrite.
const PROTECTED: &[&str] = &["id"];

pub fn reduce(mutation: &Mutation, state: &mut ProjectState) -> bool {
    match mutation {
        Mutation::AddTrack(track) => {
            if track.id.is_empty() {
                return false;
            }
            match state.track_mut(&track.id) {
                Some(existing) => *existing = track.clone(),
                None => state.tracks.push(track.clone()),
            }
            true
        }
        Mutation::UpdateTrack { track_id, updates } => {
            let Some(track) = state.track_mut(track_id) else {
                return false;
            };
            match apply_patch(track, updates, PROTECTED) {
                Some(mut updated) => {
                    // Decoded buffers do not survive the JSON round trip.
                    restore_sample_buffers(&track.instrument, &mut updated.instrument);
                    *track = updated;
                    true
                }
                None => false,
            }
        }
        Mutation::DeleteTrack(track_id) => state.remove_track(track_id),
        Mutation::ReorderTracks(order) => {
            state.reorder_tracks(order);
            true
        }
        Mutation::ChangeInstrument {
            track_id,
            instrument,
        } => match state.track_mut(track_id) {
            Some(track) => {
                track.instrument = instrument.clone();
                true
            }
            None => false,
        },
        Mutation::AddRegion(region) => {
            if region.id.is_empty() {
                return false;
            }
            match state.region_mut(&region.id) {
                Some(existing) => *existing = region.clone(),
                None => state.regions.push(region.clone()),
            }
            true
        }
        Mutation::UpdateRegion { region_id, updates } => {
            let Some(region) = state.region_mut(region_id) else {
                return false;
            };
            match apply_patch(region, updates, PROTECTED) {
                Some(mut updated) => {
                    if let (Some(old), Some(new)) = (&region.audio, &mut updated.audio) {
                        if old.source_id == new.source_id {
                            new.buffer = old.buffer.clone();
                        }
                    }
                    *region = updated;
                    true
                }
                None => false,
            }
        }
        Mutation::DeleteRegion(region_id) => state.remove_region(region_id),
        Mutation::AddNote { region_id, note } => {
            if note.id.is_empty() {
                return false;
            }
            match state.region_mut(region_id) {
                Some(region) => {
                    region.upsert_note(note.clone());
                    true
                }
                None => false,
            }
        }
        Mutation::UpdateNote {
            region_id,
            note_id,
            updates,
        } => {
            let Some(region) = state.region_mut(region_id) else {
                return false;
            };
            let Some(note) = region.note(note_id) else {
                return false;
            };
            match apply_patch(note, updates, PROTECTED) {
                Some(updated) => {
                    region.upsert_note(updated);
                    true
                }
                None => false,
            }
        }
        Mutation::DeleteNote { region_id, note_id } => match state.region_mut(region_id) {
            Some(region) => region.remove_note(note_id),
            None => false,
        },
        Mutation::SetBpm(bpm) => {
            if !bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(bpm) {
                return false;
            }
            state.bpm = *bpm;
            true
        }
        Mutation::SetTimeSignature(ts) => {
            if !ts.is_valid() {
                return false;
            }
            state.time_signature = *ts;
            true
        }
        Mutation::UpdateSynthParams { track_id, params } => match state.track_mut(track_id) {
            Some(track) => {
                for (name, value) in params {
                    if value.is_finite() {
                        track.synth_params.insert(name.clone(), *value);
                    }
                }
                true
            }
            None => false,
        },
        Mutation::SetEffectChain { track_id, effects } => match state.track_mut(track_id) {
            Some(track) => {
                track.effects = effects.clone();
                true
            }
            None => false,
        },
    }
}

fn restore_sample_buffers(old: &crate::Instrument, new: &mut crate::Instrument) {
    for slot in &mut new.samples {
        if let Some(previous) = old.samples.iter().find(|s| s.source_id == slot.source_id) {
            slot.buffer = previous.buffer.clone();
        }
    }
}
