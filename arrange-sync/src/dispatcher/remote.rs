//! Inbound message handling.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use arrange_types::{Instrument, ProjectState, Region, TimeSignature, Track, UserId};

use super::{SyncDispatcher, SyncEvent};
use crate::locks::LockRecord;
use crate::protocol::{ArrangeMessage, Envelope};
use crate::sanitize::Sanitize;
use crate::store::StateStore;
use crate::transport::Transport;

impl<T: Transport, S: StateStore> SyncDispatcher<T, S> {
    pub(super) fn handle_envelope(&mut self, envelope: Envelope, now: Instant) {
        if envelope.room_id != self.room_id {
            debug!("ignoring {} for room {}", envelope.event(), envelope.room_id);
            return;
        }
        if envelope.sender_user_id == self.local_user {
            debug!("ignoring echo of {}", envelope.event());
            return;
        }
        let Envelope {
            sender_user_id: sender,
            message,
            ..
        } = envelope;
        let event = message.name();
        if let Err(e) = message.validate() {
            self.drop_message(sender, event, e.to_string());
            return;
        }
        match self.apply_message(&sender, message, now) {
            Ok(true) => self.events.push(SyncEvent::RemoteApplied { sender, event }),
            Ok(false) => {}
            Err(reason) => self.drop_message(sender, event, reason),
        }
    }

    /// Returns whether the project changed.
    fn apply_message(
        &mut self,
        sender: &UserId,
        message: ArrangeMessage,
        now: Instant,
    ) -> Result<bool, String> {
        let applied = match message {
            ArrangeMessage::TrackAdd { track } => {
                let track: Track = decode(track, "track")?;
                self.apply_remote_edit(|d| d.edit_add_track(track))
            }
            ArrangeMessage::TrackUpdate { track_id, updates } => {
                self.apply_remote_edit(|d| d.edit_update_track(track_id, updates))
            }
            ArrangeMessage::TrackDelete { track_id } => {
                self.apply_remote_edit(|d| d.edit_delete_track(track_id))
            }
            ArrangeMessage::TrackReorder { track_ids } => {
                self.apply_remote_edit(|d| d.edit_reorder_tracks(track_ids))
            }
            ArrangeMessage::TrackInstrumentChange {
                track_id,
                instrument,
            } => {
                let instrument: Instrument = decode(instrument, "instrument")?;
                self.apply_remote_edit(|d| d.edit_change_instrument(track_id, instrument))
            }
            ArrangeMessage::RegionAdd { region } => {
                let region: Region = decode(region, "region")?;
                self.apply_remote_edit(|d| d.edit_add_region(region))
            }
            ArrangeMessage::RegionUpdate { region_id, updates } => {
                self.apply_remote_edit(|d| d.edit_update_region(region_id, updates))
            }
            ArrangeMessage::RegionDrag { region_id, updates } => {
                self.apply_remote_edit(|d| d.edit_drag_region(region_id, updates, now))
            }
            ArrangeMessage::RegionDragBatch { regions } => self.apply_remote_edit(|d| {
                regions.into_iter().fold(false, |changed, entry| {
                    d.edit_drag_region(entry.region_id, entry.updates, now) || changed
                })
            }),
            ArrangeMessage::RegionDelete { region_id } => {
                self.apply_remote_edit(|d| d.edit_delete_region(region_id))
            }
            ArrangeMessage::NoteAdd { region_id, note } => {
                self.apply_remote_edit(|d| d.edit_add_note(region_id, note))
            }
            ArrangeMessage::NoteUpdate {
                region_id,
                note_id,
                updates,
            } => self.apply_remote_edit(|d| d.edit_update_note(region_id, note_id, updates, now)),
            ArrangeMessage::NoteDelete { region_id, note_id } => {
                self.apply_remote_edit(|d| d.edit_delete_note(region_id, note_id))
            }
            ArrangeMessage::BpmChange { bpm } => self.apply_remote_edit(|d| d.edit_set_bpm(bpm)),
            ArrangeMessage::TimeSignatureChange {
                numerator,
                denominator,
            } => {
                let time_signature = TimeSignature::new(numerator, denominator);
                self.apply_remote_edit(|d| d.edit_set_time_signature(time_signature))
            }
            ArrangeMessage::SynthParamsUpdate { track_id, params } => {
                let params: BTreeMap<String, f64> = params
                    .into_iter()
                    .filter_map(|(name, value)| value.as_f64().map(|v| (name, v)))
                    .filter(|(_, v)| v.is_finite())
                    .collect();
                if params.is_empty() {
                    return Err("no numeric synth params".to_string());
                }
                self.apply_remote_edit(|d| d.edit_synth_params(track_id, params, now))
            }
            ArrangeMessage::EffectChainUpdate { track_id, effects } => {
                self.effect_memory.insert(track_id.clone(), effects.clone());
                self.apply_remote_edit(|d| d.edit_effect_chain(track_id, effects, now))
            }
            ArrangeMessage::RecordingPreview { preview } => {
                self.previews.insert(sender.clone(), preview);
                return Ok(false);
            }
            ArrangeMessage::RecordingPreviewEnd { track_id } => {
                if self
                    .previews
                    .get(sender)
                    .is_some_and(|p| p.track_id == track_id)
                {
                    self.previews.remove(sender);
                }
                return Ok(false);
            }
            ArrangeMessage::SelectionChange { selection } => {
                if selection.is_empty() {
                    self.selections.remove(sender);
                } else {
                    self.selections.insert(sender.clone(), selection);
                }
                return Ok(false);
            }
            ArrangeMessage::LockAcquire {
                element_id,
                kind,
                acquired_at,
            } => {
                self.on_lock_acquire(sender, element_id, kind, acquired_at);
                return Ok(false);
            }
            ArrangeMessage::LockRelease { element_id } => {
                self.on_lock_release(sender, element_id);
                return Ok(false);
            }
            ArrangeMessage::LockAcquired {
                element_id,
                kind,
                user_id,
                acquired_at,
            } => {
                self.on_lock_acquired(element_id, kind, user_id, acquired_at);
                return Ok(false);
            }
            ArrangeMessage::LockReleased {
                element_id,
                user_id,
            } => {
                self.on_lock_released(element_id, user_id);
                return Ok(false);
            }
            ArrangeMessage::LockConflict {
                element_id,
                holder_id,
                requester_id,
            } => {
                self.on_lock_conflict(element_id, holder_id, requester_id);
                return Ok(false);
            }
            ArrangeMessage::StateRequest => {
                self.answer_state_request(sender);
                return Ok(false);
            }
            ArrangeMessage::StateSync {
                target_user_id,
                state,
                locks,
            } => {
                if target_user_id.is_some_and(|target| target != self.local_user) {
                    return Ok(false);
                }
                self.accept_state_sync(sender, state, locks)?;
                return Ok(false);
            }
        };
        if !applied {
            debug!("remote update from {} did not apply", sender);
        }
        Ok(applied)
    }

    fn answer_state_request(&mut self, requester: &UserId) {
        if !self.answers_state_requests {
            return;
        }
        info!("sending project snapshot to {}", requester);
        let message = ArrangeMessage::StateSync {
            target_user_id: Some(requester.clone()),
            state: self.store.state().sanitize(),
            locks: self.locks.snapshot(),
        };
        self.send_now(message);
    }

    fn accept_state_sync(
        &mut self,
        sender: &UserId,
        state: Value,
        locks: Vec<LockRecord>,
    ) -> Result<(), String> {
        let state: ProjectState = decode(state, "state")?;
        info!(
            "replacing project with snapshot from {} ({} tracks, {} regions)",
            sender,
            state.tracks.len(),
            state.regions.len()
        );
        let gate = self.gate();
        gate.apply_remote(|| self.store.replace(state));
        self.locks.replace(locks);
        self.effect_memory.clear();
        for kind in crate::stream::StreamKind::ALL {
            self.streams.cancel(kind);
        }
        self.events.push(SyncEvent::StateSynced {
            from: sender.clone(),
        });
        Ok(())
    }

    fn drop_message(&mut self, sender: UserId, event: &'static str, reason: String) {
        warn!("dropping {} from {}: {}", event, sender, reason);
        self.events.push(SyncEvent::Dropped {
            sender,
            event,
            reason,
        });
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("malformed {}: {}", what, e))
}
