use std::hash::Hash;
use std::time::Instant;

use log::warn;
use serde_json::Value;

use arrange_types::{
    to_patch, Effect, NoteId, Patch, RecordingPreview, RegionId, TrackId,
};

use crate::config::ThrottleConfig;
use crate::protocol::{ArrangeMessage, RegionPatch};
use crate::stream::{FeedStream, StreamKind};

/// Where a committed edit goes.
pub(super) enum Outbound {
    Now(ArrangeMessage),
    Feed(Feed, Instant),
}

/// A partial update for one of the realtime streams.
pub(super) enum Feed {
    RegionDrag(RegionId, Patch),
    Note(RegionId, NoteId, Patch),
    TrackProperty(TrackId, Patch),
    EffectChain(TrackId, Vec<Effect>),
    SynthParams(TrackId, Patch),
    RecordingPreview(RecordingPreview),
}

pub(super) struct Streams {
    region_drag: FeedStream<RegionId>,
    note_drag: FeedStream<(RegionId, NoteId)>,
    track_property: FeedStream<TrackId>,
    effect_chain: FeedStream<TrackId>,
    synth_params: FeedStream<TrackId>,
    recording_preview: FeedStream<TrackId>,
}

impl Streams {
    pub(super) fn new(config: &ThrottleConfig) -> Self {
        Self {
            region_drag: FeedStream::new(StreamKind::RegionDrag, config.region_drag),
            note_drag: FeedStream::new(StreamKind::NoteDrag, config.note_drag),
            track_property: FeedStream::new(StreamKind::TrackProperty, config.track_property),
            effect_chain: FeedStream::new(StreamKind::EffectChain, config.effect_chain),
            synth_params: FeedStream::new(StreamKind::SynthParams, config.synth_params),
            recording_preview: FeedStream::new(
                StreamKind::RecordingPreview,
                config.recording_preview,
            ),
        }
    }

    pub(super) fn push(&mut self, feed: Feed, now: Instant) {
        match feed {
            Feed::RegionDrag(region_id, updates) => self.region_drag.push(region_id, updates, now),
            Feed::Note(region_id, note_id, updates) => {
                self.note_drag.push((region_id, note_id), updates, now)
            }
            Feed::TrackProperty(track_id, updates) => {
                self.track_property.push(track_id, updates, now)
            }
            Feed::EffectChain(track_id, effects) => {
                let mut patch = Patch::new();
                match serde_json::to_value(&effects) {
                    Ok(value) => {
                        patch.insert("effects".into(), value);
                    }
                    Err(e) => warn!("effect chain for {} not serializable: {}", track_id, e),
                }
                self.effect_chain.push(track_id, patch, now)
            }
            Feed::SynthParams(track_id, params) => self.synth_params.push(track_id, params, now),
            Feed::RecordingPreview(preview) => {
                let track_id = preview.track_id.clone();
                self.recording_preview.push(track_id, to_patch(&preview), now)
            }
        }
    }

    pub(super) fn cancel(&mut self, kind: StreamKind) {
        match kind {
            StreamKind::RegionDrag => self.region_drag.cancel(),
            StreamKind::NoteDrag => self.note_drag.cancel(),
            StreamKind::TrackProperty => self.track_property.cancel(),
            StreamKind::EffectChain => self.effect_chain.cancel(),
            StreamKind::SynthParams => self.synth_params.cancel(),
            StreamKind::RecordingPreview => self.recording_preview.cancel(),
        }
    }

    pub(super) fn pending(&self, kind: StreamKind) -> usize {
        match kind {
            StreamKind::RegionDrag => self.region_drag.pending().len(),
            StreamKind::NoteDrag => self.note_drag.pending().len(),
            StreamKind::TrackProperty => self.track_property.pending().len(),
            StreamKind::EffectChain => self.effect_chain.pending().len(),
            StreamKind::SynthParams => self.synth_params.pending().len(),
            StreamKind::RecordingPreview => self.recording_preview.pending().len(),
        }
    }

    pub(super) fn next_deadline(&self) -> Option<Instant> {
        [
            self.region_drag.timer().due(),
            self.note_drag.timer().due(),
            self.track_property.timer().due(),
            self.effect_chain.timer().due(),
            self.synth_params.timer().due(),
            self.recording_preview.timer().due(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Drop pending updates for a region that no longer exists.
    pub(super) fn forget_region(&mut self, region_id: &RegionId) {
        self.region_drag.discard(region_id);
    }

    /// Drop pending updates for a track that no longer exists.
    pub(super) fn forget_track(&mut self, track_id: &TrackId) {
        self.track_property.discard(track_id);
        self.effect_chain.discard(track_id);
        self.synth_params.discard(track_id);
        self.recording_preview.discard(track_id);
    }

    /// Drop a pending effect chain; peers already hold the current one.
    pub(super) fn forget_effect_chain(&mut self, track_id: &TrackId) {
        self.effect_chain.discard(track_id);
    }

    pub(super) fn forget_note(&mut self, region_id: &RegionId, note_id: &NoteId) {
        self.note_drag.discard(&(region_id.clone(), note_id.clone()));
    }

    pub(super) fn forget_preview(&mut self, track_id: &TrackId) {
        self.recording_preview.discard(track_id);
    }

    /// Take one stream's window as outbound messages. With `due` the window is
    /// only taken if the stream's deadline has passed; without, immediately.
    pub(super) fn take(&mut self, kind: StreamKind, due: Option<Instant>) -> Vec<ArrangeMessage> {
        match kind {
            StreamKind::RegionDrag => {
                let mut window = window(&mut self.region_drag, due);
                if window.len() == 1 {
                    let (region_id, updates) = window.remove(0);
                    vec![ArrangeMessage::RegionDrag { region_id, updates }]
                } else if window.is_empty() {
                    Vec::new()
                } else {
                    let regions = window
                        .into_iter()
                        .map(|(region_id, updates)| RegionPatch { region_id, updates })
                        .collect();
                    vec![ArrangeMessage::RegionDragBatch { regions }]
                }
            }
            StreamKind::NoteDrag => window(&mut self.note_drag, due)
                .into_iter()
                .map(|((region_id, note_id), updates)| ArrangeMessage::NoteUpdate {
                    region_id,
                    note_id,
                    updates,
                })
                .collect(),
            StreamKind::TrackProperty => window(&mut self.track_property, due)
                .into_iter()
                .map(|(track_id, updates)| ArrangeMessage::TrackUpdate { track_id, updates })
                .collect(),
            StreamKind::EffectChain => window(&mut self.effect_chain, due)
                .into_iter()
                .filter_map(|(track_id, mut patch)| {
                    let value = patch.remove("effects").unwrap_or(Value::Null);
                    match serde_json::from_value::<Vec<Effect>>(value) {
                        Ok(effects) => {
                            Some(ArrangeMessage::EffectChainUpdate { track_id, effects })
                        }
                        Err(e) => {
                            warn!("discarding effect chain for {}: {}", track_id, e);
                            None
                        }
                    }
                })
                .collect(),
            StreamKind::SynthParams => window(&mut self.synth_params, due)
                .into_iter()
                .map(|(track_id, params)| ArrangeMessage::SynthParamsUpdate { track_id, params })
                .collect(),
            StreamKind::RecordingPreview => window(&mut self.recording_preview, due)
                .into_iter()
                .filter_map(|(track_id, patch)| {
                    match serde_json::from_value::<RecordingPreview>(Value::Object(patch)) {
                        Ok(preview) => Some(ArrangeMessage::RecordingPreview { preview }),
                        Err(e) => {
                            warn!("discarding recording preview for {}: {}", track_id, e);
                            None
                        }
                    }
                })
                .collect(),
        }
    }
}

fn window<K: Eq + Hash + Clone>(
    stream: &mut FeedStream<K>,
    due: Option<Instant>,
) -> Vec<(K, Patch)> {
    let mut taken = Vec::new();
    match due {
        Some(now) => stream.poll(now, |w| taken = w),
        None => stream.flush(|w| taken = w),
    };
    taken
}
