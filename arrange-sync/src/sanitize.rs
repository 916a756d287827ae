//! Outbound payload sanitizing.
//!
//! Decoded audio never crosses the wire. Serialization already skips the
//! in-memory buffer; this module makes sure every clip that had one still
//! carries a stable reference (`sourceId`) the receiver can resolve on its own.

use serde::Serialize;
use serde_json::Value;

use arrange_types::{AudioClip, Instrument, ProjectState, Region, Track, TrackId};

pub trait Sanitize {
    /// Build the wire form of `self`. Never mutates the local entity and
    /// never fails; a value that cannot be serialized becomes `null`.
    fn sanitize(&self) -> Value;
}

impl Sanitize for Region {
    fn sanitize(&self) -> Value {
        let mut region = self.clone();
        if let Some(clip) = region.audio.as_mut() {
            reference_clip(clip, || format!("region:{}", self.id));
        }
        to_wire(&region)
    }
}

impl Sanitize for Track {
    fn sanitize(&self) -> Value {
        let mut track = self.clone();
        reference_samples(&self.id, &mut track.instrument);
        to_wire(&track)
    }
}

/// Wire form of an instrument that belongs to `track_id`.
pub fn sanitize_instrument(track_id: &TrackId, instrument: &Instrument) -> Value {
    let mut instrument = instrument.clone();
    reference_samples(track_id, &mut instrument);
    to_wire(&instrument)
}

impl Sanitize for ProjectState {
    fn sanitize(&self) -> Value {
        let mut value = to_wire(&ProjectHeader::from(self));
        if let Value::Object(map) = &mut value {
            map.insert(
                "tracks".into(),
                Value::Array(self.tracks.iter().map(Sanitize::sanitize).collect()),
            );
            map.insert(
                "regions".into(),
                Value::Array(self.regions.iter().map(Sanitize::sanitize).collect()),
            );
        }
        value
    }
}

/// Project fields other than the entity collections.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectHeader<'a> {
    bpm: f64,
    time_signature: &'a arrange_types::TimeSignature,
}

impl<'a> From<&'a ProjectState> for ProjectHeader<'a> {
    fn from(state: &'a ProjectState) -> Self {
        Self {
            bpm: state.bpm,
            time_signature: &state.time_signature,
        }
    }
}

fn reference_samples(track_id: &TrackId, instrument: &mut Instrument) {
    for (index, clip) in instrument.samples.iter_mut().enumerate() {
        reference_clip(clip, || format!("track:{}:sample:{}", track_id, index));
    }
}

fn reference_clip(clip: &mut AudioClip, fallback: impl FnOnce() -> String) {
    clip.buffer = None;
    if clip.source_id.is_empty() {
        clip.source_id = fallback();
    }
}

fn to_wire<T: Serialize>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("could not serialize outbound payload: {}", e);
            Value::Null
        }
    }
}
