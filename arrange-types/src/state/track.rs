use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::effect::Effect;
use super::region::AudioClip;
use crate::TrackId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    #[default]
    Synth,
    Sampler,
    DrumPad,
    Audio,
}

/// The sound source of a track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub kind: InstrumentKind,
    #[serde(default)]
    pub preset: Option<String>,
    /// Sample slots for sampler and drum-pad instruments (pad order).
    #[serde(default)]
    pub samples: Vec<AudioClip>,
}

impl Instrument {
    pub fn synth(preset: impl Into<String>) -> Self {
        Self {
            kind: InstrumentKind::Synth,
            preset: Some(preset.into()),
            samples: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub instrument: Instrument,
    #[serde(default)]
    pub synth_params: BTreeMap<String, f64>,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

fn default_volume() -> f32 {
    0.8
}

impl Track {
    pub fn new(id: impl Into<TrackId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            volume: default_volume(),
            pan: 0.0,
            muted: false,
            solo: false,
            instrument: Instrument::default(),
            synth_params: BTreeMap::new(),
            effects: Vec::new(),
        }
    }
}
