//! Per-user ephemeral state: what a collaborator has selected and what they
//! are currently recording. Never stored in the project.

use serde::{Deserialize, Serialize};

use crate::{NoteId, RegionId, TrackId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default)]
    pub track_ids: Vec<TrackId>,
    #[serde(default)]
    pub region_ids: Vec<RegionId>,
    #[serde(default)]
    pub note_ids: Vec<NoteId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty() && self.region_ids.is_empty() && self.note_ids.is_empty()
    }
}

/// Live view of an in-progress recording on another user's machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingPreview {
    pub track_id: TrackId,
    /// Start position in beats.
    pub start: f64,
    /// Length recorded so far, in beats.
    pub length: f64,
    /// Coarse waveform peaks (normalized 0-1) for display.
    #[serde(default)]
    pub peaks: Vec<f32>,
}
