//! Canonical lock ids.
//!
//! Every peer derives the lock id of an element from the element's own ids, so
//! two peers naming "the same" element always produce byte-identical strings
//! without negotiating.

use serde::{Deserialize, Serialize};

use arrange_types::{NoteId, RegionId, SustainId, TrackId};

use crate::locks::LockKind;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(String);

impl LockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lockable element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockTarget {
    Region(RegionId),
    Track(TrackId),
    TrackProperty { track_id: TrackId, property: String },
    /// Notes lock at region granularity: the id is the owning region's.
    Note { region_id: RegionId, note_id: NoteId },
    Sustain { region_id: RegionId, sustain_id: SustainId },
    SynthParam { track_id: TrackId, param: String },
}

impl LockTarget {
    pub fn kind(&self) -> LockKind {
        match self {
            LockTarget::Region(_) => LockKind::Region,
            LockTarget::Track(_) => LockKind::Track,
            LockTarget::TrackProperty { .. } => LockKind::TrackProperty,
            LockTarget::Note { .. } => LockKind::Note,
            LockTarget::Sustain { .. } => LockKind::Sustain,
            LockTarget::SynthParam { .. } => LockKind::Control,
        }
    }

    pub fn lock_id(&self) -> LockId {
        id_for(self)
    }
}

/// Map an element to its canonical lock id.
pub fn id_for(target: &LockTarget) -> LockId {
    match target {
        LockTarget::Region(region_id) => LockId::new(region_id.as_str()),
        LockTarget::Track(track_id) => LockId::new(format!("track:{}", track_id)),
        LockTarget::TrackProperty { track_id, property } => {
            LockId::new(format!("track:{}:{}", track_id, property))
        }
        LockTarget::Note { region_id, .. } => LockId::new(region_id.as_str()),
        LockTarget::Sustain {
            region_id,
            sustain_id,
        } => LockId::new(format!("sustain:{}:{}", region_id, sustain_id)),
        LockTarget::SynthParam { track_id, param } => {
            LockId::new(format!("synth:{}:{}", track_id, param))
        }
    }
}
