//! State mutations the local store understands.
//!
//! Every change to the project, whether typed by the local user or received
//! from a collaborator, is expressed as a `Mutation` and applied by
//! [`crate::reduce`]. Mutations carry whole-field values (or upserts keyed by
//! caller-generated ids) so that applying one twice equals applying it once.

use std::collections::BTreeMap;

use crate::{
    Effect, Instrument, Note, NoteId, Patch, Region, RegionId, TimeSignature, Track, TrackId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AddTrack(Track),
    UpdateTrack {
        track_id: TrackId,
        updates: Patch,
    },
    DeleteTrack(TrackId),
    ReorderTracks(Vec<TrackId>),
    ChangeInstrument {
        track_id: TrackId,
        instrument: Instrument,
    },
    AddRegion(Region),
    UpdateRegion {
        region_id: RegionId,
        updates: Patch,
    },
    DeleteRegion(RegionId),
    AddNote {
        region_id: RegionId,
        note: Note,
    },
    UpdateNote {
        region_id: RegionId,
        note_id: NoteId,
        updates: Patch,
    },
    DeleteNote {
        region_id: RegionId,
        note_id: NoteId,
    },
    SetBpm(f64),
    SetTimeSignature(TimeSignature),
    /// Merge named synth parameters into the track's parameter map.
    UpdateSynthParams {
        track_id: TrackId,
        params: BTreeMap<String, f64>,
    },
    SetEffectChain {
        track_id: TrackId,
        effects: Vec<Effect>,
    },
}

impl Mutation {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddTrack(_) => "add_track",
            Mutation::UpdateTrack { .. } => "update_track",
            Mutation::DeleteTrack(_) => "delete_track",
            Mutation::ReorderTracks(_) => "reorder_tracks",
            Mutation::ChangeInstrument { .. } => "change_instrument",
            Mutation::AddRegion(_) => "add_region",
            Mutation::UpdateRegion { .. } => "update_region",
            Mutation::DeleteRegion(_) => "delete_region",
            Mutation::AddNote { .. } => "add_note",
            Mutation::UpdateNote { .. } => "update_note",
            Mutation::DeleteNote { .. } => "delete_note",
            Mutation::SetBpm(_) => "set_bpm",
            Mutation::SetTimeSignature(_) => "set_time_signature",
            Mutation::UpdateSynthParams { .. } => "update_synth_params",
            Mutation::SetEffectChain { .. } => "set_effect_chain",
        }
    }
}
