//! Message catalogue for collaborative editing.
//!
//! Every message travels inside an [`Envelope`] that names the room it is
//! routed to and the user who sent it. Messages serialize as
//! `{"event": "arrange:<name>", "payload": {...}}` with camelCase fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use arrange_types::{
    Effect, Note, NoteId, Patch, RecordingPreview, RegionId, RoomId, Selection, TrackId, UserId,
};

use crate::lock_id::LockId;
use crate::locks::{LockKind, LockRecord};

pub const NAMESPACE: &str = "arrange:";

#[derive(Debug)]
pub enum ProtocolError {
    Json(serde_json::Error),
    /// A routing or identity field was absent or empty.
    MissingField(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "invalid message json: {}", e),
            Self::MissingField(field) => write!(f, "missing required field `{}`", field),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::MissingField(_) => None,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// How a category of message leaves the local peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Sent as soon as the edit happens.
    Discrete,
    /// Coalesced per element and flushed on a fixed interval.
    Throttled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPatch {
    pub region_id: RegionId,
    pub updates: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all_fields = "camelCase")]
pub enum ArrangeMessage {
    // Tracks. Entity payloads are sanitized JSON.
    #[serde(rename = "arrange:track_add")]
    TrackAdd { track: Value },
    #[serde(rename = "arrange:track_update")]
    TrackUpdate { track_id: TrackId, updates: Patch },
    #[serde(rename = "arrange:track_delete")]
    TrackDelete { track_id: TrackId },
    #[serde(rename = "arrange:track_reorder")]
    TrackReorder { track_ids: Vec<TrackId> },
    #[serde(rename = "arrange:track_instrument_change")]
    TrackInstrumentChange { track_id: TrackId, instrument: Value },

    // Regions
    #[serde(rename = "arrange:region_add")]
    RegionAdd { region: Value },
    #[serde(rename = "arrange:region_update")]
    RegionUpdate { region_id: RegionId, updates: Patch },
    #[serde(rename = "arrange:region_delete")]
    RegionDelete { region_id: RegionId },
    #[serde(rename = "arrange:region_drag")]
    RegionDrag { region_id: RegionId, updates: Patch },
    #[serde(rename = "arrange:region_drag_batch")]
    RegionDragBatch { regions: Vec<RegionPatch> },

    // Notes
    #[serde(rename = "arrange:note_add")]
    NoteAdd { region_id: RegionId, note: Note },
    #[serde(rename = "arrange:note_update")]
    NoteUpdate {
        region_id: RegionId,
        note_id: NoteId,
        updates: Patch,
    },
    #[serde(rename = "arrange:note_delete")]
    NoteDelete { region_id: RegionId, note_id: NoteId },

    // Locks
    #[serde(rename = "arrange:lock_acquire")]
    LockAcquire {
        element_id: LockId,
        #[serde(rename = "type")]
        kind: LockKind,
        acquired_at: u64,
    },
    #[serde(rename = "arrange:lock_release")]
    LockRelease { element_id: LockId },
    #[serde(rename = "arrange:lock_acquired")]
    LockAcquired {
        element_id: LockId,
        #[serde(rename = "type")]
        kind: LockKind,
        user_id: UserId,
        acquired_at: u64,
    },
    #[serde(rename = "arrange:lock_released")]
    LockReleased { element_id: LockId, user_id: UserId },
    #[serde(rename = "arrange:lock_conflict")]
    LockConflict {
        element_id: LockId,
        holder_id: UserId,
        requester_id: UserId,
    },

    // Project
    #[serde(rename = "arrange:bpm_change")]
    BpmChange { bpm: f64 },
    #[serde(rename = "arrange:time_signature_change")]
    TimeSignatureChange { numerator: u8, denominator: u8 },

    // Synth / effects
    #[serde(rename = "arrange:synth_params_update")]
    SynthParamsUpdate { track_id: TrackId, params: Patch },
    #[serde(rename = "arrange:effect_chain_update")]
    EffectChainUpdate { track_id: TrackId, effects: Vec<Effect> },

    // Recording
    #[serde(rename = "arrange:recording_preview")]
    RecordingPreview { preview: RecordingPreview },
    #[serde(rename = "arrange:recording_preview_end")]
    RecordingPreviewEnd { track_id: TrackId },

    #[serde(rename = "arrange:selection_change")]
    SelectionChange { selection: Selection },

    // Full-state resync
    #[serde(rename = "arrange:state_request")]
    StateRequest,
    #[serde(rename = "arrange:state_sync")]
    StateSync {
        /// Requester this snapshot answers; `None` addresses everyone.
        #[serde(default)]
        target_user_id: Option<UserId>,
        state: Value,
        #[serde(default)]
        locks: Vec<LockRecord>,
    },
}

impl ArrangeMessage {
    /// Event name without the namespace.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrackAdd { .. } => "track_add",
            Self::TrackUpdate { .. } => "track_update",
            Self::TrackDelete { .. } => "track_delete",
            Self::TrackReorder { .. } => "track_reorder",
            Self::TrackInstrumentChange { .. } => "track_instrument_change",
            Self::RegionAdd { .. } => "region_add",
            Self::RegionUpdate { .. } => "region_update",
            Self::RegionDelete { .. } => "region_delete",
            Self::RegionDrag { .. } => "region_drag",
            Self::RegionDragBatch { .. } => "region_drag_batch",
            Self::NoteAdd { .. } => "note_add",
            Self::NoteUpdate { .. } => "note_update",
            Self::NoteDelete { .. } => "note_delete",
            Self::LockAcquire { .. } => "lock_acquire",
            Self::LockRelease { .. } => "lock_release",
            Self::LockAcquired { .. } => "lock_acquired",
            Self::LockReleased { .. } => "lock_released",
            Self::LockConflict { .. } => "lock_conflict",
            Self::BpmChange { .. } => "bpm_change",
            Self::TimeSignatureChange { .. } => "time_signature_change",
            Self::SynthParamsUpdate { .. } => "synth_params_update",
            Self::EffectChainUpdate { .. } => "effect_chain_update",
            Self::RecordingPreview { .. } => "recording_preview",
            Self::RecordingPreviewEnd { .. } => "recording_preview_end",
            Self::SelectionChange { .. } => "selection_change",
            Self::StateRequest => "state_request",
            Self::StateSync { .. } => "state_sync",
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        match self {
            Self::TrackUpdate { .. }
            | Self::RegionDrag { .. }
            | Self::RegionDragBatch { .. }
            | Self::NoteUpdate { .. }
            | Self::SynthParamsUpdate { .. }
            | Self::EffectChainUpdate { .. }
            | Self::RecordingPreview { .. } => DeliveryMode::Throttled,
            _ => DeliveryMode::Discrete,
        }
    }

    /// Reject payloads whose identifying fields are empty.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::TrackUpdate { track_id, .. }
            | Self::TrackDelete { track_id }
            | Self::TrackInstrumentChange { track_id, .. }
            | Self::SynthParamsUpdate { track_id, .. }
            | Self::EffectChainUpdate { track_id, .. }
            | Self::RecordingPreviewEnd { track_id } => check(&[("trackId", track_id.is_empty())]),
            Self::RecordingPreview { preview } => {
                check(&[("trackId", preview.track_id.is_empty())])
            }
            Self::RegionUpdate { region_id, .. }
            | Self::RegionDelete { region_id }
            | Self::RegionDrag { region_id, .. } => check(&[("regionId", region_id.is_empty())]),
            Self::RegionDragBatch { regions } => {
                check(&[("regionId", regions.iter().any(|r| r.region_id.is_empty()))])
            }
            Self::NoteAdd { region_id, note } => {
                check(&[("regionId", region_id.is_empty()), ("noteId", note.id.is_empty())])
            }
            Self::NoteUpdate {
                region_id, note_id, ..
            }
            | Self::NoteDelete { region_id, note_id } => {
                check(&[("regionId", region_id.is_empty()), ("noteId", note_id.is_empty())])
            }
            Self::LockAcquire { element_id, .. } | Self::LockRelease { element_id } => {
                check(&[("elementId", element_id.is_empty())])
            }
            Self::LockAcquired { element_id, user_id, .. }
            | Self::LockReleased { element_id, user_id } => {
                check(&[("elementId", element_id.is_empty()), ("userId", user_id.is_empty())])
            }
            Self::LockConflict {
                element_id,
                holder_id,
                requester_id,
            } => check(&[
                ("elementId", element_id.is_empty()),
                ("holderId", holder_id.is_empty()),
                ("requesterId", requester_id.is_empty()),
            ]),
            Self::TrackAdd { .. }
            | Self::TrackReorder { .. }
            | Self::RegionAdd { .. }
            | Self::BpmChange { .. }
            | Self::TimeSignatureChange { .. }
            | Self::SelectionChange { .. }
            | Self::StateRequest
            | Self::StateSync { .. } => Ok(()),
        }
    }
}

fn check(fields: &[(&'static str, bool)]) -> Result<(), ProtocolError> {
    match fields.iter().find(|(_, missing)| *missing) {
        Some((name, _)) => Err(ProtocolError::MissingField(*name)),
        None => Ok(()),
    }
}

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub room_id: RoomId,
    pub sender_user_id: UserId,
    pub message: ArrangeMessage,
}

impl Envelope {
    pub fn new(room_id: RoomId, sender_user_id: UserId, message: ArrangeMessage) -> Self {
        Self {
            room_id,
            sender_user_id,
            message,
        }
    }

    /// Full event name, e.g. `arrange:region_drag`.
    pub fn event(&self) -> String {
        format!("{}{}", NAMESPACE, self.message.name())
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.room_id.is_empty() {
            return Err(ProtocolError::MissingField("roomId"));
        }
        if self.sender_user_id.is_empty() {
            return Err(ProtocolError::MissingField("senderUserId"));
        }
        self.message.validate()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        envelope.validate()?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(message: ArrangeMessage) -> Envelope {
        Envelope::new(RoomId::new("room-1"), UserId::new("userA"), message)
    }

    #[test]
    fn wire_shape_is_namespaced_and_camel_case() {
        let env = envelope(ArrangeMessage::NoteUpdate {
            region_id: RegionId::new("r1"),
            note_id: NoteId::new("n1"),
            updates: json!({"pitch": 62}).as_object().cloned().unwrap(),
        });
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["roomId"], "room-1");
        assert_eq!(value["senderUserId"], "userA");
        assert_eq!(value["message"]["event"], "arrange:note_update");
        assert_eq!(value["message"]["payload"]["regionId"], "r1");
        assert_eq!(value["message"]["payload"]["noteId"], "n1");
        assert_eq!(env.event(), "arrange:note_update");
    }

    #[test]
    fn lock_acquire_carries_type_field() {
        let env = envelope(ArrangeMessage::LockAcquire {
            element_id: LockId::new("track:t1:volume"),
            kind: LockKind::TrackProperty,
            acquired_at: 5,
        });
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["message"]["payload"]["elementId"], "track:t1:volume");
        assert_eq!(value["message"]["payload"]["type"], "track_property");
    }

    #[test]
    fn state_request_has_no_payload() {
        let bytes = envelope(ArrangeMessage::StateRequest).encode().unwrap();
        let back = Envelope::decode(&bytes).unwrap();
        assert_eq!(back.message, ArrangeMessage::StateRequest);
    }

    #[test]
    fn decode_rejects_missing_room() {
        let raw = json!({
            "roomId": "",
            "senderUserId": "userA",
            "message": {"event": "arrange:bpm_change", "payload": {"bpm": 100.0}}
        });
        let err = Envelope::decode(raw.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("roomId")));
    }

    #[test]
    fn decode_rejects_missing_payload_field() {
        let raw = json!({
            "roomId": "room-1",
            "senderUserId": "userA",
            "message": {"event": "arrange:note_delete", "payload": {"regionId": "r1"}}
        });
        assert!(matches!(
            Envelope::decode(raw.to_string().as_bytes()),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn decode_rejects_empty_id() {
        let raw = json!({
            "roomId": "room-1",
            "senderUserId": "userA",
            "message": {"event": "arrange:region_delete", "payload": {"regionId": ""}}
        });
        assert!(matches!(
            Envelope::decode(raw.to_string().as_bytes()),
            Err(ProtocolError::MissingField("regionId"))
        ));
    }

    #[test]
    fn unknown_event_is_an_error() {
        let raw = json!({
            "roomId": "room-1",
            "senderUserId": "userA",
            "message": {"event": "arrange:teleport", "payload": {}}
        });
        assert!(Envelope::decode(raw.to_string().as_bytes()).is_err());
    }

    #[test]
    fn realtime_categories_are_throttled() {
        let drag = ArrangeMessage::RegionDrag {
            region_id: RegionId::new("r1"),
            updates: Patch::new(),
        };
        assert_eq!(drag.mode(), DeliveryMode::Throttled);
        assert_eq!(ArrangeMessage::BpmChange { bpm: 90.0 }.mode(), DeliveryMode::Discrete);
        assert_eq!(ArrangeMessage::StateRequest.mode(), DeliveryMode::Discrete);
    }
}
