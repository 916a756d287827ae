use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{NoteId, RegionId, SustainId, TrackId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub pitch: u8,
    /// Position in beats, relative to the region start.
    pub start: f64,
    /// Length in beats.
    pub duration: f64,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

fn default_velocity() -> u8 {
    100
}

impl Note {
    pub fn new(id: impl Into<NoteId>, pitch: u8, start: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            pitch,
            start,
            duration,
            velocity: default_velocity(),
        }
    }
}

/// Span during which the sustain pedal is held, relative to the region start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SustainRegion {
    pub id: SustainId,
    pub start: f64,
    pub end: f64,
}

/// Decoded sample data. Lives only in memory; it is never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples.
    pub samples: Arc<[f32]>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels,
            samples: samples.into(),
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Audio attached to a region or an instrument sample slot.
///
/// `source_id` is the stable, out-of-band reference peers use to fetch the
/// audio themselves; `buffer` is the locally decoded copy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(skip)]
    pub buffer: Option<AudioBuffer>,
}

impl AudioClip {
    pub fn from_url(source_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            url: Some(url.into()),
            buffer: None,
        }
    }

    pub fn with_buffer(mut self, buffer: AudioBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: RegionId,
    pub track_id: TrackId,
    #[serde(default)]
    pub name: String,
    /// Absolute start on the timeline, in beats.
    pub start: f64,
    /// Length in beats.
    pub length: f64,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub sustains: Vec<SustainRegion>,
    #[serde(default)]
    pub audio: Option<AudioClip>,
}

impl Region {
    pub fn new(
        id: impl Into<RegionId>,
        track_id: impl Into<TrackId>,
        start: f64,
        length: f64,
    ) -> Self {
        Self {
            id: id.into(),
            track_id: track_id.into(),
            name: String::new(),
            start,
            length,
            notes: Vec::new(),
            sustains: Vec::new(),
            audio: None,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub fn note_mut(&mut self, id: &NoteId) -> Option<&mut Note> {
        self.notes.iter_mut().find(|n| &n.id == id)
    }

    /// Insert or replace a note by id, keeping notes ordered by start.
    pub fn upsert_note(&mut self, note: Note) {
        if let Some(existing) = self.note_mut(&note.id) {
            *existing = note;
        } else {
            self.notes.push(note);
        }
        self.notes
            .sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    }

    pub fn remove_note(&mut self, id: &NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| &n.id != id);
        self.notes.len() != before
    }

    pub fn sustain(&self, id: &SustainId) -> Option<&SustainRegion> {
        self.sustains.iter().find(|s| &s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_note_does_not_duplicate() {
        let mut region = Region::new("r1", "t1", 0.0, 4.0);
        region.upsert_note(Note::new("n1", 60, 1.0, 0.5));
        region.upsert_note(Note::new("n1", 62, 1.0, 0.5));
        assert_eq!(region.notes.len(), 1);
        assert_eq!(region.notes[0].pitch, 62);
    }

    #[test]
    fn notes_stay_sorted_after_upsert() {
        let mut region = Region::new("r1", "t1", 0.0, 4.0);
        region.upsert_note(Note::new("a", 60, 2.0, 0.5));
        region.upsert_note(Note::new("b", 60, 0.0, 0.5));
        region.upsert_note(Note::new("c", 60, 1.0, 0.5));
        let ids: Vec<&str> = region.notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn audio_buffer_never_serialized() {
        let mut region = Region::new("r1", "t1", 0.0, 4.0);
        region.audio = Some(
            AudioClip::from_url("take-7", "https://cdn.example/take-7.wav")
                .with_buffer(AudioBuffer::new(48_000, 2, vec![0.0; 64])),
        );
        let json = serde_json::to_value(&region).unwrap();
        assert!(json["audio"].get("buffer").is_none());
        assert_eq!(json["audio"]["sourceId"], "take-7");
    }

    #[test]
    fn frames_account_for_channels() {
        let buffer = AudioBuffer::new(44_100, 2, vec![0.0; 10]);
        assert_eq!(buffer.frames(), 5);
    }
}
