use serde::{Deserialize, Serialize};

use super::region::Region;
use super::track::Track;
use crate::{RegionId, TrackId};

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Numerator 1..=32, denominator a power of two up to 32.
    pub fn is_valid(&self) -> bool {
        (1..=32).contains(&self.numerator)
            && self.denominator.is_power_of_two()
            && self.denominator <= 32
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// The shared project: everything collaborators edit together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    pub bpm: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
    /// Tracks in display order.
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectState {
    pub fn new() -> Self {
        Self {
            bpm: 120.0,
            time_signature: TimeSignature::default(),
            tracks: Vec::new(),
            regions: Vec::new(),
        }
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| &t.id == id)
    }

    pub fn track_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| &t.id == id)
    }

    pub fn region(&self, id: &RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| &r.id == id)
    }

    pub fn region_mut(&mut self, id: &RegionId) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| &r.id == id)
    }

    pub fn regions_for_track(&self, id: &TrackId) -> Vec<&Region> {
        self.regions.iter().filter(|r| &r.track_id == id).collect()
    }

    pub fn track_order(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }

    /// Remove a track and cascade-delete its regions.
    pub fn remove_track(&mut self, id: &TrackId) -> bool {
        let Some(pos) = self.tracks.iter().position(|t| &t.id == id) else {
            return false;
        };
        self.tracks.remove(pos);
        self.regions.retain(|r| &r.track_id != id);
        true
    }

    pub fn remove_region(&mut self, id: &RegionId) -> bool {
        let before = self.regions.len();
        self.regions.retain(|r| &r.id != id);
        self.regions.len() != before
    }

    /// Reorder tracks to follow `order`. Unknown ids are ignored; tracks not
    /// named keep their relative order after the named ones.
    pub fn reorder_tracks(&mut self, order: &[TrackId]) {
        let mut remaining = std::mem::take(&mut self.tracks);
        let mut sorted = Vec::with_capacity(remaining.len());
        for id in order {
            if let Some(pos) = remaining.iter().position(|t| &t.id == id) {
                sorted.push(remaining.remove(pos));
            }
        }
        sorted.extend(remaining);
        self.tracks = sorted;
    }
}
