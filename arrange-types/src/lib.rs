//! # arrange-types
//!
//! Shared type definitions for the Arrange collaborative workstation.
//! This crate contains the timeline data model (tracks, regions, notes,
//! instrument parameters), the partial-update helpers used on the wire, and
//! the pure reducer that applies a [`Mutation`] to a [`ProjectState`].

pub mod mutation;
pub mod patch;
pub mod reduce;
pub mod state;

pub use mutation::Mutation;
pub use patch::{apply_patch, merge_patch, to_patch, Patch};
pub use reduce::reduce;

// Re-export all state types at crate root for convenience
pub use state::*;

/// Declares a string-backed identifier.
///
/// Ids are generated by the client that creates the element, so every peer
/// refers to the same element by the same bytes.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a track.
    TrackId
);
string_id!(
    /// Unique identifier for a region (clip) on the timeline.
    RegionId
);
string_id!(
    /// Unique identifier for a note inside a region.
    NoteId
);
string_id!(
    /// Unique identifier for a sustain-pedal region inside a region.
    SustainId
);
string_id!(
    /// Unique identifier for an effect slot in a track's chain.
    EffectId
);
string_id!(
    /// Identity of a collaborating user.
    UserId
);
string_id!(
    /// Routing key for a shared session.
    RoomId
);
