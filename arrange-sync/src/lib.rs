//! # arrange-sync
//!
//! Realtime synchronization engine for collaborative Arrange sessions.
//!
//! Local edits go through a [`SyncDispatcher`], which applies them to the
//! local [`StateStore`] and publishes them to the room over a [`Transport`].
//! Continuous edits (drags, knobs) are coalesced per element and flushed on a
//! fixed interval; discrete edits go out immediately. Inbound messages are
//! applied under the [`SyncGate`] so they are never echoed back.
//!
//! ## Module Overview
//!
//! - [`protocol`]: message catalogue and the routed [`Envelope`]
//! - [`dispatcher`]: the engine (local edits, inbound handling, locks, gestures)
//! - [`locks`] / [`lock_id`]: advisory lock table and canonical lock ids
//! - [`coalesce`], [`throttle`], [`stream`]: outbound batching primitives
//! - [`sanitize`]: wire forms of entities (no decoded audio)
//! - [`transport`]: transport capability and the in-process [`MemoryHub`]
//! - [`relay`]: TCP relay server and client
//! - [`config`]: throttle intervals, lock timeout, relay address

pub mod coalesce;
pub mod config;
pub mod dispatcher;
pub mod framing;
pub mod gate;
pub mod lock_id;
pub mod locks;
pub mod protocol;
pub mod relay;
pub mod sanitize;
pub mod store;
pub mod stream;
pub mod throttle;
pub mod transport;

pub use config::{ConfigError, SyncConfig, ThrottleConfig};
pub use dispatcher::{EditOutcome, Gesture, LockConflict, PeerRole, SyncDispatcher, SyncEvent};
pub use gate::SyncGate;
pub use lock_id::{LockId, LockTarget};
pub use locks::{AcquireResult, LockKind, LockRecord, LockStatus, LockTable};
pub use protocol::{ArrangeMessage, DeliveryMode, Envelope, ProtocolError};
pub use store::{MemoryStore, StateStore};
pub use stream::StreamKind;
pub use transport::{MemoryHub, MemoryTransport, Transport, TransportError, TransportEvent};
