//! Protocol dispatcher.
//!
//! Owns the local side of a collaborative session: it turns local edits into
//! store mutations plus outbound messages, applies inbound messages to the
//! store under the sync gate, and keeps the lock table and presence state.
//!
//! The dispatcher is driven by its owner's event loop. Call [`SyncDispatcher::tick`]
//! regularly (every few milliseconds is plenty); it drains the transport,
//! flushes streams whose interval elapsed and expires abandoned locks.

mod gesture;
mod local;
mod locking;
mod outbound;
mod remote;

pub use gesture::Gesture;

use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use arrange_types::{Effect, Mutation, RecordingPreview, RoomId, Selection, TrackId, UserId};

use crate::config::SyncConfig;
use crate::gate::SyncGate;
use crate::lock_id::LockId;
use crate::locks::LockTable;
use crate::protocol::{ArrangeMessage, Envelope};
use crate::store::StateStore;
use crate::stream::StreamKind;
use crate::transport::{Transport, TransportEvent};

use outbound::{Outbound, Streams};

/// Role of the local peer in its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Arbitrates lock requests and answers state requests.
    Owner,
    Member,
}

/// Another user holds a lock the edit needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    pub lock_id: LockId,
    pub holder: UserId,
}

/// Result of a local edit.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Applied to the store and published (or queued for publishing).
    Applied,
    /// Nothing to do: the edit matched the current value.
    Unchanged,
    /// Another user holds the element. Nothing was mutated or sent.
    Locked(LockConflict),
    /// The store refused the mutation (unknown target, invalid value).
    Rejected,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied)
    }
}

impl From<bool> for EditOutcome {
    fn from(applied: bool) -> Self {
        if applied {
            EditOutcome::Applied
        } else {
            EditOutcome::Rejected
        }
    }
}

/// Things the UI layer should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    RemoteApplied {
        sender: UserId,
        event: &'static str,
    },
    /// A lock the local user asked for is held by someone else.
    LockConflict { lock_id: LockId, holder: UserId },
    /// A lock the local user held was granted to someone else.
    LockLost { lock_id: LockId, holder: UserId },
    LockReleased { lock_id: LockId, holder: UserId },
    UserLeft(UserId),
    StateSynced { from: UserId },
    /// An inbound message was discarded.
    Dropped {
        sender: UserId,
        event: &'static str,
        reason: String,
    },
}

pub struct SyncDispatcher<T: Transport, S: StateStore> {
    room_id: RoomId,
    local_user: UserId,
    role: PeerRole,
    answers_state_requests: bool,
    connected: bool,
    transport: T,
    store: S,
    gate: Rc<SyncGate>,
    locks: LockTable,
    lock_timeout: Option<Duration>,
    streams: Streams,
    /// Last effect chain broadcast or applied from a peer, per track.
    effect_memory: HashMap<TrackId, Vec<Effect>>,
    selections: HashMap<UserId, Selection>,
    previews: HashMap<UserId, RecordingPreview>,
    events: Vec<SyncEvent>,
}

impl<T: Transport, S: StateStore> SyncDispatcher<T, S> {
    pub fn new(
        room_id: RoomId,
        local_user: UserId,
        role: PeerRole,
        transport: T,
        store: S,
        config: &SyncConfig,
    ) -> Self {
        info!(
            "joining room {} as {} ({:?})",
            room_id, local_user, role
        );
        Self {
            room_id,
            local_user,
            role,
            answers_state_requests: role == PeerRole::Owner,
            connected: true,
            transport,
            store,
            gate: Rc::new(SyncGate::new()),
            locks: LockTable::new(),
            lock_timeout: config.lock_timeout(),
            streams: Streams::new(&config.throttle),
            effect_memory: HashMap::new(),
            selections: HashMap::new(),
            previews: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Share an existing gate instead of the dispatcher's own.
    pub fn with_gate(mut self, gate: Rc<SyncGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> Rc<SyncGate> {
        Rc::clone(&self.gate)
    }

    pub fn set_answers_state_requests(&mut self, answers: bool) {
        self.answers_state_requests = answers;
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Current selection of every remote user that has one.
    pub fn selections(&self) -> &HashMap<UserId, Selection> {
        &self.selections
    }

    /// In-progress recording previews of remote users.
    pub fn previews(&self) -> &HashMap<UserId, RecordingPreview> {
        &self.previews
    }

    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drive the dispatcher: inbound events, due flushes, lock renewal and expiry.
    pub fn tick(&mut self, now: Instant) {
        for event in self.transport.poll_events() {
            self.handle_event(event, now);
        }
        self.flush_due(now);
        self.renew_own_locks();
        self.expire_locks();
    }

    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Message(envelope) => self.handle_envelope(envelope, now),
            TransportEvent::UserJoined(user) => {
                info!("{} joined room {}", user, self.room_id);
            }
            TransportEvent::UserLeft(user) => {
                info!("{} left room {}", user, self.room_id);
                self.forget_user(&user);
            }
            TransportEvent::Disconnected => {
                warn!("transport disconnected from room {}", self.room_id);
                self.connected = false;
            }
            TransportEvent::Reconnected => {
                info!("transport reconnected to room {}, requesting state", self.room_id);
                self.connected = true;
                self.request_state();
            }
        }
    }

    /// Send everything due at `now`.
    pub fn flush_due(&mut self, now: Instant) {
        for kind in StreamKind::ALL {
            self.flush_kind(kind, Some(now));
        }
    }

    /// Flush one stream immediately. Returns the number of messages sent.
    pub fn flush_stream(&mut self, kind: StreamKind) -> usize {
        self.flush_kind(kind, None)
    }

    /// Disarm one stream and discard what it holds.
    pub fn cancel_stream(&mut self, kind: StreamKind) {
        self.streams.cancel(kind);
    }

    pub fn pending(&self, kind: StreamKind) -> usize {
        self.streams.pending(kind)
    }

    /// Earliest armed flush deadline, for event loops that sleep.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.streams.next_deadline()
    }

    /// Apply a mutation and publish it, unless a remote update is being applied.
    fn commit(&mut self, mutation: Mutation, outbound: Outbound) -> bool {
        if !self.store.apply(&mutation) {
            debug!("{} not applicable to local state", mutation.name());
            return false;
        }
        self.publish(outbound);
        true
    }

    fn publish(&mut self, outbound: Outbound) {
        if self.gate.is_syncing() {
            return;
        }
        match outbound {
            Outbound::Now(message) => self.send_now(message),
            Outbound::Feed(feed, now) => self.streams.push(feed, now),
        }
    }

    /// Transmit right away. Failures are logged and the message is dropped.
    fn send_now(&mut self, message: ArrangeMessage) {
        let envelope = Envelope::new(self.room_id.clone(), self.local_user.clone(), message);
        if let Err(e) = self.transport.send(&envelope) {
            warn!("dropping outbound {}: {}", envelope.event(), e);
        }
    }

    fn flush_kind(&mut self, kind: StreamKind, due: Option<Instant>) -> usize {
        let messages = self.streams.take(kind, due);
        let count = messages.len();
        for message in messages {
            if let ArrangeMessage::EffectChainUpdate { track_id, effects } = &message {
                self.effect_memory.insert(track_id.clone(), effects.clone());
            }
            self.send_now(message);
        }
        count
    }

    /// Run `edit` as a remote application: the store changes exactly as for
    /// a local edit, but nothing is published.
    fn apply_remote_edit(&mut self, edit: impl FnOnce(&mut Self) -> bool) -> bool {
        let gate = Rc::clone(&self.gate);
        gate.apply_remote(|| edit(self))
    }

    fn forget_user(&mut self, user: &UserId) {
        self.release_locks_of(user);
        self.selections.remove(user);
        self.previews.remove(user);
        self.events.push(SyncEvent::UserLeft(user.clone()));
    }
}
