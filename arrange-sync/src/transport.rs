//! Message transport capability and the in-process room hub.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io;
use std::rc::Rc;

use arrange_types::{RoomId, UserId};

use crate::protocol::{Envelope, ProtocolError};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Envelope),
    UserJoined(UserId),
    UserLeft(UserId),
    Disconnected,
    Reconnected,
}

#[derive(Debug)]
pub enum TransportError {
    Disconnected,
    Io(io::Error),
    Protocol(ProtocolError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "transport not connected"),
            Self::Io(e) => write!(f, "transport i/o error: {}", e),
            Self::Protocol(e) => write!(f, "transport encode error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

/// Delivers envelopes to the other members of a room.
///
/// Delivery is in send order per sender. `poll_events` never blocks.
pub trait Transport {
    fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;

    fn poll_events(&mut self) -> Vec<TransportEvent>;
}

/// Queued for a member: either an encoded frame or a lifecycle event.
enum Pending {
    Frame(Vec<u8>),
    Event(TransportEvent),
}

struct Member {
    room: RoomId,
    connected: bool,
    inbox: VecDeque<Pending>,
}

#[derive(Default)]
struct HubInner {
    members: BTreeMap<UserId, Member>,
    echo: bool,
}

impl HubInner {
    fn announce(&mut self, room: &RoomId, except: &UserId, event: TransportEvent) {
        for (user, member) in self.members.iter_mut() {
            if user != except && &member.room == room && member.connected {
                member.inbox.push_back(Pending::Event(event.clone()));
            }
        }
    }
}

/// In-process message bus. Members join a room and get a [`MemoryTransport`];
/// everything a member sends is encoded, routed to the rest of its room and
/// decoded on the receiving side.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Rc<RefCell<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also deliver each message back to its sender, like a naive relay would.
    pub fn set_echo(&self, echo: bool) {
        self.inner.borrow_mut().echo = echo;
    }

    pub fn join(&self, room: RoomId, user: UserId) -> MemoryTransport {
        let mut inner = self.inner.borrow_mut();
        inner.announce(&room, &user, TransportEvent::UserJoined(user.clone()));
        inner.members.insert(
            user.clone(),
            Member {
                room,
                connected: true,
                inbox: VecDeque::new(),
            },
        );
        MemoryTransport {
            hub: self.clone(),
            user,
        }
    }

    /// Remove a member for good.
    pub fn leave(&self, user: &UserId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(member) = inner.members.remove(user) {
            inner.announce(&member.room, user, TransportEvent::UserLeft(user.clone()));
        }
    }

    /// Drop a member's connection. Others see it leave; messages sent to it
    /// meanwhile are lost.
    pub fn disconnect(&self, user: &UserId) {
        let mut inner = self.inner.borrow_mut();
        let Some(member) = inner.members.get_mut(user) else {
            return;
        };
        if !member.connected {
            return;
        }
        member.connected = false;
        member.inbox.clear();
        member.inbox.push_back(Pending::Event(TransportEvent::Disconnected));
        let room = member.room.clone();
        inner.announce(&room, user, TransportEvent::UserLeft(user.clone()));
    }

    pub fn reconnect(&self, user: &UserId) {
        let mut inner = self.inner.borrow_mut();
        let Some(member) = inner.members.get_mut(user) else {
            return;
        };
        if member.connected {
            return;
        }
        member.connected = true;
        member.inbox.push_back(Pending::Event(TransportEvent::Reconnected));
        let room = member.room.clone();
        inner.announce(&room, user, TransportEvent::UserJoined(user.clone()));
    }

    pub fn members(&self, room: &RoomId) -> Vec<UserId> {
        self.inner
            .borrow()
            .members
            .iter()
            .filter(|(_, m)| &m.room == room && m.connected)
            .map(|(u, _)| u.clone())
            .collect()
    }

    fn route(&self, from: &UserId, envelope: &Envelope) -> Result<(), TransportError> {
        let frame = envelope.encode()?;
        let mut inner = self.inner.borrow_mut();
        match inner.members.get(from) {
            Some(member) if member.connected => {}
            _ => return Err(TransportError::Disconnected),
        }
        let echo = inner.echo;
        for (user, member) in inner.members.iter_mut() {
            if member.room != envelope.room_id || !member.connected {
                continue;
            }
            if user == from && !echo {
                continue;
            }
            member.inbox.push_back(Pending::Frame(frame.clone()));
        }
        Ok(())
    }

    fn drain(&self, user: &UserId) -> Vec<TransportEvent> {
        let pending: Vec<Pending> = match self.inner.borrow_mut().members.get_mut(user) {
            Some(member) => member.inbox.drain(..).collect(),
            None => return Vec::new(),
        };
        pending
            .into_iter()
            .filter_map(|p| match p {
                Pending::Event(event) => Some(event),
                Pending::Frame(bytes) => match Envelope::decode(&bytes) {
                    Ok(envelope) => Some(TransportEvent::Message(envelope)),
                    Err(e) => {
                        log::warn!("dropping undecodable frame for {}: {}", user, e);
                        None
                    }
                },
            })
            .collect()
    }
}

/// One member's handle on a [`MemoryHub`].
pub struct MemoryTransport {
    hub: MemoryHub,
    user: UserId,
}

impl MemoryTransport {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        self.hub.route(&self.user, envelope)
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        self.hub.drain(&self.user)
    }
}
