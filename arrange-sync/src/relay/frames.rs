//! Frames exchanged between relay clients and the relay server.

use serde::{Deserialize, Serialize};

use arrange_types::{RoomId, UserId};

use crate::protocol::Envelope;

/// Client → relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Join a room. Must be the first frame on a connection.
    Hello { room_id: RoomId, user_id: UserId },
    /// Route an envelope to the rest of the room.
    Publish(Envelope),
    Goodbye,
    Ping,
}

/// Relay → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Handshake accepted. `members` are the users already in the room.
    Welcome { room_id: RoomId, members: Vec<UserId> },
    Deliver(Envelope),
    UserJoined(UserId),
    UserLeft(UserId),
    Pong,
    Shutdown,
    Error { message: String },
}
