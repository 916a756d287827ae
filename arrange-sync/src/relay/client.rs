//! Relay client: a [`Transport`] over a TCP connection to a [`RelayServer`].
//!
//! [`RelayServer`]: crate::relay::RelayServer

use std::io::{self, BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use log::{error, info, warn};

use arrange_types::{RoomId, UserId};

use crate::framing::{read_frame, read_message, write_message};
use crate::protocol::Envelope;
use crate::relay::frames::{ClientFrame, ServerFrame};
use crate::transport::{Transport, TransportError, TransportEvent};

pub struct RelayClient {
    addr: String,
    room_id: RoomId,
    user_id: UserId,
    /// `None` while disconnected.
    writer: Option<BufWriter<TcpStream>>,
    event_rx: Receiver<TransportEvent>,
    /// Events raised locally (reconnect, send failure) ahead of the reader's.
    queued: Vec<TransportEvent>,
    /// Room members at the time of the last handshake.
    members: Vec<UserId>,
}

impl RelayClient {
    /// Connect to a relay and join `room_id` as `user_id`. Blocks until the
    /// relay answers the Hello.
    pub fn connect(addr: &str, room_id: RoomId, user_id: UserId) -> io::Result<Self> {
        let (writer, event_rx, members) = handshake(addr, &room_id, &user_id)?;
        Ok(Self {
            addr: addr.to_string(),
            room_id,
            user_id,
            writer: Some(writer),
            event_rx,
            queued: Vec::new(),
            members,
        })
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    pub fn ping(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => write_message(writer, &ClientFrame::Ping),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "relay not connected")),
        }
    }

    /// Open a fresh connection and rejoin the room. The next poll yields
    /// [`TransportEvent::Reconnected`].
    pub fn reconnect(&mut self) -> io::Result<()> {
        if self.writer.is_some() {
            let _ = self.disconnect();
        }
        let (writer, event_rx, members) = handshake(&self.addr, &self.room_id, &self.user_id)?;
        self.writer = Some(writer);
        self.event_rx = event_rx;
        self.members = members;
        self.queued.push(TransportEvent::Reconnected);
        Ok(())
    }

    /// Leave the room.
    pub fn disconnect(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => write_message(&mut writer, &ClientFrame::Goodbye),
            None => Ok(()),
        }
    }
}

impl Transport for RelayClient {
    fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(TransportError::Disconnected);
        };
        if let Err(e) = write_message(writer, &ClientFrame::Publish(envelope.clone())) {
            warn!("relay write failed: {}", e);
            self.writer = None;
            self.queued.push(TransportEvent::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events = std::mem::take(&mut self.queued);
        loop {
            match self.event_rx.try_recv() {
                Ok(TransportEvent::Disconnected) => {
                    if self.writer.take().is_some() {
                        events.push(TransportEvent::Disconnected);
                    }
                }
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}

type Connection = (BufWriter<TcpStream>, Receiver<TransportEvent>, Vec<UserId>);

fn handshake(addr: &str, room_id: &RoomId, user_id: &UserId) -> io::Result<Connection> {
    info!("connecting to relay at {} as {}", addr, user_id);

    let stream = TcpStream::connect(addr)?;
    let read_stream = stream.try_clone()?;

    let mut writer = BufWriter::new(stream);
    let mut reader = BufReader::new(read_stream);

    write_message(
        &mut writer,
        &ClientFrame::Hello {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        },
    )?;

    let members = match read_message::<_, ServerFrame>(&mut reader)? {
        ServerFrame::Welcome { members, .. } => members,
        ServerFrame::Error { message } => {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, message));
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected Welcome, got {:?}", other),
            ));
        }
    };

    info!("joined room {} ({} already present)", room_id, members.len());

    let (event_tx, event_rx) = mpsc::channel();
    thread::spawn(move || {
        relay_reader_thread(reader, event_tx);
    });

    Ok((writer, event_rx, members))
}

/// Reads frames from the relay and turns them into transport events.
fn relay_reader_thread(mut reader: BufReader<TcpStream>, event_tx: mpsc::Sender<TransportEvent>) {
    loop {
        let bytes = match read_frame(&mut reader) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    error!("relay read error: {}", e);
                }
                let _ = event_tx.send(TransportEvent::Disconnected);
                break;
            }
        };
        let event = match serde_json::from_slice::<ServerFrame>(&bytes) {
            Ok(ServerFrame::Deliver(envelope)) => match envelope.validate() {
                Ok(()) => TransportEvent::Message(envelope),
                Err(e) => {
                    warn!("dropping {} from {}: {}", envelope.event(), envelope.sender_user_id, e);
                    continue;
                }
            },
            Ok(ServerFrame::UserJoined(user)) => TransportEvent::UserJoined(user),
            Ok(ServerFrame::UserLeft(user)) => TransportEvent::UserLeft(user),
            Ok(ServerFrame::Shutdown) => {
                info!("relay shutting down");
                let _ = event_tx.send(TransportEvent::Disconnected);
                break;
            }
            Ok(ServerFrame::Error { message }) => {
                warn!("relay error: {}", message);
                continue;
            }
            Ok(ServerFrame::Pong) | Ok(ServerFrame::Welcome { .. }) => continue,
            Err(e) => {
                warn!("undecodable relay frame: {}", e);
                continue;
            }
        };
        if event_tx.send(event).is_err() {
            break;
        }
    }

    info!("relay reader exiting");
}
