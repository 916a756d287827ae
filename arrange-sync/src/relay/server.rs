//! Relay server.
//!
//! Accepts TCP connections, waits for each client's Hello, then routes
//! published envelopes within rooms. Driven by the caller: call
//! [`RelayServer::accept_connections`] and [`RelayServer::poll`] in a loop.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use log::{debug, error, info, warn};

use arrange_types::{RoomId, UserId};

use crate::framing::{read_frame, write_message};
use crate::relay::frames::{ClientFrame, ServerFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConnectionId(u64);

/// A client that completed the handshake.
struct Member {
    room_id: RoomId,
    user_id: UserId,
    writer: BufWriter<TcpStream>,
}

impl Member {
    fn send(&mut self, frame: &ServerFrame) -> io::Result<()> {
        write_message(&mut self.writer, frame)
    }
}

pub struct RelayServer {
    listener: TcpListener,
    members: HashMap<ConnectionId, Member>,
    /// Connections awaiting Hello.
    pending: HashMap<ConnectionId, BufWriter<TcpStream>>,
    frame_rx: Receiver<(ConnectionId, ClientFrame)>,
    frame_tx: Sender<(ConnectionId, ClientFrame)>,
    next_connection_id: u64,
}

impl RelayServer {
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let (frame_tx, frame_rx) = mpsc::channel();

        info!("relay listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            members: HashMap::new(),
            pending: HashMap::new(),
            frame_rx,
            frame_tx,
            next_connection_id: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept waiting TCP connections. They join a room once their Hello arrives.
    pub fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let id = ConnectionId(self.next_connection_id);
                    self.next_connection_id += 1;

                    if let Err(e) = stream.set_nonblocking(false) {
                        error!("failed to configure connection from {}: {}", addr, e);
                        continue;
                    }
                    let read_stream = match stream.try_clone() {
                        Ok(s) => s,
                        Err(e) => {
                            error!("failed to clone stream from {}: {}", addr, e);
                            continue;
                        }
                    };

                    let frame_tx = self.frame_tx.clone();
                    thread::spawn(move || {
                        connection_reader_thread(id, read_stream, frame_tx);
                    });

                    self.pending.insert(id, BufWriter::new(stream));
                    debug!("connection {:?} from {}, awaiting hello", id, addr);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Process every frame received so far. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((id, frame)) = self.frame_rx.try_recv() {
            handled += 1;
            match frame {
                ClientFrame::Hello { room_id, user_id } => self.handle_hello(id, room_id, user_id),
                ClientFrame::Publish(envelope) => {
                    let Some(member) = self.members.get_mut(&id) else {
                        warn!("publish from {:?} before hello", id);
                        continue;
                    };
                    if envelope.room_id != member.room_id
                        || envelope.sender_user_id != member.user_id
                    {
                        warn!(
                            "{} tried to publish {} as {} in room {}",
                            member.user_id,
                            envelope.event(),
                            envelope.sender_user_id,
                            envelope.room_id
                        );
                        let _ = member.send(&ServerFrame::Error {
                            message: "envelope does not match session".into(),
                        });
                        continue;
                    }
                    let room_id = member.room_id.clone();
                    self.send_to_room(&room_id, Some(id), &ServerFrame::Deliver(envelope));
                }
                ClientFrame::Goodbye => self.remove(id),
                ClientFrame::Ping => {
                    if let Some(member) = self.members.get_mut(&id) {
                        if let Err(e) = member.send(&ServerFrame::Pong) {
                            warn!("failed to send pong to {}: {}", member.user_id, e);
                        }
                    }
                }
            }
        }
        handled
    }

    fn handle_hello(&mut self, id: ConnectionId, room_id: RoomId, user_id: UserId) {
        let Some(mut writer) = self.pending.remove(&id) else {
            warn!("unexpected hello from {:?}", id);
            return;
        };
        if room_id.is_empty() || user_id.is_empty() {
            let _ = write_message(
                &mut writer,
                &ServerFrame::Error {
                    message: "roomId and userId are required".into(),
                },
            );
            return;
        }
        if self
            .members
            .values()
            .any(|m| m.room_id == room_id && m.user_id == user_id)
        {
            warn!("{} is already in room {}", user_id, room_id);
            let _ = write_message(
                &mut writer,
                &ServerFrame::Error {
                    message: format!("{} is already connected", user_id),
                },
            );
            return;
        }

        let members = self.room_members(&room_id);
        let welcome = ServerFrame::Welcome {
            room_id: room_id.clone(),
            members,
        };
        if let Err(e) = write_message(&mut writer, &welcome) {
            error!("failed to welcome {}: {}", user_id, e);
            return;
        }

        self.send_to_room(&room_id, None, &ServerFrame::UserJoined(user_id.clone()));
        info!("{} joined room {}", user_id, room_id);
        self.members.insert(
            id,
            Member {
                room_id,
                user_id,
                writer,
            },
        );
    }

    fn remove(&mut self, id: ConnectionId) {
        self.pending.remove(&id);
        if let Some(member) = self.members.remove(&id) {
            info!("{} left room {}", member.user_id, member.room_id);
            self.send_to_room(&member.room_id, None, &ServerFrame::UserLeft(member.user_id));
        }
    }

    /// Send to every member of `room_id` except `skip`. Members whose socket
    /// fails are dropped and their departure announced.
    fn send_to_room(&mut self, room_id: &RoomId, skip: Option<ConnectionId>, frame: &ServerFrame) {
        let mut failed = Vec::new();
        for (id, member) in self.members.iter_mut() {
            if &member.room_id != room_id || Some(*id) == skip {
                continue;
            }
            if let Err(e) = member.send(frame) {
                warn!("failed to send to {}: {}", member.user_id, e);
                failed.push(*id);
            }
        }
        for id in failed {
            self.remove(id);
        }
    }

    /// Tell every connected client the relay is going away.
    pub fn broadcast_shutdown(&mut self) {
        for member in self.members.values_mut() {
            let _ = member.send(&ServerFrame::Shutdown);
        }
    }

    pub fn client_count(&self) -> usize {
        self.members.len()
    }

    /// Users currently in `room_id`, sorted.
    pub fn room_members(&self, room_id: &RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .members
            .values()
            .filter(|m| &m.room_id == room_id)
            .map(|m| m.user_id.clone())
            .collect();
        users.sort();
        users
    }
}

/// Reads frames from one connection and forwards them to the server loop.
fn connection_reader_thread(
    id: ConnectionId,
    stream: TcpStream,
    frame_tx: Sender<(ConnectionId, ClientFrame)>,
) {
    let mut reader = BufReader::new(stream);

    loop {
        let bytes = match read_frame(&mut reader) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    warn!("connection {:?} read error: {}", id, e);
                }
                // Implicit goodbye on disconnect
                let _ = frame_tx.send((id, ClientFrame::Goodbye));
                break;
            }
        };
        let frame: ClientFrame = match serde_json::from_slice(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("connection {:?} sent an undecodable frame: {}", id, e);
                continue;
            }
        };
        let is_goodbye = matches!(frame, ClientFrame::Goodbye);
        if frame_tx.send((id, frame)).is_err() || is_goodbye {
            break;
        }
    }

    debug!("connection {:?} reader exiting", id);
}
