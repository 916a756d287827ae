#![allow(dead_code)]
//! Test harness utilities for arrange-sync integration tests.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use serde_json::Value;

use arrange_sync::framing::{read_message, write_message};
use arrange_sync::relay::{ClientFrame, RelayServer, ServerFrame};
use arrange_sync::{
    MemoryHub, MemoryStore, MemoryTransport, PeerRole, SyncConfig, SyncDispatcher,
};
use arrange_types::{Note, Patch, ProjectState, Region, Track};

pub type Peer = SyncDispatcher<MemoryTransport, MemoryStore>;

pub const ROOM: &str = "room-1";

/// Two tracks, two regions, one note in `region-1`.
pub fn base_project() -> ProjectState {
    let mut state = ProjectState::new();
    state.tracks.push(Track::new("t1", "Bass"));
    state.tracks.push(Track::new("t2", "Keys"));
    let mut region = Region::new("region-1", "t1", 0.0, 4.0);
    region.notes.push(Note::new("n1", 36, 0.0, 1.0));
    state.regions.push(region);
    state.regions.push(Region::new("region-2", "t2", 4.0, 4.0));
    state
}

/// Join `hub` as `user` with a copy of the base project.
pub fn peer(hub: &MemoryHub, user: &str, role: PeerRole) -> Peer {
    let transport = hub.join(ROOM.into(), user.into());
    SyncDispatcher::new(
        ROOM.into(),
        user.into(),
        role,
        transport,
        MemoryStore::new(base_project()),
        &SyncConfig::default(),
    )
}

pub fn patch(value: Value) -> Patch {
    value.as_object().cloned().expect("patch must be an object")
}

/// Tick every peer a few rounds so request/answer exchanges settle.
pub fn pump(peers: &mut [&mut Peer], now: Instant) {
    for _ in 0..4 {
        for peer in peers.iter_mut() {
            peer.tick(now);
        }
    }
}

/// Drive the relay until the expected client count is reached, or timeout.
pub fn drive_until_clients(server: &mut RelayServer, expected: usize, timeout: Duration) {
    let start = Instant::now();
    while Instant::now().duration_since(start) < timeout {
        server.accept_connections();
        server.poll();
        if server.client_count() == expected {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!(
        "Timed out waiting for {} clients (have {})",
        expected,
        server.client_count()
    );
}

/// Drive the relay for a fixed period.
pub fn drive_for(server: &mut RelayServer, period: Duration) {
    let start = Instant::now();
    while Instant::now().duration_since(start) < period {
        server.accept_connections();
        server.poll();
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A raw TCP client for frame-level relay tests.
///
/// The tests are single-threaded, so handshakes are split:
/// 1. `send_hello()` sends the Hello frame
/// 2. `drive_until_clients()` lets the relay process it and answer
/// 3. `recv()` reads the Welcome
pub struct RawClient {
    pub reader: BufReader<TcpStream>,
    pub writer: BufWriter<TcpStream>,
}

impl RawClient {
    pub fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    pub fn send(&mut self, frame: &ClientFrame) -> std::io::Result<()> {
        write_message(&mut self.writer, frame)
    }

    pub fn recv(&mut self) -> std::io::Result<ServerFrame> {
        read_message(&mut self.reader)
    }

    pub fn send_hello(&mut self, room: &str, user: &str) -> std::io::Result<()> {
        self.send(&ClientFrame::Hello {
            room_id: room.into(),
            user_id: user.into(),
        })
    }
}
