//! TCP relay: a room router for peers that are not in the same process.
//!
//! The relay never interprets edits. It forwards each published envelope to
//! the other members of the sender's room and announces joins and leaves.

pub mod client;
pub mod frames;
pub mod server;

pub use client::RelayClient;
pub use frames::{ClientFrame, ServerFrame};
pub use server::RelayServer;
