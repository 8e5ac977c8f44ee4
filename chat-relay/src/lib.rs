//! # chat-relay
//!
//! Blind relay server for sealed-chat.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections on a single path
//! - Fans every envelope a client sends out to all connected clients
//! - Bounds each outbound write so a stalled peer cannot hold up the rest
//! - Never sees plaintext (relay is a "dumb pipe")
//!
//! ## Architecture
//!
//! ```text
//! Client A ──┐                       ┌── Client B
//!            │     WebSocket /ws     │
//!            ├──────────────────────►│
//!            │                       │
//!        ┌───┴───────────────────────┴───┐
//!        │          chat-relay           │
//!        │  session ─► broadcast ─┐      │
//!        │  (one task per client) ▼      │
//!        │        ConnectionRegistry     │
//!        └───────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Clients send JSON text frames holding an [`chat_types::Envelope`]. Every
//! envelope is written back out to every registered connection, the sender
//! included. There is no acknowledgement and no persistence.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcast;
pub mod config;
pub mod error;
pub mod peer;
pub mod registry;
pub mod server;
pub mod session;

pub use server::{start, ChatRelay, RelayHandle};
