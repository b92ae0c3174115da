//! xpra wire-protocol core: framed binary transport, packet codecs,
//! encryption, the two-thread protocol engine, `hello` capability exchange,
//! authentication, and in-band connection upgrades.
//!
//! This crate deliberately stops at the wire: it carries no window/pixel
//! pipeline, no UI toolkit bindings, no display-server integration, no CLI
//! argument parsing, and no service discovery. An embedder owns all of
//! that and talks to this crate only in terms of [`packet::Packet`]s.

pub mod alias;
pub mod auth;
pub mod capabilities;
pub mod compress;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod encode;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod header;
pub mod packet;
pub mod protocol;
pub mod queue;
pub mod upgrade;

pub use error::{ProtocolError, Result};
pub use packet::{Packet, Value};
