//! `hello` capability exchange (spec.md §4.5).
//!
//! Builds the outbound `hello` packet from a set of locally supported
//! features, and negotiates the intersection once a peer's `hello` (or
//! `challenge`) has been parsed back into [`Capabilities`].

use crate::alias::AliasTable;
use crate::capabilities::Capabilities;
use crate::compress;
use crate::encode::{self, Encoder};
use crate::error::{ProtocolError, Result};
use crate::header::CompressionAlgo;
use crate::packet::{Packet, Value};

/// Version tuple advertised in `hello` (1-4 integers, spec.md §4.5).
pub type Version = Vec<u32>;

/// What this core advertises about itself before any negotiation.
#[derive(Clone, Debug)]
pub struct LocalHello {
    pub version: Version,
    pub uuid: String,
    pub compressors: Vec<CompressionAlgo>,
    pub encoders: Vec<Encoder>,
    pub has_password: bool,
    pub legacy_opt_in: bool,
    /// This side's own packet-type names it wants aliased on the wire, in
    /// the order it assigns ids. Published under `aliases` (spec.md §3:
    /// "each side publishes its own aliases map").
    pub aliases: Vec<String>,
}

impl LocalHello {
    /// Builds the `hello` packet body. `challenge` is set when the caller
    /// has a password ready but has not yet produced a challenge response.
    pub fn to_packet(&self) -> Packet {
        let mut caps = Capabilities::new();
        caps.set(
            "version",
            Value::List(self.version.iter().map(|n| Value::UInt(*n as u64)).collect()),
        );
        caps.set("uuid", self.uuid.clone());
        caps.set(
            "compressors",
            Value::List(self.compressors.iter().map(|c| Value::Str(c.name().to_string())).collect()),
        );
        caps.set(
            "packet-encoders",
            Value::List(self.encoders.iter().map(|e| Value::Str(e.name().to_string())).collect()),
        );
        if self.has_password {
            caps.set("challenge", true);
        }
        if self.legacy_opt_in {
            caps.set("legacy", true);
        }
        if !self.aliases.is_empty() {
            let dict = self
                .aliases
                .iter()
                .enumerate()
                .map(|(id, name)| (name.clone().into_bytes(), Value::UInt(id as u64)))
                .collect();
            caps.set("aliases", Value::Dict(dict));
        }
        let mut packet = vec![Value::Str("hello".to_string())];
        packet.push(caps.to_dict());
        packet
    }
}

/// The outcome of negotiating this core's [`LocalHello`] against a peer's
/// parsed `hello` capabilities.
#[derive(Clone, Debug)]
pub struct Negotiated {
    pub peer_version: Version,
    pub compression: Option<CompressionAlgo>,
    pub encoder: Encoder,
    pub aliases: AliasTable,
}

/// Rejected unless the peer has opted into `legacy` (spec.md §4.5).
fn is_legacy_encoder(e: Encoder) -> bool {
    matches!(e, Encoder::Rencode)
}

pub fn parse_hello_body(packet: &Packet) -> Result<Capabilities> {
    let body = packet
        .get(1)
        .ok_or_else(|| ProtocolError::PacketFailure("hello packet missing capability body".into()))?;
    Ok(Capabilities::from_dict(body))
}

/// Negotiates compression, encoder, and version against a peer's parsed
/// `hello` capabilities. Installs the peer's published packet-alias list,
/// if present, into a fresh [`AliasTable`].
pub fn negotiate(local: &LocalHello, peer: &Capabilities) -> Result<Negotiated> {
    let peer_version: Version = peer
        .get("version")
        .and_then(Value::as_list)
        .map(|items| items.iter().filter_map(Value::as_uint).map(|v| v as u32).collect())
        .unwrap_or_default();

    let peer_compressors = peer.get_str_list("compressors");
    let compression = compress::negotiate(&peer_compressors);

    let peer_encoders = peer.get_str_list("packet-encoders");
    let legacy_opt_in = peer.get_bool("legacy") || local.legacy_opt_in;
    let mut candidates: Vec<String> = peer_encoders;
    if !legacy_opt_in {
        candidates.retain(|name| encode::Encoder::from_name(name).map(|e| !is_legacy_encoder(e)).unwrap_or(true));
    }
    let encoder = encode::negotiate(&candidates)
        .ok_or_else(|| ProtocolError::IncompatibleVersion("no common packet encoder".into()))?;

    let mut aliases = AliasTable::new();
    if let Some(dict) = peer.get("aliases").and_then(Value::as_dict) {
        let pairs: Vec<(String, u64)> = dict
            .iter()
            .filter_map(|(name, id)| {
                let id = id.as_uint()?;
                Some((String::from_utf8_lossy(name).to_string(), id))
            })
            .collect();
        aliases.install(&pairs);
    }

    Ok(Negotiated {
        peer_version,
        compression,
        encoder,
        aliases,
    })
}
