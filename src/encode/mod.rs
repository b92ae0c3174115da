//! Packet encoding (spec.md §4.2).
//!
//! Each encoder serializes a [`Packet`](crate::packet::Packet) (the typed
//! value sequence) to bytes and back. `rencodeplus` is mandatory; `rencode`,
//! `bencode`, and `yaml` are optional legacy formats kept for
//! interoperability with older peers. The active outbound encoder is chosen
//! during `hello` negotiation from the `packet-encoders` capability
//! intersection, in [`PREFERENCE_ORDER`].

pub mod bencode;
pub mod rencode;
pub mod rencodeplus;
pub mod value;
pub mod yaml;

use crate::error::{ProtocolError, Result};
use crate::packet::Packet;

/// Which packet encoder a header's flags byte names (spec.md §4.1/§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoder {
    RencodePlus,
    Rencode,
    Bencode,
    Yaml,
}

/// Preference order used when negotiating `packet-encoders` during `hello`.
pub const PREFERENCE_ORDER: [Encoder; 4] =
    [Encoder::RencodePlus, Encoder::Rencode, Encoder::Bencode, Encoder::Yaml];

impl Encoder {
    pub fn name(self) -> &'static str {
        match self {
            Encoder::RencodePlus => "rencodeplus",
            Encoder::Rencode => "rencode",
            Encoder::Bencode => "bencode",
            Encoder::Yaml => "yaml",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rencodeplus" => Some(Encoder::RencodePlus),
            "rencode" => Some(Encoder::Rencode),
            "bencode" => Some(Encoder::Bencode),
            "yaml" => Some(Encoder::Yaml),
            _ => None,
        }
    }

    /// The 3-bit id stored in the header flags byte (see `header.rs`).
    pub fn id(self) -> u8 {
        match self {
            Encoder::RencodePlus => 1,
            Encoder::Rencode => 2,
            Encoder::Bencode => 3,
            Encoder::Yaml => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Encoder::RencodePlus),
            2 => Some(Encoder::Rencode),
            3 => Some(Encoder::Bencode),
            4 => Some(Encoder::Yaml),
            _ => None,
        }
    }

    pub fn encode(self, packet: &Packet) -> Result<Vec<u8>> {
        match self {
            Encoder::RencodePlus => rencodeplus::encode(packet),
            Encoder::Rencode => rencode::encode(packet),
            Encoder::Bencode => bencode::encode(packet),
            Encoder::Yaml => yaml::encode(packet),
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<Packet> {
        match self {
            Encoder::RencodePlus => rencodeplus::decode(data),
            Encoder::Rencode => rencode::decode(data),
            Encoder::Bencode => bencode::decode(data),
            Encoder::Yaml => yaml::decode(data),
        }
    }
}

/// Picks the first encoder from [`PREFERENCE_ORDER`] present in both the
/// local build and the peer's advertised `packet-encoders` list.
pub fn negotiate(peer_encoders: &[String]) -> Option<Encoder> {
    PREFERENCE_ORDER.into_iter().find(|e| peer_encoders.iter().any(|n| n == e.name()))
}

pub(crate) fn invalid(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::Invalid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_prefers_rencodeplus() {
        let peers = vec!["bencode".to_string(), "rencodeplus".to_string(), "rencode".to_string()];
        assert_eq!(negotiate(&peers), Some(Encoder::RencodePlus));
    }

    #[test]
    fn negotiate_falls_back_to_legacy() {
        let peers = vec!["bencode".to_string()];
        assert_eq!(negotiate(&peers), Some(Encoder::Bencode));
    }
}
