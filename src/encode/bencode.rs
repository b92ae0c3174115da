//! The optional legacy `bencode` packet encoder (spec.md §4.2), built on
//! `serde_bencode`'s dynamic [`serde_bencode::value::Value`].
//!
//! Bencode has no boolean or unsigned-integer type; both collapse to
//! `Int`, matching the BitTorrent-derived wire format xpra inherited this
//! encoder from.

use super::value::{bencode_to_value, value_to_bencode};
use crate::error::Result;
use crate::packet::Packet;
use serde_bencode::value::Value as BValue;

pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let list = BValue::List(packet.iter().map(value_to_bencode).collect());
    serde_bencode::to_bytes(&list).map_err(|e| super::invalid(format!("bencode encode failed: {e}")))
}

pub fn decode(data: &[u8]) -> Result<Packet> {
    let parsed: BValue =
        serde_bencode::from_bytes(data).map_err(|e| super::invalid(format!("bencode decode failed: {e}")))?;
    match parsed {
        BValue::List(items) => Ok(items.iter().map(bencode_to_value).collect()),
        _ => Err(super::invalid("bencode payload is not a packet sequence")),
    }
}
