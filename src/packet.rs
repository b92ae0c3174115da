//! The packet data model: typed values, packets, and the alias table.
//!
//! A [`Value`] is the recursive tagged type every packet element (and every
//! capability-map entry) is built from. A [`Packet`] is simply an ordered
//! sequence of `Value`s whose first element is the packet type (either the
//! type name as a string, or — once aliases are installed — the small
//! integer standing in for it).

use std::collections::BTreeMap;

/// A single typed value appearing inside a packet or capability map.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Bytes(Vec<u8>),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    /// Keys are byte strings: xpra capability keys are ASCII but the wire
    /// format never assumes valid UTF-8 for them.
    Dict(BTreeMap<Vec<u8>, Value>),
    /// Sentinel occupying the position of a large byte string that was
    /// pulled out of the main body and sent as its own raw chunk frame at
    /// the given packet index (spec.md §4.4: "splice each buffered chunk
    /// into the position recorded by a sentinel value"). Never appears in
    /// a fully reassembled packet handed to a dispatch handler.
    Chunk(u8),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            Value::Int(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_chunk(&self) -> Option<u8> {
        match self {
            Value::Chunk(index) => Some(*index),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An ordered sequence of typed values; element 0 is the packet type.
pub type Packet = Vec<Value>;

/// The packet-type identifier carried in element 0, either as the name
/// (before aliases are negotiated) or as the alias integer (after).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    Name(String),
    Alias(u64),
}

impl PacketType {
    pub fn from_value(v: &Value) -> Option<PacketType> {
        match v {
            Value::Str(s) => Some(PacketType::Name(s.clone())),
            Value::UInt(u) => Some(PacketType::Alias(*u)),
            Value::Int(i) if *i >= 0 => Some(PacketType::Alias(*i as u64)),
            _ => None,
        }
    }
}

/// Build a bare packet with a type name and no further elements.
pub fn named_packet(name: &str) -> Packet {
    vec![Value::Str(name.to_string())]
}
