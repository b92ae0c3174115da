//! The optional `yaml` packet encoder (spec.md §4.2).
//!
//! Kept for interoperability with very old peers only; never selected by
//! [`super::negotiate`] when anything else is available.

use super::value::{value_to_yaml, yaml_to_value};
use crate::error::Result;
use crate::packet::{Packet, Value};

pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let seq = serde_yaml::Value::Sequence(packet.iter().map(value_to_yaml).collect());
    serde_yaml::to_string(&seq)
        .map(|s| s.into_bytes())
        .map_err(|e| super::invalid(format!("yaml encode failed: {e}")))
}

pub fn decode(data: &[u8]) -> Result<Packet> {
    let text = std::str::from_utf8(data).map_err(|e| super::invalid(format!("yaml payload not utf-8: {e}")))?;
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| super::invalid(format!("yaml decode failed: {e}")))?;
    match parsed {
        serde_yaml::Value::Sequence(seq) => Ok(seq
            .iter()
            .map(|v| yaml_to_value(v).unwrap_or(Value::Bool(false)))
            .collect()),
        other => yaml_to_value(&other)
            .map(|v| vec![v])
            .ok_or_else(|| super::invalid("yaml payload is not a packet sequence")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Value;

    #[test]
    fn yaml_round_trips_mixed_packet() {
        let packet: Packet = vec![
            Value::Str("hello".into()),
            Value::Int(-7),
            Value::UInt(42),
            Value::Bool(true),
            Value::Bytes(vec![0, 1, 2, 255]),
        ];
        let encoded = encode(&packet).unwrap();
        let decoded = decode(&encoded).unwrap();
        // YAML has no distinct byte-string type, so strings and byte
        // strings both come back as `Value::Bytes`.
        assert_eq!(decoded[0].as_bytes(), Some(b"hello".as_slice()));
        assert_eq!(decoded[1].as_int(), Some(-7));
        assert_eq!(decoded[3].as_bool(), Some(true));
        assert_eq!(decoded[4].as_bytes(), Some([0u8, 1, 2, 255].as_slice()));
    }
}
