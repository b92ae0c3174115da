//! Bridges between [`crate::packet::Value`] and the dynamic value types of
//! the serde-based encoders (`serde_yaml` for `yaml.rs`, `serde_bencode`
//! for `bencode.rs`).

use crate::packet::Value;
use std::collections::BTreeMap;

/// Neither YAML nor bencode has a native "chunk sentinel" type; both
/// legacy/optional encoders carry it as a single-key map under this marker
/// key instead of inventing a new wire primitive for them.
const CHUNK_MARKER_KEY: &str = "__xpra_chunk__";

pub fn value_to_yaml(v: &Value) -> serde_yaml::Value {
    match v {
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::UInt(u) => serde_yaml::Value::Number((*u).into()),
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Str(s) => serde_yaml::Value::String(s.clone()),
        // YAML has no native byte-string type; encode as latin1-ish string
        // so every byte round-trips through a single `char`.
        Value::Bytes(b) => serde_yaml::Value::String(bytes_to_string(b)),
        Value::List(l) => serde_yaml::Value::Sequence(l.iter().map(value_to_yaml).collect()),
        Value::Dict(d) => {
            let mut map = serde_yaml::Mapping::new();
            for (k, v) in d {
                map.insert(serde_yaml::Value::String(bytes_to_string(k)), value_to_yaml(v));
            }
            serde_yaml::Value::Mapping(map)
        }
        Value::Chunk(index) => {
            let mut map = serde_yaml::Mapping::new();
            map.insert(
                serde_yaml::Value::String(CHUNK_MARKER_KEY.to_string()),
                serde_yaml::Value::Number((*index).into()),
            );
            serde_yaml::Value::Mapping(map)
        }
    }
}

pub fn yaml_to_value(v: &serde_yaml::Value) -> Option<Value> {
    Some(match v {
        serde_yaml::Value::Null => Value::Bytes(Vec::new()),
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                return None;
            }
        }
        serde_yaml::Value::String(s) => Value::Bytes(string_to_bytes(s)),
        serde_yaml::Value::Sequence(seq) => Value::List(seq.iter().filter_map(yaml_to_value).collect()),
        serde_yaml::Value::Mapping(map) => {
            if map.len() == 1 {
                if let Some(serde_yaml::Value::Number(n)) =
                    map.get(&serde_yaml::Value::String(CHUNK_MARKER_KEY.to_string()))
                {
                    if let Some(index) = n.as_u64() {
                        return Some(Value::Chunk(index as u8));
                    }
                }
            }
            let mut d = BTreeMap::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => string_to_bytes(s),
                    _ => continue,
                };
                if let Some(val) = yaml_to_value(v) {
                    d.insert(key, val);
                }
            }
            Value::Dict(d)
        }
        serde_yaml::Value::Tagged(t) => return yaml_to_value(&t.value),
    })
}

pub fn value_to_bencode(v: &Value) -> serde_bencode::value::Value {
    use serde_bencode::value::Value as B;
    match v {
        Value::Int(i) => B::Int(*i),
        Value::UInt(u) => B::Int(*u as i64),
        Value::Bool(b) => B::Int(if *b { 1 } else { 0 }),
        Value::Str(s) => B::Bytes(s.as_bytes().to_vec()),
        Value::Bytes(b) => B::Bytes(b.clone()),
        Value::List(l) => B::List(l.iter().map(value_to_bencode).collect()),
        Value::Dict(d) => B::Dict(d.iter().map(|(k, v)| (k.clone(), value_to_bencode(v))).collect()),
        Value::Chunk(index) => B::Dict(vec![(CHUNK_MARKER_KEY.as_bytes().to_vec(), B::Int(*index as i64))].into_iter().collect()),
    }
}

pub fn bencode_to_value(v: &serde_bencode::value::Value) -> Value {
    use serde_bencode::value::Value as B;
    match v {
        B::Int(i) => Value::Int(*i),
        B::Bytes(b) => Value::Bytes(b.clone()),
        B::List(l) => Value::List(l.iter().map(bencode_to_value).collect()),
        B::Dict(d) => {
            if d.len() == 1 {
                if let Some(B::Int(index)) = d.get(CHUNK_MARKER_KEY.as_bytes()) {
                    return Value::Chunk(*index as u8);
                }
            }
            Value::Dict(d.iter().map(|(k, v)| (k.clone(), bencode_to_value(v))).collect())
        }
    }
}

/// Every byte round-trips through exactly one `char` in `0..=255`, avoiding
/// any UTF-8 validity assumption about wire byte strings.
fn bytes_to_string(b: &[u8]) -> String {
    b.iter().map(|&byte| byte as char).collect()
}

fn string_to_bytes(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u32 as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_string_round_trips_through_char_encoding() {
        let original: Vec<u8> = (0..=255).collect();
        let s = bytes_to_string(&original);
        let back = string_to_bytes(&s);
        assert_eq!(back, original);
    }
}
