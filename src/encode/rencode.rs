//! The legacy `rencode` packet encoder (spec.md §4.2).
//!
//! Predates [`super::rencodeplus`]: same type-tag scheme, but lengths and
//! counts are fixed-width big-endian `u32` instead of varints. Kept only
//! so newer builds can still talk to peers that never upgraded.

use crate::error::Result;
use crate::packet::{Packet, Value};
use std::collections::BTreeMap;

const TAG_INT: u8 = 1;
const TAG_UINT: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_LIST: u8 = 6;
const TAG_DICT: u8 = 7;
const TAG_CHUNK: u8 = 8;

fn write_u32(out: &mut Vec<u8>, n: u32) {
    out.extend_from_slice(&n.to_be_bytes());
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes = take(data, pos, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn write_value(out: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_be_bytes());
        }
        Value::UInt(u) => {
            out.push(TAG_UINT);
            out.extend_from_slice(&u.to_be_bytes());
        }
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(if *b { 1 } else { 0 });
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            write_u32(out, s.len() as u32);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            write_u32(out, b.len() as u32);
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            write_u32(out, items.len() as u32);
            for item in items {
                write_value(out, item);
            }
        }
        Value::Dict(map) => {
            out.push(TAG_DICT);
            write_u32(out, map.len() as u32);
            for (k, v) in map {
                write_u32(out, k.len() as u32);
                out.extend_from_slice(k);
                write_value(out, v);
            }
        }
        Value::Chunk(index) => {
            out.push(TAG_CHUNK);
            out.push(*index);
        }
    }
}

fn read_value(data: &[u8], pos: &mut usize) -> Result<Value> {
    let tag = *data.get(*pos).ok_or_else(|| super::invalid("truncated value tag"))?;
    *pos += 1;
    Ok(match tag {
        TAG_INT => {
            let bytes = take(data, pos, 8)?;
            Value::Int(i64::from_be_bytes(bytes.try_into().unwrap()))
        }
        TAG_UINT => {
            let bytes = take(data, pos, 8)?;
            Value::UInt(u64::from_be_bytes(bytes.try_into().unwrap()))
        }
        TAG_BOOL => {
            let b = *data.get(*pos).ok_or_else(|| super::invalid("truncated bool"))?;
            *pos += 1;
            Value::Bool(b != 0)
        }
        TAG_STR => {
            let len = read_u32(data, pos)? as usize;
            let bytes = take(data, pos, len)?;
            Value::Str(String::from_utf8(bytes.to_vec()).map_err(|e| super::invalid(format!("non-utf8 string: {e}")))?)
        }
        TAG_BYTES => {
            let len = read_u32(data, pos)? as usize;
            Value::Bytes(take(data, pos, len)?.to_vec())
        }
        TAG_LIST => {
            let count = read_u32(data, pos)?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_value(data, pos)?);
            }
            Value::List(items)
        }
        TAG_DICT => {
            let count = read_u32(data, pos)?;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let klen = read_u32(data, pos)? as usize;
                let key = take(data, pos, klen)?.to_vec();
                let value = read_value(data, pos)?;
                map.insert(key, value);
            }
            Value::Dict(map)
        }
        TAG_CHUNK => {
            let index = *data.get(*pos).ok_or_else(|| super::invalid("truncated chunk index"))?;
            *pos += 1;
            Value::Chunk(index)
        }
        other => return Err(super::invalid(format!("unknown rencode tag {other}"))),
    })
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).ok_or_else(|| super::invalid("length overflow"))?;
    let slice = data.get(*pos..end).ok_or_else(|| super::invalid("truncated value payload"))?;
    *pos = end;
    Ok(slice)
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_u32(&mut out, packet.len() as u32);
    for v in packet {
        write_value(&mut out, v);
    }
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<Packet> {
    let mut pos = 0usize;
    let count = read_u32(data, &mut pos)?;
    let mut packet = Vec::with_capacity(count as usize);
    for _ in 0..count {
        packet.push(read_value(data, &mut pos)?);
    }
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_value_kinds() {
        let mut dict = BTreeMap::new();
        dict.insert(b"y".to_vec(), Value::Bool(true));
        let packet: Packet = vec![
            Value::Str("ping".into()),
            Value::Int(-99),
            Value::List(vec![Value::Bytes(vec![1, 2, 3])]),
            Value::Dict(dict),
        ];
        let encoded = encode(&packet).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }
}
