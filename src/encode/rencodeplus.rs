//! The mandatory `rencodeplus` packet encoder (spec.md §4.2).
//!
//! A compact, binary-safe TLV format: every value is a one-byte type tag
//! followed by a LEB128-varint length (for variable-length types) and its
//! payload. Chosen as the default encoder for its low per-value overhead
//! relative to [`super::rencode`]'s fixed-width lengths.

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

fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| super::invalid("truncated varint"))?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(super::invalid("varint too long"));
        }
    }
}

fn write_value(out: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Int(i) => {
            out.push(TAG_INT);
            write_varint(out, zigzag_encode(*i));
        }
        Value::UInt(u) => {
            out.push(TAG_UINT);
            write_varint(out, *u);
        }
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(if *b { 1 } else { 0 });
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            write_varint(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            write_varint(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            write_varint(out, items.len() as u64);
            for item in items {
                write_value(out, item);
            }
        }
        Value::Dict(map) => {
            out.push(TAG_DICT);
            write_varint(out, map.len() as u64);
            for (k, v) in map {
                write_varint(out, k.len() as u64);
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
        TAG_INT => Value::Int(zigzag_decode(read_varint(data, pos)?)),
        TAG_UINT => Value::UInt(read_varint(data, pos)?),
        TAG_BOOL => {
            let b = *data.get(*pos).ok_or_else(|| super::invalid("truncated bool"))?;
            *pos += 1;
            Value::Bool(b != 0)
        }
        TAG_STR => {
            let len = read_varint(data, pos)? as usize;
            let bytes = take(data, pos, len)?;
            Value::Str(String::from_utf8(bytes.to_vec()).map_err(|e| super::invalid(format!("non-utf8 string: {e}")))?)
        }
        TAG_BYTES => {
            let len = read_varint(data, pos)? as usize;
            Value::Bytes(take(data, pos, len)?.to_vec())
        }
        TAG_LIST => {
            let count = read_varint(data, pos)?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_value(data, pos)?);
            }
            Value::List(items)
        }
        TAG_DICT => {
            let count = read_varint(data, pos)?;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let klen = read_varint(data, pos)? as usize;
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
        other => return Err(super::invalid(format!("unknown rencodeplus tag {other}"))),
    })
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).ok_or_else(|| super::invalid("length overflow"))?;
    let slice = data.get(*pos..end).ok_or_else(|| super::invalid("truncated value payload"))?;
    *pos = end;
    Ok(slice)
}

fn zigzag_encode(i: i64) -> u64 {
    ((i << 1) ^ (i >> 63)) as u64
}

fn zigzag_decode(u: u64) -> i64 {
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_varint(&mut out, packet.len() as u64);
    for v in packet {
        write_value(&mut out, v);
    }
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<Packet> {
    let mut pos = 0usize;
    let count = read_varint(data, &mut pos)?;
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
        dict.insert(b"x".to_vec(), Value::Int(-1));
        let packet: Packet = vec![
            Value::Str("hello".into()),
            Value::Int(i64::MIN),
            Value::UInt(u64::MAX),
            Value::Bool(false),
            Value::Bytes(vec![0, 255, 128]),
            Value::List(vec![Value::Int(1), Value::Int(2)]),
            Value::Dict(dict),
        ];
        let encoded = encode(&packet).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn binary_safe_for_arbitrary_byte_strings() {
        let raw: Vec<u8> = (0u8..=255).collect();
        let packet: Packet = vec![Value::Bytes(raw.clone())];
        let encoded = encode(&packet).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded[0].as_bytes(), Some(raw.as_slice()));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let packet: Packet = vec![Value::Str("abc".into())];
        let mut encoded = encode(&packet).unwrap();
        encoded.truncate(encoded.len() - 1);
        assert!(decode(&encoded).is_err());
    }
}
