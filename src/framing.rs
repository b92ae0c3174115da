//! Framing: combines [`crate::header`], [`crate::compress`],
//! [`crate::crypto`], and [`crate::encode`] into the single pack/unpack
//! contract the protocol engine's read and write loops use (spec.md §4.1).

use crate::compress;
use crate::crypto::CipherState;
use crate::encode::Encoder;
use crate::error::{ProtocolError, Result};
use crate::header::{CompressionAlgo, CompressionByte, Flags, Header, HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::packet::{Packet, Value};
use std::collections::HashMap;

/// Byte strings at or above this size are pulled out of the main body and
/// sent as their own raw-chunk frame instead of being inlined through the
/// packet encoder (spec.md §3/§4.4). Not pinned by spec; picked to keep
/// small control-packet payloads (capabilities, acks) inline while sparing
/// bulk data (pixel buffers, file transfers) the per-value encoder overhead.
pub const RAW_CHUNK_THRESHOLD: usize = 64 * 1024;

/// Packs a packet into one or more wire frames: the main body at index 0,
/// plus one raw-chunk frame per [`Value::Bytes`] at or above
/// [`RAW_CHUNK_THRESHOLD`], each referenced from the main body by a
/// [`Value::Chunk`] sentinel (spec.md §3, §4.4). Concatenate the result
/// directly onto the wire; frame boundaries are self-describing via the
/// header length field.
pub fn pack_frame(
    packet: &Packet,
    encoder: Encoder,
    compression: Option<(CompressionAlgo, u8)>,
    cipher: Option<&CipherState>,
) -> Result<Vec<u8>> {
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let sentineled: Packet = packet.iter().map(|v| extract_chunks(v, &mut chunks)).collect();

    // Raw chunks go out ahead of the main body: the reader only learns
    // which chunk index a sentinel points at once it decodes the index-0
    // frame, so every referenced chunk must already be buffered by then.
    let mut out = Vec::new();
    for (i, raw) in chunks.into_iter().enumerate() {
        let index = (i + 1) as u8;
        out.extend_from_slice(&pack_raw_chunk_frame(index, &raw, encoder, compression, cipher)?);
    }
    out.extend_from_slice(&pack_single_frame(&sentineled, encoder, 0, compression, cipher)?);
    Ok(out)
}

/// Walks `value` replacing any oversized [`Value::Bytes`] with a
/// [`Value::Chunk`] sentinel, appending the extracted bytes to `chunks` in
/// wire order (sentinel index == 1-based position in `chunks`).
fn extract_chunks(value: &Value, chunks: &mut Vec<Vec<u8>>) -> Value {
    match value {
        Value::Bytes(b) if b.len() >= RAW_CHUNK_THRESHOLD => {
            chunks.push(b.clone());
            Value::Chunk(chunks.len() as u8)
        }
        Value::List(items) => Value::List(items.iter().map(|v| extract_chunks(v, chunks)).collect()),
        Value::Dict(map) => Value::Dict(map.iter().map(|(k, v)| (k.clone(), extract_chunks(v, chunks))).collect()),
        other => other.clone(),
    }
}

fn pack_single_frame(
    packet: &Packet,
    encoder: Encoder,
    index: u8,
    compression: Option<(CompressionAlgo, u8)>,
    cipher: Option<&CipherState>,
) -> Result<Vec<u8>> {
    let encoded = encoder.encode(packet)?;
    pack_payload(&encoded, encoder, index, compression, cipher)
}

/// Packs a single raw-chunk frame: the chunk's bytes go straight through
/// compression/encryption with no packet encoding step, since a raw chunk
/// is already the value the main body's sentinel points at, not a packet.
fn pack_raw_chunk_frame(
    index: u8,
    raw: &[u8],
    encoder: Encoder,
    compression: Option<(CompressionAlgo, u8)>,
    cipher: Option<&CipherState>,
) -> Result<Vec<u8>> {
    pack_payload(raw, encoder, index, compression, cipher)
}

fn pack_payload(
    encoded: &[u8],
    encoder: Encoder,
    index: u8,
    compression: Option<(CompressionAlgo, u8)>,
    cipher: Option<&CipherState>,
) -> Result<Vec<u8>> {
    let (compression_byte, mut payload) = match compression {
        Some((algo, level)) if encoded.len() >= compress::MIN_COMPRESS_SIZE => {
            (CompressionByte { algo, level }, compress::compress(algo, encoded, level)?)
        }
        _ => (CompressionByte::none(), encoded.to_vec()),
    };

    let mut cipher_padded = false;
    if let Some(cipher) = cipher {
        if cipher.mode == crate::crypto::CipherMode::Cbc && payload.len() % 16 != 0 {
            cipher_padded = true;
        }
        payload = cipher.encrypt(&payload)?;
    }

    if payload.len() as u64 > MAX_PAYLOAD_LEN as u64 {
        return Err(ProtocolError::PayloadTooLarge(payload.len() as u32));
    }

    let header = Header {
        flags: Flags {
            encrypted: cipher.is_some(),
            cipher_padded,
            encoder,
        },
        compression: compression_byte,
        index,
        length: payload.len() as u32,
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.pack());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Splices previously buffered raw chunks into `packet`'s decoded
/// structure wherever a [`Value::Chunk`] sentinel was left by the sender
/// (spec.md §4.4: "splice each buffered chunk into the position recorded
/// by a sentinel value"). `chunks` is keyed by the 1-based index the
/// sentinel carries.
pub fn splice_chunks(packet: Packet, chunks: &HashMap<u8, Vec<u8>>) -> Result<Packet> {
    packet.into_iter().map(|v| splice_value(v, chunks)).collect()
}

fn splice_value(value: Value, chunks: &HashMap<u8, Vec<u8>>) -> Result<Value> {
    Ok(match value {
        Value::Chunk(index) => {
            let raw = chunks
                .get(&index)
                .ok_or_else(|| ProtocolError::Invalid(format!("main body references missing chunk {index}")))?;
            Value::Bytes(raw.clone())
        }
        Value::List(items) => {
            let spliced: Result<Vec<Value>> = items.into_iter().map(|v| splice_value(v, chunks)).collect();
            Value::List(spliced?)
        }
        Value::Dict(map) => {
            let mut spliced = std::collections::BTreeMap::new();
            for (k, v) in map {
                spliced.insert(k, splice_value(v, chunks)?);
            }
            Value::Dict(spliced)
        }
        other => other,
    })
}

/// Decrypts and decompresses a frame's payload, without the final
/// packet-decode step. Shared by [`unpack_frame`] (main body, decoded
/// afterwards) and raw-chunk buffering in [`FrameAssembler`] (never
/// decoded, since a raw chunk isn't a packet-encoded value).
fn decrypt_and_decompress(header: &Header, payload: &[u8], cipher: Option<&CipherState>) -> Result<Vec<u8>> {
    let mut data = payload.to_vec();
    if header.flags.encrypted {
        let cipher = cipher.ok_or_else(|| ProtocolError::Encryption("encrypted frame but no cipher configured".into()))?;
        data = cipher.decrypt(&data)?;
    } else if cipher.is_some() && header.flags.cipher_padded {
        return Err(ProtocolError::Invalid("cipher-pad flag set on unencrypted frame".into()));
    }
    compress::decompress(header.compression.algo, &data)
}

/// Reverses [`pack_frame`]'s main-body frame: decrypts, decompresses, then
/// decodes. `cipher` must be `Some` if `header.flags.encrypted` is set.
/// Does not resolve [`Value::Chunk`] sentinels; pair with
/// [`FrameAssembler::try_next`]'s returned chunk map and [`splice_chunks`].
pub fn unpack_frame(header: &Header, payload: &[u8], cipher: Option<&CipherState>) -> Result<Packet> {
    let decompressed = decrypt_and_decompress(header, payload, cipher)?;
    header.flags.encoder.decode(&decompressed)
}

/// Incrementally buffers bytes off the wire and yields whole main-body
/// frames (header, raw payload bytes, fully resolved raw chunks keyed by
/// index) as they become available. Mirrors spec.md §4.1's read-side
/// contract: "parse header, accumulate payload"; raw-chunk frames
/// (`index > 0`) are buffered and decrypted/decompressed internally and
/// never surfaced on their own — only the index-0 frame they precede is.
#[derive(Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    probing: bool,
    chunks: HashMap<u8, Vec<u8>>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        FrameAssembler {
            buf: Vec::new(),
            // The very first frame may be preceded by banner bytes (e.g.
            // an ssh transport); disabled permanently after that.
            probing: true,
            chunks: HashMap::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next main-body frame once it and every raw chunk it
    /// references have arrived, returning `(header, payload, chunks)`.
    /// `cipher` decrypts both the main body and any buffered raw chunks
    /// (same per-direction cipher state applies across one packet's
    /// worth of frames). Returns `Ok(None)` if more bytes are needed.
    pub fn try_next(&mut self, cipher: Option<&CipherState>) -> Result<Option<(Header, Vec<u8>, HashMap<u8, Vec<u8>>)>> {
        loop {
            let Some((header, payload)) = self.pop_one_frame()? else {
                return Ok(None);
            };
            if header.index == 0 {
                let chunks = std::mem::take(&mut self.chunks);
                return Ok(Some((header, payload, chunks)));
            }
            let raw = decrypt_and_decompress(&header, &payload, cipher)?;
            self.chunks.insert(header.index, raw);
        }
    }

    /// Pops one complete frame (whatever its index) if the buffer has
    /// enough bytes, returning `(header, payload)` with payload still
    /// encrypted/compressed exactly as received. Returns `Ok(None)` if
    /// more bytes are needed.
    fn pop_one_frame(&mut self) -> Result<Option<(Header, Vec<u8>)>> {
        if self.probing {
            if let Some(start) = crate::header::find_header(&self.buf) {
                if start > 0 {
                    self.buf.drain(..start);
                }
            } else if self.buf.len() >= HEADER_LEN {
                return Err(ProtocolError::Gibberish(format!(
                    "no valid header found in {} buffered bytes",
                    self.buf.len()
                )));
            } else {
                return Ok(None);
            }
        }

        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let header_bytes: [u8; HEADER_LEN] = self.buf[..HEADER_LEN].try_into().unwrap();
        let header = Header::unpack(&header_bytes)?;
        let total = HEADER_LEN + header.length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let payload = self.buf[HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        self.probing = false;
        Ok(Some((header, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{named_packet, Value};

    #[test]
    fn pack_unpack_round_trips_uncompressed_unencrypted() {
        let packet = named_packet("ping");
        let frame = pack_frame(&packet, Encoder::RencodePlus, None, None).unwrap();
        let header_bytes: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        let header = Header::unpack(&header_bytes).unwrap();
        let payload = &frame[HEADER_LEN..];
        let decoded = unpack_frame(&header, payload, None).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn pack_unpack_round_trips_compressed_large_payload() {
        let mut packet = named_packet("damage");
        packet.push(Value::Bytes(vec![b'x'; 4096]));
        let frame = pack_frame(&packet, Encoder::RencodePlus, Some((CompressionAlgo::Lz4, 1)), None).unwrap();
        let header_bytes: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        let header = Header::unpack(&header_bytes).unwrap();
        assert_eq!(header.compression.algo, CompressionAlgo::Lz4);
        let decoded = unpack_frame(&header, &frame[HEADER_LEN..], None).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn pack_unpack_round_trips_encrypted() {
        use crate::crypto::{derive_key, CipherMode, CipherState, KeyHash, Padding};
        let key = derive_key(b"secret", b"saltsaltsalt1234", 32, KeyHash::Sha256, 1000).unwrap();
        let iv = CipherState::random_iv();
        let cipher = CipherState::new(key, iv, CipherMode::Cbc, Padding::Pkcs7);
        let packet = named_packet("hello");
        let frame = pack_frame(&packet, Encoder::RencodePlus, None, Some(&cipher)).unwrap();
        let header_bytes: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        let header = Header::unpack(&header_bytes).unwrap();
        assert!(header.flags.encrypted);
        let decoded = unpack_frame(&header, &frame[HEADER_LEN..], Some(&cipher)).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn assembler_yields_frame_once_fully_buffered() {
        let packet = named_packet("ping");
        let frame = pack_frame(&packet, Encoder::RencodePlus, None, None).unwrap();
        let mut assembler = FrameAssembler::new();
        assembler.feed(&frame[..HEADER_LEN]);
        assert!(assembler.try_next(None).unwrap().is_none());
        assembler.feed(&frame[HEADER_LEN..]);
        let (header, payload, chunks) = assembler.try_next(None).unwrap().unwrap();
        assert!(chunks.is_empty());
        let decoded = unpack_frame(&header, &payload, None).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn assembler_skips_ssh_banner_once() {
        let packet = named_packet("ping");
        let frame = pack_frame(&packet, Encoder::RencodePlus, None, None).unwrap();
        let mut assembler = FrameAssembler::new();
        let mut stream = b"SSH-2.0-banner\r\n".to_vec();
        stream.extend_from_slice(&frame);
        assembler.feed(&stream);
        let (header, payload, _chunks) = assembler.try_next(None).unwrap().unwrap();
        let decoded = unpack_frame(&header, &payload, None).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn large_payload_is_chunked_and_spliced_back_byte_for_byte() {
        let raw = vec![0xABu8; RAW_CHUNK_THRESHOLD + 17];
        let packet: Packet = vec![Value::Str("damage".to_string()), Value::Bytes(raw.clone())];
        let frame = pack_frame(&packet, Encoder::RencodePlus, None, None).unwrap();

        let mut assembler = FrameAssembler::new();
        assembler.feed(&frame);
        let (header, payload, chunks) = assembler.try_next(None).unwrap().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks.get(&1).unwrap(), &raw);

        let decoded = unpack_frame(&header, &payload, None).unwrap();
        assert_eq!(decoded[1], Value::Chunk(1));
        let spliced = splice_chunks(decoded, &chunks).unwrap();
        assert_eq!(spliced, packet);
    }

    #[test]
    fn payload_over_max_length_is_rejected() {
        use crate::header::MAX_PAYLOAD_LEN;
        let packet: Packet = vec![Value::Str("damage".to_string()), Value::Bytes(vec![0u8; MAX_PAYLOAD_LEN as usize + 1])];
        // Bytes this large are pulled into their own raw-chunk frame, whose
        // payload itself then exceeds the bound and must fail to pack.
        let err = pack_frame(&packet, Encoder::RencodePlus, None, None).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge(_)));
    }
}
