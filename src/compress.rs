//! Compression layer (spec.md §4.2).
//!
//! Grounded on the teacher's `compress.rs` (a thin wrapper pair around one
//! compression backend) and on
//! `examples/original_source/src/xpra/net/compression.py`, which probes
//! each backend at runtime and keeps a fixed preference order (`lz4 > lzo >
//! zlib`, with brotli as a fourth, less preferred algorithm this core also
//! supports). Payloads under 256 bytes bypass compression entirely,
//! matching the original's inlining threshold.

use crate::error::{ProtocolError, Result};
use crate::header::CompressionAlgo;
use std::io::{Read, Write};

/// Payloads smaller than this are sent raw regardless of negotiated codecs.
pub const MIN_COMPRESS_SIZE: usize = 256;

/// Preference order used when both sides have more than one compressor in
/// common (xpra/original_source/src/xpra/net/compression.py: PERFORMANCE_ORDER).
pub const PERFORMANCE_ORDER: [CompressionAlgo; 4] = [
    CompressionAlgo::Lz4,
    CompressionAlgo::Lzo,
    CompressionAlgo::Zlib,
    CompressionAlgo::Brotli,
];

/// Which compressors this build can operate regardless of negotiation.
/// `lzo` is compiled in only when the `lzo` cargo feature is enabled,
/// mirroring the original's `try: import lzo / except: has_lzo = False`.
pub fn locally_available() -> Vec<CompressionAlgo> {
    let mut v = vec![CompressionAlgo::Zlib, CompressionAlgo::Lz4, CompressionAlgo::Brotli];
    if cfg!(feature = "lzo") {
        v.push(CompressionAlgo::Lzo);
    }
    v
}

pub fn algo_name(algo: CompressionAlgo) -> &'static str {
    algo.name()
}

pub fn name_to_algo(name: &str) -> Option<CompressionAlgo> {
    match name {
        "zlib" => Some(CompressionAlgo::Zlib),
        "lz4" => Some(CompressionAlgo::Lz4),
        "lzo" => Some(CompressionAlgo::Lzo),
        "brotli" => Some(CompressionAlgo::Brotli),
        "none" => Some(CompressionAlgo::None),
        _ => None,
    }
}

/// Picks the first algorithm from [`PERFORMANCE_ORDER`] enabled on both
/// sides, given the peer's advertised `compressors` capability list.
///
/// Returns `None` if the intersection is empty, which the caller (capability
/// negotiation, spec.md §4.2/§9 "sanity_checks()") should treat as "send
/// everything uncompressed" plus a logged warning, never a hard failure.
pub fn negotiate(peer_compressors: &[String]) -> Option<CompressionAlgo> {
    let local = locally_available();
    PERFORMANCE_ORDER
        .into_iter()
        .find(|algo| local.contains(algo) && peer_compressors.iter().any(|n| n == algo.name()))
}

/// Compresses `data` at `level` (1-9) with `algo`, returning the raw
/// compressed bytes. Callers under [`MIN_COMPRESS_SIZE`] should skip this
/// and use [`CompressionAlgo::None`] directly.
pub fn compress(algo: CompressionAlgo, data: &[u8], level: u8) -> Result<Vec<u8>> {
    let level = level.clamp(1, 9);
    match algo {
        CompressionAlgo::None => Ok(data.to_vec()),
        CompressionAlgo::Zlib => {
            let mut enc =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level as u32));
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        CompressionAlgo::Lz4 => Ok(lz4_flex::block::compress_prepend_size(data)),
        CompressionAlgo::Brotli => {
            let mut out = Vec::new();
            let params = brotli::enc::BrotliEncoderParams {
                quality: level as i32,
                ..Default::default()
            };
            brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut out, &params)
                .map_err(|e| ProtocolError::Internal(format!("brotli compress failed: {e}")))?;
            Ok(out)
        }
        CompressionAlgo::Lzo => lzo_compress(data, level),
    }
}

/// Decompresses `data` assuming it was produced by `algo`. An algorithm the
/// local side has disabled at compile time is a fatal protocol error
/// (spec.md §4.2: "treated as a fatal protocol error").
pub fn decompress(algo: CompressionAlgo, data: &[u8]) -> Result<Vec<u8>> {
    if !locally_available().contains(&algo) && algo != CompressionAlgo::None {
        return Err(ProtocolError::Unsupported(format!(
            "compressor {} is not enabled on this side",
            algo.name()
        )));
    }
    match algo {
        CompressionAlgo::None => Ok(data.to_vec()),
        CompressionAlgo::Zlib => {
            let mut dec = flate2::read::ZlibDecoder::new(data);
            let mut out = Vec::new();
            dec.read_to_end(&mut out)
                .map_err(|e| ProtocolError::Invalid(format!("zlib decompress failed: {e}")))?;
            Ok(out)
        }
        CompressionAlgo::Lz4 => lz4_flex::block::decompress_size_prepended(data)
            .map_err(|e| ProtocolError::Invalid(format!("lz4 decompress failed: {e}"))),
        CompressionAlgo::Brotli => {
            let mut out = Vec::new();
            brotli::BrotliDecompress(&mut std::io::Cursor::new(data), &mut out)
                .map_err(|e| ProtocolError::Invalid(format!("brotli decompress failed: {e}")))?;
            Ok(out)
        }
        CompressionAlgo::Lzo => lzo_decompress(data),
    }
}

#[cfg(feature = "lzo")]
fn lzo_compress(data: &[u8], _level: u8) -> Result<Vec<u8>> {
    minilzo_rs::LZO::init()
        .and_then(|lzo| lzo.compress(data))
        .map_err(|e| ProtocolError::Internal(format!("lzo compress failed: {e:?}")))
}

#[cfg(feature = "lzo")]
fn lzo_decompress(data: &[u8]) -> Result<Vec<u8>> {
    minilzo_rs::LZO::init()
        .and_then(|lzo| lzo.decompress(data, data.len() * 16))
        .map_err(|e| ProtocolError::Invalid(format!("lzo decompress failed: {e:?}")))
}

#[cfg(not(feature = "lzo"))]
fn lzo_compress(_data: &[u8], _level: u8) -> Result<Vec<u8>> {
    Err(ProtocolError::Unsupported("lzo is not compiled in".into()))
}

#[cfg(not(feature = "lzo"))]
fn lzo_decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(ProtocolError::Unsupported("lzo is not compiled in".into()))
}
