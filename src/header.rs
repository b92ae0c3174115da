//! The 8-byte wire header (spec.md §4.1).
//!
//! ```text
//! byte 0    literal 'P' (0x50)
//! byte 1    flags: bit0 encrypted, bits4-6 encoder id, bit7 cipher-pad
//! byte 2    compression byte: low nibble level, high bits algorithm
//! byte 3    packet index (0 = main body, >0 = raw chunk)
//! byte 4-7  payload length, big-endian u32
//! ```
//!
//! The flag-bit layout in spec.md's table overlaps (encoder id `0x10` for
//! rencodeplus against a documented cipher-pad bit at the same `0x10`);
//! spec.md §9 calls this out explicitly as an ambiguity source
//! implementations must resolve internally rather than guess at. This
//! module resolves it by giving the encoder id its own 3-bit subfield at
//! bits 4-6 and moving cipher padding to bit 7 — see DESIGN.md for the
//! rationale. The literal byte value spec.md §8 scenario 1 pins down
//! (`0x10` for rencodeplus, unencrypted) still holds under this layout.

use crate::encode::Encoder;
use crate::error::ProtocolError;

pub const MAGIC: u8 = b'P';
pub const HEADER_LEN: usize = 8;
pub const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

const FLAG_ENCRYPTED: u8 = 0x01;
const FLAG_CIPHER_PAD: u8 = 0x80;
const ENCODER_MASK: u8 = 0x70;
const ENCODER_SHIFT: u8 = 4;

const COMP_LEVEL_MASK: u8 = 0x0f;
const COMP_LZO: u8 = 0x20;
const COMP_LZ4: u8 = 0x40;
const COMP_BROTLI: u8 = 0x80;

/// Which compression algorithm (if any) a frame's compression byte names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionAlgo {
    None,
    Zlib,
    Lz4,
    Lzo,
    Brotli,
}

impl CompressionAlgo {
    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgo::None => "none",
            CompressionAlgo::Zlib => "zlib",
            CompressionAlgo::Lz4 => "lz4",
            CompressionAlgo::Lzo => "lzo",
            CompressionAlgo::Brotli => "brotli",
        }
    }
}

/// Decoded form of the compression byte (byte 2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionByte {
    pub algo: CompressionAlgo,
    pub level: u8,
}

impl CompressionByte {
    pub fn none() -> Self {
        CompressionByte {
            algo: CompressionAlgo::None,
            level: 0,
        }
    }

    pub fn encode(self) -> u8 {
        let level = self.level & COMP_LEVEL_MASK;
        match self.algo {
            CompressionAlgo::None => 0,
            CompressionAlgo::Zlib => level.max(1),
            CompressionAlgo::Lz4 => COMP_LZ4 | level,
            CompressionAlgo::Lzo => COMP_LZO | level,
            CompressionAlgo::Brotli => COMP_BROTLI | level,
        }
    }

    pub fn decode(byte: u8) -> Self {
        let level = byte & COMP_LEVEL_MASK;
        let algo = if byte & COMP_LZ4 != 0 {
            CompressionAlgo::Lz4
        } else if byte & COMP_LZO != 0 {
            CompressionAlgo::Lzo
        } else if byte & COMP_BROTLI != 0 {
            CompressionAlgo::Brotli
        } else if level > 0 {
            CompressionAlgo::Zlib
        } else {
            CompressionAlgo::None
        };
        CompressionByte { algo, level }
    }
}

/// Decoded form of the flags byte (byte 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flags {
    pub encrypted: bool,
    pub cipher_padded: bool,
    pub encoder: Encoder,
}

impl Flags {
    pub fn encode(self) -> u8 {
        let mut b = (self.encoder.id() << ENCODER_SHIFT) & ENCODER_MASK;
        if self.encrypted {
            b |= FLAG_ENCRYPTED;
        }
        if self.cipher_padded {
            b |= FLAG_CIPHER_PAD;
        }
        b
    }

    pub fn decode(byte: u8) -> Result<Self, ProtocolError> {
        let encoder_id = (byte & ENCODER_MASK) >> ENCODER_SHIFT;
        let encoder = Encoder::from_id(encoder_id)
            .ok_or_else(|| ProtocolError::Gibberish(format!("unknown encoder id {encoder_id}")))?;
        Ok(Flags {
            encrypted: byte & FLAG_ENCRYPTED != 0,
            cipher_padded: byte & FLAG_CIPHER_PAD != 0,
            encoder,
        })
    }
}

/// A fully decoded 8-byte wire header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub flags: Flags,
    pub compression: CompressionByte,
    pub index: u8,
    pub length: u32,
}

impl Header {
    pub fn pack(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = MAGIC;
        out[1] = self.flags.encode();
        out[2] = self.compression.encode();
        out[3] = self.index;
        out[4..8].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn unpack(bytes: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        if bytes[0] != MAGIC {
            return Err(ProtocolError::Gibberish(format!(
                "bad magic byte {:#x}, expected {:#x}",
                bytes[0], MAGIC
            )));
        }
        let flags = Flags::decode(bytes[1])?;
        let compression = CompressionByte::decode(bytes[2]);
        let index = bytes[3];
        let length = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if length > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(length));
        }
        Ok(Header {
            flags,
            compression,
            index,
            length,
        })
    }
}

/// Scans a byte stream for a plausible header, for transports (e.g. ssh)
/// that may prepend unrelated banner bytes before the real protocol starts.
/// Disabled after the first successful packet (spec.md §4.1).
pub fn find_header(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    for start in 0..=(buf.len() - HEADER_LEN) {
        if buf[start] != MAGIC {
            continue;
        }
        let window: [u8; HEADER_LEN] = buf[start..start + HEADER_LEN].try_into().ok()?;
        if Header::unpack(&window).is_ok() {
            return Some(start);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rencodeplus_unencrypted_header_is_0x10() {
        let h = Header {
            flags: Flags {
                encrypted: false,
                cipher_padded: false,
                encoder: Encoder::RencodePlus,
            },
            compression: CompressionByte::none(),
            index: 0,
            length: 0,
        };
        let packed = h.pack();
        assert_eq!(packed[0], MAGIC);
        assert_eq!(packed[1], 0x10);
        assert_eq!(packed[2], 0);
        assert_eq!(packed[3], 0);
    }

    #[test]
    fn header_round_trips() {
        let h = Header {
            flags: Flags {
                encrypted: true,
                cipher_padded: true,
                encoder: Encoder::Bencode,
            },
            compression: CompressionByte {
                algo: CompressionAlgo::Lz4,
                level: 6,
            },
            index: 3,
            length: 123456,
        };
        let packed = h.pack();
        let back = Header::unpack(&packed).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn oversize_length_is_rejected() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = MAGIC;
        bytes[4..8].copy_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
        let err = Header::unpack(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge(_)));
    }

    #[test]
    fn find_header_skips_banner_bytes() {
        let mut buf = b"SSH-2.0-OpenSSH_banner\r\n".to_vec();
        let h = Header {
            flags: Flags {
                encrypted: false,
                cipher_padded: false,
                encoder: Encoder::RencodePlus,
            },
            compression: CompressionByte::none(),
            index: 0,
            length: 5,
        };
        buf.extend_from_slice(&h.pack());
        buf.extend_from_slice(b"hello");
        let pos = find_header(&buf).unwrap();
        assert_eq!(pos, 24);
    }
}
