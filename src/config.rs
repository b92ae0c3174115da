//! Ambient configuration structs (this core's SPEC_FULL.md §1.3).
//!
//! These are plain, embedder-constructed structs: this crate never parses
//! CLI arguments or config files, matching spec.md's explicit non-goal of
//! "CLI arg parsing / config loading". Every field documents the default an
//! embedder gets from `Default::default()`.

use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::{CipherMode, KeyHash, Padding};

/// TLS upgrade settings (spec.md §4.7).
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: Option<PathBuf>,
    pub require_client_cert: bool,
}

/// Encryption settings negotiated during `hello` (spec.md §4.3).
#[derive(Clone, Debug)]
pub struct EncryptionConfig {
    pub cipher_mode: CipherMode,
    pub padding: Padding,
    pub key_hash: KeyHash,
    pub key_size: usize,
    pub iterations: u32,
    pub keyfile: Option<PathBuf>,
    pub keydata: Option<String>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            cipher_mode: CipherMode::Cbc,
            padding: Padding::Pkcs7,
            key_hash: KeyHash::Sha256,
            key_size: 32,
            iterations: crate::crypto::DEFAULT_ITERATIONS,
            keyfile: None,
            keydata: None,
        }
    }
}

/// Socket-level defaults (spec.md §6).
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// Soft per-packet size threshold outside the large-packet whitelist.
    pub large_packet_threshold: usize,
    /// Hard cap enforced by the header layer regardless of whitelist.
    pub max_payload_len: u32,
    pub handshake_timeout: Duration,
    pub challenge_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Packet-type names allowed to exceed `large_packet_threshold` without
    /// a logged warning (spec.md §4.4).
    pub large_packet_whitelist: Vec<String>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            large_packet_threshold: 256 * 1024,
            max_payload_len: crate::header::MAX_PAYLOAD_LEN,
            handshake_timeout: Duration::from_secs(20),
            challenge_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(1),
            large_packet_whitelist: vec![
                "draw".to_string(),
                "cursor".to_string(),
                "window-icon".to_string(),
                "send-file".to_string(),
            ],
        }
    }
}

/// Top-level configuration an embedder assembles before constructing a
/// [`crate::protocol::Protocol`].
#[derive(Clone, Debug, Default)]
pub struct CoreConfig {
    pub socket: SocketConfig,
    pub tls: Option<TlsConfig>,
    pub encryption: Option<EncryptionConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_defaults_match_documented_constants() {
        let cfg = SocketConfig::default();
        assert_eq!(cfg.large_packet_threshold, 256 * 1024);
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(20));
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(1));
    }

    #[test]
    fn encryption_defaults_are_in_valid_iteration_range() {
        let cfg = EncryptionConfig::default();
        assert!(cfg.iterations >= crate::crypto::MIN_ITERATIONS);
        assert!(cfg.iterations <= crate::crypto::MAX_ITERATIONS);
    }
}
