//! The error taxonomy from spec.md §7: kinds, not exception hierarchies.
//!
//! Every fallible core operation returns a [`ProtocolError`]; the variant
//! names match the §7 table so an embedder can map straight from error kind
//! to exit behavior / user-visible reason string.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection-failed: {0}")]
    ConnectionFailed(String),

    #[error("connection-lost")]
    ConnectionLost,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("authentication-failed: {0}")]
    AuthenticationFailed(String),

    #[error("password-required")]
    PasswordRequired,

    #[error("no-authentication")]
    NoAuthentication,

    #[error("encryption: {0}")]
    Encryption(String),

    #[error("incompatible-version: {0}")]
    IncompatibleVersion(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("packet-failure: {0}")]
    PacketFailure(String),

    #[error("internal-error: {0}")]
    Internal(String),

    #[error("upgrade: {0}")]
    Upgrade(String),

    /// Invalid header: magic byte mismatch or an unparsable flags/compression
    /// byte. Callers turn this into a `gibberish` internal packet.
    #[error("gibberish: {0}")]
    Gibberish(String),

    /// Valid header but payload exceeds [`crate::header::MAX_PAYLOAD_LEN`].
    #[error("payload-too-large: {0} bytes")]
    PayloadTooLarge(u32),

    /// Valid header but decode/decompress/decrypt of the payload failed.
    /// Callers turn this into an `invalid` internal packet.
    #[error("invalid packet: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// The disconnect/quit reason string an embedder would surface, matching
    /// the kind names in spec.md §7.
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::ConnectionFailed(_) => "connection-failed",
            ProtocolError::ConnectionLost => "connection-lost",
            ProtocolError::Timeout(_) => "timeout",
            ProtocolError::AuthenticationFailed(_) => "authentication-failed",
            ProtocolError::PasswordRequired => "password-required",
            ProtocolError::NoAuthentication => "no-authentication",
            ProtocolError::Encryption(_) => "encryption",
            ProtocolError::IncompatibleVersion(_) => "incompatible-version",
            ProtocolError::Unsupported(_) => "unsupported",
            ProtocolError::PacketFailure(_) => "packet-failure",
            ProtocolError::Internal(_) => "internal-error",
            ProtocolError::Upgrade(_) => "upgrade",
            ProtocolError::Gibberish(_) => "connection-failed",
            ProtocolError::PayloadTooLarge(_) => "packet-failure",
            ProtocolError::Invalid(_) => "packet-failure",
            ProtocolError::Io(_) => "connection-lost",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
