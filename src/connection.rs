//! Connection descriptors and endpoint addressing (spec.md §6).
//!
//! Grounded on `examples/original_source/src/xpra/scripts/fdproxy.py`'s
//! notion of a connection as "two Rust-facing ends joined by a copy loop"
//! and generalizes xpra's `dotxpra.py` socket-type enumeration (tcp, ssl,
//! ws, wss, ssh, vsock, unix socket, named pipe) into a typed enum rather
//! than the original's path-naming convention.

use std::fmt;

/// The transport a [`Connection`] is carried over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketType {
    Tcp,
    Ssl,
    Ws,
    Wss,
    Ssh,
    Vsock,
    Unix,
    NamedPipe,
    /// Present in the original's socket-type enumeration but out of scope
    /// for this core's reliable, ordered framing (spec.md Non-goals).
    Udp,
}

impl SocketType {
    pub fn name(self) -> &'static str {
        match self {
            SocketType::Tcp => "tcp",
            SocketType::Ssl => "ssl",
            SocketType::Ws => "ws",
            SocketType::Wss => "wss",
            SocketType::Ssh => "ssh",
            SocketType::Vsock => "vsock",
            SocketType::Unix => "unix",
            SocketType::NamedPipe => "namedpipe",
            SocketType::Udp => "udp",
        }
    }

    /// Whether a connection of this type may receive an in-band upgrade
    /// (spec.md §4.7): plain tcp can become ssl or ws/wss.
    pub fn is_upgradable(self) -> bool {
        matches!(self, SocketType::Tcp | SocketType::Ws)
    }

    /// The xpra default port for network socket types, if any.
    pub fn default_port(self) -> Option<u16> {
        match self {
            SocketType::Tcp => Some(14500),
            SocketType::Ssl => Some(14501),
            SocketType::Ws => Some(14502),
            SocketType::Wss => Some(14503),
            SocketType::Ssh => Some(22),
            _ => None,
        }
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a connection's far end lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Network { host: String, port: u16 },
    Path(std::path::PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Network { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// A connection descriptor the embedder hands to the protocol engine; this
/// core never opens sockets itself, it only describes what was opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub socket_type: SocketType,
    pub endpoint: Endpoint,
    pub options: Vec<(String, String)>,
}

impl Connection {
    pub fn new(socket_type: SocketType, endpoint: Endpoint) -> Self {
        Connection {
            socket_type,
            endpoint,
            options: Vec::new(),
        }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.socket_type, self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgradable_types_match_spec() {
        assert!(SocketType::Tcp.is_upgradable());
        assert!(SocketType::Ws.is_upgradable());
        assert!(!SocketType::Unix.is_upgradable());
        assert!(!SocketType::Udp.is_upgradable());
    }

    #[test]
    fn display_formats_as_scheme_and_endpoint() {
        let c = Connection::new(
            SocketType::Tcp,
            Endpoint::Network {
                host: "example.test".into(),
                port: 14500,
            },
        );
        assert_eq!(c.to_string(), "tcp://example.test:14500");
    }

    #[test]
    fn options_round_trip() {
        let c = Connection::new(SocketType::Unix, Endpoint::Path("/tmp/xpra.sock".into()))
            .with_option("keydata", "secret");
        assert_eq!(c.option("keydata"), Some("secret"));
        assert_eq!(c.option("missing"), None);
    }
}
