//! Connection upgrades (spec.md §4.7): in-band transitions from plain tcp
//! to TLS, or from tcp/ws to wss, without tearing down the logical session.
//!
//! Grounded on `examples/original_source/src/xpra/scripts/fdproxy.py`'s
//! shape for handing a live socket off between two I/O drivers: stop
//! reading, hand over the raw fd and whatever bytes were already buffered
//! but not yet consumed, then let the new driver take over from there.

use crate::config::TlsConfig;
use crate::connection::SocketType;
use crate::error::{ProtocolError, Result};
use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

/// What `steal_connection()` (spec.md §4.7 step 2) hands back: the raw
/// socket plus any bytes already read off the wire but not yet consumed by
/// the packet layer (e.g. the start of a TLS ClientHello that arrived
/// before the read loop noticed the `ssl-upgrade` packet and stopped).
pub struct StolenConnection {
    pub stream: TcpStream,
    pub buffered: Vec<u8>,
}

/// Whether `socket_type` may receive an `ssl-upgrade` request (spec.md
/// §4.7: "requires current socktype tcp or ws").
pub fn can_upgrade_to_ssl(socket_type: SocketType) -> bool {
    matches!(socket_type, SocketType::Tcp | SocketType::Ws)
}

/// TLS verification options carried by the connection (spec.md §4.7 step 3).
#[derive(Clone, Debug, Default)]
pub struct TlsVerifyOptions {
    pub verify_peer: bool,
    pub ca_certs: Option<std::path::PathBuf>,
    pub check_hostname: bool,
    pub server_hostname: Option<String>,
}

/// Performs the synchronous TLS handshake side of an `ssl-upgrade`
/// (spec.md §4.7 step 3), wrapping a stolen plain-tcp socket.
pub fn upgrade_to_tls_client(
    stolen: StolenConnection,
    config: &rustls::ClientConfig,
    options: &TlsVerifyOptions,
) -> Result<rustls::StreamOwned<rustls::ClientConnection, TcpStream>> {
    let hostname = options
        .server_hostname
        .as_deref()
        .ok_or_else(|| ProtocolError::Upgrade("ssl-upgrade requires a server_hostname".into()))?;
    let server_name = rustls::ServerName::try_from(hostname)
        .map_err(|e| ProtocolError::Upgrade(format!("invalid server_hostname {hostname}: {e}")))?;
    let conn = rustls::ClientConnection::new(Arc::new(config.clone()), server_name)
        .map_err(|e| ProtocolError::Upgrade(format!("tls client init failed: {e}")))?;
    let mut tls = rustls::StreamOwned::new(conn, stolen.stream);
    if !stolen.buffered.is_empty() {
        // Bytes buffered ahead of the TLS handshake are already-received
        // ciphertext, not plaintext to send: feed them into rustls's inbound
        // TLS record reader rather than its outbound `writer()`.
        tls.conn
            .read_tls(&mut &stolen.buffered[..])
            .map_err(|e| ProtocolError::Upgrade(format!("failed to replay buffered bytes: {e}")))?;
        tls.conn
            .process_new_packets()
            .map_err(|e| ProtocolError::Upgrade(format!("tls replay failed: {e}")))?;
    }
    tls.conn
        .complete_io(&mut tls.sock)
        .map_err(|e| ProtocolError::Upgrade(format!("tls handshake failed: {e}")))?;
    Ok(tls)
}

/// Builds a server TLS config from PEM-encoded cert/key files, matching
/// spec.md §4.7 step 3's "wrap the socket in TLS using the connection's
/// ssl options".
pub fn build_server_tls_config(tls: &TlsConfig) -> Result<rustls::ServerConfig> {
    let cert_file = std::fs::File::open(&tls.cert_path)
        .map_err(|e| ProtocolError::Upgrade(format!("failed to open cert file: {e}")))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .map_err(|e| ProtocolError::Upgrade(format!("failed to parse cert chain: {e}")))?
        .into_iter()
        .map(rustls::Certificate)
        .collect::<Vec<_>>();

    let key_file = std::fs::File::open(&tls.key_path)
        .map_err(|e| ProtocolError::Upgrade(format!("failed to open key file: {e}")))?;
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_file))
        .map_err(|e| ProtocolError::Upgrade(format!("failed to parse private key: {e}")))?;
    let key = keys
        .pop()
        .map(rustls::PrivateKey)
        .ok_or_else(|| ProtocolError::Upgrade("no private key found in key file".into()))?;

    rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProtocolError::Upgrade(format!("invalid server tls config: {e}")))
}

pub fn upgrade_to_tls_server(
    stolen: StolenConnection,
    config: &rustls::ServerConfig,
) -> Result<rustls::StreamOwned<rustls::ServerConnection, TcpStream>> {
    let conn = rustls::ServerConnection::new(Arc::new(config.clone()))
        .map_err(|e| ProtocolError::Upgrade(format!("tls server init failed: {e}")))?;
    let mut tls = rustls::StreamOwned::new(conn, stolen.stream);
    if !stolen.buffered.is_empty() {
        tls.conn
            .read_tls(&mut &stolen.buffered[..])
            .map_err(|e| ProtocolError::Upgrade(format!("failed to replay buffered bytes: {e}")))?;
        tls.conn
            .process_new_packets()
            .map_err(|e| ProtocolError::Upgrade(format!("tls replay failed: {e}")))?;
    }
    tls.conn
        .complete_io(&mut tls.sock)
        .map_err(|e| ProtocolError::Upgrade(format!("tls handshake failed: {e}")))?;
    Ok(tls)
}

/// The `ws`/`wss` upgrade side, using `tungstenite`'s server handshake over
/// an already-accepted (and possibly already-TLS-wrapped) stream.
pub fn upgrade_to_websocket_server<S: Read + Write>(stream: S) -> Result<tungstenite::WebSocket<S>> {
    tungstenite::accept(stream).map_err(|e| ProtocolError::Upgrade(format!("websocket handshake failed: {e}")))
}

pub fn upgrade_to_websocket_client<S: Read + Write>(
    stream: S,
    url: &str,
) -> Result<tungstenite::WebSocket<S>> {
    let request = tungstenite::client::IntoClientRequest::into_client_request(url)
        .map_err(|e| ProtocolError::Upgrade(format!("invalid websocket url {url}: {e}")))?;
    let (ws, _response) = tungstenite::client(request, stream)
        .map_err(|e| ProtocolError::Upgrade(format!("websocket handshake failed: {e}")))?;
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_tcp_and_ws_are_upgradable_to_ssl() {
        assert!(can_upgrade_to_ssl(SocketType::Tcp));
        assert!(can_upgrade_to_ssl(SocketType::Ws));
        assert!(!can_upgrade_to_ssl(SocketType::Ssl));
        assert!(!can_upgrade_to_ssl(SocketType::Unix));
    }
}
