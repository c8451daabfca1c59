//! Shared rustls client configuration.
//!
//! One [`ClientConfig`] (ring provider, webpki roots, safe default protocol
//! versions) is built lazily and shared by every blocking and async
//! connection.

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};

use crate::error::{Error, Result};

// ============================================================================
// Client Config
// ============================================================================

static CLIENT_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// Returns the shared TLS client configuration.
///
/// # Errors
///
/// Returns [`Error::Tls`] if the crypto provider rejects the default
/// protocol versions.
pub fn client_config() -> Result<Arc<ClientConfig>> {
    if let Some(config) = CLIENT_CONFIG.get() {
        return Ok(Arc::clone(config));
    }

    let config = Arc::new(build_client_config()?);
    Ok(Arc::clone(CLIENT_CONFIG.get_or_init(|| config)))
}

fn build_client_config() -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::tls(format!("Failed to configure TLS: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}

/// Converts a host into the SNI server name.
///
/// # Errors
///
/// Returns [`Error::Tls`] if `host` is neither a DNS name nor an IP address.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| Error::tls(format!("Invalid server name {host:?}: {e}")))
}

// ============================================================================
// Session State
// ============================================================================

/// Returns `true` once the handshake is done and the session holds no
/// decrypted bytes the caller has not read and no `close_notify`.
///
/// The kernel socket can look idle while rustls still buffers plaintext
/// from a record that carried bytes past the end of a response.
pub(crate) fn session_idle(conn: &ClientConnection) -> bool {
    !conn.is_handshaking() && conn.wants_read()
}

// ============================================================================
// Error Classification
// ============================================================================

/// Maps an I/O error raised during the TLS handshake.
pub(crate) fn handshake_error(err: IoError, host: &str) -> Error {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            Error::connect_timeout(format!("TLS handshake with {host} timed out"))
        }
        ErrorKind::InvalidData => Error::tls(format!("TLS handshake with {host} failed: {err}")),
        _ if err.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) => {
            Error::tls(format!("TLS handshake with {host} failed: {err}"))
        }
        _ => Error::network(format!("TLS handshake with {host} failed: {err}")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};

    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use rustls::{ServerConfig, ServerConnection};

    const TEST_CA: &[u8] = include_bytes!("testdata/ca.der");
    const TEST_CERT: &[u8] = include_bytes!("testdata/localhost.der");
    const TEST_KEY: &[u8] = include_bytes!("testdata/localhost.key.der");

    fn session_pair() -> (ClientConnection, ServerConnection) {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        roots.add(CertificateDer::from(TEST_CA)).unwrap();
        let client = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(TEST_KEY));
        let server = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![CertificateDer::from(TEST_CERT)], key)
            .unwrap();

        let name = server_name("localhost").unwrap();
        (
            ClientConnection::new(Arc::new(client), name).unwrap(),
            ServerConnection::new(Arc::new(server)).unwrap(),
        )
    }

    /// Moves pending TLS records from the server to the client.
    fn server_to_client(server: &mut ServerConnection, client: &mut ClientConnection) {
        let mut wire = Vec::new();
        server.write_tls(&mut wire).unwrap();
        if !wire.is_empty() {
            client.read_tls(&mut wire.as_slice()).unwrap();
            client.process_new_packets().unwrap();
        }
    }

    fn complete_handshake(client: &mut ClientConnection, server: &mut ServerConnection) {
        while client.is_handshaking() || server.is_handshaking() {
            let mut wire = Vec::new();
            client.write_tls(&mut wire).unwrap();
            if !wire.is_empty() {
                server.read_tls(&mut wire.as_slice()).unwrap();
                server.process_new_packets().unwrap();
            }
            server_to_client(server, client);
        }
    }

    #[test]
    fn test_session_idle_tracks_unread_plaintext() {
        let (mut client, mut server) = session_pair();
        assert!(!session_idle(&client));

        complete_handshake(&mut client, &mut server);
        server_to_client(&mut server, &mut client);
        assert!(session_idle(&client));

        // Body and trailing bytes arrive in one record.
        server.writer().write_all(b"hello, trailing").unwrap();
        server_to_client(&mut server, &mut client);

        let mut body = [0u8; 5];
        client.reader().read_exact(&mut body).unwrap();
        assert_eq!(&body, b"hello");
        assert!(!session_idle(&client));

        let mut rest = [0u8; 10];
        client.reader().read_exact(&mut rest).unwrap();
        assert_eq!(&rest, b", trailing");
        assert!(session_idle(&client));
    }

    #[test]
    fn test_session_not_idle_after_close_notify() {
        let (mut client, mut server) = session_pair();
        complete_handshake(&mut client, &mut server);

        server.send_close_notify();
        server_to_client(&mut server, &mut client);
        assert!(!session_idle(&client));
    }

    #[test]
    fn test_client_config_is_shared() {
        let a = client_config().unwrap();
        let b = client_config().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("example.com").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(matches!(server_name("bad host!"), Err(Error::Tls { .. })));
    }

    #[test]
    fn test_handshake_error_classification() {
        let err = handshake_error(IoError::new(ErrorKind::TimedOut, "slow"), "h");
        assert!(matches!(err, Error::ConnectTimeout { .. }));

        let err = handshake_error(IoError::new(ErrorKind::InvalidData, "bad cert"), "h");
        assert!(matches!(err, Error::Tls { .. }));

        let err = handshake_error(IoError::new(ErrorKind::ConnectionReset, "rst"), "h");
        assert!(matches!(err, Error::Network { .. }));
    }
}
