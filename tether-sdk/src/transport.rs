//! Socket establishment and the byte-level transport the engine reads from.
//!
//! The engine never touches a socket directly; it asks a [`Connector`] for a
//! [`Connection`] and then only uses the [`Transport`] it carries. The real
//! implementation is [`TcpConnector`]: a std `TcpStream`, optionally wrapped in
//! rustls, switched to non-blocking mode once the handshake is done so a tick
//! only drains what has already arrived.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};

use crate::config::Endpoint;
use crate::error::ConnectError;

/// A connected byte stream.
pub trait Transport: Send {
    /// Read whatever is already available without waiting.
    ///
    /// `Ok(None)` means nothing is pending right now. End of stream is
    /// reported as an [`io::ErrorKind::UnexpectedEof`] error.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    fn close(&mut self);
}

/// Outcome of certificate validation on a TLS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsStatus {
    Verified,
    /// Validation failed; the handshake was allowed to finish anyway.
    CertificateRejected(String),
}

/// A freshly opened connection, ready for registration.
pub struct Connection {
    pub transport: Box<dyn Transport>,
    /// `None` for plaintext connections.
    pub tls: Option<TlsStatus>,
}

/// Opens connections for the engine.
pub trait Connector: Send {
    /// Open a stream to `endpoint`, completing TLS when requested.
    ///
    /// May block for at most roughly `timeout` per address tried.
    fn open(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<Connection, ConnectError>;
}

/// Real sockets: std TCP plus rustls.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TcpConnector {
    fn open(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<Connection, ConnectError> {
        tracing::debug!(host = %endpoint.host, port = endpoint.port, "Resolving");
        let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectError::Resolve {
                host: endpoint.host.clone(),
                port: endpoint.port,
            });
        }

        let stream = connect_any(&addrs, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let mode = if endpoint.tls { "TLS" } else { "plain" };
        tracing::debug!("TCP connected to {endpoint} ({mode})");

        if !endpoint.tls {
            stream.set_nonblocking(true)?;
            return Ok(Connection {
                transport: Box::new(PlainTransport { stream }),
                tls: None,
            });
        }

        let (transport, status) = handshake(stream, &endpoint.host)?;
        Ok(Connection {
            transport: Box::new(transport),
            tls: Some(status),
        })
    }
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address to connect to")))
}

fn handshake(mut stream: TcpStream, host: &str) -> Result<(TlsTransport, TlsStatus), ConnectError> {
    install_crypto_provider();

    let verifier = Arc::new(PermissiveVerifier::new()?);
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier.clone())
        .with_no_client_auth();
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ConnectError::InvalidServerName(host.to_string()))?;

    let mut conn = ClientConnection::new(Arc::new(config), server_name)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut stream)?;
    }
    stream.set_nonblocking(true)?;
    tracing::debug!("TLS handshake complete");

    let status = match verifier.take_rejection() {
        Some(reason) => TlsStatus::CertificateRejected(reason),
        None => TlsStatus::Verified,
    };
    Ok((
        TlsTransport {
            tls: StreamOwned::new(conn, stream),
        },
        status,
    ))
}

/// Map a non-blocking read result onto the [`Transport`] contract.
fn nonblocking_read(result: io::Result<usize>) -> io::Result<Option<usize>> {
    match result {
        Ok(0) => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )),
        Ok(n) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

struct PlainTransport {
    stream: TcpStream,
}

impl Transport for PlainTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        nonblocking_read(self.stream.read(buf))
    }

    // Writes block (bounded by the write timeout) so a line is never half sent.
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.set_nonblocking(false)?;
        let result = self.stream.write_all(data).and_then(|()| self.stream.flush());
        self.stream.set_nonblocking(true)?;
        result
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

struct TlsTransport {
    tls: StreamOwned<ClientConnection, TcpStream>,
}

impl Transport for TlsTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        nonblocking_read(self.tls.read(buf))
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.tls.sock.set_nonblocking(false)?;
        let result = self.tls.write_all(data).and_then(|()| self.tls.flush());
        self.tls.sock.set_nonblocking(true)?;
        result
    }

    fn close(&mut self) {
        self.tls.conn.send_close_notify();
        let _ = self.tls.conn.write_tls(&mut self.tls.sock);
        let _ = self.tls.sock.shutdown(Shutdown::Both);
    }
}

/// Install a crypto provider for rustls.
pub fn install_crypto_provider() {
    // ring is preferred; aws-lc-rs is available behind its feature.
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

/// Validates against the webpki roots but accepts whatever the server
/// presents, remembering why validation failed.
#[derive(Debug)]
struct PermissiveVerifier {
    inner: Arc<WebPkiServerVerifier>,
    rejection: Mutex<Option<String>>,
}

impl PermissiveVerifier {
    fn new() -> Result<Self, ConnectError> {
        let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ConnectError::Verifier(e.to_string()))?;
        Ok(Self {
            inner,
            rejection: Mutex::new(None),
        })
    }

    fn take_rejection(&self) -> Option<String> {
        self.rejection.lock().take()
    }
}

impl ServerCertVerifier for PermissiveVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(verified) => Ok(verified),
            Err(e) => {
                tracing::warn!(error = %e, "Certificate error, continuing anyway");
                *self.rejection.lock() = Some(e.to_string());
                Ok(ServerCertVerified::assertion())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
