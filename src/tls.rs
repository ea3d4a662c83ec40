//! TLS collaborator adapter
//!
//! SPDY runs only over TLS with next-protocol negotiation. This module
//! wraps the openssl server context so the collaborator can advertise
//! `spdy/2` during the handshake, and adapts the negotiated stream to
//! the session's `Transport` trait.

use crate::transport::{poll_fd, PollInterest, Transport};
use openssl::ssl::{
    select_next_proto, AlpnError, Ssl, SslContext, SslContextBuilder, SslFiletype, SslMethod,
    SslStream,
};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::time::Duration;

/// The protocol name this core contributes to the negotiation list
pub const SPDY_PROTOCOL_NAME: &str = "spdy/2";

/// TLS setup and handshake errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Serialize a protocol list into the length-prefixed negotiation wire
/// format.
fn wire_protocol_list(protocols: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for proto in protocols {
        out.push(proto.len() as u8);
        out.extend_from_slice(proto.as_bytes());
    }
    out
}

/// Builder for a SPDY-capable TLS server context
pub struct TlsServerBuilder {
    ctx: SslContextBuilder,
    protocols: Vec<String>,
}

impl TlsServerBuilder {
    fn new() -> Result<Self, TlsError> {
        Ok(TlsServerBuilder {
            ctx: SslContext::builder(SslMethod::tls_server())?,
            protocols: Vec::new(),
        })
    }

    /// Load the server certificate chain (PEM)
    pub fn certificate_chain_file(mut self, path: impl AsRef<Path>) -> Result<Self, TlsError> {
        self.ctx.set_certificate_chain_file(path)?;
        Ok(self)
    }

    /// Load the server private key (PEM)
    pub fn private_key_file(mut self, path: impl AsRef<Path>) -> Result<Self, TlsError> {
        self.ctx.set_private_key_file(path, SslFiletype::PEM)?;
        Ok(self)
    }

    /// Advertise SPDY during negotiation. Gated by the `spdy_enabled`
    /// configuration knob; when disabled the server only speaks the
    /// fallback protocols.
    pub fn advertise_spdy(mut self, enabled: bool) -> Self {
        if enabled {
            self.protocols.insert(0, SPDY_PROTOCOL_NAME.to_string());
        }
        self
    }

    /// Add a fallback protocol (typically `http/1.1`)
    pub fn advertise_protocol(mut self, protocol: &str) -> Self {
        self.protocols.push(protocol.to_string());
        self
    }

    pub fn build(mut self) -> Result<TlsServer, TlsError> {
        let advertised: &'static [u8] =
            Box::leak(wire_protocol_list(&self.protocols).into_boxed_slice());
        self.ctx
            .set_alpn_select_callback(move |_ssl, client_protos| {
                select_next_proto(advertised, client_protos).ok_or(AlpnError::NOACK)
            });
        Ok(TlsServer {
            ctx: self.ctx.build(),
        })
    }
}

/// TLS server context shared across connections
pub struct TlsServer {
    ctx: SslContext,
}

impl TlsServer {
    pub fn builder() -> Result<TlsServerBuilder, TlsError> {
        TlsServerBuilder::new()
    }

    /// Run the handshake on an accepted TCP connection.
    ///
    /// The caller checks `negotiated_spdy` on the result and hands the
    /// transport to a `SpdySession`, or falls back to its ordinary
    /// request path.
    pub fn accept(&self, stream: TcpStream) -> Result<TlsTransport, TlsError> {
        let ssl = Ssl::new(&self.ctx)?;
        let stream = ssl
            .accept(stream)
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))?;
        Ok(TlsTransport { stream })
    }
}

/// A negotiated TLS connection usable as a session transport
pub struct TlsTransport {
    stream: SslStream<TcpStream>,
}

impl TlsTransport {
    /// TLS transports are secure by construction
    pub fn is_secure(&self) -> bool {
        true
    }

    /// The protocol name the negotiation settled on, if any
    pub fn negotiated_protocol(&self) -> Option<&[u8]> {
        self.stream.ssl().selected_alpn_protocol()
    }

    /// Whether the peer agreed to speak SPDY
    pub fn negotiated_spdy(&self) -> bool {
        self.negotiated_protocol() == Some(SPDY_PROTOCOL_NAME.as_bytes())
    }
}

impl Transport for TlsTransport {
    fn poll(&self, interest: PollInterest, timeout: Option<Duration>) -> io::Result<bool> {
        // Bytes already decrypted inside the TLS layer won't show up on
        // the file descriptor.
        if interest == PollInterest::Read && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }
        poll_fd(self.stream.get_ref().as_raw_fd(), interest, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        let _ = self.stream.shutdown();
        use std::net::Shutdown;
        match self.stream.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}
