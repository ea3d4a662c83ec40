//! spdy2 - Server-side SPDY/2 protocol core
//!
//! This crate implements the server half of SPDY/2: a binary,
//! multiplexed, header-compressed substitute for HTTP/1.1 negotiated
//! over TLS. It turns SPDY streams into conventional HTTP/1.1 byte
//! streams so an existing request handler can serve them unchanged.
//!
//! # Architecture
//!
//! - `spdy` - the wire protocol: frame model, header-block codec,
//!   shared-dictionary compression, and the incremental frame codec
//! - `session` - one state machine per connection, multiplexing streams
//!   over a single blocking transport
//! - `bridge` - the per-stream adapter between SPDY frames and
//!   HTTP/1.1 bytes, with blocking queue ends for the worker
//! - `executor` - the boundary through which stream work is handed to
//!   worker threads
//! - `transport` / `tls` - the blocking byte transports a session runs
//!   over, including the negotiation hook that advertises `spdy/2`
//!
//! # Example
//!
//! ```no_run
//! use spdy2::config::SpdyConfig;
//! use spdy2::executor::ThreadPoolExecutor;
//! use spdy2::session::SpdySession;
//! use spdy2::transport::TcpTransport;
//! use std::io::{Read, Write};
//! use std::net::TcpListener;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpdyConfig::default();
//! let executor = Arc::new(ThreadPoolExecutor::new(config.max_threads_per_process)?);
//!
//! let handler = Arc::new(|mut req: spdy2::bridge::RequestReader,
//!                         mut resp: spdy2::bridge::ResponseWriter|
//!  -> std::io::Result<()> {
//!     let mut head = [0u8; 4096];
//!     let _ = req.read(&mut head)?;
//!     resp.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")?;
//!     Ok(())
//! });
//!
//! let listener = TcpListener::bind("127.0.0.1:8443")?;
//! let (stream, _) = listener.accept()?;
//! let mut session = SpdySession::new(
//!     TcpTransport::new(stream),
//!     config,
//!     handler,
//!     executor,
//! )?;
//! let status = session.run();
//! println!("session ended: {:?}", status);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod executor;
pub mod session;
pub mod spdy;
pub mod tls;
pub mod transport;

pub use bridge::{BridgeError, RequestReader, ResponseWriter};
pub use config::SpdyConfig;
pub use executor::{Executor, ThreadPoolExecutor};
pub use session::{RequestHandler, SessionStatus, ShutdownHandle, SpdySession};
pub use spdy::{HeaderBlock, RstStatus};
