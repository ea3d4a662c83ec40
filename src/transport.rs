//! Transport abstraction
//!
//! The session owns exactly one blocking transport. The trait lets the
//! same session code run over plain TCP and TLS connections (and over
//! in-memory pipes in tests).

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Readiness interest for `Transport::poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterest {
    Read,
    Write,
}

/// Blocking byte transport owned by a SPDY session
pub trait Transport: Send {
    /// Wait until the transport is ready for the requested operation.
    ///
    /// Returns false on timeout. `None` waits indefinitely.
    fn poll(&self, interest: PollInterest, timeout: Option<Duration>) -> io::Result<bool>;

    /// Read available bytes; 0 means the peer closed the connection.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Close the transport.
    fn close(&mut self) -> io::Result<()>;
}

/// Write an entire buffer, polling for writability between short writes.
pub fn write_all<T: Transport + ?Sized>(
    transport: &mut T,
    mut buf: &[u8],
    timeout: Option<Duration>,
) -> io::Result<()> {
    while !buf.is_empty() {
        if !transport.poll(PollInterest::Write, timeout)? {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"));
        }
        let n = transport.write(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "transport closed during write",
            ));
        }
        buf = &buf[n..];
    }
    Ok(())
}

pub(crate) fn poll_fd(fd: i32, interest: PollInterest, timeout: Option<Duration>) -> io::Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match interest {
            PollInterest::Read => POLLIN,
            PollInterest::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout.map(|d| d.as_millis() as i32).unwrap_or(-1);

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(result > 0)
}

/// Plain TCP transport
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl Transport for TcpTransport {
    fn poll(&self, interest: PollInterest, timeout: Option<Duration>) -> io::Result<bool> {
        poll_fd(self.stream.as_raw_fd(), interest, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        use std::net::Shutdown;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already gone is fine on the close path.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_transport_poll_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Hello").unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut transport = TcpTransport::new(stream);

        assert!(transport
            .poll(PollInterest::Read, Some(Duration::from_secs(1)))
            .unwrap());

        let mut buf = [0u8; 5];
        let n = transport.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hello");

        handle.join().unwrap();
    }

    #[test]
    fn test_poll_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let _handle = thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(300));
        });

        let stream = TcpStream::connect(addr).unwrap();
        let transport = TcpTransport::new(stream);

        let ready = transport
            .poll(PollInterest::Read, Some(Duration::from_millis(50)))
            .unwrap();
        assert!(!ready);
    }

    #[test]
    fn test_write_all_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut transport = TcpTransport::new(stream);
        let payload = vec![0xabu8; 64 * 1024];
        write_all(&mut transport, &payload, Some(Duration::from_secs(2))).unwrap();
        transport.close().unwrap();

        assert_eq!(handle.join().unwrap(), payload);
    }
}
