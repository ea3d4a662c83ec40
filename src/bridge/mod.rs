//! Stream-to-request bridge
//!
//! One bridge per active inbound stream. The inbound half presents the
//! SPDY stream as a conventional HTTP/1.1 request byte stream that a
//! downstream worker reads blockingly; the outbound half buffers the
//! worker's HTTP/1.1 response bytes until the session drains them into
//! one SYN_REPLY followed by DATA frames.
//!
//! The session owns the bridge and is the only producer of inbound
//! segments and the only consumer of outbound bytes; the worker holds an
//! `Arc` and touches nothing but its two queue ends.

mod http;

use crate::spdy::headers::HeaderBlock;
use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Bridge-level errors surfaced to the worker or the session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The stream was reset; the worker must stop producing
    #[error("stream cancelled")]
    Cancelled,

    /// The worker produced bytes that do not parse as an HTTP response
    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),

    /// The SPDY header block did not describe a usable request
    #[error("unusable request headers: {0}")]
    BadRequestHeaders(String),
}

/// Check whether an I/O error from a bridge read or write is the
/// cancellation kind.
pub fn is_cancellation(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|e| e.downcast_ref::<BridgeError>())
        .map(|e| matches!(e, BridgeError::Cancelled))
        .unwrap_or(false)
}

fn cancelled_io_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, BridgeError::Cancelled)
}

/// Session-wide egress byte budget (the high-water mark).
///
/// Workers acquire before buffering response bytes and block when the
/// session-wide total would exceed the limit; the session releases as
/// frames reach the wire.
pub(crate) struct EgressGate {
    used: Mutex<usize>,
    cv: Condvar,
    limit: usize,
}

impl EgressGate {
    pub(crate) fn new(limit: usize) -> Arc<Self> {
        Arc::new(EgressGate {
            used: Mutex::new(0),
            cv: Condvar::new(),
            limit,
        })
    }

    /// Block until `n` bytes fit under the high-water mark.
    ///
    /// A single write larger than the whole limit is admitted when the
    /// budget is empty, so oversized writes cannot deadlock.
    fn acquire(&self, n: usize, cancelled: &AtomicBool) -> Result<(), BridgeError> {
        let mut used = self.used.lock().unwrap();
        loop {
            if cancelled.load(Ordering::Acquire) {
                return Err(BridgeError::Cancelled);
            }
            if *used + n <= self.limit || *used == 0 {
                *used += n;
                return Ok(());
            }
            used = self.cv.wait(used).unwrap();
        }
    }

    pub(crate) fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut used = self.used.lock().unwrap();
        *used = used.saturating_sub(n);
        drop(used);
        self.cv.notify_all();
    }

    /// Wake every producer blocked on the budget (cancellation path).
    fn wake_all(&self) {
        self.cv.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn in_use(&self) -> usize {
        *self.used.lock().unwrap()
    }
}

struct Inbound {
    segments: VecDeque<Bytes>,
    eof: bool,
}

struct Outbound {
    buf: Vec<u8>,
    head_parsed: bool,
    finished: bool,
    fin_emitted: bool,
}

/// Output taken from a bridge in one drain pass
#[derive(Default)]
pub(crate) struct Drained {
    /// Reply header block, present exactly once per stream
    pub reply: Option<HeaderBlock>,
    /// Bytes the response head occupied (released when the reply frame
    /// reaches the wire)
    pub head_cost: usize,
    /// Body chunks, each at most the requested frame size
    pub chunks: Vec<Bytes>,
    /// The response is complete; the last frame out carries FIN
    pub fin: bool,
}

/// Per-stream adapter between SPDY frames and HTTP/1.1 bytes
pub struct StreamBridge {
    stream_id: u32,
    priority: u8,
    cancelled: AtomicBool,
    inbound: Mutex<Inbound>,
    inbound_cv: Condvar,
    outbound: Mutex<Outbound>,
    gate: Arc<EgressGate>,
}

impl StreamBridge {
    pub(crate) fn new(
        stream_id: u32,
        priority: u8,
        request_head: Vec<u8>,
        inbound_eof: bool,
        gate: Arc<EgressGate>,
    ) -> Arc<Self> {
        let mut segments = VecDeque::new();
        if !request_head.is_empty() {
            segments.push_back(Bytes::from(request_head));
        }
        Arc::new(StreamBridge {
            stream_id,
            priority,
            cancelled: AtomicBool::new(false),
            inbound: Mutex::new(Inbound {
                segments,
                eof: inbound_eof,
            }),
            inbound_cv: Condvar::new(),
            outbound: Mutex::new(Outbound {
                buf: Vec::new(),
                head_parsed: false,
                finished: false,
                fin_emitted: false,
            }),
            gate,
        })
    }

    /// Stream id this bridge serves
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Stream priority (0 is highest)
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Whether the stream has been reset
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    // --- session side: inbound ---

    /// Append DATA payload for the worker; `fin` marks the peer's
    /// half-close.
    pub(crate) fn push_data(&self, data: Bytes, fin: bool) {
        let mut inbound = self.inbound.lock().unwrap();
        if !data.is_empty() {
            inbound.segments.push_back(data);
        }
        if fin {
            inbound.eof = true;
        }
        drop(inbound);
        self.inbound_cv.notify_all();
    }

    /// Reset the stream: wake and fail both queue ends, discard buffered
    /// output and return its budget.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);

        let mut inbound = self.inbound.lock().unwrap();
        inbound.segments.clear();
        drop(inbound);
        self.inbound_cv.notify_all();

        let mut outbound = self.outbound.lock().unwrap();
        let discarded = outbound.buf.len();
        outbound.buf.clear();
        drop(outbound);
        self.gate.release(discarded);
        self.gate.wake_all();
    }

    // --- session side: outbound ---

    /// Cheap check whether a drain pass could produce anything.
    pub(crate) fn has_pending_output(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let outbound = self.outbound.lock().unwrap();
        !outbound.fin_emitted && (!outbound.buf.is_empty() || outbound.finished)
    }

    /// Take whatever response output is ready: the reply head once
    /// parsed, body bytes split into `max_frame`-sized chunks, and the
    /// FIN marker once the worker has finished.
    pub(crate) fn drain_output(&self, max_frame: usize) -> Result<Drained, BridgeError> {
        let mut outbound = self.outbound.lock().unwrap();
        let mut drained = Drained::default();

        if !outbound.head_parsed {
            match http::parse_head(&outbound.buf) {
                Err(msg) => return Err(BridgeError::MalformedResponse(msg)),
                Ok(None) => {
                    if outbound.finished {
                        return Err(BridgeError::MalformedResponse(
                            "response ended before the head completed".to_string(),
                        ));
                    }
                    return Ok(drained);
                }
                Ok(Some((head, consumed))) => {
                    drained.reply = Some(build_reply_block(&head)?);
                    drained.head_cost = consumed;
                    outbound.buf.drain(..consumed);
                    outbound.head_parsed = true;
                }
            }
        }

        while !outbound.buf.is_empty() {
            let take = outbound.buf.len().min(max_frame);
            let chunk: Vec<u8> = outbound.buf.drain(..take).collect();
            drained.chunks.push(Bytes::from(chunk));
        }

        if outbound.finished && !outbound.fin_emitted {
            outbound.fin_emitted = true;
            drained.fin = true;
        }
        Ok(drained)
    }

    // --- worker side ---

    fn read_request(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inbound = self.inbound.lock().unwrap();
        loop {
            if self.is_cancelled() {
                return Err(cancelled_io_error());
            }
            if let Some(front) = inbound.segments.front_mut() {
                let n = front.len().min(buf.len());
                buf[..n].copy_from_slice(&front[..n]);
                if n == front.len() {
                    inbound.segments.pop_front();
                } else {
                    front.advance(n);
                }
                return Ok(n);
            }
            if inbound.eof {
                return Ok(0);
            }
            inbound = self.inbound_cv.wait(inbound).unwrap();
        }
    }

    fn write_response(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.is_cancelled() {
            return Err(cancelled_io_error());
        }
        self.gate
            .acquire(buf.len(), &self.cancelled)
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e))?;

        let mut outbound = self.outbound.lock().unwrap();
        if self.is_cancelled() {
            drop(outbound);
            self.gate.release(buf.len());
            return Err(cancelled_io_error());
        }
        outbound.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn finish_response(&self) {
        let mut outbound = self.outbound.lock().unwrap();
        outbound.finished = true;
    }
}

/// Blocking reader over the synthesized request bytes
///
/// Yields the request line, headers, blank line, then body bytes in
/// arrival order, then EOF once the peer half-closes.
pub struct RequestReader {
    bridge: Arc<StreamBridge>,
}

impl RequestReader {
    pub(crate) fn new(bridge: Arc<StreamBridge>) -> Self {
        RequestReader { bridge }
    }

    /// The bridge this reader belongs to
    pub fn stream_id(&self) -> u32 {
        self.bridge.stream_id()
    }
}

impl io::Read for RequestReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.bridge.read_request(buf)
    }
}

/// Writer for the worker's HTTP/1.1 response bytes
///
/// Blocks when the session-wide egress budget is exhausted. Dropping the
/// writer finishes the response.
pub struct ResponseWriter {
    bridge: Arc<StreamBridge>,
    finished: bool,
}

impl ResponseWriter {
    pub(crate) fn new(bridge: Arc<StreamBridge>) -> Self {
        ResponseWriter {
            bridge,
            finished: false,
        }
    }

    /// Declare the response complete; the last frame out carries FIN.
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.bridge.finish_response();
        }
    }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response already finished",
            ));
        }
        self.bridge.write_response(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Synthesize the HTTP/1.1 request head from a SYN_STREAM header block.
///
/// `method`, `url` and `version` form the request line; `host` becomes a
/// `Host:` header; `scheme` is consumed; everything else passes through,
/// NUL-joined values becoming one header line per value.
pub(crate) fn synthesize_request_head(headers: &HeaderBlock) -> Result<Vec<u8>, BridgeError> {
    let method = headers
        .get("method")
        .ok_or_else(|| BridgeError::BadRequestHeaders("missing method".to_string()))?;
    let url = headers
        .get("url")
        .ok_or_else(|| BridgeError::BadRequestHeaders("missing url".to_string()))?;
    let version = headers
        .get("version")
        .ok_or_else(|| BridgeError::BadRequestHeaders("missing version".to_string()))?;

    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(format!("{} {} {}\r\n", method, url, version).as_bytes());
    if let Some(host) = headers.get("host") {
        out.extend_from_slice(format!("Host: {}\r\n", host).as_bytes());
    }
    for (name, value) in headers.iter() {
        if matches!(name, "method" | "url" | "version" | "host" | "scheme") {
            continue;
        }
        for part in value.split('\0') {
            out.extend_from_slice(format!("{}: {}\r\n", name, part).as_bytes());
        }
    }
    out.extend_from_slice(b"\r\n");
    Ok(out)
}

/// Build the SYN_REPLY header block from a parsed response head.
///
/// The first two entries are `status` and `version`; remaining headers
/// are lowercased with duplicates NUL-joined. `transfer-encoding` is
/// stripped (the body must reach the bridge unchunked), as are the
/// hop-by-hop `connection` and `keep-alive` headers.
fn build_reply_block(head: &http::ResponseHead) -> Result<HeaderBlock, BridgeError> {
    let status_value = if head.reason.is_empty() {
        head.status_code.to_string()
    } else {
        format!("{} {}", head.status_code, head.reason)
    };

    let mut block = HeaderBlock::new();
    block
        .insert("status", status_value)
        .and_then(|_| block.insert("version", head.version.clone()))
        .map_err(|e| BridgeError::MalformedResponse(e.to_string()))?;

    for (name, value) in &head.headers {
        let name = name.to_ascii_lowercase();
        if matches!(
            name.as_str(),
            "connection" | "keep-alive" | "transfer-encoding" | "status" | "version"
        ) {
            continue;
        }
        block
            .append_value(name, value)
            .map_err(|e| BridgeError::MalformedResponse(e.to_string()))?;
    }
    Ok(block)
}
