//! Shared helpers for integration tests: an in-memory duplex transport
//! and a minimal SPDY/2 client speaking through its own codec contexts.

use spdy2::spdy::codec::{FrameDecoder, FrameEncoder, FrameVisitor};
use spdy2::spdy::error::{Error as SpdyError, RstStatus};
use spdy2::spdy::frames::ControlFrame;
use spdy2::spdy::headers::HeaderBlock;
use spdy2::transport::{PollInterest, Transport};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct PipeInner {
    data: VecDeque<u8>,
    closed: bool,
}

struct Pipe {
    inner: Mutex<PipeInner>,
    cv: Condvar,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Pipe {
            inner: Mutex::new(PipeInner {
                data: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        })
    }

    fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.cv.notify_all();
    }
}

/// One end of an in-memory duplex connection
pub struct MemTransport {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
}

/// Create a connected transport pair (server end, client end)
pub fn duplex() -> (MemTransport, MemTransport) {
    let a = Pipe::new();
    let b = Pipe::new();
    (
        MemTransport {
            rx: a.clone(),
            tx: b.clone(),
        },
        MemTransport { rx: b, tx: a },
    )
}

impl Transport for MemTransport {
    fn poll(&self, interest: PollInterest, timeout: Option<Duration>) -> io::Result<bool> {
        if interest == PollInterest::Write {
            return Ok(true);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.rx.inner.lock().unwrap();
        loop {
            if !inner.data.is_empty() || inner.closed {
                return Ok(true);
            }
            match deadline {
                None => inner = self.rx.cv.wait(inner).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    let (guard, result) =
                        self.rx.cv.wait_timeout(inner, deadline - now).unwrap();
                    inner = guard;
                    if result.timed_out() && inner.data.is_empty() && !inner.closed {
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.rx.inner.lock().unwrap();
        loop {
            if !inner.data.is_empty() {
                let n = buf.len().min(inner.data.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inner.data.pop_front().unwrap();
                }
                return Ok(n);
            }
            if inner.closed {
                return Ok(0);
            }
            inner = self.rx.cv.wait(inner).unwrap();
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.tx.inner.lock().unwrap();
        if inner.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"));
        }
        inner.data.extend(buf.iter().copied());
        drop(inner);
        self.tx.cv.notify_all();
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.rx.close();
        self.tx.close();
        Ok(())
    }
}

/// Something the test client saw on the wire
#[derive(Debug)]
pub enum ClientEvent {
    Control(ControlFrame),
    Data {
        stream_id: u32,
        data: Vec<u8>,
        fin: bool,
    },
    Error(SpdyError),
}

#[derive(Default)]
struct ClientCollector {
    events: Vec<ClientEvent>,
}

impl FrameVisitor for ClientCollector {
    fn on_control(&mut self, frame: ControlFrame) {
        self.events.push(ClientEvent::Control(frame));
    }

    fn on_stream_data(&mut self, stream_id: u32, data: &[u8], fin: bool) {
        self.events.push(ClientEvent::Data {
            stream_id,
            data: data.to_vec(),
            fin,
        });
    }

    fn on_error(&mut self, error: SpdyError) {
        self.events.push(ClientEvent::Error(error));
    }
}

/// Minimal SPDY/2 client for driving a server session under test
pub struct TestClient {
    transport: MemTransport,
    encoder: FrameEncoder,
    decoder: FrameDecoder,
    events: VecDeque<ClientEvent>,
}

impl TestClient {
    pub fn new(transport: MemTransport) -> Self {
        TestClient {
            transport,
            encoder: FrameEncoder::new().unwrap(),
            decoder: FrameDecoder::new(),
            events: VecDeque::new(),
        }
    }

    pub fn block(pairs: &[(&str, &str)]) -> HeaderBlock {
        let mut block = HeaderBlock::new();
        for (n, v) in pairs {
            block.insert(*n, *v).unwrap();
        }
        block
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let n = self.transport.write(remaining).unwrap();
            remaining = &remaining[n..];
        }
    }

    pub fn send_syn_stream(
        &mut self,
        stream_id: u32,
        priority: u8,
        fin: bool,
        pairs: &[(&str, &str)],
    ) {
        let block = Self::block(pairs);
        let frame = self
            .encoder
            .build_syn_stream(stream_id, 0, priority, fin, false, &block)
            .unwrap();
        self.send_raw(&frame);
    }

    pub fn send_data(&mut self, stream_id: u32, payload: &[u8], fin: bool) {
        let frame = FrameEncoder::build_data(stream_id, payload, fin);
        self.send_raw(&frame);
    }

    pub fn send_rst(&mut self, stream_id: u32, status: RstStatus) {
        let frame = FrameEncoder::build_rst_stream(stream_id, status);
        self.send_raw(&frame);
    }

    pub fn send_ping(&mut self, token: u32) {
        let frame = FrameEncoder::build_ping(token);
        self.send_raw(&frame);
    }

    pub fn send_goaway(&mut self, last_accepted: u32) {
        let frame = FrameEncoder::build_goaway(last_accepted);
        self.send_raw(&frame);
    }

    /// Close the client's sending half (the server reads EOF)
    pub fn close(&mut self) {
        let _ = self.transport.close();
    }

    /// Wait for the next frame from the server, up to `timeout`.
    pub fn next_event(&mut self, timeout: Duration) -> Option<ClientEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.transport.poll(PollInterest::Read, Some(remaining)) {
                Ok(true) => {}
                _ => return None,
            }
            let mut buf = [0u8; 16 * 1024];
            match self.transport.read(&mut buf) {
                Ok(0) => return None,
                Ok(n) => {
                    let mut collector = ClientCollector::default();
                    let mut data = &buf[..n];
                    while !data.is_empty() {
                        let consumed = self.decoder.feed(data, &mut collector);
                        if consumed == 0 {
                            break;
                        }
                        data = &data[consumed..];
                    }
                    self.events.extend(collector.events);
                }
                Err(_) => return None,
            }
        }
    }

    /// Collect events until a FIN-bearing DATA frame arrives for
    /// `stream_id`, returning (reply headers, body, all events seen).
    pub fn collect_stream(
        &mut self,
        stream_id: u32,
        timeout: Duration,
    ) -> (Option<HeaderBlock>, Vec<u8>, Vec<ClientEvent>) {
        let deadline = Instant::now() + timeout;
        let mut reply = None;
        let mut body = Vec::new();
        let mut seen = Vec::new();
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let event = match self.next_event(remaining) {
                Some(e) => e,
                None => break,
            };
            let mut done = false;
            match &event {
                ClientEvent::Control(ControlFrame::SynReply {
                    stream_id: id,
                    headers,
                    fin,
                }) if *id == stream_id => {
                    reply = Some(headers.clone());
                    done = *fin;
                }
                ClientEvent::Data {
                    stream_id: id,
                    data,
                    fin,
                } if *id == stream_id => {
                    body.extend_from_slice(data);
                    done = *fin;
                }
                _ => {}
            }
            seen.push(event);
            if done {
                break;
            }
        }
        (reply, body, seen)
    }
}
