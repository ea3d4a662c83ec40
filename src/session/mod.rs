//! SPDY session
//!
//! One session owns one transport connection. The thread that calls
//! `run` becomes the ingress thread: it reads and parses frames,
//! dispatches them into per-stream bridges, and serializes all egress.
//! Stream work runs on the executor's worker threads; workers never
//! touch the transport or the compression contexts.

mod scheduler;

use crate::bridge::{self, EgressGate, RequestReader, ResponseWriter, StreamBridge};
use crate::config::SpdyConfig;
use crate::executor::Executor;
use crate::spdy::codec::{FrameDecoder, FrameEncoder, FrameVisitor};
use crate::spdy::error::{Error as SpdyError, RstStatus};
use crate::spdy::frames::{ControlFrame, Setting};
use crate::transport::{self, PollInterest, Transport};
use bytes::Bytes;
use scheduler::{EgressScheduler, QueuedFrame};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Payload size the session slices response bodies into
const MAX_DATA_FRAME: usize = 4096;

/// How long the ingress loop waits in one poll before it rechecks
/// worker output and timers
const POLL_TICK: Duration = Duration::from_millis(50);

/// Bound on a single blocking frame write
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a session's run loop, for the collaborator to log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Local orderly shutdown completed
    Clean,
    /// The peer closed or wound the session down
    PeerClosed,
    /// A session-fatal protocol error ended the connection
    ProtocolError,
    /// The transport failed, or the peer stopped responding
    TransportError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    GoawaySent,
    GoawayReceived,
}

/// Requests an orderly shutdown of a running session from another thread
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to send GOAWAY, drain, and close.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Downstream HTTP worker invoked once per accepted stream
///
/// The handler reads a synthesized HTTP/1.1 request from `request` and
/// writes a conventional HTTP/1.1 response to `response`. It runs on an
/// executor thread; a cancelled stream fails its next bridge operation
/// with the cancellation kind (`crate::bridge::is_cancellation`).
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: RequestReader, response: ResponseWriter) -> io::Result<()>;
}

impl<F> RequestHandler for F
where
    F: Fn(RequestReader, ResponseWriter) -> io::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, request: RequestReader, response: ResponseWriter) -> io::Result<()> {
        self(request, response)
    }
}

enum IngressEvent {
    Control(ControlFrame),
    Data { stream_id: u32, data: Bytes, fin: bool },
    Error(SpdyError),
}

/// Copies decoder output into owned events; the decoder's data slices
/// are only valid during the visitor call.
#[derive(Default)]
struct EventCollector {
    events: Vec<IngressEvent>,
}

impl FrameVisitor for EventCollector {
    fn on_control(&mut self, frame: ControlFrame) {
        self.events.push(IngressEvent::Control(frame));
    }

    fn on_stream_data(&mut self, stream_id: u32, data: &[u8], fin: bool) {
        self.events.push(IngressEvent::Data {
            stream_id,
            data: Bytes::copy_from_slice(data),
            fin,
        });
    }

    fn on_error(&mut self, error: SpdyError) {
        self.events.push(IngressEvent::Error(error));
    }
}

struct StreamEntry {
    bridge: Arc<StreamBridge>,
    /// Peer half-closed (FIN seen) or reset
    remote_closed: bool,
    /// Our final frame (FIN) has been queued for this stream
    local_fin_queued: bool,
    /// UNIDIRECTIONAL stream: response bytes are discarded
    discard_output: bool,
}

/// One SPDY/2 connection: framing, stream multiplexing, egress
/// scheduling, shutdown.
pub struct SpdySession<T: Transport> {
    transport: T,
    config: SpdyConfig,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
    scheduler: EgressScheduler,
    gate: Arc<EgressGate>,
    streams: HashMap<u32, StreamEntry>,
    handler: Arc<dyn RequestHandler>,
    executor: Arc<dyn Executor>,
    state: SessionState,
    /// Largest stream id the peer has opened (monotonicity check)
    highest_peer_stream_id: u32,
    /// Largest peer stream id we actually accepted (GOAWAY value)
    last_accepted_stream_id: u32,
    peer_settings: HashMap<u32, Setting>,
    shutdown: ShutdownHandle,
    next_ping_token: u32,
    ping_in_flight: Option<(u32, Instant)>,
    last_activity: Instant,
}

impl<T: Transport> SpdySession<T> {
    /// Create a session over a negotiated transport.
    ///
    /// Fails only if the compression contexts cannot be initialized.
    pub fn new(
        transport: T,
        config: SpdyConfig,
        handler: Arc<dyn RequestHandler>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, SpdyError> {
        let decoder = FrameDecoder::with_control_cap(config.control_frame_cap_bytes);
        let encoder = FrameEncoder::new()?;
        let gate = EgressGate::new(config.egress_high_water_bytes);
        Ok(SpdySession {
            transport,
            config,
            decoder,
            encoder,
            scheduler: EgressScheduler::new(),
            gate,
            streams: HashMap::new(),
            handler,
            executor,
            state: SessionState::Active,
            highest_peer_stream_id: 0,
            last_accepted_stream_id: 0,
            peer_settings: HashMap::new(),
            shutdown: ShutdownHandle::new(),
            // Server-initiated ping tokens are even.
            next_ping_token: 2,
            ping_in_flight: None,
            last_activity: Instant::now(),
        })
    }

    /// Handle for requesting an orderly shutdown from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// The most recent value the peer sent for a SETTINGS id
    pub fn peer_setting(&self, id: u32) -> Option<Setting> {
        self.peer_settings.get(&id).copied()
    }

    /// Drive the session until it ends. Blocks the calling thread.
    pub fn run(&mut self) -> SessionStatus {
        let status = self.run_loop();
        self.teardown();
        tracing::debug!(?status, "session finished");
        status
    }

    fn run_loop(&mut self) -> SessionStatus {
        let mut read_buf = vec![0u8; 16 * 1024];
        loop {
            self.collect_stream_output();
            if let Err(status) = self.flush_egress() {
                return status;
            }
            self.reap_closed_streams();

            if self.shutdown.is_requested() && self.state == SessionState::Active {
                self.begin_goaway();
                continue;
            }

            if self.state != SessionState::Active
                && self.streams.is_empty()
                && self.scheduler.is_empty()
            {
                return match self.state {
                    SessionState::GoawaySent => SessionStatus::Clean,
                    _ => SessionStatus::PeerClosed,
                };
            }

            if let Some(status) = self.check_timers() {
                return status;
            }

            match self.transport.poll(PollInterest::Read, Some(POLL_TICK)) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    tracing::warn!("transport poll failed: {e}");
                    return SessionStatus::TransportError;
                }
            }

            match self.transport.read(&mut read_buf) {
                Ok(0) => return self.on_transport_eof(),
                Ok(n) => {
                    self.last_activity = Instant::now();
                    self.ping_in_flight = None;
                    if let Some(status) = self.process_input(&read_buf[..n]) {
                        return status;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    tracing::warn!("transport read failed: {e}");
                    return SessionStatus::TransportError;
                }
            }
        }
    }

    fn on_transport_eof(&mut self) -> SessionStatus {
        // EOF means "no more bytes"; a partial frame is the peer's loss.
        if !self.decoder.at_frame_boundary() {
            tracing::debug!("peer closed mid-frame");
        }
        if self.decoder.has_error() {
            SessionStatus::ProtocolError
        } else {
            SessionStatus::PeerClosed
        }
    }

    fn process_input(&mut self, mut data: &[u8]) -> Option<SessionStatus> {
        while !data.is_empty() {
            let mut collector = EventCollector::default();
            let consumed = self.decoder.feed(data, &mut collector);
            for event in collector.events {
                if let Some(status) = self.handle_event(event) {
                    return Some(status);
                }
            }
            if consumed == 0 {
                break;
            }
            data = &data[consumed..];
        }
        None
    }

    fn handle_event(&mut self, event: IngressEvent) -> Option<SessionStatus> {
        match event {
            IngressEvent::Error(error) => Some(self.fatal_protocol_error(error)),
            IngressEvent::Control(frame) => self.handle_control(frame),
            IngressEvent::Data {
                stream_id,
                data,
                fin,
            } => {
                self.handle_data(stream_id, data, fin);
                None
            }
        }
    }

    fn handle_control(&mut self, frame: ControlFrame) -> Option<SessionStatus> {
        match frame {
            ControlFrame::SynStream {
                stream_id,
                associated_stream_id,
                priority,
                fin,
                unidirectional,
                headers,
            } => self.handle_syn_stream(
                stream_id,
                associated_stream_id,
                priority,
                fin,
                unidirectional,
                headers,
            ),
            ControlFrame::SynReply { stream_id, .. } => {
                // The server never initiates streams, so no stream of
                // ours can be awaiting a reply.
                if self.streams.contains_key(&stream_id) {
                    self.reset_stream(stream_id, RstStatus::ProtocolError);
                } else {
                    self.send_rst(stream_id, RstStatus::InvalidStream);
                }
                None
            }
            ControlFrame::RstStream { stream_id, status } => {
                tracing::debug!(stream_id, status, "stream reset by peer");
                // Never answer RST_STREAM with RST_STREAM.
                self.close_stream_silent(stream_id);
                None
            }
            ControlFrame::Settings(settings) => {
                for setting in settings {
                    self.peer_settings.insert(setting.id, setting);
                }
                None
            }
            ControlFrame::Noop => None,
            ControlFrame::Ping { token } => {
                if token % 2 == 1 {
                    // Peer-initiated: reflect with the identical payload.
                    self.scheduler
                        .enqueue_control(FrameEncoder::build_ping(token));
                } else if self
                    .ping_in_flight
                    .map(|(t, _)| t == token)
                    .unwrap_or(false)
                {
                    self.ping_in_flight = None;
                }
                None
            }
            ControlFrame::Goaway {
                last_accepted_stream_id,
            } => {
                tracing::debug!(last_accepted_stream_id, "peer sent GOAWAY");
                if self.state == SessionState::Active {
                    self.state = SessionState::GoawayReceived;
                }
                None
            }
        }
    }

    fn handle_syn_stream(
        &mut self,
        stream_id: u32,
        associated_stream_id: u32,
        priority: u8,
        fin: bool,
        unidirectional: bool,
        headers: crate::spdy::HeaderBlock,
    ) -> Option<SessionStatus> {
        // Stream id zero and server-parity ids from the peer corrupt the
        // whole session's bookkeeping; treat as session-fatal.
        if stream_id == 0 || stream_id % 2 == 0 {
            return Some(self.fatal_protocol_error(SpdyError::InvalidControlFrame));
        }

        if stream_id <= self.highest_peer_stream_id {
            // Duplicate or non-monotonic id; the existing stream (if
            // any) is left untouched.
            self.send_rst(stream_id, RstStatus::ProtocolError);
            return None;
        }
        self.highest_peer_stream_id = stream_id;

        // Only our own GOAWAY closes the door to new inbound streams; a
        // peer that sent GOAWAY may still open streams until it closes.
        if self.state == SessionState::GoawaySent {
            self.send_rst(stream_id, RstStatus::RefusedStream);
            return None;
        }

        if associated_stream_id != 0 && !self.streams.contains_key(&associated_stream_id) {
            self.send_rst(stream_id, RstStatus::InvalidStream);
            return None;
        }

        if self.streams.len() >= self.config.max_streams_per_session {
            self.send_rst(stream_id, RstStatus::RefusedStream);
            return None;
        }

        let head = match bridge::synthesize_request_head(&headers) {
            Ok(head) => head,
            Err(e) => {
                tracing::debug!(stream_id, "unusable SYN_STREAM headers: {e}");
                self.send_rst(stream_id, RstStatus::ProtocolError);
                return None;
            }
        };

        let stream_bridge = StreamBridge::new(stream_id, priority, head, fin, self.gate.clone());

        let task = {
            let stream_bridge = stream_bridge.clone();
            let handler = self.handler.clone();
            Box::new(move || {
                let reader = RequestReader::new(stream_bridge.clone());
                let writer = ResponseWriter::new(stream_bridge);
                if let Err(err) = handler.handle(reader, writer) {
                    if !bridge::is_cancellation(&err) {
                        tracing::debug!("stream handler failed: {err}");
                    }
                }
            })
        };
        if self.executor.submit(task).is_err() {
            tracing::warn!(stream_id, "executor rejected stream work");
            self.send_rst(stream_id, RstStatus::RefusedStream);
            return None;
        }

        self.last_accepted_stream_id = stream_id;
        self.scheduler.register_stream(stream_id, priority);
        self.streams.insert(
            stream_id,
            StreamEntry {
                bridge: stream_bridge,
                remote_closed: fin,
                local_fin_queued: false,
                discard_output: unidirectional,
            },
        );
        None
    }

    fn handle_data(&mut self, stream_id: u32, data: Bytes, fin: bool) {
        let after_fin = match self.streams.get_mut(&stream_id) {
            None => {
                self.send_rst(stream_id, RstStatus::InvalidStream);
                return;
            }
            Some(entry) => {
                if entry.remote_closed {
                    true
                } else {
                    if fin {
                        entry.remote_closed = true;
                    }
                    entry.bridge.push_data(data, fin);
                    false
                }
            }
        };
        if after_fin {
            // Data after the peer's own FIN.
            self.reset_stream(stream_id, RstStatus::ProtocolError);
        }
    }

    /// Pull ready output from every bridge into the egress scheduler.
    fn collect_stream_output(&mut self) {
        let ids: Vec<u32> = self
            .streams
            .iter()
            .filter(|(_, e)| !e.local_fin_queued && e.bridge.has_pending_output())
            .map(|(id, _)| *id)
            .collect();

        let mut malformed: Vec<u32> = Vec::new();
        for id in ids {
            let entry = match self.streams.get_mut(&id) {
                Some(e) => e,
                None => continue,
            };
            let drained = match entry.bridge.drain_output(MAX_DATA_FRAME) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(stream_id = id, "bad response from worker: {e}");
                    malformed.push(id);
                    continue;
                }
            };

            if entry.discard_output {
                let total: usize =
                    drained.head_cost + drained.chunks.iter().map(|c| c.len()).sum::<usize>();
                self.gate.release(total);
                if drained.fin {
                    entry.local_fin_queued = true;
                }
                continue;
            }

            let finished = drained.fin;
            if let Some(headers) = drained.reply {
                self.scheduler.enqueue_stream(QueuedFrame::Reply {
                    stream_id: id,
                    fin: false,
                    headers,
                    cost: drained.head_cost,
                });
            }
            let count = drained.chunks.len();
            for (i, payload) in drained.chunks.into_iter().enumerate() {
                self.scheduler.enqueue_stream(QueuedFrame::Data {
                    stream_id: id,
                    payload,
                    fin: finished && i + 1 == count,
                });
            }
            if finished {
                if count == 0 {
                    self.scheduler.enqueue_stream(QueuedFrame::Data {
                        stream_id: id,
                        payload: Bytes::new(),
                        fin: true,
                    });
                }
                entry.local_fin_queued = true;
            }
        }

        for id in malformed {
            self.reset_stream(id, RstStatus::ProtocolError);
        }
    }

    /// Serialize and write everything the scheduler will give us.
    fn flush_egress(&mut self) -> Result<(), SessionStatus> {
        while let Some(frame) = self.scheduler.pop_next() {
            let cost = frame.cost();
            let bytes = match frame {
                QueuedFrame::Control(bytes) => bytes,
                QueuedFrame::Data {
                    stream_id,
                    payload,
                    fin,
                } => FrameEncoder::build_data(stream_id, &payload, fin),
                QueuedFrame::Reply {
                    stream_id,
                    fin,
                    headers,
                    ..
                } => match self.encoder.build_syn_reply(stream_id, fin, &headers) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        // A broken outbound compression context poisons
                        // every later frame; give up on the session.
                        self.gate.release(cost);
                        tracing::warn!(stream_id, "failed to build SYN_REPLY: {e}");
                        return Err(self.fatal_protocol_error(e));
                    }
                },
            };

            let write = transport::write_all(&mut self.transport, &bytes, Some(WRITE_TIMEOUT));
            self.gate.release(cost);
            if let Err(e) = write {
                tracing::warn!("transport write failed: {e}");
                return Err(SessionStatus::TransportError);
            }
        }
        Ok(())
    }

    /// Drop streams that are closed in both directions and fully flushed.
    fn reap_closed_streams(&mut self) {
        let done: Vec<u32> = self
            .streams
            .iter()
            .filter(|(id, e)| {
                e.remote_closed && e.local_fin_queued && !self.scheduler.stream_pending(**id)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            self.scheduler.drop_stream(id);
            self.streams.remove(&id);
        }
    }

    fn check_timers(&mut self) -> Option<SessionStatus> {
        if let Some((_, deadline)) = self.ping_in_flight {
            if Instant::now() >= deadline {
                tracing::warn!("liveness ping went unanswered");
                return Some(SessionStatus::TransportError);
            }
        }

        let idle = self.config.idle_read_timeout?;
        let quiet = self.last_activity.elapsed();
        if quiet >= idle {
            if self.state == SessionState::Active {
                tracing::debug!("idle-read timeout; shutting down");
                self.begin_goaway();
            }
        } else if quiet >= idle / 2
            && self.state == SessionState::Active
            && self.ping_in_flight.is_none()
        {
            if let Some(ack_timeout) = self.config.ping_ack_timeout {
                let token = self.next_ping_token;
                self.next_ping_token = self.next_ping_token.wrapping_add(2);
                self.scheduler
                    .enqueue_control(FrameEncoder::build_ping(token));
                self.ping_in_flight = Some((token, Instant::now() + ack_timeout));
            }
        }
        None
    }

    fn begin_goaway(&mut self) {
        self.state = SessionState::GoawaySent;
        self.scheduler
            .enqueue_control(FrameEncoder::build_goaway(self.last_accepted_stream_id));
    }

    /// Best-effort GOAWAY, then report the session as protocol-dead.
    fn fatal_protocol_error(&mut self, error: SpdyError) -> SessionStatus {
        tracing::warn!("session-fatal protocol error: {error}");
        let goaway = FrameEncoder::build_goaway(self.last_accepted_stream_id);
        let _ = transport::write_all(&mut self.transport, &goaway, Some(WRITE_TIMEOUT));
        SessionStatus::ProtocolError
    }

    /// Queue an RST_STREAM without touching stream state.
    fn send_rst(&mut self, stream_id: u32, status: RstStatus) {
        self.scheduler
            .enqueue_control(FrameEncoder::build_rst_stream(stream_id, status));
    }

    /// Abort a stream we own: cancel the bridge, discard its queue, and
    /// tell the peer.
    fn reset_stream(&mut self, stream_id: u32, status: RstStatus) {
        self.close_stream_silent(stream_id);
        self.send_rst(stream_id, status);
    }

    /// Close a stream without a wire response (peer RST, teardown).
    fn close_stream_silent(&mut self, stream_id: u32) {
        if let Some(entry) = self.streams.remove(&stream_id) {
            entry.bridge.cancel();
        }
        let budget = self.scheduler.drop_stream(stream_id);
        self.gate.release(budget);
    }

    fn teardown(&mut self) {
        let ids: Vec<u32> = self.streams.keys().copied().collect();
        for id in ids {
            self.close_stream_silent(id);
        }
        let _ = self.transport.close();
    }
}
