//! Egress frame scheduling
//!
//! Session control frames drain first, FIFO. Among streams the highest
//! priority band wins; within a band streams rotate round-robin, one
//! frame per turn, so a deep queue cannot starve its neighbors. Frames
//! within a single stream's queue are never reordered.
//!
//! Stream frames stay logical until they are popped: SYN_REPLY header
//! blocks must pass through the shared compressor in wire order, so
//! serialization happens at emission time, not enqueue time.

use crate::spdy::frames::LOWEST_PRIORITY;
use crate::spdy::headers::HeaderBlock;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

/// A frame waiting to go out
pub(crate) enum QueuedFrame {
    /// Pre-serialized session control frame (RST, PING, SETTINGS, GOAWAY)
    Control(Bytes),
    /// SYN_REPLY, compressed when popped
    Reply {
        stream_id: u32,
        fin: bool,
        headers: HeaderBlock,
        cost: usize,
    },
    /// DATA frame payload
    Data {
        stream_id: u32,
        payload: Bytes,
        fin: bool,
    },
}

impl QueuedFrame {
    /// Egress-budget bytes to return once this frame reaches the wire
    pub(crate) fn cost(&self) -> usize {
        match self {
            QueuedFrame::Control(_) => 0,
            QueuedFrame::Reply { cost, .. } => *cost,
            QueuedFrame::Data { payload, .. } => payload.len(),
        }
    }
}

struct StreamQueue {
    priority: u8,
    frames: VecDeque<QueuedFrame>,
    fin_enqueued: bool,
    in_band: bool,
}

/// Priority-ordered egress queue for one session
pub(crate) struct EgressScheduler {
    control: VecDeque<Bytes>,
    bands: [VecDeque<u32>; 4],
    streams: HashMap<u32, StreamQueue>,
}

impl EgressScheduler {
    pub(crate) fn new() -> Self {
        EgressScheduler {
            control: VecDeque::new(),
            bands: Default::default(),
            streams: HashMap::new(),
        }
    }

    /// Register a stream before any of its frames are queued
    pub(crate) fn register_stream(&mut self, stream_id: u32, priority: u8) {
        let priority = priority.min(LOWEST_PRIORITY);
        self.streams.insert(
            stream_id,
            StreamQueue {
                priority,
                frames: VecDeque::new(),
                fin_enqueued: false,
                in_band: false,
            },
        );
    }

    /// Queue a session-level control frame
    pub(crate) fn enqueue_control(&mut self, frame: Bytes) {
        self.control.push_back(frame);
    }

    /// Queue a frame for a stream.
    ///
    /// Frames for unregistered streams and frames following a FIN are
    /// silently dropped; their budget is the caller's to release.
    pub(crate) fn enqueue_stream(&mut self, frame: QueuedFrame) -> bool {
        let (stream_id, fin) = match &frame {
            QueuedFrame::Reply { stream_id, fin, .. } => (*stream_id, *fin),
            QueuedFrame::Data {
                stream_id, fin, ..
            } => (*stream_id, *fin),
            QueuedFrame::Control(_) => {
                if let QueuedFrame::Control(bytes) = frame {
                    self.control.push_back(bytes);
                }
                return true;
            }
        };

        let queue = match self.streams.get_mut(&stream_id) {
            Some(q) if !q.fin_enqueued => q,
            _ => return false,
        };
        queue.frames.push_back(frame);
        if fin {
            queue.fin_enqueued = true;
        }
        if !queue.in_band {
            queue.in_band = true;
            self.bands[queue.priority as usize].push_back(stream_id);
        }
        true
    }

    /// Pop the next frame to serialize, per the scheduling policy.
    pub(crate) fn pop_next(&mut self) -> Option<QueuedFrame> {
        if let Some(frame) = self.control.pop_front() {
            return Some(QueuedFrame::Control(frame));
        }

        for band in self.bands.iter_mut() {
            while let Some(stream_id) = band.pop_front() {
                let queue = match self.streams.get_mut(&stream_id) {
                    Some(q) => q,
                    None => continue, // dropped stream, stale band entry
                };
                let frame = match queue.frames.pop_front() {
                    Some(f) => f,
                    None => {
                        queue.in_band = false;
                        continue;
                    }
                };
                if queue.frames.is_empty() {
                    queue.in_band = false;
                } else {
                    band.push_back(stream_id);
                }
                return Some(frame);
            }
        }
        None
    }

    /// Whether a stream still has queued frames
    pub(crate) fn stream_pending(&self, stream_id: u32) -> bool {
        self.streams
            .get(&stream_id)
            .map(|q| !q.frames.is_empty())
            .unwrap_or(false)
    }

    /// Drop a stream's queue, returning the budget held by its frames.
    pub(crate) fn drop_stream(&mut self, stream_id: u32) -> usize {
        match self.streams.remove(&stream_id) {
            Some(queue) => queue.frames.iter().map(|f| f.cost()).sum(),
            None => 0,
        }
    }

    /// True when nothing at all is queued
    pub(crate) fn is_empty(&self) -> bool {
        self.control.is_empty() && self.streams.values().all(|q| q.frames.is_empty())
    }
}
