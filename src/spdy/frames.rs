//! SPDY/2 frame types
//!
//! Every frame begins with an 8-byte common header. The first bit selects
//! between control frames (version, type, flags, 24-bit length) and data
//! frames (31-bit stream id, flags, 24-bit length).

use super::error::RstStatus;
use super::headers::HeaderBlock;
use bytes::Bytes;
use std::fmt;

/// SPDY protocol version implemented by this crate
pub const SPDY_VERSION: u16 = 2;

/// Size of the common frame header (8 bytes)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest expressible frame payload (24-bit length field)
pub const MAX_FRAME_PAYLOAD: usize = 0x00FF_FFFF;

/// Stream id mask (31 bits, high bit reserved)
pub const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// FIN flag on DATA, SYN_STREAM and SYN_REPLY frames (0x1)
pub const FLAG_FIN: u8 = 0x01;

/// UNIDIRECTIONAL flag on SYN_STREAM frames (0x2)
pub const FLAG_UNIDIRECTIONAL: u8 = 0x02;

/// Lowest (numerically highest) stream priority
pub const LOWEST_PRIORITY: u8 = 3;

/// SPDY/2 control frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ControlType {
    /// SYN_STREAM (1) - opens a new stream
    SynStream = 1,
    /// SYN_REPLY (2) - response to SYN_STREAM
    SynReply = 2,
    /// RST_STREAM (3) - aborts a stream
    RstStream = 3,
    /// SETTINGS (4) - session-wide parameters
    Settings = 4,
    /// NOOP (5) - ignored on receipt
    Noop = 5,
    /// PING (6) - liveness token, reflected by the peer
    Ping = 6,
    /// GOAWAY (7) - orderly shutdown
    Goaway = 7,
}

impl ControlType {
    /// Convert control type to its wire value
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Create control type from a wire value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ControlType::SynStream),
            2 => Some(ControlType::SynReply),
            3 => Some(ControlType::RstStream),
            4 => Some(ControlType::Settings),
            5 => Some(ControlType::Noop),
            6 => Some(ControlType::Ping),
            7 => Some(ControlType::Goaway),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            ControlType::SynStream => "SYN_STREAM",
            ControlType::SynReply => "SYN_REPLY",
            ControlType::RstStream => "RST_STREAM",
            ControlType::Settings => "SETTINGS",
            ControlType::Noop => "NOOP",
            ControlType::Ping => "PING",
            ControlType::Goaway => "GOAWAY",
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u16())
    }
}

/// One SETTINGS entry: 24-bit id, 8-bit per-entry flags, 32-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: u32,
    pub flags: u8,
    pub value: u32,
}

impl Setting {
    pub fn new(id: u32, value: u32) -> Self {
        Setting { id, flags: 0, value }
    }
}

/// Well-known SETTINGS ids
pub mod setting_id {
    pub const UPLOAD_BANDWIDTH: u32 = 1;
    pub const DOWNLOAD_BANDWIDTH: u32 = 2;
    pub const ROUND_TRIP_TIME: u32 = 3;
    pub const MAX_CONCURRENT_STREAMS: u32 = 4;
    pub const CURRENT_CWND: u32 = 5;
}

/// A fully parsed control frame
///
/// SYN_STREAM and SYN_REPLY carry their header blocks already
/// decompressed and decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    SynStream {
        stream_id: u32,
        associated_stream_id: u32,
        priority: u8,
        fin: bool,
        unidirectional: bool,
        headers: HeaderBlock,
    },
    SynReply {
        stream_id: u32,
        fin: bool,
        headers: HeaderBlock,
    },
    RstStream {
        stream_id: u32,
        status: u32,
    },
    Settings(Vec<Setting>),
    Noop,
    Ping {
        token: u32,
    },
    Goaway {
        last_accepted_stream_id: u32,
    },
}

impl ControlFrame {
    /// The stream this frame is associated with, if any
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            ControlFrame::SynStream { stream_id, .. }
            | ControlFrame::SynReply { stream_id, .. }
            | ControlFrame::RstStream { stream_id, .. } => Some(*stream_id),
            _ => None,
        }
    }

    /// Frame type tag
    pub fn control_type(&self) -> ControlType {
        match self {
            ControlFrame::SynStream { .. } => ControlType::SynStream,
            ControlFrame::SynReply { .. } => ControlType::SynReply,
            ControlFrame::RstStream { .. } => ControlType::RstStream,
            ControlFrame::Settings(_) => ControlType::Settings,
            ControlFrame::Noop => ControlType::Noop,
            ControlFrame::Ping { .. } => ControlType::Ping,
            ControlFrame::Goaway { .. } => ControlType::Goaway,
        }
    }

    /// Decoded RST_STREAM status, if this is an RST_STREAM
    pub fn rst_status(&self) -> Option<RstStatus> {
        match self {
            ControlFrame::RstStream { status, .. } => RstStatus::from_u32(*status),
            _ => None,
        }
    }
}

/// A DATA frame as queued for transmission
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub stream_id: u32,
    pub payload: Bytes,
    pub fin: bool,
}

impl DataFrame {
    pub fn new(stream_id: u32, payload: Bytes, fin: bool) -> Self {
        DataFrame {
            stream_id,
            payload,
            fin,
        }
    }
}
