//! SPDY/2 wire protocol
//!
//! Leaf modules for the protocol itself: frame model, header blocks, the
//! shared-dictionary compression contexts, and the incremental frame
//! codec. Everything here is session-agnostic; the session layer in
//! `crate::session` drives these pieces over a transport.

pub mod codec;
pub mod error;
pub mod frames;
pub mod headers;
pub mod zlib;

pub use codec::{FrameDecoder, FrameEncoder, FrameVisitor, DEFAULT_CONTROL_FRAME_CAP};
pub use error::{Error, RstStatus};
pub use frames::{
    ControlFrame, ControlType, DataFrame, Setting, FLAG_FIN, FLAG_UNIDIRECTIONAL,
    FRAME_HEADER_SIZE, LOWEST_PRIORITY, MAX_FRAME_PAYLOAD, SPDY_VERSION,
};
pub use headers::HeaderBlock;
