//! SPDY framing error types
//!
//! This module defines the framer error set and the RST_STREAM status
//! codes carried on the wire.

use std::fmt;

/// SPDY framing and codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Control frame is mal-formatted (bad layout, bad header block)
    #[error("invalid control frame")]
    InvalidControlFrame,

    /// Control frame payload exceeded the configured cap
    #[error("control frame payload too large: {0} bytes")]
    ControlPayloadTooLarge(usize),

    /// Control frame carried a version other than 2
    #[error("unsupported SPDY version: {0}")]
    UnsupportedVersion(u16),

    /// Inbound header block failed to decompress
    #[error("header block decompression failed")]
    DecompressFailure,

    /// Outbound header block failed to compress
    #[error("header block compression failed")]
    CompressFailure,

    /// The zlib context could not be initialized
    #[error("zlib context initialization failed")]
    ZlibInit,

    /// Header name is empty or not lowercase ASCII
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// The same name appeared twice in one header block
    #[error("duplicate header name: {0}")]
    DuplicateHeaderName(String),

    /// A name, value, or the serialized block exceeded its size limit
    #[error("header block exceeds size limits")]
    HeaderBlockTooLarge,

    /// Priority outside the 0..=3 range
    #[error("invalid stream priority: {0}")]
    InvalidPriority(u8),
}

impl Error {
    /// Collapse header-block shape errors into the wire-level error the
    /// framer reports for a bad control frame.
    pub(crate) fn into_frame_error(self) -> Error {
        match self {
            Error::InvalidHeaderName(_)
            | Error::DuplicateHeaderName(_)
            | Error::HeaderBlockTooLarge => Error::InvalidControlFrame,
            other => other,
        }
    }
}

/// Result type for SPDY codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// RST_STREAM status codes as defined by SPDY/2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RstStatus {
    /// Generic protocol violation scoped to one stream
    ProtocolError = 1,
    /// Frame received for a stream that is not active
    InvalidStream = 2,
    /// Stream was not processed (resource limits, shutdown)
    RefusedStream = 3,
    /// Peer asked for a SPDY version we do not speak
    UnsupportedVersion = 4,
    /// Stream is no longer needed
    Cancel = 5,
    /// Implementation fault on the sender side
    InternalError = 6,
    /// Flow-control violation
    FlowControlError = 7,
}

impl RstStatus {
    /// Convert status to its wire value
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create status from a wire value
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(RstStatus::ProtocolError),
            2 => Some(RstStatus::InvalidStream),
            3 => Some(RstStatus::RefusedStream),
            4 => Some(RstStatus::UnsupportedVersion),
            5 => Some(RstStatus::Cancel),
            6 => Some(RstStatus::InternalError),
            7 => Some(RstStatus::FlowControlError),
            _ => None,
        }
    }

    /// Get status name
    pub fn name(&self) -> &'static str {
        match self {
            RstStatus::ProtocolError => "PROTOCOL_ERROR",
            RstStatus::InvalidStream => "INVALID_STREAM",
            RstStatus::RefusedStream => "REFUSED_STREAM",
            RstStatus::UnsupportedVersion => "UNSUPPORTED_VERSION",
            RstStatus::Cancel => "CANCEL",
            RstStatus::InternalError => "INTERNAL_ERROR",
            RstStatus::FlowControlError => "FLOW_CONTROL_ERROR",
        }
    }
}

impl fmt::Display for RstStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rst_status_conversion() {
        assert_eq!(RstStatus::ProtocolError.as_u32(), 1);
        assert_eq!(RstStatus::FlowControlError.as_u32(), 7);

        assert_eq!(RstStatus::from_u32(1), Some(RstStatus::ProtocolError));
        assert_eq!(RstStatus::from_u32(3), Some(RstStatus::RefusedStream));
        assert_eq!(RstStatus::from_u32(0), None);
        assert_eq!(RstStatus::from_u32(8), None);
    }

    #[test]
    fn test_rst_status_name() {
        assert_eq!(RstStatus::Cancel.name(), "CANCEL");
        assert_eq!(RstStatus::RefusedStream.name(), "REFUSED_STREAM");
    }

    #[test]
    fn test_header_errors_collapse() {
        let err = Error::DuplicateHeaderName("host".to_string()).into_frame_error();
        assert!(matches!(err, Error::InvalidControlFrame));

        let err = Error::DecompressFailure.into_frame_error();
        assert!(matches!(err, Error::DecompressFailure));
    }
}
