//! SPDY/2 frame parsing and serialization
//!
//! `FrameDecoder` is an incremental parser: callers feed byte slices and
//! receive frames through a `FrameVisitor`. `FrameEncoder` builds frames
//! into freshly allocated buffers, compressing header blocks through the
//! session's outbound context at build time.

use super::error::{Error, Result, RstStatus};
use super::frames::*;
use super::headers::HeaderBlock;
use super::zlib::{HeaderCompressor, HeaderDecompressor};
use bytes::{BufMut, Bytes, BytesMut};

/// Default cap on a control-frame payload (16 MiB)
pub const DEFAULT_CONTROL_FRAME_CAP: usize = 16 * 1024 * 1024;

/// Output channel of the frame decoder.
///
/// Exactly one of the three hooks is invoked per emitted frame,
/// synchronously within `feed`.
pub trait FrameVisitor {
    /// A complete control frame was parsed.
    fn on_control(&mut self, frame: ControlFrame);

    /// Payload bytes of a DATA frame arrived.
    ///
    /// `data` is valid only for the duration of the call; implementations
    /// that keep it must copy. One DATA frame may surface as several
    /// calls; `fin` is set on the last call for a FIN-flagged frame. A
    /// zero-length call with `fin` set signals end-of-stream with no
    /// payload.
    fn on_stream_data(&mut self, stream_id: u32, data: &[u8], fin: bool);

    /// The decoder hit a protocol error and latched.
    fn on_error(&mut self, error: Error);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    ReadingCommonHeader,
    InterpretControlFrameHeader,
    ControlFramePayload,
    IgnoreRemainingPayload,
    ForwardStreamFrame,
    AutoReset,
    Error,
}

/// Incremental SPDY/2 frame parser
///
/// Owns the inbound decompression context; all frames on one connection
/// must pass through a single decoder instance, in wire order.
pub struct FrameDecoder {
    state: DecoderState,
    error: Option<Error>,
    header: [u8; FRAME_HEADER_SIZE],
    header_filled: usize,
    control_version: u16,
    control_type_raw: u16,
    flags: u8,
    remaining_payload: usize,
    payload: Vec<u8>,
    data_stream_id: u32,
    control_frame_cap: usize,
    inflate: HeaderDecompressor,
}

impl FrameDecoder {
    /// Create a decoder with the default control-frame cap
    pub fn new() -> Self {
        Self::with_control_cap(DEFAULT_CONTROL_FRAME_CAP)
    }

    /// Create a decoder with an explicit control-frame payload cap
    pub fn with_control_cap(cap: usize) -> Self {
        FrameDecoder {
            state: DecoderState::ReadingCommonHeader,
            error: None,
            header: [0u8; FRAME_HEADER_SIZE],
            header_filled: 0,
            control_version: 0,
            control_type_raw: 0,
            flags: 0,
            remaining_payload: 0,
            payload: Vec::new(),
            data_stream_id: 0,
            control_frame_cap: cap,
            inflate: HeaderDecompressor::new(),
        }
    }

    /// Whether the decoder has latched an error
    pub fn has_error(&self) -> bool {
        self.state == DecoderState::Error
    }

    /// The latched error, if any
    pub fn latched_error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// True between frames (safe to stop feeding without data loss)
    pub fn at_frame_boundary(&self) -> bool {
        match self.state {
            // Per-frame fields are reset lazily on the next feed.
            DecoderState::AutoReset => true,
            DecoderState::ReadingCommonHeader => self.header_filled == 0,
            _ => false,
        }
    }

    /// Feed bytes into the parser, returning how many were consumed.
    ///
    /// Frames are reported through `visitor` as they complete. After an
    /// error the decoder is latched: every subsequent call consumes
    /// nothing and re-surfaces the error through `on_error`.
    pub fn feed(&mut self, data: &[u8], visitor: &mut dyn FrameVisitor) -> usize {
        if self.state == DecoderState::Error {
            if let Some(err) = self.error.clone() {
                visitor.on_error(err);
            }
            return 0;
        }

        let mut consumed = 0usize;
        while consumed < data.len() && self.state != DecoderState::Error {
            match self.state {
                DecoderState::AutoReset => self.reset_frame(),
                DecoderState::ReadingCommonHeader => {
                    let want = FRAME_HEADER_SIZE - self.header_filled;
                    let take = want.min(data.len() - consumed);
                    self.header[self.header_filled..self.header_filled + take]
                        .copy_from_slice(&data[consumed..consumed + take]);
                    self.header_filled += take;
                    consumed += take;
                    if self.header_filled == FRAME_HEADER_SIZE {
                        self.interpret_common_header(visitor);
                    }
                }
                DecoderState::InterpretControlFrameHeader => {
                    self.interpret_control_header(visitor);
                }
                DecoderState::ControlFramePayload => {
                    let take = self.remaining_payload.min(data.len() - consumed);
                    self.payload
                        .extend_from_slice(&data[consumed..consumed + take]);
                    self.remaining_payload -= take;
                    consumed += take;
                    if self.remaining_payload == 0 {
                        self.dispatch_control(visitor);
                    }
                }
                DecoderState::IgnoreRemainingPayload => {
                    let take = self.remaining_payload.min(data.len() - consumed);
                    self.remaining_payload -= take;
                    consumed += take;
                    if self.remaining_payload == 0 {
                        self.state = DecoderState::AutoReset;
                    }
                }
                DecoderState::ForwardStreamFrame => {
                    let take = self.remaining_payload.min(data.len() - consumed);
                    self.remaining_payload -= take;
                    let last = self.remaining_payload == 0;
                    let fin = last && (self.flags & FLAG_FIN) != 0;
                    visitor.on_stream_data(
                        self.data_stream_id,
                        &data[consumed..consumed + take],
                        fin,
                    );
                    consumed += take;
                    if last {
                        self.state = DecoderState::AutoReset;
                    }
                }
                DecoderState::Error => break,
            }
        }
        consumed
    }

    fn reset_frame(&mut self) {
        self.header_filled = 0;
        self.control_version = 0;
        self.control_type_raw = 0;
        self.flags = 0;
        self.remaining_payload = 0;
        self.payload.clear();
        self.data_stream_id = 0;
        self.state = DecoderState::ReadingCommonHeader;
    }

    fn set_error(&mut self, error: Error, visitor: &mut dyn FrameVisitor) {
        self.state = DecoderState::Error;
        self.error = Some(error.clone());
        visitor.on_error(error);
    }

    fn interpret_common_header(&mut self, visitor: &mut dyn FrameVisitor) {
        let h = &self.header;
        self.flags = h[4];
        self.remaining_payload =
            ((h[5] as usize) << 16) | ((h[6] as usize) << 8) | (h[7] as usize);

        if h[0] & 0x80 != 0 {
            // Control frame: 15-bit version, 16-bit type.
            self.control_version = (((h[0] & 0x7F) as u16) << 8) | h[1] as u16;
            self.control_type_raw = ((h[2] as u16) << 8) | h[3] as u16;
            self.state = DecoderState::InterpretControlFrameHeader;
            self.interpret_control_header(visitor);
        } else {
            // Data frame: 31-bit stream id.
            self.data_stream_id = u32::from_be_bytes([h[0], h[1], h[2], h[3]]) & STREAM_ID_MASK;
            if self.remaining_payload == 0 {
                if self.flags & FLAG_FIN != 0 {
                    visitor.on_stream_data(self.data_stream_id, &[], true);
                }
                self.state = DecoderState::AutoReset;
            } else {
                self.state = DecoderState::ForwardStreamFrame;
            }
        }
    }

    fn interpret_control_header(&mut self, visitor: &mut dyn FrameVisitor) {
        if self.control_version != SPDY_VERSION {
            self.set_error(Error::UnsupportedVersion(self.control_version), visitor);
            return;
        }
        if self.remaining_payload > self.control_frame_cap {
            self.set_error(
                Error::ControlPayloadTooLarge(self.remaining_payload),
                visitor,
            );
            return;
        }

        match ControlType::from_u16(self.control_type_raw) {
            Some(_) => {
                if self.remaining_payload == 0 {
                    self.dispatch_control(visitor);
                } else {
                    self.payload.clear();
                    self.payload.reserve(self.remaining_payload);
                    self.state = DecoderState::ControlFramePayload;
                }
            }
            None => {
                // Unknown control types are skipped wholesale.
                if self.remaining_payload == 0 {
                    self.state = DecoderState::AutoReset;
                } else {
                    self.state = DecoderState::IgnoreRemainingPayload;
                }
            }
        }
    }

    fn dispatch_control(&mut self, visitor: &mut dyn FrameVisitor) {
        let kind = match ControlType::from_u16(self.control_type_raw) {
            Some(kind) => kind,
            // Unknown types take the ignore path at interpret time.
            None => {
                self.state = DecoderState::AutoReset;
                return;
            }
        };
        match self.parse_control(kind) {
            Ok(frame) => {
                visitor.on_control(frame);
                self.state = DecoderState::AutoReset;
            }
            Err(e) => self.set_error(e.into_frame_error(), visitor),
        }
    }

    fn parse_control(&mut self, kind: ControlType) -> Result<ControlFrame> {
        let payload = std::mem::take(&mut self.payload);
        let fin = self.flags & FLAG_FIN != 0;
        match kind {
            ControlType::SynStream => {
                if payload.len() < 10 {
                    return Err(Error::InvalidControlFrame);
                }
                let stream_id = read_stream_id(&payload[0..4]);
                let associated_stream_id = read_stream_id(&payload[4..8]);
                let priority = payload[8] >> 6;
                let headers = self.decode_header_block(&payload[10..])?;
                Ok(ControlFrame::SynStream {
                    stream_id,
                    associated_stream_id,
                    priority,
                    fin,
                    unidirectional: self.flags & FLAG_UNIDIRECTIONAL != 0,
                    headers,
                })
            }
            ControlType::SynReply => {
                if payload.len() < 6 {
                    return Err(Error::InvalidControlFrame);
                }
                let stream_id = read_stream_id(&payload[0..4]);
                let headers = self.decode_header_block(&payload[6..])?;
                Ok(ControlFrame::SynReply {
                    stream_id,
                    fin,
                    headers,
                })
            }
            ControlType::RstStream => {
                if payload.len() != 8 {
                    return Err(Error::InvalidControlFrame);
                }
                Ok(ControlFrame::RstStream {
                    stream_id: read_stream_id(&payload[0..4]),
                    status: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
                })
            }
            ControlType::Settings => {
                if payload.len() < 4 {
                    return Err(Error::InvalidControlFrame);
                }
                let count =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
                if payload.len() != 4 + count * 8 {
                    return Err(Error::InvalidControlFrame);
                }
                let mut settings = Vec::with_capacity(count);
                for i in 0..count {
                    let off = 4 + i * 8;
                    // SPDY/2 stores the 24-bit settings id little-endian,
                    // unlike every other field on the wire.
                    let id = (payload[off] as u32)
                        | ((payload[off + 1] as u32) << 8)
                        | ((payload[off + 2] as u32) << 16);
                    let flags = payload[off + 3];
                    let value = u32::from_be_bytes([
                        payload[off + 4],
                        payload[off + 5],
                        payload[off + 6],
                        payload[off + 7],
                    ]);
                    settings.push(Setting { id, flags, value });
                }
                Ok(ControlFrame::Settings(settings))
            }
            ControlType::Noop => {
                if !payload.is_empty() {
                    return Err(Error::InvalidControlFrame);
                }
                Ok(ControlFrame::Noop)
            }
            ControlType::Ping => {
                if payload.len() != 4 {
                    return Err(Error::InvalidControlFrame);
                }
                Ok(ControlFrame::Ping {
                    token: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                })
            }
            ControlType::Goaway => {
                if payload.len() != 4 {
                    return Err(Error::InvalidControlFrame);
                }
                Ok(ControlFrame::Goaway {
                    last_accepted_stream_id: read_stream_id(&payload[0..4]),
                })
            }
        }
    }

    fn decode_header_block(&mut self, compressed: &[u8]) -> Result<HeaderBlock> {
        let raw = self.inflate.decompress(compressed)?;
        HeaderBlock::decode(&raw)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_stream_id(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & STREAM_ID_MASK
}

/// SPDY/2 frame builder
///
/// Owns the outbound compression context. SYN_STREAM and SYN_REPLY
/// frames must be built in the order they will reach the wire.
pub struct FrameEncoder {
    deflate: HeaderCompressor,
}

impl FrameEncoder {
    /// Create an encoder with a freshly primed compressor
    pub fn new() -> Result<Self> {
        Ok(FrameEncoder {
            deflate: HeaderCompressor::new()?,
        })
    }

    fn put_control_header(buf: &mut BytesMut, kind: ControlType, flags: u8, length: usize) {
        buf.put_u16(0x8000 | SPDY_VERSION);
        buf.put_u16(kind.as_u16());
        buf.put_u8(flags);
        buf.put_u8((length >> 16) as u8);
        buf.put_u8((length >> 8) as u8);
        buf.put_u8(length as u8);
    }

    /// Build a SYN_STREAM frame (client role and tests; the server core
    /// never initiates streams).
    pub fn build_syn_stream(
        &mut self,
        stream_id: u32,
        associated_stream_id: u32,
        priority: u8,
        fin: bool,
        unidirectional: bool,
        headers: &HeaderBlock,
    ) -> Result<Bytes> {
        if priority > LOWEST_PRIORITY {
            return Err(Error::InvalidPriority(priority));
        }
        let block = self.deflate.compress(&headers.encode()?)?;
        let length = 10 + block.len();
        if length > MAX_FRAME_PAYLOAD {
            return Err(Error::HeaderBlockTooLarge);
        }

        let mut flags = 0u8;
        if fin {
            flags |= FLAG_FIN;
        }
        if unidirectional {
            flags |= FLAG_UNIDIRECTIONAL;
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + length);
        Self::put_control_header(&mut buf, ControlType::SynStream, flags, length);
        buf.put_u32(stream_id & STREAM_ID_MASK);
        buf.put_u32(associated_stream_id & STREAM_ID_MASK);
        buf.put_u8(priority << 6);
        buf.put_u8(0);
        buf.put_slice(&block);
        Ok(buf.freeze())
    }

    /// Build a SYN_REPLY frame
    pub fn build_syn_reply(
        &mut self,
        stream_id: u32,
        fin: bool,
        headers: &HeaderBlock,
    ) -> Result<Bytes> {
        let block = self.deflate.compress(&headers.encode()?)?;
        let length = 6 + block.len();
        if length > MAX_FRAME_PAYLOAD {
            return Err(Error::HeaderBlockTooLarge);
        }

        let flags = if fin { FLAG_FIN } else { 0 };
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + length);
        Self::put_control_header(&mut buf, ControlType::SynReply, flags, length);
        buf.put_u32(stream_id & STREAM_ID_MASK);
        buf.put_u16(0);
        buf.put_slice(&block);
        Ok(buf.freeze())
    }

    /// Build an RST_STREAM frame
    pub fn build_rst_stream(stream_id: u32, status: RstStatus) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8);
        Self::put_control_header(&mut buf, ControlType::RstStream, 0, 8);
        buf.put_u32(stream_id & STREAM_ID_MASK);
        buf.put_u32(status.as_u32());
        buf.freeze()
    }

    /// Build a SETTINGS frame
    pub fn build_settings(settings: &[Setting]) -> Bytes {
        let length = 4 + settings.len() * 8;
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + length);
        Self::put_control_header(&mut buf, ControlType::Settings, 0, length);
        buf.put_u32(settings.len() as u32);
        for s in settings {
            buf.put_u8(s.id as u8);
            buf.put_u8((s.id >> 8) as u8);
            buf.put_u8((s.id >> 16) as u8);
            buf.put_u8(s.flags);
            buf.put_u32(s.value);
        }
        buf.freeze()
    }

    /// Build a NOOP frame
    pub fn build_noop() -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE);
        Self::put_control_header(&mut buf, ControlType::Noop, 0, 0);
        buf.freeze()
    }

    /// Build a PING frame
    pub fn build_ping(token: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);
        Self::put_control_header(&mut buf, ControlType::Ping, 0, 4);
        buf.put_u32(token);
        buf.freeze()
    }

    /// Build a GOAWAY frame
    pub fn build_goaway(last_accepted_stream_id: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);
        Self::put_control_header(&mut buf, ControlType::Goaway, 0, 4);
        buf.put_u32(last_accepted_stream_id & STREAM_ID_MASK);
        buf.freeze()
    }

    /// Build a DATA frame
    pub fn build_data(stream_id: u32, payload: &[u8], fin: bool) -> Bytes {
        debug_assert!(payload.len() <= MAX_FRAME_PAYLOAD);
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.put_u32(stream_id & STREAM_ID_MASK);
        buf.put_u8(if fin { FLAG_FIN } else { 0 });
        buf.put_u8((payload.len() >> 16) as u8);
        buf.put_u8((payload.len() >> 8) as u8);
        buf.put_u8(payload.len() as u8);
        buf.put_slice(payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        frames: Vec<ControlFrame>,
        data: Vec<(u32, Vec<u8>, bool)>,
        errors: Vec<Error>,
    }

    impl FrameVisitor for Collect {
        fn on_control(&mut self, frame: ControlFrame) {
            self.frames.push(frame);
        }
        fn on_stream_data(&mut self, stream_id: u32, data: &[u8], fin: bool) {
            self.data.push((stream_id, data.to_vec(), fin));
        }
        fn on_error(&mut self, error: Error) {
            self.errors.push(error);
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderBlock {
        let mut block = HeaderBlock::new();
        for (n, v) in pairs {
            block.insert(*n, *v).unwrap();
        }
        block
    }

    #[test]
    fn test_data_frame_layout() {
        let frame = FrameEncoder::build_data(1, b"hi!", true);
        assert_eq!(&frame[0..4], &[0, 0, 0, 1]); // control bit clear
        assert_eq!(frame[4], FLAG_FIN);
        assert_eq!(&frame[5..8], &[0, 0, 3]);
        assert_eq!(&frame[8..], b"hi!");
    }

    #[test]
    fn test_rst_stream_layout() {
        let frame = FrameEncoder::build_rst_stream(7, RstStatus::Cancel);
        assert_eq!(&frame[0..2], &[0x80, 0x02]); // control bit + version 2
        assert_eq!(&frame[2..4], &[0, 3]); // RST_STREAM
        assert_eq!(frame[4], 0);
        assert_eq!(&frame[5..8], &[0, 0, 8]);
        assert_eq!(&frame[8..12], &[0, 0, 0, 7]);
        assert_eq!(&frame[12..16], &[0, 0, 0, 5]); // CANCEL
    }

    #[test]
    fn test_settings_little_endian_id() {
        let frame = FrameEncoder::build_settings(&[Setting::new(4, 100)]);
        // One entry: count, then 24-bit LE id + flags, then BE value.
        assert_eq!(&frame[8..12], &[0, 0, 0, 1]);
        assert_eq!(&frame[12..16], &[4, 0, 0, 0]);
        assert_eq!(&frame[16..20], &[0, 0, 0, 100]);

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        assert_eq!(decoder.feed(&frame, &mut out), frame.len());
        assert_eq!(
            out.frames,
            vec![ControlFrame::Settings(vec![Setting::new(4, 100)])]
        );
    }

    #[test]
    fn test_syn_stream_roundtrip() {
        let mut encoder = FrameEncoder::new().unwrap();
        let block = headers(&[
            ("method", "GET"),
            ("url", "/"),
            ("version", "HTTP/1.1"),
            ("host", "example.com"),
        ]);
        let frame = encoder
            .build_syn_stream(1, 0, 2, true, false, &block)
            .unwrap();

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        assert_eq!(decoder.feed(&frame, &mut out), frame.len());
        assert_eq!(
            out.frames,
            vec![ControlFrame::SynStream {
                stream_id: 1,
                associated_stream_id: 0,
                priority: 2,
                fin: true,
                unidirectional: false,
                headers: block,
            }]
        );
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_syn_reply_roundtrip() {
        let mut encoder = FrameEncoder::new().unwrap();
        let block = headers(&[("status", "200 OK"), ("version", "HTTP/1.1")]);
        let frame = encoder.build_syn_reply(1, false, &block).unwrap();

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        decoder.feed(&frame, &mut out);
        assert_eq!(
            out.frames,
            vec![ControlFrame::SynReply {
                stream_id: 1,
                fin: false,
                headers: block,
            }]
        );
    }

    #[test]
    fn test_ping_goaway_noop_roundtrip() {
        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();

        let mut wire = Vec::new();
        wire.extend_from_slice(&FrameEncoder::build_ping(0xdead_beef));
        wire.extend_from_slice(&FrameEncoder::build_goaway(41));
        wire.extend_from_slice(&FrameEncoder::build_noop());

        assert_eq!(decoder.feed(&wire, &mut out), wire.len());
        assert_eq!(
            out.frames,
            vec![
                ControlFrame::Ping { token: 0xdead_beef },
                ControlFrame::Goaway {
                    last_accepted_stream_id: 41
                },
                ControlFrame::Noop,
            ]
        );
    }

    #[test]
    fn test_byte_at_a_time_equivalence() {
        let mut encoder = FrameEncoder::new().unwrap();
        let block = headers(&[("method", "POST"), ("url", "/x"), ("version", "HTTP/1.1")]);
        let mut wire = Vec::new();
        wire.extend_from_slice(
            &encoder
                .build_syn_stream(3, 0, 0, false, false, &block)
                .unwrap(),
        );
        wire.extend_from_slice(&FrameEncoder::build_data(3, b"hello", true));
        wire.extend_from_slice(&FrameEncoder::build_ping(2));

        let mut whole = Collect::default();
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(&wire, &mut whole), wire.len());

        let mut dribbled = Collect::default();
        let mut decoder = FrameDecoder::new();
        for byte in &wire {
            assert_eq!(decoder.feed(std::slice::from_ref(byte), &mut dribbled), 1);
        }

        assert_eq!(whole.frames, dribbled.frames);
        let whole_data: Vec<u8> = whole.data.iter().flat_map(|(_, d, _)| d.clone()).collect();
        let dribbled_data: Vec<u8> = dribbled
            .data
            .iter()
            .flat_map(|(_, d, _)| d.clone())
            .collect();
        assert_eq!(whole_data, dribbled_data);
        assert_eq!(
            whole.data.last().map(|(_, _, fin)| *fin),
            dribbled.data.last().map(|(_, _, fin)| *fin)
        );
    }

    #[test]
    fn test_zero_length_data_with_fin() {
        let frame = FrameEncoder::build_data(9, &[], true);
        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        decoder.feed(&frame, &mut out);
        assert_eq!(out.data, vec![(9, Vec::new(), true)]);
    }

    #[test]
    fn test_zero_length_data_without_fin_is_silent() {
        let frame = FrameEncoder::build_data(9, &[], false);
        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        decoder.feed(&frame, &mut out);
        assert!(out.data.is_empty());
    }

    #[test]
    fn test_version_mismatch_latches() {
        let mut frame = FrameEncoder::build_ping(1).to_vec();
        frame[1] = 3; // version 3

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        decoder.feed(&frame, &mut out);
        assert!(decoder.has_error());
        assert_eq!(out.errors, vec![Error::UnsupportedVersion(3)]);

        // Latched: subsequent feeds consume nothing and re-surface.
        let good = FrameEncoder::build_ping(2);
        assert_eq!(decoder.feed(&good, &mut out), 0);
        assert_eq!(out.errors.len(), 2);
        assert!(out.frames.is_empty());
    }

    #[test]
    fn test_control_payload_cap() {
        let mut frame = FrameEncoder::build_ping(1).to_vec();
        // Rewrite the length field to exceed a tiny cap.
        frame[5] = 0x00;
        frame[6] = 0x10;
        frame[7] = 0x00;

        let mut decoder = FrameDecoder::with_control_cap(1024);
        let mut out = Collect::default();
        decoder.feed(&frame, &mut out);
        assert_eq!(out.errors, vec![Error::ControlPayloadTooLarge(0x1000)]);
    }

    #[test]
    fn test_unknown_control_type_skipped() {
        let mut wire = Vec::new();
        // Type 8 (HEADERS in later drafts) with a 4-byte payload.
        wire.extend_from_slice(&[0x80, 0x02, 0x00, 0x08, 0x00, 0x00, 0x00, 0x04]);
        wire.extend_from_slice(&[1, 2, 3, 4]);
        wire.extend_from_slice(&FrameEncoder::build_ping(7));

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        assert_eq!(decoder.feed(&wire, &mut out), wire.len());
        assert_eq!(out.frames, vec![ControlFrame::Ping { token: 7 }]);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_truncated_rst_stream_is_invalid() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&[0x80, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04]);
        wire.extend_from_slice(&[0, 0, 0, 1]); // only the stream id

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        decoder.feed(&wire, &mut out);
        assert_eq!(out.errors, vec![Error::InvalidControlFrame]);
    }

    #[test]
    fn test_corrupt_header_block_is_decompress_failure() {
        // SYN_REPLY whose "compressed" block is garbage.
        let mut wire = Vec::new();
        let length = 6 + 4;
        wire.extend_from_slice(&[0x80, 0x02, 0x00, 0x02, 0x00]);
        wire.extend_from_slice(&[0, 0, length as u8]);
        wire.extend_from_slice(&[0, 0, 0, 1, 0, 0]);
        wire.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        decoder.feed(&wire, &mut out);
        assert_eq!(out.errors, vec![Error::DecompressFailure]);
    }

    #[test]
    fn test_priority_out_of_range_rejected_by_builder() {
        let mut encoder = FrameEncoder::new().unwrap();
        let block = headers(&[("method", "GET")]);
        assert!(matches!(
            encoder.build_syn_stream(1, 0, 4, false, false, &block),
            Err(Error::InvalidPriority(4))
        ));
    }

    #[test]
    fn test_large_data_frame_chunked_delivery() {
        let payload = vec![7u8; 100_000];
        let frame = FrameEncoder::build_data(5, &payload, true);

        let mut decoder = FrameDecoder::new();
        let mut out = Collect::default();
        // Feed in 4 KiB slices.
        let mut offset = 0;
        while offset < frame.len() {
            let end = (offset + 4096).min(frame.len());
            let n = decoder.feed(&frame[offset..end], &mut out);
            assert_eq!(n, end - offset);
            offset = end;
        }

        let collected: Vec<u8> = out.data.iter().flat_map(|(_, d, _)| d.clone()).collect();
        assert_eq!(collected, payload);
        assert_eq!(out.data.last().unwrap().2, true);
        assert!(out.data.iter().rev().skip(1).all(|(_, _, fin)| !fin));
    }
}
