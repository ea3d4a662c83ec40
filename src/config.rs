//! Session configuration
//!
//! The knobs a collaborator can set before handing a connection to
//! `SpdySession`.

use std::time::Duration;

/// Configuration for one SPDY session
#[derive(Debug, Clone)]
pub struct SpdyConfig {
    /// Maximum concurrently active inbound streams; excess SYN_STREAMs
    /// are refused with RST_STREAM REFUSED_STREAM.
    pub max_streams_per_session: usize,

    /// Worker-thread bound the collaborator should size its executor to.
    pub max_threads_per_process: usize,

    /// Whether SPDY is advertised during protocol negotiation at all.
    pub spdy_enabled: bool,

    /// Upper bound for a single control-frame payload.
    pub control_frame_cap_bytes: usize,

    /// High-water mark for bytes buffered toward the wire across all
    /// streams; producers block once it is reached.
    pub egress_high_water_bytes: usize,

    /// Idle-read timeout; expiry is an orderly shutdown.
    pub idle_read_timeout: Option<Duration>,

    /// How long an unanswered liveness PING may stay in flight before
    /// the session shuts down with an error.
    pub ping_ack_timeout: Option<Duration>,
}

impl Default for SpdyConfig {
    fn default() -> Self {
        SpdyConfig {
            max_streams_per_session: 100,
            max_threads_per_process: 10,
            spdy_enabled: true,
            control_frame_cap_bytes: 16 * 1024 * 1024,
            egress_high_water_bytes: 1024 * 1024,
            idle_read_timeout: None,
            ping_ack_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl SpdyConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> SpdyConfigBuilder {
        SpdyConfigBuilder {
            config: SpdyConfig::default(),
        }
    }
}

/// Builder for `SpdyConfig`
pub struct SpdyConfigBuilder {
    config: SpdyConfig,
}

impl SpdyConfigBuilder {
    pub fn max_streams_per_session(mut self, value: usize) -> Self {
        self.config.max_streams_per_session = value;
        self
    }

    pub fn max_threads_per_process(mut self, value: usize) -> Self {
        self.config.max_threads_per_process = value;
        self
    }

    pub fn spdy_enabled(mut self, value: bool) -> Self {
        self.config.spdy_enabled = value;
        self
    }

    pub fn control_frame_cap_bytes(mut self, value: usize) -> Self {
        self.config.control_frame_cap_bytes = value;
        self
    }

    pub fn egress_high_water_bytes(mut self, value: usize) -> Self {
        self.config.egress_high_water_bytes = value;
        self
    }

    pub fn idle_read_timeout(mut self, value: Option<Duration>) -> Self {
        self.config.idle_read_timeout = value;
        self
    }

    pub fn ping_ack_timeout(mut self, value: Option<Duration>) -> Self {
        self.config.ping_ack_timeout = value;
        self
    }

    pub fn build(self) -> SpdyConfig {
        self.config
    }
}
