//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default, so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::secure::FrameLimits;

const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:7070";
const DEFAULT_SERVER_MAX_CONNECTIONS: usize = 1024;
const DEFAULT_CLIENT_MAX_CONNECTIONS: usize = 16;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_MAX_CONN_WAIT_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_ACCEPT_BACKOFF_MS: u64 = 100;
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonteConfig {
    /// Listening side.
    pub server: ServerConfig,

    /// Dialing side.
    pub client: ClientConfig,

    /// Per-connection buffers and deadlines, shared by both sides.
    pub connection: ConnectionConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:7070").
    pub bind_address: String,

    /// Maximum concurrently handled connections (admission slots).
    pub max_connections: usize,

    /// Handshake deadline in milliseconds. Absent uses the default; 0 disables it.
    pub handshake_timeout_ms: Option<u64>,

    /// How long an accepted connection may wait for a free slot.
    pub max_conn_wait_timeout_ms: u64,

    /// Pause after a transient accept error.
    pub accept_backoff_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_SERVER_ADDRESS.to_string(),
            max_connections: DEFAULT_SERVER_MAX_CONNECTIONS,
            handshake_timeout_ms: None,
            max_conn_wait_timeout_ms: DEFAULT_MAX_CONN_WAIT_TIMEOUT_MS,
            accept_backoff_ms: DEFAULT_ACCEPT_BACKOFF_MS,
        }
    }
}

impl ServerConfig {
    pub fn effective_max_connections(&self) -> usize {
        positive_or(self.max_connections, DEFAULT_SERVER_MAX_CONNECTIONS)
    }

    /// `None` means the handshake has no deadline.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        handshake_timeout(self.handshake_timeout_ms)
    }

    pub fn max_conn_wait_timeout(&self) -> Duration {
        millis_or(self.max_conn_wait_timeout_ms, DEFAULT_MAX_CONN_WAIT_TIMEOUT_MS)
    }

    pub fn accept_backoff(&self) -> Duration {
        millis_or(self.accept_backoff_ms, DEFAULT_ACCEPT_BACKOFF_MS)
    }
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address to dial (e.g., "127.0.0.1:7070").
    pub address: String,

    /// Maximum concurrently open outbound connections.
    pub max_connections: usize,

    /// Connect plus handshake deadline in milliseconds. Absent uses the default; 0 disables it.
    pub handshake_timeout_ms: Option<u64>,

    /// How long `connect` may wait for a free slot.
    pub max_conn_wait_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDRESS.to_string(),
            max_connections: DEFAULT_CLIENT_MAX_CONNECTIONS,
            handshake_timeout_ms: None,
            max_conn_wait_timeout_ms: DEFAULT_MAX_CONN_WAIT_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    pub fn effective_max_connections(&self) -> usize {
        positive_or(self.max_connections, DEFAULT_CLIENT_MAX_CONNECTIONS)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        handshake_timeout(self.handshake_timeout_ms)
    }

    pub fn max_conn_wait_timeout(&self) -> Duration {
        millis_or(self.max_conn_wait_timeout_ms, DEFAULT_MAX_CONN_WAIT_TIMEOUT_MS)
    }
}

/// Per-connection buffer sizing and I/O deadlines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Largest decrypted frame (sequence number plus payload) accepted from the peer.
    pub read_buffer_size: usize,

    /// Largest plaintext frame this side will send.
    pub write_buffer_size: usize,

    /// Per-frame read deadline. 0 waits forever.
    pub read_timeout_ms: u64,

    /// Deadline for each frame write and flush.
    pub write_timeout_ms: u64,

    /// Default wait for a response, used by callers that do not pass their own.
    pub request_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout_ms: 0,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn effective_read_buffer_size(&self) -> usize {
        positive_or(self.read_buffer_size, DEFAULT_BUFFER_SIZE)
    }

    pub fn effective_write_buffer_size(&self) -> usize {
        positive_or(self.write_buffer_size, DEFAULT_BUFFER_SIZE)
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_read_plaintext: self.effective_read_buffer_size(),
            max_write_plaintext: self.effective_write_buffer_size(),
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        Some(millis_or(self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS))
    }

    pub fn request_timeout(&self) -> Duration {
        millis_or(self.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9091".to_string(),
        }
    }
}

fn positive_or(value: usize, default: usize) -> usize {
    if value == 0 {
        default
    } else {
        value
    }
}

fn millis_or(value: u64, default: u64) -> Duration {
    Duration::from_millis(if value == 0 { default } else { value })
}

fn handshake_timeout(ms: Option<u64>) -> Option<Duration> {
    match ms {
        None => Some(Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS)),
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
    }
}
