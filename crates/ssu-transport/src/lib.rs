//! # SSU Transport (downward UDP socket layer)
//!
//! The out-of-scope-per-spec "low-level UDP socket I/O" collaborator: a
//! thin, testable async UDP socket wrapper that the core crate's
//! `SsuFacade` drives. No kernel-bypass, multi-homing, or pluggable
//! non-UDP transports are implemented here -- the specification's
//! non-goals rule those out explicitly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod transport;
pub mod udp_async;

pub use transport::{Transport, TransportError, TransportResult, TransportStats};
pub use udp_async::AsyncUdpTransport;

/// Socket buffer sizing and bind configuration for the UDP transport.
/// Passed to [`udp_async::AsyncUdpTransport::bind_with_config`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TransportConfig {
    /// Receive buffer size, in bytes.
    pub recv_buffer_size: usize,
    /// Send buffer size, in bytes.
    pub send_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 256 * 1024,
            send_buffer_size: 256 * 1024,
        }
    }
}
