//! Typed configuration surface for the SSU transport (SPEC_FULL §10.1).
//!
//! `SsuConfig::default()` reproduces every constant named in the
//! specification (10s IMF TTL, 5 OMF retries, 1s ACK flush interval, 60s
//! peer inactivity timeout); every field can be overridden independently for
//! testing or deployment tuning. No environment-variable or file parsing is
//! mandated here -- that belongs to the out-of-scope CLI/process layer --
//! but the type is `serde`-(de)serializable so an embedding application can
//! load it from its own config file.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level SSU transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsuConfig {
    /// Local UDP endpoint to bind.
    pub listen_addr: SocketAddr,
    /// Peer Table tunables.
    pub peer_table: PeerTableConfig,
    /// Establishment Manager tunables.
    pub establishment: EstablishmentConfig,
    /// Inbound Message Fragments tunables.
    pub imf: ImfConfig,
    /// Outbound Message Fragments tunables.
    pub omf: OmfConfig,
    /// Acknowledgement Flusher tunables.
    pub ack_flusher: AckFlusherConfig,
    /// UDP socket buffer sizing, passed to
    /// [`ssu_transport::udp_async::AsyncUdpTransport::bind_with_config`] when
    /// the embedder binds the transport this config describes.
    pub transport: ssu_transport::TransportConfig,
}

impl Default for SsuConfig {
    fn default() -> Self {
        Self {
            #[cfg(test)]
            listen_addr: "0.0.0.0:0".parse().unwrap(),
            #[cfg(not(test))]
            listen_addr: "0.0.0.0:8887".parse().unwrap(),
            peer_table: PeerTableConfig::default(),
            establishment: EstablishmentConfig::default(),
            imf: ImfConfig::default(),
            omf: OmfConfig::default(),
            ack_flusher: AckFlusherConfig::default(),
            transport: ssu_transport::TransportConfig::default(),
        }
    }
}

/// Peer Table (C2) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerTableConfig {
    /// Inactivity timeout before a peer is destroyed and `disconnectedSignal` fires.
    #[serde(with = "duration_secs")]
    pub inactivity_timeout: Duration,
}

impl Default for PeerTableConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(60),
        }
    }
}

/// Establishment Manager (C3) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstablishmentConfig {
    /// Deadline after which an in-progress handshake is abandoned (→ FAILURE).
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
    /// Acceptable wall-clock skew for a handshake message's timestamp field.
    /// Resolves the TODO in spec §4.1/§9.
    #[serde(with = "duration_secs")]
    pub timestamp_skew: Duration,
}

impl Default for EstablishmentConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            timestamp_skew: Duration::from_secs(60),
        }
    }
}

/// Inbound Message Fragments (C4) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImfConfig {
    /// Time-to-live for a half-assembled message before it is dropped
    /// regardless of completeness.
    #[serde(with = "duration_secs")]
    pub entry_ttl: Duration,
    /// Upper bound on total bytes held across all half-assembled messages,
    /// the memory-exhaustion cap spec §5/§9 mandates implementers add.
    pub max_half_assembled_bytes: usize,
}

impl Default for ImfConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(10),
            max_half_assembled_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Outbound Message Fragments (C5) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmfConfig {
    /// Maximum payload bytes of I2NP data carried per DATA packet.
    pub fragment_mtu: usize,
    /// Maximum retransmit attempts before abandoning a message.
    pub max_retries: u32,
    /// Initial retransmit timer duration; doubles (capped) on each retry.
    #[serde(with = "duration_millis")]
    pub initial_retransmit_timeout: Duration,
    /// Ceiling for the backed-off retransmit timer.
    #[serde(with = "duration_millis")]
    pub max_retransmit_timeout: Duration,
}

impl Default for OmfConfig {
    fn default() -> Self {
        Self {
            fragment_mtu: 1024,
            max_retries: 5,
            initial_retransmit_timeout: Duration::from_millis(1_000),
            max_retransmit_timeout: Duration::from_millis(16_000),
        }
    }
}

/// Acknowledgement Flusher (C6) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckFlusherConfig {
    /// Interval between sweeps; re-armed at `last_fire + interval`
    /// (absolute, not relative to completion) to preserve cadence under load.
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
}

impl Default for AckFlusherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(1_000),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
