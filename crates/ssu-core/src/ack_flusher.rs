//! Acknowledgement Flusher (C6): periodically drains each peer's pending
//! ACKs out of the IMF and hands back the DATA payloads to send (spec §5,
//! §9 REDESIGN FLAG).
//!
//! The legacy sweep walked a fixed peer table by index and, on hitting an
//! empty slot, failed to advance -- spinning forever instead of moving to
//! the next peer. This sweep instead collects the (small, churned-every-tick)
//! set of peers with reassembly state into a `Vec` and iterates it with a
//! plain `for`, which always advances regardless of which peers have
//! since been torn down.

use crate::config::AckFlusherConfig;
use crate::imf::Imf;
use crate::types::RouterHash;
use crate::wire::DataPayload;
use std::time::{Duration, Instant};

/// Drives the periodic ACK sweep.
pub struct AckFlusher {
    config: AckFlusherConfig,
}

impl AckFlusher {
    /// Construct a flusher with the given sweep interval.
    #[must_use]
    pub fn new(config: AckFlusherConfig) -> Self {
        Self { config }
    }

    /// Drain every peer's pending ACKs, returning one DATA payload (with no
    /// fragments, only ACK fields) per peer that had anything to send.
    #[must_use]
    pub fn sweep(&self, imf: &mut Imf) -> Vec<(RouterHash, DataPayload)> {
        let mut out = Vec::new();
        for router_hash in imf.peers_with_state() {
            if !imf.has_pending_acks(&router_hash) {
                continue;
            }
            let (explicit_acks, ack_bitfields) = imf.take_pending_acks(&router_hash);
            if explicit_acks.is_empty() && ack_bitfields.is_empty() {
                continue;
            }
            out.push((
                router_hash,
                DataPayload {
                    want_reply: false,
                    explicit_acks,
                    ack_bitfields,
                    fragments: vec![],
                },
            ));
        }
        out
    }

    /// The next absolute sweep time, re-armed from `last_fire` rather than
    /// from "now" -- so sweep cadence doesn't drift under load even if one
    /// sweep runs long.
    #[must_use]
    pub fn next_fire_at(&self, last_fire: Instant) -> Instant {
        last_fire + self.config.flush_interval
    }

    /// The configured sweep interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.config.flush_interval
    }
}
