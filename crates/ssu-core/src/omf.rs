//! Outbound Message Fragments (C5): fragmentation of outgoing application
//! messages and their retransmission until acknowledged or abandoned (spec §5).

use crate::config::OmfConfig;
use crate::error::CoreError;
use crate::types::{Endpoint, MessageId, RouterHash, MAX_FRAGMENT_NUMBER};
use crate::wire::{AckBitfield, Fragment};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

struct OutboundMessageState {
    router_hash: RouterHash,
    endpoint: Endpoint,
    fragments: Vec<Fragment>,
    acked: Vec<bool>,
    attempts: u32,
    retransmit_timeout: Duration,
    next_retransmit_at: Instant,
}

impl OutboundMessageState {
    fn is_complete(&self) -> bool {
        self.acked.iter().all(|&a| a)
    }

    fn unacked_fragments(&self) -> Vec<Fragment> {
        self.fragments
            .iter()
            .zip(&self.acked)
            .filter(|(_, acked)| !**acked)
            .map(|(frag, _)| frag.clone())
            .collect()
    }
}

/// Outcome of one retransmission sweep.
#[derive(Debug, Default)]
pub struct RetransmitSweep {
    /// Messages still within their retry budget: fragments to resend now.
    pub retransmissions: Vec<(MessageId, Endpoint, Vec<Fragment>)>,
    /// Messages that exhausted their retry budget and were abandoned.
    pub failed: Vec<MessageId>,
}

/// Fragments and tracks outbound application messages until every fragment
/// is acknowledged or the retry budget is exhausted.
pub struct Omf {
    messages: HashMap<MessageId, OutboundMessageState>,
    by_router: HashMap<RouterHash, HashSet<MessageId>>,
    next_id: u32,
    config: OmfConfig,
}

impl Omf {
    /// Construct an empty outbound table.
    #[must_use]
    pub fn new(config: OmfConfig) -> Self {
        let mut seed = [0u8; 4];
        ssu_crypto::random::fill_random(&mut seed);
        Self {
            messages: HashMap::new(),
            by_router: HashMap::new(),
            next_id: u32::from_be_bytes(seed),
            config,
        }
    }

    fn next_message_id(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Fragment `payload` at the configured MTU and register it for
    /// tracking, returning the new message ID and its fragments to send.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MessageTooLarge`] if `payload` needs more than
    /// `MAX_FRAGMENT_NUMBER + 1` fragments at the configured MTU.
    pub fn send_data(
        &mut self,
        router_hash: RouterHash,
        endpoint: Endpoint,
        payload: &[u8],
    ) -> Result<(MessageId, Vec<Fragment>), CoreError> {
        let msg_id = self.next_message_id();
        let mtu = self.config.fragment_mtu.max(1);
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&[]]
        } else {
            payload.chunks(mtu).collect()
        };

        if chunks.len() > usize::from(MAX_FRAGMENT_NUMBER) + 1 {
            return Err(CoreError::MessageTooLarge);
        }

        let last_index = chunks.len() - 1;
        let fragments: Vec<Fragment> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, data)| Fragment {
                msg_id,
                frag_num: i as u8,
                is_last: i == last_index,
                data: data.to_vec(),
            })
            .collect();

        let state = OutboundMessageState {
            router_hash,
            endpoint,
            acked: vec![false; fragments.len()],
            fragments: fragments.clone(),
            attempts: 0,
            retransmit_timeout: self.config.initial_retransmit_timeout,
            next_retransmit_at: Instant::now() + self.config.initial_retransmit_timeout,
        };
        self.messages.insert(msg_id, state);
        self.by_router.entry(router_hash).or_default().insert(msg_id);

        Ok((msg_id, fragments))
    }

    fn remove(&mut self, msg_id: MessageId) -> Option<OutboundMessageState> {
        let state = self.messages.remove(&msg_id)?;
        if let Some(set) = self.by_router.get_mut(&state.router_hash) {
            set.remove(&msg_id);
        }
        Some(state)
    }

    /// Apply an explicit ACK: the peer has received every fragment.
    ///
    /// Returns `true` if the message existed and was removed.
    pub fn apply_explicit_ack(&mut self, msg_id: MessageId) -> bool {
        self.remove(msg_id).is_some()
    }

    /// Apply a partial-ACK bitfield. Returns `true` if this completed the
    /// message (and it was removed).
    pub fn apply_bitfield_ack(&mut self, bitfield: &AckBitfield) -> bool {
        let Some(state) = self.messages.get_mut(&bitfield.msg_id) else {
            return false;
        };
        for (i, &acked) in bitfield.acked.iter().enumerate() {
            if acked {
                if let Some(slot) = state.acked.get_mut(i) {
                    *slot = true;
                }
            }
        }
        if state.is_complete() {
            self.remove(bitfield.msg_id);
            true
        } else {
            false
        }
    }

    /// Sweep for messages due to retransmit: resend their unacknowledged
    /// fragments, doubling the backoff (capped), or abandon messages that
    /// have exhausted [`OmfConfig::max_retries`].
    pub fn sweep_retransmits(&mut self, now: Instant) -> RetransmitSweep {
        let due: Vec<MessageId> = self
            .messages
            .iter()
            .filter(|(_, state)| state.next_retransmit_at <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut result = RetransmitSweep::default();
        for msg_id in due {
            let attempts = {
                let state = self.messages.get_mut(&msg_id).expect("just matched");
                state.attempts += 1;
                state.attempts
            };

            if attempts > self.config.max_retries {
                self.remove(msg_id);
                result.failed.push(msg_id);
                continue;
            }

            let state = self.messages.get_mut(&msg_id).expect("just matched");
            let fragments = state.unacked_fragments();
            let endpoint = state.endpoint;
            state.retransmit_timeout = (state.retransmit_timeout * 2).min(self.config.max_retransmit_timeout);
            state.next_retransmit_at = now + state.retransmit_timeout;
            result.retransmissions.push((msg_id, endpoint, fragments));
        }
        result
    }

    /// Drop all outbound state for a peer, e.g. on session teardown.
    pub fn del_peer(&mut self, router_hash: &RouterHash) {
        if let Some(msg_ids) = self.by_router.remove(router_hash) {
            for msg_id in msg_ids {
                self.messages.remove(&msg_id);
            }
        }
    }

    /// Number of outbound messages still awaiting acknowledgement.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.messages.len()
    }
}
