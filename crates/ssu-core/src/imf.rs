//! Inbound Message Fragments (C4): reassembly of fragmented application
//! messages and the bookkeeping the Acknowledgement Flusher (C6) needs to
//! build ACKs for them (spec §5).

use crate::error::CoreError;
use crate::types::{FragmentNumber, MessageId, RouterHash};
use crate::wire::{AckBitfield, Fragment};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

struct ReassemblyState {
    router_hash: RouterHash,
    fragments: HashMap<FragmentNumber, Vec<u8>>,
    last_fragment: Option<FragmentNumber>,
    bytes_held: usize,
    created_at: Instant,
}

impl ReassemblyState {
    fn new(router_hash: RouterHash) -> Self {
        Self {
            router_hash,
            fragments: HashMap::new(),
            last_fragment: None,
            bytes_held: 0,
            created_at: Instant::now(),
        }
    }

    fn is_complete(&self) -> bool {
        match self.last_fragment {
            Some(last) => (0..=last).all(|n| self.fragments.contains_key(&n)),
            None => false,
        }
    }

    fn assemble(&self) -> Vec<u8> {
        let last = self.last_fragment.expect("only called once complete");
        let mut out = Vec::with_capacity(self.bytes_held);
        for n in 0..=last {
            out.extend_from_slice(&self.fragments[&n]);
        }
        out
    }

    fn ack_bitfield(&self, msg_id: MessageId) -> AckBitfield {
        let width = self.last_fragment.map_or_else(
            || self.fragments.keys().copied().max().map_or(0, |m| m + 1),
            |last| last + 1,
        );
        let acked = (0..width).map(|n| self.fragments.contains_key(&n)).collect();
        AckBitfield { msg_id, acked }
    }
}

/// Reassembles inbound message fragments and tracks what each peer is owed
/// by way of acknowledgement.
#[derive(Default)]
pub struct Imf {
    incomplete: HashMap<MessageId, ReassemblyState>,
    by_router: HashMap<RouterHash, HashSet<MessageId>>,
    awaiting_explicit_ack: HashMap<RouterHash, Vec<MessageId>>,
    half_assembled_bytes: usize,
}

impl Imf {
    /// Construct an empty reassembly table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes currently held across all half-assembled messages.
    #[must_use]
    pub fn half_assembled_bytes(&self) -> usize {
        self.half_assembled_bytes
    }

    /// Feed one fragment into the reassembly table. Returns the fully
    /// reassembled message bytes once every fragment up to the final one has
    /// arrived.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReassemblyBudgetExceeded`] if admitting this
    /// fragment's bytes would exceed `max_half_assembled_bytes`; the
    /// fragment is dropped without mutating any existing state.
    pub fn receive_fragment(
        &mut self,
        router_hash: RouterHash,
        fragment: Fragment,
        max_half_assembled_bytes: usize,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        let msg_id = fragment.msg_id;
        let already_present = self
            .incomplete
            .get(&msg_id)
            .is_some_and(|s| s.fragments.contains_key(&fragment.frag_num));

        if !already_present {
            let projected = self.half_assembled_bytes + fragment.data.len();
            if projected > max_half_assembled_bytes {
                return Err(CoreError::ReassemblyBudgetExceeded);
            }
        }

        let state = self
            .incomplete
            .entry(msg_id)
            .or_insert_with(|| ReassemblyState::new(router_hash));
        self.by_router.entry(router_hash).or_default().insert(msg_id);

        if fragment.is_last {
            state.last_fragment = Some(fragment.frag_num);
        }
        if !already_present {
            self.half_assembled_bytes += fragment.data.len();
            state.bytes_held += fragment.data.len();
            state.fragments.insert(fragment.frag_num, fragment.data);
        }

        if state.is_complete() {
            let payload = state.assemble();
            let state = self.incomplete.remove(&msg_id).expect("just matched");
            self.half_assembled_bytes -= state.bytes_held;
            if let Some(set) = self.by_router.get_mut(&router_hash) {
                set.remove(&msg_id);
            }
            self.awaiting_explicit_ack.entry(router_hash).or_default().push(msg_id);
            return Ok(Some(payload));
        }

        Ok(None)
    }

    /// Drain and return everything owed to `router_hash` by way of
    /// acknowledgement: fully-received message IDs (for an explicit ACK
    /// list) and per-fragment bitfields for still-incomplete messages.
    pub fn take_pending_acks(&mut self, router_hash: &RouterHash) -> (Vec<MessageId>, Vec<AckBitfield>) {
        let explicit = self.awaiting_explicit_ack.remove(router_hash).unwrap_or_default();

        let bitfields = self
            .by_router
            .get(router_hash)
            .into_iter()
            .flatten()
            .filter_map(|msg_id| self.incomplete.get(msg_id).map(|s| s.ack_bitfield(*msg_id)))
            .collect();

        (explicit, bitfields)
    }

    /// Whether `router_hash` has anything pending acknowledgement right now.
    #[must_use]
    pub fn has_pending_acks(&self, router_hash: &RouterHash) -> bool {
        self.awaiting_explicit_ack.get(router_hash).is_some_and(|v| !v.is_empty())
            || self.by_router.get(router_hash).is_some_and(|s| !s.is_empty())
    }

    /// Drop every half-assembled message older than `ttl`, regardless of
    /// completeness, freeing their held bytes.
    pub fn reap_expired(&mut self, ttl: Duration) {
        let expired: Vec<MessageId> = self
            .incomplete
            .iter()
            .filter(|(_, state)| state.created_at.elapsed() >= ttl)
            .map(|(id, _)| *id)
            .collect();

        for msg_id in expired {
            if let Some(state) = self.incomplete.remove(&msg_id) {
                self.half_assembled_bytes -= state.bytes_held;
                if let Some(set) = self.by_router.get_mut(&state.router_hash) {
                    set.remove(&msg_id);
                }
            }
        }
    }

    /// Drop all state (incomplete and awaiting-ack) for a peer, e.g. on
    /// session teardown.
    pub fn del_peer(&mut self, router_hash: &RouterHash) {
        if let Some(msg_ids) = self.by_router.remove(router_hash) {
            for msg_id in msg_ids {
                if let Some(state) = self.incomplete.remove(&msg_id) {
                    self.half_assembled_bytes -= state.bytes_held;
                }
            }
        }
        self.awaiting_explicit_ack.remove(router_hash);
    }

    /// Peers that currently have any reassembly state, for the flusher's
    /// sweep (spec REDESIGN FLAG: iterate peers that exist, not an infinite
    /// loop over absent ones).
    #[must_use]
    pub fn peers_with_state(&self) -> Vec<RouterHash> {
        let mut peers: HashSet<RouterHash> = self.by_router.keys().copied().collect();
        peers.extend(self.awaiting_explicit_ack.keys().copied());
        peers.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> RouterHash {
        RouterHash::from_bytes([byte; 32])
    }

    fn fragment(msg_id: MessageId, frag_num: FragmentNumber, is_last: bool, data: Vec<u8>) -> Fragment {
        Fragment { msg_id, frag_num, is_last, data }
    }

    #[test]
    fn test_single_fragment_message_completes_immediately() {
        let mut imf = Imf::new();
        let router = hash(1);
        let result = imf
            .receive_fragment(router, fragment(1, 0, true, vec![1, 2, 3]), 1024)
            .unwrap();
        assert_eq!(result, Some(vec![1, 2, 3]));
        assert_eq!(imf.half_assembled_bytes(), 0);
    }

    #[test]
    fn test_two_fragment_message_completes_in_order() {
        let mut imf = Imf::new();
        let router = hash(2);
        assert_eq!(imf.receive_fragment(router, fragment(1, 0, false, vec![1, 2]), 1024).unwrap(), None);
        let result = imf.receive_fragment(router, fragment(1, 1, true, vec![3, 4]), 1024).unwrap();
        assert_eq!(result, Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_out_of_order_fragments_still_reassemble_correctly() {
        let mut imf = Imf::new();
        let router = hash(3);
        assert_eq!(imf.receive_fragment(router, fragment(1, 1, true, vec![3, 4]), 1024).unwrap(), None);
        let result = imf.receive_fragment(router, fragment(1, 0, false, vec![1, 2]), 1024).unwrap();
        assert_eq!(result, Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_duplicate_fragment_does_not_double_count_bytes() {
        let mut imf = Imf::new();
        let router = hash(4);
        imf.receive_fragment(router, fragment(1, 0, false, vec![1, 2]), 1024).unwrap();
        imf.receive_fragment(router, fragment(1, 0, false, vec![1, 2]), 1024).unwrap();
        assert_eq!(imf.half_assembled_bytes(), 2);
    }

    #[test]
    fn test_budget_exceeded_rejects_without_mutating_state() {
        let mut imf = Imf::new();
        let router = hash(5);
        imf.receive_fragment(router, fragment(1, 0, false, vec![0u8; 10]), 10).unwrap();
        let err = imf.receive_fragment(router, fragment(2, 0, false, vec![0u8; 1]), 10);
        assert!(err.is_err());
        assert_eq!(imf.half_assembled_bytes(), 10);
    }

    #[test]
    fn test_take_pending_acks_returns_explicit_and_bitfields() {
        let mut imf = Imf::new();
        let router = hash(6);
        imf.receive_fragment(router, fragment(1, 0, true, vec![9]), 1024).unwrap();
        imf.receive_fragment(router, fragment(2, 0, false, vec![9]), 1024).unwrap();

        let (explicit, bitfields) = imf.take_pending_acks(&router);
        assert_eq!(explicit, vec![1]);
        assert_eq!(bitfields.len(), 1);
        assert_eq!(bitfields[0].msg_id, 2);
        assert!(bitfields[0].acked[0]);

        // Draining clears the explicit list but the incomplete message stays.
        let (explicit_again, bitfields_again) = imf.take_pending_acks(&router);
        assert!(explicit_again.is_empty());
        assert_eq!(bitfields_again.len(), 1);
    }

    #[test]
    fn test_reap_expired_drops_stale_incomplete_messages() {
        let mut imf = Imf::new();
        let router = hash(7);
        imf.receive_fragment(router, fragment(1, 0, false, vec![1, 2, 3]), 1024).unwrap();
        imf.reap_expired(Duration::from_secs(0));
        assert_eq!(imf.half_assembled_bytes(), 0);
        assert!(!imf.has_pending_acks(&router));
    }

    #[test]
    fn test_del_peer_clears_all_state() {
        let mut imf = Imf::new();
        let router = hash(8);
        imf.receive_fragment(router, fragment(1, 0, true, vec![1]), 1024).unwrap();
        imf.receive_fragment(router, fragment(2, 0, false, vec![2]), 1024).unwrap();
        imf.del_peer(&router);
        assert!(!imf.has_pending_acks(&router));
        assert_eq!(imf.half_assembled_bytes(), 0);
    }

    #[test]
    fn test_peers_with_state_includes_both_kinds() {
        let mut imf = Imf::new();
        let complete_router = hash(9);
        let incomplete_router = hash(10);
        imf.receive_fragment(complete_router, fragment(1, 0, true, vec![1]), 1024).unwrap();
        imf.receive_fragment(incomplete_router, fragment(2, 0, false, vec![1]), 1024).unwrap();

        let mut peers = imf.peers_with_state();
        peers.sort();
        let mut expected = vec![complete_router, incomplete_router];
        expected.sort();
        assert_eq!(peers, expected);
    }
}
