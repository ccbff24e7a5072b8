//! Peer Table (C2): the set of established sessions, indexed both by
//! [`RouterHash`] (the owning index) and by [`Endpoint`] (a lookup index
//! storing only the hash key, per spec §9's single-owner recommendation).

use crate::types::{Endpoint, RouterHash};
use ssu_crypto::SessionKeys;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// An established peer session.
pub struct PeerState {
    /// The peer's long-term identity hash.
    pub router_hash: RouterHash,
    /// The peer's current UDP endpoint (may change across NAT rebinding;
    /// endpoint migration itself is out of scope, see spec Non-goals).
    pub endpoint: Endpoint,
    /// Keys in effect for packets sent and received right now.
    pub current_keys: SessionKeys,
    /// Keys already agreed for the next rekey, if a rekey is in flight.
    pub next_keys: Option<SessionKeys>,
    last_activity: Instant,
}

impl PeerState {
    /// Construct a freshly established peer, with activity timestamped now.
    #[must_use]
    pub fn new(router_hash: RouterHash, endpoint: Endpoint, current_keys: SessionKeys) -> Self {
        Self {
            router_hash,
            endpoint,
            current_keys,
            next_keys: None,
            last_activity: Instant::now(),
        }
    }

    /// Seconds since this peer last sent or received a packet.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

#[derive(Default)]
struct Inner {
    by_hash: HashMap<RouterHash, PeerState>,
    by_endpoint: HashMap<Endpoint, RouterHash>,
}

/// The set of peers with an established session.
#[derive(Default)]
pub struct PeerTable {
    inner: RwLock<Inner>,
}

impl PeerTable {
    /// Construct an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a peer's session state, indexed by both its
    /// identity hash and current endpoint.
    pub fn add_peer(&self, state: PeerState) {
        let mut inner = self.inner.write().expect("lock poisoned");
        let hash = state.router_hash;
        let endpoint = state.endpoint;
        if let Some(previous) = inner.by_hash.insert(hash, state) {
            if previous.endpoint != endpoint {
                inner.by_endpoint.remove(&previous.endpoint);
            }
        }
        inner.by_endpoint.insert(endpoint, hash);
    }

    /// Remove a peer by its identity hash, returning the removed state.
    pub fn del_peer_by_hash(&self, hash: &RouterHash) -> Option<PeerState> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let removed = inner.by_hash.remove(hash)?;
        inner.by_endpoint.remove(&removed.endpoint);
        Some(removed)
    }

    /// Remove a peer by its current endpoint, returning the removed state.
    pub fn del_peer_by_endpoint(&self, endpoint: &Endpoint) -> Option<PeerState> {
        let hash = {
            let inner = self.inner.read().expect("lock poisoned");
            *inner.by_endpoint.get(endpoint)?
        };
        self.del_peer_by_hash(&hash)
    }

    /// Whether a peer with this identity hash has an established session.
    #[must_use]
    pub fn peer_exists(&self, hash: &RouterHash) -> bool {
        self.inner.read().expect("lock poisoned").by_hash.contains_key(hash)
    }

    /// Look up a peer's current endpoint by identity hash.
    #[must_use]
    pub fn endpoint_for(&self, hash: &RouterHash) -> Option<Endpoint> {
        self.inner.read().expect("lock poisoned").by_hash.get(hash).map(|s| s.endpoint)
    }

    /// Look up a peer's identity hash by current endpoint.
    #[must_use]
    pub fn hash_for(&self, endpoint: &Endpoint) -> Option<RouterHash> {
        self.inner.read().expect("lock poisoned").by_endpoint.get(endpoint).copied()
    }

    /// Clone out the current session keys for a peer, for use by the codec.
    #[must_use]
    pub fn session_keys(&self, hash: &RouterHash) -> Option<SessionKeys> {
        self.inner.read().expect("lock poisoned").by_hash.get(hash).map(|s| s.current_keys.clone())
    }

    /// Clone out a peer's armed next-rekey keys, if any.
    #[must_use]
    pub fn next_session_keys(&self, hash: &RouterHash) -> Option<SessionKeys> {
        self.inner.read().expect("lock poisoned").by_hash.get(hash).and_then(|s| s.next_keys.clone())
    }

    /// Keys to encrypt a new outbound packet with: the armed next-rekey keys
    /// if one is in flight, otherwise the current ones. The `bool` reports
    /// whether the next key was selected, so the caller can set
    /// [`crate::codec::FLAG_REKEY`] accordingly.
    #[must_use]
    pub fn encrypt_keys(&self, hash: &RouterHash) -> Option<(SessionKeys, bool)> {
        let inner = self.inner.read().expect("lock poisoned");
        let state = inner.by_hash.get(hash)?;
        match &state.next_keys {
            Some(next) => Some((next.clone(), true)),
            None => Some((state.current_keys.clone(), false)),
        }
    }

    /// Arm a rekey for an established peer: subsequent sends switch to
    /// `next_keys` and flag it, and inbound packets that fail to verify
    /// under the current key are retried under it. Returns `false` if the
    /// peer has no established session.
    pub fn arm_rekey(&self, hash: &RouterHash, next_keys: SessionKeys) -> bool {
        let mut inner = self.inner.write().expect("lock poisoned");
        match inner.by_hash.get_mut(hash) {
            Some(state) => {
                state.next_keys = Some(next_keys);
                true
            }
            None => false,
        }
    }

    /// Promote an armed next-rekey key to current, once a packet has been
    /// successfully verified under it. Returns `false` if no rekey was
    /// in flight.
    pub fn promote_rekey(&self, hash: &RouterHash) -> bool {
        let mut inner = self.inner.write().expect("lock poisoned");
        match inner.by_hash.get_mut(hash) {
            Some(state) => match state.next_keys.take() {
                Some(next) => {
                    state.current_keys = next;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Reset a peer's inactivity timer (call on every send or receive).
    pub fn touch(&self, hash: &RouterHash) {
        let mut inner = self.inner.write().expect("lock poisoned");
        if let Some(state) = inner.by_hash.get_mut(hash) {
            state.last_activity = Instant::now();
        }
    }

    /// Remove and return every peer idle for longer than `timeout`, for the
    /// caller to fire a `disconnectedSignal` per peer.
    pub fn reap_inactive(&self, timeout: Duration) -> Vec<PeerState> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let stale: Vec<RouterHash> = inner
            .by_hash
            .iter()
            .filter(|(_, state)| state.idle_for() >= timeout)
            .map(|(hash, _)| *hash)
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for hash in stale {
            if let Some(state) = inner.by_hash.remove(&hash) {
                inner.by_endpoint.remove(&state.endpoint);
                removed.push(state);
            }
        }
        removed
    }

    /// Number of established peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").by_hash.len()
    }

    /// Whether the table holds no peers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity hashes of every established peer, for the ACK flusher's
    /// sweep.
    #[must_use]
    pub fn all_hashes(&self) -> Vec<RouterHash> {
        self.inner.read().expect("lock poisoned").by_hash.keys().copied().collect()
    }
}
