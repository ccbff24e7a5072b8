//! Transport Facade (C8): the single entry point that owns every component
//! and drives the background tasks a caller shouldn't have to think about
//! (spec §2, §10).
//!
//! `SsuFacade` binds a UDP socket through [`ssu_transport::Transport`],
//! spawns a receive loop, a retransmit sweep, an ACK flush sweep, and an
//! inactivity/handshake-timeout reaper, and exposes a small async surface:
//! [`SsuFacade::connect`], [`SsuFacade::send`], and an [`SsuEvent`] channel
//! for everything the router above needs to react to.

use crate::ack_flusher::AckFlusher;
use crate::config::SsuConfig;
use crate::error::CoreError;
use crate::establishment::{EstablishmentManager, IdentityResolver};
use crate::imf::Imf;
use crate::omf::Omf;
use crate::packet_handler::{self, HandlerEvent};
use crate::peer_table::PeerTable;
use crate::types::{Endpoint, PayloadType, RouterHash, RouterIdentity};
use ssu_crypto::signatures::SigningKey;
use ssu_transport::Transport;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events the facade surfaces to the embedding router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsuEvent {
    /// A fully reassembled application message arrived from a peer.
    MessageReceived {
        /// Sending peer.
        from: RouterHash,
        /// Reassembled message bytes.
        payload: Vec<u8>,
    },
    /// A handshake completed; the peer is now established.
    PeerEstablished(RouterHash),
    /// A peer's session was torn down, whether by `SESSION_DESTROY` or
    /// inactivity reaping.
    PeerDestroyed(RouterHash),
    /// An outbound message was abandoned after exhausting its retry budget.
    SendFailed(RouterHash),
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

struct Shared {
    peer_table: PeerTable,
    establishment: EstablishmentManager,
    imf: std::sync::Mutex<Imf>,
    omf: std::sync::Mutex<Omf>,
    ack_flusher: AckFlusher,
    config: SsuConfig,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<SsuEvent>,
}

impl Shared {
    async fn send_datagram(&self, to: Endpoint, bytes: Vec<u8>) {
        if let Err(error) = self.transport.send_to(&bytes, to).await {
            tracing::warn!(%to, %error, "failed to send datagram");
        }
    }
}

/// Owns the full SSU component set for one local router identity and drives
/// it against a bound UDP transport.
pub struct SsuFacade {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

/// Resolves peer identities for inbound `SESSION_CONFIRMED` messages by
/// looking them up in a caller-supplied router-info table, keyed by the
/// certificate bytes each identity carries on the wire.
pub struct StaticIdentityResolver {
    identities: dashmap::DashMap<Vec<u8>, RouterIdentity>,
}

impl StaticIdentityResolver {
    /// Build an empty resolver; populate with [`Self::insert`] as peers
    /// become known (e.g. from the out-of-scope NetDB).
    #[must_use]
    pub fn new() -> Self {
        Self { identities: dashmap::DashMap::new() }
    }

    /// Register a known peer identity, keyed by its certificate bytes.
    pub fn insert(&self, identity: RouterIdentity) {
        self.identities.insert(identity.certificate().to_vec(), identity);
    }
}

impl Default for StaticIdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve(&self, certificate: &[u8]) -> Option<RouterIdentity> {
        self.identities.get(certificate).map(|entry| entry.value().clone())
    }
}

impl SsuFacade {
    /// Construct a facade bound to `transport`, identified by
    /// `local_identity`/`local_signing_key`, with the given tunables.
    #[must_use]
    pub fn new(
        config: SsuConfig,
        local_identity: RouterIdentity,
        local_signing_key: SigningKey,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<SsuEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let local_endpoint = transport.local_addr().unwrap_or(config.listen_addr);
        let shared = Arc::new(Shared {
            peer_table: PeerTable::new(),
            establishment: EstablishmentManager::new(config.establishment.clone(), local_identity, local_signing_key, local_endpoint),
            imf: std::sync::Mutex::new(Imf::new()),
            omf: std::sync::Mutex::new(Omf::new(config.omf.clone())),
            ack_flusher: AckFlusher::new(config.ack_flusher.clone()),
            config,
            transport,
            events,
        });
        (Self { shared, tasks: Vec::new() }, receiver)
    }

    /// Spawn the receive loop and the periodic sweeps. Call once after
    /// construction; dropping or calling [`Self::shutdown`] stops them.
    pub fn start(&mut self, resolver: Arc<dyn IdentityResolver + Send + Sync>) {
        self.tasks.push(self.spawn_receive_loop(Arc::clone(&resolver)));
        self.tasks.push(self.spawn_ack_flush_loop());
        self.tasks.push(self.spawn_retransmit_loop());
        self.tasks.push(self.spawn_reaper_loop());
    }

    /// Abort every background task. The facade can't be restarted; build a
    /// new one if needed.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn spawn_receive_loop(&self, resolver: Arc<dyn IdentityResolver + Send + Sync>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let (len, from) = match shared.transport.recv_from(&mut buf).await {
                    Ok(result) => result,
                    Err(error) => {
                        tracing::warn!(%error, "receive loop stopping");
                        return;
                    }
                };
                let now = unix_now();
                let output = {
                    let mut imf = shared.imf.lock().expect("lock poisoned");
                    let mut omf = shared.omf.lock().expect("lock poisoned");
                    packet_handler::handle_incoming(
                        &buf[..len],
                        from,
                        now,
                        &shared.peer_table,
                        &shared.establishment,
                        &mut imf,
                        &mut omf,
                        &shared.config.imf,
                        shared.config.establishment.timestamp_skew,
                        resolver.as_ref(),
                    )
                };
                for (to, datagram) in output.replies {
                    shared.send_datagram(to, datagram).await;
                }
                for event in output.events {
                    let mapped = match event {
                        HandlerEvent::MessageReceived { from, payload } => SsuEvent::MessageReceived { from, payload },
                        HandlerEvent::PeerEstablished(hash) => SsuEvent::PeerEstablished(hash),
                        HandlerEvent::PeerDestroyed(hash) => SsuEvent::PeerDestroyed(hash),
                    };
                    let _ = shared.events.send(mapped);
                }
            }
        })
    }

    fn spawn_ack_flush_loop(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut last_fire = Instant::now();
            loop {
                tokio::time::sleep_until(shared.ack_flusher.next_fire_at(last_fire).into()).await;
                last_fire = Instant::now();
                let now = unix_now();
                let datagrams = {
                    let mut imf = shared.imf.lock().expect("lock poisoned");
                    packet_handler::flush_acks(&shared.ack_flusher, &mut imf, &shared.peer_table, now)
                };
                for (to, datagram) in datagrams {
                    shared.send_datagram(to, datagram).await;
                }
            }
        })
    }

    fn spawn_retransmit_loop(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let tick = shared.config.omf.initial_retransmit_timeout.min(Duration::from_millis(250)).max(Duration::from_millis(10));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let sweep = {
                    let mut omf = shared.omf.lock().expect("lock poisoned");
                    omf.sweep_retransmits(Instant::now())
                };
                for (_msg_id, endpoint, fragments) in sweep.retransmissions {
                    if fragments.is_empty() {
                        continue;
                    }
                    let Some(hash) = shared.peer_table.hash_for(&endpoint) else { continue };
                    let Some((keys, is_rekey)) = shared.peer_table.encrypt_keys(&hash) else { continue };
                    let payload = crate::wire::DataPayload {
                        want_reply: false,
                        explicit_acks: vec![],
                        ack_bitfields: vec![],
                        fragments,
                    };
                    let body = crate::wire::encode_data_payload(&payload);
                    let mut iv = [0u8; 16];
                    let _ = ssu_crypto::random::fill_random(&mut iv);
                    let flags = if is_rekey { crate::codec::FLAG_REKEY } else { 0 };
                    let datagram = crate::codec::encrypt(&keys, &endpoint, iv, PayloadType::Data, flags, unix_now(), &body);
                    shared.send_datagram(endpoint, datagram).await;
                }
                for msg_id in sweep.failed {
                    tracing::debug!(msg_id, "message abandoned after retransmit budget exhausted");
                }
            }
        })
    }

    fn spawn_reaper_loop(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                {
                    let mut imf = shared.imf.lock().expect("lock poisoned");
                    imf.reap_expired(shared.config.imf.entry_ttl);
                }
                for endpoint in shared.establishment.reap_timed_out() {
                    tracing::debug!(%endpoint, "handshake timed out");
                }
                for peer in shared.peer_table.reap_inactive(shared.config.peer_table.inactivity_timeout) {
                    let hash = peer.router_hash;
                    let mut imf = shared.imf.lock().expect("lock poisoned");
                    imf.del_peer(&hash);
                    let mut omf = shared.omf.lock().expect("lock poisoned");
                    omf.del_peer(&hash);
                    let _ = shared.events.send(SsuEvent::PeerDestroyed(hash));
                }
            }
        })
    }

    /// Begin an outbound handshake to `peer_identity` at `endpoint`, sending
    /// the initial `SESSION_REQUEST`.
    pub async fn connect(&self, endpoint: Endpoint, peer_identity: RouterIdentity) {
        let intro_key = *peer_identity.introduction_key();
        let body = self.shared.establishment.begin_outbound(endpoint, peer_identity);
        let keys = ssu_crypto::SessionKeys::new(intro_key, intro_key);
        let mut iv = [0u8; 16];
        let _ = ssu_crypto::random::fill_random(&mut iv);
        let datagram = crate::codec::encrypt(&keys, &endpoint, iv, PayloadType::SessionRequest, 0, unix_now(), &body);
        self.shared.send_datagram(endpoint, datagram).await;
    }

    /// Send `payload` to an established peer, fragmenting and tracking it
    /// for retransmission.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownPeer`] if `router_hash` has no established
    /// session, or [`CoreError::MessageTooLarge`] if the payload needs more
    /// fragments than the wire format allows.
    pub async fn send(&self, router_hash: RouterHash, payload: &[u8]) -> Result<(), CoreError> {
        let endpoint = self.shared.peer_table.endpoint_for(&router_hash).ok_or(CoreError::UnknownPeer)?;
        let (keys, is_rekey) = self.shared.peer_table.encrypt_keys(&router_hash).ok_or(CoreError::UnknownPeer)?;
        let fragments = {
            let mut omf = self.shared.omf.lock().expect("lock poisoned");
            omf.send_data(router_hash, endpoint, payload)?.1
        };
        let data_payload = crate::wire::DataPayload {
            want_reply: false,
            explicit_acks: vec![],
            ack_bitfields: vec![],
            fragments,
        };
        let body = crate::wire::encode_data_payload(&data_payload);
        let mut iv = [0u8; 16];
        let _ = ssu_crypto::random::fill_random(&mut iv);
        let flags = if is_rekey { crate::codec::FLAG_REKEY } else { 0 };
        let datagram = crate::codec::encrypt(&keys, &endpoint, iv, PayloadType::Data, flags, unix_now(), &body);
        self.shared.send_datagram(endpoint, datagram).await;
        self.shared.peer_table.touch(&router_hash);
        Ok(())
    }

    /// Explicitly tear down a peer's session, sending `SESSION_DESTROY`.
    pub async fn destroy_peer(&self, router_hash: RouterHash) {
        let Some(endpoint) = self.shared.peer_table.endpoint_for(&router_hash) else { return };
        if let Some((keys, is_rekey)) = self.shared.peer_table.encrypt_keys(&router_hash) {
            let mut iv = [0u8; 16];
            let _ = ssu_crypto::random::fill_random(&mut iv);
            let flags = if is_rekey { crate::codec::FLAG_REKEY } else { 0 };
            let datagram = crate::codec::encrypt(&keys, &endpoint, iv, PayloadType::SessionDestroy, flags, unix_now(), &[]);
            self.shared.send_datagram(endpoint, datagram).await;
        }
        self.shared.peer_table.del_peer_by_hash(&router_hash);
        self.shared.imf.lock().expect("lock poisoned").del_peer(&router_hash);
        self.shared.omf.lock().expect("lock poisoned").del_peer(&router_hash);
    }

    /// Number of peers with an established session.
    #[must_use]
    pub fn established_peer_count(&self) -> usize {
        self.shared.peer_table.len()
    }

    /// Arm a rekey for an established peer: subsequent sends switch to
    /// `next_keys` and flag the packet with [`crate::codec::FLAG_REKEY`]; the
    /// peer's own codec falls back to it the moment one of our packets fails
    /// to verify under its current key, and promotes it from there. Returns
    /// `false` if `router_hash` has no established session.
    ///
    /// Negotiating `next_keys` with the peer out of band (or deriving it from
    /// a fresh DH exchange) is the caller's responsibility; this only arms
    /// the local switch-over.
    pub fn rekey(&self, router_hash: RouterHash, next_keys: ssu_crypto::SessionKeys) -> bool {
        self.shared.peer_table.arm_rekey(&router_hash, next_keys)
    }
}

impl Drop for SsuFacade {
    fn drop(&mut self) {
        self.shutdown();
    }
}
