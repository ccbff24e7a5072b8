//! Packet Handler (C7): the top-level dispatcher for every inbound
//! datagram (spec §4.7). Four branches, tried in order:
//!
//! 1. Sender has an established session -> verify/decrypt under its
//!    session keys and dispatch by payload type (`DATA`, `SESSION_DESTROY`).
//! 2. Sender has an outbound handshake in `RequestSent` -> decrypt
//!    `SESSION_CREATED` under the peer's introduction key, reply with
//!    `SESSION_CONFIRMED`.
//! 3. Sender has an inbound handshake in `CreatedSent` -> decrypt
//!    `SESSION_CONFIRMED` under the DH-derived keys, promote to a peer.
//! 4. Otherwise -> try decrypting a fresh `SESSION_REQUEST` under our own
//!    introduction key and begin an inbound handshake.
//!
//! Anything that fails MAC verification, decryption, or parsing at any
//! branch is dropped without mutating state.

use crate::ack_flusher::AckFlusher;
use crate::codec::{self, Packet, SessionConfirmedBody, SessionCreatedBody, SessionRequestBody};
use crate::config::ImfConfig;
use crate::establishment::{EstablishmentManager, IdentityResolver};
use crate::imf::Imf;
use crate::omf::Omf;
use crate::peer_table::PeerTable;
use crate::types::{Endpoint, PayloadType, RouterHash};
use crate::wire::decode_data_payload;
use ssu_crypto::SessionKeys;
use std::time::Duration;

/// Something worth telling the rest of the router about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    /// A fully reassembled application message arrived from `from`.
    MessageReceived {
        /// Sending peer.
        from: RouterHash,
        /// Reassembled message bytes.
        payload: Vec<u8>,
    },
    /// A handshake completed and `from` is now an established peer.
    PeerEstablished(RouterHash),
    /// A peer explicitly tore down its session.
    PeerDestroyed(RouterHash),
}

/// Everything produced by handling one inbound datagram.
#[derive(Debug, Default)]
pub struct HandlerOutput {
    /// Events for the facade to surface upward.
    pub events: Vec<HandlerEvent>,
    /// Datagrams that must be sent back out, in order.
    pub replies: Vec<(Endpoint, Vec<u8>)>,
}

fn random_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    ssu_crypto::random::fill_random(&mut iv);
    iv
}

fn intro_keys(key: [u8; 32]) -> SessionKeys {
    SessionKeys::new(key, key)
}

/// Dispatch one inbound UDP datagram.
#[allow(clippy::too_many_arguments)]
pub fn handle_incoming(
    raw: &[u8],
    from: Endpoint,
    now: u32,
    peer_table: &PeerTable,
    establishment: &EstablishmentManager,
    imf: &mut Imf,
    omf: &mut Omf,
    imf_config: &ImfConfig,
    timestamp_skew: Duration,
    resolver: &dyn IdentityResolver,
) -> HandlerOutput {
    let mut output = HandlerOutput::default();

    let Ok(packet) = Packet::parse(raw) else {
        tracing::warn!(%from, "dropping packet: malformed");
        return output;
    };

    // Branch 1: established session. The current session key is tried
    // first; if it fails to verify and a rekey is armed, the next key is
    // tried too, and promoted to current on success (spec §4.1).
    if let Some(hash) = peer_table.hash_for(&from) {
        if let Some(current) = peer_table.session_keys(&hash) {
            let verified = if packet.verify(&current.mac_key, &from).is_ok() {
                Some((current, false))
            } else {
                peer_table
                    .next_session_keys(&hash)
                    .filter(|next| packet.verify(&next.mac_key, &from).is_ok())
                    .map(|next| (next, true))
            };

            if let Some((keys, used_next_key)) = verified {
                if used_next_key && peer_table.promote_rekey(&hash) {
                    tracing::info!(peer = %hash, "rekey completed: promoted next session key to current");
                }
                if let Ok(decrypted) = packet.decrypt(&keys.session_key) {
                    if codec::check_timestamp(decrypted.timestamp, now, timestamp_skew).is_ok() {
                        peer_table.touch(&hash);
                        match decrypted.payload_type {
                            PayloadType::Data => {
                                if let Ok(payload) = decode_data_payload(&decrypted.body) {
                                    for id in &payload.explicit_acks {
                                        omf.apply_explicit_ack(*id);
                                    }
                                    for bitfield in &payload.ack_bitfields {
                                        omf.apply_bitfield_ack(bitfield);
                                    }
                                    for fragment in payload.fragments {
                                        if let Ok(Some(message)) =
                                            imf.receive_fragment(hash, fragment, imf_config.max_half_assembled_bytes)
                                        {
                                            tracing::debug!(peer = %hash, bytes = message.len(), "message reassembled");
                                            output.events.push(HandlerEvent::MessageReceived { from: hash, payload: message });
                                        }
                                    }
                                }
                            }
                            PayloadType::SessionDestroy => {
                                peer_table.del_peer_by_hash(&hash);
                                imf.del_peer(&hash);
                                omf.del_peer(&hash);
                                tracing::info!(peer = %hash, "peer sent session destroy");
                                output.events.push(HandlerEvent::PeerDestroyed(hash));
                            }
                            _ => {}
                        }
                    }
                }
            } else {
                tracing::warn!(peer = %hash, "dropping packet: mac verification failed");
            }
        }
        return output;
    }

    // Branch 2/3: handshake already in progress for this endpoint.
    if establishment.is_pending(&from) {
        if let Some(intro_key) = establishment.intro_key_for(&from) {
            let keys = intro_keys(intro_key);
            if packet.verify(&keys.mac_key, &from).is_ok() {
                if let Ok(decrypted) = packet.decrypt(&keys.session_key) {
                    if decrypted.payload_type == PayloadType::SessionCreated {
                        if let Ok(created) = SessionCreatedBody::decode(&decrypted.body) {
                            if let Ok(confirmed_body) = establishment.handle_session_created(from, &created) {
                                if let Some(dh_keys) = establishment.session_keys_for(&from) {
                                    let datagram = codec::encrypt(
                                        &dh_keys,
                                        &from,
                                        random_iv(),
                                        PayloadType::SessionConfirmed,
                                        0,
                                        now,
                                        &confirmed_body,
                                    );
                                    output.replies.push((from, datagram));
                                }
                                if let Ok(peer_state) = establishment.complete_outbound(from) {
                                    let hash = peer_state.router_hash;
                                    peer_table.add_peer(peer_state);
                                    tracing::info!(peer = %hash, %from, direction = "outbound", "peer established");
                                    output.events.push(HandlerEvent::PeerEstablished(hash));
                                }
                            }
                        }
                    }
                }
            }
        }

        if let Some(dh_keys) = establishment.session_keys_for(&from) {
            if packet.verify(&dh_keys.mac_key, &from).is_ok() {
                if let Ok(decrypted) = packet.decrypt(&dh_keys.session_key) {
                    if decrypted.payload_type == PayloadType::SessionConfirmed {
                        if let Ok(confirmed) = SessionConfirmedBody::decode(&decrypted.body) {
                            if let Ok(peer_state) = establishment.handle_session_confirmed(from, &confirmed, resolver) {
                                let hash = peer_state.router_hash;
                                peer_table.add_peer(peer_state);
                                tracing::info!(peer = %hash, %from, direction = "inbound", "peer established");
                                output.events.push(HandlerEvent::PeerEstablished(hash));
                            }
                        }
                    }
                }
            }
        }
        return output;
    }

    // Branch 4: unknown sender, try a fresh SESSION_REQUEST under our own introduction key.
    let keys = intro_keys(establishment.local_introduction_key());
    if packet.verify(&keys.mac_key, &from).is_ok() {
        if let Ok(decrypted) = packet.decrypt(&keys.session_key) {
            if decrypted.payload_type == PayloadType::SessionRequest
                && codec::check_timestamp(decrypted.timestamp, now, timestamp_skew).is_ok()
            {
                if let Ok(request) = SessionRequestBody::decode(&decrypted.body) {
                    if let Ok(created_body) = establishment.handle_session_request(from, &request, now) {
                        let datagram = codec::encrypt(&keys, &from, random_iv(), PayloadType::SessionCreated, 0, now, &created_body);
                        output.replies.push((from, datagram));
                    }
                }
            }
        }
    }

    output
}

/// Build the DATA datagrams for one [`AckFlusher`] sweep's output, using
/// each peer's established session keys.
#[must_use]
pub fn encode_ack_sweep(
    sweep: Vec<(RouterHash, crate::wire::DataPayload)>,
    peer_table: &PeerTable,
    now: u32,
) -> Vec<(Endpoint, Vec<u8>)> {
    sweep
        .into_iter()
        .filter_map(|(hash, payload)| {
            let endpoint = peer_table.endpoint_for(&hash)?;
            let (keys, is_rekey) = peer_table.encrypt_keys(&hash)?;
            let flags = if is_rekey { codec::FLAG_REKEY } else { 0 };
            let body = crate::wire::encode_data_payload(&payload);
            let datagram = codec::encrypt(&keys, &endpoint, random_iv(), PayloadType::Data, flags, now, &body);
            Some((endpoint, datagram))
        })
        .collect()
}

/// Convenience wrapper pairing a flusher sweep with encoding, for callers
/// (the facade) that don't need the intermediate `DataPayload`s.
pub fn flush_acks(flusher: &AckFlusher, imf: &mut Imf, peer_table: &PeerTable, now: u32) -> Vec<(Endpoint, Vec<u8>)> {
    let sweep = flusher.sweep(imf);
    encode_ack_sweep(sweep, peer_table, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstablishmentConfig;
    use crate::types::RouterIdentity;
    use ssu_crypto::signatures::SigningKey;

    struct StaticResolver(RouterIdentity);
    impl IdentityResolver for StaticResolver {
        fn resolve(&self, _certificate: &[u8]) -> Option<RouterIdentity> {
            Some(self.0.clone())
        }
    }

    fn router(cert: Vec<u8>, intro_key: [u8; 32]) -> (RouterIdentity, SigningKey) {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        (RouterIdentity::new(signing_key.verifying_key(), cert, intro_key), signing_key)
    }

    #[test]
    fn test_full_handshake_through_packet_handler_establishes_peer() {
        let (alice_identity, alice_signing) = router(vec![1], [0xAAu8; 32]);
        let (bob_identity, bob_signing) = router(vec![2], [0xBBu8; 32]);

        let alice_endpoint: Endpoint = "10.0.0.1:1".parse().unwrap();
        let bob_endpoint: Endpoint = "10.0.0.2:2".parse().unwrap();

        let alice_establishment = EstablishmentManager::new(EstablishmentConfig::default(), alice_identity.clone(), alice_signing, alice_endpoint);
        let bob_establishment = EstablishmentManager::new(EstablishmentConfig::default(), bob_identity.clone(), bob_signing, bob_endpoint);
        let alice_peers = PeerTable::new();
        let bob_peers = PeerTable::new();
        let mut alice_imf = Imf::new();
        let mut bob_imf = Imf::new();
        let mut alice_omf = Omf::new(crate::config::OmfConfig::default());
        let mut bob_omf = Omf::new(crate::config::OmfConfig::default());
        let imf_config = ImfConfig::default();
        let skew = Duration::from_secs(60);

        // Alice begins the handshake out of band (begin_outbound isn't itself a wire datagram).
        let request_body = alice_establishment.begin_outbound(bob_endpoint, bob_identity.clone());
        let request_keys = intro_keys(*bob_identity.introduction_key());
        let request_datagram = codec::encrypt(&request_keys, &bob_endpoint, random_iv(), PayloadType::SessionRequest, 0, 100, &request_body);

        let bob_resolver = StaticResolver(alice_identity.clone());
        let out = handle_incoming(
            &request_datagram, alice_endpoint, 100, &bob_peers, &bob_establishment, &mut bob_imf, &mut bob_omf, &imf_config, skew, &bob_resolver,
        );
        assert_eq!(out.replies.len(), 1);
        let (reply_to, created_datagram) = &out.replies[0];
        assert_eq!(*reply_to, alice_endpoint);

        let alice_resolver = StaticResolver(bob_identity.clone());
        let out = handle_incoming(
            created_datagram, bob_endpoint, 100, &alice_peers, &alice_establishment, &mut alice_imf, &mut alice_omf, &imf_config, skew, &alice_resolver,
        );
        assert_eq!(out.replies.len(), 1);
        assert_eq!(out.events, vec![HandlerEvent::PeerEstablished(bob_identity.hash())]);
        assert!(alice_peers.peer_exists(&bob_identity.hash()));
        let (reply_to, confirmed_datagram) = &out.replies[0];
        assert_eq!(*reply_to, bob_endpoint);

        let out = handle_incoming(
            confirmed_datagram, alice_endpoint, 100, &bob_peers, &bob_establishment, &mut bob_imf, &mut bob_omf, &imf_config, skew, &bob_resolver,
        );
        assert_eq!(out.events, vec![HandlerEvent::PeerEstablished(alice_identity.hash())]);
        assert!(bob_peers.peer_exists(&alice_identity.hash()));
    }

    #[test]
    fn test_garbage_datagram_is_dropped_without_panic() {
        let (identity, signing_key) = router(vec![1], [0x11u8; 32]);
        let local_endpoint: Endpoint = "127.0.0.1:2".parse().unwrap();
        let establishment = EstablishmentManager::new(EstablishmentConfig::default(), identity.clone(), signing_key, local_endpoint);
        let peers = PeerTable::new();
        let mut imf = Imf::new();
        let mut omf = Omf::new(crate::config::OmfConfig::default());
        let imf_config = ImfConfig::default();
        let resolver = StaticResolver(identity);

        let from: Endpoint = "127.0.0.1:1".parse().unwrap();
        let out = handle_incoming(&[0u8; 5], from, 0, &peers, &establishment, &mut imf, &mut omf, &imf_config, Duration::from_secs(60), &resolver);
        assert!(out.events.is_empty());
        assert!(out.replies.is_empty());
    }

    #[test]
    fn test_packet_under_armed_next_key_is_accepted_and_promoted() {
        let (identity, signing_key) = router(vec![1], [0x11u8; 32]);
        let local_endpoint: Endpoint = "127.0.0.1:2".parse().unwrap();
        let establishment = EstablishmentManager::new(EstablishmentConfig::default(), identity.clone(), signing_key, local_endpoint);
        let peers = PeerTable::new();
        let mut imf = Imf::new();
        let mut omf = Omf::new(crate::config::OmfConfig::default());
        let imf_config = ImfConfig::default();
        let resolver = StaticResolver(identity.clone());

        let from: Endpoint = "127.0.0.1:2000".parse().unwrap();
        let hash = identity.hash();
        let current = SessionKeys::new([1u8; 32], [1u8; 32]);
        let next = SessionKeys::new([2u8; 32], [2u8; 32]);
        peers.add_peer(crate::peer_table::PeerState::new(hash, from, current));
        peers.arm_rekey(&hash, next.clone());

        let payload = crate::wire::DataPayload { want_reply: false, explicit_acks: vec![], ack_bitfields: vec![], fragments: vec![] };
        let body = crate::wire::encode_data_payload(&payload);
        let datagram = codec::encrypt(&next, &from, random_iv(), PayloadType::Data, codec::FLAG_REKEY, 1000, &body);

        let out = handle_incoming(&datagram, from, 1000, &peers, &establishment, &mut imf, &mut omf, &imf_config, Duration::from_secs(60), &resolver);
        assert!(out.events.is_empty());
        assert_eq!(peers.session_keys(&hash).unwrap().session_key, next.session_key);
        assert!(peers.next_session_keys(&hash).is_none());
    }
}
