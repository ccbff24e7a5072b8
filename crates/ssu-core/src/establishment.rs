//! Establishment Manager (C3): the DH handshake state machine (spec §3).
//!
//! ```text
//! UNKNOWN -> REQUEST_SENT -----------------> CONFIRMED_SENT -> (promoted on send)
//! UNKNOWN -> REQUEST_RECEIVED -> CREATED_SENT -----------------> (promoted on SESSION_CONFIRMED)
//! ```
//! Any state times out to `FAILURE` (dropped from the pending table) if the
//! peer doesn't respond within [`crate::config::EstablishmentConfig::handshake_timeout`].

use crate::codec::{SessionConfirmedBody, SessionCreatedBody, SessionRequestBody};
use crate::config::EstablishmentConfig;
use crate::error::CoreError;
use crate::peer_table::PeerState;
use crate::types::{Endpoint, RouterIdentity};
use ssu_crypto::dh::{PrivateKey as DhPrivateKey, PublicKey as DhPublicKey};
use ssu_crypto::hash::derive_session_keys;
use ssu_crypto::signatures::{Signature, SigningKey};
use ssu_crypto::DH_VALUE_SIZE;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

/// Which side of the handshake a pending establishment represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We sent `SESSION_REQUEST` first.
    Outbound,
    /// We received `SESSION_REQUEST` first.
    Inbound,
}

/// Handshake progress for one peer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Outbound: `SESSION_REQUEST` sent, awaiting `SESSION_CREATED`.
    RequestSent,
    /// Inbound: `SESSION_REQUEST` received, `SESSION_CREATED` sent, awaiting
    /// `SESSION_CONFIRMED`.
    CreatedSent,
}

struct PendingEstablishment {
    direction: Direction,
    state: State,
    endpoint: Endpoint,
    our_private: DhPrivateKey,
    our_public: DhPublicKey,
    their_public: Option<DhPublicKey>,
    /// Known (outbound) or not-yet-learned (inbound) peer identity.
    peer_identity: Option<RouterIdentity>,
    /// The `signed_on_time` field carried by (outbound: their) or signed by
    /// (inbound: our own) `SESSION_CREATED`, needed to re-derive the exact
    /// signed byte string when the confirming message arrives.
    signed_on_time: Option<u32>,
    keys: Option<ssu_crypto::SessionKeys>,
    started_at: Instant,
}

/// Resolves a peer's [`RouterIdentity`] from the certificate bytes carried
/// in `SESSION_CONFIRMED`. The establishment manager treats identity
/// resolution as external (spec §3/§9: identities come from the router-info
/// database, not from the wire handshake itself).
pub trait IdentityResolver {
    /// Reconstruct a peer identity from confirmed certificate bytes.
    fn resolve(&self, certificate: &[u8]) -> Option<RouterIdentity>;
}

/// Drives the 3-message DH handshake (`SESSION_REQUEST` / `SESSION_CREATED`
/// / `SESSION_CONFIRMED`) for every peer endpoint with an establishment in
/// progress.
pub struct EstablishmentManager {
    config: EstablishmentConfig,
    local_identity: RouterIdentity,
    local_signing_key: SigningKey,
    local_endpoint: Endpoint,
    pending: RwLock<HashMap<Endpoint, PendingEstablishment>>,
}

/// Bytes both sides sign: the two DH public values in sender-then-peer
/// order, each side's endpoint in the same order, a relay tag (always 0;
/// relay-assisted introduction isn't implemented), and the `signed_on_time`
/// the signer chose (spec §4.3 step 3).
fn signed_fields(
    signer_public: &DhPublicKey,
    peer_public: &DhPublicKey,
    signer_endpoint: &Endpoint,
    peer_endpoint: &Endpoint,
    signed_on_time: u32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 * DH_VALUE_SIZE + 2 * 18 + 5);
    out.extend_from_slice(signer_public.as_bytes());
    out.extend_from_slice(peer_public.as_bytes());
    out.extend_from_slice(&crate::codec::addressing_bytes(signer_endpoint));
    out.extend_from_slice(&crate::codec::addressing_bytes(peer_endpoint));
    out.push(0); // relay tag
    out.extend_from_slice(&signed_on_time.to_be_bytes());
    out
}

impl EstablishmentManager {
    /// Construct a manager for a router with the given long-term identity,
    /// matching DSA signing key, and own endpoint (bound into every
    /// handshake signature alongside the peer's, per spec §4.3 step 3).
    #[must_use]
    pub fn new(config: EstablishmentConfig, local_identity: RouterIdentity, local_signing_key: SigningKey, local_endpoint: Endpoint) -> Self {
        Self {
            config,
            local_identity,
            local_signing_key,
            local_endpoint,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Begin an outbound handshake to a known peer, returning the
    /// `SESSION_REQUEST` body to send.
    #[must_use]
    pub fn begin_outbound(&self, endpoint: Endpoint, peer_identity: RouterIdentity) -> Vec<u8> {
        let mut rng = rand::rngs::OsRng;
        let our_private = DhPrivateKey::generate(&mut rng);
        let our_public = our_private.public_key();
        let body = SessionRequestBody { dh_public: *our_public.as_bytes() };

        let mut pending = self.pending.write().expect("lock poisoned");
        pending.insert(
            endpoint,
            PendingEstablishment {
                direction: Direction::Outbound,
                state: State::RequestSent,
                endpoint,
                our_private,
                our_public,
                their_public: None,
                peer_identity: Some(peer_identity),
                signed_on_time: None,
                keys: None,
                started_at: Instant::now(),
            },
        );
        body.encode()
    }

    /// Handle an inbound `SESSION_REQUEST`, returning the `SESSION_CREATED`
    /// body to send back.
    pub fn handle_session_request(&self, from: Endpoint, body: &SessionRequestBody, now: u32) -> Result<Vec<u8>, CoreError> {
        let their_public = DhPublicKey::from_bytes(body.dh_public);

        let mut rng = rand::rngs::OsRng;
        let our_private = DhPrivateKey::generate(&mut rng);
        let our_public = our_private.public_key();
        let shared = our_private.exchange(&their_public)?;
        let keys = derive_session_keys(shared.as_bytes());

        let signature = self
            .local_signing_key
            .sign(&mut rng, &signed_fields(&our_public, &their_public, &self.local_endpoint, &from, now));
        let created = SessionCreatedBody {
            dh_public: *our_public.as_bytes(),
            signed_on_time: now,
            signature: *signature.as_bytes(),
        };

        let mut pending = self.pending.write().expect("lock poisoned");
        pending.insert(
            from,
            PendingEstablishment {
                direction: Direction::Inbound,
                state: State::CreatedSent,
                endpoint: from,
                our_private,
                our_public,
                their_public: Some(their_public),
                peer_identity: None,
                signed_on_time: Some(now),
                keys: Some(keys),
                started_at: Instant::now(),
            },
        );
        Ok(created.encode())
    }

    /// Handle an inbound `SESSION_CREATED` for an outbound handshake,
    /// returning the `SESSION_CONFIRMED` body to send back. The caller's
    /// own verifying key for the peer must have been supplied via
    /// `begin_outbound`'s `peer_identity`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnexpectedHandshakeMessage`] if no outbound
    /// handshake is in `RequestSent` for `from`, and
    /// [`CoreError::InvalidHandshakeSignature`] if the responder's signature
    /// fails to verify.
    pub fn handle_session_created(&self, from: Endpoint, body: &SessionCreatedBody) -> Result<Vec<u8>, CoreError> {
        let mut pending = self.pending.write().expect("lock poisoned");
        let state = pending.get_mut(&from).ok_or(CoreError::UnexpectedHandshakeMessage)?;
        if state.direction != Direction::Outbound || state.state != State::RequestSent {
            return Err(CoreError::UnexpectedHandshakeMessage);
        }

        let their_public = DhPublicKey::from_bytes(body.dh_public);
        let peer_identity = state.peer_identity.as_ref().ok_or(CoreError::UnexpectedHandshakeMessage)?;

        // Responder signed (responder_public || initiator_public || responder_ep
        // || initiator_ep || relay_tag || signed_on_time); `state.endpoint` is
        // the address we sent SESSION_REQUEST to, i.e. the responder's own.
        let expected_fields = signed_fields(&their_public, &state.our_public, &state.endpoint, &self.local_endpoint, body.signed_on_time);
        let signature = Signature::from_bytes(body.signature);
        peer_identity
            .verifying_key()
            .verify(&expected_fields, &signature)
            .map_err(|_| CoreError::InvalidHandshakeSignature)?;

        let shared = state.our_private.exchange(&their_public)?;
        let keys = derive_session_keys(shared.as_bytes());

        let mut rng = rand::rngs::OsRng;
        // We sign (initiator_public || responder_public || initiator_ep ||
        // responder_ep || relay_tag || the same signed_on_time), so the
        // responder can re-derive the identical byte string at confirm time.
        let confirm_fields = signed_fields(&state.our_public, &their_public, &self.local_endpoint, &state.endpoint, body.signed_on_time);
        let confirm_signature = self.local_signing_key.sign(&mut rng, &confirm_fields);
        let confirmed = SessionConfirmedBody {
            certificate: self.local_identity.certificate().to_vec(),
            signature: *confirm_signature.as_bytes(),
        };

        state.their_public = Some(their_public);
        state.signed_on_time = Some(body.signed_on_time);
        state.keys = Some(keys);

        Ok(confirmed.encode())
    }

    /// Handle an inbound `SESSION_CONFIRMED` for an inbound handshake,
    /// promoting it to an established [`PeerState`] on success.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnexpectedHandshakeMessage`] if no inbound
    /// handshake is in `CreatedSent` for `from`, or if `resolver` cannot
    /// resolve the carried certificate to an identity; returns
    /// [`CoreError::InvalidHandshakeSignature`] if the confirming signature
    /// fails to verify.
    pub fn handle_session_confirmed(
        &self,
        from: Endpoint,
        body: &SessionConfirmedBody,
        resolver: &dyn IdentityResolver,
    ) -> Result<PeerState, CoreError> {
        let mut pending = self.pending.write().expect("lock poisoned");
        let state = pending.remove(&from).ok_or(CoreError::UnexpectedHandshakeMessage)?;
        if state.direction != Direction::Inbound || state.state != State::CreatedSent {
            return Err(CoreError::UnexpectedHandshakeMessage);
        }

        let their_public = state.their_public.ok_or(CoreError::UnexpectedHandshakeMessage)?;
        let signed_on_time = state.signed_on_time.ok_or(CoreError::UnexpectedHandshakeMessage)?;
        let peer_identity = resolver
            .resolve(&body.certificate)
            .ok_or(CoreError::UnexpectedHandshakeMessage)?;

        // Initiator signed (initiator_public || responder_public || initiator_ep
        // || responder_ep || relay_tag || the same signed_on_time we chose
        // when we sent SESSION_CREATED); `from` is the initiator's endpoint.
        let expected_fields = signed_fields(&their_public, &state.our_public, &from, &self.local_endpoint, signed_on_time);
        let signature = Signature::from_bytes(body.signature);
        peer_identity
            .verifying_key()
            .verify(&expected_fields, &signature)
            .map_err(|_| CoreError::InvalidHandshakeSignature)?;

        let keys = state.keys.ok_or(CoreError::UnexpectedHandshakeMessage)?;
        let hash = peer_identity.hash();
        Ok(PeerState::new(hash, state.endpoint, keys))
    }

    /// Remove and return endpoints whose handshake has been pending longer
    /// than the configured timeout (→ `FAILURE`).
    pub fn reap_timed_out(&self) -> Vec<Endpoint> {
        let mut pending = self.pending.write().expect("lock poisoned");
        let timed_out: Vec<Endpoint> = pending
            .iter()
            .filter(|(_, state)| state.started_at.elapsed() >= self.config.handshake_timeout)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in &timed_out {
            pending.remove(endpoint);
        }
        timed_out
    }

    /// Whether a handshake is currently in progress for `endpoint`.
    #[must_use]
    pub fn is_pending(&self, endpoint: &Endpoint) -> bool {
        self.pending.read().expect("lock poisoned").contains_key(endpoint)
    }

    /// The introduction key that protects `SESSION_REQUEST`/`SESSION_CREATED`
    /// for the handshake pending at `endpoint` -- always the responder's key,
    /// whichever side that is.
    #[must_use]
    pub fn intro_key_for(&self, endpoint: &Endpoint) -> Option<[u8; 32]> {
        let pending = self.pending.read().expect("lock poisoned");
        let state = pending.get(endpoint)?;
        match state.direction {
            Direction::Outbound => state.peer_identity.as_ref().map(|id| *id.introduction_key()),
            Direction::Inbound => Some(*self.local_identity.introduction_key()),
        }
    }

    /// This router's own introduction key, used to decrypt a fresh inbound
    /// `SESSION_REQUEST` for which no pending entry exists yet.
    #[must_use]
    pub fn local_introduction_key(&self) -> [u8; 32] {
        *self.local_identity.introduction_key()
    }

    /// The DH-derived session keys for a handshake already past
    /// `SESSION_CREATED`, used to decrypt the confirming message.
    #[must_use]
    pub fn session_keys_for(&self, endpoint: &Endpoint) -> Option<ssu_crypto::SessionKeys> {
        self.pending.read().expect("lock poisoned").get(endpoint)?.keys.clone()
    }

    /// Promote a completed outbound handshake to an established peer.
    ///
    /// The initiator derives its session keys and sends `SESSION_CONFIRMED`
    /// in the same step (`handle_session_created`), and real SSU peers start
    /// exchanging `DATA` right away rather than waiting for a fourth
    /// message. Call this once the `SESSION_CONFIRMED` reply has been sent
    /// for `endpoint` to move it out of the pending table and into the peer
    /// table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnexpectedHandshakeMessage`] if no outbound
    /// handshake with derived keys is pending for `endpoint`.
    pub fn complete_outbound(&self, endpoint: Endpoint) -> Result<PeerState, CoreError> {
        let mut pending = self.pending.write().expect("lock poisoned");
        let state = pending.get(&endpoint).ok_or(CoreError::UnexpectedHandshakeMessage)?;
        if state.direction != Direction::Outbound {
            return Err(CoreError::UnexpectedHandshakeMessage);
        }
        let keys = state.keys.clone().ok_or(CoreError::UnexpectedHandshakeMessage)?;
        let peer_identity = state.peer_identity.as_ref().ok_or(CoreError::UnexpectedHandshakeMessage)?;
        let hash = peer_identity.hash();
        let peer_endpoint = state.endpoint;

        pending.remove(&endpoint);
        Ok(PeerState::new(hash, peer_endpoint, keys))
    }
}
