//! Two-node test fixture: a pair of [`SsuFacade`]s bound to real loopback
//! UDP sockets, each pre-seeded with the other's identity, for exercising
//! handshake and data-transfer behavior end to end.
//!
//! ```no_run
//! use ssu_integration_tests::fixtures::two_node::TwoNodeFixture;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let mut fixture = TwoNodeFixture::new().await;
//! fixture.handshake(Duration::from_secs(2)).await;
//! fixture.alice.send(fixture.bob_hash(), b"hello").await.unwrap();
//! # }
//! ```

use crate::{next_event, spawn_facade, test_identity};
use ssu_core::types::{Endpoint, RouterHash};
use ssu_core::{SsuEvent, SsuFacade};
use tokio::sync::mpsc::UnboundedReceiver;
use std::time::Duration;

/// A pair of established-or-establishable SSU peers on loopback.
pub struct TwoNodeFixture {
    pub alice: SsuFacade,
    pub alice_events: UnboundedReceiver<SsuEvent>,
    pub alice_addr: Endpoint,
    alice_hash: RouterHash,

    pub bob: SsuFacade,
    pub bob_events: UnboundedReceiver<SsuEvent>,
    pub bob_addr: Endpoint,
    bob_hash: RouterHash,

    bob_identity_for_connect: ssu_core::types::RouterIdentity,
}

impl TwoNodeFixture {
    /// Bind both nodes, each already aware of the other's `RouterIdentity`
    /// (as if both had already been looked up in a router-info database).
    pub async fn new() -> Self {
        let (alice_identity, alice_key) = test_identity(1);
        let (bob_identity, bob_key) = test_identity(2);
        let alice_hash = alice_identity.hash();
        let bob_hash = bob_identity.hash();

        let (alice, alice_events, alice_addr) = spawn_facade(alice_identity.clone(), alice_key, vec![bob_identity.clone()]).await;
        let (bob, bob_events, bob_addr) = spawn_facade(bob_identity.clone(), bob_key, vec![alice_identity]).await;

        Self {
            alice,
            alice_events,
            alice_addr,
            alice_hash,
            bob,
            bob_events,
            bob_addr,
            bob_hash,
            bob_identity_for_connect: bob_identity,
        }
    }

    /// Alice's [`RouterHash`], as seen from Bob's peer table once established.
    pub fn alice_hash(&self) -> RouterHash {
        self.alice_hash
    }

    /// Bob's [`RouterHash`], as seen from Alice's peer table once established.
    pub fn bob_hash(&self) -> RouterHash {
        self.bob_hash
    }

    /// Drive a full handshake: Alice connects to Bob, then both sides' event
    /// channels are drained until each reports the other as established.
    pub async fn handshake(&mut self, within: Duration) {
        self.alice.connect(self.bob_addr, self.bob_identity_for_connect.clone()).await;

        let alice_established = next_event(&mut self.alice_events, within).await;
        assert_eq!(alice_established, SsuEvent::PeerEstablished(self.bob_hash));

        let bob_established = next_event(&mut self.bob_events, within).await;
        assert_eq!(bob_established, SsuEvent::PeerEstablished(self.alice_hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_binds_distinct_loopback_ports() {
        let fixture = TwoNodeFixture::new().await;
        assert_ne!(fixture.alice_addr, fixture.bob_addr);
    }

    #[tokio::test]
    async fn test_fixture_handshake_establishes_both_sides() {
        let mut fixture = TwoNodeFixture::new().await;
        fixture.handshake(Duration::from_secs(2)).await;
        assert_eq!(fixture.alice.established_peer_count(), 1);
        assert_eq!(fixture.bob.established_peer_count(), 1);
    }
}
