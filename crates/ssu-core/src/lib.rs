//! # SSU Core
//!
//! Protocol-level implementation of SSU ("Secure Semi-reliable UDP"), the
//! I2P-compatible transport used between routers: UDP datagrams, MAC'd and
//! AES-256-CBC-encrypted, carrying a Diffie-Hellman session handshake and
//! fragmented, selectively-acknowledged application data.
//!
//! This crate provides:
//! - **Packet codec**: wire framing, MAC, and handshake/data payload grammar
//! - **Peer table**: the set of established sessions, indexed by identity
//!   hash and by endpoint
//! - **Establishment manager**: the 3-message DH handshake state machine
//! - **Inbound/Outbound message fragments**: reassembly and fragmented,
//!   retransmitted delivery of application messages
//! - **Acknowledgement flusher**: periodic piggybacked ACK generation
//! - **Packet handler**: the top-level inbound datagram dispatcher
//! - **Transport facade**: [`SsuFacade`], the component owner and async
//!   entry point
//!
//! ## Quick Start
//!
//! ```no_run
//! use ssu_core::{SsuConfig, SsuFacade, StaticIdentityResolver};
//! use ssu_core::types::RouterIdentity;
//! use ssu_crypto::signatures::SigningKey;
//! use ssu_transport::AsyncUdpTransport;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SsuConfig::default();
//! let mut rng = rand::rngs::OsRng;
//! let signing_key = SigningKey::generate(&mut rng);
//! let mut intro_key = [0u8; 32];
//! ssu_crypto::random::fill_random(&mut intro_key)?;
//! let identity = RouterIdentity::new(signing_key.verifying_key(), vec![], intro_key);
//!
//! let transport = Arc::new(AsyncUdpTransport::bind_with_config(config.listen_addr, &config.transport).await?);
//! let (mut facade, mut events) = SsuFacade::new(config, identity, signing_key, transport);
//! facade.start(Arc::new(StaticIdentityResolver::new()));
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Structure
//!
//! - [`types`]: shared identifiers (`Endpoint`, `RouterHash`, `RouterIdentity`, `PayloadType`)
//! - [`config`]: typed, serde-able tunables for every component
//! - [`error`]: the packet- and state-machine-level error taxonomy
//! - [`codec`]: wire framing, MAC, encryption, and handshake body grammar
//! - [`wire`]: the `DATA` payload grammar (fragments, explicit and bitfield ACKs)
//! - [`peer_table`]: established-session storage
//! - [`establishment`]: the DH handshake state machine
//! - [`imf`]: inbound fragment reassembly
//! - [`omf`]: outbound fragmentation and retransmission
//! - [`ack_flusher`]: periodic ACK generation
//! - [`packet_handler`]: the inbound datagram dispatcher
//! - [`facade`]: [`SsuFacade`], the component owner and async entry point

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod ack_flusher;
pub mod codec;
pub mod config;
pub mod error;
pub mod establishment;
pub mod facade;
pub mod imf;
pub mod omf;
pub mod packet_handler;
pub mod peer_table;
pub mod types;
pub mod wire;

pub use config::SsuConfig;
pub use error::{CoreError, PacketError};
pub use establishment::{EstablishmentManager, IdentityResolver};
pub use facade::{SsuEvent, SsuFacade, StaticIdentityResolver};
pub use packet_handler::{HandlerEvent, HandlerOutput};
pub use peer_table::{PeerState, PeerTable};
pub use types::{Endpoint, MessageId, PayloadType, RouterHash, RouterIdentity};
