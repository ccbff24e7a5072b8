//! Error taxonomy for the SSU core protocol (see spec §7).
//!
//! Errors are split by the trust boundary they cross: [`PacketError`] covers
//! arbitrary network input (deliberately low-information -- no packet bytes,
//! no key material, since these end up in `warn`-level logs) and
//! [`CoreError`] covers the state-machine-level failures the rest of the
//! crate surfaces to callers.

use thiserror::Error;

/// Errors produced while parsing or authenticating a single wire packet.
///
/// Both variants are "drop and log" outcomes: the packet is discarded, no
/// peer or handshake state is mutated, and nothing propagates to sibling
/// peers.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// A parse encountered truncation, an impossible size, or an
    /// out-of-range field (e.g. a fragment number above 63).
    #[error("malformed packet")]
    Formatting,

    /// HMAC-MD5 verification against the expected key failed.
    #[error("mac verification failed")]
    MacMismatch,

    /// The packet's timestamp fell outside the configured skew window.
    #[error("timestamp outside skew window")]
    TimestampSkew,
}

/// Errors surfaced by the core state machines (establishment, IMF, OMF,
/// peer table) to their callers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Wraps a per-packet parse/auth failure (see [`PacketError`]).
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// A cryptographic primitive failed (key exchange, signature, cipher).
    #[error("crypto error: {0}")]
    Crypto(#[from] ssu_crypto::CryptoError),

    /// The establishment state machine received a message not valid for
    /// its current state (e.g. `SESSION_CREATED` while not `REQUEST_SENT`).
    /// Per spec this is silently ignored at the call site, not escalated;
    /// the variant exists for instrumentation and tests.
    #[error("handshake message ignored: not valid in current state")]
    UnexpectedHandshakeMessage,

    /// The handshake's signature did not verify.
    #[error("handshake signature invalid")]
    InvalidHandshakeSignature,

    /// An establishment attempt exceeded its deadline.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// An outbound message exhausted its retransmit budget.
    #[error("send failed after retransmit budget exhausted")]
    SendFailed,

    /// A message would require more than [`crate::types::MAX_FRAGMENT_NUMBER`]
    /// `+ 1` fragments at the configured MTU.
    #[error("message too large to fragment")]
    MessageTooLarge,

    /// The half-assembled byte budget (IMF memory cap) was exceeded.
    #[error("half-assembled byte budget exceeded")]
    ReassemblyBudgetExceeded,

    /// No established session or in-progress handshake exists for this peer.
    #[error("unknown peer")]
    UnknownPeer,

    /// The downward UDP transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] ssu_transport::TransportError),
}
