//! # SSU Crypto
//!
//! Cryptographic primitives for the SSU transport's wire format.
//!
//! This crate provides:
//! - AES-256-CBC, the payload cipher the wire format fixes
//! - HMAC-MD5, the packet MAC the wire format fixes
//! - SHA-256 hashing and an HKDF-style key derivation function
//! - A fixed 2048-bit MODP Diffie-Hellman group, matching the handshake's
//!   256-byte public values
//! - DSA (1024-bit, SHA-1 digest) signatures over the handshake's signed fields
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Wire size |
//! |----------|-----------|-----------|
//! | Payload cipher | AES-256-CBC | 16-byte IV, 16-byte blocks |
//! | Packet MAC | HMAC-MD5 | 16 bytes |
//! | Hash | SHA-256 | 32 bytes |
//! | Key Exchange | 2048-bit MODP DH | 256-byte public value |
//! | Signatures | DSA-1024 / SHA-1 | 40 bytes (r\|\|s, 20 bytes each) |
//!
//! None of these are a recommendation for new protocol design; they are the
//! primitives the wire format this crate implements already fixes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aes_cbc;
pub mod constant_time;
pub mod dh;
pub mod error;
pub mod hash;
pub mod hmac_md5;
pub mod random;
pub mod signatures;

pub use error::CryptoError;

/// AES session key size (bytes)
pub const SESSION_KEY_SIZE: usize = 32;

/// HMAC-MD5 MAC key size (bytes)
pub const MAC_KEY_SIZE: usize = 32;

/// AES block / CBC IV size (bytes)
pub const IV_SIZE: usize = 16;

/// Packet MAC size (bytes)
pub const MAC_SIZE: usize = 16;

/// SHA-256 output size (bytes)
pub const SHA256_OUTPUT_SIZE: usize = 32;

/// Classical DH public/private value size (bytes) -- 2048-bit group
pub const DH_VALUE_SIZE: usize = 256;

/// DSA-1024 signature size (bytes) -- r || s, 20 bytes each
pub const DSA_SIGNATURE_SIZE: usize = 40;

/// A session's current (and, once rekeyed, next) symmetric key pair.
#[derive(Clone, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SessionKeys {
    /// AES-256-CBC payload key
    pub session_key: [u8; SESSION_KEY_SIZE],
    /// HMAC-MD5 key
    pub mac_key: [u8; MAC_KEY_SIZE],
}

impl SessionKeys {
    /// Construct a key pair from raw bytes.
    #[must_use]
    pub fn new(session_key: [u8; SESSION_KEY_SIZE], mac_key: [u8; MAC_KEY_SIZE]) -> Self {
        Self {
            session_key,
            mac_key,
        }
    }
}
