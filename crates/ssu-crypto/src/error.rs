//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AES-CBC encryption failed (e.g. bad padding on the way in)
    #[error("encryption failed")]
    EncryptionFailed,

    /// AES-CBC decryption failed (padding or block-size mismatch)
    #[error("decryption failed")]
    DecryptionFailed,

    /// HMAC-MD5 verification failed
    #[error("mac verification failed")]
    MacMismatch,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid IV length
    #[error("invalid iv length")]
    InvalidIvLength,

    /// A Diffie-Hellman public value was out of range (not in [2, p-2], or zero)
    #[error("invalid diffie-hellman public value")]
    InvalidDhPublicValue,

    /// A Diffie-Hellman exchange produced a degenerate (small-subgroup) shared secret
    #[error("degenerate diffie-hellman shared secret")]
    DegenerateSharedSecret,

    /// DSA key material was malformed
    #[error("invalid dsa key")]
    InvalidDsaKey,

    /// DSA signature was malformed or did not verify
    #[error("invalid dsa signature")]
    InvalidSignature,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}
