//! Classical (finite-field) Diffie-Hellman over a fixed 2048-bit MODP group.
//!
//! The SSU handshake's public values are exactly 256 bytes (see
//! `DH_VALUE_SIZE`), which rules out a curve25519-style 32-byte exchange.
//! The group used here is the well-known RFC 3526 Group 14 prime with
//! generator 2 -- the same constants the legacy protocol this transport
//! implements relies on.

use crate::CryptoError;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// RFC 3526 2048-bit MODP Group 14 prime, big-endian hex.
const GROUP_14_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519",
    "B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7",
    "EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF"
);

/// Private Diffie-Hellman exponent. Best-effort zeroized on drop: the fixed-size
/// byte encoding is wiped; `num-bigint`'s internal limb storage does not expose
/// a zeroizing destructor, so the `BigUint` itself is only overwritten, not
/// guaranteed scrubbed at the allocator level.
pub struct PrivateKey {
    exponent: BigUint,
    bytes: [u8; crate::DH_VALUE_SIZE],
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
        self.exponent = BigUint::zero();
    }
}

/// Public Diffie-Hellman value, 256 bytes big-endian.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey([u8; crate::DH_VALUE_SIZE]);

/// Shared secret derived from a completed exchange, 256 bytes big-endian.
/// Feed this into [`crate::hash::derive_session_keys`] rather than using it
/// as key material directly.
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret([u8; crate::DH_VALUE_SIZE]);

impl SharedSecret {
    /// Raw big-endian bytes of the shared secret.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; crate::DH_VALUE_SIZE] {
        &self.0
    }
}

fn group_prime() -> BigUint {
    BigUint::parse_bytes(GROUP_14_PRIME_HEX.as_bytes(), 16).expect("GROUP_14_PRIME_HEX is valid")
}

fn to_fixed_bytes(value: &BigUint) -> [u8; crate::DH_VALUE_SIZE] {
    let be = value.to_bytes_be();
    let mut out = [0u8; crate::DH_VALUE_SIZE];
    debug_assert!(be.len() <= crate::DH_VALUE_SIZE);
    out[crate::DH_VALUE_SIZE - be.len()..].copy_from_slice(&be);
    out
}

impl PrivateKey {
    /// Generate a new random private exponent.
    ///
    /// The exponent is drawn uniformly from the full 256-byte range and
    /// reduced so it is never zero or congruent to zero mod (p-1).
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let p = group_prime();
        let order = &p - BigUint::one();
        loop {
            let mut raw = [0u8; crate::DH_VALUE_SIZE];
            rng.fill_bytes(&mut raw);
            let candidate = BigUint::from_bytes_be(&raw) % &order;
            if !candidate.is_zero() {
                return Self {
                    bytes: to_fixed_bytes(&candidate),
                    exponent: candidate,
                };
            }
        }
    }

    /// Compute the corresponding public value `g^x mod p`.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let p = group_prime();
        let g = BigUint::from(2u32);
        let pub_value = g.modpow(&self.exponent, &p);
        PublicKey(to_fixed_bytes(&pub_value))
    }

    /// Complete the exchange against a peer's public value.
    ///
    /// Rejects public values outside `[2, p-2]`, which would otherwise admit
    /// small-subgroup or identity-element attacks.
    pub fn exchange(&self, their_public: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let p = group_prime();
        let their_value = BigUint::from_bytes_be(&their_public.0);

        let two = BigUint::from(2u32);
        let p_minus_two = &p - &two;
        if their_value < two || their_value > p_minus_two {
            return Err(CryptoError::InvalidDhPublicValue);
        }

        let shared = their_value.modpow(&self.exponent, &p);
        if shared.is_zero() || shared == BigUint::one() {
            return Err(CryptoError::DegenerateSharedSecret);
        }

        Ok(SharedSecret(to_fixed_bytes(&shared)))
    }

    /// Raw big-endian bytes of the private exponent, left-padded to 256 bytes.
    ///
    /// Exposed only for tests and persistence; callers must zeroize any copy
    /// they take.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; crate::DH_VALUE_SIZE] {
        self.bytes
    }
}

impl PublicKey {
    /// Construct a public value from its 256-byte big-endian encoding.
    #[must_use]
    pub fn from_bytes(bytes: [u8; crate::DH_VALUE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Construct a public value from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if `slice` is not exactly
    /// [`crate::DH_VALUE_SIZE`] bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != crate::DH_VALUE_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: crate::DH_VALUE_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; crate::DH_VALUE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Raw 256-byte big-endian encoding.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; crate::DH_VALUE_SIZE] {
        &self.0
    }
}
