//! DSA-1024 / SHA-1 signatures over the handshake's signed fields.
//!
//! The legacy identity format this transport interoperates with signs the
//! handshake (our DH public || their DH public || our endpoint || their
//! endpoint || relay tag || timestamp, see the establishment manager) with a
//! 1024-bit DSA key and a SHA-1 digest, producing a fixed 40-byte signature
//! (`r || s`, 20 bytes each). This is a wire-format requirement, not a
//! recommendation for new designs: 1024-bit DSA and SHA-1 are both far below
//! modern strength targets and exist here only for interoperability with the
//! identity format already fixed by the wire protocol.

use crate::CryptoError;
use dsa::{Components, KeySize, SigningKey as DsaSigningKey, VerifyingKey as DsaVerifyingKey};
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use sha1::{Digest, Sha1};
use signature::{DigestVerifier, RandomizedDigestSigner};

const COMPONENT_SIZE: usize = 20;

/// A 40-byte `r || s` DSA signature, the wire encoding the handshake uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature([u8; crate::DSA_SIGNATURE_SIZE]);

impl Signature {
    /// Raw 40-byte `r || s` encoding.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; crate::DSA_SIGNATURE_SIZE] {
        &self.0
    }

    /// Build from a raw 40-byte `r || s` encoding.
    #[must_use]
    pub fn from_bytes(bytes: [u8; crate::DSA_SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if `slice` is not exactly
    /// [`crate::DSA_SIGNATURE_SIZE`] bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != crate::DSA_SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignature);
        }
        let mut bytes = [0u8; crate::DSA_SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    fn to_dsa(&self) -> Result<dsa::Signature, CryptoError> {
        let r = BigUint::from_bytes_be(&self.0[..COMPONENT_SIZE]);
        let s = BigUint::from_bytes_be(&self.0[COMPONENT_SIZE..]);
        dsa::Signature::from_components(r, s).map_err(|_| CryptoError::InvalidSignature)
    }

    fn from_dsa(sig: &dsa::Signature) -> Self {
        let mut out = [0u8; crate::DSA_SIGNATURE_SIZE];
        let r = sig.r().to_bytes_be();
        let s = sig.s().to_bytes_be();
        out[COMPONENT_SIZE - r.len()..COMPONENT_SIZE].copy_from_slice(&r);
        out[crate::DSA_SIGNATURE_SIZE - s.len()..].copy_from_slice(&s);
        Self(out)
    }
}

/// DSA-1024 signing key (private), used to sign the handshake's confirmed fields.
pub struct SigningKey(DsaSigningKey);

impl SigningKey {
    /// Generate a fresh 1024-bit DSA keypair (fixed domain parameters, random
    /// `x`). Component generation for a 1024-bit key is expensive; callers
    /// should generate a router identity once and reuse it, not per-handshake.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let components = Components::generate(rng, KeySize::DSA_1024_160);
        Self(DsaSigningKey::generate(rng, components))
    }

    /// Sign `message` by hashing it with SHA-1 and producing a DSA signature
    /// over the digest, the scheme the handshake's identity format fixes.
    pub fn sign<R: RngCore + CryptoRng>(&self, rng: &mut R, message: &[u8]) -> Signature {
        let digest = Sha1::new_with_prefix(message);
        let sig: dsa::Signature = self.0.sign_digest_with_rng(rng, digest);
        Signature::from_dsa(&sig)
    }

    /// The corresponding verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key().clone())
    }
}

/// DSA-1024 verifying key (public), carried in a peer's `RouterIdentity`.
#[derive(Clone)]
pub struct VerifyingKey(DsaVerifyingKey);

impl VerifyingKey {
    /// Wrap an already-parsed DSA public key (decoded from the identity
    /// format by the out-of-scope identity/router-info layer).
    #[must_use]
    pub fn from_dsa(key: DsaVerifyingKey) -> Self {
        Self(key)
    }

    /// Verify `signature` over `message` (hashed with SHA-1 per the fixed
    /// handshake signature scheme).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the signature does not
    /// verify, or if its `r`/`s` components are malformed.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let sig = signature.to_dsa()?;
        let digest = Sha1::new_with_prefix(message);
        self.0
            .verify_digest(digest, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn keypair() -> (SigningKey, VerifyingKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        (signing_key, verifying_key)
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let (signing_key, verifying_key) = keypair();
        let message = b"session confirmed fields";
        let signature = signing_key.sign(&mut OsRng, message);
        assert!(verifying_key.verify(message, &signature).is_ok());
    }

    #[test]
    fn test_wrong_message_fails_verification() {
        let (signing_key, verifying_key) = keypair();
        let signature = signing_key.sign(&mut OsRng, b"original");
        assert!(verifying_key.verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let (signing_key, _) = keypair();
        let (_, other_verifying_key) = keypair();
        let message = b"test";
        let signature = signing_key.sign(&mut OsRng, message);
        assert!(other_verifying_key.verify(message, &signature).is_err());
    }

    #[test]
    fn test_signature_is_40_bytes() {
        let (signing_key, _) = keypair();
        let signature = signing_key.sign(&mut OsRng, b"test");
        assert_eq!(signature.as_bytes().len(), crate::DSA_SIGNATURE_SIZE);
    }

    #[test]
    fn test_signature_roundtrip_bytes() {
        let (signing_key, verifying_key) = keypair();
        let message = b"test";
        let signature = signing_key.sign(&mut OsRng, message);
        let bytes = *signature.as_bytes();
        let recovered = Signature::from_bytes(bytes);
        assert!(verifying_key.verify(message, &recovered).is_ok());
    }

    #[test]
    fn test_signature_from_slice_wrong_size() {
        assert!(Signature::from_slice(&[0u8; 32]).is_err());
        assert!(Signature::from_slice(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_tampered_signature_fails() {
        let (signing_key, verifying_key) = keypair();
        let message = b"test message";
        let signature = signing_key.sign(&mut OsRng, message);
        let mut tampered = *signature.as_bytes();
        tampered[0] ^= 0xFF;
        let tampered_sig = Signature::from_bytes(tampered);
        assert!(verifying_key.verify(message, &tampered_sig).is_err());
    }

    #[test]
    fn test_empty_message() {
        let (signing_key, verifying_key) = keypair();
        let signature = signing_key.sign(&mut OsRng, b"");
        assert!(verifying_key.verify(b"", &signature).is_ok());
    }
}
