//! SHA-256 hashing and HKDF-SHA256 key derivation.
//!
//! Provides:
//! - RouterHash derivation (`hash` of a RouterIdentity)
//! - Incremental hashing for larger inputs
//! - RFC 5869 HKDF-Extract/Expand, used to derive session and MAC keys from
//!   a Diffie-Hellman shared secret

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 hash output (32 bytes), used as RouterHash.
pub type HashOutput = [u8; 32];

/// Compute the SHA-256 hash of input data.
#[must_use]
pub fn hash(data: &[u8]) -> HashOutput {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental SHA-256 hasher for multi-part identities.
pub struct IncrementalHasher {
    hasher: Sha256,
    total_len: usize,
}

impl IncrementalHasher {
    /// Create a new incremental hasher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            total_len: 0,
        }
    }

    /// Feed more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.total_len += data.len();
    }

    /// Total bytes hashed so far.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Finalize and return the hash.
    #[must_use]
    pub fn finalize(self) -> HashOutput {
        self.hasher.finalize().into()
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// HKDF-Extract (RFC 5869) using HMAC-SHA256.
#[must_use]
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let mut mac = if salt.is_empty() {
        HmacSha256::new_from_slice(&[0u8; 32]).expect("hmac accepts any key length")
    } else {
        HmacSha256::new_from_slice(salt).expect("hmac accepts any key length")
    };
    mac.update(ikm);
    mac.finalize().into_bytes().into()
}

/// HKDF-Expand (RFC 5869) using HMAC-SHA256. `output` may be up to 255*32 bytes.
pub fn hkdf_expand(prk: &[u8; 32], info: &[u8], output: &mut [u8]) {
    let mut t_prev: Vec<u8> = Vec::new();
    let mut counter: u8 = 1;
    let mut written = 0;

    while written < output.len() {
        let mut mac = HmacSha256::new_from_slice(prk).expect("hmac accepts any key length");
        mac.update(&t_prev);
        mac.update(info);
        mac.update(&[counter]);
        let t = mac.finalize().into_bytes();

        let take = (output.len() - written).min(t.len());
        output[written..written + take].copy_from_slice(&t[..take]);
        written += take;

        t_prev = t.to_vec();
        counter = counter.checked_add(1).expect("HKDF output too large");
    }
}

/// Combined HKDF extract-then-expand.
pub fn hkdf(salt: &[u8], ikm: &[u8], info: &[u8], output: &mut [u8]) {
    let prk = hkdf_extract(salt, ikm);
    hkdf_expand(&prk, info, output);
}

/// Derive the SSU session key and MAC key from a Diffie-Hellman shared
/// secret. The SSU wire format derives both keys directly from the shared
/// secret's big-endian encoding with distinct context labels, which this
/// function models as two HKDF-Expand calls over a single extract.
#[must_use]
pub fn derive_session_keys(shared_secret: &[u8]) -> crate::SessionKeys {
    let prk = hkdf_extract(b"SSU-DH-KDF", shared_secret);
    let mut session_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    hkdf_expand(&prk, b"session-key", &mut session_key);
    hkdf_expand(&prk, b"mac-key", &mut mac_key);
    crate::SessionKeys::new(session_key, mac_key)
}
