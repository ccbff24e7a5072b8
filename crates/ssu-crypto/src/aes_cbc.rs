//! AES-256-CBC, the SSU wire format's payload cipher.

use crate::CryptoError;
use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// AES-256-CBC cipher bound to a single session key.
pub struct AesCbc {
    key: [u8; 32],
}

impl AesCbc {
    /// Create a new cipher with the given 256-bit key.
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        Self { key: *key }
    }

    /// Encrypt `plaintext` in place, which MUST already be padded to a
    /// multiple of 16 bytes (the wire format pads before encryption; this
    /// layer does not pad on the caller's behalf since the exact padding
    /// scheme is part of the packet-building contract in the core crate).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if `plaintext.len()` is not
    /// a multiple of the AES block size.
    pub fn encrypt(&self, iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() % 16 != 0 || plaintext.is_empty() {
            return Err(CryptoError::EncryptionFailed);
        }
        let mut buf = plaintext.to_vec();
        let encryptor = Encryptor::new(self.key.as_slice().into(), iv.into());
        encryptor
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, plaintext.len())
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(buf)
    }

    /// Decrypt `ciphertext`, which MUST be a multiple of the AES block size.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the ciphertext length is
    /// not a multiple of 16 bytes.
    pub fn decrypt(&self, iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() % 16 != 0 || ciphertext.is_empty() {
            return Err(CryptoError::DecryptionFailed);
        }
        let mut buf = ciphertext.to_vec();
        let decryptor = Decryptor::new(self.key.as_slice().into(), iv.into());
        let len = decryptor
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|_| CryptoError::DecryptionFailed)?
            .len();
        buf.truncate(len);
        Ok(buf)
    }
}
