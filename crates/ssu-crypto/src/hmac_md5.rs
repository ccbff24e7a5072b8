//! HMAC-MD5, the SSU wire format's packet MAC.
//!
//! MD5 is used here only because the wire format this crate implements fixes
//! it as the packet authentication primitive; it is not a general-purpose
//! recommendation elsewhere in this codebase.

use crate::constant_time::verify_16;
use crate::CryptoError;
use hmac::{Hmac, Mac};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

/// Compute the 16-byte HMAC-MD5 tag of `data` under `mac_key`.
#[must_use]
pub fn tag(mac_key: &[u8; 32], data: &[u8]) -> [u8; 16] {
    let mut mac = HmacMd5::new_from_slice(mac_key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verify a received MAC against the expected tag, in constant time.
#[must_use]
pub fn verify(mac_key: &[u8; 32], data: &[u8], received: &[u8; 16]) -> bool {
    verify_16(&tag(mac_key, data), received)
}

/// Verify a received MAC, returning a [`CryptoError`] on mismatch.
///
/// # Errors
///
/// Returns [`CryptoError::MacMismatch`] if `received` does not match the
/// computed tag.
pub fn verify_or_err(mac_key: &[u8; 32], data: &[u8], received: &[u8; 16]) -> Result<(), CryptoError> {
    if verify(mac_key, data, received) {
        Ok(())
    } else {
        Err(CryptoError::MacMismatch)
    }
}
