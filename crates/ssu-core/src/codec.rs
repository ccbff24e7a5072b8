//! Packet Codec (C1): wire framing, MAC, and handshake payload grammar
//! (spec §4.1, §6).
//!
//! Wire format of a raw UDP datagram:
//!
//! ```text
//! MAC(16) || IV(16) || AES-256-CBC(sessionKey, IV, plaintext padded to 16)
//! ```
//!
//! `plaintext` is `flag(1) || timestamp(4, seconds, BE) || body`, where the
//! high nibble of `flag` is the [`PayloadType`] and the low nibble carries
//! per-type flags: bit 3 ([`FLAG_REKEY`]) marks that the sender encrypted
//! this packet under its next, not current, session key; lower bits
//! reserved. `body` is read by the type-specific decoders below, which
//! consume exactly as many bytes as their own length-prefixed fields
//! declare; any remaining bytes are CBC block padding and are ignored.

use crate::error::PacketError;
use crate::types::{Endpoint, PayloadType};
use ssu_crypto::aes_cbc::AesCbc;
use ssu_crypto::{hmac_md5, SessionKeys, DSA_SIGNATURE_SIZE, DH_VALUE_SIZE, IV_SIZE, MAC_SIZE};
use std::net::IpAddr;
use std::time::Duration;

/// A fixed 2-byte tag folded into the MAC's size field, binding the MAC to
/// this protocol revision the way the legacy wire format's `protocolVersion`
/// byte does.
const PROTOCOL_CONSTANT: u16 = 2;

/// Packet-level flag bit: the packet was encrypted under the sender's next
/// (not current) session key, mid-rekey. Distinct from [`crate::wire`]'s
/// `FLAG_EXPLICIT_ACKS`/`FLAG_ACK_BITFIELDS`/`FLAG_WANT_REPLY`, which flag
/// fields inside a `DATA` payload rather than the packet itself.
pub const FLAG_REKEY: u8 = 0x08;

/// A parsed-but-not-yet-decrypted packet: MAC, IV, and ciphertext split out
/// of a raw UDP datagram.
#[derive(Debug, Clone)]
pub struct Packet {
    mac: [u8; MAC_SIZE],
    iv: [u8; IV_SIZE],
    ciphertext: Vec<u8>,
}

/// A packet's plaintext after MAC verification and decryption.
#[derive(Debug, Clone)]
pub struct DecryptedPacket {
    /// High nibble of the flag byte.
    pub payload_type: PayloadType,
    /// Low nibble of the flag byte (per-type flags).
    pub flags: u8,
    /// Seconds-since-epoch timestamp.
    pub timestamp: u32,
    /// Type-specific body, with any CBC padding still attached at the end.
    pub body: Vec<u8>,
}

pub(crate) fn addressing_bytes(endpoint: &Endpoint) -> Vec<u8> {
    let mut out = match endpoint.ip() {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    out.extend_from_slice(&endpoint.port().to_be_bytes());
    out
}

fn mac_input(ciphertext: &[u8], iv: &[u8; IV_SIZE], endpoint: &Endpoint) -> Vec<u8> {
    let mut input = Vec::with_capacity(ciphertext.len() + IV_SIZE + 2 + 18);
    input.extend_from_slice(ciphertext);
    input.extend_from_slice(iv);
    let size_field = (ciphertext.len() as u16) ^ PROTOCOL_CONSTANT;
    input.extend_from_slice(&size_field.to_be_bytes());
    input.extend_from_slice(&addressing_bytes(endpoint));
    input
}

impl Packet {
    /// Split a raw UDP datagram into its MAC, IV, and ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Formatting`] if the datagram is shorter than
    /// `MAC_SIZE + IV_SIZE`, or its ciphertext isn't a non-empty multiple of
    /// 16 bytes.
    pub fn parse(datagram: &[u8]) -> Result<Self, PacketError> {
        if datagram.len() < MAC_SIZE + IV_SIZE {
            return Err(PacketError::Formatting);
        }
        let (mac_bytes, rest) = datagram.split_at(MAC_SIZE);
        let (iv_bytes, ciphertext) = rest.split_at(IV_SIZE);
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(PacketError::Formatting);
        }

        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(mac_bytes);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(iv_bytes);

        Ok(Self {
            mac,
            iv,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Verify the packet's MAC against `mac_key`, binding it to `from`
    /// (the endpoint the datagram was received from).
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::MacMismatch`] if verification fails.
    pub fn verify(&self, mac_key: &[u8; 32], from: &Endpoint) -> Result<(), PacketError> {
        let input = mac_input(&self.ciphertext, &self.iv, from);
        hmac_md5::verify_or_err(mac_key, &input, &self.mac).map_err(|_| PacketError::MacMismatch)
    }

    /// Decrypt the verified packet and parse its flag byte, timestamp, and
    /// body.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Formatting`] if decryption fails (wrong key,
    /// corrupt ciphertext) or the plaintext is too short to hold a flag byte
    /// and timestamp.
    pub fn decrypt(&self, session_key: &[u8; 32]) -> Result<DecryptedPacket, PacketError> {
        let cipher = AesCbc::new(session_key);
        let plaintext = cipher
            .decrypt(&self.iv, &self.ciphertext)
            .map_err(|_| PacketError::Formatting)?;

        if plaintext.len() < 5 {
            return Err(PacketError::Formatting);
        }
        let flag = plaintext[0];
        let timestamp_bytes: [u8; 4] = plaintext[1..5].try_into().expect("checked length");
        let timestamp = u32::from_be_bytes(timestamp_bytes);

        Ok(DecryptedPacket {
            payload_type: PayloadType::from_nibble(flag >> 4),
            flags: flag & 0x0F,
            timestamp,
            body: plaintext[5..].to_vec(),
        })
    }
}

/// Zero-pad `data` up to the next multiple of 16 bytes (minimum one block).
/// Parsers consume only the bytes their length-prefixed fields declare, so
/// trailing zero padding is simply never read.
fn pad_to_block(data: &mut Vec<u8>) {
    let target = ((data.len() / 16) + 1) * 16;
    data.resize(target, 0);
}

/// Encrypt a plaintext packet body for `payload_type`/`flags`/`timestamp`
/// and produce the full MAC-prefixed datagram addressed to `to`.
#[must_use]
pub fn encrypt(
    keys: &SessionKeys,
    to: &Endpoint,
    iv: [u8; IV_SIZE],
    payload_type: PayloadType,
    flags: u8,
    timestamp: u32,
    body: &[u8],
) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity(5 + body.len());
    plaintext.push((payload_type.to_nibble() << 4) | (flags & 0x0F));
    plaintext.extend_from_slice(&timestamp.to_be_bytes());
    plaintext.extend_from_slice(body);
    pad_to_block(&mut plaintext);

    let cipher = AesCbc::new(&keys.session_key);
    let ciphertext = cipher.encrypt(&iv, &plaintext).expect("padded to block size");

    let mac = hmac_md5::tag(&keys.mac_key, &mac_input(&ciphertext, &iv, to));

    let mut datagram = Vec::with_capacity(MAC_SIZE + IV_SIZE + ciphertext.len());
    datagram.extend_from_slice(&mac);
    datagram.extend_from_slice(&iv);
    datagram.extend_from_slice(&ciphertext);
    datagram
}

/// Check a decrypted packet's timestamp against the current time and an
/// acceptable skew window.
///
/// # Errors
///
/// Returns [`PacketError::TimestampSkew`] if `timestamp` differs from `now`
/// by more than `skew`.
pub fn check_timestamp(timestamp: u32, now: u32, skew: Duration) -> Result<(), PacketError> {
    let skew_secs = skew.as_secs().min(u64::from(u32::MAX)) as u32;
    let delta = timestamp.abs_diff(now);
    if delta > skew_secs {
        Err(PacketError::TimestampSkew)
    } else {
        Ok(())
    }
}

/// `SESSION_REQUEST` body: just the sender's DH public value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequestBody {
    /// Initiator's DH public value.
    pub dh_public: [u8; DH_VALUE_SIZE],
}

impl SessionRequestBody {
    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.dh_public.to_vec()
    }

    /// Decode from a packet body (ignoring trailing padding).
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Formatting`] if fewer than [`DH_VALUE_SIZE`]
    /// bytes are present.
    pub fn decode(body: &[u8]) -> Result<Self, PacketError> {
        let dh_public: [u8; DH_VALUE_SIZE] = body
            .get(..DH_VALUE_SIZE)
            .ok_or(PacketError::Formatting)?
            .try_into()
            .map_err(|_| PacketError::Formatting)?;
        Ok(Self { dh_public })
    }
}

/// `SESSION_CREATED` body: responder's DH public value plus a signature
/// over the signed fields (both public values and both timestamps, per the
/// establishment manager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCreatedBody {
    /// Responder's DH public value.
    pub dh_public: [u8; DH_VALUE_SIZE],
    /// Responder's wall-clock time when it signed, seconds since epoch.
    pub signed_on_time: u32,
    /// Responder's signature over the signed fields.
    pub signature: [u8; DSA_SIGNATURE_SIZE],
}

impl SessionCreatedBody {
    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DH_VALUE_SIZE + 4 + DSA_SIGNATURE_SIZE);
        out.extend_from_slice(&self.dh_public);
        out.extend_from_slice(&self.signed_on_time.to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decode from a packet body (ignoring trailing padding).
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Formatting`] on truncation.
    pub fn decode(body: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = 0usize;
        let dh_public: [u8; DH_VALUE_SIZE] = body
            .get(cursor..cursor + DH_VALUE_SIZE)
            .ok_or(PacketError::Formatting)?
            .try_into()
            .map_err(|_| PacketError::Formatting)?;
        cursor += DH_VALUE_SIZE;

        let signed_on_time = u32::from_be_bytes(
            body.get(cursor..cursor + 4)
                .ok_or(PacketError::Formatting)?
                .try_into()
                .map_err(|_| PacketError::Formatting)?,
        );
        cursor += 4;

        let signature: [u8; DSA_SIGNATURE_SIZE] = body
            .get(cursor..cursor + DSA_SIGNATURE_SIZE)
            .ok_or(PacketError::Formatting)?
            .try_into()
            .map_err(|_| PacketError::Formatting)?;

        Ok(Self {
            dh_public,
            signed_on_time,
            signature,
        })
    }
}

/// `SESSION_CONFIRMED` body: the initiator's identity certificate (its
/// verifying key is assumed already known to, or separately resolvable by,
/// the receiver's identity database -- see [`crate::types::RouterIdentity`])
/// plus a confirming signature over the signed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfirmedBody {
    /// Initiator's opaque identity certificate bytes.
    pub certificate: Vec<u8>,
    /// Initiator's signature over the signed fields.
    pub signature: [u8; DSA_SIGNATURE_SIZE],
}

impl SessionConfirmedBody {
    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.certificate.len() + DSA_SIGNATURE_SIZE);
        out.extend_from_slice(&(self.certificate.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.certificate);
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decode from a packet body (ignoring trailing padding).
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Formatting`] on truncation or a declared
    /// certificate length that exceeds the remaining bytes.
    pub fn decode(body: &[u8]) -> Result<Self, PacketError> {
        let cert_len = u16::from_be_bytes(
            body.get(0..2).ok_or(PacketError::Formatting)?.try_into().map_err(|_| PacketError::Formatting)?,
        ) as usize;
        let certificate = body.get(2..2 + cert_len).ok_or(PacketError::Formatting)?.to_vec();
        let sig_start = 2 + cert_len;
        let signature: [u8; DSA_SIGNATURE_SIZE] = body
            .get(sig_start..sig_start + DSA_SIGNATURE_SIZE)
            .ok_or(PacketError::Formatting)?
            .try_into()
            .map_err(|_| PacketError::Formatting)?;

        Ok(Self {
            certificate,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> SessionKeys {
        SessionKeys::new([0x11u8; 32], [0x22u8; 32])
    }

    fn test_endpoint() -> Endpoint {
        "127.0.0.1:12345".parse().unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let keys = test_keys();
        let endpoint = test_endpoint();
        let datagram = encrypt(&keys, &endpoint, [0x33u8; IV_SIZE], PayloadType::Data, 0, 1_700_000_000, b"hello world");

        let packet = Packet::parse(&datagram).unwrap();
        packet.verify(&keys.mac_key, &endpoint).unwrap();
        let decrypted = packet.decrypt(&keys.session_key).unwrap();

        assert_eq!(decrypted.payload_type, PayloadType::Data);
        assert_eq!(decrypted.timestamp, 1_700_000_000);
        assert_eq!(&decrypted.body[..11], b"hello world");
    }

    #[test]
    fn test_verify_fails_with_wrong_mac_key() {
        let keys = test_keys();
        let endpoint = test_endpoint();
        let datagram = encrypt(&keys, &endpoint, [0x01u8; IV_SIZE], PayloadType::Data, 0, 0, b"x");
        let packet = Packet::parse(&datagram).unwrap();
        assert!(packet.verify(&[0xFFu8; 32], &endpoint).is_err());
    }

    #[test]
    fn test_verify_fails_with_wrong_source_endpoint() {
        let keys = test_keys();
        let endpoint = test_endpoint();
        let datagram = encrypt(&keys, &endpoint, [0x01u8; IV_SIZE], PayloadType::Data, 0, 0, b"x");
        let packet = Packet::parse(&datagram).unwrap();
        let other: Endpoint = "127.0.0.1:9999".parse().unwrap();
        assert!(packet.verify(&keys.mac_key, &other).is_err());
    }

    #[test]
    fn test_decrypt_fails_with_wrong_session_key() {
        let keys = test_keys();
        let endpoint = test_endpoint();
        let datagram = encrypt(&keys, &endpoint, [0x01u8; IV_SIZE], PayloadType::Data, 0, 0, b"hello");
        let packet = Packet::parse(&datagram).unwrap();
        packet.verify(&keys.mac_key, &endpoint).unwrap();
        assert!(packet.decrypt(&[0xAAu8; 32]).is_err());
    }

    #[test]
    fn test_parse_rejects_short_datagram() {
        assert!(Packet::parse(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_parse_rejects_unaligned_ciphertext() {
        let bytes = vec![0u8; MAC_SIZE + IV_SIZE + 10];
        assert!(Packet::parse(&bytes).is_err());
    }

    #[test]
    fn test_check_timestamp_within_skew() {
        assert!(check_timestamp(1000, 1010, Duration::from_secs(60)).is_ok());
        assert!(check_timestamp(1000, 1100, Duration::from_secs(60)).is_err());
    }

    #[test]
    fn test_session_request_body_roundtrip() {
        let body = SessionRequestBody { dh_public: [0x07u8; DH_VALUE_SIZE] };
        let decoded = SessionRequestBody::decode(&body.encode()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_session_created_body_roundtrip() {
        let body = SessionCreatedBody {
            dh_public: [0x08u8; DH_VALUE_SIZE],
            signed_on_time: 1_700_000_001,
            signature: [0x09u8; DSA_SIGNATURE_SIZE],
        };
        let decoded = SessionCreatedBody::decode(&body.encode()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_session_confirmed_body_roundtrip() {
        let body = SessionConfirmedBody {
            certificate: vec![1, 2, 3, 4, 5],
            signature: [0x0Au8; DSA_SIGNATURE_SIZE],
        };
        let decoded = SessionConfirmedBody::decode(&body.encode()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_session_confirmed_body_truncated_is_error() {
        assert!(SessionConfirmedBody::decode(&[0, 5, 1, 2]).is_err());
    }

    #[test]
    fn test_data_payload_through_full_packet() {
        use crate::wire::{encode_data_payload, decode_data_payload, DataPayload, Fragment};

        let keys = test_keys();
        let endpoint = test_endpoint();
        let payload = DataPayload {
            want_reply: false,
            explicit_acks: vec![7],
            ack_bitfields: vec![],
            fragments: vec![Fragment { msg_id: 99, frag_num: 0, is_last: true, data: vec![0xCC; 50] }],
        };
        let body = encode_data_payload(&payload);
        let datagram = encrypt(&keys, &endpoint, [0x55u8; IV_SIZE], PayloadType::Data, 0, 42, &body);

        let packet = Packet::parse(&datagram).unwrap();
        packet.verify(&keys.mac_key, &endpoint).unwrap();
        let decrypted = packet.decrypt(&keys.session_key).unwrap();
        let decoded_payload = decode_data_payload(&decrypted.body).unwrap();

        assert_eq!(decoded_payload, payload);
    }
}
