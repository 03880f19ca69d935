//! AES-128-GCM message envelopes.
//!
//! One envelope protects one message: `nonce(12) ‖ ciphertext ‖ tag(16)`.
//! The nonce is drawn fresh from the OS CSPRNG for every seal, which keeps
//! the API stateless and safe under concurrent senders. Session keys are
//! single-session, so the random-nonce collision bound holds for the
//! ≤ 2^32 messages a session may carry.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::{Error, Result};

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Session key length in bytes.
pub const KEY_LEN: usize = 16;

/// Fixed per-message overhead added by [`Envelope::seal`].
pub const OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Sealing and opening side of one session.
///
/// The cipher is keyed once from the 16-byte session key and owned by its
/// channel; both operations take `&self`, so concurrent sends on the same
/// channel never contend on the cipher itself.
pub struct Envelope {
    cipher: Aes128Gcm,
}

impl Envelope {
    /// Key an envelope with a derived session key.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let key = Key::<Aes128Gcm>::from(*key);
        Self {
            cipher: Aes128Gcm::new(&key),
        }
    }

    /// Encrypt one message into `nonce(12) ‖ ciphertext ‖ tag(16)`.
    ///
    /// The output is assembled in a single pre-sized buffer; the plaintext
    /// is encrypted in place after the nonce.
    pub fn seal(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![0u8; NONCE_LEN + plain.len() + TAG_LEN];
        OsRng.fill_bytes(&mut out[..NONCE_LEN]);
        out[NONCE_LEN..NONCE_LEN + plain.len()].copy_from_slice(plain);

        let (nonce, rest) = out.split_at_mut(NONCE_LEN);
        let (body, tag_slot) = rest.split_at_mut(plain.len());

        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", body)
            .map_err(|_| Error::Encryption("AES-128-GCM encryption failed".into()))?;
        tag_slot.copy_from_slice(&tag);

        Ok(out)
    }

    /// Verify and decrypt one envelope.
    ///
    /// # Errors
    ///
    /// - `MalformedEnvelope` when the input cannot even hold a nonce and a
    ///   tag.
    /// - `AuthenticationFailed` when the tag does not verify; the caller
    ///   must treat this as tampering and tear the channel down.
    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        if envelope.len() < OVERHEAD {
            return Err(Error::MalformedEnvelope {
                len: envelope.len(),
            });
        }

        let (nonce, rest) = envelope.split_at(NONCE_LEN);
        let (body, tag) = rest.split_at(rest.len() - TAG_LEN);

        let mut plain = body.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                b"",
                &mut plain,
                Tag::from_slice(tag),
            )
            .map_err(|_| Error::AuthenticationFailed)?;

        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn envelope(key_byte: u8) -> Envelope {
        Envelope::new(&[key_byte; KEY_LEN])
    }

    /// NIST GCM test case 1: zero key, zero nonce, empty plaintext.
    #[test]
    fn nist_gcm_empty_plaintext() {
        let mut wire = hex::decode("000000000000000000000000").unwrap();
        wire.extend(hex::decode("58e2fccefa7e3061367f1d57a4e7455a").unwrap());

        let plain = envelope(0).open(&wire).unwrap();
        assert!(plain.is_empty());
    }

    /// NIST GCM test case 2: zero key, zero nonce, 16 zero bytes.
    #[test]
    fn nist_gcm_single_block() {
        let mut wire = hex::decode("000000000000000000000000").unwrap();
        wire.extend(hex::decode("0388dace60b6a392f328c2b971b2fe78").unwrap());
        wire.extend(hex::decode("ab6e47d42cec13bdf53a67b21257bddf").unwrap());

        let plain = envelope(0).open(&wire).unwrap();
        assert_eq!(plain, [0u8; 16]);
    }

    #[test]
    fn seal_then_open() {
        let env = envelope(0x42);
        let plain = "你好, secure world".as_bytes();

        let sealed = env.seal(plain).unwrap();
        assert_eq!(sealed.len(), plain.len() + OVERHEAD);

        let opened = env.open(&sealed).unwrap();
        assert_eq!(opened, plain);
    }

    #[test]
    fn empty_message_roundtrip() {
        let env = envelope(0x42);
        let sealed = env.seal(b"").unwrap();
        assert_eq!(sealed.len(), OVERHEAD);
        assert!(env.open(&sealed).unwrap().is_empty());
    }

    #[test]
    fn any_flipped_bit_fails_authentication() {
        let env = envelope(0x42);
        let sealed = env.seal(b"tamper target").unwrap();

        // One flip in the nonce, one in the ciphertext, one in the tag.
        for index in [0, NONCE_LEN + 3, sealed.len() - 1] {
            let mut corrupted = sealed.clone();
            corrupted[index] ^= 0x01;
            let err = env.open(&corrupted).unwrap_err();
            assert!(matches!(err, Error::AuthenticationFailed));
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = envelope(0x42).seal(b"secret").unwrap();
        let err = envelope(0x43).open(&sealed).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed));
    }

    #[test]
    fn short_input_is_malformed() {
        let env = envelope(0x42);
        for len in 0..OVERHEAD {
            let err = env.open(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, Error::MalformedEnvelope { .. }));
        }
    }

    #[test]
    fn nonces_do_not_repeat() {
        let env = envelope(0x42);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let sealed = env.seal(b"x").unwrap();
            let mut nonce = [0u8; NONCE_LEN];
            nonce.copy_from_slice(&sealed[..NONCE_LEN]);
            assert!(seen.insert(nonce), "nonce repeated within a session");
        }
    }
}
