//! Session-key derivation (HKDF-SHA256, RFC 5869).
//!
//! Both peers feed the raw Diffie-Hellman shared secret through
//! extract-then-expand with an all-zero salt and a channel-specific info
//! label, and truncate to the 16-byte AES-128 session key. The labels
//! differ between the stream and datagram channels so the two never derive
//! interchangeable keys from the same secret.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::envelope::KEY_LEN;
use crate::{Error, Result};

/// Expansion label for stream-channel session keys.
pub const STREAM_INFO: &[u8] = b"Secure Channel Session Key";

/// Expansion label for datagram-channel session keys.
pub const DATAGRAM_INFO: &[u8] = b"SecureDatagramSocket Session Key";

/// Generic HKDF-SHA256 per RFC 5869.
///
/// # Errors
///
/// Fails with `Error::KeyDerivation` when `len` exceeds the maximum output
/// length (255 × 32 bytes).
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".into()))?;
    Ok(Zeroizing::new(okm))
}

/// Derive the 16-byte session key for one channel.
///
/// Extract uses a 32-byte zero salt; expand uses the channel's `info`
/// label. Both peers must pass the same label to arrive at the same key.
pub fn derive_session_key(
    shared_secret: &[u8],
    info: &[u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let okm = hkdf_sha256(shared_secret, &[0u8; 32], info, KEY_LEN)?;
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&okm);
    Ok(Zeroizing::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 5869 Appendix A.1 known-answer test.
    #[test]
    fn rfc5869_case_1() {
        let ikm = [0x0b; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();
        let expected = hex::decode(
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf\
             34007208d5b887185865",
        )
        .unwrap();

        let okm = hkdf_sha256(&ikm, &salt, &info, 42).unwrap();
        assert_eq!(&*okm, expected.as_slice());
    }

    #[test]
    fn same_inputs_same_key() {
        let secret = [0x42u8; 32];
        let a = derive_session_key(&secret, STREAM_INFO).unwrap();
        let b = derive_session_key(&secret, STREAM_INFO).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn labels_separate_key_spaces() {
        let secret = [0x42u8; 32];
        let stream = derive_session_key(&secret, STREAM_INFO).unwrap();
        let datagram = derive_session_key(&secret, DATAGRAM_INFO).unwrap();
        assert_ne!(*stream, *datagram);
    }

    #[test]
    fn output_is_key_sized() {
        let key = derive_session_key(&[7u8; 32], DATAGRAM_INFO).unwrap();
        assert_eq!(key.len(), KEY_LEN);
    }
}
