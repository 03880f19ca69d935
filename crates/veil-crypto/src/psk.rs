//! PSK authentication of handshake public keys.
//!
//! With a pre-shared key configured, the public-key payload on the wire is
//! `HMAC-SHA256(psk, pubkey) ‖ pubkey`; without one it is the raw public
//! key. Unauthenticated handshakes are insecure against an active
//! man-in-the-middle and exist for compatibility only.

use core::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::kex::PUBLIC_KEY_LEN;
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 output length in bytes.
pub const MAC_LEN: usize = 32;

/// Length of an authenticated public-key payload.
pub const SEALED_LEN: usize = MAC_LEN + PUBLIC_KEY_LEN;

/// Pre-shared key authenticating handshake public keys.
///
/// Both peers must hold the same bytes, distributed out-of-band. The key is
/// zeroed on drop and never appears in `Debug` output.
#[derive(Clone)]
pub struct PresharedKey(Zeroizing<Vec<u8>>);

impl PresharedKey {
    /// Wrap raw key bytes. Empty keys are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::KeyExchange("empty pre-shared key".into()));
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.0)
            .map_err(|_| Error::KeyExchange("invalid pre-shared key".into()))
    }

    /// Authenticate a public key for transmission: `mac(32) ‖ pubkey(32)`.
    pub fn seal_public_key(&self, public_key: &[u8; PUBLIC_KEY_LEN]) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(public_key);
        let tag = mac.finalize().into_bytes();

        let mut payload = Vec::with_capacity(SEALED_LEN);
        payload.extend_from_slice(&tag);
        payload.extend_from_slice(public_key);
        Ok(payload)
    }

    /// Verify an authenticated payload and return the peer's public key.
    ///
    /// Verification is constant-time. A mismatch means the peer holds a
    /// different pre-shared key, or the payload was tampered with in
    /// flight; either way the handshake must be aborted.
    pub fn open_public_key(&self, payload: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
        if payload.len() != SEALED_LEN {
            return Err(Error::KeyExchange(format!(
                "authenticated key payload must be {SEALED_LEN} bytes, got {}",
                payload.len()
            )));
        }

        let (tag, public_key) = payload.split_at(MAC_LEN);
        let mut mac = self.mac()?;
        mac.update(public_key);
        mac.verify_slice(tag)
            .map_err(|_| Error::AuthenticationFailed)?;

        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(public_key);
        Ok(out)
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PresharedKey(..)")
    }
}
