//! X25519 key exchange (RFC 7748).
//!
//! One keypair lives for exactly one handshake; nothing is ever written to
//! disk. Private scalars and shared secrets are wrapped in `Zeroizing` so
//! they are cleared from memory when dropped.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// X25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Ephemeral X25519 keypair for one handshake.
///
/// # Example
///
/// ```
/// use veil_crypto::EphemeralKeyPair;
///
/// # fn example() -> veil_crypto::Result<()> {
/// let alice = EphemeralKeyPair::generate();
/// let bob = EphemeralKeyPair::generate();
///
/// let alice_shared = alice.diffie_hellman(bob.public_key())?;
/// let bob_shared = bob.diffie_hellman(alice.public_key())?;
/// assert_eq!(*alice_shared, *bob_shared);
/// # Ok(())
/// # }
/// ```
pub struct EphemeralKeyPair {
    /// Private scalar (32 bytes), zeroed on drop.
    secret: Zeroizing<StaticSecret>,
    /// Public curve point (32 bytes).
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret: Zeroizing::new(secret),
            public,
        }
    }

    /// The public key to put on the wire.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        self.public.as_bytes()
    }

    /// Compute the shared secret with the peer's public key.
    ///
    /// # Errors
    ///
    /// Fails with `Error::KeyExchange` when the peer's point is of low
    /// order (the contribution of our scalar vanishes and the result would
    /// be all zeros).
    pub fn diffie_hellman(
        &self,
        peer_public: &[u8; PUBLIC_KEY_LEN],
    ) -> Result<Zeroizing<[u8; 32]>> {
        let peer = PublicKey::from(*peer_public);
        let shared = self.secret.diffie_hellman(&peer);

        if shared.as_bytes() == &[0u8; 32] {
            return Err(Error::KeyExchange(
                "peer public key is a low-order point".into(),
            ));
        }

        Ok(Zeroizing::new(*shared.as_bytes()))
    }

    /// Build a keypair from a raw private scalar, for known-answer tests.
    #[doc(hidden)]
    pub fn from_private(private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            secret: Zeroizing::new(secret),
            public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 7748 §6.1 known-answer test.
    #[test]
    fn rfc7748_vectors() {
        let alice_private: [u8; 32] =
            hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .unwrap()
                .try_into()
                .unwrap();
        let alice_public =
            hex::decode("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
                .unwrap();
        let bob_private: [u8; 32] =
            hex::decode("5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb")
                .unwrap()
                .try_into()
                .unwrap();
        let bob_public =
            hex::decode("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f")
                .unwrap();
        let shared =
            hex::decode("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742")
                .unwrap();

        let alice = EphemeralKeyPair::from_private(alice_private);
        let bob = EphemeralKeyPair::from_private(bob_private);

        assert_eq!(alice.public_key(), alice_public.as_slice());
        assert_eq!(bob.public_key(), bob_public.as_slice());

        let alice_shared = alice.diffie_hellman(bob.public_key()).unwrap();
        let bob_shared = bob.diffie_hellman(alice.public_key()).unwrap();

        assert_eq!(&*alice_shared, shared.as_slice());
        assert_eq!(&*bob_shared, shared.as_slice());
    }

    #[test]
    fn fresh_keypairs_agree() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();

        let ab = a.diffie_hellman(b.public_key()).unwrap();
        let ba = b.diffie_hellman(a.public_key()).unwrap();

        assert_eq!(*ab, *ba);
        assert_ne!(&*ab, &[0u8; 32]);
    }

    #[test]
    fn rejects_low_order_point() {
        let keypair = EphemeralKeyPair::generate();
        let err = keypair.diffie_hellman(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, Error::KeyExchange(_)));
    }

    #[test]
    fn exchange_is_deterministic() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();

        let first = a.diffie_hellman(b.public_key()).unwrap();
        let second = a.diffie_hellman(b.public_key()).unwrap();
        assert_eq!(*first, *second);
    }
}
