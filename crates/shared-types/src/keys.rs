//! # Ed25519 Node Keys
//!
//! Validators and account holders sign with ed25519. The public key doubles
//! as the on-chain [`Address`].

use crate::{Address, Hash, Signature, TypesError, TypesResult};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

/// Ed25519 key pair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a random key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Parse a hex-encoded 32-byte seed.
    pub fn from_hex_seed(seed: &str) -> TypesResult<Self> {
        let bytes = hex::decode(seed).map_err(|e| TypesError::InvalidHex {
            what: "seed",
            reason: e.to_string(),
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| TypesError::InvalidHex {
            what: "seed",
            reason: "expected 32 bytes".into(),
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Address (public key) of this pair.
    pub fn address(&self) -> Address {
        Address(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign an arbitrary message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message).to_bytes()
    }

    /// Sign `network_id || hash`.
    pub fn sign_hash(&self, network_id: &[u8], hash: &Hash) -> Signature {
        self.sign(&crate::signing_message(network_id, hash))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl Address {
    /// Check that the bytes form a valid ed25519 point.
    pub fn validate(&self) -> TypesResult<()> {
        VerifyingKey::from_bytes(&self.0)
            .map(|_| ())
            .map_err(|_| TypesError::InvalidPublicKey(self.to_string()))
    }

    /// Verify `signature` over `message` against this address.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> TypesResult<()> {
        let key = VerifyingKey::from_bytes(&self.0)
            .map_err(|_| TypesError::InvalidPublicKey(self.to_string()))?;
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        key.verify(message, &sig)
            .map_err(|_| TypesError::InvalidSignature(self.short()))
    }

    /// Verify a signature over `network_id || hash`.
    pub fn verify_hash(
        &self,
        network_id: &[u8],
        hash: &Hash,
        signature: &Signature,
    ) -> TypesResult<()> {
        self.verify(&crate::signing_message(network_id, hash), signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate();
        let hash = [3u8; 32];
        let sig = keypair.sign_hash(b"test-net", &hash);
        assert!(keypair.address().verify_hash(b"test-net", &hash, &sig).is_ok());
    }

    #[test]
    fn test_other_network_fails() {
        let keypair = KeyPair::generate();
        let hash = [3u8; 32];
        let sig = keypair.sign_hash(b"net-a", &hash);
        assert!(keypair.address().verify_hash(b"net-b", &hash, &sig).is_err());
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = KeyPair::from_seed([9u8; 32]);
        let b = KeyPair::from_hex_seed(&hex::encode([9u8; 32])).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_bad_seed_rejected() {
        assert!(KeyPair::from_hex_seed("abcd").is_err());
        assert!(KeyPair::from_hex_seed("zz").is_err());
    }
}
