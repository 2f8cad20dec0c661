//! DID crypto: identitas kriptografis node.
//!
//! Trait [`DidCrypto`] adalah seam untuk skema signature DID; backend default
//! adalah Ed25519 dengan keypair bytes `secret (32) || public (32)`.

use anyhow::{anyhow, Result};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use rand_core::OsRng;

/// Kontrak crypto DID yang dipakai coordinator untuk signing lokal.
pub trait DidCrypto: Send + Sync {
    /// DID penandatangan.
    fn did(&self) -> &str;

    /// Menandatangani pesan; hasil adalah signature bytes (64 untuk Ed25519).
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>>;

    /// Verifikasi signature atas pesan dengan public key sendiri.
    fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<bool>;
}

/// Backend Ed25519 untuk [`DidCrypto`].
///
/// Keypair bytes mengandung secret material; struct ini sengaja tidak
/// mengimplementasikan `Debug` maupun `Display`.
#[derive(Clone)]
pub struct Ed25519Did {
    did: String,
    keypair_bytes: [u8; 64],
}

impl Ed25519Did {
    /// Generate keypair baru untuk `did`.
    pub fn generate(did: &str) -> Result<Self> {
        let mut csprng = OsRng {};
        let kp = Keypair::generate(&mut csprng);
        let mut keypair_bytes = [0u8; 64];
        keypair_bytes.copy_from_slice(&kp.to_bytes());
        Ok(Self {
            did: did.to_string(),
            keypair_bytes,
        })
    }

    /// Deterministik dari seed 32-byte (dipakai test dan key restore).
    pub fn from_seed(did: &str, seed: [u8; 32]) -> Result<Self> {
        let secret =
            SecretKey::from_bytes(&seed).map_err(|e| anyhow!("invalid secret seed: {}", e))?;
        let public: PublicKey = (&secret).into();
        let mut keypair_bytes = [0u8; 64];
        keypair_bytes[..32].copy_from_slice(secret.as_bytes());
        keypair_bytes[32..].copy_from_slice(public.as_bytes());
        Ok(Self {
            did: did.to_string(),
            keypair_bytes,
        })
    }

    /// Public key bytes (32).
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; 32] {
        let mut pk = [0u8; 32];
        pk.copy_from_slice(&self.keypair_bytes[32..]);
        pk
    }

    fn keypair(&self) -> Result<Keypair> {
        Keypair::from_bytes(&self.keypair_bytes)
            .map_err(|e| anyhow!("invalid keypair bytes: {}", e))
    }
}

impl DidCrypto for Ed25519Did {
    fn did(&self) -> &str {
        &self.did
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let kp = self.keypair()?;
        Ok(kp.sign(msg).to_bytes().to_vec())
    }

    fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<bool> {
        let pk = PublicKey::from_bytes(&self.keypair_bytes[32..])
            .map_err(|e| anyhow!("invalid public key: {}", e))?;
        let sig = Signature::from_bytes(sig).map_err(|e| anyhow!("invalid signature: {}", e))?;
        Ok(pk.verify(msg, &sig).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let dc = Ed25519Did::from_seed("did-a", [1u8; 32]).expect("did");
        let sig = dc.sign(b"message").expect("sign");
        assert_eq!(sig.len(), 64);
        assert!(dc.verify(b"message", &sig).expect("verify"));
        assert!(!dc.verify(b"other", &sig).expect("verify"));
    }

    #[test]
    fn test_from_seed_deterministic() {
        let a = Ed25519Did::from_seed("did-a", [9u8; 32]).expect("did");
        let b = Ed25519Did::from_seed("did-a", [9u8; 32]).expect("did");
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        assert_eq!(a.sign(b"x").expect("sign"), b.sign(b"x").expect("sign"));
    }

    #[test]
    fn test_generate_distinct_keys() {
        let a = Ed25519Did::generate("did-a").expect("did");
        let b = Ed25519Did::generate("did-b").expect("did");
        assert_ne!(a.public_key_bytes(), b.public_key_bytes());
        assert_eq!(a.did(), "did-a");
    }

    #[test]
    fn test_verify_rejects_malformed_signature() {
        let dc = Ed25519Did::from_seed("did-a", [2u8; 32]).expect("did");
        assert!(dc.verify(b"msg", &[0u8; 3]).is_err());
    }
}
