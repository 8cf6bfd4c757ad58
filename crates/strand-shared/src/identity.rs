//! Thread and node identities.
//!
//! A thread identity is a pure function of its BIP-39 phrase: the phrase is
//! expanded to a seed, the seed is run through HMAC-SHA256 under a fixed
//! domain-separation key, and the 32-byte MAC becomes the Ed25519 secret.
//! The thread id is the libp2p peer id of the resulting public key, which
//! is also the pub/sub topic the thread is announced on.

use std::fmt;

use bip39::{Language, Mnemonic};
use ed25519_dalek::{SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::constants::{IDENTITY_HMAC_KEY, PHRASE_ENTROPY_BITS, SECRET_KEY_SIZE};
use crate::crypto::{derive_thread_key, SymmetricKey};
use crate::error::IdentityError;
use crate::types::ThreadId;

type HmacSha256 = Hmac<Sha256>;

/// Everything needed to read, write and re-share a thread.
#[derive(Clone)]
pub struct ThreadIdentity {
    id: ThreadId,
    signing_key: SigningKey,
    phrase: String,
    name: String,
}

impl ThreadIdentity {
    /// Derive the identity for `phrase`, labelled locally as `name`.
    pub fn derive(phrase: &str, name: &str) -> Result<Self, IdentityError> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase)
            .map_err(|e| IdentityError::InvalidPhrase(e.to_string()))?;
        let seed = mnemonic.to_seed("");
        let secret = secret_from_seed(&seed)?;

        Self::restore(mnemonic.to_string(), name.to_string(), &secret)
    }

    /// Rebuild an identity from stored parts without re-running the
    /// mnemonic expansion.
    pub fn restore(phrase: String, name: String, secret: &[u8; 32]) -> Result<Self, IdentityError> {
        let signing_key = SigningKey::from_bytes(secret);
        let id = ThreadId(peer_id_for(&signing_key.verifying_key())?);
        Ok(Self {
            id,
            signing_key,
            phrase,
            name,
        })
    }

    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        self.signing_key.as_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Symmetric key every bundle part of this thread is sealed with.
    pub fn content_key(&self) -> SymmetricKey {
        derive_thread_key(self.signing_key.as_bytes())
    }
}

impl fmt::Debug for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadIdentity")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh 24-word phrase from 256 bits of OS entropy.
pub fn generate_phrase() -> Result<String, IdentityError> {
    let mut entropy = [0u8; PHRASE_ENTROPY_BITS / 8];
    OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|_| IdentityError::GenerationFailed)?;
    Ok(mnemonic.to_string())
}

/// HMAC the mnemonic seed into an Ed25519 secret.
pub fn secret_from_seed(seed: &[u8]) -> Result<[u8; SECRET_KEY_SIZE], IdentityError> {
    let mut mac =
        HmacSha256::new_from_slice(IDENTITY_HMAC_KEY).map_err(|_| IdentityError::GenerationFailed)?;
    mac.update(seed);
    let digest = mac.finalize().into_bytes();

    let mut secret = [0u8; SECRET_KEY_SIZE];
    secret.copy_from_slice(&digest[..SECRET_KEY_SIZE]);
    Ok(secret)
}

fn peer_id_for(public: &VerifyingKey) -> Result<String, IdentityError> {
    let key = libp2p::identity::ed25519::PublicKey::try_from_bytes(public.as_bytes())
        .map_err(|_| IdentityError::InvalidKeyBytes)?;
    Ok(libp2p::identity::PublicKey::from(key).to_peer_id().to_base58())
}

/// The local node's own peer key. Distinct from every thread key; it signs
/// pub/sub traffic and identifies the author of announcements.
#[derive(Clone)]
pub struct NodeIdentity {
    signing_key: SigningKey,
}

impl NodeIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restore identity from secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        self.signing_key.as_bytes()
    }

    /// libp2p keypair for the swarm.
    pub fn to_libp2p_keypair(&self) -> Result<libp2p::identity::Keypair, IdentityError> {
        let mut secret = *self.signing_key.as_bytes();
        libp2p::identity::Keypair::ed25519_from_bytes(&mut secret)
            .map_err(|_| IdentityError::InvalidKeyBytes)
    }

    /// Base58 peer id, as seen by other nodes on the bus.
    pub fn peer_id(&self) -> Result<String, IdentityError> {
        peer_id_for(&self.signing_key.verifying_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-39 test vector: all-zero 128-bit entropy.
    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_derive_is_deterministic() {
        let a = ThreadIdentity::derive(PHRASE, "beta").unwrap();
        let b = ThreadIdentity::derive(PHRASE, "other-name").unwrap();

        assert_eq!(a.id(), b.id());
        assert_eq!(a.secret_bytes(), b.secret_bytes());
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        assert_eq!(a.content_key(), b.content_key());
    }

    #[test]
    fn test_different_phrases_different_ids() {
        let a = ThreadIdentity::derive(&generate_phrase().unwrap(), "a").unwrap();
        let b = ThreadIdentity::derive(&generate_phrase().unwrap(), "b").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_generated_phrase_has_24_words() {
        let phrase = generate_phrase().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
        assert!(ThreadIdentity::derive(&phrase, "fresh").is_ok());
    }

    #[test]
    fn test_invalid_phrase_rejected() {
        let err = ThreadIdentity::derive("definitely not a mnemonic", "x").unwrap_err();
        assert!(matches!(err, IdentityError::InvalidPhrase(_)));
    }

    #[test]
    fn test_restore_matches_derive() {
        let derived = ThreadIdentity::derive(PHRASE, "beta").unwrap();
        let restored = ThreadIdentity::restore(
            derived.phrase().to_string(),
            "beta".to_string(),
            derived.secret_bytes(),
        )
        .unwrap();
        assert_eq!(derived.id(), restored.id());
    }

    #[test]
    fn test_node_identity_roundtrip() {
        let id = NodeIdentity::generate();
        let restored = NodeIdentity::from_secret_bytes(id.secret_bytes());
        assert_eq!(id.peer_id().unwrap(), restored.peer_id().unwrap());

        let keypair = id.to_libp2p_keypair().unwrap();
        assert_eq!(keypair.public().to_peer_id().to_base58(), id.peer_id().unwrap());
    }
}
