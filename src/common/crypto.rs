use std::fmt;

use ed25519_dalek::{ed25519::{self, signature::Signer}, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest as ShaDigest, Sha512};

pub type Digest = [u8; 64];

pub struct Keypair {
    pubkey: Pubkey,
    dalek_signer: SigningKey,
}

/// Node identity. Every node in the network is addressed by its ed25519 public key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey {
    pub key: [u8; 32],
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Signature {
    pub signer: Pubkey,
    pub sig: [u8; 64],
}

impl Keypair {
    pub fn new_pair() -> Self {
        let mut csprng = OsRng;
        let dalek_signer = SigningKey::generate(&mut csprng);
        Self::from_signing_key(dalek_signer)
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(dalek_signer: SigningKey) -> Self {
        let pubkey = Pubkey::from(&dalek_signer.verifying_key().to_bytes());

        Keypair {
            pubkey,
            dalek_signer,
        }
    }

    pub fn sign(&self, digest: &Digest) -> Signature {
        let sig = self
            .dalek_signer
            .sign(digest)
            .to_bytes();

        Signature {
            signer: self.pubkey.clone(),
            sig,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey.clone()
    }
}

impl Pubkey {
    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.key[..4])
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.key))
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.short())
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.key
    }
}

impl From<&[u8; 32]> for Pubkey {
    fn from(bytes: &[u8; 32]) -> Self {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        Pubkey { key }
    }
}

impl Signature {
    pub fn verify(&self, digest: &Digest) -> bool {
        let dalek_sig = ed25519::Signature::from_bytes(&self.sig);
        let Ok(dalek_pubkey) = VerifyingKey::from_bytes(&self.signer.key) else {
            return false;
        };
        dalek_pubkey
            .verify_strict(digest, &dalek_sig)
            .is_ok()
    }
}

/// Incremental SHA-512 over length-prefixed fields.
///
/// Every variable-length field is prefixed with its length so that two different
/// field sequences can never produce the same byte stream.
pub struct FieldHasher {
    hasher: Sha512,
}

impl FieldHasher {
    pub fn new(domain: &'static str) -> Self {
        let mut hasher = Sha512::new();
        hasher.update((domain.len() as u64).to_be_bytes());
        hasher.update(domain.as_bytes());
        FieldHasher { hasher }
    }

    pub fn field(mut self, bytes: &[u8]) -> Self {
        self.hasher.update((bytes.len() as u64).to_be_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn flag(mut self, value: bool) -> Self {
        self.hasher.update([value as u8]);
        self
    }

    pub fn number(mut self, value: u64) -> Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub fn finish(self) -> Digest {
        let result = self.hasher.finalize();
        let mut digest = [0u8; 64];
        digest.copy_from_slice(&result[..]);
        digest
    }
}

pub fn short_digest(digest: &Digest) -> String {
    hex::encode(&digest[..6])
}
