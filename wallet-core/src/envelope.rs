//! Password-gated encryption of secret material and of the persisted
//! wallet snapshot.
//!
//! The scheme is deliberately simple:
//!
//! - Argon2id stretches the password into a 32-byte AES key
//!   (`memory = 64 MiB`, `iterations = 3`, `parallelism = 4`).
//! - AES-256-GCM seals each plaintext under a fresh random 12-byte IV.
//! - A password verifier, `SHA-256(Argon2id(password, salt))`, is stored
//!   alongside and compared in constant time on unlock. A wrong password
//!   is therefore detected before any decryption is attempted, and an
//!   AEAD tag failure after a passing verifier means corruption, not a
//!   bad password.
//!
//! Two serialized forms exist: [`SealedBlob`] for per-item ciphertexts
//! inside the wallet snapshot (base64 fields, keyed by the shared salt),
//! and the whole-database envelope `version(1B) ‖ salt(16B) ‖ iv(12B) ‖
//! ciphertext` that wraps the snapshot file itself.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine as _;
use bitcoin_hashes::{sha256, Hash};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::WalletError;
use crate::rng::Crng;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// Version byte of the whole-database envelope.
pub const ENVELOPE_VERSION: u8 = 1;

/// Version recorded in per-item ciphertexts and encryption metadata.
pub const ITEM_VERSION: u32 = 1;

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// A per-item ciphertext as persisted in the wallet snapshot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SealedBlob {
    pub version: u32,
    /// Base64 KDF salt (shared across items sealed under one password).
    pub salt: String,
    /// Base64 12-byte IV, unique per item.
    pub iv: String,
    /// Base64 AES-256-GCM ciphertext + tag.
    pub ciphertext: String,
}

/// An Argon2id-derived AES-256-GCM key, cached so the expensive KDF runs
/// once per password entry rather than once per sealed item.
pub struct EnvelopeKey {
    key: Secret<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
}

impl std::fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Avoid formatting secrets.
        f.write_str("EnvelopeKey(..)")
    }
}

impl Clone for EnvelopeKey {
    fn clone(&self) -> Self {
        Self {
            key: Secret::new(*self.key.expose_secret()),
            salt: self.salt,
        }
    }
}

impl EnvelopeKey {
    /// Run the KDF over `password` with a fresh random salt.
    pub fn generate<R: Crng>(
        rng: &mut R,
        password: &str,
    ) -> Result<Self, WalletError> {
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        Self::derive(password, &salt)
    }

    /// Run the KDF over `password` with a known salt.
    pub fn derive(
        password: &str,
        salt: &[u8; SALT_LEN],
    ) -> Result<Self, WalletError> {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(KEY_LEN),
        )
        .map_err(|_| WalletError::CryptoFailed)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(|_| WalletError::CryptoFailed)?;
        Ok(Self {
            key: Secret::new(key),
            salt: *salt,
        })
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// `SHA-256(Argon2id(password, salt))`, stored so unlock can reject a
    /// wrong password without attempting decryption.
    pub fn verification_hash(&self) -> [u8; 32] {
        sha256::Hash::hash(self.key.expose_secret()).to_byte_array()
    }

    /// Whether this key's verifier matches `expected`, in constant time.
    pub fn verifies(&self, expected: &[u8; 32]) -> bool {
        self.verification_hash().ct_eq(expected).into()
    }

    fn cipher(&self) -> Aes256Gcm {
        // 32-byte key length is correct by construction.
        Aes256Gcm::new_from_slice(self.key.expose_secret())
            .expect("AES-256 key length")
    }

    /// Seal one item under a fresh IV.
    pub fn seal<R: Crng>(
        &self,
        rng: &mut R,
        plaintext: &[u8],
    ) -> Result<SealedBlob, WalletError> {
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut iv);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| WalletError::CryptoFailed)?;

        let b64 = base64::engine::general_purpose::STANDARD;
        Ok(SealedBlob {
            version: ITEM_VERSION,
            salt: b64.encode(self.salt),
            iv: b64.encode(iv),
            ciphertext: b64.encode(ciphertext),
        })
    }

    /// Open a per-item ciphertext.
    pub fn open(&self, blob: &SealedBlob) -> Result<Vec<u8>, WalletError> {
        if blob.version != ITEM_VERSION {
            return Err(WalletError::CryptoFailed);
        }
        let b64 = base64::engine::general_purpose::STANDARD;
        let iv = b64
            .decode(&blob.iv)
            .map_err(|_| WalletError::CryptoFailed)?;
        let ciphertext = b64
            .decode(&blob.ciphertext)
            .map_err(|_| WalletError::CryptoFailed)?;
        if iv.len() != IV_LEN {
            return Err(WalletError::CryptoFailed);
        }
        self.cipher()
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| WalletError::CryptoFailed)
    }

    /// Wrap a whole byte stream in the database envelope:
    /// `version(1B) ‖ salt(16B) ‖ iv(12B) ‖ ciphertext`.
    pub fn seal_database<R: Crng>(
        &self,
        rng: &mut R,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut iv);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| WalletError::CryptoFailed)?;

        let mut out =
            Vec::with_capacity(1 + SALT_LEN + IV_LEN + ciphertext.len());
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Unwrap a database envelope previously produced by
    /// [`Self::seal_database`].
    pub fn open_database(&self, bytes: &[u8]) -> Result<Vec<u8>, WalletError> {
        let (salt, iv, ciphertext) =
            parse_envelope(bytes).ok_or(WalletError::CryptoFailed)?;
        if salt != self.salt {
            return Err(WalletError::CryptoFailed);
        }
        self.cipher()
            .decrypt(Nonce::from_slice(&iv), ciphertext)
            .map_err(|_| WalletError::CryptoFailed)
    }
}

/// Split a database envelope into `(salt, iv, ciphertext)`, or `None` if
/// the bytes are too short or carry an unknown version.
pub fn parse_envelope(
    bytes: &[u8],
) -> Option<([u8; SALT_LEN], [u8; IV_LEN], &[u8])> {
    if bytes.len() < 1 + SALT_LEN + IV_LEN || bytes[0] != ENVELOPE_VERSION {
        return None;
    }
    let salt = <[u8; SALT_LEN]>::try_from(&bytes[1..1 + SALT_LEN]).ok()?;
    let iv = <[u8; IV_LEN]>::try_from(
        &bytes[1 + SALT_LEN..1 + SALT_LEN + IV_LEN],
    )
    .ok()?;
    Some((salt, iv, &bytes[1 + SALT_LEN + IV_LEN..]))
}
