//! Byte-opaque newtypes for BLSCT values.
//!
//! All of these are carried around and persisted as plain bytes; only an
//! implementation of [`crate::BlsctPrimitives`] gives them meaning.

use std::fmt;
use std::str::FromStr;

use bitcoin_hashes::{hash160, Hash};
use rand_core::{CryptoRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

/// Byte length of a serialized secret scalar.
pub const SCALAR_LEN: usize = 32;

/// Byte length of a serialized (compressed G1) public key.
pub const PUBLIC_KEY_LEN: usize = 48;

/// A secret scalar: the master seed, a derived private key, or a per-output
/// private spending key. The inner bytes are zeroized on drop and never
/// appear in `Debug` output.
pub struct Scalar(Secret<[u8; SCALAR_LEN]>);

/// A serialized public key (curve point), e.g. an output's blinding or
/// spending key exactly as it appears on chain.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

/// A sub-address: the (blinding, spending) double public key pair a sender
/// encodes outputs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubAddress {
    pub blinding_key: PublicKey,
    pub spending_key: PublicKey,
}

/// Identifies one derivable sub-address within the wallet's HD tree.
///
/// Account 0 is the main receiving account, −1 is change, −2 is staking.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
)]
pub struct SubAddressId {
    pub account: i64,
    pub address: u64,
}

/// The 16-bit view tag embedded in every output. A mismatch against the tag
/// recomputed from `(blindingKey, viewKey)` proves the output is not ours.
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize,
)]
pub struct ViewTag(pub u16);

/// `HASH160` over a derived spending-key point; the primary key into the
/// sub-address registry.
#[derive(
    Clone,
    Copy,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
)]
pub struct HashId([u8; 20]);

/// `HASH160` over serialized public-key bytes; identifies the wallet's root
/// keys in the HD chain record.
#[derive(
    Clone, Copy, Eq, Hash, PartialEq, Serialize, Deserialize,
)]
pub struct KeyId([u8; 20]);

/// A 32-byte token identifier. The all-zeros id is the chain's default
/// token.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
)]
pub struct TokenId([u8; 32]);

/// An opaque serialized range proof, exactly as returned by the indexer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeProof(pub Vec<u8>);

// --- impl Scalar --- //

impl Scalar {
    pub fn new(bytes: [u8; SCALAR_LEN]) -> Self {
        Self(Secret::new(bytes))
    }

    pub fn from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SCALAR_LEN];
        rng.fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    pub fn expose_bytes(&self) -> &[u8; SCALAR_LEN] {
        self.0.expose_secret()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.expose_bytes())
    }
}

impl Clone for Scalar {
    fn clone(&self) -> Self {
        Self::new(*self.expose_bytes())
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.expose_bytes().ct_eq(other.expose_bytes()).into()
    }
}

impl Eq for Scalar {}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Avoid formatting secrets.
        f.write_str("Scalar(..)")
    }
}

impl FromStr for Scalar {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; SCALAR_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self::new(bytes))
    }
}

struct ScalarVisitor;

impl<'de> de::Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("hex-encoded scalar or raw bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Scalar::from_str(v).map_err(de::Error::custom)
    }

    fn visit_bytes<E: de::Error>(self, b: &[u8]) -> Result<Self::Value, E> {
        let bytes = <[u8; SCALAR_LEN]>::try_from(b)
            .map_err(|_| de::Error::invalid_length(b.len(), &self))?;
        Ok(Scalar::new(bytes))
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            d.deserialize_str(ScalarVisitor)
        } else {
            d.deserialize_bytes(ScalarVisitor)
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_hex())
        } else {
            s.serialize_bytes(self.expose_bytes())
        }
    }
}

// --- impl PublicKey --- //

impl PublicKey {
    pub const fn new(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PublicKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

struct PublicKeyVisitor;

impl<'de> de::Visitor<'de> for PublicKeyVisitor {
    type Value = PublicKey;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("hex-encoded public key or raw bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        PublicKey::from_str(v).map_err(de::Error::custom)
    }

    fn visit_bytes<E: de::Error>(self, b: &[u8]) -> Result<Self::Value, E> {
        let bytes = <[u8; PUBLIC_KEY_LEN]>::try_from(b)
            .map_err(|_| de::Error::invalid_length(b.len(), &self))?;
        Ok(PublicKey(bytes))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            d.deserialize_str(PublicKeyVisitor)
        } else {
            d.deserialize_bytes(PublicKeyVisitor)
        }
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_hex())
        } else {
            s.serialize_bytes(&self.0)
        }
    }
}

// --- impl SubAddress --- //

impl SubAddress {
    /// Serialize to the 96-byte wire form: blinding key then spending key.
    pub fn to_bytes(&self) -> [u8; 2 * PUBLIC_KEY_LEN] {
        let mut out = [0u8; 2 * PUBLIC_KEY_LEN];
        out[..PUBLIC_KEY_LEN].copy_from_slice(self.blinding_key.as_bytes());
        out[PUBLIC_KEY_LEN..].copy_from_slice(self.spending_key.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 2 * PUBLIC_KEY_LEN {
            return None;
        }
        let mut blinding = [0u8; PUBLIC_KEY_LEN];
        let mut spending = [0u8; PUBLIC_KEY_LEN];
        blinding.copy_from_slice(&bytes[..PUBLIC_KEY_LEN]);
        spending.copy_from_slice(&bytes[PUBLIC_KEY_LEN..]);
        Some(Self {
            blinding_key: PublicKey::new(blinding),
            spending_key: PublicKey::new(spending),
        })
    }
}

// --- impl SubAddressId --- //

impl SubAddressId {
    pub const fn new(account: i64, address: u64) -> Self {
        Self { account, address }
    }
}

impl fmt::Display for SubAddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.address)
    }
}

// --- impl HashId --- //

impl HashId {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// `HASH160` (SHA-256 then RIPEMD-160) over arbitrary bytes.
    pub fn hash160(data: &[u8]) -> Self {
        Self(hash160::Hash::hash(data).to_byte_array())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for HashId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashId({self})")
    }
}

// --- impl KeyId --- //

impl KeyId {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// The 20-byte identifier of a root key: `HASH160(public-key-bytes)`.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self(hash160::Hash::hash(pk.as_bytes()).to_byte_array())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.0))
    }
}

// --- impl TokenId --- //

impl TokenId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the chain's default token (the all-zeros id).
    pub fn is_default(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for TokenId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

// --- impl RangeProof --- //

impl RangeProof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
