//! The key manager's persistent projection.
//!
//! Only serialized bytes live here; in-memory derivation state stays in
//! the key manager. When a password has been set, the secret entries move
//! from the plaintext maps to their `crypted_*` counterparts and the
//! plaintext maps are emptied.

use std::collections::{BTreeMap, BTreeSet};

use blsct::{HashId, PublicKey, Scalar, SubAddressId};
use serde::{Deserialize, Serialize};

use crate::envelope::SealedBlob;
use crate::keys::hd::HdChain;

/// Key name of the master seed in the `keys`/`crypted_keys` maps.
pub(crate) const MASTER_SEED_KEY: &str = "masterSeed";
/// Key name of the mnemonic in the `crypted_keys` map.
pub(crate) const MNEMONIC_KEY: &str = "mnemonic";

/// Per-account sub-address issuance state: the next never-registered index
/// plus the pool of pre-committed indices awaiting handoff.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
pub struct AddressPool {
    pub next_index: u64,
    pub pool: BTreeSet<u64>,
}

/// Bookkeeping for a root key: schema version and creation time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub version: u32,
    pub create_time: u64,
}

/// Everything the store persists on behalf of the key manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub hd_chain: HdChain,
    /// The view scalar stays available even when locked, so scanning and
    /// `is_mine` keep working.
    pub view_key: Scalar,
    pub spend_public_key: PublicKey,

    /// Plaintext root secrets by name; empty once a password is set.
    pub keys: BTreeMap<String, Scalar>,
    /// Plaintext mnemonic; `None` once a password is set (or if the
    /// wallet was restored from a raw seed).
    pub mnemonic: Option<String>,
    /// Envelope-sealed root secrets by name; empty until a password is
    /// set.
    pub crypted_keys: BTreeMap<String, SealedBlob>,

    /// Plaintext per-output spending-key cache, keyed by out-id hex.
    pub out_keys: BTreeMap<String, Scalar>,
    /// Sealed per-output spending-key cache.
    pub crypted_out_keys: BTreeMap<String, SealedBlob>,

    /// The sub-address registry: hash id → derivation identifier. A
    /// rebuildable cache of the chain root, not ground truth.
    pub sub_addresses: BTreeMap<HashId, SubAddressId>,
    /// Per-account issuance pools.
    pub pools: BTreeMap<i64, AddressPool>,

    /// Root-key bookkeeping, keyed by key-id hex.
    pub key_metadata: BTreeMap<String, KeyMetadata>,
}
