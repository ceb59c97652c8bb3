//! The HD chain root and the fixed derivation tree under the master seed.

use bitcoin_hashes::{sha256, Hash};
use blsct::{BlsctPrimitives, KeyId, PublicKey, Scalar};
use serde::{Deserialize, Serialize};

pub const HD_CHAIN_VERSION: u32 = 1;

/// The wallet's immutable chain root: 20-byte `HASH160(public-key-bytes)`
/// identifiers for each root key. Created once at wallet creation or
/// restore.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HdChain {
    pub version: u32,
    pub seed_id: KeyId,
    pub spend_id: KeyId,
    pub view_id: KeyId,
    pub token_id: KeyId,
    pub blinding_id: KeyId,
}

/// The full set of secrets derivable from the master seed:
///
/// ```text
/// seed ── child ──┬── (0) txKey ──┬── (0) viewKey
///                 ├── (1) blindingKey
///                 │               └── (1) spendKey
///                 └── (2) tokenKey
/// ```
pub(crate) struct DerivedKeys {
    pub seed: Scalar,
    pub blinding_key: Scalar,
    pub token_key: Scalar,
    pub view_key: Scalar,
    pub spend_key: Scalar,
    pub spend_pk: PublicKey,
}

pub(crate) fn derive_keys(
    primitives: &dyn BlsctPrimitives,
    seed: Scalar,
) -> DerivedKeys {
    let child = primitives.derive_child_key(&seed);
    let tx_key = primitives.derive_key_at(&child, 0);
    let blinding_key = primitives.derive_key_at(&child, 1);
    let token_key = primitives.derive_key_at(&child, 2);
    let view_key = primitives.derive_key_at(&tx_key, 0);
    let spend_key = primitives.derive_key_at(&tx_key, 1);
    let spend_pk = primitives.public_key(&spend_key);

    DerivedKeys {
        seed,
        blinding_key,
        token_key,
        view_key,
        spend_key,
        spend_pk,
    }
}

impl HdChain {
    pub(crate) fn from_keys(
        primitives: &dyn BlsctPrimitives,
        keys: &DerivedKeys,
    ) -> Self {
        let key_id = |secret: &Scalar| {
            KeyId::from_public_key(&primitives.public_key(secret))
        };
        Self {
            version: HD_CHAIN_VERSION,
            seed_id: key_id(&keys.seed),
            spend_id: KeyId::from_public_key(&keys.spend_pk),
            view_id: key_id(&keys.view_key),
            token_id: key_id(&keys.token_key),
            blinding_id: key_id(&keys.blinding_key),
        }
    }
}

/// Reduce a BIP-39 mnemonic to the 32-byte master seed scalar.
pub(crate) fn seed_from_mnemonic(mnemonic: &bip39::Mnemonic) -> Scalar {
    let seed64 = mnemonic.to_seed("");
    Scalar::new(sha256::Hash::hash(&seed64).to_byte_array())
}
