//! The record kinds persisted by the wallet store.

use blsct::TokenId;
use serde::{Deserialize, Serialize};

use crate::envelope::{EnvelopeKey, ITEM_VERSION, SALT_LEN};

/// The canonical record of a UTXO we own, keyed by `output_hash`.
///
/// Invariants:
/// - `!is_spent` implies `spent_tx_hash` and `spent_block_height` are
///   `None`.
/// - `block_height == 0` is reserved for mempool/unconfirmed records.
/// - `amount` agrees with what recovery over `output_data` yields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WalletOutput {
    pub output_hash: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub block_height: u64,
    /// Recovered amount in satoshis.
    pub amount: u64,
    pub memo: Option<String>,
    /// `None` means the chain's default token.
    pub token_id: Option<TokenId>,
    /// Serialized public keys exactly as stored on chain, hex.
    pub blinding_key: String,
    pub spending_key: String,
    pub is_spent: bool,
    pub spent_tx_hash: Option<String>,
    /// `Some(0)` marks a spend still in the mempool.
    pub spent_block_height: Option<u64>,
    /// Opaque serialization of the on-chain output, consumed by the
    /// transaction builder.
    pub output_data: Vec<u8>,
}

/// The mutable-field-free input to [`WalletOutput::from_params`]; new
/// records always start unspent.
#[derive(Clone, Debug)]
pub struct OutputParams {
    pub output_hash: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub block_height: u64,
    pub amount: u64,
    pub memo: Option<String>,
    pub token_id: Option<TokenId>,
    pub blinding_key: String,
    pub spending_key: String,
    pub output_data: Vec<u8>,
}

impl WalletOutput {
    pub fn from_params(params: OutputParams) -> Self {
        Self {
            output_hash: params.output_hash,
            tx_hash: params.tx_hash,
            output_index: params.output_index,
            block_height: params.block_height,
            amount: params.amount,
            memo: params.memo,
            token_id: params.token_id,
            blinding_key: params.blinding_key,
            spending_key: params.spending_key,
            is_spent: false,
            spent_tx_hash: None,
            spent_block_height: None,
            output_data: params.output_data,
        }
    }

    /// Whether this output's token matches `filter`, treating `None` and
    /// the all-zeros token id as the same default token.
    pub fn matches_token(&self, filter: Option<&TokenId>) -> bool {
        let own = self.token_id.filter(|token| !token.is_default());
        let wanted = filter.filter(|token| !token.is_default());
        own.as_ref() == wanted
    }

    pub fn is_mempool(&self) -> bool {
        self.block_height == 0
    }
}

/// One transaction's key hints as returned by the indexer, kept so a
/// rescan after registry loss does not need the network.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxKeysRecord {
    pub tx_hash: String,
    pub block_height: u64,
    /// The opaque per-tx payload, stored as its JSON text.
    pub keys_data: String,
}

/// The sync cursor; a single record.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_synced_height: u64,
    pub last_synced_hash: String,
    pub total_tx_keys_synced: u64,
    /// Unix seconds.
    pub last_sync_time: u64,
    pub chain_tip_at_last_sync: u64,
}

/// Present exactly when a password has been set.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EncryptionMeta {
    pub salt: [u8; SALT_LEN],
    /// `SHA-256(Argon2id(password, salt))`.
    pub verification_hash: [u8; 32],
    pub version: u32,
}

impl EncryptionMeta {
    pub fn new(key: &EnvelopeKey) -> Self {
        Self {
            salt: *key.salt(),
            verification_hash: key.verification_hash(),
            version: ITEM_VERSION,
        }
    }
}
