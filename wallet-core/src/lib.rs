//! The core of a confidential-transaction light wallet.
//!
//! This crate turns remote chain data into a consistent, encrypted local
//! wallet state:
//!
//! - [`keys`]: hierarchical-deterministic derivation of the view, spend,
//!   token and blinding roots; sub-address generation; output ownership
//!   detection via view tags and hash ids; per-output private spending key
//!   derivation with a cache; amount recovery from range proofs.
//! - [`store`]: the on-disk record schema (outputs, transaction key hints,
//!   block hashes, sub-address registry, sync cursor) and its atomicity
//!   guarantees.
//! - [`sync`]: the background engine that advances the sync cursor toward
//!   the chain tip, detects reorgs and rolls them back, and commits one
//!   block at a time.
//! - [`envelope`]: password-gated Argon2id → AES-256-GCM encryption of
//!   secret material and of the persisted snapshot.
//! - [`builder`]: thin coin selection and delegation to the BLSCT library
//!   for transaction construction, plus broadcast bookkeeping.
//!
//! The BLSCT cryptography itself is reached through the
//! [`blsct::BlsctPrimitives`] facade, and the remote indexer through the
//! [`chain::ChainSource`] trait, implemented for
//! [`indexer_client::IndexerClient`].

pub mod backoff;
pub mod builder;
pub mod chain;
pub mod envelope;
pub mod error;
pub mod events;
pub mod keys;
pub mod logger;
pub mod rng;
pub mod shutdown;
pub mod store;
pub mod sync;

use std::time::{SystemTime, UNIX_EPOCH};

pub use builder::{SendParams, SendResult, TxBuilder};
pub use chain::{BlockTxKeys, ChainSource, ChainTip, TxKeyHint};
pub use error::WalletError;
pub use events::SyncEvent;
pub use keys::KeyManager;
pub use store::WalletStore;
pub use sync::{SyncConfig, SyncEngine};

/// Current unix time in seconds, for sync cursors and key metadata.
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
