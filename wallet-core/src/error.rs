//! The stable wallet error taxonomy.

use blsct::BlsctError;
use indexer_client::RpcError;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum WalletError {
    // --- keys --- //
    /// The operation needs a secret scalar but the wallet is locked.
    #[error("wallet is locked")]
    WalletLocked,
    #[error("invalid password")]
    InvalidPassword,
    /// BIP-39 checksum failure, or otherwise malformed recovery input.
    #[error("invalid mnemonic")]
    InvalidMnemonic,
    /// The output's hash id is not in the sub-address registry.
    #[error("unknown output: {0}")]
    UnknownOutput(String),
    /// The output resolved to a sub-address that doesn't re-derive to the
    /// same hash id; the registry and the chain root disagree.
    #[error("output ownership mismatch: {0}")]
    OwnershipMismatch(String),

    // --- store --- //
    #[error("wallet store corrupt: {0}")]
    StoreCorrupt(String),
    #[error("wallet store is busy")]
    StoreBusy,
    /// A reorg walked below the oldest stored block hash.
    #[error("reorg deeper than stored history")]
    ReorgDeeperThanHistory,

    // --- rpc --- //
    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),

    // --- crypto --- //
    /// AEAD tag failure or KDF failure.
    #[error("crypto operation failed")]
    CryptoFailed,

    // --- transaction builder --- //
    #[error("insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("fee too low: {0} sat")]
    FeeTooLow(u64),
    #[error("transaction builder failed: {0}")]
    BuilderFailed(String),
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),
}

impl From<BlsctError> for WalletError {
    fn from(err: BlsctError) -> Self {
        match err {
            BlsctError::RecoveryFailed => Self::CryptoFailed,
            BlsctError::BuildFailed(reason) => Self::BuilderFailed(reason),
        }
    }
}

impl WalletError {
    /// Whether the sync engine must halt rather than retry on this error.
    pub fn is_fatal_for_sync(&self) -> bool {
        matches!(
            self,
            Self::StoreCorrupt(_) | Self::ReorgDeeperThanHistory
        )
    }
}
