//! Key management: HD derivation, sub-addresses, ownership detection,
//! spending-key derivation, and the lock/unlock state machine.

mod address;
mod hd;
mod manager;
mod material;

pub use address::{decode_sub_address, encode_sub_address, ADDRESS_HRP};
pub use hd::{HdChain, HD_CHAIN_VERSION};
pub use manager::{KeyManager, OutputCandidate, RecoveredOutputs};
pub use material::{AddressPool, KeyMaterial, KeyMetadata};

/// The main receiving account.
pub const ACCOUNT_RECEIVE: i64 = 0;
/// The change account.
pub const ACCOUNT_CHANGE: i64 = -1;
/// The staking account.
pub const ACCOUNT_STAKING: i64 = -2;

/// How many pre-committed sub-address indices each account's pool keeps
/// ahead of use, so payments to not-yet-handed-out addresses are still
/// detected during scanning.
pub const POOL_LOOKAHEAD: u64 = 20;
