//! The capability trait through which the wallet reaches the BLSCT
//! cryptography library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    HashId, PublicKey, RangeProof, Scalar, SubAddress, SubAddressId, TokenId,
    ViewTag,
};

#[derive(Clone, Debug, Error)]
pub enum BlsctError {
    #[error("amount recovery failed")]
    RecoveryFailed,
    #[error("transaction build failed: {0}")]
    BuildFailed(String),
}

/// One entry of a batched amount-recovery call: the output's range proof
/// plus the nonce the wallet derived from `(blindingKey, viewKey)`.
#[derive(Clone, Debug)]
pub struct AmountRecoveryRequest {
    pub range_proof: RangeProof,
    pub token_id: TokenId,
    pub nonce: PublicKey,
    /// Caller-side position, echoed back in [`RecoveredAmount::index`].
    pub index: usize,
}

/// A successfully recovered amount. Requests whose proof did not open with
/// the supplied nonce are simply absent from the result set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecoveredAmount {
    pub index: usize,
    pub amount: u64,
    pub memo: String,
}

/// An input to [`BlsctPrimitives::build_transaction`]: a previously
/// received output plus its recovered private spending key.
#[derive(Clone, Debug)]
pub struct TxInputSpec {
    /// The opaque on-chain serialization of the output being spent.
    pub output_data: Vec<u8>,
    pub amount: u64,
    pub token_id: TokenId,
    pub spending_key: Scalar,
}

/// A requested output of a new transaction.
#[derive(Clone, Debug)]
pub struct TxOutputSpec {
    pub destination: SubAddress,
    pub amount: u64,
    pub memo: String,
    pub token_id: TokenId,
}

/// Everything the BLSCT library needs to construct and sign a transaction.
#[derive(Clone, Debug)]
pub struct TransactionRequest {
    pub inputs: Vec<TxInputSpec>,
    pub outputs: Vec<TxOutputSpec>,
    pub change_address: SubAddress,
    pub fee: u64,
}

/// A constructed, signed transaction ready for broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuiltTransaction {
    /// Hex transaction id.
    pub tx_id: String,
    /// Raw transaction bytes.
    pub raw: Vec<u8>,
    pub fee: u64,
    pub input_count: usize,
    pub output_count: usize,
}

/// The BLSCT cryptography facade.
///
/// Everything here is a pure function of its inputs; implementations carry
/// no wallet state. The derivation paths mirror the HD tree:
///
/// ```text
/// seed ── child ──┬── key_at(0) = txKey ──┬── key_at(0) = viewKey
///                 ├── key_at(1) = blindingKey
///                 │                       └── key_at(1) = spendKey
///                 └── key_at(2) = tokenKey
/// ```
pub trait BlsctPrimitives: Send + Sync {
    /// Derive the child key scalar from the 32-byte master seed.
    fn derive_child_key(&self, seed: &Scalar) -> Scalar;

    /// Derive the key at `index` under `parent`.
    fn derive_key_at(&self, parent: &Scalar, index: u64) -> Scalar;

    /// The public key (curve point) for a secret scalar.
    fn public_key(&self, secret: &Scalar) -> PublicKey;

    /// The deterministic sub-address for `(viewKey, spendPubKey, id)`.
    fn derive_sub_address(
        &self,
        view_key: &Scalar,
        spend_pk: &PublicKey,
        id: SubAddressId,
    ) -> SubAddress;

    /// The cheap 16-bit ownership pre-filter.
    fn view_tag(&self, blinding_key: &PublicKey, view_key: &Scalar)
        -> ViewTag;

    /// The 20-byte ownership hash recomputed from an output's key pair;
    /// matches the registry entry of the receiving sub-address iff the
    /// output is ours.
    fn hash_id(
        &self,
        blinding_key: &PublicKey,
        spending_key: &PublicKey,
        view_key: &Scalar,
    ) -> HashId;

    /// The range-proof nonce bound to `(blindingKey, viewKey)`.
    fn calc_nonce(
        &self,
        blinding_key: &PublicKey,
        view_key: &Scalar,
    ) -> PublicKey;

    /// The private spending key for an output received on the sub-address
    /// `(account, address)`.
    fn calc_priv_spending_key(
        &self,
        blinding_key: &PublicKey,
        view_key: &Scalar,
        spend_key: &Scalar,
        account: i64,
        address: u64,
    ) -> Scalar;

    /// Attempt to open each request's range proof with its nonce. Requests
    /// that fail to open are omitted from the result.
    fn recover_amounts(
        &self,
        requests: &[AmountRecoveryRequest],
    ) -> Vec<RecoveredAmount>;

    /// Construct and sign a transaction.
    fn build_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<BuiltTransaction, BlsctError>;
}
