//! Opaque BLSCT primitive types and the capability facade the wallet core
//! programs against.
//!
//! The wallet never does curve arithmetic itself; it sees scalars, points,
//! view tags, range-proof nonces and sub-addresses as opaque values with a
//! small set of operations, all reachable through the [`BlsctPrimitives`]
//! trait. Production deployments plug in bindings to a real BLSCT library;
//! tests inject the deterministic [`mock::MockBlsct`] implementation, which
//! also exposes call counters so tests can assert how often the expensive
//! primitives were actually invoked.

mod primitives;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use primitives::{
    AmountRecoveryRequest, BlsctError, BlsctPrimitives, BuiltTransaction,
    RecoveredAmount, TransactionRequest, TxInputSpec, TxOutputSpec,
};
pub use types::{
    HashId, KeyId, PublicKey, RangeProof, Scalar, SubAddress, SubAddressId,
    TokenId, ViewTag, PUBLIC_KEY_LEN, SCALAR_LEN,
};
