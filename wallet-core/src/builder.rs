//! Thin transaction building: coin selection and broadcast bookkeeping.
//!
//! Construction and signing are entirely the BLSCT library's job; this
//! module picks inputs (largest first until the target plus fee is
//! covered), resolves their private spending keys through the cache, and
//! records the pending spend after broadcast: consumed inputs are flagged
//! as mempool-spent (`spentBlockHeight = 0`) and a mempool-height change
//! record is inserted, so the balance reflects the spend immediately.
//! The next sync pass replaces both with on-chain truth, or reverses them
//! if the transaction is rejected.

use std::sync::Arc;

use bitcoin_hashes::{sha256, Hash, HashEngine};
use blsct::{
    BlsctPrimitives, TokenId, TransactionRequest, TxInputSpec, TxOutputSpec,
};
use indexer_client::RpcError;
use tracing::info;

use crate::chain::ChainSource;
use crate::error::WalletError;
use crate::keys::{decode_sub_address, KeyManager, ACCOUNT_CHANGE};
use crate::store::records::{OutputParams, WalletOutput};
use crate::store::WalletStore;

/// Flat fee floor; an explicit fee below this is rejected.
pub const MIN_FEE_SATS: u64 = 1_000;
/// Base fee when none is supplied.
const BASE_FEE_SATS: u64 = 5_000;
/// Per-input fee increment when none is supplied.
const FEE_PER_INPUT_SATS: u64 = 1_000;

#[derive(Clone, Debug)]
pub struct SendParams {
    /// Bech32m sub-address string.
    pub destination: String,
    /// Satoshis to send.
    pub amount: u64,
    pub memo: Option<String>,
    /// `None` spends the default token.
    pub token_id: Option<TokenId>,
    /// Explicit fee override; computed from input count if `None`.
    pub fee: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct SendResult {
    pub tx_id: String,
    pub fee: u64,
    pub input_count: usize,
    pub output_count: usize,
    pub raw_hex: String,
}

pub struct TxBuilder {
    store: Arc<WalletStore>,
    keys: Arc<KeyManager>,
    primitives: Arc<dyn BlsctPrimitives>,
    chain: Arc<dyn ChainSource>,
}

impl TxBuilder {
    pub fn new(
        store: Arc<WalletStore>,
        keys: Arc<KeyManager>,
        primitives: Arc<dyn BlsctPrimitives>,
        chain: Arc<dyn ChainSource>,
    ) -> Self {
        Self {
            store,
            keys,
            primitives,
            chain,
        }
    }

    /// Build, sign (via the BLSCT library) and broadcast a payment.
    pub async fn send(
        &self,
        params: SendParams,
    ) -> Result<SendResult, WalletError> {
        let destination = decode_sub_address(&params.destination)?;
        if let Some(fee) = params.fee {
            if fee < MIN_FEE_SATS {
                return Err(WalletError::FeeTooLow(fee));
            }
        }

        // Confirmed unspent outputs of the right token, largest first.
        let candidates: Vec<WalletOutput> = self
            .store
            .get_unspent_outputs(params.token_id.as_ref())?
            .into_iter()
            .filter(|output| !output.is_mempool())
            .collect();
        let (selected, fee) =
            select_inputs(candidates, params.amount, params.fee)?;
        let input_sum: u64 =
            selected.iter().map(|output| output.amount).sum();

        let mut inputs = Vec::with_capacity(selected.len());
        for output in &selected {
            inputs.push(TxInputSpec {
                output_data: output.output_data.clone(),
                amount: output.amount,
                token_id: output.token_id.unwrap_or_default(),
                spending_key: self
                    .keys
                    .get_spending_key_for_output_with_cache(output)?,
            });
        }

        let (_change_id, change_address) =
            self.keys.new_sub_address(ACCOUNT_CHANGE);
        let token_id = params.token_id.unwrap_or_default();
        let request = TransactionRequest {
            inputs,
            outputs: vec![TxOutputSpec {
                destination,
                amount: params.amount,
                memo: params.memo.clone().unwrap_or_default(),
                token_id,
            }],
            change_address,
            fee,
        };
        let built = self.primitives.build_transaction(request)?;

        let raw_hex = hex::encode(&built.raw);
        let tx_id = match self.chain.broadcast(&raw_hex).await {
            Ok(tx_id) => tx_id,
            Err(RpcError::Remote { message, .. }) =>
                return Err(WalletError::BroadcastRejected(message)),
            Err(err) => return Err(err.into()),
        };

        // Post-broadcast bookkeeping: flag inputs as mempool-spent and
        // insert the pending change row. The recorded keys are the change
        // sub-address pair; the scan replaces them with the on-chain
        // values once the transaction confirms.
        let spent_pairs: Vec<(String, String)> = selected
            .iter()
            .map(|output| (output.output_hash.clone(), tx_id.clone()))
            .collect();
        let change_amount = input_sum - params.amount - fee;
        let pending_change = (change_amount > 0).then(|| OutputParams {
            output_hash: output_hash_for(&tx_id, 1),
            tx_hash: tx_id.clone(),
            output_index: 1,
            block_height: 0,
            amount: change_amount,
            memo: None,
            token_id: params.token_id,
            blinding_key: change_address.blinding_key.to_hex(),
            spending_key: change_address.spending_key.to_hex(),
            output_data: Vec::new(),
        });
        self.store
            .commit_pending_spend(&spent_pairs, pending_change)?;

        info!(
            %tx_id,
            fee,
            inputs = built.input_count,
            outputs = built.output_count,
            "broadcast transaction"
        );
        Ok(SendResult {
            tx_id,
            fee,
            input_count: built.input_count,
            output_count: built.output_count,
            raw_hex,
        })
    }
}

/// Largest-first selection until `amount` plus the (possibly
/// input-count-dependent) fee is covered. Returns the chosen outputs and
/// the final fee.
fn select_inputs(
    mut candidates: Vec<WalletOutput>,
    amount: u64,
    fee_override: Option<u64>,
) -> Result<(Vec<WalletOutput>, u64), WalletError> {
    candidates.sort_by(|a, b| b.amount.cmp(&a.amount));
    let available: u64 = candidates.iter().map(|o| o.amount).sum();

    let fee_for = |input_count: usize| {
        fee_override.unwrap_or(
            BASE_FEE_SATS + FEE_PER_INPUT_SATS * input_count as u64,
        )
    };

    let mut selected = Vec::new();
    let mut sum = 0u64;
    let mut iter = candidates.into_iter();
    loop {
        let fee = fee_for(selected.len());
        if sum >= amount.saturating_add(fee) {
            return Ok((selected, fee));
        }
        match iter.next() {
            Some(output) => {
                sum += output.amount;
                selected.push(output);
            }
            None => {
                return Err(WalletError::InsufficientFunds {
                    needed: amount.saturating_add(fee),
                    available,
                })
            }
        }
    }
}

/// The deterministic hash of a transaction's `index`-th output; used to
/// key the pending change record so the confirming block's scan upserts
/// the same row.
pub fn output_hash_for(tx_id: &str, output_index: u32) -> String {
    let mut engine = sha256::Hash::engine();
    engine.input(tx_id.as_bytes());
    engine.input(&output_index.to_le_bytes());
    hex::encode(sha256::Hash::from_engine(engine).to_byte_array())
}

#[cfg(test)]
mod test {
    use super::*;

    fn candidate(hash: &str, amount: u64) -> WalletOutput {
        WalletOutput::from_params(OutputParams {
            output_hash: hash.to_owned(),
            tx_hash: format!("tx-{hash}"),
            output_index: 0,
            block_height: 10,
            amount,
            memo: None,
            token_id: None,
            blinding_key: String::new(),
            spending_key: String::new(),
            output_data: Vec::new(),
        })
    }

    #[test]
    fn selects_largest_first() {
        let candidates = vec![
            candidate("small", 10_000),
            candidate("large", 500_000),
            candidate("medium", 100_000),
        ];
        let (selected, fee) =
            select_inputs(candidates, 400_000, None).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].output_hash, "large");
        assert_eq!(fee, BASE_FEE_SATS + FEE_PER_INPUT_SATS);
    }

    #[test]
    fn accumulates_until_amount_plus_fee() {
        let candidates = vec![
            candidate("a", 100_000),
            candidate("b", 100_000),
            candidate("c", 100_000),
        ];
        let (selected, fee) =
            select_inputs(candidates, 195_000, None).unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(fee, BASE_FEE_SATS + 3 * FEE_PER_INPUT_SATS);
    }

    #[test]
    fn insufficient_funds_reports_totals() {
        let err =
            select_inputs(vec![candidate("a", 50_000)], 100_000, None)
                .unwrap_err();
        match err {
            WalletError::InsufficientFunds { needed, available } => {
                assert_eq!(available, 50_000);
                assert!(needed > 100_000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_amount_still_needs_the_fee() {
        let (selected, fee) =
            select_inputs(vec![candidate("a", 50_000)], 0, None).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(fee, BASE_FEE_SATS + FEE_PER_INPUT_SATS);
    }

    #[test]
    fn output_hash_is_stable_and_index_sensitive() {
        let h0 = output_hash_for("deadbeef", 0);
        let h1 = output_hash_for("deadbeef", 1);
        assert_eq!(h0, output_hash_for("deadbeef", 0));
        assert_ne!(h0, h1);
        assert_eq!(h0.len(), 64);
    }
}
