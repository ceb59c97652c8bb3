//! Parsing of the opaque per-transaction key hints the indexer returns.
//!
//! The `keys` payload of `blockchain.block.transaction_keys*` carries,
//! per transaction, the per-output material needed for ownership checks
//! and amount recovery, plus the hashes of outputs the transaction
//! consumes.

use std::str::FromStr;

use blsct::{PublicKey, RangeProof, TokenId, ViewTag};
use serde::{Deserialize, Serialize};

use crate::keys::OutputCandidate;

/// One output's scan material.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputHint {
    pub output_hash: String,
    pub output_index: u32,
    /// Serialized public keys as they appear on chain, hex.
    pub blinding_key: String,
    pub spending_key: String,
    pub view_tag: u16,
    pub range_proof: String,
    #[serde(default)]
    pub token_id: Option<String>,
    /// Opaque serialized output for the transaction builder, hex.
    pub output_data: String,
}

/// The decoded `keys` payload of one transaction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHints {
    #[serde(default)]
    pub outputs: Vec<OutputHint>,
    /// Output hashes this transaction consumes.
    #[serde(default)]
    pub spent: Vec<String>,
}

impl TxHints {
    pub fn parse(keys: &serde_json::Value) -> Result<Self, String> {
        serde_json::from_value(keys.clone()).map_err(|err| err.to_string())
    }
}

impl OutputHint {
    /// Decode the hex fields into a scan candidate.
    pub fn to_candidate(&self) -> Result<OutputCandidate, String> {
        let blinding_key = PublicKey::from_str(&self.blinding_key)
            .map_err(|err| format!("blinding key: {err}"))?;
        let spending_key = PublicKey::from_str(&self.spending_key)
            .map_err(|err| format!("spending key: {err}"))?;
        let range_proof = hex::decode(&self.range_proof)
            .map(RangeProof)
            .map_err(|err| format!("range proof: {err}"))?;
        let token_id = self.parse_token_id()?;
        Ok(OutputCandidate {
            blinding_key,
            spending_key,
            view_tag: ViewTag(self.view_tag),
            range_proof,
            token_id: token_id.unwrap_or_default(),
        })
    }

    pub fn parse_token_id(&self) -> Result<Option<TokenId>, String> {
        self.token_id
            .as_deref()
            .map(|token_hex| {
                TokenId::from_str(token_hex)
                    .map_err(|err| format!("token id: {err}"))
            })
            .transpose()
    }

    pub fn decode_output_data(&self) -> Result<Vec<u8>, String> {
        hex::decode(&self.output_data)
            .map_err(|err| format!("output data: {err}"))
    }
}
