//! The chain-source abstraction the sync engine consumes.
//!
//! The engine depends only on this trait, not on any concrete transport;
//! [`indexer_client::IndexerClient`] implements it over Electrum-style
//! JSON-RPC, and tests drive the engine with an in-process synthetic
//! chain.

use async_trait::async_trait;
use indexer_client::{header_hash_hex, split_headers, IndexerClient, RpcError};

/// The server's current best block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainTip {
    pub height: u64,
    pub hash: String,
}

/// One transaction's key hints: the opaque payload the BLSCT recovery
/// primitives consume.
#[derive(Clone, Debug)]
pub struct TxKeyHint {
    pub tx_hash: String,
    pub keys: serde_json::Value,
}

/// One block's worth of transaction key hints.
#[derive(Clone, Debug)]
pub struct BlockTxKeys {
    pub height: u64,
    pub header_hash: String,
    pub txs: Vec<TxKeyHint>,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// The server's current chain tip.
    async fn chain_tip(&self) -> Result<ChainTip, RpcError>;

    /// The header hash at `height`.
    async fn header_hash(&self, height: u64) -> Result<String, RpcError>;

    /// Up to `max_blocks` blocks of key hints starting at `start`,
    /// contiguous and in height order.
    async fn transaction_keys_range(
        &self,
        start: u64,
        max_blocks: u64,
    ) -> Result<Vec<BlockTxKeys>, RpcError>;

    /// Whether `tx_hash` is still known to the server (mempool or chain).
    async fn transaction_exists(&self, tx_hash: &str)
        -> Result<bool, RpcError>;

    /// Broadcast a raw transaction; returns the txid.
    async fn broadcast(&self, raw_hex: &str) -> Result<String, RpcError>;
}

#[async_trait]
impl ChainSource for IndexerClient {
    async fn chain_tip(&self) -> Result<ChainTip, RpcError> {
        let sub = self.headers_subscribe().await?;
        Ok(ChainTip {
            height: sub.height,
            hash: header_hash_hex(&sub.hex)?,
        })
    }

    async fn header_hash(&self, height: u64) -> Result<String, RpcError> {
        let header = self.block_header(height).await?;
        header_hash_hex(&header)
    }

    async fn transaction_keys_range(
        &self,
        start: u64,
        max_blocks: u64,
    ) -> Result<Vec<BlockTxKeys>, RpcError> {
        let range =
            IndexerClient::transaction_keys_range(self, start, Some(max_blocks))
                .await?;
        if range.blocks.is_empty() {
            return Ok(Vec::new());
        }

        // The range response carries no header hashes; fetch the matching
        // header run and hash locally.
        let first = range.blocks[0].height;
        let count = range.blocks.len() as u64;
        let chunk = self.block_headers(first, count).await?;
        let headers = split_headers(&chunk.hex)?;
        if headers.len() != range.blocks.len() {
            return Err(RpcError::Malformed(format!(
                "asked for {count} headers at {first}, got {}",
                headers.len()
            )));
        }

        range
            .blocks
            .into_iter()
            .zip(headers)
            .map(|(block, header)| {
                Ok(BlockTxKeys {
                    height: block.height,
                    header_hash: header_hash_hex(&header)?,
                    txs: block
                        .txs
                        .into_iter()
                        .map(|tx| TxKeyHint {
                            tx_hash: tx.tx_hash,
                            keys: tx.keys,
                        })
                        .collect(),
                })
            })
            .collect()
    }

    async fn transaction_exists(
        &self,
        tx_hash: &str,
    ) -> Result<bool, RpcError> {
        match self.transaction_get(tx_hash, false).await {
            Ok(value) => Ok(!value.is_null()),
            // The server reports unknown transactions as an error object.
            Err(RpcError::Remote { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, RpcError> {
        IndexerClient::broadcast(self, raw_hex).await
    }
}
