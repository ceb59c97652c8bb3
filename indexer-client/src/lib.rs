//! A minimal Electrum-style JSON-RPC 2.0 client for the wallet's remote
//! indexer.
//!
//! Framing is one JSON object per line, newline-terminated. Request ids
//! are monotonically increasing u32s; responses correlate by `id`, and
//! frames without an `id` but with a `method` field are server
//! notifications (e.g. new chain tips pushed after
//! `blockchain.headers.subscribe`).
//!
//! The client spawns a single reader task per connection which demuxes
//! response frames onto per-request oneshot channels and notification
//! frames onto an unbounded channel handed out at connect time. Writes go
//! directly through a mutex-guarded write half; there is no retry at this
//! layer, callers own reconnection policy.

mod client;
mod header;
mod jsonrpc;

pub use client::{IndexerClient, DEFAULT_RPC_TIMEOUT};
pub use header::{header_hash_hex, split_headers, HEADER_LEN};
pub use jsonrpc::{Notification, RpcError};

use serde::Deserialize;

/// Client name reported in the `server.version` handshake.
pub const CLIENT_NAME: &str = "ct-light-wallet";

/// Protocol version requested in the `server.version` handshake.
pub const PROTOCOL_VERSION: &str = "1.4";

/// Response to `blockchain.headers.subscribe`, and the payload of each
/// subsequent `blockchain.headers.subscribe` notification.
#[derive(Clone, Debug, Deserialize)]
pub struct HeaderNotification {
    pub height: u64,
    /// Raw 80-byte block header, hex encoded.
    pub hex: String,
}

/// Response to `blockchain.block.headers`.
#[derive(Clone, Debug, Deserialize)]
pub struct HeadersChunk {
    /// Number of headers actually returned.
    pub count: u64,
    /// Concatenated 80-byte headers, hex encoded.
    pub hex: String,
    /// Maximum number of headers the server returns per request.
    pub max: u64,
}

/// One transaction's key hints within a block.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxKeysEntry {
    pub tx_hash: String,
    /// Opaque per-transaction payload, forwarded verbatim to the BLSCT
    /// recovery primitives.
    pub keys: serde_json::Value,
}

/// One block of `blockchain.block.transaction_keys_range`.
#[derive(Clone, Debug, Deserialize)]
pub struct TxKeysBlock {
    pub height: u64,
    pub txs: Vec<TxKeysEntry>,
}

/// Response to `blockchain.block.transaction_keys_range`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxKeysRange {
    pub blocks: Vec<TxKeysBlock>,
    /// The height to resume from on the next request.
    pub next_height: u64,
}
