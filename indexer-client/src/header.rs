//! Block header hashing helpers.

use bitcoin_hashes::{sha256, Hash, HashEngine};

use crate::jsonrpc::RpcError;

/// Serialized length of a block header, in bytes.
pub const HEADER_LEN: usize = 80;

/// The canonical hash of a serialized block header:
/// `reverse(SHA-256(SHA-256(header_bytes)))`, rendered as hex.
pub fn header_hash_hex(header_hex: &str) -> Result<String, RpcError> {
    let bytes = hex::decode(header_hex)
        .map_err(|err| RpcError::Malformed(format!("header hex: {err}")))?;
    let mut engine = sha256::Hash::engine();
    engine.input(&bytes);
    let first = sha256::Hash::from_engine(engine);
    let mut double = sha256::Hash::hash(first.as_byte_array()).to_byte_array();
    double.reverse();
    Ok(hex::encode(double))
}

/// Split the concatenated hex of a `blockchain.block.headers` response into
/// one hex string per 80-byte header.
pub fn split_headers(concat_hex: &str) -> Result<Vec<String>, RpcError> {
    let chunk = 2 * HEADER_LEN;
    if concat_hex.len() % chunk != 0 || !concat_hex.is_ascii() {
        return Err(RpcError::Malformed(format!(
            "headers hex length {} is not a multiple of {chunk}",
            concat_hex.len()
        )));
    }
    Ok(concat_hex
        .as_bytes()
        .chunks(chunk)
        // ASCII checked above, so slicing at chunk boundaries is safe.
        .map(|piece| String::from_utf8(piece.to_vec()).expect("ascii"))
        .collect())
}
