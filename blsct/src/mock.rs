//! A deterministic, hash-based stand-in for the BLSCT library.
//!
//! [`MockBlsct`] implements [`BlsctPrimitives`] with tagged SHA-256 in
//! place of curve arithmetic: "public keys" are hashes of their secret
//! scalars, the sender/receiver shared secret is a hash of the output's
//! blinding key and the receiver's view scalar, and range proofs are a
//! stream cipher over `amount ‖ memo` keyed by the recovery nonce. The
//! algebraic relationships the wallet relies on (view-tag match, hash-id
//! unmasking, nonce agreement) all hold, so the full detection and
//! recovery pipeline can run end-to-end in tests without a pairing
//! library.
//!
//! Every primitive call bumps a counter in [`MockCounters`], letting tests
//! assert, e.g., that the view-tag fast path really skipped the hash-id
//! computation, or that the spending-key cache avoided a re-derivation.

use std::sync::atomic::{AtomicUsize, Ordering};

use bitcoin_hashes::{sha256, Hash, HashEngine};
use serde::Serialize;

use crate::primitives::{
    AmountRecoveryRequest, BlsctError, BlsctPrimitives, BuiltTransaction,
    RecoveredAmount, TransactionRequest,
};
use crate::types::{
    HashId, PublicKey, RangeProof, Scalar, SubAddress, SubAddressId, TokenId,
    ViewTag, PUBLIC_KEY_LEN, SCALAR_LEN,
};

/// Domain separator prefixed to every tagged hash.
const DOMAIN: &[u8] = b"blsct-mock";

/// Magic bytes prefixed to the range-proof plaintext; recovery succeeds
/// only if decryption reproduces them.
const PROOF_MAGIC: &[u8; 4] = b"AMNT";

/// Call counters for the mock primitives.
#[derive(Debug, Default)]
pub struct MockCounters {
    view_tag: AtomicUsize,
    hash_id: AtomicUsize,
    calc_priv_spending_key: AtomicUsize,
    recover_amounts: AtomicUsize,
    build_transaction: AtomicUsize,
}

impl MockCounters {
    pub fn view_tag_calls(&self) -> usize {
        self.view_tag.load(Ordering::SeqCst)
    }

    pub fn hash_id_calls(&self) -> usize {
        self.hash_id.load(Ordering::SeqCst)
    }

    pub fn calc_priv_spending_key_calls(&self) -> usize {
        self.calc_priv_spending_key.load(Ordering::SeqCst)
    }

    pub fn recover_amounts_calls(&self) -> usize {
        self.recover_amounts.load(Ordering::SeqCst)
    }

    pub fn build_transaction_calls(&self) -> usize {
        self.build_transaction.load(Ordering::SeqCst)
    }
}

/// The deterministic mock implementation of [`BlsctPrimitives`].
#[derive(Debug, Default)]
pub struct MockBlsct {
    counters: MockCounters,
}

/// Everything a fabricated on-chain output carries, in the same shape the
/// indexer would report it.
#[derive(Clone, Debug)]
pub struct MockOutputKeys {
    pub blinding_key: PublicKey,
    pub spending_key: PublicKey,
    pub view_tag: ViewTag,
    pub range_proof: RangeProof,
    pub token_id: TokenId,
    /// Opaque serialized output, as the transaction builder would consume.
    pub output_data: Vec<u8>,
}

impl MockBlsct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &MockCounters {
        &self.counters
    }

    /// Fabricate an output paying `amount` to the sub-address derived from
    /// `(view_key, spend_pk, id)`. `salt` varies the ephemeral blinding
    /// key, so distinct salts produce distinct outputs.
    #[allow(clippy::too_many_arguments)]
    pub fn make_output(
        &self,
        view_key: &Scalar,
        spend_pk: &PublicKey,
        id: SubAddressId,
        amount: u64,
        memo: &str,
        token_id: TokenId,
        salt: &[u8],
    ) -> MockOutputKeys {
        let blinding_key = PublicKey::new(tagged48("eph", &[salt]));
        let shared = shared_secret(&blinding_key, view_key);

        let sub_spend = sub_spending_key(view_key, spend_pk, id);
        let spending_key =
            PublicKey::new(xor48(&sub_spend, &tagged48("mask", &[&shared])));

        let nonce = PublicKey::new(tagged48("nonce", &[&shared]));
        let range_proof = seal_proof(amount, memo, &nonce, &token_id);

        let mut output_data =
            Vec::with_capacity(2 * PUBLIC_KEY_LEN + range_proof.0.len());
        output_data.extend_from_slice(blinding_key.as_bytes());
        output_data.extend_from_slice(spending_key.as_bytes());
        output_data.extend_from_slice(range_proof.as_bytes());

        MockOutputKeys {
            blinding_key,
            spending_key,
            view_tag: view_tag_of(&shared),
            range_proof,
            token_id,
            output_data,
        }
    }

    /// Fabricate an output that belongs to nobody in particular. Its view
    /// tag is uniform, so roughly 1 in 65536 of these will still pass a
    /// given wallet's fast path and must be rejected by hash-id lookup.
    pub fn make_unrelated_output(&self, salt: &[u8]) -> MockOutputKeys {
        let blinding_key = PublicKey::new(tagged48("eph", &[salt]));
        let spending_key = PublicKey::new(tagged48("junk-spend", &[salt]));
        let tag_bytes = tagged32("junk-tag", &[salt]);
        let range_proof =
            RangeProof(tagged32("junk-proof", &[salt]).to_vec());

        let mut output_data =
            Vec::with_capacity(2 * PUBLIC_KEY_LEN + range_proof.0.len());
        output_data.extend_from_slice(blinding_key.as_bytes());
        output_data.extend_from_slice(spending_key.as_bytes());
        output_data.extend_from_slice(range_proof.as_bytes());

        MockOutputKeys {
            blinding_key,
            spending_key,
            view_tag: ViewTag(u16::from_le_bytes([tag_bytes[0], tag_bytes[1]])),
            range_proof,
            token_id: TokenId::default(),
            output_data,
        }
    }
}

impl BlsctPrimitives for MockBlsct {
    fn derive_child_key(&self, seed: &Scalar) -> Scalar {
        Scalar::new(tagged32("child", &[seed.expose_bytes()]))
    }

    fn derive_key_at(&self, parent: &Scalar, index: u64) -> Scalar {
        Scalar::new(tagged32(
            "key-at",
            &[parent.expose_bytes(), &index.to_le_bytes()],
        ))
    }

    fn public_key(&self, secret: &Scalar) -> PublicKey {
        PublicKey::new(tagged48("pk", &[secret.expose_bytes()]))
    }

    fn derive_sub_address(
        &self,
        view_key: &Scalar,
        spend_pk: &PublicKey,
        id: SubAddressId,
    ) -> SubAddress {
        SubAddress {
            blinding_key: PublicKey::new(tagged48(
                "sub-blind",
                &[
                    view_key.expose_bytes(),
                    spend_pk.as_bytes(),
                    &id.account.to_le_bytes(),
                    &id.address.to_le_bytes(),
                ],
            )),
            spending_key: PublicKey::new(sub_spending_key(
                view_key, spend_pk, id,
            )),
        }
    }

    fn view_tag(
        &self,
        blinding_key: &PublicKey,
        view_key: &Scalar,
    ) -> ViewTag {
        self.counters.view_tag.fetch_add(1, Ordering::SeqCst);
        view_tag_of(&shared_secret(blinding_key, view_key))
    }

    fn hash_id(
        &self,
        blinding_key: &PublicKey,
        spending_key: &PublicKey,
        view_key: &Scalar,
    ) -> HashId {
        self.counters.hash_id.fetch_add(1, Ordering::SeqCst);
        let shared = shared_secret(blinding_key, view_key);
        let unmasked =
            xor48(spending_key.as_bytes(), &tagged48("mask", &[&shared]));
        HashId::hash160(&unmasked)
    }

    fn calc_nonce(
        &self,
        blinding_key: &PublicKey,
        view_key: &Scalar,
    ) -> PublicKey {
        let shared = shared_secret(blinding_key, view_key);
        PublicKey::new(tagged48("nonce", &[&shared]))
    }

    fn calc_priv_spending_key(
        &self,
        blinding_key: &PublicKey,
        view_key: &Scalar,
        spend_key: &Scalar,
        account: i64,
        address: u64,
    ) -> Scalar {
        self.counters
            .calc_priv_spending_key
            .fetch_add(1, Ordering::SeqCst);
        Scalar::new(tagged32(
            "priv-spend",
            &[
                blinding_key.as_bytes(),
                view_key.expose_bytes(),
                spend_key.expose_bytes(),
                &account.to_le_bytes(),
                &address.to_le_bytes(),
            ],
        ))
    }

    fn recover_amounts(
        &self,
        requests: &[AmountRecoveryRequest],
    ) -> Vec<RecoveredAmount> {
        self.counters.recover_amounts.fetch_add(1, Ordering::SeqCst);
        requests
            .iter()
            .filter_map(|req| {
                let (amount, memo) = open_proof(
                    &req.range_proof,
                    &req.nonce,
                    &req.token_id,
                )?;
                Some(RecoveredAmount {
                    index: req.index,
                    amount,
                    memo,
                })
            })
            .collect()
    }

    fn build_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<BuiltTransaction, BlsctError> {
        self.counters.build_transaction.fetch_add(1, Ordering::SeqCst);

        let in_sum: u64 =
            request.inputs.iter().map(|input| input.amount).sum();
        let out_sum: u64 =
            request.outputs.iter().map(|output| output.amount).sum();
        if in_sum < out_sum + request.fee {
            return Err(BlsctError::BuildFailed(format!(
                "inputs {in_sum} do not cover outputs {out_sum} + fee {}",
                request.fee
            )));
        }

        // A canonical, deterministic encoding standing in for the real
        // signed transaction bytes.
        #[derive(Serialize)]
        struct RawTx<'a> {
            inputs: Vec<&'a [u8]>,
            outputs: Vec<(Vec<u8>, u64, &'a str)>,
            change: Vec<u8>,
            fee: u64,
        }

        let raw = bcs::to_bytes(&RawTx {
            inputs: request
                .inputs
                .iter()
                .map(|input| input.output_data.as_slice())
                .collect(),
            outputs: request
                .outputs
                .iter()
                .map(|output| {
                    (
                        output.destination.to_bytes().to_vec(),
                        output.amount,
                        output.memo.as_str(),
                    )
                })
                .collect(),
            change: request.change_address.to_bytes().to_vec(),
            fee: request.fee,
        })
        .map_err(|err| BlsctError::BuildFailed(err.to_string()))?;

        let tx_id = hex::encode(sha256::Hash::hash(&raw).to_byte_array());

        Ok(BuiltTransaction {
            tx_id,
            raw,
            fee: request.fee,
            input_count: request.inputs.len(),
            // One change output is always appended.
            output_count: request.outputs.len() + 1,
        })
    }
}

// --- mock arithmetic helpers --- //

/// `SHA-256(DOMAIN ‖ tag ‖ len(part) ‖ part ...)`, length-prefixed so
/// adjacent parts cannot collide.
fn tagged32(tag: &str, parts: &[&[u8]]) -> [u8; SCALAR_LEN] {
    let mut engine = sha256::Hash::engine();
    engine.input(DOMAIN);
    engine.input(tag.as_bytes());
    for part in parts {
        engine.input(&(part.len() as u32).to_le_bytes());
        engine.input(part);
    }
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// A 48-byte tagged hash, for values standing in for G1 points.
fn tagged48(tag: &str, parts: &[&[u8]]) -> [u8; PUBLIC_KEY_LEN] {
    let lo = tagged32(tag, parts);
    let hi = tagged32("ext", &[&lo]);
    let mut out = [0u8; PUBLIC_KEY_LEN];
    out[..32].copy_from_slice(&lo);
    out[32..].copy_from_slice(&hi[..16]);
    out
}

/// The stand-in for the Diffie-Hellman secret `viewKey · blindingKey`.
fn shared_secret(blinding_key: &PublicKey, view_key: &Scalar) -> [u8; 32] {
    tagged32("dh", &[blinding_key.as_bytes(), view_key.expose_bytes()])
}

fn view_tag_of(shared: &[u8; 32]) -> ViewTag {
    ViewTag(u16::from_le_bytes([shared[0], shared[1]]))
}

/// The spending half of a sub-address; its HASH160 is the registry key.
fn sub_spending_key(
    view_key: &Scalar,
    spend_pk: &PublicKey,
    id: SubAddressId,
) -> [u8; PUBLIC_KEY_LEN] {
    tagged48(
        "sub-spend",
        &[
            view_key.expose_bytes(),
            spend_pk.as_bytes(),
            &id.account.to_le_bytes(),
            &id.address.to_le_bytes(),
        ],
    )
}

fn xor48(
    a: &[u8; PUBLIC_KEY_LEN],
    b: &[u8; PUBLIC_KEY_LEN],
) -> [u8; PUBLIC_KEY_LEN] {
    let mut out = [0u8; PUBLIC_KEY_LEN];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = a[i] ^ b[i];
    }
    out
}

/// XOR `data` in place with a SHA-256-based keystream.
fn apply_keystream(key: &[u8; 32], data: &mut [u8]) {
    for (block_idx, block) in data.chunks_mut(32).enumerate() {
        let pad = tagged32(
            "stream",
            &[key.as_slice(), &(block_idx as u32).to_le_bytes()],
        );
        for (byte, pad_byte) in block.iter_mut().zip(pad.iter()) {
            *byte ^= pad_byte;
        }
    }
}

fn proof_key(nonce: &PublicKey, token_id: &TokenId) -> [u8; 32] {
    tagged32("proof-key", &[nonce.as_bytes(), token_id.as_bytes()])
}

fn seal_proof(
    amount: u64,
    memo: &str,
    nonce: &PublicKey,
    token_id: &TokenId,
) -> RangeProof {
    let mut plaintext =
        Vec::with_capacity(PROOF_MAGIC.len() + 8 + memo.len());
    plaintext.extend_from_slice(PROOF_MAGIC);
    plaintext.extend_from_slice(&amount.to_le_bytes());
    plaintext.extend_from_slice(memo.as_bytes());
    apply_keystream(&proof_key(nonce, token_id), &mut plaintext);
    RangeProof(plaintext)
}

fn open_proof(
    proof: &RangeProof,
    nonce: &PublicKey,
    token_id: &TokenId,
) -> Option<(u64, String)> {
    if proof.0.len() < PROOF_MAGIC.len() + 8 {
        return None;
    }
    let mut data = proof.0.clone();
    apply_keystream(&proof_key(nonce, token_id), &mut data);
    if &data[..4] != PROOF_MAGIC {
        return None;
    }
    let amount = u64::from_le_bytes(data[4..12].try_into().unwrap());
    let memo = String::from_utf8(data[12..].to_vec()).ok()?;
    Some((amount, memo))
}
