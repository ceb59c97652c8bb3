//! End-to-end scenarios driving the full stack (key manager, store,
//! sync engine, transaction builder) against the deterministic BLSCT
//! mock and an in-process synthetic chain.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin_hashes::{sha256, Hash};
use blsct::mock::{MockBlsct, MockOutputKeys};
use blsct::{BlsctPrimitives, PublicKey, Scalar, SubAddressId, TokenId};
use indexer_client::RpcError;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::timeout;
use wallet_core::builder::output_hash_for;
use wallet_core::chain::{BlockTxKeys, ChainSource, ChainTip, TxKeyHint};
use wallet_core::keys::{KeyManager, ACCOUNT_RECEIVE};
use wallet_core::rng::OsRng;
use wallet_core::shutdown::ShutdownSignal;
use wallet_core::sync::SyncStats;
use wallet_core::{
    SendParams, SyncConfig, SyncEngine, SyncEvent, TxBuilder, WalletError,
    WalletStore,
};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon \
     abandon abandon abandon about";

// --- synthetic chain --- //

#[derive(Clone)]
struct FakeBlock {
    header_hash: String,
    txs: Vec<TxKeyHint>,
}

#[derive(Default)]
struct ChainState {
    /// Height h lives at index h - 1.
    blocks: Vec<FakeBlock>,
    mempool: HashSet<String>,
    fork_tag: u32,
}

#[derive(Default)]
struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push_block(&self, txs: Vec<TxKeyHint>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let height = state.blocks.len() as u64 + 1;
        let header_hash = format!("hash-{height}-fork{}", state.fork_tag);
        state.blocks.push(FakeBlock { header_hash, txs });
        height
    }

    fn push_empty_blocks(&self, count: u64) {
        for _ in 0..count {
            self.push_block(Vec::new());
        }
    }

    /// Abandon every block at `height` and above; subsequently pushed
    /// blocks get different header hashes.
    fn fork_at(&self, height: u64) {
        let mut state = self.state.lock().unwrap();
        state.blocks.truncate(height.saturating_sub(1) as usize);
        state.fork_tag += 1;
    }

    /// Drop a transaction from the mempool without confirming it.
    fn forget_tx(&self, tx_id: &str) {
        self.state.lock().unwrap().mempool.remove(tx_id);
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn chain_tip(&self) -> Result<ChainTip, RpcError> {
        let state = self.state.lock().unwrap();
        Ok(match state.blocks.last() {
            Some(block) => ChainTip {
                height: state.blocks.len() as u64,
                hash: block.header_hash.clone(),
            },
            None => ChainTip {
                height: 0,
                hash: "genesis".to_owned(),
            },
        })
    }

    async fn header_hash(&self, height: u64) -> Result<String, RpcError> {
        let state = self.state.lock().unwrap();
        height
            .checked_sub(1)
            .and_then(|index| state.blocks.get(index as usize))
            .map(|block| block.header_hash.clone())
            .ok_or(RpcError::Remote {
                code: 1,
                message: format!("no header at height {height}"),
            })
    }

    async fn transaction_keys_range(
        &self,
        start: u64,
        max_blocks: u64,
    ) -> Result<Vec<BlockTxKeys>, RpcError> {
        let state = self.state.lock().unwrap();
        let tip = state.blocks.len() as u64;
        let mut out = Vec::new();
        let mut height = start;
        while height <= tip && (height - start) < max_blocks {
            let block = &state.blocks[(height - 1) as usize];
            out.push(BlockTxKeys {
                height,
                header_hash: block.header_hash.clone(),
                txs: block.txs.clone(),
            });
            height += 1;
        }
        Ok(out)
    }

    async fn transaction_exists(
        &self,
        tx_hash: &str,
    ) -> Result<bool, RpcError> {
        let state = self.state.lock().unwrap();
        Ok(state.mempool.contains(tx_hash)
            || state.blocks.iter().any(|block| {
                block.txs.iter().any(|tx| tx.tx_hash == tx_hash)
            }))
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, RpcError> {
        let raw = hex::decode(raw_hex)
            .map_err(|err| RpcError::Malformed(err.to_string()))?;
        let tx_id =
            hex::encode(sha256::Hash::hash(&raw).to_byte_array());
        self.state.lock().unwrap().mempool.insert(tx_id.clone());
        Ok(tx_id)
    }
}

// --- fixtures --- //

struct TestWallet {
    _dir: TempDir,
    primitives: Arc<MockBlsct>,
    keys: Arc<KeyManager>,
    store: Arc<WalletStore>,
    chain: Arc<FakeChain>,
    shutdown: ShutdownSignal,
}

fn new_wallet(chain: Arc<FakeChain>) -> TestWallet {
    let dir = TempDir::new().unwrap();
    let primitives = Arc::new(MockBlsct::new());
    let keys = Arc::new(
        KeyManager::restore_from_mnemonic(
            primitives.clone(),
            TEST_MNEMONIC,
        )
        .unwrap(),
    );
    let store = Arc::new(
        WalletStore::create(&dir.path().join("wallet.db")).unwrap(),
    );
    TestWallet {
        _dir: dir,
        primitives,
        keys,
        store,
        chain,
        shutdown: ShutdownSignal::new(),
    }
}

/// One full sync pass, discarding the event stream.
async fn sync(wallet: &TestWallet) -> Result<SyncStats, WalletError> {
    let (engine, _events) = SyncEngine::new(
        wallet.store.clone(),
        wallet.keys.clone(),
        wallet.chain.clone(),
        SyncConfig::default(),
        wallet.shutdown.clone(),
    );
    engine.sync_once().await
}

/// Re-derive the scan keys (view scalar, spend public key) straight from
/// the mnemonic, following the documented derivation tree. Lets tests
/// fabricate outputs addressed to the wallet.
fn scan_keys(primitives: &MockBlsct) -> (Scalar, PublicKey) {
    let mnemonic = bip39::Mnemonic::from_str(TEST_MNEMONIC).unwrap();
    let seed = Scalar::new(
        sha256::Hash::hash(&mnemonic.to_seed("")).to_byte_array(),
    );
    let child = primitives.derive_child_key(&seed);
    let tx_key = primitives.derive_key_at(&child, 0);
    let view_key = primitives.derive_key_at(&tx_key, 0);
    let spend_key = primitives.derive_key_at(&tx_key, 1);
    (view_key, primitives.public_key(&spend_key))
}

fn output_entry(
    keys: &MockOutputKeys,
    output_hash: &str,
    index: u32,
) -> serde_json::Value {
    json!({
        "outputHash": output_hash,
        "outputIndex": index,
        "blindingKey": keys.blinding_key.to_hex(),
        "spendingKey": keys.spending_key.to_hex(),
        "viewTag": keys.view_tag.0,
        "rangeProof": hex::encode(keys.range_proof.as_bytes()),
        "outputData": hex::encode(&keys.output_data),
    })
}

fn tx_hint(
    tx_hash: &str,
    outputs: Vec<serde_json::Value>,
    spent: Vec<&str>,
) -> TxKeyHint {
    TxKeyHint {
        tx_hash: tx_hash.to_owned(),
        keys: json!({ "outputs": outputs, "spent": spent }),
    }
}

/// The S1 chain: 99 empty blocks, then a block at height 100 paying
/// 1_000_000 sat to sub-address (0, 0) alongside a foreign output.
fn seed_s1_chain(wallet: &TestWallet) {
    let (view_key, spend_pk) = scan_keys(&wallet.primitives);
    wallet.chain.push_empty_blocks(99);
    let owned = wallet.primitives.make_output(
        &view_key,
        &spend_pk,
        SubAddressId::new(0, 0),
        1_000_000,
        "",
        TokenId::default(),
        b"s1-owned",
    );
    let foreign = wallet.primitives.make_unrelated_output(b"s1-foreign");
    let height = wallet.chain.push_block(vec![tx_hint(
        "tx-100",
        vec![
            output_entry(&owned, "out-100", 0),
            output_entry(&foreign, "out-foreign", 1),
        ],
        vec![],
    )]);
    assert_eq!(height, 100);
}

// --- scenarios --- //

#[tokio::test]
async fn s1_create_receive_sync() {
    let chain = FakeChain::new();
    let wallet = new_wallet(chain);
    seed_s1_chain(&wallet);

    let stats = sync(&wallet).await.unwrap();
    assert_eq!(stats.tip_height, 100);
    assert_eq!(stats.blocks_synced, 100);
    assert_eq!(stats.outputs_found, 1);

    assert_eq!(wallet.store.get_balance(None).unwrap(), 1_000_000);
    let unspent = wallet.store.get_unspent_outputs(None).unwrap();
    assert_eq!(unspent.len(), 1);
    assert_eq!(unspent[0].block_height, 100);
    assert_eq!(unspent[0].amount, 1_000_000);
    assert_eq!(unspent[0].output_hash, "out-100");

    let cursor = wallet.store.load_sync_state().unwrap().unwrap();
    assert_eq!(cursor.last_synced_height, 100);
    assert_eq!(cursor.chain_tip_at_last_sync, 100);

    // Restoring the same mnemonic reproduces the identical first
    // sub-address, byte for byte.
    let restored = KeyManager::restore_from_mnemonic(
        wallet.primitives.clone(),
        TEST_MNEMONIC,
    )
    .unwrap();
    let id = SubAddressId::new(ACCOUNT_RECEIVE, 0);
    assert_eq!(
        wallet.keys.get_sub_address(id).to_bytes(),
        restored.get_sub_address(id).to_bytes(),
    );
    assert_eq!(
        wallet.keys.get_address_string(id),
        restored.get_address_string(id),
    );
}

#[tokio::test]
async fn s2_reorg_undoes_a_spend() {
    let chain = FakeChain::new();
    let wallet = new_wallet(chain.clone());
    seed_s1_chain(&wallet);
    sync(&wallet).await.unwrap();

    // Height 101 spends our only output.
    chain.push_block(vec![tx_hint("tx-101", vec![], vec!["out-100"])]);
    sync(&wallet).await.unwrap();
    assert_eq!(wallet.store.get_balance(None).unwrap(), 0);
    let outputs = wallet.store.get_all_outputs().unwrap();
    assert!(outputs[0].is_spent);
    assert_eq!(outputs[0].spent_block_height, Some(101));

    // The server reorganizes: the spend never happened.
    chain.fork_at(101);
    chain.push_empty_blocks(2);
    sync(&wallet).await.unwrap();

    assert_eq!(wallet.store.get_balance(None).unwrap(), 1_000_000);
    let outputs = wallet.store.get_all_outputs().unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(!outputs[0].is_spent);
    assert_eq!(outputs[0].spent_tx_hash, None);
    assert_eq!(outputs[0].spent_block_height, None);
}

#[tokio::test]
async fn s3_encrypt_then_unlock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");
    let primitives = Arc::new(MockBlsct::new());

    {
        let keys = KeyManager::restore_from_mnemonic(
            primitives.clone(),
            TEST_MNEMONIC,
        )
        .unwrap();
        let store = WalletStore::create(&path).unwrap();
        let (meta, store_key) =
            keys.set_password(&mut OsRng, "hunter2").unwrap();
        store.save_encryption_metadata(meta, store_key).unwrap();
        store.save_key_material(&keys.to_material()).unwrap();
        store.close().unwrap();
    }

    // A fresh process opens a sealed snapshot.
    let store = WalletStore::open(&path).unwrap();
    assert!(store.is_encrypted());
    assert!(!store.unlock("wrong").unwrap());
    assert!(store.unlock("hunter2").unwrap());

    let material = store.load_key_material().unwrap().unwrap();
    let meta = store.get_encryption_metadata().unwrap();
    let keys =
        KeyManager::from_material(primitives, material, meta);
    assert!(keys.is_locked());
    assert!(keys.is_encrypted());

    assert!(!keys.unlock("wrong").unwrap());
    assert!(keys.is_locked());
    assert!(keys.unlock("hunter2").unwrap());
    assert_eq!(
        keys.get_mnemonic().unwrap().as_deref(),
        Some(TEST_MNEMONIC),
    );
}

#[test]
fn s4_view_tag_filter_saves_work() {
    const TOTAL: u32 = 100_000;
    let owned_positions: HashSet<u32> =
        [5, 999, 12_345, 33_000, 50_000, 77_777, 99_998]
            .into_iter()
            .collect();

    let primitives = Arc::new(MockBlsct::new());
    let keys = KeyManager::restore_from_mnemonic(
        primitives.clone(),
        TEST_MNEMONIC,
    )
    .unwrap();
    let (view_key, spend_pk) = scan_keys(&primitives);

    // A second mock instance serves as a counter-free oracle for
    // predicting 16-bit tag collisions among the foreign outputs.
    let oracle = MockBlsct::new();

    let mut candidates = Vec::with_capacity(TOTAL as usize);
    let mut expected_collisions = 0usize;
    for i in 0..TOTAL {
        if owned_positions.contains(&i) {
            let out = primitives.make_output(
                &view_key,
                &spend_pk,
                SubAddressId::new(0, (i % 3) as u64),
                10,
                "",
                TokenId::default(),
                &i.to_le_bytes(),
            );
            candidates.push((out, true));
        } else {
            let out =
                primitives.make_unrelated_output(&i.to_le_bytes());
            if oracle.view_tag(&out.blinding_key, &view_key)
                == out.view_tag
            {
                expected_collisions += 1;
            }
            candidates.push((out, false));
        }
    }

    let lookups_before = primitives.counters().hash_id_calls();
    let mut detected = 0usize;
    for (out, owned) in &candidates {
        let mine = keys.is_mine(
            &out.blinding_key,
            &out.spending_key,
            out.view_tag,
        );
        assert_eq!(mine, *owned);
        if mine {
            detected += 1;
        }
    }
    assert_eq!(detected, owned_positions.len());

    // Exactly one hash-id lookup per owned output, plus one per rare
    // 16-bit collision that the registry lookup then rejects.
    let lookups =
        primitives.counters().hash_id_calls() - lookups_before;
    assert_eq!(lookups, owned_positions.len() + expected_collisions);
    // With 100k uniform tags a handful of collisions is expected;
    // anything more means the fast path is broken.
    assert!(expected_collisions < 32, "{expected_collisions} collisions");
}

#[tokio::test]
async fn s5_mempool_spend_shows_as_unconfirmed() {
    let chain = FakeChain::new();
    let wallet = new_wallet(chain.clone());
    seed_s1_chain(&wallet);
    sync(&wallet).await.unwrap();

    let builder = TxBuilder::new(
        wallet.store.clone(),
        wallet.keys.clone(),
        wallet.primitives.clone(),
        wallet.chain.clone(),
    );
    let destination = wallet
        .keys
        .get_address_string(SubAddressId::new(ACCOUNT_RECEIVE, 5));
    let result = builder
        .send(SendParams {
            destination,
            amount: 100_000,
            memo: None,
            token_id: None,
            fee: None,
        })
        .await
        .unwrap();

    // Balance drops by amount + fee immediately.
    let fee = result.fee;
    assert_eq!(
        wallet.store.get_balance(None).unwrap(),
        1_000_000 - 100_000 - fee,
    );
    let pending = wallet.store.get_pending_outputs().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].block_height, 0);
    assert_eq!(pending[0].amount, 1_000_000 - 100_000 - fee);

    // The transaction confirms at height 101; the pending row is
    // replaced by on-chain records.
    let (view_key, spend_pk) = scan_keys(&wallet.primitives);
    let dest_out = wallet.primitives.make_output(
        &view_key,
        &spend_pk,
        SubAddressId::new(0, 5),
        100_000,
        "",
        TokenId::default(),
        b"s5-dest",
    );
    let change_out = wallet.primitives.make_output(
        &view_key,
        &spend_pk,
        SubAddressId::new(-1, 0),
        1_000_000 - 100_000 - fee,
        "",
        TokenId::default(),
        b"s5-change",
    );
    chain.push_block(vec![tx_hint(
        &result.tx_id,
        vec![
            output_entry(&dest_out, &output_hash_for(&result.tx_id, 0), 0),
            output_entry(
                &change_out,
                &output_hash_for(&result.tx_id, 1),
                1,
            ),
        ],
        vec!["out-100"],
    )]);
    sync(&wallet).await.unwrap();

    assert!(wallet.store.get_pending_outputs().unwrap().is_empty());
    assert_eq!(
        wallet.store.get_balance(None).unwrap(),
        1_000_000 - fee,
    );
    let spent: Vec<_> = wallet
        .store
        .get_all_outputs()
        .unwrap()
        .into_iter()
        .filter(|output| output.is_spent)
        .collect();
    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].output_hash, "out-100");
    assert_eq!(spent[0].spent_block_height, Some(101));
}

#[tokio::test]
async fn s5_rejected_spend_is_reversed() {
    let chain = FakeChain::new();
    let wallet = new_wallet(chain.clone());
    seed_s1_chain(&wallet);
    sync(&wallet).await.unwrap();

    let builder = TxBuilder::new(
        wallet.store.clone(),
        wallet.keys.clone(),
        wallet.primitives.clone(),
        wallet.chain.clone(),
    );
    let destination = wallet
        .keys
        .get_address_string(SubAddressId::new(ACCOUNT_RECEIVE, 6));
    let result = builder
        .send(SendParams {
            destination,
            amount: 100_000,
            memo: None,
            token_id: None,
            fee: None,
        })
        .await
        .unwrap();
    assert!(
        wallet.store.get_balance(None).unwrap() < 1_000_000 - 100_000
    );

    // The network drops the transaction instead of mining it.
    chain.forget_tx(&result.tx_id);
    sync(&wallet).await.unwrap();

    assert!(wallet.store.get_pending_outputs().unwrap().is_empty());
    assert_eq!(wallet.store.get_balance(None).unwrap(), 1_000_000);
    let outputs = wallet.store.get_all_outputs().unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(!outputs[0].is_spent);
}

// --- reorg equivalence --- //

/// Sync a wallet, fork the chain `k` blocks below the tip, re-sync, and
/// require the result to equal a fresh sync from genesis.
async fn reorg_matches_fresh_sync(k: u64) {
    const TIP: u64 = 60;
    let chain = FakeChain::new();
    let wallet = new_wallet(chain.clone());
    let (view_key, spend_pk) = scan_keys(&wallet.primitives);

    let owned_block = |salt: &str, height: u64| {
        let out = wallet.primitives.make_output(
            &view_key,
            &spend_pk,
            SubAddressId::new(0, height % 3),
            height * 1_000,
            "",
            TokenId::default(),
            salt.as_bytes(),
        );
        vec![tx_hint(
            &format!("tx-{salt}"),
            vec![output_entry(&out, &format!("out-{salt}"), 0)],
            vec![],
        )]
    };

    for height in 1..=TIP {
        if height % 7 == 0 {
            chain.push_block(owned_block(&format!("pre-{height}"), height));
        } else {
            chain.push_empty_blocks(1);
        }
    }
    sync(&wallet).await.unwrap();

    // Fork: the top k blocks are replaced with a different history.
    let fork_base = TIP - k;
    chain.fork_at(fork_base + 1);
    for offset in 1..=(k + 2) {
        let height = fork_base + offset;
        if height % 5 == 0 {
            chain
                .push_block(owned_block(&format!("post-{height}"), height));
        } else {
            chain.push_empty_blocks(1);
        }
    }
    sync(&wallet).await.unwrap();

    // A fresh wallet syncing the forked chain from genesis must agree.
    let fresh = new_wallet(chain.clone());
    sync(&fresh).await.unwrap();

    assert_eq!(
        wallet.store.get_balance(None).unwrap(),
        fresh.store.get_balance(None).unwrap(),
    );
    let ours = wallet.store.get_all_outputs().unwrap();
    let theirs = fresh.store.get_all_outputs().unwrap();
    assert_eq!(ours, theirs);
    assert_eq!(
        wallet
            .store
            .load_sync_state()
            .unwrap()
            .unwrap()
            .last_synced_height,
        fresh
            .store
            .load_sync_state()
            .unwrap()
            .unwrap()
            .last_synced_height,
    );
}

#[tokio::test]
async fn reorg_depth_1_matches_fresh_sync() {
    reorg_matches_fresh_sync(1).await;
}

#[tokio::test]
async fn reorg_depth_5_matches_fresh_sync() {
    reorg_matches_fresh_sync(5).await;
}

#[tokio::test]
async fn reorg_depth_50_matches_fresh_sync() {
    reorg_matches_fresh_sync(50).await;
}

// --- engine lifecycle --- //

#[tokio::test]
async fn engine_emits_progress_and_honors_stop() {
    let chain = FakeChain::new();
    let wallet = new_wallet(chain.clone());
    seed_s1_chain(&wallet);

    let config = SyncConfig {
        poll_interval: Duration::from_millis(20),
        ..SyncConfig::default()
    };
    let (engine, mut events) = SyncEngine::new(
        wallet.store.clone(),
        wallet.keys.clone(),
        wallet.chain.clone(),
        config,
        wallet.shutdown.clone(),
    );
    let handle = engine.spawn();

    // Wait until the engine reports reaching the tip.
    loop {
        let event = timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("engine went quiet")
            .expect("event channel closed");
        if let SyncEvent::Progress {
            height,
            tip_height,
            ..
        } = event
        {
            if height == tip_height {
                break;
            }
        }
    }
    assert_eq!(wallet.store.get_balance(None).unwrap(), 1_000_000);

    wallet.shutdown.send();
    timeout(Duration::from_secs(10), handle)
        .await
        .expect("engine did not stop")
        .unwrap();

    // The final event on the channel is Stopped.
    let mut last = None;
    while let Ok(Some(event)) =
        timeout(Duration::from_millis(100), events.recv()).await
    {
        last = Some(event);
    }
    assert!(matches!(last, Some(SyncEvent::Stopped)));
}
