//! The background sync engine.
//!
//! One pass advances the sync cursor toward the server's chain tip:
//!
//! 1. Query the tip.
//! 2. Reorg check: if the server's header hash at `lastSyncedHeight`
//!    disagrees with ours, walk the cursor back in fixed-size chunks,
//!    rolling each abandoned height fully out of the store, until the
//!    hashes agree (or genesis).
//! 3. Advance in ranges of up to [`SyncConfig::batch_size`] blocks,
//!    scanning every hinted output for ownership, recovering amounts for
//!    matches, and committing each block's changes atomically.
//! 4. Prune block hashes below the reorg horizon and reconcile pending
//!    mempool records.
//!
//! Between passes the engine sleeps [`SyncConfig::poll_interval`];
//! transport errors back off exponentially (capped at 60 s). The
//! shutdown flag is honored between blocks, never mid-commit.

mod hints;

pub use hints::{OutputHint, TxHints};

use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;

use indexer_client::RpcError;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::backoff;
use crate::chain::{BlockTxKeys, ChainSource, ChainTip};
use crate::error::WalletError;
use crate::events::{SyncEvent, SyncEventReceiver, SyncEventSender};
use crate::keys::{
    KeyManager, ACCOUNT_CHANGE, ACCOUNT_RECEIVE, ACCOUNT_STAKING,
    POOL_LOOKAHEAD,
};
use crate::shutdown::ShutdownSignal;
use crate::store::records::{OutputParams, SyncState, TxKeysRecord};
use crate::store::{BlockCommit, WalletStore};
use crate::unix_timestamp;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Sleep between successful passes.
    pub poll_interval: Duration,
    /// Maximum blocks per `transaction_keys_range` request.
    pub batch_size: u64,
    /// Reorg walk-back chunk.
    pub reorg_step: u64,
    /// Re-fetch attempts for a block whose hints fail to decode.
    pub block_retry_limit: u32,
    /// Block hashes older than `tip - horizon` are compacted away;
    /// reorgs reaching below the horizon are fatal.
    pub pruning_horizon: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            batch_size: 1000,
            reorg_step: 10,
            block_retry_limit: 3,
            pruning_horizon: 10_000,
        }
    }
}

/// What one sync pass accomplished.
#[derive(Clone, Debug, Default)]
pub struct SyncStats {
    pub tip_height: u64,
    pub blocks_synced: u64,
    pub outputs_found: usize,
}

pub struct SyncEngine {
    store: Arc<WalletStore>,
    keys: Arc<KeyManager>,
    chain: Arc<dyn ChainSource>,
    config: SyncConfig,
    events: SyncEventSender,
    shutdown: ShutdownSignal,
}

impl SyncEngine {
    pub fn new(
        store: Arc<WalletStore>,
        keys: Arc<KeyManager>,
        chain: Arc<dyn ChainSource>,
        config: SyncConfig,
        shutdown: ShutdownSignal,
    ) -> (Self, SyncEventReceiver) {
        let (events, events_rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                store,
                keys,
                chain,
                config,
                events,
                shutdown,
            },
            events_rx,
        )
    }

    /// Spawn the poll loop onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// The poll loop: sync, sleep, repeat; back off on transient errors;
    /// halt on fatal ones or shutdown.
    pub async fn run(self) {
        info!("sync engine starting");
        let mut backoff_iter = backoff::iter();

        loop {
            if self.shutdown.try_recv() {
                break;
            }

            let wait = match self.sync_once().await {
                Ok(stats) => {
                    debug!(
                        tip = stats.tip_height,
                        blocks = stats.blocks_synced,
                        outputs = stats.outputs_found,
                        "sync pass complete"
                    );
                    backoff_iter = backoff::iter();
                    self.config.poll_interval
                }
                Err(err) if err.is_fatal_for_sync() => {
                    error!("sync halted: {err}");
                    let _ = self.events.send(SyncEvent::Error(err));
                    break;
                }
                Err(err) => {
                    warn!("sync pass failed, backing off: {err}");
                    let _ = self.events.send(SyncEvent::Error(err));
                    backoff_iter.next().expect("backoff is infinite")
                }
            };

            tokio::select! {
                () = time::sleep(wait) => {}
                () = self.shutdown.recv() => break,
            }
        }

        let _ = self.events.send(SyncEvent::Stopped);
        info!("sync engine stopped");
    }

    /// One full pass: reorg check, advance to tip, prune, reconcile
    /// pending records.
    pub async fn sync_once(&self) -> Result<SyncStats, WalletError> {
        let tip = self.chain.chain_tip().await?;
        let mut state =
            self.store.load_sync_state()?.unwrap_or_default();

        // The registry is a rebuildable cache; make sure the lookahead
        // pools exist before scanning (e.g. after a registry loss).
        for account in [ACCOUNT_RECEIVE, ACCOUNT_CHANGE, ACCOUNT_STAKING] {
            self.keys.ensure_pool(account, POOL_LOOKAHEAD);
        }

        if state.last_synced_height > tip.height {
            // The server's chain got shorter; everything past its tip is
            // gone by definition.
            warn!(
                height = state.last_synced_height,
                tip = tip.height,
                "synced past the server tip; rolling back"
            );
            self.rollback(&mut state, &tip).await?;
        } else if state.last_synced_height > 0 {
            let server_hash = self
                .chain
                .header_hash(state.last_synced_height)
                .await?;
            let local_hash =
                self.store.get_block_hash(state.last_synced_height)?;
            if local_hash.as_deref() != Some(server_hash.as_str()) {
                warn!(
                    height = state.last_synced_height,
                    "chain reorganization detected"
                );
                self.rollback(&mut state, &tip).await?;
            }
        }

        let mut stats = SyncStats {
            tip_height: tip.height,
            ..Default::default()
        };

        'advance: while state.last_synced_height < tip.height {
            if self.shutdown.try_recv() {
                break;
            }
            let start = state.last_synced_height + 1;
            let want =
                min(self.config.batch_size, tip.height - state.last_synced_height);
            let batch =
                self.chain.transaction_keys_range(start, want).await?;
            if batch.is_empty() {
                // Server has nothing past our cursor yet.
                break;
            }

            for block in batch {
                if self.shutdown.try_recv() {
                    break 'advance;
                }
                let found =
                    self.process_block(&block, &tip, &mut state).await?;
                stats.blocks_synced += 1;
                stats.outputs_found += found;

                let _ = self.events.send(SyncEvent::Progress {
                    height: state.last_synced_height,
                    tip_height: tip.height,
                    blocks_done: stats.blocks_synced,
                });
            }
        }

        if tip.height > self.config.pruning_horizon {
            self.store.delete_block_hashes_before(
                tip.height - self.config.pruning_horizon,
            )?;
        }

        if self.reconcile_pending().await? {
            let _ = self.events.send(SyncEvent::BalanceChanged);
        }

        Ok(stats)
    }

    /// Scan and commit one block, re-fetching a bounded number of times
    /// when its hints fail to decode.
    async fn process_block(
        &self,
        block: &BlockTxKeys,
        tip: &ChainTip,
        state: &mut SyncState,
    ) -> Result<usize, WalletError> {
        let mut attempt = 0u32;
        let mut current = block.clone();
        loop {
            match self.scan_block(&current, tip, state) {
                Ok(commit) => {
                    let found = commit.outputs.len();
                    let new_state = commit.sync_state.clone();
                    let touched = self.store.commit_block(commit)?;
                    *state = new_state;
                    if touched > 0 {
                        let _ =
                            self.events.send(SyncEvent::BalanceChanged);
                    }
                    return Ok(found);
                }
                Err(WalletError::Rpc(RpcError::Malformed(reason))) => {
                    attempt += 1;
                    if attempt > self.config.block_retry_limit {
                        error!(
                            height = block.height,
                            "block hints undecodable after retries: \
                             {reason}"
                        );
                        return Err(WalletError::Rpc(
                            RpcError::Malformed(reason),
                        ));
                    }
                    warn!(
                        height = block.height,
                        attempt, "re-fetching undecodable block: {reason}"
                    );
                    let refetched = self
                        .chain
                        .transaction_keys_range(block.height, 1)
                        .await?;
                    current = refetched
                        .into_iter()
                        .find(|candidate| candidate.height == block.height)
                        .ok_or(WalletError::Rpc(RpcError::Malformed(
                            "block vanished during refetch".to_owned(),
                        )))?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Pure scan: ownership checks, amount recovery, spend collection.
    fn scan_block(
        &self,
        block: &BlockTxKeys,
        tip: &ChainTip,
        state: &SyncState,
    ) -> Result<BlockCommit, WalletError> {
        let mut outputs = Vec::new();
        let mut spends = Vec::new();
        let mut tx_keys = Vec::new();

        for tx in &block.txs {
            let hints = TxHints::parse(&tx.keys).map_err(|reason| {
                RpcError::Malformed(format!(
                    "tx {} hints: {reason}",
                    tx.tx_hash
                ))
            })?;

            // Ownership pass: view-tag fast path, then hash-id lookup.
            let mut matched_hints = Vec::new();
            let mut candidates = Vec::new();
            for hint in &hints.outputs {
                let candidate = hint.to_candidate().map_err(|reason| {
                    RpcError::Malformed(format!(
                        "output {} in tx {}: {reason}",
                        hint.output_hash, tx.tx_hash
                    ))
                })?;
                if self.keys.is_mine(
                    &candidate.blinding_key,
                    &candidate.spending_key,
                    candidate.view_tag,
                ) {
                    matched_hints.push(hint);
                    candidates.push(candidate);
                }
            }

            // Amount recovery for the matches. Candidates whose proof
            // fails to open are logged and skipped, never claimed.
            let recovered = self.keys.recover_outputs(&candidates);
            if recovered.indices.len() < candidates.len() {
                warn!(
                    height = block.height,
                    tx = %tx.tx_hash,
                    matched = candidates.len(),
                    recovered = recovered.indices.len(),
                    "some matched outputs failed amount recovery"
                );
            }
            for (slot, &index) in recovered.indices.iter().enumerate() {
                let hint = matched_hints[index];
                let output_data =
                    hint.decode_output_data().map_err(|reason| {
                        RpcError::Malformed(format!(
                            "output {}: {reason}",
                            hint.output_hash
                        ))
                    })?;
                let token_id = hint.parse_token_id().map_err(|reason| {
                    RpcError::Malformed(format!(
                        "output {}: {reason}",
                        hint.output_hash
                    ))
                })?;
                let memo = Some(recovered.memos[slot].clone())
                    .filter(|memo| !memo.is_empty());
                outputs.push(OutputParams {
                    output_hash: hint.output_hash.clone(),
                    tx_hash: tx.tx_hash.clone(),
                    output_index: hint.output_index,
                    block_height: block.height,
                    amount: recovered.amounts[slot],
                    memo,
                    token_id,
                    blinding_key: hint.blinding_key.clone(),
                    spending_key: hint.spending_key.clone(),
                    output_data,
                });
            }

            for spent_hash in &hints.spent {
                spends.push((spent_hash.clone(), tx.tx_hash.clone()));
            }
            tx_keys.push(TxKeysRecord {
                tx_hash: tx.tx_hash.clone(),
                block_height: block.height,
                keys_data: tx.keys.to_string(),
            });
        }

        let total_tx_keys =
            state.total_tx_keys_synced + block.txs.len() as u64;
        Ok(BlockCommit {
            height: block.height,
            header_hash: block.header_hash.clone(),
            outputs,
            spends,
            tx_keys,
            sync_state: SyncState {
                last_synced_height: block.height,
                last_synced_hash: block.header_hash.clone(),
                total_tx_keys_synced: total_tx_keys,
                last_sync_time: unix_timestamp(),
                chain_tip_at_last_sync: tip.height,
            },
        })
    }

    /// Walk the cursor back in fixed-size chunks until the local and
    /// server hashes agree, rolling every abandoned height out of the
    /// store.
    async fn rollback(
        &self,
        state: &mut SyncState,
        tip: &ChainTip,
    ) -> Result<(), WalletError> {
        loop {
            let from = state.last_synced_height;
            if from == 0 {
                break;
            }
            let target = from.saturating_sub(self.config.reorg_step);
            for height in ((target + 1)..=from).rev() {
                self.store.rollback_height(height)?;
            }
            state.last_synced_height = target;
            if target == 0 {
                break;
            }
            if target > tip.height {
                // Hashes cannot agree past the server tip; keep walking.
                continue;
            }

            let local = self
                .store
                .get_block_hash(target)?
                .ok_or(WalletError::ReorgDeeperThanHistory)?;
            let server = self.chain.header_hash(target).await?;
            if local == server {
                break;
            }
        }

        state.last_synced_hash = self
            .store
            .get_block_hash(state.last_synced_height)?
            .unwrap_or_default();
        self.store.save_sync_state(state)?;
        let _ = self.events.send(SyncEvent::BalanceChanged);
        info!(
            height = state.last_synced_height,
            "rolled back to common ancestor"
        );
        Ok(())
    }

    /// Drop pending mempool records whose transaction the server no
    /// longer knows, and restore inputs whose mempool spender vanished.
    async fn reconcile_pending(&self) -> Result<bool, WalletError> {
        let mut changed = false;

        for output in self.store.get_pending_outputs()? {
            if self.chain.transaction_exists(&output.tx_hash).await? {
                continue;
            }
            warn!(
                tx = %output.tx_hash,
                "pending transaction rejected; dropping its outputs"
            );
            self.store.delete_output(&output.output_hash)?;
            changed = true;
        }

        for output in self.store.get_all_outputs()? {
            if output.spent_block_height != Some(0) {
                continue;
            }
            let Some(spender) = output.spent_tx_hash.as_deref() else {
                continue;
            };
            if self.chain.transaction_exists(spender).await? {
                continue;
            }
            warn!(
                output = %output.output_hash,
                "mempool spender rejected; restoring output"
            );
            self.store.unspend_output(&output.output_hash)?;
            changed = true;
        }

        Ok(changed)
    }
}
