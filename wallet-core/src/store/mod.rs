//! The wallet store: the record schema over an in-memory database with
//! atomic whole-snapshot persistence.
//!
//! ## On-disk format
//!
//! The snapshot file starts with one tag byte:
//!
//! - `0x00`: plaintext; the rest is the bcs-serialized database.
//! - [`ENVELOPE_VERSION`]: the whole stream is wrapped in the database
//!   envelope `version(1B) ‖ salt(16B) ‖ iv(12B) ‖ ciphertext`, written
//!   once a password has been set.
//!
//! ## Atomicity
//!
//! Every mutating operation rewrites the snapshot to a temporary file and
//! renames it over the old one, so a crash between any two writes of a
//! block commit leaves either all of the commit visible or none of it.
//! [`WalletStore::commit_block`] bundles a whole block's mutations
//! (outputs, spends, hints, block hash, cursor) into one such write.
//!
//! ## Locked stores
//!
//! Opening an encrypted snapshot yields a *sealed* store: only
//! `is_encrypted` is answerable until [`WalletStore::unlock`] supplies
//! the password. In-process, the store keeps its envelope key after the
//! key manager locks, so a locked wallet can keep syncing.

pub mod records;

mod db;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use blsct::TokenId;
use tracing::{debug, info};

use crate::envelope::{parse_envelope, EnvelopeKey, ENVELOPE_VERSION};
use crate::error::WalletError;
use crate::keys::KeyMaterial;
use crate::rng::OsRng;
use crate::store::db::WalletDb;
use crate::store::records::{
    EncryptionMeta, OutputParams, SyncState, TxKeysRecord, WalletOutput,
};

/// Tag byte of a plaintext snapshot.
const PLAIN_TAG: u8 = 0;

/// All mutations belonging to one synced block, committed atomically.
#[derive(Debug, Default)]
pub struct BlockCommit {
    pub height: u64,
    pub header_hash: String,
    pub outputs: Vec<OutputParams>,
    /// `(output_hash, spending tx hash)` pairs spent in this block.
    pub spends: Vec<(String, String)>,
    pub tx_keys: Vec<TxKeysRecord>,
    pub sync_state: SyncState,
}

struct StoreInner {
    db: WalletDb,
    /// Present once a password is known; used to envelope the snapshot.
    envelope: Option<EnvelopeKey>,
    /// The undecrypted snapshot of a store opened without its password.
    sealed: Option<Vec<u8>>,
}

/// Exclusive owner of the persistent wallet state.
pub struct WalletStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for WalletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl WalletStore {
    /// Create a fresh store at `path`. Fails if the file already exists.
    pub fn create(path: &Path) -> Result<Self, WalletError> {
        if path.exists() {
            return Err(WalletError::StoreCorrupt(format!(
                "refusing to overwrite existing store at {}",
                path.display()
            )));
        }
        let store = Self {
            path: path.to_owned(),
            inner: Mutex::new(StoreInner {
                db: WalletDb::default(),
                envelope: None,
                sealed: None,
            }),
        };
        store.persist(&store.lock())?;
        info!(path = %path.display(), "created wallet store");
        Ok(store)
    }

    /// Open an existing store. An encrypted snapshot comes up sealed; see
    /// [`Self::unlock`].
    pub fn open(path: &Path) -> Result<Self, WalletError> {
        let bytes = fs::read(path).map_err(|err| {
            WalletError::StoreCorrupt(format!(
                "reading {}: {err}",
                path.display()
            ))
        })?;

        let inner = match bytes.split_first() {
            Some((&PLAIN_TAG, rest)) => {
                let mut db: WalletDb =
                    bcs::from_bytes(rest).map_err(|err| {
                        WalletError::StoreCorrupt(err.to_string())
                    })?;
                db.rebuild_indexes();
                StoreInner {
                    db,
                    envelope: None,
                    sealed: None,
                }
            }
            Some((&ENVELOPE_VERSION, _rest)) => {
                // Validate the frame shape now; decryption waits for the
                // password.
                parse_envelope(&bytes).ok_or_else(|| {
                    WalletError::StoreCorrupt(
                        "truncated database envelope".to_owned(),
                    )
                })?;
                StoreInner {
                    db: WalletDb::default(),
                    envelope: None,
                    sealed: Some(bytes),
                }
            }
            _ => {
                return Err(WalletError::StoreCorrupt(
                    "unrecognized snapshot format".to_owned(),
                ))
            }
        };

        debug!(path = %path.display(), "opened wallet store");
        Ok(Self {
            path: path.to_owned(),
            inner: Mutex::new(inner),
        })
    }

    /// Decrypt a sealed store. Returns `false` on a wrong password. On an
    /// already-open store this just verifies the password.
    pub fn unlock(&self, password: &str) -> Result<bool, WalletError> {
        let mut inner = self.lock();

        let Some(sealed) = inner.sealed.clone() else {
            // Not sealed; verify against stored metadata if any.
            return match &inner.db.encryption {
                Some(meta) => {
                    let key = EnvelopeKey::derive(password, &meta.salt)?;
                    Ok(key.verifies(&meta.verification_hash))
                }
                None => Ok(true),
            };
        };

        let (salt, _iv, _ct) =
            parse_envelope(&sealed).expect("validated at open");
        let key = EnvelopeKey::derive(password, &salt)?;
        let plaintext = match key.open_database(&sealed) {
            Ok(plaintext) => plaintext,
            // AEAD failure on a well-formed envelope: wrong password.
            Err(WalletError::CryptoFailed) => return Ok(false),
            Err(err) => return Err(err),
        };

        let mut db: WalletDb = bcs::from_bytes(&plaintext)
            .map_err(|err| WalletError::StoreCorrupt(err.to_string()))?;
        db.rebuild_indexes();

        // The decrypted snapshot must agree that it was encrypted under
        // this password.
        match &db.encryption {
            Some(meta) if key.verifies(&meta.verification_hash) => {}
            _ => {
                return Err(WalletError::StoreCorrupt(
                    "snapshot encryption metadata mismatch".to_owned(),
                ))
            }
        }

        inner.db = db;
        inner.envelope = Some(key);
        inner.sealed = None;
        info!("wallet store unlocked");
        Ok(true)
    }

    /// Flush the snapshot. Safe to call repeatedly.
    pub fn close(&self) -> Result<(), WalletError> {
        let inner = self.lock();
        if inner.sealed.is_some() {
            // Nothing decrypted, nothing to write.
            return Ok(());
        }
        self.persist(&inner)
    }

    // --- key material --- //

    pub fn load_key_material(
        &self,
    ) -> Result<Option<KeyMaterial>, WalletError> {
        Ok(self.guard()?.db.key_material.clone())
    }

    pub fn save_key_material(
        &self,
        material: &KeyMaterial,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.key_material = Some(material.clone());
        self.persist(&inner)
    }

    // --- balance and outputs --- //

    /// Sum of unspent amounts for the given token (`None` = the default
    /// token).
    pub fn get_balance(
        &self,
        token_id: Option<&TokenId>,
    ) -> Result<u64, WalletError> {
        let inner = self.guard()?;
        Ok(inner
            .db
            .outputs
            .values()
            .filter(|output| {
                !output.is_spent && output.matches_token(token_id)
            })
            .map(|output| output.amount)
            .sum())
    }

    /// Unspent outputs for the given token, sorted by height ascending.
    pub fn get_unspent_outputs(
        &self,
        token_id: Option<&TokenId>,
    ) -> Result<Vec<WalletOutput>, WalletError> {
        let inner = self.guard()?;
        Ok(inner
            .db
            .outputs_sorted_by_height(true)
            .into_iter()
            .filter(|output| output.matches_token(token_id))
            .collect())
    }

    /// Every output record, sorted by height ascending.
    pub fn get_all_outputs(&self) -> Result<Vec<WalletOutput>, WalletError> {
        Ok(self.guard()?.db.outputs_sorted_by_height(false))
    }

    /// Mempool-height records awaiting confirmation.
    pub fn get_pending_outputs(
        &self,
    ) -> Result<Vec<WalletOutput>, WalletError> {
        let inner = self.guard()?;
        Ok(inner
            .db
            .outputs
            .values()
            .filter(|output| output.is_mempool())
            .cloned()
            .collect())
    }

    /// Upsert a single output record.
    pub fn store_output(
        &self,
        params: OutputParams,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.insert_output(WalletOutput::from_params(params));
        self.persist(&inner)
    }

    pub fn delete_output(&self, output_hash: &str) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.remove_output(output_hash);
        self.persist(&inner)
    }

    pub fn mark_spent(
        &self,
        output_hash: &str,
        spent_tx_hash: &str,
        spent_height: u64,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.mark_spent(output_hash, spent_tx_hash, spent_height);
        self.persist(&inner)
    }

    pub fn delete_outputs_by_height(
        &self,
        height: u64,
    ) -> Result<usize, WalletError> {
        let mut inner = self.guard()?;
        let deleted = inner.db.delete_outputs_by_height(height);
        self.persist(&inner)?;
        Ok(deleted)
    }

    pub fn unspend_outputs_by_spent_height(
        &self,
        height: u64,
    ) -> Result<usize, WalletError> {
        let mut inner = self.guard()?;
        let restored = inner.db.unspend_by_spent_height(height);
        self.persist(&inner)?;
        Ok(restored)
    }

    /// Restore a single output to unspent, e.g. when the transaction that
    /// consumed it in the mempool was rejected.
    pub fn unspend_output(
        &self,
        output_hash: &str,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        if let Some(mut output) = inner.db.remove_output(output_hash) {
            output.is_spent = false;
            output.spent_tx_hash = None;
            output.spent_block_height = None;
            inner.db.insert_output(output);
        }
        self.persist(&inner)
    }

    // --- tx key hints --- //

    pub fn save_tx_keys(
        &self,
        record: TxKeysRecord,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.insert_tx_keys(record);
        self.persist(&inner)
    }

    pub fn get_tx_keys_by_height(
        &self,
        height: u64,
    ) -> Result<Vec<TxKeysRecord>, WalletError> {
        Ok(self.guard()?.db.tx_keys_at(height))
    }

    pub fn delete_tx_keys_by_height(
        &self,
        height: u64,
    ) -> Result<usize, WalletError> {
        let mut inner = self.guard()?;
        let deleted = inner.db.delete_tx_keys_by_height(height);
        self.persist(&inner)?;
        Ok(deleted)
    }

    // --- block hashes --- //

    pub fn save_block_hash(
        &self,
        height: u64,
        hash: &str,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.block_hashes.insert(height, hash.to_owned());
        self.persist(&inner)
    }

    pub fn get_block_hash(
        &self,
        height: u64,
    ) -> Result<Option<String>, WalletError> {
        Ok(self.guard()?.db.block_hashes.get(&height).cloned())
    }

    pub fn delete_block_hash(&self, height: u64) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.block_hashes.remove(&height);
        self.persist(&inner)
    }

    /// Compact block hashes below the pruning horizon.
    pub fn delete_block_hashes_before(
        &self,
        height: u64,
    ) -> Result<usize, WalletError> {
        let mut inner = self.guard()?;
        let keep = inner.db.block_hashes.split_off(&height);
        let pruned = inner.db.block_hashes.len();
        inner.db.block_hashes = keep;
        if pruned > 0 {
            self.persist(&inner)?;
        }
        Ok(pruned)
    }

    // --- sync state --- //

    pub fn load_sync_state(&self) -> Result<Option<SyncState>, WalletError> {
        Ok(self.guard()?.db.sync_state.clone())
    }

    pub fn save_sync_state(
        &self,
        state: &SyncState,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.sync_state = Some(state.clone());
        self.persist(&inner)
    }

    /// Clear the sync cursor, hints and block hashes, leaving outputs and
    /// key material intact. The next sync pass starts from genesis.
    pub fn clear_sync_data(&self) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.sync_state = None;
        inner.db.block_hashes.clear();
        let heights: Vec<u64> =
            inner.db.tx_keys.values().map(|r| r.block_height).collect();
        for height in heights {
            inner.db.delete_tx_keys_by_height(height);
        }
        self.persist(&inner)
    }

    // --- atomic block commit --- //

    /// Apply everything a synced block changes in one snapshot write.
    /// Returns how many owned-output records were touched, so the caller
    /// knows whether the balance moved.
    pub fn commit_block(
        &self,
        commit: BlockCommit,
    ) -> Result<usize, WalletError> {
        let mut inner = self.guard()?;
        let mut touched = commit.outputs.len();
        for params in commit.outputs {
            inner.db.insert_output(WalletOutput::from_params(params));
        }
        for (output_hash, spent_tx_hash) in &commit.spends {
            if inner.db.mark_spent(output_hash, spent_tx_hash, commit.height)
            {
                touched += 1;
            }
        }
        for record in commit.tx_keys {
            inner.db.insert_tx_keys(record);
        }
        inner
            .db
            .block_hashes
            .insert(commit.height, commit.header_hash);
        inner.db.sync_state = Some(commit.sync_state);
        self.persist(&inner)?;
        Ok(touched)
    }

    /// Roll one height fully back: forward outputs, spend marks, hints
    /// and the block hash, in one snapshot write.
    pub fn rollback_height(&self, height: u64) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        let dropped = inner.db.delete_outputs_by_height(height);
        let restored = inner.db.unspend_by_spent_height(height);
        let hints = inner.db.delete_tx_keys_by_height(height);
        inner.db.block_hashes.remove(&height);
        debug!(height, dropped, restored, hints, "rolled back height");
        self.persist(&inner)
    }

    /// The builder's post-broadcast bookkeeping: flag the consumed inputs
    /// as mempool-spent and insert the pending change record, atomically.
    /// Uses `try_lock`, surfacing [`WalletError::StoreBusy`] instead of
    /// stalling the caller behind a sync commit.
    pub fn commit_pending_spend(
        &self,
        spent_inputs: &[(String, String)],
        pending_change: Option<OutputParams>,
    ) -> Result<(), WalletError> {
        let mut inner =
            self.inner.try_lock().map_err(|_| WalletError::StoreBusy)?;
        if inner.sealed.is_some() {
            return Err(WalletError::WalletLocked);
        }
        for (output_hash, spent_tx_hash) in spent_inputs {
            // Height 0: spent in the mempool, not yet in a block.
            inner.db.mark_spent(output_hash, spent_tx_hash, 0);
        }
        if let Some(params) = pending_change {
            inner.db.insert_output(WalletOutput::from_params(params));
        }
        self.persist(&inner)
    }

    // --- encryption --- //

    pub fn is_encrypted(&self) -> bool {
        let inner = self.lock();
        inner.sealed.is_some() || inner.db.encryption.is_some()
    }

    /// Record the encryption metadata and start enveloping the snapshot
    /// with `key` from now on.
    pub fn save_encryption_metadata(
        &self,
        meta: EncryptionMeta,
        key: EnvelopeKey,
    ) -> Result<(), WalletError> {
        let mut inner = self.guard()?;
        inner.db.encryption = Some(meta);
        inner.envelope = Some(key);
        self.persist(&inner)
    }

    pub fn get_encryption_metadata(
        &self,
    ) -> Result<Option<EncryptionMeta>, WalletError> {
        Ok(self.guard()?.db.encryption.clone())
    }

    // --- internals --- //

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap()
    }

    /// Lock for an operation that needs the decrypted database.
    fn guard(&self) -> Result<MutexGuard<'_, StoreInner>, WalletError> {
        let inner = self.lock();
        if inner.sealed.is_some() {
            return Err(WalletError::WalletLocked);
        }
        Ok(inner)
    }

    /// Serialize, optionally envelope, and atomically replace the
    /// snapshot file.
    fn persist(&self, inner: &StoreInner) -> Result<(), WalletError> {
        let body = bcs::to_bytes(&inner.db)
            .map_err(|err| WalletError::StoreCorrupt(err.to_string()))?;

        let bytes = match &inner.envelope {
            Some(key) => key.seal_database(&mut OsRng, &body)?,
            None => {
                let mut bytes = Vec::with_capacity(1 + body.len());
                bytes.push(PLAIN_TAG);
                bytes.extend_from_slice(&body);
                bytes
            }
        };

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|err| {
            WalletError::StoreCorrupt(format!(
                "writing {}: {err}",
                tmp.display()
            ))
        })?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            WalletError::StoreCorrupt(format!(
                "replacing {}: {err}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    fn output_params(hash: &str, height: u64, amount: u64) -> OutputParams {
        OutputParams {
            output_hash: hash.to_owned(),
            tx_hash: format!("tx-{hash}"),
            output_index: 0,
            block_height: height,
            amount,
            memo: None,
            token_id: None,
            blinding_key: String::new(),
            spending_key: String::new(),
            output_data: Vec::new(),
        }
    }

    fn temp_store() -> (TempDir, WalletStore) {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::create(&dir.path().join("wallet.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let (dir, _store) = temp_store();
        let err =
            WalletStore::create(&dir.path().join("wallet.db")).unwrap_err();
        assert!(matches!(err, WalletError::StoreCorrupt(_)));
    }

    #[test]
    fn balance_counts_only_unspent_matching_outputs() {
        let (_dir, store) = temp_store();
        store.store_output(output_params("a", 1, 100)).unwrap();
        store.store_output(output_params("b", 2, 250)).unwrap();
        let mut other = output_params("c", 3, 1_000);
        other.token_id = Some(TokenId::new([9; 32]));
        store.store_output(other).unwrap();

        assert_eq!(store.get_balance(None).unwrap(), 350);
        store.mark_spent("a", "spend-tx", 5).unwrap();
        assert_eq!(store.get_balance(None).unwrap(), 250);
        let token = TokenId::new([9; 32]);
        assert_eq!(store.get_balance(Some(&token)).unwrap(), 1_000);

        // Balance equals the sum over the unspent filtered set at all
        // times.
        let unspent = store.get_unspent_outputs(None).unwrap();
        let total: u64 = unspent.iter().map(|o| o.amount).sum();
        assert_eq!(total, store.get_balance(None).unwrap());
    }

    #[test]
    fn snapshot_roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.db");
        {
            let store = WalletStore::create(&path).unwrap();
            store.store_output(output_params("a", 1, 100)).unwrap();
            store
                .save_sync_state(&SyncState {
                    last_synced_height: 1,
                    last_synced_hash: "h1".to_owned(),
                    total_tx_keys_synced: 3,
                    last_sync_time: 1_234,
                    chain_tip_at_last_sync: 1,
                })
                .unwrap();
            store.close().unwrap();
        }

        let store = WalletStore::open(&path).unwrap();
        assert_eq!(store.get_balance(None).unwrap(), 100);
        let state = store.load_sync_state().unwrap().unwrap();
        assert_eq!(state.last_synced_height, 1);
        assert_eq!(state.total_tx_keys_synced, 3);
    }

    #[test]
    fn commit_block_is_all_or_nothing_across_crashes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.db");
        let store = WalletStore::create(&path).unwrap();

        store.store_output(output_params("pre", 1, 50)).unwrap();
        // A crash image taken between two commits.
        let before = fs::read(&path).unwrap();

        store
            .commit_block(BlockCommit {
                height: 2,
                header_hash: "h2".to_owned(),
                outputs: vec![output_params("new", 2, 100)],
                spends: vec![("pre".to_owned(), "spender".to_owned())],
                tx_keys: vec![TxKeysRecord {
                    tx_hash: "spender".to_owned(),
                    block_height: 2,
                    keys_data: "{}".to_owned(),
                }],
                sync_state: SyncState {
                    last_synced_height: 2,
                    last_synced_hash: "h2".to_owned(),
                    total_tx_keys_synced: 1,
                    last_sync_time: 0,
                    chain_tip_at_last_sync: 2,
                },
            })
            .unwrap();
        drop(store);

        // After the commit, every change is visible.
        let store = WalletStore::open(&path).unwrap();
        assert_eq!(store.get_balance(None).unwrap(), 100);
        assert_eq!(store.get_block_hash(2).unwrap().as_deref(), Some("h2"));
        assert_eq!(store.get_tx_keys_by_height(2).unwrap().len(), 1);
        drop(store);

        // Restore the crash image: none of the commit is visible, and a
        // leftover temp file from a torn write changes nothing.
        fs::write(&path, &before).unwrap();
        fs::write(path.with_extension("tmp"), b"torn garbage").unwrap();
        let store = WalletStore::open(&path).unwrap();
        assert_eq!(store.get_balance(None).unwrap(), 50);
        assert_eq!(store.get_block_hash(2).unwrap(), None);
        assert!(store.get_tx_keys_by_height(2).unwrap().is_empty());
    }

    #[test]
    fn rollback_height_reverses_a_commit() {
        let (_dir, store) = temp_store();
        store.store_output(output_params("old", 1, 50)).unwrap();
        store
            .commit_block(BlockCommit {
                height: 2,
                header_hash: "h2".to_owned(),
                outputs: vec![output_params("new", 2, 100)],
                spends: vec![("old".to_owned(), "spender".to_owned())],
                tx_keys: Vec::new(),
                sync_state: SyncState::default(),
            })
            .unwrap();
        assert_eq!(store.get_balance(None).unwrap(), 100);

        store.rollback_height(2).unwrap();
        assert_eq!(store.get_balance(None).unwrap(), 50);
        let outputs = store.get_all_outputs().unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(!outputs[0].is_spent);
        assert_eq!(outputs[0].spent_tx_hash, None);
    }

    #[test]
    fn encrypted_snapshot_requires_password() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.db");
        {
            let store = WalletStore::create(&path).unwrap();
            store.store_output(output_params("a", 1, 100)).unwrap();
            let key =
                EnvelopeKey::generate(&mut OsRng, "hunter2").unwrap();
            store
                .save_encryption_metadata(EncryptionMeta::new(&key), key)
                .unwrap();
        }

        let store = WalletStore::open(&path).unwrap();
        assert!(store.is_encrypted());
        // Sealed: data is unreachable until unlocked.
        assert!(matches!(
            store.get_balance(None),
            Err(WalletError::WalletLocked)
        ));
        assert!(!store.unlock("wrong").unwrap());
        assert!(store.unlock("hunter2").unwrap());
        assert_eq!(store.get_balance(None).unwrap(), 100);
    }

    #[test]
    fn prunes_block_hashes_below_horizon() {
        let (_dir, store) = temp_store();
        for height in 1..=10 {
            store
                .save_block_hash(height, &format!("h{height}"))
                .unwrap();
        }
        assert_eq!(store.delete_block_hashes_before(8).unwrap(), 7);
        assert_eq!(store.get_block_hash(7).unwrap(), None);
        assert_eq!(store.get_block_hash(8).unwrap().as_deref(), Some("h8"));
    }

    #[test]
    fn clear_sync_data_keeps_outputs() {
        let (_dir, store) = temp_store();
        store.store_output(output_params("a", 1, 100)).unwrap();
        store.save_block_hash(1, "h1").unwrap();
        store
            .save_tx_keys(TxKeysRecord {
                tx_hash: "t".to_owned(),
                block_height: 1,
                keys_data: "{}".to_owned(),
            })
            .unwrap();
        store.save_sync_state(&SyncState::default()).unwrap();

        store.clear_sync_data().unwrap();
        assert_eq!(store.load_sync_state().unwrap(), None);
        assert_eq!(store.get_block_hash(1).unwrap(), None);
        assert!(store.get_tx_keys_by_height(1).unwrap().is_empty());
        assert_eq!(store.get_balance(None).unwrap(), 100);
    }
}
