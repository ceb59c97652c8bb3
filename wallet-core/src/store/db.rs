//! The in-memory record database behind the wallet store.
//!
//! Primary maps are serialized into the snapshot; the height and
//! spent-height indexes are rebuilt on load rather than persisted, so
//! they can never disagree with the records on disk.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::keys::KeyMaterial;
use crate::store::records::{
    EncryptionMeta, SyncState, TxKeysRecord, WalletOutput,
};

#[derive(Default, Serialize, Deserialize)]
pub(crate) struct WalletDb {
    pub key_material: Option<KeyMaterial>,
    /// `output_hash` → record.
    pub outputs: BTreeMap<String, WalletOutput>,
    /// `tx_hash` → hint record.
    pub tx_keys: BTreeMap<String, TxKeysRecord>,
    /// `height` → header hash.
    pub block_hashes: BTreeMap<u64, String>,
    pub sync_state: Option<SyncState>,
    pub encryption: Option<EncryptionMeta>,

    // Rebuildable indexes, never persisted.
    #[serde(skip)]
    outputs_by_height: BTreeMap<u64, BTreeSet<String>>,
    #[serde(skip)]
    outputs_by_spent_height: BTreeMap<u64, BTreeSet<String>>,
    #[serde(skip)]
    tx_keys_by_height: BTreeMap<u64, BTreeSet<String>>,
}

impl WalletDb {
    /// Rebuild the secondary indexes after deserialization.
    pub fn rebuild_indexes(&mut self) {
        self.outputs_by_height.clear();
        self.outputs_by_spent_height.clear();
        self.tx_keys_by_height.clear();

        for (hash, output) in &self.outputs {
            self.outputs_by_height
                .entry(output.block_height)
                .or_default()
                .insert(hash.clone());
            if let Some(spent_height) = output.spent_block_height {
                self.outputs_by_spent_height
                    .entry(spent_height)
                    .or_default()
                    .insert(hash.clone());
            }
        }
        for (tx_hash, record) in &self.tx_keys {
            self.tx_keys_by_height
                .entry(record.block_height)
                .or_default()
                .insert(tx_hash.clone());
        }
    }

    // --- outputs --- //

    /// Upsert by `output_hash`, keeping the indexes in step.
    pub fn insert_output(&mut self, output: WalletOutput) {
        let hash = output.output_hash.clone();
        if let Some(old) = self.outputs.remove(&hash) {
            self.unindex_output(&old);
        }
        self.outputs_by_height
            .entry(output.block_height)
            .or_default()
            .insert(hash.clone());
        if let Some(spent_height) = output.spent_block_height {
            self.outputs_by_spent_height
                .entry(spent_height)
                .or_default()
                .insert(hash.clone());
        }
        self.outputs.insert(hash, output);
    }

    pub fn remove_output(&mut self, hash: &str) -> Option<WalletOutput> {
        let output = self.outputs.remove(hash)?;
        self.unindex_output(&output);
        Some(output)
    }

    fn unindex_output(&mut self, output: &WalletOutput) {
        prune_index(
            &mut self.outputs_by_height,
            output.block_height,
            &output.output_hash,
        );
        if let Some(spent_height) = output.spent_block_height {
            prune_index(
                &mut self.outputs_by_spent_height,
                spent_height,
                &output.output_hash,
            );
        }
    }

    /// Flag an output spent. Returns false if the output is unknown.
    pub fn mark_spent(
        &mut self,
        hash: &str,
        spent_tx_hash: &str,
        spent_height: u64,
    ) -> bool {
        let Some(mut output) = self.remove_output(hash) else {
            return false;
        };
        output.is_spent = true;
        output.spent_tx_hash = Some(spent_tx_hash.to_owned());
        output.spent_block_height = Some(spent_height);
        self.insert_output(output);
        true
    }

    /// Reorg rollback of the spend side: restore every output spent at
    /// `height` to unspent. Returns how many were restored.
    pub fn unspend_by_spent_height(&mut self, height: u64) -> usize {
        let hashes: Vec<String> = self
            .outputs_by_spent_height
            .get(&height)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for hash in &hashes {
            let Some(mut output) = self.remove_output(hash) else {
                continue;
            };
            output.is_spent = false;
            output.spent_tx_hash = None;
            output.spent_block_height = None;
            self.insert_output(output);
        }
        hashes.len()
    }

    /// Reorg rollback of the forward side: drop every output received at
    /// `height`. Returns how many were dropped.
    pub fn delete_outputs_by_height(&mut self, height: u64) -> usize {
        let hashes: Vec<String> = self
            .outputs_by_height
            .get(&height)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for hash in &hashes {
            self.remove_output(hash);
        }
        hashes.len()
    }

    pub fn outputs_sorted_by_height(
        &self,
        only_unspent: bool,
    ) -> Vec<WalletOutput> {
        self.outputs_by_height
            .values()
            .flatten()
            .filter_map(|hash| self.outputs.get(hash))
            .filter(|output| !only_unspent || !output.is_spent)
            .cloned()
            .collect()
    }

    // --- tx key hints --- //

    pub fn insert_tx_keys(&mut self, record: TxKeysRecord) {
        let tx_hash = record.tx_hash.clone();
        if let Some(old) = self.tx_keys.remove(&tx_hash) {
            prune_index(
                &mut self.tx_keys_by_height,
                old.block_height,
                &tx_hash,
            );
        }
        self.tx_keys_by_height
            .entry(record.block_height)
            .or_default()
            .insert(tx_hash.clone());
        self.tx_keys.insert(tx_hash, record);
    }

    pub fn tx_keys_at(&self, height: u64) -> Vec<TxKeysRecord> {
        self.tx_keys_by_height
            .get(&height)
            .into_iter()
            .flatten()
            .filter_map(|tx_hash| self.tx_keys.get(tx_hash))
            .cloned()
            .collect()
    }

    pub fn delete_tx_keys_by_height(&mut self, height: u64) -> usize {
        let hashes: Vec<String> = self
            .tx_keys_by_height
            .remove(&height)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for tx_hash in &hashes {
            self.tx_keys.remove(tx_hash);
        }
        hashes.len()
    }

    #[cfg(test)]
    pub fn assert_invariants(&self) {
        for (hash, output) in &self.outputs {
            assert_eq!(hash, &output.output_hash);
            if !output.is_spent {
                assert_eq!(output.spent_tx_hash, None);
                assert_eq!(output.spent_block_height, None);
            }
            assert!(self.outputs_by_height[&output.block_height]
                .contains(hash));
            if let Some(spent_height) = output.spent_block_height {
                assert!(self.outputs_by_spent_height[&spent_height]
                    .contains(hash));
            }
        }
        let indexed: usize =
            self.outputs_by_height.values().map(BTreeSet::len).sum();
        assert_eq!(indexed, self.outputs.len());

        for (tx_hash, record) in &self.tx_keys {
            assert!(self.tx_keys_by_height[&record.block_height]
                .contains(tx_hash));
        }
    }
}

fn prune_index(
    index: &mut BTreeMap<u64, BTreeSet<String>>,
    key: u64,
    value: &str,
) {
    if let Some(set) = index.get_mut(&key) {
        set.remove(value);
        if set.is_empty() {
            index.remove(&key);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::records::OutputParams;

    fn output(hash: &str, height: u64, amount: u64) -> WalletOutput {
        WalletOutput::from_params(OutputParams {
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
        })
    }

    #[test]
    fn upsert_moves_index_entries() {
        let mut db = WalletDb::default();
        db.insert_output(output("a", 0, 10));
        db.assert_invariants();

        // Confirmation: same hash reappears at a real height.
        db.insert_output(output("a", 7, 10));
        db.assert_invariants();
        assert_eq!(db.outputs.len(), 1);
        assert!(db.outputs_by_height.get(&0).is_none());
        assert!(db.outputs_by_height[&7].contains("a"));
    }

    #[test]
    fn spend_and_unspend_roundtrip() {
        let mut db = WalletDb::default();
        db.insert_output(output("a", 5, 10));
        assert!(db.mark_spent("a", "spend-tx", 9));
        db.assert_invariants();
        assert!(db.outputs["a"].is_spent);

        assert_eq!(db.unspend_by_spent_height(9), 1);
        db.assert_invariants();
        let restored = &db.outputs["a"];
        assert!(!restored.is_spent);
        assert_eq!(restored.spent_tx_hash, None);
        assert_eq!(restored.spent_block_height, None);

        assert!(!db.mark_spent("missing", "spend-tx", 9));
    }

    #[test]
    fn rollback_deletes_only_the_given_height() {
        let mut db = WalletDb::default();
        db.insert_output(output("a", 5, 10));
        db.insert_output(output("b", 6, 20));
        db.insert_output(output("c", 6, 30));

        assert_eq!(db.delete_outputs_by_height(6), 2);
        db.assert_invariants();
        assert_eq!(db.outputs.len(), 1);
        assert!(db.outputs.contains_key("a"));
    }

    #[test]
    fn indexes_rebuild_after_roundtrip() {
        let mut db = WalletDb::default();
        db.insert_output(output("a", 5, 10));
        db.mark_spent("a", "spend-tx", 8);
        db.insert_tx_keys(TxKeysRecord {
            tx_hash: "t1".to_owned(),
            block_height: 5,
            keys_data: "{}".to_owned(),
        });

        let bytes = bcs::to_bytes(&db).unwrap();
        let mut restored: WalletDb = bcs::from_bytes(&bytes).unwrap();
        restored.rebuild_indexes();
        restored.assert_invariants();
        assert_eq!(restored.unspend_by_spent_height(8), 1);
        assert_eq!(restored.tx_keys_at(5).len(), 1);
    }

    #[test]
    fn outputs_sorted_ascending_by_height() {
        let mut db = WalletDb::default();
        db.insert_output(output("c", 30, 1));
        db.insert_output(output("a", 10, 1));
        db.insert_output(output("b", 20, 1));

        let heights: Vec<u64> = db
            .outputs_sorted_by_height(false)
            .iter()
            .map(|o| o.block_height)
            .collect();
        assert_eq!(heights, vec![10, 20, 30]);
    }
}
