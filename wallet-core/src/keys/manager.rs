//! The key manager: in-memory derivation state, ownership detection, and
//! the password state machine.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use bip39::Mnemonic;
use bitcoin_hashes::{sha256, Hash, HashEngine};
use blsct::{
    AmountRecoveryRequest, BlsctPrimitives, HashId, PublicKey, RangeProof,
    Scalar, SubAddress, SubAddressId, TokenId, ViewTag,
};
use tracing::debug;
use zeroize::Zeroize;

use crate::envelope::{EnvelopeKey, SealedBlob};
use crate::error::WalletError;
use crate::keys::hd::{self, DerivedKeys, HdChain};
use crate::keys::material::{
    AddressPool, KeyMaterial, KeyMetadata, MASTER_SEED_KEY, MNEMONIC_KEY,
};
use crate::keys::{
    encode_sub_address, ACCOUNT_CHANGE, ACCOUNT_RECEIVE, ACCOUNT_STAKING,
    POOL_LOOKAHEAD,
};
use crate::rng::{Crng, OsRng};
use crate::store::records::{EncryptionMeta, WalletOutput};
use crate::unix_timestamp;

/// An output as reported by the indexer, in scan order.
#[derive(Clone, Debug)]
pub struct OutputCandidate {
    pub blinding_key: PublicKey,
    pub spending_key: PublicKey,
    pub view_tag: ViewTag,
    pub range_proof: RangeProof,
    pub token_id: TokenId,
}

/// The outcome of a batched amount recovery over scan candidates.
/// `indices[i]` is the candidate position whose hidden amount is
/// `amounts[i]` with attached memo `memos[i]`.
#[derive(Clone, Debug, Default)]
pub struct RecoveredOutputs {
    pub success: bool,
    pub indices: Vec<usize>,
    pub amounts: Vec<u64>,
    pub memos: Vec<String>,
}

/// Secrets only present while the wallet is unlocked (or has no password).
struct UnlockedSecrets {
    seed: Scalar,
    blinding_key: Scalar,
    token_key: Scalar,
    spend_key: Scalar,
    mnemonic: Option<String>,
}

struct EncryptionState {
    meta: EncryptionMeta,
    /// The cached Argon2id-derived key; dropped on lock.
    key: Option<EnvelopeKey>,
}

struct KeyState {
    hd_chain: HdChain,
    view_key: Scalar,
    spend_pk: PublicKey,
    secrets: Option<UnlockedSecrets>,
    /// `None` until a password is set.
    encryption: Option<EncryptionState>,
    registry: BTreeMap<HashId, SubAddressId>,
    pools: BTreeMap<i64, AddressPool>,
    /// out-id hex → derived private spending key. Wiped on lock; the
    /// sealed counterpart below survives.
    out_keys: BTreeMap<String, Scalar>,
    crypted_keys: BTreeMap<String, SealedBlob>,
    crypted_out_keys: BTreeMap<String, SealedBlob>,
    key_metadata: BTreeMap<String, KeyMetadata>,
}

/// Hierarchical-deterministic key manager.
///
/// All methods take `&self`; interior state is behind an [`RwLock`] so
/// the scanner can run ownership checks concurrently with balance
/// queries, while mutations (new sub-address, lock/unlock) serialize.
pub struct KeyManager {
    primitives: Arc<dyn BlsctPrimitives>,
    state: RwLock<KeyState>,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager").finish_non_exhaustive()
    }
}

impl KeyManager {
    // --- construction --- //

    /// Create a brand-new wallet with a fresh 24-word mnemonic.
    pub fn generate<R: Crng>(
        primitives: Arc<dyn BlsctPrimitives>,
        rng: &mut R,
    ) -> Self {
        let mut entropy = [0u8; 32];
        rng.fill_bytes(&mut entropy);
        let mnemonic = Mnemonic::from_entropy(&entropy)
            .expect("32-byte entropy is a valid BIP-39 strength");
        let seed = hd::seed_from_mnemonic(&mnemonic);
        Self::bootstrap(primitives, seed, Some(mnemonic.to_string()))
    }

    /// Deterministically restore from a BIP-39 phrase.
    pub fn restore_from_mnemonic(
        primitives: Arc<dyn BlsctPrimitives>,
        phrase: &str,
    ) -> Result<Self, WalletError> {
        let mnemonic = Mnemonic::from_str(phrase)
            .map_err(|_| WalletError::InvalidMnemonic)?;
        let seed = hd::seed_from_mnemonic(&mnemonic);
        Ok(Self::bootstrap(primitives, seed, Some(mnemonic.to_string())))
    }

    /// Deterministically restore from a 32-byte hex seed.
    pub fn restore_from_seed(
        primitives: Arc<dyn BlsctPrimitives>,
        seed_hex: &str,
    ) -> Result<Self, WalletError> {
        let seed = Scalar::from_str(seed_hex)
            .map_err(|_| WalletError::InvalidMnemonic)?;
        Ok(Self::bootstrap(primitives, seed, None))
    }

    fn bootstrap(
        primitives: Arc<dyn BlsctPrimitives>,
        seed: Scalar,
        mnemonic: Option<String>,
    ) -> Self {
        let keys = hd::derive_keys(primitives.as_ref(), seed);
        let hd_chain = HdChain::from_keys(primitives.as_ref(), &keys);

        let now = unix_timestamp();
        let mut key_metadata = BTreeMap::new();
        for key_id in [
            &hd_chain.seed_id,
            &hd_chain.spend_id,
            &hd_chain.view_id,
            &hd_chain.token_id,
            &hd_chain.blinding_id,
        ] {
            key_metadata.insert(
                key_id.to_hex(),
                KeyMetadata {
                    version: hd_chain.version,
                    create_time: now,
                },
            );
        }

        let DerivedKeys {
            seed,
            blinding_key,
            token_key,
            view_key,
            spend_key,
            spend_pk,
        } = keys;

        let manager = Self {
            primitives,
            state: RwLock::new(KeyState {
                hd_chain,
                view_key,
                spend_pk,
                secrets: Some(UnlockedSecrets {
                    seed,
                    blinding_key,
                    token_key,
                    spend_key,
                    mnemonic,
                }),
                encryption: None,
                registry: BTreeMap::new(),
                pools: BTreeMap::new(),
                out_keys: BTreeMap::new(),
                crypted_keys: BTreeMap::new(),
                crypted_out_keys: BTreeMap::new(),
                key_metadata,
            }),
        };

        for account in [ACCOUNT_RECEIVE, ACCOUNT_CHANGE, ACCOUNT_STAKING] {
            manager.ensure_pool(account, POOL_LOOKAHEAD);
        }
        manager
    }

    // --- sub-addresses --- //

    /// The deterministic sub-address for `id`; a pure function of the
    /// chain root, available even while locked.
    pub fn get_sub_address(&self, id: SubAddressId) -> SubAddress {
        let state = self.state.read().unwrap();
        self.primitives.derive_sub_address(
            &state.view_key,
            &state.spend_pk,
            id,
        )
    }

    /// The bech32m string form of [`Self::get_sub_address`].
    pub fn get_address_string(&self, id: SubAddressId) -> String {
        encode_sub_address(&self.get_sub_address(id))
    }

    /// Hand out the next unused sub-address for `account`, moving its
    /// index out of the pool and topping the pool back up.
    pub fn new_sub_address(
        &self,
        account: i64,
    ) -> (SubAddressId, SubAddress) {
        let id = {
            let mut state = self.state.write().unwrap();
            let pool = state.pools.entry(account).or_default();
            let index = match pool.pool.pop_first() {
                Some(index) => index,
                None => {
                    let index = pool.next_index;
                    pool.next_index += 1;
                    index
                }
            };
            let id = SubAddressId::new(account, index);
            let hash_id = self.register_locked(&mut state, id);
            debug!(%id, %hash_id, "issued sub-address");
            id
        };
        self.ensure_pool(account, POOL_LOOKAHEAD);
        (id, self.get_sub_address(id))
    }

    /// Pre-commit registry entries for the next `lookahead` indices of
    /// `account`, so scanning detects payments to addresses that have not
    /// been handed out yet.
    pub fn ensure_pool(&self, account: i64, lookahead: u64) {
        let mut state = self.state.write().unwrap();
        loop {
            let pool = state.pools.entry(account).or_default();
            if pool.pool.len() as u64 >= lookahead {
                break;
            }
            let index = pool.next_index;
            pool.next_index += 1;
            pool.pool.insert(index);
            self.register_locked(
                &mut state,
                SubAddressId::new(account, index),
            );
        }
    }

    /// Derive and register the hash id for `id`. Caller holds the lock.
    fn register_locked(
        &self,
        state: &mut KeyState,
        id: SubAddressId,
    ) -> HashId {
        let sub_address = self.primitives.derive_sub_address(
            &state.view_key,
            &state.spend_pk,
            id,
        );
        let hash_id = HashId::hash160(sub_address.spending_key.as_bytes());
        state.registry.insert(hash_id, id);
        hash_id
    }

    // --- ownership detection --- //

    /// Whether an output belongs to this wallet.
    ///
    /// Fast path: recompute the 16-bit view tag from `(blindingKey,
    /// viewKey)`; a mismatch rejects immediately, which eliminates all but
    /// ~1/65536 of foreign outputs. Slow path: recompute the 20-byte hash
    /// id and look it up in the sub-address registry.
    ///
    /// Never fails; anything unexpected reads as "not mine".
    pub fn is_mine(
        &self,
        blinding_key: &PublicKey,
        spending_key: &PublicKey,
        view_tag: ViewTag,
    ) -> bool {
        let state = self.state.read().unwrap();
        if self.primitives.view_tag(blinding_key, &state.view_key)
            != view_tag
        {
            return false;
        }
        let hash_id = self.primitives.hash_id(
            blinding_key,
            spending_key,
            &state.view_key,
        );
        state.registry.contains_key(&hash_id)
    }

    /// Recover hidden amounts for the candidates that pass the view-tag
    /// filter. Candidates whose range proof fails to open with the
    /// derived nonce are skipped, never claimed.
    pub fn recover_outputs(
        &self,
        candidates: &[OutputCandidate],
    ) -> RecoveredOutputs {
        let state = self.state.read().unwrap();

        let requests: Vec<AmountRecoveryRequest> = candidates
            .iter()
            .enumerate()
            .filter(|(_index, candidate)| {
                self.primitives
                    .view_tag(&candidate.blinding_key, &state.view_key)
                    == candidate.view_tag
            })
            .map(|(index, candidate)| AmountRecoveryRequest {
                range_proof: candidate.range_proof.clone(),
                token_id: candidate.token_id,
                nonce: self
                    .primitives
                    .calc_nonce(&candidate.blinding_key, &state.view_key),
                index,
            })
            .collect();

        let mut recovered = RecoveredOutputs {
            success: true,
            ..Default::default()
        };
        for entry in self.primitives.recover_amounts(&requests) {
            recovered.indices.push(entry.index);
            recovered.amounts.push(entry.amount);
            recovered.memos.push(entry.memo);
        }
        recovered
    }

    // --- spending keys --- //

    /// Derive the private spending key for an owned output. Fails with
    /// [`WalletError::WalletLocked`] when locked and
    /// [`WalletError::UnknownOutput`] when the output's hash id is not in
    /// the registry.
    pub fn get_spending_key_for_output(
        &self,
        output: &WalletOutput,
    ) -> Result<Scalar, WalletError> {
        let state = self.state.read().unwrap();
        let secrets =
            state.secrets.as_ref().ok_or(WalletError::WalletLocked)?;
        let (blinding_key, id) = self.resolve_output(&state, output)?;
        Ok(self.primitives.calc_priv_spending_key(
            &blinding_key,
            &state.view_key,
            &secrets.spend_key,
            id.account,
            id.address,
        ))
    }

    /// Like [`Self::get_spending_key_for_output`], but consults and
    /// populates the out-key cache so repeated spends of the same output
    /// do not re-derive.
    pub fn get_spending_key_for_output_with_cache(
        &self,
        output: &WalletOutput,
    ) -> Result<Scalar, WalletError> {
        let mut state = self.state.write().unwrap();
        if state.secrets.is_none() {
            return Err(WalletError::WalletLocked);
        }
        let (blinding_key, id) = self.resolve_output(&state, output)?;

        let secrets = state.secrets.as_ref().expect("checked above");
        let out_id = out_id_hex(
            &blinding_key,
            &state.view_key,
            &secrets.spend_key,
            id,
        );
        if let Some(cached) = state.out_keys.get(&out_id) {
            return Ok(cached.clone());
        }

        let key = self.primitives.calc_priv_spending_key(
            &blinding_key,
            &state.view_key,
            &secrets.spend_key,
            id.account,
            id.address,
        );
        state.out_keys.insert(out_id.clone(), key.clone());

        // Mirror new cache entries into their sealed form so they survive
        // a lock/unlock cycle.
        if let Some(encryption) = &state.encryption {
            if let Some(envelope_key) = &encryption.key {
                let sealed = envelope_key
                    .seal(&mut OsRng, key.expose_bytes().as_slice())?;
                state.crypted_out_keys.insert(out_id, sealed);
            }
        }
        Ok(key)
    }

    /// Map an output's on-chain key pair back to its sub-address id,
    /// verifying the registry entry still re-derives to the same hash.
    fn resolve_output(
        &self,
        state: &KeyState,
        output: &WalletOutput,
    ) -> Result<(PublicKey, SubAddressId), WalletError> {
        let blinding_key = PublicKey::from_str(&output.blinding_key)
            .map_err(|_| {
                WalletError::UnknownOutput(output.output_hash.clone())
            })?;
        let spending_key = PublicKey::from_str(&output.spending_key)
            .map_err(|_| {
                WalletError::UnknownOutput(output.output_hash.clone())
            })?;

        let hash_id = self.primitives.hash_id(
            &blinding_key,
            &spending_key,
            &state.view_key,
        );
        let id = *state.registry.get(&hash_id).ok_or_else(|| {
            WalletError::UnknownOutput(output.output_hash.clone())
        })?;

        let rederived = self.primitives.derive_sub_address(
            &state.view_key,
            &state.spend_pk,
            id,
        );
        if HashId::hash160(rederived.spending_key.as_bytes()) != hash_id {
            return Err(WalletError::OwnershipMismatch(
                output.output_hash.clone(),
            ));
        }
        Ok((blinding_key, id))
    }

    // --- password state machine --- //

    pub fn is_encrypted(&self) -> bool {
        self.state.read().unwrap().encryption.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.state.read().unwrap().secrets.is_none()
    }

    /// Transition `Plain → Unlocked(encrypted)`: derive an envelope key
    /// from `password` and re-wrap every secret. Returns the metadata and
    /// key the store needs to encrypt the snapshot itself.
    pub fn set_password<R: Crng>(
        &self,
        rng: &mut R,
        password: &str,
    ) -> Result<(EncryptionMeta, EnvelopeKey), WalletError> {
        let mut state = self.state.write().unwrap();
        if state.secrets.is_none() {
            return Err(WalletError::WalletLocked);
        }

        let envelope_key = EnvelopeKey::generate(rng, password)?;
        let meta = EncryptionMeta::new(&envelope_key);

        let mut crypted_keys = BTreeMap::new();
        let mut crypted_out_keys = BTreeMap::new();
        {
            let secrets = state.secrets.as_ref().expect("checked above");
            crypted_keys.insert(
                MASTER_SEED_KEY.to_owned(),
                envelope_key
                    .seal(rng, secrets.seed.expose_bytes().as_slice())?,
            );
            if let Some(mnemonic) = &secrets.mnemonic {
                crypted_keys.insert(
                    MNEMONIC_KEY.to_owned(),
                    envelope_key.seal(rng, mnemonic.as_bytes())?,
                );
            }
            for (out_id, key) in &state.out_keys {
                crypted_out_keys.insert(
                    out_id.clone(),
                    envelope_key
                        .seal(rng, key.expose_bytes().as_slice())?,
                );
            }
        }

        state.crypted_keys = crypted_keys;
        state.crypted_out_keys = crypted_out_keys;
        // The store gets its own copy of the key for snapshot encryption.
        let store_key = envelope_key.clone();
        state.encryption = Some(EncryptionState {
            meta: meta.clone(),
            key: Some(envelope_key),
        });
        Ok((meta, store_key))
    }

    /// Transition `Unlocked(encrypted) → Locked`: wipe secret scalars and
    /// the plaintext out-key cache from memory. No effect until a
    /// password has been set.
    pub fn lock(&self) {
        let mut state = self.state.write().unwrap();
        let Some(encryption) = &mut state.encryption else {
            return;
        };
        encryption.key = None;
        state.secrets = None;
        state.out_keys.clear();
    }

    /// Attempt `Locked → Unlocked(encrypted)`. Returns `false` (staying
    /// locked) on a wrong password.
    pub fn unlock(&self, password: &str) -> Result<bool, WalletError> {
        let mut state = self.state.write().unwrap();
        let Some(encryption) = &state.encryption else {
            // No password set: the wallet was never locked.
            return Ok(true);
        };

        let envelope_key =
            EnvelopeKey::derive(password, &encryption.meta.salt)?;
        if !envelope_key.verifies(&encryption.meta.verification_hash) {
            return Ok(false);
        }

        let sealed_seed = state
            .crypted_keys
            .get(MASTER_SEED_KEY)
            .ok_or_else(|| {
                WalletError::StoreCorrupt(
                    "encrypted wallet has no sealed master seed".to_owned(),
                )
            })?;
        let mut seed_bytes = envelope_key.open(sealed_seed)?;
        let seed_array = <[u8; 32]>::try_from(seed_bytes.as_slice())
            .map_err(|_| {
                WalletError::StoreCorrupt(
                    "sealed master seed has wrong length".to_owned(),
                )
            })?;
        seed_bytes.zeroize();
        let seed = Scalar::new(seed_array);

        let mnemonic = match state.crypted_keys.get(MNEMONIC_KEY) {
            Some(sealed) => Some(
                String::from_utf8(envelope_key.open(sealed)?).map_err(
                    |_| {
                        WalletError::StoreCorrupt(
                            "sealed mnemonic is not utf-8".to_owned(),
                        )
                    },
                )?,
            ),
            None => None,
        };

        let keys = hd::derive_keys(self.primitives.as_ref(), seed);

        // Warm the out-key cache back up from its sealed mirror.
        let mut out_keys = BTreeMap::new();
        for (out_id, sealed) in &state.crypted_out_keys {
            let mut bytes = envelope_key.open(sealed)?;
            let key = <[u8; 32]>::try_from(bytes.as_slice()).map_err(
                |_| {
                    WalletError::StoreCorrupt(
                        "sealed out key has wrong length".to_owned(),
                    )
                },
            )?;
            bytes.zeroize();
            out_keys.insert(out_id.clone(), Scalar::new(key));
        }

        state.secrets = Some(UnlockedSecrets {
            seed: keys.seed,
            blinding_key: keys.blinding_key,
            token_key: keys.token_key,
            spend_key: keys.spend_key,
            mnemonic,
        });
        state.out_keys = out_keys;
        state
            .encryption
            .as_mut()
            .expect("checked above")
            .key = Some(envelope_key);
        Ok(true)
    }

    /// The wallet's recovery phrase, if it has one.
    pub fn get_mnemonic(&self) -> Result<Option<String>, WalletError> {
        let state = self.state.read().unwrap();
        let secrets =
            state.secrets.as_ref().ok_or(WalletError::WalletLocked)?;
        Ok(secrets.mnemonic.clone())
    }

    // --- persistence projection --- //

    /// Snapshot the persistent projection for the store.
    pub fn to_material(&self) -> KeyMaterial {
        let state = self.state.read().unwrap();
        let encrypted = state.encryption.is_some();

        let mut keys = BTreeMap::new();
        let mut mnemonic = None;
        if !encrypted {
            if let Some(secrets) = &state.secrets {
                keys.insert(
                    MASTER_SEED_KEY.to_owned(),
                    secrets.seed.clone(),
                );
                mnemonic.clone_from(&secrets.mnemonic);
            }
        }

        KeyMaterial {
            hd_chain: state.hd_chain.clone(),
            view_key: state.view_key.clone(),
            spend_public_key: state.spend_pk,
            keys,
            mnemonic,
            crypted_keys: state.crypted_keys.clone(),
            out_keys: if encrypted {
                BTreeMap::new()
            } else {
                state.out_keys.clone()
            },
            crypted_out_keys: state.crypted_out_keys.clone(),
            sub_addresses: state.registry.clone(),
            pools: state.pools.clone(),
            key_metadata: state.key_metadata.clone(),
        }
    }

    /// Reconstruct a manager from its persisted projection. With no
    /// plaintext master seed present, the wallet comes up locked.
    pub fn from_material(
        primitives: Arc<dyn BlsctPrimitives>,
        material: KeyMaterial,
        encryption: Option<EncryptionMeta>,
    ) -> Self {
        let secrets = material.keys.get(MASTER_SEED_KEY).map(|seed| {
            let keys =
                hd::derive_keys(primitives.as_ref(), seed.clone());
            UnlockedSecrets {
                seed: keys.seed,
                blinding_key: keys.blinding_key,
                token_key: keys.token_key,
                spend_key: keys.spend_key,
                mnemonic: material.mnemonic.clone(),
            }
        });

        Self {
            primitives,
            state: RwLock::new(KeyState {
                hd_chain: material.hd_chain,
                view_key: material.view_key,
                spend_pk: material.spend_public_key,
                secrets,
                encryption: encryption
                    .map(|meta| EncryptionState { meta, key: None }),
                registry: material.sub_addresses,
                pools: material.pools,
                out_keys: material.out_keys,
                crypted_keys: material.crypted_keys,
                crypted_out_keys: material.crypted_out_keys,
                key_metadata: material.key_metadata,
            }),
        }
    }

    /// The wallet's token key, used when minting or spending non-default
    /// tokens.
    pub fn token_key(&self) -> Result<Scalar, WalletError> {
        let state = self.state.read().unwrap();
        let secrets =
            state.secrets.as_ref().ok_or(WalletError::WalletLocked)?;
        Ok(secrets.token_key.clone())
    }

    /// The wallet's blinding root key, handed to the BLSCT library when
    /// building transactions.
    pub fn blinding_key(&self) -> Result<Scalar, WalletError> {
        let state = self.state.read().unwrap();
        let secrets =
            state.secrets.as_ref().ok_or(WalletError::WalletLocked)?;
        Ok(secrets.blinding_key.clone())
    }

    pub fn hd_chain(&self) -> HdChain {
        self.state.read().unwrap().hd_chain.clone()
    }
}

/// `outId = SHA-256(blindingKey ‖ viewScalar ‖ spendScalar ‖ account_le64
/// ‖ address_le64)`, the out-key cache key.
fn out_id_hex(
    blinding_key: &PublicKey,
    view_key: &Scalar,
    spend_key: &Scalar,
    id: SubAddressId,
) -> String {
    let mut engine = sha256::Hash::engine();
    engine.input(blinding_key.as_bytes());
    engine.input(view_key.expose_bytes());
    engine.input(spend_key.expose_bytes());
    engine.input(&id.account.to_le_bytes());
    engine.input(&id.address.to_le_bytes());
    hex::encode(sha256::Hash::from_engine(engine).to_byte_array())
}
