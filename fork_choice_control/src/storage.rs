use std::sync::Arc;

use anyhow::{Context as _, Result};
use database::Database;
use derive_more::Display;
use fork_choice_store::{ApplyChanges, CheckpointKind, LatestMessage, PendingChanges, Store};
use itertools::Itertools as _;
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{Checkpoint, SignedBeaconBlock},
        primitives::{UnixSeconds, ValidatorIndex, H256},
    },
};

/// Persists the store in a [`Database`].
///
/// Every block and its post-state are stored under their block root.
/// Everything else is stored in a single [`StoreMetadata`] value.
#[derive(Clone)]
pub struct Storage {
    config: Arc<Config>,
    database: Arc<Database>,
}

impl Storage {
    #[must_use]
    pub const fn new(config: Arc<Config>, database: Arc<Database>) -> Self {
        Self { config, database }
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Writes the entire store, replacing any metadata already present.
    pub fn save_store(&self, store: &Store) -> Result<()> {
        let mut batch = self.database.batch();

        for chain_link in store.chain_links() {
            batch.put(
                BlockByRoot(chain_link.block_root).to_string(),
                serialize(&chain_link.block)?,
            );
            batch.put(
                StateByBlockRoot(chain_link.block_root).to_string(),
                serialize(&chain_link.state)?,
            );
        }

        batch.put(StoreMetadata::KEY, serialize(&StoreMetadata::from(store))?);

        self.database.commit_batch(batch)?;

        info!("store saved ({} blocks)", store.len());

        Ok(())
    }

    /// Writes the effects of one commit in a single batch.
    pub fn append(&self, store: &Store, changes: &ApplyChanges) -> Result<()> {
        let mut batch = self.database.batch();

        for chain_link in &changes.new_blocks {
            batch.put(
                BlockByRoot(chain_link.block_root).to_string(),
                serialize(&chain_link.block)?,
            );
            batch.put(
                StateByBlockRoot(chain_link.block_root).to_string(),
                serialize(&chain_link.state)?,
            );
        }

        for block_root in &changes.pruned_roots {
            batch.delete(BlockByRoot(*block_root).to_string());
            batch.delete(StateByBlockRoot(*block_root).to_string());
        }

        batch.put(StoreMetadata::KEY, serialize(&StoreMetadata::from(store))?);

        debug!(
            "persisting {} new blocks and {} deletions",
            changes.new_blocks.len(),
            changes.pruned_roots.len(),
        );

        self.database.commit_batch(batch)
    }

    /// Rebuilds a store saved by [`Storage::save_store`] and [`Storage::append`].
    ///
    /// Returns `None` if the database does not contain a store.
    pub fn load(&self) -> Result<Option<Store>> {
        let Some(metadata) = self.get::<StoreMetadata>(StoreMetadata::KEY)? else {
            return Ok(None);
        };

        let finalized_root = metadata.finalized_checkpoint.root;
        let anchor_block = self.block_by_root(finalized_root)?;
        let anchor_state = self.state_by_block_root(finalized_root)?;

        let mut store = Store::with_anchor_checkpoint(
            Arc::clone(&self.config),
            anchor_block,
            anchor_state,
            metadata.finalized_checkpoint,
        );

        let descendants = self
            .database
            .iterate_prefix(BlockByRoot::PREFIX)?
            .map(|result| {
                let (_, value_bytes) = result?;
                deserialize::<SignedBeaconBlock>(&value_bytes)
            })
            .filter_ok(|block| block.block_root() != finalized_root)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted_by_key(|block| block.message.slot);

        let mut changes = PendingChanges::default();

        for block in descendants {
            let state = self.state_by_block_root(block.block_root())?;
            changes.put_block_and_state(Arc::new(block), state);
        }

        changes.set_time(metadata.time);
        changes.set_checkpoint(CheckpointKind::Justified, metadata.justified_checkpoint);
        changes.set_checkpoint(
            CheckpointKind::BestJustified,
            metadata.best_justified_checkpoint,
        );

        for (validator_index, message) in metadata.latest_messages {
            changes.put_vote(validator_index, message);
        }

        store.apply_pending_changes(changes)?;

        info!(
            "store loaded from database (blocks: {}, finalized checkpoint: {:?})",
            store.len(),
            store.finalized_checkpoint(),
        );

        Ok(Some(store))
    }

    pub fn contains_block(&self, block_root: H256) -> Result<bool> {
        self.database
            .contains_key(BlockByRoot(block_root).to_string())
    }

    fn block_by_root(&self, block_root: H256) -> Result<Arc<SignedBeaconBlock>> {
        self.get(BlockByRoot(block_root))?
            .map(Arc::new)
            .ok_or(Error::BlockNotFound { block_root })
            .map_err(Into::into)
    }

    fn state_by_block_root(&self, block_root: H256) -> Result<Arc<BeaconState>> {
        self.get(StateByBlockRoot(block_root))?
            .map(Arc::new)
            .ok_or(Error::StateNotFound { block_root })
            .map_err(Into::into)
    }

    fn get<V: DeserializeOwned>(&self, key: impl core::fmt::Display) -> Result<Option<V>> {
        let key_string = key.to_string();

        self.database
            .get(&key_string)?
            .map(|value_bytes| {
                deserialize(&value_bytes).with_context(|| format!("failed to decode {key_string}"))
            })
            .transpose()
    }
}

/// Everything in a [`Store`] other than blocks and states.
#[derive(PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreMetadata {
    pub genesis_time: UnixSeconds,
    pub time: UnixSeconds,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub best_justified_checkpoint: Checkpoint,
    pub latest_messages: Vec<(ValidatorIndex, LatestMessage)>,
}

impl From<&Store> for StoreMetadata {
    fn from(store: &Store) -> Self {
        Self {
            genesis_time: store.genesis_time(),
            time: store.time(),
            justified_checkpoint: store.justified_checkpoint(),
            finalized_checkpoint: store.finalized_checkpoint(),
            best_justified_checkpoint: store.best_justified_checkpoint(),
            latest_messages: store.latest_messages().collect(),
        }
    }
}

impl StoreMetadata {
    const KEY: &'static str = "meta";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct BlockByRoot(pub H256);

impl BlockByRoot {
    const PREFIX: &'static str = "b";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct StateByBlockRoot(pub H256);

impl StateByBlockRoot {
    const PREFIX: &'static str = "s";
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("block {block_root:?} not found in database")]
    BlockNotFound { block_root: H256 },
    #[error("state for block {block_root:?} not found in database")]
    StateNotFound { block_root: H256 },
}

fn serialize(value: &impl Serialize) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(Into::into)
}

fn deserialize<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use database::DatabaseMode;
    use types::phase0::containers::BeaconBlock;

    use super::*;

    fn genesis_store() -> Store {
        let state = Arc::new(BeaconState {
            genesis_time: 100,
            ..BeaconState::default()
        });

        let block = Arc::new(BeaconBlock::default().with_zero_signature());

        Store::new(Arc::new(Config::minimal()), block, state)
    }

    #[test]
    fn keys_are_prefixed_hex_roots() {
        let root = H256::repeat_byte(0xab);

        assert_eq!(
            BlockByRoot(root).to_string(),
            format!("b{}", "ab".repeat(32)),
        );
        assert!(StateByBlockRoot(root).to_string().starts_with('s'));
    }

    #[test]
    fn empty_database_contains_no_store() -> Result<()> {
        let storage = Storage::new(
            Arc::new(Config::minimal()),
            Arc::new(Database::in_memory()),
        );

        assert!(storage.load()?.is_none());

        Ok(())
    }

    #[test]
    fn saved_store_can_be_loaded() -> Result<()> {
        let store = genesis_store();
        let database = Arc::new(Database::in_memory());
        let storage = Storage::new(Arc::new(Config::minimal()), database);

        storage.save_store(&store)?;

        let loaded = storage.load()?.expect("store was saved");

        assert_eq!(StoreMetadata::from(&loaded), StoreMetadata::from(&store));
        assert_eq!(loaded.head_root(), store.head_root());
        assert!(storage.contains_block(store.head_root())?);

        Ok(())
    }

    #[test]
    fn read_only_database_rejects_save() -> Result<()> {
        let database = Arc::new(Database::in_memory().reopen(DatabaseMode::ReadOnly));
        let storage = Storage::new(Arc::new(Config::minimal()), database);

        assert!(storage.save_store(&genesis_store()).is_err());
        assert!(storage.load()?.is_none());

        Ok(())
    }
}
