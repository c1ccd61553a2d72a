use core::mem;
use std::sync::Arc;

use anyhow::{ensure, Result};
use helper_functions::misc;
use im::{HashMap, OrdMap};
use itertools::Itertools as _;
use log::{debug, error, info};
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{Checkpoint, SignedBeaconBlock},
        primitives::{Slot, UnixSeconds, ValidatorIndex, H256},
    },
};

use crate::{
    error::{Error, Invariant},
    misc::{ApplyChanges, ChainLink, CheckpointKind, LatestMessage},
    pending_changes::{PendingChange, PendingChanges},
    proto_array::ProtoArray,
};

/// The committed state of fork choice.
///
/// Cloning a [`Store`] is cheap. All collections in it are persistent.
#[derive(Clone, Debug)]
pub struct Store {
    config: Arc<Config>,
    genesis_time: UnixSeconds,
    time: UnixSeconds,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    best_justified_checkpoint: Checkpoint,
    blocks: HashMap<H256, ChainLink>,
    proto_array: ProtoArray,
    latest_messages: OrdMap<ValidatorIndex, LatestMessage>,
    head_root: H256,
}

impl Store {
    /// Creates a store containing only `anchor_block`.
    ///
    /// All checkpoints are set to the anchor block at the epoch of its slot.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        anchor_block: Arc<SignedBeaconBlock>,
        anchor_state: Arc<BeaconState>,
    ) -> Self {
        let checkpoint = Checkpoint {
            epoch: misc::compute_epoch_at_slot(&config, anchor_block.message.slot),
            root: anchor_block.block_root(),
        };

        Self::with_anchor_checkpoint(config, anchor_block, anchor_state, checkpoint)
    }

    /// Creates a store containing only `anchor_block` with all checkpoints set to `checkpoint`.
    ///
    /// Used when resuming from storage, where the finalized epoch may be later than the epoch of
    /// the finalized block.
    #[must_use]
    pub fn with_anchor_checkpoint(
        config: Arc<Config>,
        anchor_block: Arc<SignedBeaconBlock>,
        anchor_state: Arc<BeaconState>,
        checkpoint: Checkpoint,
    ) -> Self {
        let genesis_time = anchor_state.genesis_time;
        let time =
            misc::compute_timestamp_at_slot(&config, genesis_time, anchor_block.message.slot);
        let anchor = ChainLink::new(anchor_block, anchor_state);
        let block_root = anchor.block_root;

        let mut proto_array = ProtoArray::default();

        proto_array
            .on_block(
                block_root,
                anchor.parent_root(),
                anchor.slot(),
                checkpoint,
                checkpoint,
            )
            .expect("an empty proto-array accepts any block as the anchor");

        Self {
            config,
            genesis_time,
            time,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            best_justified_checkpoint: checkpoint,
            blocks: HashMap::unit(block_root, anchor),
            proto_array,
            latest_messages: OrdMap::new(),
            head_root: block_root,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn genesis_time(&self) -> UnixSeconds {
        self.genesis_time
    }

    #[must_use]
    pub const fn time(&self) -> UnixSeconds {
        self.time
    }

    #[must_use]
    pub fn current_slot(&self) -> Slot {
        misc::slot_at_time(&self.config, self.genesis_time, self.time)
    }

    #[must_use]
    pub const fn checkpoint(&self, kind: CheckpointKind) -> Checkpoint {
        match kind {
            CheckpointKind::Justified => self.justified_checkpoint,
            CheckpointKind::Finalized => self.finalized_checkpoint,
            CheckpointKind::BestJustified => self.best_justified_checkpoint,
        }
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub const fn best_justified_checkpoint(&self) -> Checkpoint {
        self.best_justified_checkpoint
    }

    #[must_use]
    pub const fn head_root(&self) -> H256 {
        self.head_root
    }

    #[must_use]
    pub fn head(&self) -> &ChainLink {
        self.blocks
            .get(&self.head_root)
            .expect("the head is always a block in the store")
    }

    #[must_use]
    pub fn finalized_chain_link(&self) -> &ChainLink {
        self.blocks
            .get(&self.finalized_checkpoint.root)
            .expect("the finalized block is always in the store")
    }

    #[must_use]
    pub fn chain_link(&self, block_root: H256) -> Option<&ChainLink> {
        self.blocks.get(&block_root)
    }

    #[must_use]
    pub fn contains_block(&self, block_root: H256) -> bool {
        self.blocks.contains_key(&block_root)
    }

    /// Blocks from the head back to the finalized block.
    pub fn canonical_chain(&self) -> impl Iterator<Item = &ChainLink> {
        core::iter::successors(Some(self.head()), |chain_link| {
            self.chain_link(chain_link.parent_root())
        })
    }

    /// All blocks in the store in the order they were inserted.
    ///
    /// Parents come before their children.
    pub fn chain_links(&self) -> impl Iterator<Item = &ChainLink> {
        self.proto_array
            .nodes()
            .filter_map(|node| self.chain_link(node.root))
    }

    /// The canonical block proposed exactly at `slot`.
    #[must_use]
    pub fn block_at_slot(&self, slot: Slot) -> Option<&ChainLink> {
        self.canonical_chain()
            .skip_while(|chain_link| chain_link.slot() > slot)
            .take_while(|chain_link| chain_link.slot() == slot)
            .next()
    }

    /// The canonical block in effect at `slot`.
    ///
    /// That is the latest canonical block with a slot not later than `slot`.
    /// Returns `None` for slots before the finalized block.
    #[must_use]
    pub fn state_at_slot(&self, slot: Slot) -> Option<&ChainLink> {
        self.canonical_chain()
            .find(|chain_link| chain_link.slot() <= slot)
    }

    #[must_use]
    pub fn is_slot_finalized(&self, slot: Slot) -> bool {
        slot <= misc::compute_start_slot_at_epoch(&self.config, self.finalized_checkpoint.epoch)
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.latest_messages.get(&validator_index).copied()
    }

    pub fn latest_messages(&self) -> impl Iterator<Item = (ValidatorIndex, LatestMessage)> + '_ {
        self.latest_messages
            .iter()
            .map(|(validator_index, message)| (*validator_index, *message))
    }

    #[must_use]
    pub const fn proto_array(&self) -> &ProtoArray {
        &self.proto_array
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn slot_time(&self, slot: Slot) -> UnixSeconds {
        misc::compute_timestamp_at_slot(&self.config, self.genesis_time, slot)
    }

    /// Applies all `changes` in order or none of them.
    ///
    /// Validation errors leave `self` unchanged. Errors for which [`Error::is_fatal`] returns
    /// `true` also leave `self` unchanged but mean that the changes would have corrupted it.
    pub fn apply_pending_changes(&mut self, changes: PendingChanges) -> Result<ApplyChanges> {
        let mut store = self.clone();
        let apply_changes = store.apply_in_place(changes)?;
        *self = store;
        Ok(apply_changes)
    }

    /// Checks that the store is internally consistent.
    pub fn check_invariants(&self) -> Result<()> {
        let justified = self.justified_checkpoint;
        let finalized = self.finalized_checkpoint;

        Self::ensure_invariant(
            finalized.epoch <= justified.epoch,
            Invariant::FinalizedNotAheadOfJustified,
        )?;

        for kind in [
            CheckpointKind::Justified,
            CheckpointKind::Finalized,
            CheckpointKind::BestJustified,
        ] {
            Self::ensure_invariant(
                self.contains_block(self.checkpoint(kind).root),
                Invariant::CheckpointRootKnown(kind),
            )?;
        }

        Self::ensure_invariant(self.contains_block(self.head_root), Invariant::HeadKnown)?;

        Self::ensure_invariant(
            self.proto_array.is_descendant(justified.root, self.head_root),
            Invariant::HeadDescendsFromJustified,
        )?;

        Self::ensure_invariant(
            self.proto_array
                .node(finalized.root)
                .is_some_and(|node| node.parent.is_none()),
            Invariant::FinalizedBlockIsRoot,
        )?;

        Self::ensure_invariant(
            self.blocks.len() == self.proto_array.len()
                && self
                    .blocks
                    .keys()
                    .all(|root| self.proto_array.contains_block(*root)),
            Invariant::ProtoArrayMatchesBlocks,
        )?;

        Self::ensure_invariant(
            self.proto_array.parents_precede_children(),
            Invariant::ParentsPrecedeChildren,
        )?;

        Self::ensure_invariant(
            self.genesis_time <= self.time,
            Invariant::TimeNotBeforeGenesis,
        )
    }

    /// Removes every block that does not descend from the finalized block.
    ///
    /// Votes for removed blocks are removed with them.
    /// Returns the roots of removed blocks.
    pub fn prune_to_finalized(&mut self) -> Result<Vec<H256>> {
        let finalized_root = self.finalized_checkpoint.root;
        let pruned_roots = self.proto_array.prune(finalized_root)?;

        for root in &pruned_roots {
            self.blocks.remove(root);
        }

        let orphaned_voters = self
            .latest_messages
            .iter()
            .filter(|(_, message)| !self.proto_array.contains_block(message.root))
            .map(|(validator_index, _)| *validator_index)
            .collect_vec();

        for validator_index in orphaned_voters {
            self.latest_messages.remove(&validator_index);
        }

        if !self.proto_array.contains_block(self.head_root) {
            debug!("head {:?} was pruned", self.head_root);
            self.head_root = self.proto_array.find_head(self.justified_checkpoint.root)?;
        }

        if !pruned_roots.is_empty() {
            info!(
                "pruned {} blocks not descending from finalized block {finalized_root:?}",
                pruned_roots.len(),
            );
        }

        Ok(pruned_roots)
    }

    fn apply_in_place(&mut self, changes: PendingChanges) -> Result<ApplyChanges> {
        let old_head = self.head_root;
        let old_justified = self.justified_checkpoint;
        let old_finalized = self.finalized_checkpoint;

        let mut new_blocks = vec![];
        let mut votes_changed = false;
        let mut staged_checkpoints = vec![];

        for change in changes {
            match change {
                PendingChange::PutBlockAndState(chain_link) => {
                    if let Some(chain_link) = self.insert_block(chain_link)? {
                        new_blocks.push(chain_link);
                    }
                }
                PendingChange::SetTime(time) => self.advance_time(time),
                PendingChange::PutVote {
                    validator_index,
                    message,
                } => votes_changed |= self.insert_vote(validator_index, message)?,
                PendingChange::SetCheckpoint { kind, checkpoint } => {
                    staged_checkpoints.push((kind, checkpoint));
                }
            }
        }

        // Checkpoint roots may refer to blocks staged after them, so checkpoints are merged once
        // all blocks are in. Stale checkpoints must refer to known blocks too.
        for (kind, checkpoint) in staged_checkpoints {
            ensure!(
                self.contains_block(checkpoint.root),
                Error::UnknownCheckpointRoot { kind, checkpoint },
            );

            self.merge_checkpoint(kind, checkpoint)?;
        }

        let justified = self.justified_checkpoint;
        let finalized = self.finalized_checkpoint;

        ensure!(
            finalized.epoch <= justified.epoch,
            Error::FinalizedAheadOfJustified {
                justified,
                finalized,
            },
        );

        let finalized_checkpoint_updated = finalized.epoch > old_finalized.epoch;
        let justified_checkpoint_updated = justified != old_justified;

        let pruned_roots = if finalized_checkpoint_updated {
            for kind in [CheckpointKind::Justified, CheckpointKind::BestJustified] {
                let checkpoint = self.checkpoint(kind);

                ensure!(
                    self.proto_array.is_descendant(finalized.root, checkpoint.root),
                    Error::CheckpointNotDescendantOfFinalized {
                        kind,
                        checkpoint,
                        finalized_root: finalized.root,
                    },
                );
            }

            self.prune_to_finalized()?
        } else {
            vec![]
        };

        // Blocks that were pruned in the same step are not reported as new.
        new_blocks.retain(|chain_link| self.contains_block(chain_link.block_root));

        if !new_blocks.is_empty()
            || votes_changed
            || justified_checkpoint_updated
            || !pruned_roots.is_empty()
        {
            self.head_root = self.proto_array.find_head(justified.root)?;
        }

        if let Err(error) = self.check_invariants() {
            error!("changes would corrupt the store: {error}");
            return Err(error);
        }

        Ok(ApplyChanges {
            new_blocks,
            old_head,
            new_head: self.head_root,
            justified_checkpoint_updated,
            finalized_checkpoint_updated,
            pruned_roots,
        })
    }

    fn insert_block(&mut self, chain_link: ChainLink) -> Result<Option<ChainLink>> {
        let block_root = chain_link.block_root;

        if self.contains_block(block_root) {
            debug!("block {block_root:?} is already in the store");
            return Ok(None);
        }

        if let Some(parent) = self.blocks.get(&chain_link.parent_root()) {
            ensure!(
                chain_link.slot() > parent.slot(),
                Error::SlotNotAfterParent {
                    block_root,
                    slot: chain_link.slot(),
                    parent_slot: parent.slot(),
                },
            );
        }

        let is_new = self.proto_array.on_block(
            block_root,
            chain_link.parent_root(),
            chain_link.slot(),
            chain_link.state.current_justified_checkpoint,
            chain_link.state.finalized_checkpoint,
        )?;

        ensure!(
            is_new,
            Error::InvariantViolated {
                invariant: Invariant::ProtoArrayMatchesBlocks,
            },
        );

        self.advance_time(self.slot_time(chain_link.slot()));
        self.blocks.insert(block_root, chain_link.clone());

        debug!(
            "inserted block {block_root:?} at slot {}",
            chain_link.slot(),
        );

        Ok(Some(chain_link))
    }

    fn advance_time(&mut self, time: UnixSeconds) {
        self.time = self.time.max(time);
    }

    fn insert_vote(
        &mut self,
        validator_index: ValidatorIndex,
        message: LatestMessage,
    ) -> Result<bool> {
        ensure!(
            self.proto_array.contains_block(message.root),
            Error::UnknownVoteTarget {
                validator_index,
                root: message.root,
            },
        );

        let old_message = self.latest_message(validator_index);

        if old_message.is_some_and(|old_message| message.epoch <= old_message.epoch) {
            return Ok(false);
        }

        self.proto_array.on_attestation_weight_change(
            validator_index,
            old_message.map(|old_message| (old_message.root, old_message.weight)),
            message.root,
            message.weight,
        )?;

        self.latest_messages.insert(validator_index, message);

        Ok(true)
    }

    fn merge_checkpoint(&mut self, kind: CheckpointKind, checkpoint: Checkpoint) -> Result<()> {
        let current = self.checkpoint(kind);

        if checkpoint.epoch < current.epoch {
            debug!("ignoring stale {kind} {checkpoint:?} (current: {current:?})");
            return Ok(());
        }

        if checkpoint.epoch == current.epoch {
            ensure!(
                checkpoint.root == current.root,
                Error::ConflictingCheckpoint {
                    kind,
                    current,
                    staged: checkpoint,
                },
            );

            return Ok(());
        }

        let field = match kind {
            CheckpointKind::Justified => &mut self.justified_checkpoint,
            CheckpointKind::Finalized => &mut self.finalized_checkpoint,
            CheckpointKind::BestJustified => &mut self.best_justified_checkpoint,
        };

        let old = mem::replace(field, checkpoint);

        debug!("{kind} changed from {old:?} to {checkpoint:?}");

        Ok(())
    }

    fn ensure_invariant(condition: bool, invariant: Invariant) -> Result<()> {
        ensure!(condition, Error::InvariantViolated { invariant });
        Ok(())
    }
}
