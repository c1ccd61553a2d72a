use core::fmt::{Formatter, Result as FmtResult};
use std::sync::Arc;

use derivative::Derivative;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use types::phase0::{
    beacon_state::BeaconState,
    containers::SignedBeaconBlock,
    primitives::{Epoch, Gwei, Slot, H256},
};

/// A block together with the state produced by applying it to its parent's state.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ChainLink {
    pub block_root: H256,
    #[derivative(Debug(format_with = "fmt_block_concisely"))]
    pub block: Arc<SignedBeaconBlock>,
    #[derivative(Debug(format_with = "fmt_as_wildcard"))]
    pub state: Arc<BeaconState>,
}

impl ChainLink {
    #[must_use]
    pub fn new(block: Arc<SignedBeaconBlock>, state: Arc<BeaconState>) -> Self {
        Self {
            block_root: block.block_root(),
            block,
            state,
        }
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.block.message.slot
    }

    #[must_use]
    pub fn parent_root(&self) -> H256 {
        self.block.message.parent_root
    }
}

/// The most recent vote of a validator.
///
/// `weight` is the balance the vote was counted with.
/// It is subtracted again when the vote is replaced.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LatestMessage {
    pub epoch: Epoch,
    // This is the LMD GHOST vote root and it corresponds to `AttestationData.beacon_block_root`.
    pub root: H256,
    pub weight: Gwei,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Deserialize, Serialize)]
pub enum CheckpointKind {
    #[display("justified checkpoint")]
    Justified,
    #[display("finalized checkpoint")]
    Finalized,
    #[display("best justified checkpoint")]
    BestJustified,
}

/// Effects of [`Store::apply_pending_changes`].
///
/// [`Store::apply_pending_changes`]: crate::Store::apply_pending_changes
#[derive(Debug)]
pub struct ApplyChanges {
    /// Blocks that were not in the store before, in insertion order.
    pub new_blocks: Vec<ChainLink>,
    pub old_head: H256,
    pub new_head: H256,
    pub justified_checkpoint_updated: bool,
    pub finalized_checkpoint_updated: bool,
    pub pruned_roots: Vec<H256>,
}

impl ApplyChanges {
    #[must_use]
    pub fn head_changed(&self) -> bool {
        self.old_head != self.new_head
    }

    #[must_use]
    pub fn new_block_roots(&self) -> Vec<H256> {
        self.new_blocks
            .iter()
            .map(|chain_link| chain_link.block_root)
            .collect()
    }
}

fn fmt_block_concisely(block: &SignedBeaconBlock, formatter: &mut Formatter) -> FmtResult {
    formatter
        .debug_struct("SignedBeaconBlock")
        .field("slot", &block.message.slot)
        .field("parent_root", &block.message.parent_root)
        .field("state_root", &block.message.state_root)
        .finish_non_exhaustive()
}

fn fmt_as_wildcard<T>(_: T, formatter: &mut Formatter) -> FmtResult {
    formatter.write_str("_")
}
