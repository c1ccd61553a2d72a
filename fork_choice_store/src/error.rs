use derive_more::Display;
use thiserror::Error;
use types::phase0::{
    containers::Checkpoint,
    primitives::{Slot, ValidatorIndex, H256},
};

use crate::misc::CheckpointKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("block {root:?} is not in the proto-array")]
    BlockNotInProtoArray { root: H256 },
    #[error(
        "{kind} {checkpoint:?} does not descend from \
         finalized block {finalized_root:?}"
    )]
    CheckpointNotDescendantOfFinalized {
        kind: CheckpointKind,
        checkpoint: Checkpoint,
        finalized_root: H256,
    },
    #[error("{kind} {staged:?} conflicts with {current:?} in the same epoch")]
    ConflictingCheckpoint {
        kind: CheckpointKind,
        current: Checkpoint,
        staged: Checkpoint,
    },
    #[error(
        "finalized checkpoint {finalized:?} is ahead of \
         justified checkpoint {justified:?}"
    )]
    FinalizedAheadOfJustified {
        justified: Checkpoint,
        finalized: Checkpoint,
    },
    #[error("store invariant violated: {invariant}")]
    InvariantViolated { invariant: Invariant },
    #[error("block {block_root:?} at slot {slot} is not after its parent at slot {parent_slot}")]
    SlotNotAfterParent {
        block_root: H256,
        slot: Slot,
        parent_slot: Slot,
    },
    #[error("root of {kind} {checkpoint:?} is not a known block")]
    UnknownCheckpointRoot {
        kind: CheckpointKind,
        checkpoint: Checkpoint,
    },
    #[error("justified block {root:?} is not in the proto-array")]
    UnknownJustifiedRoot { root: H256 },
    #[error("parent {parent_root:?} of block {block_root:?} is not a known block")]
    UnknownParent { block_root: H256, parent_root: H256 },
    #[error("validator {validator_index} voted for unknown block {root:?}")]
    UnknownVoteTarget {
        validator_index: ValidatorIndex,
        root: H256,
    },
}

impl Error {
    /// Whether the error indicates a bug rather than invalid input.
    ///
    /// A store that produced such an error cannot be trusted with further changes.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolated { .. })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Invariant {
    #[display("finalized checkpoint must not be ahead of justified checkpoint")]
    FinalizedNotAheadOfJustified,
    #[display("{_0} root must refer to a block in the store")]
    CheckpointRootKnown(CheckpointKind),
    #[display("head must refer to a block in the store")]
    HeadKnown,
    #[display("head must descend from the justified block")]
    HeadDescendsFromJustified,
    #[display("finalized block must be the root of the block tree")]
    FinalizedBlockIsRoot,
    #[display("blocks in the store and the proto-array must match")]
    ProtoArrayMatchesBlocks,
    #[display("parents must precede children in the proto-array")]
    ParentsPrecedeChildren,
    #[display("time must not be before genesis")]
    TimeNotBeforeGenesis,
}
