use std::sync::Arc;

use types::phase0::{
    beacon_state::BeaconState,
    containers::{Checkpoint, SignedBeaconBlock},
    primitives::{UnixSeconds, ValidatorIndex, H256},
};

use crate::misc::{ChainLink, CheckpointKind, LatestMessage};

#[derive(Clone, Debug)]
pub enum PendingChange {
    PutBlockAndState(ChainLink),
    SetTime(UnixSeconds),
    PutVote {
        validator_index: ValidatorIndex,
        message: LatestMessage,
    },
    SetCheckpoint {
        kind: CheckpointKind,
        checkpoint: Checkpoint,
    },
}

/// Changes staged for a single atomic application to a [`Store`].
///
/// Staging never fails. Validation happens when the changes are applied.
///
/// [`Store`]: crate::Store
#[derive(Clone, Default, Debug)]
pub struct PendingChanges {
    changes: Vec<PendingChange>,
}

impl IntoIterator for PendingChanges {
    type Item = PendingChange;
    type IntoIter = std::vec::IntoIter<PendingChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl PendingChanges {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    pub fn put_block_and_state(&mut self, block: Arc<SignedBeaconBlock>, state: Arc<BeaconState>) {
        self.push(PendingChange::PutBlockAndState(ChainLink::new(block, state)));
    }

    pub fn put_chain_link(&mut self, chain_link: ChainLink) {
        self.push(PendingChange::PutBlockAndState(chain_link));
    }

    pub fn set_time(&mut self, time: UnixSeconds) {
        self.push(PendingChange::SetTime(time));
    }

    pub fn put_vote(&mut self, validator_index: ValidatorIndex, message: LatestMessage) {
        self.push(PendingChange::PutVote {
            validator_index,
            message,
        });
    }

    pub fn set_checkpoint(&mut self, kind: CheckpointKind, checkpoint: Checkpoint) {
        self.push(PendingChange::SetCheckpoint { kind, checkpoint });
    }

    pub fn push(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.iter()
    }

    /// The most recently staged block with the given root.
    #[must_use]
    pub fn chain_link(&self, block_root: H256) -> Option<&ChainLink> {
        self.changes.iter().rev().find_map(|change| match change {
            PendingChange::PutBlockAndState(chain_link) if chain_link.block_root == block_root => {
                Some(chain_link)
            }
            _ => None,
        })
    }

    /// Latest time among staged time changes and staged blocks.
    ///
    /// Each block counts as the time at which its slot starts, computed by `slot_time`.
    pub fn latest_time(
        &self,
        slot_time: impl Fn(&ChainLink) -> UnixSeconds,
    ) -> Option<UnixSeconds> {
        self.changes
            .iter()
            .filter_map(|change| match change {
                PendingChange::PutBlockAndState(chain_link) => Some(slot_time(chain_link)),
                PendingChange::SetTime(time) => Some(*time),
                _ => None,
            })
            .max()
    }

    /// The most recently staged value of a checkpoint.
    #[must_use]
    pub fn checkpoint(&self, kind: CheckpointKind) -> Option<Checkpoint> {
        self.changes.iter().rev().find_map(|change| match *change {
            PendingChange::SetCheckpoint {
                kind: staged_kind,
                checkpoint,
            } if staged_kind == kind => Some(checkpoint),
            _ => None,
        })
    }
}
