use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use std::sync::{mpsc::Sender, Arc};

use anyhow::Result;
use fork_choice_store::{ChainLink, CheckpointKind, LatestMessage, PendingChanges, Store};
use futures::{channel::oneshot::Receiver, FutureExt as _};
use types::phase0::{
    beacon_state::BeaconState,
    containers::{Checkpoint, SignedBeaconBlock},
    primitives::{Epoch, Gwei, UnixSeconds, ValidatorIndex, H256},
};

use crate::{error::Error, messages::MutatorMessage, misc::CommitOutcome};

/// Changes staged against a snapshot of the store.
///
/// Reads see the snapshot the transaction was started from plus changes staged in it.
/// Changes staged in other transactions are not visible until they are committed,
/// and even then only to transactions started afterwards.
pub struct StoreTransaction {
    base: Arc<Store>,
    changes: PendingChanges,
    mutator_tx: Sender<MutatorMessage>,
}

impl StoreTransaction {
    pub(crate) const fn new(base: Arc<Store>, mutator_tx: Sender<MutatorMessage>) -> Self {
        Self {
            base,
            changes: PendingChanges::new(),
            mutator_tx,
        }
    }

    pub fn put_block_and_state(&mut self, block: Arc<SignedBeaconBlock>, state: Arc<BeaconState>) {
        self.changes.put_block_and_state(block, state);
    }

    pub fn set_time(&mut self, time: UnixSeconds) {
        self.changes.set_time(time);
    }

    pub fn set_justified_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.changes.set_checkpoint(CheckpointKind::Justified, checkpoint);
    }

    pub fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.changes.set_checkpoint(CheckpointKind::Finalized, checkpoint);
    }

    pub fn set_best_justified_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.changes.set_checkpoint(CheckpointKind::BestJustified, checkpoint);
    }

    pub fn put_vote(
        &mut self,
        validator_index: ValidatorIndex,
        root: H256,
        epoch: Epoch,
        weight: Gwei,
    ) {
        self.changes.put_vote(
            validator_index,
            LatestMessage {
                epoch,
                root,
                weight,
            },
        );
    }

    #[must_use]
    pub fn time(&self) -> UnixSeconds {
        self.changes
            .latest_time(|chain_link| self.base.slot_time(chain_link.slot()))
            .map_or(self.base.time(), |time| time.max(self.base.time()))
    }

    #[must_use]
    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.checkpoint(CheckpointKind::Justified)
    }

    #[must_use]
    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.checkpoint(CheckpointKind::Finalized)
    }

    #[must_use]
    pub fn best_justified_checkpoint(&self) -> Checkpoint {
        self.checkpoint(CheckpointKind::BestJustified)
    }

    /// Looks up a block staged in this transaction or present in its snapshot.
    #[must_use]
    pub fn block_and_state(&self, block_root: H256) -> Option<ChainLink> {
        self.changes
            .chain_link(block_root)
            .or_else(|| self.base.chain_link(block_root))
            .cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Submits the staged changes to the mutator.
    ///
    /// The changes are applied even if the returned future is dropped.
    pub fn commit(self) -> CommitFuture {
        let (sender, receiver) = futures::channel::oneshot::channel();

        MutatorMessage::Commit {
            changes: self.changes,
            sender,
        }
        .send(&self.mutator_tx);

        CommitFuture { receiver }
    }

    // Staged checkpoints older than the snapshot are ignored on commit, so they are ignored here.
    fn checkpoint(&self, kind: CheckpointKind) -> Checkpoint {
        let current = self.base.checkpoint(kind);

        self.changes
            .checkpoint(kind)
            .filter(|staged| staged.epoch >= current.epoch)
            .unwrap_or(current)
    }
}

/// Resolves to the result of a commit once the mutator has applied and persisted it.
#[must_use = "dropping a `CommitFuture` does not cancel the commit but discards its result"]
pub struct CommitFuture {
    receiver: Receiver<Result<CommitOutcome>>,
}

impl Future for CommitFuture {
    type Output = Result<CommitOutcome>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver.poll_unpin(context).map(|result| match result {
            Ok(result) => result,
            // The sender is dropped without a result only if the mutator thread is gone.
            Err(_) => Err(Error::MutatorStopped.into()),
        })
    }
}
