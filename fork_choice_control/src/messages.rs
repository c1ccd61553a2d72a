use std::sync::mpsc::Sender;

use anyhow::Result;
use fork_choice_store::{ChainLink, PendingChanges};
use futures::channel::oneshot::Sender as OneshotSender;
use log::debug;

use crate::misc::CommitOutcome;

pub enum MutatorMessage {
    Initialize {
        anchor: ChainLink,
        sender: OneshotSender<Result<ChainLink>>,
    },
    Commit {
        changes: PendingChanges,
        sender: OneshotSender<Result<CommitOutcome>>,
    },
    Stop,
}

impl MutatorMessage {
    pub(crate) fn send(self, tx: &Sender<Self>) {
        // Don't log the value because it can contain entire `BeaconState`s.
        if tx.send(self).is_err() {
            // This can happen if the mutator thread exits early due to failure or if a commit is
            // submitted after the `Controller` is dropped and stops the mutator thread.
            debug!("send to mutator failed because the receiver was dropped");
        }
    }
}
