use core::fmt::{Formatter, Result as FmtResult};
use std::sync::Arc;

use derivative::Derivative;
use fork_choice_store::{ApplyChanges, Store};
use log::debug;
use types::phase0::{
    beacon_state::BeaconState,
    containers::{Checkpoint, SignedBeaconBlock},
    primitives::{Slot, H256},
};

use crate::unbounded_sink::UnboundedSink;

/// Notification about a committed change to the store.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub enum Event {
    /// A block was added to the store. Sent once per block in insertion order.
    Block {
        block_root: H256,
        #[derivative(Debug(format_with = "fmt_slot"))]
        block: Arc<SignedBeaconBlock>,
        #[derivative(Debug = "ignore")]
        state: Arc<BeaconState>,
    },
    Head {
        slot: Slot,
        block_root: H256,
        previous_head: H256,
    },
    FinalizedCheckpoint(Checkpoint),
}

impl Event {
    pub(crate) fn send(self, tx: &impl UnboundedSink<Self>) {
        // Don't log the value because it can contain entire `BeaconState`s.
        if tx.unbounded_send(self).is_err() {
            debug!("send to event subscriber failed because the receiver was dropped");
        }
    }

    /// Events describing `changes` in the order they should be delivered.
    pub(crate) fn from_changes(store: &Store, changes: &ApplyChanges) -> Vec<Self> {
        let blocks = changes.new_blocks.iter().map(|chain_link| Self::Block {
            block_root: chain_link.block_root,
            block: Arc::clone(&chain_link.block),
            state: Arc::clone(&chain_link.state),
        });

        let head = changes.head_changed().then(|| Self::Head {
            slot: store.head().slot(),
            block_root: changes.new_head,
            previous_head: changes.old_head,
        });

        let finalized_checkpoint = changes
            .finalized_checkpoint_updated
            .then(|| Self::FinalizedCheckpoint(store.finalized_checkpoint()));

        blocks.chain(head).chain(finalized_checkpoint).collect()
    }
}

fn fmt_slot(block: &SignedBeaconBlock, formatter: &mut Formatter) -> FmtResult {
    write!(formatter, "block at slot {}", block.message.slot)
}
