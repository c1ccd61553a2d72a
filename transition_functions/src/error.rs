use thiserror::Error;
use types::phase0::primitives::{Slot, ValidatorIndex, H256};

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "block is not newer than latest block header \
         (block_slot: {block_slot}, block_header_slot: {block_header_slot})"
    )]
    BlockNotNewerThanLatestBlockHeader {
        block_slot: Slot,
        block_header_slot: Slot,
    },
    #[error(
        "parent root in block ({in_block:?}) does not match \
         latest block header ({computed:?})"
    )]
    ParentRootMismatch { computed: H256, in_block: H256 },
    #[error("proposer index {index} is out of bounds")]
    ProposerIndexOutOfBounds { index: ValidatorIndex },
    #[error("state slot ({state_slot}) does not match block slot ({block_slot})")]
    SlotMismatch { state_slot: Slot, block_slot: Slot },
    #[error("target slot ({target}) is not later than current slot ({current})")]
    SlotNotLater { current: Slot, target: Slot },
    #[error("state root in block ({in_block:?}) does not match state ({computed:?})")]
    StateRootMismatch { computed: H256, in_block: H256 },
}
