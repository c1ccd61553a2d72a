use anyhow::{ensure, Result};
use types::{
    phase0::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, BeaconBlockHeader},
        primitives::H256,
    },
    traits::HashRoot as _,
};

use crate::Error;

pub fn process_block_header(state: &mut BeaconState, block: &BeaconBlock) -> Result<()> {
    // > Verify that the slots match
    ensure!(
        block.slot == state.slot,
        Error::SlotMismatch {
            state_slot: state.slot,
            block_slot: block.slot,
        },
    );

    // > Verify that the block is newer than latest block header
    ensure!(
        block.slot > state.latest_block_header.slot,
        Error::BlockNotNewerThanLatestBlockHeader {
            block_slot: block.slot,
            block_header_slot: state.latest_block_header.slot,
        },
    );

    // > Verify that the proposer is a known validator
    let index = block.proposer_index;

    ensure!(
        usize::try_from(index).is_ok_and(|index| index < state.validators.len()),
        Error::ProposerIndexOutOfBounds { index },
    );

    // > Verify that the parent matches
    let computed = state.latest_block_header.hash_root();
    let in_block = block.parent_root;

    ensure!(
        computed == in_block,
        Error::ParentRootMismatch { computed, in_block },
    );

    // > Cache current block as the new latest block
    state.latest_block_header = BeaconBlockHeader {
        // > Overwritten in the next process_slot call
        state_root: H256::zero(),
        ..block.to_header()
    };

    Ok(())
}
