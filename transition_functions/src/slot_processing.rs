use anyhow::{ensure, Result};
use types::{
    phase0::{beacon_state::BeaconState, primitives::Slot},
    traits::HashRoot as _,
};

use crate::Error;

pub fn process_slots(state: &mut BeaconState, slot: Slot) -> Result<()> {
    ensure!(
        state.slot < slot,
        Error::SlotNotLater {
            current: state.slot,
            target: slot,
        },
    );

    // Without epoch processing every empty slot is identical.
    // Caching the state root once is enough.
    process_slot(state);

    state.slot = slot;

    Ok(())
}

fn process_slot(state: &mut BeaconState) {
    // > Cache latest block header state root
    if state.latest_block_header.state_root.is_zero() {
        state.latest_block_header.state_root = state.hash_root();
    }
}
