use anyhow::{ensure, Result};
use log::debug;
use types::{
    phase0::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, SignedBeaconBlock},
    },
    traits::HashRoot as _,
};

use crate::{block_processing, slot_processing, Error};

/// Deterministic state transition.
///
/// Errors returned by implementations are passed on to callers of fork choice unchanged.
pub trait StateTransition: Send + Sync {
    fn apply(&self, parent_state: &BeaconState, block: &SignedBeaconBlock) -> Result<BeaconState>;
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum StateRootPolicy {
    #[default]
    Verify,
    Trust,
}

impl StateRootPolicy {
    pub fn verify(self, state: &BeaconState, block: &BeaconBlock) -> Result<()> {
        match self {
            Self::Verify => {
                let computed = state.hash_root();
                let in_block = block.state_root;

                ensure!(
                    computed == in_block,
                    Error::StateRootMismatch { computed, in_block },
                );
            }
            Self::Trust => {}
        }

        Ok(())
    }
}

/// Header-only state transition.
///
/// Advances the state to the block's slot, checks the block against the latest block header and
/// records it. Block bodies carry no operations, so justification and finalization are inherited
/// from the parent state.
#[derive(Clone, Copy, Default, Debug)]
pub struct BasicTransition {
    state_root_policy: StateRootPolicy,
}

impl BasicTransition {
    #[must_use]
    pub const fn new(state_root_policy: StateRootPolicy) -> Self {
        Self { state_root_policy }
    }
}

impl StateTransition for BasicTransition {
    fn apply(&self, parent_state: &BeaconState, block: &SignedBeaconBlock) -> Result<BeaconState> {
        let block = &block.message;
        let mut state = parent_state.clone();

        // > Process slots (including those with no blocks) since block
        slot_processing::process_slots(&mut state, block.slot)?;

        // > Process block
        block_processing::process_block_header(&mut state, block)?;

        // > Verify state root
        self.state_root_policy.verify(&state, block)?;

        debug!(
            "state transition to slot {} succeeded (parent_root: {:?})",
            block.slot, block.parent_root,
        );

        Ok(state)
    }
}
