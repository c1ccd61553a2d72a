pub use crate::{
    error::Error,
    state_transition::{BasicTransition, StateRootPolicy, StateTransition},
};

mod block_processing;
mod error;
mod slot_processing;
mod state_transition;
