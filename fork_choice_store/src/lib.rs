//! Fork choice over a tree of blocks with their post-states.
//!
//! The [`Store`] keeps every block that descends from the finalized block together with the state
//! produced by it, the latest vote of every validator and the justified and finalized checkpoints.
//! The head of the chain is selected with LMD GHOST over a [`ProtoArray`].
//!
//! Changes to the [`Store`] are collected in [`PendingChanges`] and applied in one step with
//! [`Store::apply_pending_changes`]. Either all of them take effect or none do.
//!
//! This implementation makes use of persistent data structures, but they are not required for the
//! algorithm to work. They're only used to make snapshots cheap.
//!
//! Blocks that do not descend from the finalized block are pruned as soon as finality advances.

pub use crate::{
    error::{Error, Invariant},
    misc::{ApplyChanges, ChainLink, CheckpointKind, LatestMessage},
    pending_changes::{PendingChange, PendingChanges},
    proto_array::{ProtoArray, ProtoNode},
    store::Store,
};

mod error;
mod misc;
mod pending_changes;
mod proto_array;
mod store;
