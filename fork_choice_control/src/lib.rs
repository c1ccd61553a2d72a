//! Concurrency, persistence and validation around the fork choice store.
//!
//! This crate handles the following concerns:
//! - Serializing all changes to the store through a single mutator thread.
//! - Publishing consistent snapshots of the store to readers.
//! - [Transactions](`StoreTransaction`) that stage changes against a snapshot.
//! - [Persistence](`Storage`) of every commit before its result is published.
//! - Validating blocks and attestations before they reach the store.
//! - Notifying other components about changes through [`Event`]s.
//! - Testing.

pub use crate::{
    controller::{Controller, MutatorHandle, StoreState},
    error::Error,
    events::Event,
    misc::CommitOutcome,
    storage::{BlockByRoot, StateByBlockRoot, Storage, StoreMetadata},
    transaction::{CommitFuture, StoreTransaction},
    unbounded_sink::UnboundedSink,
};

mod controller;
mod error;
mod events;
mod messages;
mod misc;
mod mutator;
mod storage;
mod transaction;
mod unbounded_sink;

#[cfg(test)]
mod helpers;
