// The mutator thread owns the authoritative `Store`.
// Every change to it goes through `Mutator::run`, one message at a time.
// Readers never see the `Store` owned by the mutator. They load the snapshot that the mutator
// publishes after each successful commit.

use std::sync::{mpsc::Receiver, Arc};

use anyhow::{bail, ensure, Context as _, Result};
use arc_swap::ArcSwap;
use fork_choice_store::{ChainLink, Error as StoreError, PendingChanges, Store};
use log::{debug, error, info};

use crate::{
    controller::StoreState,
    error::Error,
    events::Event,
    messages::MutatorMessage,
    misc::CommitOutcome,
    storage::Storage,
    unbounded_sink::UnboundedSink,
};

pub struct Mutator<S> {
    store: Option<Store>,
    store_snapshot: Arc<ArcSwap<StoreState>>,
    storage: Storage,
    halted: bool,
    mutator_rx: Receiver<MutatorMessage>,
    event_tx: S,
}

impl<S: UnboundedSink<Event>> Mutator<S> {
    pub fn new(
        store: Option<Store>,
        store_snapshot: Arc<ArcSwap<StoreState>>,
        storage: Storage,
        mutator_rx: Receiver<MutatorMessage>,
        event_tx: S,
    ) -> Self {
        Self {
            store,
            store_snapshot,
            storage,
            halted: false,
            mutator_rx,
            event_tx,
        }
    }

    pub fn run(&mut self) {
        // `recv` fails once every sender is gone, which means nothing can be submitted anymore.
        while let Ok(message) = self.mutator_rx.recv() {
            match message {
                MutatorMessage::Initialize { anchor, sender } => {
                    let result = self.handle_initialize(anchor);

                    if sender.send(result).is_err() {
                        debug!("initialization result not delivered because the caller is gone");
                    }
                }
                MutatorMessage::Commit { changes, sender } => {
                    let result = self.handle_commit(changes);

                    // Commit futures may be dropped without being awaited.
                    if sender.send(result).is_err() {
                        debug!("commit result not delivered because the commit future was dropped");
                    }
                }
                MutatorMessage::Stop => break,
            }
        }

        debug!("mutator thread stopping");
    }

    fn handle_initialize(&mut self, anchor: ChainLink) -> Result<ChainLink> {
        ensure!(self.store.is_none(), Error::AlreadyInitialized);

        let store = Store::new(
            Arc::clone(self.storage.config()),
            Arc::clone(&anchor.block),
            Arc::clone(&anchor.state),
        );

        self.storage
            .save_store(&store)
            .context(Error::CommitFailure)?;

        info!(
            "store initialized from genesis (genesis time: {}, block root: {:?})",
            store.genesis_time(),
            anchor.block_root,
        );

        self.publish(store);

        Ok(anchor)
    }

    fn handle_commit(&mut self, changes: PendingChanges) -> Result<CommitOutcome> {
        ensure!(!self.halted, Error::StoreHalted);

        let Some(store) = &self.store else {
            bail!(Error::PreGenesis);
        };

        let mut new_store = store.clone();

        let changes = match new_store.apply_pending_changes(changes) {
            Ok(changes) => changes,
            Err(error) => {
                if error
                    .downcast_ref::<StoreError>()
                    .is_some_and(StoreError::is_fatal)
                {
                    error!("store halted: {error:?}");
                    self.halted = true;
                } else {
                    debug!("changes rejected: {error}");
                }

                return Err(error);
            }
        };

        self.storage
            .append(&new_store, &changes)
            .context(Error::CommitFailure)?;

        let outcome = CommitOutcome::from(&changes);
        let events = Event::from_changes(&new_store, &changes);

        if outcome.head_changed() {
            info!(
                "head changed to {:?} at slot {}",
                outcome.new_head,
                new_store.head().slot(),
            );
        }

        if outcome.finalized_checkpoint_updated {
            info!(
                "finalized checkpoint updated to {:?}",
                new_store.finalized_checkpoint(),
            );
        }

        self.publish(new_store);

        for event in events {
            event.send(&self.event_tx);
        }

        Ok(outcome)
    }

    fn publish(&mut self, store: Store) {
        // `ArcSwap::rcu` is not necessary here because there is only one thread mutating the store.
        self.store_snapshot
            .store(Arc::new(StoreState::Initialized(Arc::new(store.clone()))));

        self.store = Some(store);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use database::Database;
    use fork_choice_store::Invariant;
    use futures::sink::Drain;
    use types::{
        config::Config,
        phase0::{
            beacon_state::BeaconState,
            containers::{BeaconBlock, Checkpoint},
            primitives::{UnixSeconds, H256},
        },
    };

    use super::*;

    const GENESIS_TIME: UnixSeconds = 1_000;

    // The justified root is not in the store, so any commit fails the final invariant check.
    fn mutator_with_dangling_checkpoint() -> Mutator<Drain<Event>> {
        let config = Arc::new(Config::minimal());

        let state = Arc::new(BeaconState {
            genesis_time: GENESIS_TIME,
            ..BeaconState::default()
        });

        let block = Arc::new(BeaconBlock::default().with_zero_signature());

        let checkpoint = Checkpoint {
            epoch: 0,
            root: H256::repeat_byte(0xee),
        };

        let store = Store::with_anchor_checkpoint(Arc::clone(&config), block, state, checkpoint);
        let published = StoreState::Initialized(Arc::new(store.clone()));
        let store_snapshot = Arc::new(ArcSwap::from_pointee(published));
        let storage = Storage::new(config, Arc::new(Database::in_memory()));
        let (_, mutator_rx) = mpsc::channel();

        Mutator::new(Some(store), store_snapshot, storage, mutator_rx, futures::sink::drain())
    }

    fn time_change(time: UnixSeconds) -> PendingChanges {
        let mut changes = PendingChanges::new();
        changes.set_time(time);
        changes
    }

    #[test]
    fn invariant_violation_halts_the_mutator() {
        let mut mutator = mutator_with_dangling_checkpoint();
        let published = mutator.store_snapshot.load_full();

        let error = mutator
            .handle_commit(time_change(GENESIS_TIME + 6))
            .expect_err("commit should violate an invariant");

        assert!(matches!(
            error.downcast_ref(),
            Some(StoreError::InvariantViolated {
                invariant: Invariant::CheckpointRootKnown(_),
            }),
        ));

        let error = mutator
            .handle_commit(time_change(GENESIS_TIME + 12))
            .expect_err("halted mutator should reject commits");

        assert!(matches!(error.downcast_ref(), Some(Error::StoreHalted)));
        assert!(Arc::ptr_eq(&published, &mutator.store_snapshot.load_full()));
        assert_eq!(mutator.store.as_ref().map(Store::time), Some(GENESIS_TIME));
    }
}
