// `Controller` is the public face of the store. It owns no `Store` itself.
// Reads operate on the latest snapshot published by the mutator thread and never wait.
// Writes are staged in a `StoreTransaction` and submitted to the mutator, which applies them one
// at a time in the order they arrive.

use std::{
    sync::{mpsc::Sender, Arc},
    thread::{Builder, JoinHandle},
};

use anyhow::{bail, ensure, Result};
use arc_swap::ArcSwap;
use clock::Tick;
use database::Database;
use fork_choice_store::{ChainLink, Error as StoreError, LatestMessage, Store};
use helper_functions::verifier::Verifier;
use log::debug;
use transition_functions::StateTransition;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{
            BeaconBlock, BeaconBlockBody, Checkpoint, SignedBeaconBlock, SingularAttestation,
            Validator,
        },
        primitives::{Slot, UnixSeconds, ValidatorIndex, H256},
    },
    traits::HashRoot as _,
};

use crate::{
    error::Error,
    events::Event,
    messages::MutatorMessage,
    mutator::Mutator,
    storage::Storage,
    transaction::{CommitFuture, StoreTransaction},
    unbounded_sink::UnboundedSink,
};

/// Lifecycle of the store as seen by readers.
pub enum StoreState {
    PreGenesis,
    Initialized(Arc<Store>),
}

pub struct Controller {
    // The latest consistent snapshot of the store.
    store_snapshot: Arc<ArcSwap<StoreState>>,
    state_transition: Arc<dyn StateTransition>,
    verifier: Arc<dyn Verifier>,
    mutator_tx: Sender<MutatorMessage>,
}

impl Drop for Controller {
    fn drop(&mut self) {
        MutatorMessage::Stop.send(&self.mutator_tx);
    }
}

impl Controller {
    /// Starts the mutator thread.
    ///
    /// If `database` already contains a store, it is loaded and the controller resumes from it.
    /// Otherwise the controller starts out before genesis.
    pub fn new(
        config: Arc<Config>,
        database: Arc<Database>,
        state_transition: Arc<dyn StateTransition>,
        verifier: Arc<dyn Verifier>,
        event_tx: impl UnboundedSink<Event>,
    ) -> Result<(Arc<Self>, MutatorHandle)> {
        let storage = Storage::new(config, database);
        let store = storage.load()?;

        let store_state = match &store {
            Some(store) => StoreState::Initialized(Arc::new(store.clone())),
            None => StoreState::PreGenesis,
        };

        let store_snapshot = Arc::new(ArcSwap::from_pointee(store_state));
        let (mutator_tx, mutator_rx) = std::sync::mpsc::channel();

        let mut mutator = Mutator::new(
            store,
            Arc::clone(&store_snapshot),
            storage,
            mutator_rx,
            event_tx,
        );

        let join_handle = Builder::new()
            .name("store-mutator".to_owned())
            .spawn(move || mutator.run())?;

        let controller = Arc::new(Self {
            store_snapshot,
            state_transition,
            verifier,
            mutator_tx: mutator_tx.clone(),
        });

        let mutator_handle = MutatorHandle {
            join_handle: Some(join_handle),
            mutator_tx,
        };

        Ok((controller, mutator_handle))
    }

    /// Creates the store from a genesis state and persists it.
    ///
    /// The genesis block is built from the state's latest block header with an empty body.
    /// Blocks until the mutator thread has processed the request.
    pub fn initialize_from_genesis(&self, genesis_state: Arc<BeaconState>) -> Result<ChainLink> {
        ensure!(self.is_pre_genesis(), Error::AlreadyInitialized);

        let header = genesis_state.latest_block_header;

        let genesis_block = BeaconBlock {
            slot: header.slot,
            proposer_index: header.proposer_index,
            parent_root: header.parent_root,
            state_root: genesis_state.hash_root(),
            body: BeaconBlockBody::default(),
        }
        .with_zero_signature();

        let block_root = genesis_block.block_root();
        let expected_root = genesis_state.latest_block_root();

        ensure!(
            block_root == expected_root,
            Error::InconsistentGenesisState {
                block_root,
                expected_root,
            },
        );

        let (sender, receiver) = futures::channel::oneshot::channel();

        MutatorMessage::Initialize {
            anchor: ChainLink::new(Arc::new(genesis_block), genesis_state),
            sender,
        }
        .send(&self.mutator_tx);

        futures::executor::block_on(receiver).map_err(|_| Error::MutatorStopped)?
    }

    #[must_use]
    pub fn is_pre_genesis(&self) -> bool {
        matches!(**self.store_snapshot.load(), StoreState::PreGenesis)
    }

    /// The latest committed store.
    ///
    /// Use this to read multiple values that must be consistent with each other.
    pub fn snapshot(&self) -> Result<Arc<Store>> {
        match &**self.store_snapshot.load() {
            StoreState::PreGenesis => bail!(Error::PreGenesis),
            StoreState::Initialized(store) => Ok(Arc::clone(store)),
        }
    }

    pub fn start_transaction(&self) -> Result<StoreTransaction> {
        Ok(StoreTransaction::new(self.snapshot()?, self.mutator_tx.clone()))
    }

    pub fn block_and_state(&self, block_root: H256) -> Result<Option<ChainLink>> {
        Ok(self.snapshot()?.chain_link(block_root).cloned())
    }

    pub fn time(&self) -> Result<UnixSeconds> {
        Ok(self.snapshot()?.time())
    }

    pub fn genesis_time(&self) -> Result<UnixSeconds> {
        Ok(self.snapshot()?.genesis_time())
    }

    pub fn current_slot(&self) -> Result<Slot> {
        Ok(self.snapshot()?.current_slot())
    }

    pub fn justified_checkpoint(&self) -> Result<Checkpoint> {
        Ok(self.snapshot()?.justified_checkpoint())
    }

    pub fn finalized_checkpoint(&self) -> Result<Checkpoint> {
        Ok(self.snapshot()?.finalized_checkpoint())
    }

    pub fn best_justified_checkpoint(&self) -> Result<Checkpoint> {
        Ok(self.snapshot()?.best_justified_checkpoint())
    }

    pub fn best_block_root(&self) -> Result<H256> {
        Ok(self.snapshot()?.head_root())
    }

    pub fn head(&self) -> Result<ChainLink> {
        Ok(self.snapshot()?.head().clone())
    }

    pub fn block_at_slot(&self, slot: Slot) -> Result<Option<ChainLink>> {
        Ok(self.snapshot()?.block_at_slot(slot).cloned())
    }

    pub fn state_at_slot(&self, slot: Slot) -> Result<Option<Arc<BeaconState>>> {
        Ok(self
            .snapshot()?
            .state_at_slot(slot)
            .map(|chain_link| Arc::clone(&chain_link.state)))
    }

    pub fn is_slot_finalized(&self, slot: Slot) -> Result<bool> {
        Ok(self.snapshot()?.is_slot_finalized(slot))
    }

    pub fn latest_vote(&self, validator_index: ValidatorIndex) -> Result<Option<LatestMessage>> {
        Ok(self.snapshot()?.latest_message(validator_index))
    }

    /// Validates a block against its parent and submits it.
    ///
    /// Failures of the state transition are returned unchanged.
    pub fn on_block(&self, block: Arc<SignedBeaconBlock>) -> Result<CommitFuture> {
        let snapshot = self.snapshot()?;
        let block_root = block.block_root();
        let parent_root = block.message.parent_root;

        let parent_state = snapshot
            .chain_link(parent_root)
            .map(|parent| Arc::clone(&parent.state))
            .ok_or(StoreError::UnknownParent {
                block_root,
                parent_root,
            })?;

        let proposer_index = block.message.proposer_index;
        let proposer = validator(&parent_state, proposer_index)?;

        ensure!(
            self.verifier
                .verify(block_root, block.signature, proposer.public_key),
            Error::InvalidBlockSignature { block_root },
        );

        let state = self.state_transition.apply(&parent_state, &block)?;

        debug!("block {block_root:?} at slot {} passed validation", block.message.slot);

        let mut transaction = StoreTransaction::new(snapshot, self.mutator_tx.clone());
        transaction.put_block_and_state(block, Arc::new(state));

        Ok(transaction.commit())
    }

    /// Validates an attestation from a single validator and submits its vote.
    ///
    /// The signing key is taken from the head state.
    /// The weight of the vote is the validator's effective balance in the justified state.
    pub fn on_attestation(&self, attestation: &SingularAttestation) -> Result<CommitFuture> {
        let snapshot = self.snapshot()?;

        let SingularAttestation {
            validator_index,
            data,
            signature,
        } = *attestation;

        let attester = validator(&snapshot.head().state, validator_index)?;

        ensure!(
            self.verifier
                .verify(data.hash_root(), signature, attester.public_key),
            Error::InvalidAttestationSignature { validator_index },
        );

        let weight = snapshot
            .chain_link(snapshot.justified_checkpoint().root)
            .and_then(|justified| validator(&justified.state, validator_index).ok())
            .map_or(0, |validator| validator.effective_balance);

        let mut transaction = StoreTransaction::new(snapshot, self.mutator_tx.clone());

        transaction.put_vote(
            validator_index,
            data.beacon_block_root,
            data.target.epoch,
            weight,
        );

        Ok(transaction.commit())
    }

    // This should be called at the start of every slot.
    // Ticks before genesis are ignored because there is no store to advance yet.
    pub fn on_tick(&self, tick: Tick) {
        let Ok(mut transaction) = self.start_transaction() else {
            debug!("ignoring tick before genesis: {tick:?}");
            return;
        };

        transaction.set_time(tick.time);

        // The result is not needed. Time can only move forward.
        drop(transaction.commit());
    }
}

/// A wrapper over [`JoinHandle`] that can be used to wait for the mutator thread to finish.
///
/// In normal operation the mutator thread should be joined explicitly using
/// [`MutatorHandle::join`]. Tests may drop [`MutatorHandle`],
/// at which point the mutator thread will be joined implicitly.
pub struct MutatorHandle {
    join_handle: Option<JoinHandle<()>>,
    mutator_tx: Sender<MutatorMessage>,
}

impl Drop for MutatorHandle {
    fn drop(&mut self) {
        // Stop the mutator thread to avoid a deadlock if the corresponding `Controller` hasn't been
        // dropped yet.
        MutatorMessage::Stop.send(&self.mutator_tx);

        let result = self.join_internal();

        if !std::thread::panicking() {
            result.expect("mutator thread should succeed when joined implicitly")
        }
    }
}

impl MutatorHandle {
    pub fn join(mut self) -> Result<()> {
        self.join_internal()
    }

    fn join_internal(&mut self) -> Result<()> {
        // Don't use `Option::expect` here.
        // `MutatorHandle::join_internal` is called twice in normal operation.
        match self.join_handle.take() {
            Some(join_handle) => join_handle
                .join()
                .map_err(|_| Error::MutatorPanicked.into()),
            None => Ok(()),
        }
    }
}

fn validator(state: &BeaconState, validator_index: ValidatorIndex) -> Result<&Validator> {
    usize::try_from(validator_index)
        .ok()
        .and_then(|index| state.validators.get(index))
        .ok_or_else(|| Error::UnknownValidator { validator_index }.into())
}
