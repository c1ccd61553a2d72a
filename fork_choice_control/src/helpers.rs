use std::sync::Arc;

use anyhow::Result;
use database::Database;
use fork_choice_store::ChainLink;
use futures::{channel::mpsc::UnboundedReceiver, executor::block_on};
use helper_functions::{
    misc,
    verifier::{NullVerifier, Verifier},
};
use transition_functions::{BasicTransition, StateRootPolicy, StateTransition as _};
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{
            AttestationData, BeaconBlock, BeaconBlockBody, BeaconBlockHeader, Checkpoint,
            SingularAttestation, Validator,
        },
        primitives::{
            Epoch, Gwei, PublicKeyBytes, SignatureBytes, Slot, UnixSeconds, ValidatorIndex, H256,
        },
    },
    traits::HashRoot as _,
};

use crate::{
    controller::{Controller, MutatorHandle},
    events::Event,
    misc::CommitOutcome,
    transaction::StoreTransaction,
};

pub const GENESIS_TIME: UnixSeconds = 1_606_824_000;
pub const VALIDATOR_COUNT: u64 = 4;
pub const EFFECTIVE_BALANCE: Gwei = 32_000_000_000;

#[must_use]
pub fn genesis_state() -> Arc<BeaconState> {
    let validators = (1..=VALIDATOR_COUNT)
        .map(|byte| Validator {
            public_key: PublicKeyBytes::repeat_byte(
                u8::try_from(byte).expect("validator count fits in u8"),
            ),
            effective_balance: EFFECTIVE_BALANCE,
        })
        .collect();

    Arc::new(BeaconState {
        genesis_time: GENESIS_TIME,
        latest_block_header: BeaconBlockHeader {
            body_root: BeaconBlockBody::default().hash_root(),
            ..BeaconBlockHeader::default()
        },
        validators,
        ..BeaconState::default()
    })
}

pub struct RejectingVerifier;

impl Verifier for RejectingVerifier {
    fn verify(&self, _: H256, _: SignatureBytes, _: PublicKeyBytes) -> bool {
        false
    }
}

/// Builds blocks with valid state roots without involving a store.
pub struct ChainBuilder;

impl ChainBuilder {
    /// Builds an empty block at `slot` on top of `parent`.
    ///
    /// `graffiti` can be used to build distinct blocks with the same parent and slot.
    pub fn child(parent: &ChainLink, slot: Slot, graffiti: u8) -> Result<ChainLink> {
        let block = BeaconBlock {
            slot,
            proposer_index: slot % VALIDATOR_COUNT,
            parent_root: parent.block_root,
            state_root: H256::zero(),
            body: BeaconBlockBody {
                graffiti: H256::repeat_byte(graffiti),
            },
        };

        let state = BasicTransition::new(StateRootPolicy::Trust)
            .apply(&parent.state, &block.clone().with_zero_signature())?;

        let block = block
            .with_state_root(state.hash_root())
            .with_zero_signature();

        Ok(ChainLink::new(Arc::new(block), Arc::new(state)))
    }

    /// Builds a chain of blocks, one for each slot in `slots`.
    pub fn chain(
        parent: &ChainLink,
        slots: impl IntoIterator<Item = Slot>,
        graffiti: u8,
    ) -> Result<Vec<ChainLink>> {
        let mut parent = parent.clone();
        let mut chain = vec![];

        for slot in slots {
            let chain_link = Self::child(&parent, slot, graffiti)?;
            parent = chain_link.clone();
            chain.push(chain_link);
        }

        Ok(chain)
    }
}

/// Drives a [`Controller`] from tests and collects the events it sends.
pub struct ChainUpdater {
    config: Arc<Config>,
    database: Arc<Database>,
    controller: Arc<Controller>,
    mutator_handle: MutatorHandle,
    event_rx: UnboundedReceiver<Event>,
}

impl ChainUpdater {
    /// Creates a controller over a fresh database and initializes it from genesis.
    pub fn new() -> Result<Self> {
        let updater = Self::resume(Arc::new(Database::in_memory()), Arc::new(NullVerifier))?;
        updater.initialize_genesis()?;
        Ok(updater)
    }

    /// Creates a controller over `database` without initializing it.
    pub fn resume(database: Arc<Database>, verifier: Arc<dyn Verifier>) -> Result<Self> {
        let config = Arc::new(Config::mainnet());
        let (event_tx, event_rx) = futures::channel::mpsc::unbounded();

        let (controller, mutator_handle) = Controller::new(
            Arc::clone(&config),
            Arc::clone(&database),
            Arc::new(BasicTransition::default()),
            verifier,
            event_tx,
        )?;

        Ok(Self {
            config,
            database,
            controller,
            mutator_handle,
            event_rx,
        })
    }

    pub fn initialize_genesis(&self) -> Result<ChainLink> {
        self.controller.initialize_from_genesis(genesis_state())
    }

    /// Stops the mutator thread and returns the database for reuse.
    pub fn shut_down(self) -> Result<Arc<Database>> {
        let Self {
            database,
            controller,
            mutator_handle,
            ..
        } = self;

        drop(controller);
        mutator_handle.join()?;

        Ok(database)
    }

    #[must_use]
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn genesis(&self) -> Result<ChainLink> {
        let finalized_root = self.controller.finalized_checkpoint()?.root;

        Ok(self
            .controller
            .block_and_state(finalized_root)?
            .expect("finalized block is always in the store"))
    }

    #[must_use]
    pub fn epoch_start(&self, epoch: Epoch) -> Slot {
        misc::compute_start_slot_at_epoch(&self.config, epoch)
    }

    pub fn on_block(&self, chain_link: &ChainLink) -> Result<CommitOutcome> {
        block_on(self.controller.on_block(Arc::clone(&chain_link.block))?)
    }

    pub fn on_blocks<'links>(
        &self,
        chain_links: impl IntoIterator<Item = &'links ChainLink>,
    ) -> Result<()> {
        for chain_link in chain_links {
            self.on_block(chain_link)?;
        }

        Ok(())
    }

    pub fn vote(
        &self,
        validator_index: ValidatorIndex,
        chain_link: &ChainLink,
        epoch: Epoch,
    ) -> Result<CommitOutcome> {
        let attestation = SingularAttestation {
            validator_index,
            data: AttestationData {
                slot: chain_link.slot(),
                beacon_block_root: chain_link.block_root,
                target: Checkpoint {
                    epoch,
                    root: chain_link.block_root,
                },
            },
            signature: SignatureBytes::zero(),
        };

        block_on(self.controller.on_attestation(&attestation)?)
    }

    pub fn commit(&self, stage: impl FnOnce(&mut StoreTransaction)) -> Result<CommitOutcome> {
        let mut transaction = self.controller.start_transaction()?;
        stage(&mut transaction);
        block_on(transaction.commit())
    }

    /// Sets justified, best justified and finalized checkpoints to `chain_link` at `epoch`.
    pub fn finalize(&self, chain_link: &ChainLink, epoch: Epoch) -> Result<CommitOutcome> {
        let checkpoint = Checkpoint {
            epoch,
            root: chain_link.block_root,
        };

        self.commit(|transaction| {
            transaction.set_justified_checkpoint(checkpoint);
            transaction.set_best_justified_checkpoint(checkpoint);
            transaction.set_finalized_checkpoint(checkpoint);
        })
    }

    pub fn next_event(&mut self) -> Option<Event> {
        self.event_rx.try_recv().ok()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        core::iter::from_fn(|| self.next_event()).collect()
    }

    pub fn assert_head(&self, expected: &ChainLink) {
        assert_eq!(
            self.controller
                .best_block_root()
                .expect("store is initialized"),
            expected.block_root,
        );
    }
}
