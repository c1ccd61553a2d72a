use thiserror::Error;
use types::phase0::primitives::{ValidatorIndex, H256};

#[derive(Debug, Error)]
pub enum Error {
    #[error("store has already been initialized")]
    AlreadyInitialized,
    #[error("failed to persist changes; store was left unchanged")]
    CommitFailure,
    #[error(
        "genesis block built from genesis state has root {block_root:?} \
         but the state refers to {expected_root:?}"
    )]
    InconsistentGenesisState { block_root: H256, expected_root: H256 },
    #[error("attestation by validator {validator_index} has an invalid signature")]
    InvalidAttestationSignature { validator_index: ValidatorIndex },
    #[error("block {block_root:?} has an invalid signature")]
    InvalidBlockSignature { block_root: H256 },
    #[error("mutator thread panicked")]
    MutatorPanicked,
    #[error("mutator thread stopped before applying changes")]
    MutatorStopped,
    #[error("store is not initialized until genesis")]
    PreGenesis,
    #[error("store stopped accepting changes after detecting an inconsistency")]
    StoreHalted,
    #[error("validator {validator_index} is not in the registry")]
    UnknownValidator { validator_index: ValidatorIndex },
}
