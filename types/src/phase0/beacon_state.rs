use serde::{Deserialize, Serialize};

use crate::phase0::{
    containers::{BeaconBlockHeader, Checkpoint, Validator},
    primitives::{Slot, UnixSeconds},
};

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BeaconState {
    // > Versioning
    pub genesis_time: UnixSeconds,
    pub slot: Slot,

    // > History
    pub latest_block_header: BeaconBlockHeader,

    // > Registry
    pub validators: Vec<Validator>,

    // > Finality
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}
