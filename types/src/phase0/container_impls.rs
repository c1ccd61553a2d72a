use crate::{
    phase0::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, BeaconBlockHeader, SignedBeaconBlock},
        primitives::{SignatureBytes, H256},
    },
    traits::HashRoot as _,
};

impl BeaconBlock {
    #[must_use]
    pub fn to_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.hash_root(),
        }
    }

    #[must_use]
    pub const fn with_state_root(mut self, state_root: H256) -> Self {
        self.state_root = state_root;
        self
    }

    #[must_use]
    pub const fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock {
        SignedBeaconBlock {
            message: self,
            signature,
        }
    }

    #[must_use]
    pub const fn with_zero_signature(self) -> SignedBeaconBlock {
        self.with_signature(SignatureBytes::zero())
    }
}

impl SignedBeaconBlock {
    /// Root used to identify the block in fork choice and storage.
    ///
    /// The signature is not part of it.
    #[must_use]
    pub fn block_root(&self) -> H256 {
        self.message.hash_root()
    }
}

impl BeaconState {
    /// Root of the block most recently applied to this state.
    ///
    /// `latest_block_header.state_root` is left zeroed by the state transition because the
    /// post-state root is not known while the state is being built. It is filled in here.
    #[must_use]
    pub fn latest_block_root(&self) -> H256 {
        let mut header = self.latest_block_header;

        if header.state_root.is_zero() {
            header.state_root = self.hash_root();
        }

        header.hash_root()
    }
}
