use hashing::{chunk_u64, merkleize, merkleize_list};

use crate::phase0::{
    beacon_state::BeaconState,
    containers::{
        AttestationData, BeaconBlock, BeaconBlockBody, BeaconBlockHeader, Checkpoint,
        SignedBeaconBlock, SingularAttestation, Validator,
    },
    primitives::{PublicKeyBytes, SignatureBytes, H256},
};

/// Merkle root of a container.
///
/// Fields are chunked in declaration order. Fixed size byte strings longer than 32 bytes are
/// split into 32 byte chunks and merkleized on their own.
pub trait HashRoot {
    fn hash_root(&self) -> H256;
}

impl HashRoot for PublicKeyBytes {
    fn hash_root(&self) -> H256 {
        merkleize(bytes_to_chunks(self.as_bytes()))
    }
}

impl HashRoot for SignatureBytes {
    fn hash_root(&self) -> H256 {
        merkleize(bytes_to_chunks(self.as_bytes()))
    }
}

impl HashRoot for Checkpoint {
    fn hash_root(&self) -> H256 {
        merkleize([chunk_u64(self.epoch), self.root])
    }
}

impl HashRoot for AttestationData {
    fn hash_root(&self) -> H256 {
        merkleize([
            chunk_u64(self.slot),
            self.beacon_block_root,
            self.target.hash_root(),
        ])
    }
}

impl HashRoot for BeaconBlockBody {
    fn hash_root(&self) -> H256 {
        merkleize([self.graffiti])
    }
}

impl HashRoot for BeaconBlockHeader {
    fn hash_root(&self) -> H256 {
        merkleize([
            chunk_u64(self.slot),
            chunk_u64(self.proposer_index),
            self.parent_root,
            self.state_root,
            self.body_root,
        ])
    }
}

// The root of a block is the root of its header.
// Headers stand in for blocks in `BeaconState.latest_block_header`.
impl HashRoot for BeaconBlock {
    fn hash_root(&self) -> H256 {
        self.to_header().hash_root()
    }
}

impl HashRoot for SignedBeaconBlock {
    fn hash_root(&self) -> H256 {
        merkleize([self.message.hash_root(), self.signature.hash_root()])
    }
}

impl HashRoot for SingularAttestation {
    fn hash_root(&self) -> H256 {
        merkleize([
            chunk_u64(self.validator_index),
            self.data.hash_root(),
            self.signature.hash_root(),
        ])
    }
}

impl HashRoot for Validator {
    fn hash_root(&self) -> H256 {
        merkleize([
            self.public_key.hash_root(),
            chunk_u64(self.effective_balance),
        ])
    }
}

impl HashRoot for BeaconState {
    fn hash_root(&self) -> H256 {
        let validator_roots = self.validators.iter().map(HashRoot::hash_root);

        merkleize([
            chunk_u64(self.genesis_time),
            chunk_u64(self.slot),
            self.latest_block_header.hash_root(),
            merkleize_list(validator_roots),
            self.current_justified_checkpoint.hash_root(),
            self.finalized_checkpoint.hash_root(),
        ])
    }
}

fn bytes_to_chunks(bytes: &[u8]) -> Vec<H256> {
    bytes
        .chunks(H256::len_bytes())
        .map(|chunk| {
            let mut padded = H256::zero();
            padded.as_bytes_mut()[..chunk.len()].copy_from_slice(chunk);
            padded
        })
        .collect()
}
