use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;

pub use ethereum_types::H256;

pub type Epoch = u64;
pub type Gwei = u64;
pub type Slot = u64;
pub type UnixSeconds = u64;
pub type ValidatorIndex = u64;

// Public keys and signatures are opaque to this workspace.
// Verifying them is the job of the `Verifier` passed in from outside.
construct_fixed_hash! {
    pub struct PublicKeyBytes(48);
}

construct_fixed_hash! {
    pub struct SignatureBytes(96);
}

impl_fixed_hash_serde!(PublicKeyBytes, 48);
impl_fixed_hash_serde!(SignatureBytes, 96);
