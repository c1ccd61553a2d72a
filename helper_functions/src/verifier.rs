use std::sync::Arc;

use types::phase0::primitives::{PublicKeyBytes, SignatureBytes, H256};

/// Signature verification capability.
///
/// Blocks and attestations are signed over their roots. How signatures are checked is up to the
/// implementor. Fork choice only needs a yes or no answer.
pub trait Verifier: Send + Sync {
    fn verify(&self, message: H256, signature: SignatureBytes, public_key: PublicKeyBytes) -> bool;
}

impl<V: Verifier + ?Sized> Verifier for Arc<V> {
    #[inline]
    fn verify(&self, message: H256, signature: SignatureBytes, public_key: PublicKeyBytes) -> bool {
        (**self).verify(message, signature, public_key)
    }
}

/// Accepts every signature.
///
/// Used when signatures have already been checked before the message reached fork choice.
pub struct NullVerifier;

impl Verifier for NullVerifier {
    #[inline]
    fn verify(
        &self,
        _message: H256,
        _signature: SignatureBytes,
        _public_key: PublicKeyBytes,
    ) -> bool {
        true
    }
}
