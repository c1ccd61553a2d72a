//! SHA-256 helpers used to compute roots of blocks, states and checkpoints.
//!
//! Roots are computed by splitting an object into 32 byte chunks and merkleizing them with
//! [`merkleize`]. Integers are stored in chunks as little-endian bytes padded with zeros.

use ethereum_types::H256;
use sha2::{Digest as _, Sha256};

#[inline]
#[must_use]
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes.as_ref()).into())
}

#[inline]
#[must_use]
pub fn hash_64(value: u64) -> H256 {
    hash_bytes(value.to_le_bytes())
}

#[inline]
#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    H256(hasher.finalize().into())
}

#[inline]
#[must_use]
pub fn hash_256_64(a: H256, b: u64) -> H256 {
    hash_256_256(a, chunk_u64(b))
}

/// Packs a `u64` into a chunk the same way SSZ packs basic values.
#[inline]
#[must_use]
pub fn chunk_u64(value: u64) -> H256 {
    let mut chunk = H256::zero();
    chunk.as_bytes_mut()[..8].copy_from_slice(&value.to_le_bytes());
    chunk
}

/// Root of a perfect binary tree of the given depth with all leaves set to zero.
#[must_use]
pub fn zero_hash(depth: usize) -> H256 {
    (0..depth).fold(H256::zero(), |hash, _| hash_256_256(hash, hash))
}

/// Merkleizes `chunks`, padding them with zero chunks up to the next power of 2.
///
/// An empty list of chunks has the zero chunk as its root.
#[must_use]
pub fn merkleize(chunks: impl IntoIterator<Item = H256>) -> H256 {
    let mut layer = chunks.into_iter().collect::<Vec<_>>();
    let mut depth = 0;

    if layer.is_empty() {
        return H256::zero();
    }

    while layer.len() > 1 {
        if layer.len() % 2 == 1 {
            layer.push(zero_hash(depth));
        }

        layer = layer
            .chunks_exact(2)
            .map(|pair| hash_256_256(pair[0], pair[1]))
            .collect();

        depth += 1;
    }

    layer[0]
}

/// Merkleizes a variable length list and mixes its length into the root.
#[must_use]
pub fn merkleize_list(chunks: impl IntoIterator<Item = H256>) -> H256 {
    let chunks = chunks.into_iter().collect::<Vec<_>>();
    let length = u64::try_from(chunks.len()).unwrap_or(u64::MAX);
    hash_256_64(merkleize(chunks), length)
}
