//! A flat block tree for LMD GHOST.
//!
//! Nodes are stored in an arena in insertion order. A node's parent is referenced by index.
//! Because a block can only be inserted after its parent, parents always precede their children.
//! This lets [`ProtoArray::find_head`] compute subtree weights in a single backward pass.
//!
//! Indices are only stable between calls to [`ProtoArray::prune`].

use core::cmp::Reverse;

use anyhow::{ensure, Result};
use im::{HashMap, Vector};
use itertools::Itertools as _;
use log::trace;
use types::phase0::{
    containers::Checkpoint,
    primitives::{Gwei, Slot, ValidatorIndex, H256},
};

use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProtoNode {
    pub root: H256,
    pub parent: Option<usize>,
    pub slot: Slot,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    /// Sum of the weights of votes for this block alone, excluding descendants.
    pub weight: Gwei,
}

#[derive(Clone, Default, Debug)]
pub struct ProtoArray {
    nodes: Vector<ProtoNode>,
    indices: HashMap<H256, usize>,
}

impl ProtoArray {
    /// Inserts a block with no votes.
    ///
    /// Returns `false` if the block is already present. The first block inserted is the anchor and
    /// does not need a parent. Every later block must have a parent that is already present.
    pub fn on_block(
        &mut self,
        root: H256,
        parent_root: H256,
        slot: Slot,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) -> Result<bool> {
        if self.indices.contains_key(&root) {
            return Ok(false);
        }

        let parent = self.indices.get(&parent_root).copied();

        ensure!(
            parent.is_some() || self.nodes.is_empty(),
            Error::UnknownParent {
                block_root: root,
                parent_root,
            },
        );

        self.indices.insert(root, self.nodes.len());

        self.nodes.push_back(ProtoNode {
            root,
            parent,
            slot,
            justified_checkpoint,
            finalized_checkpoint,
            weight: 0,
        });

        Ok(true)
    }

    /// Moves the vote of `validator_index` to `new_root`.
    ///
    /// `old_vote` is the root and weight the previous vote was counted with.
    /// If its root has already been pruned, only the addition takes effect.
    pub fn on_attestation_weight_change(
        &mut self,
        validator_index: ValidatorIndex,
        old_vote: Option<(H256, Gwei)>,
        new_root: H256,
        weight: Gwei,
    ) -> Result<()> {
        trace!(
            "moving vote of validator {validator_index} from {old_vote:?} \
             to {new_root:?} with weight {weight}",
        );

        ensure!(
            self.contains_block(new_root),
            Error::UnknownVoteTarget {
                validator_index,
                root: new_root,
            },
        );

        if let Some((old_root, old_weight)) = old_vote {
            self.remove_weight(old_root, old_weight);
        }

        self.add_weight(new_root, weight)
    }

    pub fn add_weight(&mut self, root: H256, weight: Gwei) -> Result<()> {
        let index = self.index(root)?;

        if let Some(node) = self.nodes.get_mut(index) {
            node.weight = node.weight.saturating_add(weight);
        }

        Ok(())
    }

    /// Subtracts `weight` from the block if it is still present.
    pub fn remove_weight(&mut self, root: H256, weight: Gwei) {
        if let Some(node) = self
            .indices
            .get(&root)
            .copied()
            .and_then(|index| self.nodes.get_mut(index))
        {
            node.weight = node.weight.saturating_sub(weight);
        }
    }

    /// Selects the head by walking down from `justified_root`.
    ///
    /// At each step the child with the greatest subtree weight is chosen.
    /// Ties are broken in favor of the lexicographically smaller root.
    pub fn find_head(&self, justified_root: H256) -> Result<H256> {
        let justified_index = self
            .indices
            .get(&justified_root)
            .copied()
            .ok_or(Error::UnknownJustifiedRoot {
                root: justified_root,
            })?;

        let mut subtree_weights = self.nodes.iter().map(|node| node.weight).collect_vec();
        let mut best_children = vec![None; self.nodes.len()];

        // Children come after their parents, so by the time a node is visited in reverse order
        // the weights of all of its descendants have already been added to it.
        for (index, node) in self.nodes.iter().enumerate().rev() {
            let Some(parent) = node.parent else {
                continue;
            };

            subtree_weights[parent] =
                subtree_weights[parent].saturating_add(subtree_weights[index]);

            let is_better = match best_children[parent] {
                None => true,
                Some(best) => {
                    let candidate = (subtree_weights[index], Reverse(node.root));
                    let current = (subtree_weights[best], Reverse(self.nodes[best].root));
                    candidate > current
                }
            };

            if is_better {
                best_children[parent] = Some(index);
            }
        }

        let mut head_index = justified_index;

        while let Some(best_child) = best_children[head_index] {
            head_index = best_child;
        }

        Ok(self.nodes[head_index].root)
    }

    /// Removes every node that is neither `finalized_root` nor a descendant of it.
    ///
    /// Returns the roots of removed nodes in their original order.
    pub fn prune(&mut self, finalized_root: H256) -> Result<Vec<H256>> {
        let finalized_index = self.index(finalized_root)?;

        let mut new_indices = vec![None; self.nodes.len()];
        let mut nodes = Vector::new();
        let mut pruned_roots = vec![];

        for (index, node) in self.nodes.iter().enumerate() {
            let is_kept = index == finalized_index
                || (index > finalized_index
                    && node
                        .parent
                        .is_some_and(|parent| new_indices[parent].is_some()));

            if is_kept {
                new_indices[index] = Some(nodes.len());

                nodes.push_back(ProtoNode {
                    parent: node.parent.and_then(|parent| new_indices[parent]),
                    ..*node
                });
            } else {
                pruned_roots.push(node.root);
            }
        }

        self.indices = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.root, index))
            .collect();

        self.nodes = nodes;

        Ok(pruned_roots)
    }

    /// Whether `root` is `ancestor_root` or one of its descendants.
    #[must_use]
    pub fn is_descendant(&self, ancestor_root: H256, root: H256) -> bool {
        let (Some(&ancestor_index), Some(&index)) =
            (self.indices.get(&ancestor_root), self.indices.get(&root))
        else {
            return false;
        };

        let mut current = Some(index);

        while let Some(index) = current {
            if index == ancestor_index {
                return true;
            }

            if index < ancestor_index {
                return false;
            }

            current = self.nodes[index].parent;
        }

        false
    }

    #[must_use]
    pub fn contains_block(&self, root: H256) -> bool {
        self.indices.contains_key(&root)
    }

    #[must_use]
    pub fn node(&self, root: H256) -> Option<&ProtoNode> {
        let index = *self.indices.get(&root)?;
        self.nodes.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ProtoNode> {
        self.nodes.iter()
    }

    /// Whether every parent index points to an earlier node.
    #[must_use]
    pub fn parents_precede_children(&self) -> bool {
        self.nodes
            .iter()
            .enumerate()
            .all(|(index, node)| node.parent.is_none_or(|parent| parent < index))
    }

    fn index(&self, root: H256) -> Result<usize> {
        self.indices
            .get(&root)
            .copied()
            .ok_or_else(|| Error::BlockNotInProtoArray { root }.into())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    // ```text
    //        ┌── 2 ── 4
    // 0 ── 1 ┤
    //        └── 3
    // ```
    fn build_tree() -> Result<ProtoArray> {
        let mut proto_array = ProtoArray::default();

        insert(&mut proto_array, 0, 0)?;
        insert(&mut proto_array, 1, 0)?;
        insert(&mut proto_array, 2, 1)?;
        insert(&mut proto_array, 3, 1)?;
        insert(&mut proto_array, 4, 2)?;

        Ok(proto_array)
    }

    fn insert(proto_array: &mut ProtoArray, byte: u8, parent_byte: u8) -> Result<bool> {
        proto_array.on_block(
            root(byte),
            root(parent_byte),
            byte.into(),
            Checkpoint::default(),
            Checkpoint::default(),
        )
    }

    fn root(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn on_block_ignores_duplicates() -> Result<()> {
        let mut proto_array = build_tree()?;

        assert!(!insert(&mut proto_array, 3, 1)?);
        assert_eq!(proto_array.len(), 5);

        Ok(())
    }

    #[test]
    fn on_block_rejects_unknown_parent() -> Result<()> {
        let mut proto_array = build_tree()?;

        let error = insert(&mut proto_array, 9, 8).expect_err("parent 8 is unknown");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::UnknownParent { .. }),
        ));
        assert!(!proto_array.contains_block(root(9)));

        Ok(())
    }

    #[test]
    fn find_head_breaks_ties_toward_smaller_root() -> Result<()> {
        let proto_array = build_tree()?;

        // Both branches have zero weight. Root 0x02… is smaller than 0x03….
        assert_eq!(proto_array.find_head(root(0))?, root(4));

        Ok(())
    }

    #[test_case(&[(3, 10)] => matches Ok(3); "single vote for shorter branch")]
    #[test_case(&[(4, 10), (3, 10)] => matches Ok(4); "equal subtree weights")]
    #[test_case(&[(4, 5), (2, 5), (3, 9)] => matches Ok(4); "ancestor votes count")]
    #[test_case(&[(4, 5), (3, 6)] => matches Ok(3); "heavier branch wins")]
    fn find_head_follows_heaviest_subtree(votes: &[(u8, Gwei)]) -> Result<u8> {
        let mut proto_array = build_tree()?;

        for (validator_index, (byte, weight)) in (0..).zip(votes) {
            proto_array.on_attestation_weight_change(validator_index, None, root(*byte), *weight)?;
        }

        let head = proto_array.find_head(root(0))?;

        Ok(head.as_bytes()[0])
    }

    #[test]
    fn find_head_never_leaves_justified_subtree() -> Result<()> {
        let mut proto_array = build_tree()?;

        proto_array.add_weight(root(3), 100)?;

        assert_eq!(proto_array.find_head(root(2))?, root(4));
        assert_eq!(proto_array.find_head(root(3))?, root(3));

        Ok(())
    }

    #[test]
    fn find_head_fails_for_unknown_justified_root() -> Result<()> {
        let proto_array = build_tree()?;

        let error = proto_array
            .find_head(root(7))
            .expect_err("justified root is unknown");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::UnknownJustifiedRoot { .. }),
        ));

        Ok(())
    }

    #[test]
    fn moving_a_vote_moves_its_weight() -> Result<()> {
        let mut proto_array = build_tree()?;

        proto_array.on_attestation_weight_change(0, None, root(3), 10)?;
        proto_array.add_weight(root(4), 5)?;

        assert_eq!(proto_array.find_head(root(0))?, root(3));

        proto_array.on_attestation_weight_change(0, Some((root(3), 10)), root(4), 10)?;

        assert_eq!(proto_array.node(root(3)).map(|node| node.weight), Some(0));
        assert_eq!(proto_array.node(root(4)).map(|node| node.weight), Some(15));
        assert_eq!(proto_array.find_head(root(0))?, root(4));

        Ok(())
    }

    #[test]
    fn prune_keeps_descendants_of_finalized_block() -> Result<()> {
        let mut proto_array = build_tree()?;

        let pruned_roots = proto_array.prune(root(2))?;

        assert_eq!(pruned_roots, [root(0), root(1), root(3)]);
        assert_eq!(proto_array.len(), 2);
        assert!(proto_array.contains_block(root(2)));
        assert!(proto_array.contains_block(root(4)));
        assert!(proto_array.parents_precede_children());
        assert_eq!(proto_array.node(root(2)).and_then(|node| node.parent), None);
        assert_eq!(proto_array.node(root(4)).and_then(|node| node.parent), Some(0));
        assert_eq!(proto_array.find_head(root(2))?, root(4));

        Ok(())
    }

    #[test]
    fn prune_at_root_removes_nothing() -> Result<()> {
        let mut proto_array = build_tree()?;

        assert_eq!(proto_array.prune(root(0))?, []);
        assert_eq!(proto_array.len(), 5);

        Ok(())
    }

    #[test]
    fn is_descendant_follows_parent_links() -> Result<()> {
        let proto_array = build_tree()?;

        assert!(proto_array.is_descendant(root(1), root(4)));
        assert!(proto_array.is_descendant(root(4), root(4)));
        assert!(!proto_array.is_descendant(root(3), root(4)));
        assert!(!proto_array.is_descendant(root(4), root(1)));
        assert!(!proto_array.is_descendant(root(9), root(4)));

        Ok(())
    }
}
