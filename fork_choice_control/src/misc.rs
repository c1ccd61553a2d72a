use fork_choice_store::ApplyChanges;
use types::phase0::primitives::H256;

/// Result of a successful commit.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CommitOutcome {
    pub new_block_roots: Vec<H256>,
    pub old_head: H256,
    pub new_head: H256,
    pub finalized_checkpoint_updated: bool,
    pub pruned_roots: Vec<H256>,
}

impl From<&ApplyChanges> for CommitOutcome {
    fn from(changes: &ApplyChanges) -> Self {
        Self {
            new_block_roots: changes.new_block_roots(),
            old_head: changes.old_head,
            new_head: changes.new_head,
            finalized_checkpoint_updated: changes.finalized_checkpoint_updated,
            pruned_roots: changes.pruned_roots.clone(),
        }
    }
}

impl CommitOutcome {
    #[must_use]
    pub fn head_changed(&self) -> bool {
        self.old_head != self.new_head
    }
}
