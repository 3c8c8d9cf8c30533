use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::GovernanceError;
use crate::governor::Governor;
use crate::label::Label;
use crate::{AccountId, Amount, LedgerIndex};

/// Cloneable handle to one [`Governor`] for multi-threaded hosts.
///
/// Mutations hold the write lock for their whole duration, so a reader never
/// sees a half-applied delegation or vote. Queries share the read lock.
#[derive(Clone, Debug, Default)]
pub struct SharedGovernor {
    inner: Arc<RwLock<Governor>>,
}

impl SharedGovernor {
    pub fn new(governor: Governor) -> Self {
        Self {
            inner: Arc::new(RwLock::new(governor)),
        }
    }

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Governor) -> R) -> R {
        let guard = self.inner.read();
        f(&*guard)
    }

    /// Run `f` under the write lock. Callers batching several mutations are
    /// responsible for their own rollback.
    pub fn write<R>(&self, f: impl FnOnce(&mut Governor) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut *guard)
    }

    /// Copy of the current state.
    pub fn to_governor(&self) -> Governor {
        self.inner.read().clone()
    }

    pub fn advance(&self, steps: u64) -> Result<LedgerIndex, GovernanceError> {
        self.inner.write().advance(steps)
    }

    pub fn mint(&self, to: &AccountId, amount: Amount) -> Result<(), GovernanceError> {
        self.inner.write().mint(to, amount)
    }

    pub fn burn(&self, from: &AccountId, amount: Amount) -> Result<(), GovernanceError> {
        self.inner.write().burn(from, amount)
    }

    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), GovernanceError> {
        self.inner.write().transfer(from, to, amount)
    }

    pub fn delegate(&self, account: &AccountId, to: &AccountId) -> Result<(), GovernanceError> {
        self.inner.write().delegate(account, to)
    }

    pub fn initialize_ballot(
        &self,
        names: Vec<Label>,
        target_index: LedgerIndex,
    ) -> Result<(), GovernanceError> {
        self.inner.write().initialize_ballot(names, target_index)
    }

    pub fn vote(
        &self,
        voter: &AccountId,
        proposal_id: usize,
        amount: Amount,
    ) -> Result<(), GovernanceError> {
        self.inner.write().vote(voter, proposal_id, amount)
    }

    pub fn current_index(&self) -> LedgerIndex {
        self.inner.read().current_index()
    }

    pub fn get_proposal(&self, id: usize) -> Result<(Label, Amount), GovernanceError> {
        self.inner.read().get_proposal(id)
    }

    pub fn proposals_count(&self) -> Result<usize, GovernanceError> {
        self.inner.read().proposals_count()
    }

    pub fn winning_proposal(&self) -> Result<usize, GovernanceError> {
        self.inner.read().winning_proposal()
    }

    pub fn winner_name(&self) -> Result<Label, GovernanceError> {
        self.inner.read().winner_name()
    }

    pub fn remaining_voting_power(&self, account: &AccountId) -> Result<Amount, GovernanceError> {
        self.inner.read().remaining_voting_power(account)
    }

    pub fn past_votes(
        &self,
        account: &AccountId,
        target: LedgerIndex,
    ) -> Result<Amount, GovernanceError> {
        self.inner.read().past_votes(account, target)
    }
}
