use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ballot::Ballot;
use crate::checkpoint::{Checkpoint, CheckpointHistory, CheckpointLedger};
use crate::delegation::{BalanceDelta, DelegationGraph, PowerMove};
use crate::error::GovernanceError;
use crate::event::GovernanceEvent;
use crate::label::Label;
use crate::snapshot::{SnapshotQuery, VotingPowerSource};
use crate::token::Balances;
use crate::{AccountId, Amount, LedgerIndex};

/// Top-level coordinator for balances, voting power, and the ballot.
///
/// Owns the monotonic ledger index. Every mutating call either commits
/// completely or returns an error with no state changed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Governor {
    index: LedgerIndex,
    token: Balances,
    ledger: CheckpointLedger,
    total_supply: CheckpointHistory,
    delegation: DelegationGraph,
    ballot: Ballot,
    events: Vec<GovernanceEvent>,
}

impl Governor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_supply(max_supply: Amount) -> Self {
        Self {
            token: Balances::with_max_supply(max_supply),
            ..Self::default()
        }
    }

    pub fn current_index(&self) -> LedgerIndex {
        self.index
    }

    /// Move the ledger index forward by `steps`.
    pub fn advance(&mut self, steps: u64) -> Result<LedgerIndex, GovernanceError> {
        if steps == 0 {
            return Err(GovernanceError::IndexNotAdvanced);
        }
        self.index = self
            .index
            .checked_add(steps)
            .ok_or(GovernanceError::ArithmeticOverflow)?;
        debug!(index = self.index, "ledger index advanced");
        Ok(self.index)
    }

    pub fn advance_to(&mut self, index: LedgerIndex) -> Result<(), GovernanceError> {
        if index <= self.index {
            return Err(GovernanceError::IndexNotAdvanced);
        }
        self.index = index;
        Ok(())
    }

    pub fn snapshot(&self) -> SnapshotQuery<'_> {
        SnapshotQuery::new(&self.ledger, &self.total_supply, self.index)
    }

    pub fn mint(&mut self, to: &AccountId, amount: Amount) -> Result<(), GovernanceError> {
        let update = self.token.prepare_mint(to, amount)?;
        let power = self.delegation.plan_balance_change(
            &self.ledger,
            to,
            BalanceDelta::Credit(amount),
            self.index,
        )?;
        self.total_supply.check_writable(self.index)?;

        let supply = update.total_supply();
        self.token.commit(update);
        self.total_supply.push(self.index, supply)?;
        self.commit_power(&power)?;
        self.events.push(GovernanceEvent::Transfer {
            from: None,
            to: Some(to.clone()),
            amount,
            index: self.index,
        });
        Ok(())
    }

    pub fn burn(&mut self, from: &AccountId, amount: Amount) -> Result<(), GovernanceError> {
        let update = self.token.prepare_burn(from, amount)?;
        let power = self.delegation.plan_balance_change(
            &self.ledger,
            from,
            BalanceDelta::Debit(amount),
            self.index,
        )?;
        self.total_supply.check_writable(self.index)?;

        let supply = update.total_supply();
        self.token.commit(update);
        self.total_supply.push(self.index, supply)?;
        self.commit_power(&power)?;
        self.events.push(GovernanceEvent::Transfer {
            from: Some(from.clone()),
            to: None,
            amount,
            index: self.index,
        });
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), GovernanceError> {
        let update = self.token.prepare_transfer(from, to, amount)?;
        let power = self
            .delegation
            .plan_transfer(&self.ledger, from, to, amount, self.index)?;

        self.token.commit(update);
        self.commit_power(&power)?;
        self.events.push(GovernanceEvent::Transfer {
            from: Some(from.clone()),
            to: Some(to.clone()),
            amount,
            index: self.index,
        });
        Ok(())
    }

    /// Re-point `account`'s weight at `to`. Self-delegation activates an
    /// account's own voting power.
    pub fn delegate(&mut self, account: &AccountId, to: &AccountId) -> Result<(), GovernanceError> {
        let weight = self.token.balance_of(account);
        let power = self
            .delegation
            .plan_delegate(&self.ledger, account, to, weight, self.index)?;

        self.commit_power(&power)?;
        let previous = self.delegation.set_delegate(account, to);
        self.events.push(GovernanceEvent::DelegateChanged {
            delegator: account.clone(),
            from_delegate: previous,
            to_delegate: to.clone(),
            index: self.index,
        });
        Ok(())
    }

    pub fn initialize_ballot(
        &mut self,
        names: Vec<Label>,
        target_index: LedgerIndex,
    ) -> Result<(), GovernanceError> {
        let events = self.ballot.initialize(names, target_index, self.index)?;
        self.events.extend(events);
        Ok(())
    }

    pub fn vote(
        &mut self,
        voter: &AccountId,
        proposal_id: usize,
        amount: Amount,
    ) -> Result<(), GovernanceError> {
        let source = SnapshotQuery::new(&self.ledger, &self.total_supply, self.index);
        let event = self.ballot.vote(&source, voter, proposal_id, amount)?;
        self.events.push(event);
        Ok(())
    }

    pub fn get_proposal(&self, id: usize) -> Result<(Label, Amount), GovernanceError> {
        self.ballot
            .proposal(id)
            .map(|proposal| (proposal.name, proposal.vote_count))
    }

    pub fn proposals_count(&self) -> Result<usize, GovernanceError> {
        self.ballot.proposals_count()
    }

    pub fn winning_proposal(&self) -> Result<usize, GovernanceError> {
        self.ballot.winning_proposal()
    }

    pub fn winner_name(&self) -> Result<Label, GovernanceError> {
        self.ballot.winner_name()
    }

    pub fn remaining_voting_power(&self, account: &AccountId) -> Result<Amount, GovernanceError> {
        self.ballot.remaining_voting_power(&self.snapshot(), account)
    }

    pub fn past_votes(
        &self,
        account: &AccountId,
        target: LedgerIndex,
    ) -> Result<Amount, GovernanceError> {
        self.snapshot().past_votes(account, target)
    }

    pub fn past_total_supply(&self, target: LedgerIndex) -> Result<Amount, GovernanceError> {
        self.snapshot().past_total_supply(target)
    }

    /// Current (unsettled) voting power.
    pub fn votes(&self, account: &AccountId) -> Amount {
        self.ledger.latest(account)
    }

    pub fn delegates(&self, account: &AccountId) -> Option<&AccountId> {
        self.delegation.delegates(account)
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.token.balance_of(account)
    }

    pub fn total_supply(&self) -> Amount {
        self.token.total_supply()
    }

    pub fn num_checkpoints(&self, account: &AccountId) -> usize {
        self.ledger.num_checkpoints(account)
    }

    pub fn checkpoint(&self, account: &AccountId, pos: usize) -> Option<Checkpoint> {
        self.ledger.checkpoint(account, pos)
    }

    pub fn events(&self) -> &[GovernanceEvent] {
        &self.events
    }

    pub fn token(&self) -> &Balances {
        &self.token
    }

    pub fn ledger(&self) -> &CheckpointLedger {
        &self.ledger
    }

    pub fn total_supply_history(&self) -> &CheckpointHistory {
        &self.total_supply
    }

    pub fn delegation(&self) -> &DelegationGraph {
        &self.delegation
    }

    pub fn ballot(&self) -> &Ballot {
        &self.ballot
    }

    fn commit_power(&mut self, power: &PowerMove) -> Result<(), GovernanceError> {
        power.apply(&mut self.ledger)?;
        for write in power.writes() {
            info!(
                delegate = %write.delegate,
                previous = write.previous,
                new = write.new,
                index = self.index,
                "delegate votes changed"
            );
            self.events.push(GovernanceEvent::DelegateVotesChanged {
                delegate: write.delegate.clone(),
                previous: write.previous,
                new: write.new,
                index: self.index,
            });
        }
        Ok(())
    }
}
