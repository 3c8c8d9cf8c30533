use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checkpoint::CheckpointLedger;
use crate::error::GovernanceError;
use crate::{AccountId, Amount, LedgerIndex};

/// Signed change to an account's underlying balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceDelta {
    Credit(Amount),
    Debit(Amount),
}

/// One delegate's voting power before and after a move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerWrite {
    pub delegate: AccountId,
    pub previous: Amount,
    pub new: Amount,
}

/// Checkpoint writes for a voting power move, computed before anything is
/// written so both sides land together or not at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct PowerMove {
    index: LedgerIndex,
    writes: Vec<PowerWrite>,
}

impl PowerMove {
    pub fn writes(&self) -> &[PowerWrite] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commit the planned writes. Ordering was validated while planning.
    pub fn apply(&self, ledger: &mut CheckpointLedger) -> Result<(), GovernanceError> {
        for write in &self.writes {
            ledger.write(&write.delegate, write.new, self.index)?;
        }
        Ok(())
    }
}

/// Result of a delegation change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegationChange {
    pub previous: Option<AccountId>,
    pub power: PowerMove,
}

/// Maps each account to the account currently credited with its weight.
///
/// An account with no entry is undelegated: its balance counts toward
/// nobody's voting power, including its own.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelegationGraph {
    delegates: BTreeMap<AccountId, AccountId>,
}

impl DelegationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delegates(&self, account: &AccountId) -> Option<&AccountId> {
        self.delegates.get(account)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &AccountId)> {
        self.delegates.iter()
    }

    /// Plan moving `amount` of voting power from `from` to `to` at `index`.
    ///
    /// `None` on either side stands for weight entering or leaving the
    /// delegated pool. Moves between the same delegate produce no writes.
    pub fn plan_move(
        ledger: &CheckpointLedger,
        from: Option<&AccountId>,
        to: Option<&AccountId>,
        amount: Amount,
        index: LedgerIndex,
    ) -> Result<PowerMove, GovernanceError> {
        let mut power = PowerMove {
            index,
            writes: Vec::new(),
        };
        if amount == 0 || from == to {
            return Ok(power);
        }
        if let Some(source) = from {
            ledger.check_writable(source, index)?;
            let previous = ledger.latest(source);
            let new = previous
                .checked_sub(amount)
                .ok_or(GovernanceError::ArithmeticOverflow)?;
            power.writes.push(PowerWrite {
                delegate: source.clone(),
                previous,
                new,
            });
        }
        if let Some(target) = to {
            ledger.check_writable(target, index)?;
            let previous = ledger.latest(target);
            let new = previous
                .checked_add(amount)
                .ok_or(GovernanceError::ArithmeticOverflow)?;
            power.writes.push(PowerWrite {
                delegate: target.clone(),
                previous,
                new,
            });
        }
        Ok(power)
    }

    /// Plan re-pointing `account` (holding `weight`) at `new_delegate`.
    pub fn plan_delegate(
        &self,
        ledger: &CheckpointLedger,
        account: &AccountId,
        new_delegate: &AccountId,
        weight: Amount,
        index: LedgerIndex,
    ) -> Result<PowerMove, GovernanceError> {
        Self::plan_move(
            ledger,
            self.delegates(account),
            Some(new_delegate),
            weight,
            index,
        )
    }

    /// Plan the delegate-side adjustment for a change in `account`'s balance.
    pub fn plan_balance_change(
        &self,
        ledger: &CheckpointLedger,
        account: &AccountId,
        delta: BalanceDelta,
        index: LedgerIndex,
    ) -> Result<PowerMove, GovernanceError> {
        let delegate = self.delegates(account);
        match delta {
            BalanceDelta::Credit(amount) => Self::plan_move(ledger, None, delegate, amount, index),
            BalanceDelta::Debit(amount) => Self::plan_move(ledger, delegate, None, amount, index),
        }
    }

    /// Plan the weight move for a balance transfer between two accounts.
    pub fn plan_transfer(
        &self,
        ledger: &CheckpointLedger,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        index: LedgerIndex,
    ) -> Result<PowerMove, GovernanceError> {
        Self::plan_move(
            ledger,
            self.delegates(from),
            self.delegates(to),
            amount,
            index,
        )
    }

    /// Point `account` at `new_delegate` and move its weight in one step.
    pub fn delegate(
        &mut self,
        ledger: &mut CheckpointLedger,
        account: &AccountId,
        new_delegate: &AccountId,
        weight: Amount,
        index: LedgerIndex,
    ) -> Result<DelegationChange, GovernanceError> {
        let power = self.plan_delegate(ledger, account, new_delegate, weight, index)?;
        power.apply(ledger)?;
        let previous = self.set_delegate(account, new_delegate);
        Ok(DelegationChange { previous, power })
    }

    /// Adjust `account`'s delegate for a balance change.
    pub fn balance_change(
        &self,
        ledger: &mut CheckpointLedger,
        account: &AccountId,
        delta: BalanceDelta,
        index: LedgerIndex,
    ) -> Result<PowerMove, GovernanceError> {
        let power = self.plan_balance_change(ledger, account, delta, index)?;
        power.apply(ledger)?;
        Ok(power)
    }

    /// Record the new delegate without touching checkpoints.
    pub fn set_delegate(
        &mut self,
        account: &AccountId,
        new_delegate: &AccountId,
    ) -> Option<AccountId> {
        let previous = self
            .delegates
            .insert(account.clone(), new_delegate.clone());
        debug!(%account, ?previous, delegate = %new_delegate, "delegate set");
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> AccountId {
        name.to_string()
    }

    #[test]
    fn first_delegation_only_credits_new_delegate() {
        let mut ledger = CheckpointLedger::new();
        let mut graph = DelegationGraph::new();
        let change = graph
            .delegate(&mut ledger, &id("alice"), &id("alice"), 100, 1)
            .unwrap();
        assert_eq!(change.previous, None);
        assert_eq!(change.power.writes().len(), 1);
        assert_eq!(ledger.latest(&id("alice")), 100);
        assert_eq!(graph.delegates(&id("alice")), Some(&id("alice")));
    }

    #[test]
    fn redelegation_moves_weight_at_one_index() {
        let mut ledger = CheckpointLedger::new();
        let mut graph = DelegationGraph::new();
        graph
            .delegate(&mut ledger, &id("alice"), &id("bob"), 60, 1)
            .unwrap();
        ledger.write(&id("carol"), 15, 1).unwrap();
        let change = graph
            .delegate(&mut ledger, &id("alice"), &id("carol"), 60, 4)
            .unwrap();
        assert_eq!(change.previous, Some(id("bob")));
        assert_eq!(ledger.read(&id("bob"), 3), 60);
        assert_eq!(ledger.read(&id("bob"), 4), 0);
        assert_eq!(ledger.read(&id("carol"), 3), 15);
        assert_eq!(ledger.read(&id("carol"), 4), 75);
    }

    #[test]
    fn redelegating_to_same_delegate_writes_nothing() {
        let mut ledger = CheckpointLedger::new();
        let mut graph = DelegationGraph::new();
        graph
            .delegate(&mut ledger, &id("alice"), &id("bob"), 10, 1)
            .unwrap();
        let change = graph
            .delegate(&mut ledger, &id("alice"), &id("bob"), 10, 2)
            .unwrap();
        assert!(change.power.is_empty());
        assert_eq!(ledger.num_checkpoints(&id("bob")), 1);
    }

    #[test]
    fn balance_change_adjusts_delegate_not_holder() {
        let mut ledger = CheckpointLedger::new();
        let mut graph = DelegationGraph::new();
        graph
            .delegate(&mut ledger, &id("alice"), &id("bob"), 10, 1)
            .unwrap();
        graph
            .balance_change(&mut ledger, &id("alice"), BalanceDelta::Credit(5), 2)
            .unwrap();
        assert_eq!(ledger.latest(&id("bob")), 15);
        assert_eq!(ledger.latest(&id("alice")), 0);

        graph
            .balance_change(&mut ledger, &id("alice"), BalanceDelta::Debit(7), 2)
            .unwrap();
        assert_eq!(ledger.latest(&id("bob")), 8);
        assert_eq!(ledger.num_checkpoints(&id("bob")), 2);
    }

    #[test]
    fn undelegated_balance_changes_touch_no_checkpoint() {
        let mut ledger = CheckpointLedger::new();
        let graph = DelegationGraph::new();
        let power = graph
            .balance_change(&mut ledger, &id("dave"), BalanceDelta::Credit(50), 1)
            .unwrap();
        assert!(power.is_empty());
        assert_eq!(ledger.num_checkpoints(&id("dave")), 0);
    }

    #[test]
    fn failed_plan_leaves_both_sides_untouched() {
        let mut ledger = CheckpointLedger::new();
        let mut graph = DelegationGraph::new();
        graph
            .delegate(&mut ledger, &id("alice"), &id("bob"), 10, 1)
            .unwrap();
        ledger.write(&id("carol"), Amount::MAX, 1).unwrap();
        let err = graph
            .delegate(&mut ledger, &id("alice"), &id("carol"), 10, 2)
            .unwrap_err();
        assert_eq!(err, GovernanceError::ArithmeticOverflow);
        assert_eq!(ledger.latest(&id("bob")), 10);
        assert_eq!(ledger.num_checkpoints(&id("bob")), 1);
        assert_eq!(graph.delegates(&id("alice")), Some(&id("bob")));
    }
}
