use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GovernanceError;
use crate::{AccountId, Amount, LedgerIndex};

/// Voting power recorded at `index`, valid until the next checkpoint.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub index: LedgerIndex,
    pub value: Amount,
}

/// Ordered checkpoint sequence for a single subject.
///
/// Indices are strictly increasing and unique: a second write at the last
/// recorded index overwrites that checkpoint instead of appending.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CheckpointHistory {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` at `index` and return the value it supersedes.
    pub fn push(&mut self, index: LedgerIndex, value: Amount) -> Result<Amount, GovernanceError> {
        self.check_writable(index)?;
        if let Some(last) = self.checkpoints.last_mut() {
            if last.index == index {
                let previous = last.value;
                last.value = value;
                return Ok(previous);
            }
        }
        let previous = self.latest();
        self.checkpoints.push(Checkpoint { index, value });
        Ok(previous)
    }

    /// Fails when a write at `index` would violate ordering.
    pub fn check_writable(&self, index: LedgerIndex) -> Result<(), GovernanceError> {
        match self.checkpoints.last() {
            Some(last) if index < last.index => Err(GovernanceError::CheckpointOutOfOrder {
                last: last.index,
                requested: index,
            }),
            _ => Ok(()),
        }
    }

    /// Most recent value, zero when nothing was ever recorded.
    pub fn latest(&self) -> Amount {
        self.checkpoints.last().map_or(0, |c| c.value)
    }

    pub fn last_index(&self) -> Option<LedgerIndex> {
        self.checkpoints.last().map(|c| c.index)
    }

    /// Value of the checkpoint with the greatest index `<= index`, or zero.
    pub fn upper_lookup(&self, index: LedgerIndex) -> Amount {
        let pos = self.checkpoints.partition_point(|c| c.index <= index);
        match pos {
            0 => 0,
            n => self.checkpoints[n - 1].value,
        }
    }

    pub fn get(&self, pos: usize) -> Option<Checkpoint> {
        self.checkpoints.get(pos).copied()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }
}

/// Per-account voting power histories.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointLedger {
    accounts: BTreeMap<AccountId, CheckpointHistory>,
}

impl CheckpointLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append or overwrite `account`'s checkpoint at `index`.
    ///
    /// Returns the value that was current before the write. No other account
    /// is touched, and a rejected write leaves the ledger unchanged.
    pub fn write(
        &mut self,
        account: &AccountId,
        value: Amount,
        index: LedgerIndex,
    ) -> Result<Amount, GovernanceError> {
        self.check_writable(account, index)?;
        let previous = self
            .accounts
            .entry(account.clone())
            .or_default()
            .push(index, value)?;
        debug!(%account, index, previous, value, "checkpoint written");
        Ok(previous)
    }

    pub fn check_writable(
        &self,
        account: &AccountId,
        index: LedgerIndex,
    ) -> Result<(), GovernanceError> {
        match self.accounts.get(account) {
            Some(history) => history.check_writable(index),
            None => Ok(()),
        }
    }

    /// Point-in-time value for `account` at `index`.
    ///
    /// This does not reject unsettled indices; snapshot consumers go through
    /// [`crate::snapshot::SnapshotQuery`], which does.
    pub fn read(&self, account: &AccountId, index: LedgerIndex) -> Amount {
        self.accounts
            .get(account)
            .map_or(0, |history| history.upper_lookup(index))
    }

    pub fn latest(&self, account: &AccountId) -> Amount {
        self.accounts.get(account).map_or(0, CheckpointHistory::latest)
    }

    pub fn history(&self, account: &AccountId) -> Option<&CheckpointHistory> {
        self.accounts.get(account)
    }

    pub fn num_checkpoints(&self, account: &AccountId) -> usize {
        self.accounts.get(account).map_or(0, CheckpointHistory::len)
    }

    pub fn checkpoint(&self, account: &AccountId, pos: usize) -> Option<Checkpoint> {
        self.accounts.get(account).and_then(|history| history.get(pos))
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&AccountId, &CheckpointHistory)> {
        self.accounts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn alice() -> AccountId {
        "alice".to_string()
    }

    #[test]
    fn writes_append_on_new_index_and_overwrite_on_same_index() {
        let mut ledger = CheckpointLedger::new();
        assert_eq!(ledger.write(&alice(), 10, 3).unwrap(), 0);
        assert_eq!(ledger.write(&alice(), 25, 3).unwrap(), 10);
        assert_eq!(ledger.num_checkpoints(&alice()), 1);
        assert_eq!(ledger.write(&alice(), 5, 7).unwrap(), 25);
        assert_eq!(ledger.num_checkpoints(&alice()), 2);
        assert_eq!(
            ledger.checkpoint(&alice(), 0),
            Some(Checkpoint { index: 3, value: 25 })
        );
        assert_eq!(ledger.latest(&alice()), 5);
    }

    #[test]
    fn reads_resolve_to_greatest_index_not_after_query() {
        let mut ledger = CheckpointLedger::new();
        ledger.write(&alice(), 100, 2).unwrap();
        ledger.write(&alice(), 40, 5).unwrap();
        ledger.write(&alice(), 0, 9).unwrap();
        assert_eq!(ledger.read(&alice(), 0), 0);
        assert_eq!(ledger.read(&alice(), 1), 0);
        assert_eq!(ledger.read(&alice(), 2), 100);
        assert_eq!(ledger.read(&alice(), 4), 100);
        assert_eq!(ledger.read(&alice(), 5), 40);
        assert_eq!(ledger.read(&alice(), 8), 40);
        assert_eq!(ledger.read(&alice(), 9), 0);
        assert_eq!(ledger.read(&"nobody".to_string(), 9), 0);
    }

    #[test]
    fn out_of_order_write_is_rejected_without_change() {
        let mut ledger = CheckpointLedger::new();
        ledger.write(&alice(), 10, 4).unwrap();
        let err = ledger.write(&alice(), 99, 3).unwrap_err();
        assert_eq!(
            err,
            GovernanceError::CheckpointOutOfOrder {
                last: 4,
                requested: 3
            }
        );
        assert_eq!(ledger.num_checkpoints(&alice()), 1);
        assert_eq!(ledger.latest(&alice()), 10);
    }

    proptest! {
        #[test]
        fn read_matches_last_write_at_or_before_index(
            steps in proptest::collection::vec((0u64..4, any::<u64>()), 1..40),
            probes in proptest::collection::vec(0u64..200, 1..20),
        ) {
            let mut ledger = CheckpointLedger::new();
            let mut model: Vec<(LedgerIndex, Amount)> = Vec::new();
            let mut index = 0;
            for (gap, value) in steps {
                index += gap;
                ledger.write(&alice(), value, index).unwrap();
                model.push((index, value));
            }
            for probe in probes {
                let expected = model
                    .iter()
                    .rev()
                    .find(|(idx, _)| *idx <= probe)
                    .map_or(0, |(_, value)| *value);
                prop_assert_eq!(ledger.read(&alice(), probe), expected);
            }
        }
    }
}
