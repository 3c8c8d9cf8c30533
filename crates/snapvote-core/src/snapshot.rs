use crate::checkpoint::{CheckpointHistory, CheckpointLedger};
use crate::error::GovernanceError;
use crate::{AccountId, Amount, LedgerIndex};

/// Historical voting power, the only view a ballot has of the ledger.
pub trait VotingPowerSource {
    fn past_votes(&self, account: &AccountId, target: LedgerIndex)
        -> Result<Amount, GovernanceError>;
}

/// Read-only settled-history view over the checkpoint ledger.
///
/// Queries at or after `current` fail with
/// [`GovernanceError::FutureIndexQuery`]: the current index can still change.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotQuery<'a> {
    ledger: &'a CheckpointLedger,
    supply: &'a CheckpointHistory,
    current: LedgerIndex,
}

impl<'a> SnapshotQuery<'a> {
    pub fn new(
        ledger: &'a CheckpointLedger,
        supply: &'a CheckpointHistory,
        current: LedgerIndex,
    ) -> Self {
        Self {
            ledger,
            supply,
            current,
        }
    }

    pub fn current_index(&self) -> LedgerIndex {
        self.current
    }

    pub fn past_total_supply(&self, target: LedgerIndex) -> Result<Amount, GovernanceError> {
        self.ensure_settled(target)?;
        Ok(self.supply.upper_lookup(target))
    }

    fn ensure_settled(&self, target: LedgerIndex) -> Result<(), GovernanceError> {
        if target >= self.current {
            return Err(GovernanceError::FutureIndexQuery {
                requested: target,
                current: self.current,
            });
        }
        Ok(())
    }
}

impl VotingPowerSource for SnapshotQuery<'_> {
    fn past_votes(
        &self,
        account: &AccountId,
        target: LedgerIndex,
    ) -> Result<Amount, GovernanceError> {
        self.ensure_settled(target)?;
        Ok(self.ledger.read(account, target))
    }
}
