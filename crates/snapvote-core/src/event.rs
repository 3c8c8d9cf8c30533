use serde::{Deserialize, Serialize};

use crate::label::Label;
use crate::{AccountId, Amount, LedgerIndex};

/// Audit record emitted by every committed mutation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceEvent {
    Transfer {
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: Amount,
        index: LedgerIndex,
    },
    DelegateChanged {
        delegator: AccountId,
        from_delegate: Option<AccountId>,
        to_delegate: AccountId,
        index: LedgerIndex,
    },
    DelegateVotesChanged {
        delegate: AccountId,
        previous: Amount,
        new: Amount,
        index: LedgerIndex,
    },
    BallotInitialized {
        proposal_names: Vec<Label>,
        target_index: LedgerIndex,
    },
    ProposalAdded {
        proposal_id: usize,
        name: Label,
    },
    VoteCast {
        voter: AccountId,
        proposal_id: usize,
        amount: Amount,
    },
}
