use thiserror::Error;

use crate::{AccountId, Amount, LedgerIndex};

/// Canonical error type exposed by the core state machines.
///
/// Every variant is a precondition failure: the operation that produced it
/// changed nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    /// `initialize_ballot` was called on a ballot that is already live.
    #[error("ballot already initialized")]
    AlreadyInitialized,

    /// The snapshot index is not strictly before the current ledger index.
    #[error("snapshot index {target} is not before current index {current}")]
    TargetIndexNotPast {
        target: LedgerIndex,
        current: LedgerIndex,
    },

    /// A ballot query or vote arrived before initialization.
    #[error("ballot not initialized")]
    NotInitialized,

    /// Proposal id outside `0..count`.
    #[error("proposal {id} out of range ({count} proposals)")]
    InvalidProposal { id: usize, count: usize },

    /// Requested spend exceeds what is left of the snapshot power.
    #[error("account {account} has {available} voting power left, {requested} requested")]
    InsufficientVotingPower {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    /// An accumulation would leave the numeric domain.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// History at or after the current index is not settled yet.
    #[error("index {requested} is not settled (current index {current})")]
    FutureIndexQuery {
        requested: LedgerIndex,
        current: LedgerIndex,
    },

    /// A checkpoint write tried to go back in time.
    #[error("checkpoint at index {requested} precedes last checkpoint at {last}")]
    CheckpointOutOfOrder {
        last: LedgerIndex,
        requested: LedgerIndex,
    },

    #[error("insufficient balance in account {account}: {balance} < {needed}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        needed: Amount,
    },

    #[error("supply cap {cap} exceeded (total would be {requested})")]
    SupplyCapExceeded { cap: Amount, requested: Amount },

    #[error("label is {len} bytes, at most {max} allowed")]
    LabelTooLong { len: usize, max: usize },

    #[error("label bytes are not valid UTF-8")]
    LabelNotUtf8,

    #[error("ledger index must move forward")]
    IndexNotAdvanced,
}
