use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GovernanceError;
use crate::event::GovernanceEvent;
use crate::label::Label;
use crate::snapshot::VotingPowerSource;
use crate::{AccountId, Amount, LedgerIndex};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    pub name: Label,
    pub vote_count: Amount,
}

/// Lifecycle of the ballot. `Initialized` is terminal.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BallotState {
    #[default]
    Uninitialized,
    Initialized {
        target_index: LedgerIndex,
        proposals: Vec<Proposal>,
    },
}

/// Single one-shot ballot with per-account spend accounting.
///
/// Voting power is read exclusively through a [`VotingPowerSource`] at the
/// ballot's target index, so balance or delegation changes after the
/// snapshot cannot affect the outcome.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ballot {
    state: BallotState,
    spent: BTreeMap<AccountId, Amount>,
}

impl Ballot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &BallotState {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, BallotState::Initialized { .. })
    }

    pub fn target_index(&self) -> Result<LedgerIndex, GovernanceError> {
        match &self.state {
            BallotState::Initialized { target_index, .. } => Ok(*target_index),
            BallotState::Uninitialized => Err(GovernanceError::NotInitialized),
        }
    }

    pub fn proposals(&self) -> Result<&[Proposal], GovernanceError> {
        match &self.state {
            BallotState::Initialized { proposals, .. } => Ok(proposals),
            BallotState::Uninitialized => Err(GovernanceError::NotInitialized),
        }
    }

    /// Fix the snapshot index and proposal list. Ids follow input order.
    pub fn initialize(
        &mut self,
        names: Vec<Label>,
        target_index: LedgerIndex,
        current_index: LedgerIndex,
    ) -> Result<Vec<GovernanceEvent>, GovernanceError> {
        if self.is_initialized() {
            return Err(GovernanceError::AlreadyInitialized);
        }
        if target_index >= current_index {
            return Err(GovernanceError::TargetIndexNotPast {
                target: target_index,
                current: current_index,
            });
        }

        let mut events = Vec::with_capacity(names.len() + 1);
        events.push(GovernanceEvent::BallotInitialized {
            proposal_names: names.clone(),
            target_index,
        });
        let proposals: Vec<Proposal> = names
            .into_iter()
            .enumerate()
            .map(|(proposal_id, name)| {
                events.push(GovernanceEvent::ProposalAdded { proposal_id, name });
                Proposal {
                    name,
                    vote_count: 0,
                }
            })
            .collect();

        info!(
            target_index,
            proposals = proposals.len(),
            "ballot initialized"
        );
        self.state = BallotState::Initialized {
            target_index,
            proposals,
        };
        Ok(events)
    }

    /// Spend `amount` of `voter`'s snapshot power on `proposal_id`.
    ///
    /// The eligibility check and both accumulations are computed before
    /// either is stored.
    pub fn vote(
        &mut self,
        source: &impl VotingPowerSource,
        voter: &AccountId,
        proposal_id: usize,
        amount: Amount,
    ) -> Result<GovernanceEvent, GovernanceError> {
        let BallotState::Initialized {
            target_index,
            proposals,
        } = &mut self.state
        else {
            return Err(GovernanceError::NotInitialized);
        };
        let count = proposals.len();
        let proposal = proposals
            .get_mut(proposal_id)
            .ok_or(GovernanceError::InvalidProposal {
                id: proposal_id,
                count,
            })?;

        let power = source.past_votes(voter, *target_index)?;
        let spent = self.spent.get(voter).copied().unwrap_or(0);
        let total_spent = spent
            .checked_add(amount)
            .filter(|total| *total <= power)
            .ok_or_else(|| GovernanceError::InsufficientVotingPower {
                account: voter.clone(),
                available: power.saturating_sub(spent),
                requested: amount,
            })?;
        let vote_count = proposal
            .vote_count
            .checked_add(amount)
            .ok_or(GovernanceError::ArithmeticOverflow)?;

        proposal.vote_count = vote_count;
        self.spent.insert(voter.clone(), total_spent);
        info!(%voter, proposal_id, amount, total_spent, "vote cast");
        Ok(GovernanceEvent::VoteCast {
            voter: voter.clone(),
            proposal_id,
            amount,
        })
    }

    /// Cumulative amount `account` has committed so far.
    pub fn vote_power_spent(&self, account: &AccountId) -> Amount {
        self.spent.get(account).copied().unwrap_or(0)
    }

    pub fn spent_entries(&self) -> impl Iterator<Item = (&AccountId, &Amount)> {
        self.spent.iter()
    }

    pub fn remaining_voting_power(
        &self,
        source: &impl VotingPowerSource,
        account: &AccountId,
    ) -> Result<Amount, GovernanceError> {
        let target_index = self.target_index()?;
        let power = source.past_votes(account, target_index)?;
        power
            .checked_sub(self.vote_power_spent(account))
            .ok_or(GovernanceError::ArithmeticOverflow)
    }

    /// Id of the proposal with the strictly greatest tally.
    ///
    /// The leader only changes on a strict `>`, so ties go to the lowest id
    /// and a ballot without votes (or without proposals) yields 0.
    pub fn winning_proposal(&self) -> Result<usize, GovernanceError> {
        let proposals = self.proposals()?;
        let mut winning = 0;
        let mut winning_count: Amount = 0;
        for (id, proposal) in proposals.iter().enumerate() {
            if proposal.vote_count > winning_count {
                winning_count = proposal.vote_count;
                winning = id;
            }
        }
        Ok(winning)
    }

    pub fn winner_name(&self) -> Result<Label, GovernanceError> {
        let winning = self.winning_proposal()?;
        self.proposal(winning).map(|proposal| proposal.name)
    }

    pub fn proposal(&self, id: usize) -> Result<&Proposal, GovernanceError> {
        let proposals = self.proposals()?;
        proposals.get(id).ok_or(GovernanceError::InvalidProposal {
            id,
            count: proposals.len(),
        })
    }

    pub fn proposals_count(&self) -> Result<usize, GovernanceError> {
        self.proposals().map(<[Proposal]>::len)
    }
}
