use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;
use crate::{AccountId, Amount};

/// Validated balance changes, committed with [`Balances::commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct BalanceUpdate {
    balances: Vec<(AccountId, Amount)>,
    total_supply: Amount,
}

impl BalanceUpdate {
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }
}

/// Fungible balances backing voting weight.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balances {
    balances: BTreeMap<AccountId, Amount>,
    total_supply: Amount,
    max_supply: Amount,
}

impl Default for Balances {
    fn default() -> Self {
        Self::with_max_supply(Amount::MAX)
    }
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_supply(max_supply: Amount) -> Self {
        Self {
            balances: BTreeMap::new(),
            total_supply: 0,
            max_supply,
        }
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn max_supply(&self) -> Amount {
        self.max_supply
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&AccountId, &Amount)> {
        self.balances.iter()
    }

    pub fn prepare_mint(
        &self,
        to: &AccountId,
        amount: Amount,
    ) -> Result<BalanceUpdate, GovernanceError> {
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(GovernanceError::ArithmeticOverflow)?;
        if total_supply > self.max_supply {
            return Err(GovernanceError::SupplyCapExceeded {
                cap: self.max_supply,
                requested: total_supply,
            });
        }
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(GovernanceError::ArithmeticOverflow)?;
        Ok(BalanceUpdate {
            balances: vec![(to.clone(), balance)],
            total_supply,
        })
    }

    pub fn prepare_burn(
        &self,
        from: &AccountId,
        amount: Amount,
    ) -> Result<BalanceUpdate, GovernanceError> {
        let balance = self.debited(from, amount)?;
        let total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(GovernanceError::ArithmeticOverflow)?;
        Ok(BalanceUpdate {
            balances: vec![(from.clone(), balance)],
            total_supply,
        })
    }

    pub fn prepare_transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<BalanceUpdate, GovernanceError> {
        let from_balance = self.debited(from, amount)?;
        if from == to {
            return Ok(BalanceUpdate {
                balances: Vec::new(),
                total_supply: self.total_supply,
            });
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(GovernanceError::ArithmeticOverflow)?;
        Ok(BalanceUpdate {
            balances: vec![(from.clone(), from_balance), (to.clone(), to_balance)],
            total_supply: self.total_supply,
        })
    }

    pub fn commit(&mut self, update: BalanceUpdate) {
        for (account, balance) in update.balances {
            if balance == 0 {
                self.balances.remove(&account);
            } else {
                self.balances.insert(account, balance);
            }
        }
        self.total_supply = update.total_supply;
    }

    pub fn mint(&mut self, to: &AccountId, amount: Amount) -> Result<(), GovernanceError> {
        let update = self.prepare_mint(to, amount)?;
        self.commit(update);
        Ok(())
    }

    pub fn burn(&mut self, from: &AccountId, amount: Amount) -> Result<(), GovernanceError> {
        let update = self.prepare_burn(from, amount)?;
        self.commit(update);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), GovernanceError> {
        let update = self.prepare_transfer(from, to, amount)?;
        self.commit(update);
        Ok(())
    }

    fn debited(&self, account: &AccountId, amount: Amount) -> Result<Amount, GovernanceError> {
        let balance = self.balance_of(account);
        balance
            .checked_sub(amount)
            .ok_or_else(|| GovernanceError::InsufficientBalance {
                account: account.clone(),
                balance,
                needed: amount,
            })
    }
}
