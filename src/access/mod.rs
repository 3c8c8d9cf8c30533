use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use snapvote_core::AccountId;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Minter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Minter => f.write_str("minter"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("account {account} lacks the {role} role")]
    Unauthorized { account: AccountId, role: Role },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    grants: BTreeMap<Role, BTreeSet<AccountId>>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy where every listed account holds both roles.
    pub fn bootstrap<I>(admins: I) -> Self
    where
        I: IntoIterator<Item = AccountId>,
    {
        let mut policy = Self::new();
        for admin in admins {
            policy.insert(Role::Admin, admin.clone());
            policy.insert(Role::Minter, admin);
        }
        policy
    }

    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.grants
            .get(&role)
            .map_or(false, |members| members.contains(account))
    }

    pub fn require(&self, role: Role, account: &AccountId) -> Result<(), AccessError> {
        if self.has_role(role, account) {
            return Ok(());
        }
        Err(AccessError::Unauthorized {
            account: account.clone(),
            role,
        })
    }

    /// Grant `role` to `account`; only admins may grant. Returns whether the
    /// grant is new.
    pub fn grant(
        &mut self,
        caller: &AccountId,
        role: Role,
        account: AccountId,
    ) -> Result<bool, AccessError> {
        self.require(Role::Admin, caller)?;
        Ok(self.insert(role, account))
    }

    pub fn revoke(
        &mut self,
        caller: &AccountId,
        role: Role,
        account: &AccountId,
    ) -> Result<bool, AccessError> {
        self.require(Role::Admin, caller)?;
        Ok(self
            .grants
            .get_mut(&role)
            .map_or(false, |members| members.remove(account)))
    }

    pub fn members(&self, role: Role) -> impl Iterator<Item = &AccountId> {
        self.grants.get(&role).into_iter().flatten()
    }

    fn insert(&mut self, role: Role, account: AccountId) -> bool {
        self.grants.entry(role).or_default().insert(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_admins_can_mint_and_grant() {
        let mut policy = AccessPolicy::bootstrap(vec!["root".to_string()]);
        assert!(policy.has_role(Role::Admin, &"root".into()));
        assert!(policy.has_role(Role::Minter, &"root".into()));
        assert!(policy
            .grant(&"root".into(), Role::Minter, "mint-bot".into())
            .unwrap());
        assert!(!policy
            .grant(&"root".into(), Role::Minter, "mint-bot".into())
            .unwrap());
        assert_eq!(policy.members(Role::Minter).count(), 2);
    }

    #[test]
    fn non_admin_cannot_grant_or_revoke() {
        let mut policy = AccessPolicy::bootstrap(vec!["root".to_string()]);
        let err = policy
            .grant(&"mallory".into(), Role::Admin, "mallory".into())
            .unwrap_err();
        assert_eq!(
            err,
            AccessError::Unauthorized {
                account: "mallory".into(),
                role: Role::Admin
            }
        );
        assert!(policy
            .revoke(&"mallory".into(), Role::Admin, &"root".into())
            .is_err());
        assert!(policy
            .revoke(&"root".into(), Role::Minter, &"root".into())
            .unwrap());
        assert!(policy.require(Role::Minter, &"root".into()).is_err());
    }
}
