use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use snapvote_core::governor::Governor;
use snapvote_core::label::Label;
use snapvote_core::{AccountId, Amount, GovernanceError, LedgerIndex};

use crate::access::{AccessError, AccessPolicy, Role};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file {} not found (run `snapvote init` first)", .path.display())]
    MissingState { path: PathBuf },
    #[error("state file {} already exists (pass --force to replace it)", .path.display())]
    StateExists { path: PathBuf },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state root mismatch: recorded {recorded}, computed {computed}")]
    StateRootMismatch { recorded: Hash32, computed: Hash32 },
    #[error("batch pinned to index {expected}, ledger is at {current}")]
    StaleBatch {
        expected: LedgerIndex,
        current: LedgerIndex,
    },
    #[error("operation {position} rejected: {source}")]
    Governance {
        position: usize,
        #[source]
        source: GovernanceError,
    },
    #[error("operation {position} rejected: {source}")]
    Access {
        position: usize,
        #[source]
        source: AccessError,
    },
    #[error(transparent)]
    Index(#[from] GovernanceError),
}

/// 32-byte digest rendered as hex in JSON and on screen.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash32(pub [u8; 32]);

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({self})")
    }
}

impl Serialize for Hash32 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let mut raw = [0u8; 32];
        hex::decode_to_slice(encoded.trim(), &mut raw).map_err(D::Error::custom)?;
        Ok(Hash32(raw))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    GrantRole {
        caller: AccountId,
        role: Role,
        account: AccountId,
    },
    RevokeRole {
        caller: AccountId,
        role: Role,
        account: AccountId,
    },
    Mint {
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Burn {
        from: AccountId,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Delegate {
        account: AccountId,
        to: AccountId,
    },
    InitializeBallot {
        caller: AccountId,
        proposals: Vec<Label>,
        target_index: LedgerIndex,
    },
    Vote {
        voter: AccountId,
        proposal_id: usize,
        amount: Amount,
    },
}

/// Operations applied together at one ledger index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Batch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_index: Option<LedgerIndex>,
    pub operations: Vec<Operation>,
}

impl Batch {
    pub fn single(operation: Operation) -> Self {
        Self {
            expected_index: None,
            operations: vec![operation],
        }
    }

    pub fn digest(&self) -> Result<Hash32, StoreError> {
        let encoded = serde_json::to_vec(self)?;
        Ok(Hash32(Sha256::digest(&encoded).into()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    pub batches_applied: u64,
    pub last_batch: Option<Hash32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReceipt {
    pub batch: Hash32,
    pub applied_at: LedgerIndex,
    pub next_index: LedgerIndex,
    pub operations: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerState {
    pub meta: SnapshotMetadata,
    pub access: AccessPolicy,
    pub governor: Governor,
}

#[derive(Serialize, Deserialize)]
struct StateDocument {
    state: LedgerState,
    state_root: Hash32,
}

impl LedgerState {
    pub fn new(access: AccessPolicy, governor: Governor) -> Self {
        Self {
            meta: SnapshotMetadata::default(),
            access,
            governor,
        }
    }

    /// Apply every operation at the current index, then advance the index.
    ///
    /// The batch runs against a staged copy; on any failure `self` is left
    /// exactly as it was.
    pub fn apply_batch(&mut self, batch: &Batch) -> Result<BatchReceipt, StoreError> {
        let applied_at = self.governor.current_index();
        if let Some(expected) = batch.expected_index {
            if expected != applied_at {
                return Err(StoreError::StaleBatch {
                    expected,
                    current: applied_at,
                });
            }
        }
        let digest = batch.digest()?;

        let mut staged = self.clone();
        for (position, operation) in batch.operations.iter().enumerate() {
            debug!(position, ?operation, "applying operation");
            staged.apply_operation(position, operation)?;
        }
        let next_index = staged.governor.advance(1)?;
        staged.meta.batches_applied += 1;
        staged.meta.last_batch = Some(digest);
        *self = staged;

        info!(
            batch = %digest,
            applied_at,
            operations = batch.operations.len(),
            "batch committed"
        );
        Ok(BatchReceipt {
            batch: digest,
            applied_at,
            next_index,
            operations: batch.operations.len(),
        })
    }

    fn apply_operation(&mut self, position: usize, operation: &Operation) -> Result<(), StoreError> {
        let access = |source| StoreError::Access { position, source };
        let governance = |source| StoreError::Governance { position, source };
        match operation {
            Operation::GrantRole {
                caller,
                role,
                account,
            } => {
                self.access
                    .grant(caller, *role, account.clone())
                    .map_err(access)?;
            }
            Operation::RevokeRole {
                caller,
                role,
                account,
            } => {
                self.access.revoke(caller, *role, account).map_err(access)?;
            }
            Operation::Mint { caller, to, amount } => {
                self.access.require(Role::Minter, caller).map_err(access)?;
                self.governor.mint(to, *amount).map_err(governance)?;
            }
            Operation::Burn { from, amount } => {
                self.governor.burn(from, *amount).map_err(governance)?;
            }
            Operation::Transfer { from, to, amount } => {
                self.governor
                    .transfer(from, to, *amount)
                    .map_err(governance)?;
            }
            Operation::Delegate { account, to } => {
                self.governor.delegate(account, to).map_err(governance)?;
            }
            Operation::InitializeBallot {
                caller,
                proposals,
                target_index,
            } => {
                self.access.require(Role::Admin, caller).map_err(access)?;
                self.governor
                    .initialize_ballot(proposals.clone(), *target_index)
                    .map_err(governance)?;
            }
            Operation::Vote {
                voter,
                proposal_id,
                amount,
            } => {
                self.governor
                    .vote(voter, *proposal_id, *amount)
                    .map_err(governance)?;
            }
        }
        Ok(())
    }

    pub fn state_root(&self) -> Result<Hash32, StoreError> {
        compute_state_root(self).map(Hash32)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::MissingState {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path)?;
        let document: StateDocument = serde_json::from_slice(&bytes)?;
        let computed = document.state.state_root()?;
        if computed != document.state_root {
            return Err(StoreError::StateRootMismatch {
                recorded: document.state_root,
                computed,
            });
        }
        Ok(document.state)
    }

    /// Write the whole state as one document, replacing the previous file
    /// only once the new one is complete.
    pub fn save(&self, path: &Path) -> Result<Hash32, StoreError> {
        let state_root = self.state_root()?;
        let document = StateDocument {
            state: self.clone(),
            state_root,
        };
        let encoded = serde_json::to_vec_pretty(&document)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, encoded)?;
        fs::rename(&staging, path)?;
        debug!(path = %path.display(), root = %state_root, "state saved");
        Ok(state_root)
    }
}

/// Length-prefixed field.
fn put_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn put_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn leaf(tag: &[u8]) -> Sha256 {
    let mut hasher = Sha256::new();
    put_bytes(&mut hasher, tag);
    hasher
}

fn compute_state_root(state: &LedgerState) -> Result<[u8; 32], StoreError> {
    let governor = &state.governor;
    let mut leaves: Vec<[u8; 32]> = Vec::new();

    let mut hasher = leaf(b"index");
    hasher.update(governor.current_index().to_le_bytes());
    hasher.update(state.meta.batches_applied.to_le_bytes());
    match state.meta.last_batch {
        Some(last) => {
            hasher.update([1u8]);
            hasher.update(last.0);
        }
        None => hasher.update([0u8]),
    }
    leaves.push(hasher.finalize().into());

    for (account, balance) in governor.token().accounts() {
        let mut hasher = leaf(b"bal");
        put_bytes(&mut hasher, account.as_bytes());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    let mut hasher = leaf(b"supply");
    hasher.update(governor.token().max_supply().to_le_bytes());
    put_len(&mut hasher, governor.total_supply_history().len());
    for checkpoint in governor.total_supply_history().iter() {
        hasher.update(checkpoint.index.to_le_bytes());
        hasher.update(checkpoint.value.to_le_bytes());
    }
    leaves.push(hasher.finalize().into());

    for (account, history) in governor.ledger().accounts() {
        let mut hasher = leaf(b"ckpt");
        put_bytes(&mut hasher, account.as_bytes());
        put_len(&mut hasher, history.len());
        for checkpoint in history.iter() {
            hasher.update(checkpoint.index.to_le_bytes());
            hasher.update(checkpoint.value.to_le_bytes());
        }
        leaves.push(hasher.finalize().into());
    }
    for (account, delegate) in governor.delegation().iter() {
        let mut hasher = leaf(b"dlg");
        put_bytes(&mut hasher, account.as_bytes());
        put_bytes(&mut hasher, delegate.as_bytes());
        leaves.push(hasher.finalize().into());
    }

    let ballot = governor.ballot();
    let mut hasher = leaf(b"ballot");
    match (ballot.target_index(), ballot.proposals()) {
        (Ok(target), Ok(proposals)) => {
            hasher.update([1u8]);
            hasher.update(target.to_le_bytes());
            put_len(&mut hasher, proposals.len());
            for proposal in proposals {
                hasher.update(proposal.name.as_bytes());
                hasher.update(proposal.vote_count.to_le_bytes());
            }
        }
        _ => hasher.update([0u8]),
    }
    leaves.push(hasher.finalize().into());
    for (account, spent) in ballot.spent_entries() {
        let mut hasher = leaf(b"spent");
        put_bytes(&mut hasher, account.as_bytes());
        hasher.update(spent.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }

    for role in [Role::Admin, Role::Minter] {
        let mut hasher = leaf(b"role");
        put_bytes(&mut hasher, role.to_string().as_bytes());
        let members: Vec<&AccountId> = state.access.members(role).collect();
        put_len(&mut hasher, members.len());
        for member in members {
            put_bytes(&mut hasher, member.as_bytes());
        }
        leaves.push(hasher.finalize().into());
    }

    for event in governor.events() {
        let mut hasher = leaf(b"event");
        put_bytes(&mut hasher, &serde_json::to_vec(event)?);
        leaves.push(hasher.finalize().into());
    }

    let count = leaves.len();
    let mut hasher = leaf(b"root");
    put_len(&mut hasher, count);
    hasher.update(build_merkle(leaves));
    Ok(hasher.finalize().into())
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"snapvote-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<Label> {
        names.iter().map(|name| Label::new(name).unwrap()).collect()
    }

    fn fresh() -> LedgerState {
        LedgerState::new(
            AccessPolicy::bootstrap(vec!["admin".to_string()]),
            Governor::new(),
        )
    }

    fn seeded() -> LedgerState {
        let mut state = fresh();
        state
            .apply_batch(&Batch {
                expected_index: Some(0),
                operations: vec![
                    Operation::Mint {
                        caller: "admin".into(),
                        to: "alice".into(),
                        amount: 100,
                    },
                    Operation::Delegate {
                        account: "alice".into(),
                        to: "alice".into(),
                    },
                    Operation::Transfer {
                        from: "alice".into(),
                        to: "bob".into(),
                        amount: 10,
                    },
                    Operation::Transfer {
                        from: "alice".into(),
                        to: "bob".into(),
                        amount: 15,
                    },
                ],
            })
            .unwrap();
        state
    }

    #[test]
    fn batch_lands_on_one_index_then_advances() {
        let state = seeded();
        assert_eq!(state.governor.current_index(), 1);
        assert_eq!(state.governor.num_checkpoints(&"alice".into()), 1);
        assert_eq!(state.governor.past_votes(&"alice".into(), 0).unwrap(), 75);
        assert_eq!(state.meta.batches_applied, 1);
        assert!(state.meta.last_batch.is_some());
    }

    #[test]
    fn failing_operation_rolls_back_whole_batch() {
        let mut state = seeded();
        let before = state.clone();
        let err = state
            .apply_batch(&Batch {
                expected_index: None,
                operations: vec![
                    Operation::Transfer {
                        from: "alice".into(),
                        to: "carol".into(),
                        amount: 5,
                    },
                    Operation::Vote {
                        voter: "alice".into(),
                        proposal_id: 0,
                        amount: 1,
                    },
                ],
            })
            .unwrap_err();
        match err {
            StoreError::Governance { position, source } => {
                assert_eq!(position, 1);
                assert_eq!(source, GovernanceError::NotInitialized);
            }
            _ => panic!("unexpected error"),
        }
        assert_eq!(state, before);
    }

    #[test]
    fn admin_capability_gates_ballot_and_minting() {
        let mut state = seeded();
        let err = state
            .apply_batch(&Batch::single(Operation::InitializeBallot {
                caller: "alice".into(),
                proposals: labels(&["a"]),
                target_index: 0,
            }))
            .unwrap_err();
        assert!(matches!(err, StoreError::Access { .. }));
        let err = state
            .apply_batch(&Batch::single(Operation::Mint {
                caller: "bob".into(),
                to: "bob".into(),
                amount: 1,
            }))
            .unwrap_err();
        assert!(matches!(err, StoreError::Access { .. }));

        state
            .apply_batch(&Batch {
                expected_index: None,
                operations: vec![
                    Operation::InitializeBallot {
                        caller: "admin".into(),
                        proposals: labels(&["a", "b"]),
                        target_index: 0,
                    },
                    Operation::Vote {
                        voter: "alice".into(),
                        proposal_id: 1,
                        amount: 75,
                    },
                ],
            })
            .unwrap();
        assert_eq!(state.governor.winning_proposal().unwrap(), 1);
        assert_eq!(
            state.governor.remaining_voting_power(&"alice".into()).unwrap(),
            0
        );
    }

    #[test]
    fn pinned_batch_applies_once() {
        let mut state = fresh();
        let batch = Batch {
            expected_index: Some(0),
            operations: vec![Operation::Mint {
                caller: "admin".into(),
                to: "alice".into(),
                amount: 1,
            }],
        };
        state.apply_batch(&batch).unwrap();
        let err = state.apply_batch(&batch).unwrap_err();
        match err {
            StoreError::StaleBatch { expected, current } => {
                assert_eq!(expected, 0);
                assert_eq!(current, 1);
            }
            _ => panic!("unexpected error"),
        }
        assert_eq!(state.governor.balance_of(&"alice".into()), 1);
    }

    #[test]
    fn state_root_is_deterministic_and_tracks_changes() {
        let state = seeded();
        assert_eq!(state.state_root().unwrap(), seeded().state_root().unwrap());
        let mut changed = seeded();
        changed
            .apply_batch(&Batch::single(Operation::Delegate {
                account: "bob".into(),
                to: "bob".into(),
            }))
            .unwrap();
        assert_ne!(state.state_root().unwrap(), changed.state_root().unwrap());
    }

    #[test]
    fn save_and_load_roundtrip_and_detect_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = seeded();
        let root = state.save(&path).unwrap();
        let loaded = LedgerState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.state_root().unwrap(), root);

        let text = fs::read_to_string(&path).unwrap();
        let tampered = text.replacen("\"alice\": 75", "\"alice\": 76", 1);
        assert_ne!(text, tampered);
        fs::write(&path, tampered).unwrap();
        let err = LedgerState::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::StateRootMismatch { .. }));
    }

    fn tamper(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut document: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        edit(&mut document);
        fs::write(path, serde_json::to_vec_pretty(&document).unwrap()).unwrap();
    }

    #[test]
    fn account_name_cannot_absorb_checkpoint_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = seeded();
        state.save(&path).unwrap();

        let mut forged_name = b"alice".to_vec();
        forged_name.extend_from_slice(&0u64.to_le_bytes());
        forged_name.extend_from_slice(&75u64.to_le_bytes());
        let forged_name = String::from_utf8(forged_name).unwrap();
        tamper(&path, |document| {
            let accounts = document["state"]["governor"]["ledger"]["accounts"]
                .as_object_mut()
                .unwrap();
            assert!(accounts.remove("alice").is_some());
            accounts.insert(forged_name, serde_json::json!([]));
        });

        let err = LedgerState::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::StateRootMismatch { .. }));
    }

    #[test]
    fn event_log_is_covered_by_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = seeded();
        state.save(&path).unwrap();

        tamper(&path, |document| {
            let events = document["state"]["governor"]["events"]
                .as_array_mut()
                .unwrap();
            assert!(events.pop().is_some());
        });

        let err = LedgerState::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::StateRootMismatch { .. }));
    }

    #[test]
    fn missing_state_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = LedgerState::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StoreError::MissingState { .. }));
    }
}
