//! Core state machines for snapvote.
//!
//! The crate is organised leaf-first, mirroring how voting power flows:
//!
//! * [`checkpoint`]: per-account append-only `(index, value)` histories with
//!   logarithmic point-in-time lookup.
//! * [`delegation`]: who holds whose voting weight, and the checkpoint writes
//!   needed to move it.
//! * [`snapshot`]: read-only historical queries over the checkpoint ledger.
//! * [`ballot`]: a single ballot with partial, repeatable vote spending.
//!
//! [`governor::Governor`] composes those pieces with a minimal balance
//! component ([`token`]) and owns the monotonic ledger index.
//! [`shared::SharedGovernor`] serialises mutations for multi-threaded hosts.

pub mod ballot;
pub mod checkpoint;
pub mod delegation;
pub mod event;
pub mod governor;
pub mod label;
pub mod shared;
pub mod snapshot;
pub mod token;

mod error;

pub use error::GovernanceError;

pub type AccountId = String;
pub type Amount = u64;
pub type LedgerIndex = u64;
