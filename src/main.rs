use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use snapvote_core::governor::Governor;
use snapvote_core::label::Label;
use snapvote_core::{AccountId, Amount, LedgerIndex};

mod access;
mod config;
mod ledger;

use access::{AccessPolicy, Role};
use config::Config;
use ledger::{Batch, LedgerState, Operation, StoreError};

//==================== command line ====================//

#[derive(Parser)]
#[command(name = "snapvote")]
#[command(about = "Checkpointed voting power, delegation and a one-shot snapshot ballot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "snapvote.toml")]
    config: PathBuf,

    /// State file path, overriding the config
    #[arg(long, global = true)]
    state: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    Minter,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Role::Admin,
            RoleArg::Minter => Role::Minter,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty state file
    Init {
        /// Account granted admin and minter (repeatable; adds to config admins)
        #[arg(long = "admin")]
        admins: Vec<AccountId>,
        /// Cap on total supply
        #[arg(long)]
        max_supply: Option<Amount>,
        /// Replace an existing state file
        #[arg(long)]
        force: bool,
    },
    /// Apply a JSON batch of operations at the current index
    Apply { batch: PathBuf },
    /// Mint new units to an account (minter only)
    Mint {
        #[arg(long)]
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Burn { from: AccountId, amount: Amount },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    /// Point an account's voting weight at a delegate (itself to activate it)
    Delegate { account: AccountId, to: AccountId },
    /// Grant a role (admin only)
    GrantRole {
        #[arg(long)]
        caller: AccountId,
        #[arg(value_enum)]
        role: RoleArg,
        account: AccountId,
    },
    /// Revoke a role (admin only)
    RevokeRole {
        #[arg(long)]
        caller: AccountId,
        #[arg(value_enum)]
        role: RoleArg,
        account: AccountId,
    },
    /// Move the ledger index forward without operations
    Advance {
        #[arg(default_value = "1")]
        steps: u64,
    },
    /// Fix the ballot's proposals and snapshot index (admin only)
    InitializeBallot {
        #[arg(long)]
        caller: AccountId,
        #[arg(long)]
        target: LedgerIndex,
        #[arg(required = true)]
        names: Vec<String>,
    },
    Vote {
        voter: AccountId,
        proposal: usize,
        amount: Amount,
    },
    Proposal { id: usize },
    Proposals,
    Winner,
    Remaining { account: AccountId },
    PastVotes { account: AccountId, index: LedgerIndex },
    /// Current, not yet settled, voting power
    Votes { account: AccountId },
    Checkpoints { account: AccountId },
    Events {
        #[arg(long)]
        tail: Option<usize>,
    },
    Status,
    /// Recompute and check the state root
    Verify,
}

//==================== helpers ====================//

fn init_tracing(verbose: bool, fallback: &str) {
    let level = if verbose { "debug" } else { fallback };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_labels(names: &[String]) -> Result<Vec<Label>> {
    names
        .iter()
        .map(|name| Label::new(name).with_context(|| format!("invalid proposal name {name:?}")))
        .collect()
}

/// Load, apply one batch, and persist as a unit.
fn commit(path: &Path, batch: Batch) -> Result<()> {
    let mut state = LedgerState::load(path)?;
    let receipt = state.apply_batch(&batch)?;
    let root = state.save(path)?;
    println!(
        "applied {} operation(s) at index {} (batch {}), now at index {}",
        receipt.operations, receipt.applied_at, receipt.batch, receipt.next_index
    );
    println!("state root {root}");
    Ok(())
}

fn init_cmd(
    path: &Path,
    config: &Config,
    admins: Vec<AccountId>,
    max_supply: Option<Amount>,
    force: bool,
) -> Result<()> {
    if path.exists() && !force {
        return Err(StoreError::StateExists {
            path: path.to_path_buf(),
        }
        .into());
    }
    let mut all_admins = config.admins.clone();
    all_admins.extend(admins);
    if all_admins.is_empty() {
        bail!("no admin accounts: pass --admin or set `admins` in the config");
    }
    let governor = match max_supply.or(config.max_supply) {
        Some(cap) => Governor::with_max_supply(cap),
        None => Governor::new(),
    };
    let state = LedgerState::new(AccessPolicy::bootstrap(all_admins), governor);
    let root = state.save(path)?;
    println!("initialized {} (state root {root})", path.display());
    Ok(())
}

fn apply_cmd(path: &Path, batch_path: &Path) -> Result<()> {
    let bytes = std::fs::read(batch_path)
        .with_context(|| format!("reading batch {}", batch_path.display()))?;
    let batch: Batch = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing batch {}", batch_path.display()))?;
    commit(path, batch)
}

fn advance_cmd(path: &Path, steps: u64) -> Result<()> {
    let mut state = LedgerState::load(path)?;
    let index = state.governor.advance(steps)?;
    let root = state.save(path)?;
    println!("ledger index {index} (state root {root})");
    Ok(())
}

fn status_cmd(state: &LedgerState) -> Result<()> {
    let gov = &state.governor;
    println!("index:           {}", gov.current_index());
    println!("total supply:    {}", gov.total_supply());
    println!("batches applied: {}", state.meta.batches_applied);
    if let Some(last) = state.meta.last_batch {
        println!("last batch:      {last}");
    }
    match gov.ballot().target_index() {
        Ok(target) => println!(
            "ballot:          initialized at snapshot {target}, {} proposal(s)",
            gov.proposals_count().unwrap_or(0)
        ),
        Err(_) => println!("ballot:          not initialized"),
    }
    println!("state root:      {}", state.state_root()?);
    Ok(())
}

fn checkpoints_cmd(state: &LedgerState, account: &AccountId) {
    let gov = &state.governor;
    match gov.delegates(account) {
        Some(delegate) => println!("{account} delegates to {delegate}"),
        None => println!("{account} is undelegated"),
    }
    let count = gov.num_checkpoints(account);
    println!("{count} checkpoint(s)");
    for pos in 0..count {
        if let Some(checkpoint) = gov.checkpoint(account, pos) {
            println!("  index {:>8}  value {}", checkpoint.index, checkpoint.value);
        }
    }
}

//==================== main ====================//

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    init_tracing(cli.verbose, &config.log_level);

    let state_path = cli.state.clone().unwrap_or_else(|| config.state_path.clone());
    let path = state_path.as_path();

    match cli.command {
        Commands::Init {
            admins,
            max_supply,
            force,
        } => init_cmd(path, &config, admins, max_supply, force)?,
        Commands::Apply { batch } => apply_cmd(path, &batch)?,
        Commands::Mint { caller, to, amount } => {
            commit(path, Batch::single(Operation::Mint { caller, to, amount }))?
        }
        Commands::Burn { from, amount } => {
            commit(path, Batch::single(Operation::Burn { from, amount }))?
        }
        Commands::Transfer { from, to, amount } => {
            commit(path, Batch::single(Operation::Transfer { from, to, amount }))?
        }
        Commands::Delegate { account, to } => {
            commit(path, Batch::single(Operation::Delegate { account, to }))?
        }
        Commands::GrantRole {
            caller,
            role,
            account,
        } => commit(
            path,
            Batch::single(Operation::GrantRole {
                caller,
                role: role.into(),
                account,
            }),
        )?,
        Commands::RevokeRole {
            caller,
            role,
            account,
        } => commit(
            path,
            Batch::single(Operation::RevokeRole {
                caller,
                role: role.into(),
                account,
            }),
        )?,
        Commands::Advance { steps } => advance_cmd(path, steps)?,
        Commands::InitializeBallot {
            caller,
            target,
            names,
        } => {
            let proposals = parse_labels(&names)?;
            commit(
                path,
                Batch::single(Operation::InitializeBallot {
                    caller,
                    proposals,
                    target_index: target,
                }),
            )?
        }
        Commands::Vote {
            voter,
            proposal,
            amount,
        } => commit(
            path,
            Batch::single(Operation::Vote {
                voter,
                proposal_id: proposal,
                amount,
            }),
        )?,
        Commands::Proposal { id } => {
            let state = LedgerState::load(path)?;
            let (name, votes) = state.governor.get_proposal(id)?;
            println!("{id}\t{name}\t{votes}\t0x{}", name.to_hex());
        }
        Commands::Proposals => {
            let state = LedgerState::load(path)?;
            let count = state.governor.proposals_count()?;
            println!("{count} proposal(s)");
            for id in 0..count {
                let (name, votes) = state.governor.get_proposal(id)?;
                println!("{id}\t{name}\t{votes}");
            }
        }
        Commands::Winner => {
            let state = LedgerState::load(path)?;
            let id = state.governor.winning_proposal()?;
            let name = state.governor.winner_name()?;
            println!("{id}\t{name}");
        }
        Commands::Remaining { account } => {
            let state = LedgerState::load(path)?;
            println!("{}", state.governor.remaining_voting_power(&account)?);
        }
        Commands::PastVotes { account, index } => {
            let state = LedgerState::load(path)?;
            println!("{}", state.governor.past_votes(&account, index)?);
        }
        Commands::Votes { account } => {
            let state = LedgerState::load(path)?;
            println!("{}", state.governor.votes(&account));
        }
        Commands::Checkpoints { account } => {
            let state = LedgerState::load(path)?;
            checkpoints_cmd(&state, &account);
        }
        Commands::Events { tail } => {
            let state = LedgerState::load(path)?;
            let events = state.governor.events();
            let skip = tail.map_or(0, |n| events.len().saturating_sub(n));
            for event in &events[skip..] {
                println!("{}", serde_json::to_string(event)?);
            }
        }
        Commands::Status => {
            let state = LedgerState::load(path)?;
            status_cmd(&state)?;
        }
        Commands::Verify => {
            let state = LedgerState::load(path)?;
            println!("ok: state root {}", state.state_root()?);
        }
    }
    Ok(())
}
