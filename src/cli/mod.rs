use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agora::governance::{
    ExecutionError, GovernanceEngine, Operation, OperationBatchExecutor, SystemClock,
};
use agora::store::{open_database, SpaceDirectory, SqliteProposalStore};

pub mod config;
pub mod proposal;
pub mod space;

use config::AgoraConfig;

#[derive(Parser)]
#[command(name = "agora")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Weighted-voting proposal governance for membership spaces", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.local/share/agora/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum VoteChoice {
    Yes,
    No,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config file
    Init,

    /// Create a governance space
    CreateSpace {
        /// Human-readable space name
        #[arg(long)]
        name: String,

        /// Owner identity; becomes the first member and an administrator
        #[arg(long)]
        owner: String,

        /// Quorum threshold in percent (share of total power that must vote)
        #[arg(long)]
        quorum: u64,

        /// Unity threshold in percent (share of votes cast that must be yes)
        #[arg(long)]
        unity: u64,

        /// Minimum proposal duration (e.g. "1h", "30m"; default none)
        #[arg(long)]
        min_duration: Option<String>,
    },

    /// Add a member to a space, or update an existing member's power
    AddMember {
        #[arg(long)]
        space: u64,

        #[arg(long)]
        member: String,

        /// Voting power weight
        #[arg(long, default_value_t = 1)]
        power: u64,
    },

    /// Remove a member from a space
    RemoveMember {
        #[arg(long)]
        space: u64,

        #[arg(long)]
        member: String,
    },

    /// Grant administrator rights in a space
    AddAdmin {
        #[arg(long)]
        space: u64,

        #[arg(long)]
        member: String,
    },

    /// Change a space's quorum/unity thresholds (takes effect at the next
    /// evaluation of any open proposal)
    SetThresholds {
        #[arg(long)]
        space: u64,

        #[arg(long)]
        quorum: u64,

        #[arg(long)]
        unity: u64,
    },

    /// Set a space's minimum proposal duration
    SetMinDuration {
        #[arg(long)]
        space: u64,

        /// Duration floor (e.g. "1h", "30m")
        #[arg(long)]
        duration: String,
    },

    /// Submit a proposal with a frozen batch of operations
    Propose {
        #[arg(long)]
        space: u64,

        /// Creator identity (must hold voting power in the space)
        #[arg(long)]
        creator: String,

        /// Voting window length (e.g. "24h")
        #[arg(long)]
        duration: String,

        /// Operation in target[:value[:payload_hex]] form; repeatable
        #[arg(long = "op", required = true)]
        operations: Vec<String>,
    },

    /// Cast a vote (triggers resolution if thresholds are already met)
    Vote {
        #[arg(long)]
        proposal: u64,

        #[arg(long)]
        voter: String,

        #[arg(long)]
        choice: VoteChoice,
    },

    /// Evaluate a proposal: execute, expire, or leave pending
    Evaluate {
        #[arg(long)]
        proposal: u64,
    },

    /// Withdraw a proposal (creator) or veto it (administrator)
    Withdraw {
        #[arg(long)]
        proposal: u64,

        #[arg(long)]
        caller: String,
    },

    /// Show a proposal's full state as JSON
    Show {
        #[arg(long)]
        proposal: u64,
    },

    /// List a space's proposals, newest first
    List {
        #[arg(long)]
        space: u64,
    },

    /// Print the highest assigned proposal id
    Latest,

    /// Evaluate every open proposal in a space whose window has closed
    Sweep {
        #[arg(long)]
        space: u64,
    },
}

/// Execution backend for the standalone CLI: records the batch in the log.
/// Deployments wire a real backend through the same trait.
pub struct LogExecutor;

#[async_trait]
impl OperationBatchExecutor for LogExecutor {
    async fn execute_all(&self, operations: &[Operation]) -> Result<(), ExecutionError> {
        for op in operations {
            info!(
                operation = %op.target,
                value = op.value,
                payload = %hex::encode(&op.payload),
                "executing operation"
            );
        }
        Ok(())
    }
}

/// Engine plus space directory wired over one SQLite database.
pub struct Context {
    pub engine: GovernanceEngine<SqliteProposalStore>,
    pub spaces: SpaceDirectory,
}

async fn open_context(
    config: &AgoraConfig,
    database: Option<PathBuf>,
) -> Result<Context, Box<dyn std::error::Error>> {
    let path = database.unwrap_or_else(|| config.database.path.clone());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = open_database(&path).await?;
    let spaces = SpaceDirectory::new(pool.clone());

    let engine = GovernanceEngine::new(
        Arc::new(SqliteProposalStore::new(pool)),
        Arc::new(spaces.clone()),
        Arc::new(spaces.clone()),
        Arc::new(LogExecutor),
        Arc::new(SystemClock),
    );

    Ok(Context { engine, spaces })
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let config = AgoraConfig::load_or_default(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init = cli.command {
        config.save(&config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let ctx = open_context(&config, cli.database).await?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::CreateSpace {
            name,
            owner,
            quorum,
            unity,
            min_duration,
        } => space::create_space(&ctx, name, owner, quorum, unity, min_duration).await,
        Commands::AddMember {
            space,
            member,
            power,
        } => space::add_member(&ctx, space, member, power).await,
        Commands::RemoveMember { space, member } => {
            space::remove_member(&ctx, space, member).await
        }
        Commands::AddAdmin { space, member } => space::add_admin(&ctx, space, member).await,
        Commands::SetThresholds {
            space,
            quorum,
            unity,
        } => space::set_thresholds(&ctx, space, quorum, unity).await,
        Commands::SetMinDuration { space, duration } => {
            space::set_min_duration(&ctx, space, duration).await
        }
        Commands::Propose {
            space,
            creator,
            duration,
            operations,
        } => proposal::propose(&ctx, space, creator, duration, operations).await,
        Commands::Vote {
            proposal,
            voter,
            choice,
        } => proposal::vote(&ctx, proposal, voter, choice == VoteChoice::Yes).await,
        Commands::Evaluate { proposal } => proposal::evaluate(&ctx, proposal).await,
        Commands::Withdraw { proposal, caller } => {
            proposal::withdraw(&ctx, proposal, caller).await
        }
        Commands::Show { proposal } => proposal::show(&ctx, proposal).await,
        Commands::List { space } => proposal::list(&ctx, space).await,
        Commands::Latest => proposal::latest(&ctx).await,
        Commands::Sweep { space } => proposal::sweep(&ctx, space).await,
    }
}
