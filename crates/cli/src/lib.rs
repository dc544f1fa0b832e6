//! Shared CLI types and command implementations for `swarmctl`.

pub mod api_client;
pub mod completions;
pub mod interactive;
pub mod oneshot;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "swarmctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for a coordination core project")]
pub struct Cli {
    /// Base URL of the coordination server.
    #[arg(long, env = "SWARM_SERVER", default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Bearer token matching the server's AUTH_TOKEN.
    #[arg(long, env = "AUTH_TOKEN", default_value = "dev-token")]
    pub token: String,

    /// Project to operate on.
    #[arg(short, long, default_value = "default")]
    pub project: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Full project projection: agents, tasks, leases, orchestrator, votes.
    Status,
    /// Registered agents and their last-seen status.
    Agents,
    /// Tasks on the board.
    Tasks,
    /// Active file leases.
    Leases,
    /// Event log slice.
    Replay {
        #[arg(long, default_value_t = 0)]
        since_seq: u64,
        #[arg(long)]
        max: Option<usize>,
    },
    /// Halt all mutating requests project-wide.
    Stop {
        reason: String,
        #[arg(long)]
        by: String,
    },
    /// Clear a stop flag.
    Resume {
        #[arg(long)]
        by: String,
    },
    /// Nominate an agent for orchestrator.
    Elect { agent: String },
    /// Create a task on the board.
    TaskCreate { title: String, description: String },
    /// Open a vote.
    VoteStart {
        kind: String,
        subject: String,
        #[arg(long)]
        opened_by: String,
    },
    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
