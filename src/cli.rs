// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use deckhand::deploy::DeployMode;
use deckhand::sync::DirtyPolicy;
use deckhand::types::GitRef;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Sync, rebuild, restart, and verify a docker-compose deployment")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: deckhand.yml in the current directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output for CI
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Append every executed command to this file as JSON lines
    #[arg(long, global = true, value_name = "FILE")]
    pub audit_log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new deckhand.yml configuration file
    Init {
        /// Project name
        #[arg(long)]
        project: Option<String>,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Sync source, rebuild images, restart services, and verify health
    Deploy(DeployArgs),

    /// Run health checks and verify queries without changing anything
    Verify {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Apply the configured data patches
    Patch {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,

        /// Report what each patch would change without applying it
        #[arg(long)]
        dry_run: bool,

        /// Permit unbounded deletes and sql statements marked destructive
        #[arg(long)]
        allow_destructive: bool,

        /// Break an existing deploy lock
        #[arg(long)]
        force_lock: bool,
    },

    /// Show compose service status and the deploy lock holder
    Status {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },
}

#[derive(Args)]
pub struct DeployArgs {
    /// Target destination (defined in config)
    #[arg(short, long)]
    pub destination: Option<String>,

    /// Only these services (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Branch, tag, or commit to deploy (overrides source.ref)
    #[arg(long = "ref", value_name = "REF", value_parser = parse_git_ref)]
    pub reference: Option<GitRef>,

    /// no-cache, prune, or restart-only
    #[arg(long, default_value = "no-cache")]
    pub mode: DeployMode,

    /// Stop and start the whole compose stack
    #[arg(long)]
    pub full_stack: bool,

    /// What to do with uncommitted changes on the target: fail or stash
    #[arg(long)]
    pub dirty: Option<DirtyPolicy>,

    /// Estimate patches instead of applying them
    #[arg(long)]
    pub dry_run_patches: bool,

    /// Permit unbounded deletes and sql statements marked destructive
    #[arg(long)]
    pub allow_destructive: bool,

    /// Break an existing deploy lock
    #[arg(long)]
    pub force_lock: bool,
}

fn parse_git_ref(s: &str) -> Result<GitRef, String> {
    GitRef::new(s).map_err(|e| e.to_string())
}
