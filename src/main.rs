// ABOUTME: Entry point for the deckhand CLI application.
// ABOUTME: Parses arguments, sets up logging, and maps results to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, DeployArgs};
use deckhand::config;
use deckhand::deploy::DeployOptions;
use deckhand::error::{Result, exit_code};
use deckhand::output::{Output, OutputMode};
use deckhand::patch::PatchOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose picks debug.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let code = match run(cli, Output::new(mode)).await {
        Ok(code) => code,
        Err(e) => {
            let output = Output::new(mode);
            output.error(&e.to_string());
            if let Some(tail) = e.tail()
                && mode != OutputMode::Json
            {
                for line in tail.lines() {
                    eprintln!("  | {line}");
                }
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, output: Output) -> Result<i32> {
    let config_path = cli.config.as_deref();
    let audit_log = cli.audit_log.as_deref();

    match cli.command {
        Commands::Init { project, force } => {
            let cwd = std::env::current_dir()?;
            config::init_config(&cwd, project.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(exit_code::SUCCESS)
        }
        Commands::Deploy(args) => {
            let config = commands::load_config(config_path, args.destination.as_deref())?;
            let force_lock = args.force_lock;
            commands::deploy(config, deploy_options(args), force_lock, audit_log, output).await
        }
        Commands::Verify { destination } => {
            let config = commands::load_config(config_path, destination.as_deref())?;
            commands::verify(config, audit_log, output).await
        }
        Commands::Patch {
            destination,
            dry_run,
            allow_destructive,
            force_lock,
        } => {
            let config = commands::load_config(config_path, destination.as_deref())?;
            let options = PatchOptions {
                dry_run,
                allow_destructive,
            };
            commands::patch(config, options, force_lock, audit_log, output).await
        }
        Commands::Status { destination } => {
            let config = commands::load_config(config_path, destination.as_deref())?;
            commands::status(config, audit_log, output).await
        }
    }
}

fn deploy_options(args: DeployArgs) -> DeployOptions {
    DeployOptions {
        services: args.services,
        reference: args.reference,
        mode: args.mode,
        full_stack: args.full_stack,
        dirty: args.dirty,
        patch: PatchOptions {
            dry_run: args.dry_run_patches,
            allow_destructive: args.allow_destructive,
        },
    }
}
