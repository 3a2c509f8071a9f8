// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corral - relays chat from messaging platforms to agent runs on local
//! projects.
//!
//! This is the binary entry point for the Corral relay.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use corral_config::{CorralConfig, validate_config};

mod engine;
mod run;
mod serve;
mod status;

/// Corral - chat-to-agent relay for local projects.
#[derive(Parser, Debug)]
#[command(name = "corral", version, about, long_about = None)]
struct Cli {
    /// Config file path; defaults to the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay service.
    Serve,
    /// Run one workflow for a project and print the outcome.
    Run {
        /// Project name from the registry.
        project: String,
        /// Workflow name passed to the agent.
        workflow: String,
    },
    /// Show channel bindings, run locks, and recent run totals.
    Status,
    /// List registered projects.
    Projects,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => corral_config::load_config_from_path(path),
        None => corral_config::load_config(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = validate_config(&config) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    init_tracing(&config.relay.log_level);

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Run { project, workflow } => {
            run::run_workflow(config, &project, &workflow).await
        }
        Commands::Status => status::run_status(&config).await,
        Commands::Projects => {
            print_projects(&config);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber with the configured log level.
/// `RUST_LOG` overrides the config when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn print_projects(config: &CorralConfig) {
    if config.projects.is_empty() {
        println!("No projects are registered.");
        return;
    }
    let mut names: Vec<&String> = config.projects.keys().collect();
    names.sort();
    println!("Registered projects:");
    for name in names {
        println!("  {name}  {}", config.projects[name].path);
    }
}
