use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use il_core::NodeConfig;
use tracing_subscriber::EnvFilter;

use il_cli::commands::{check, format, replay, run};
use il_cli::{Cli, Commands, Config};

/// Load config from the default locations plus an optional explicit file.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Load config and validate the node settings.
fn load_node_config(config_path: Option<&Path>) -> Result<NodeConfig> {
    let config = load_config(config_path)?;
    config
        .node
        .validate()
        .context("invalid node configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Stdout carries emissions, so logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Run) => {
            let config = load_node_config(cli.config.as_deref())?;
            run::run(config)?;
        }
        Some(Commands::Replay {
            input,
            until,
            origin,
        }) => {
            let config = load_node_config(cli.config.as_deref())?;
            let until = until
                .map(il_core::format::duration_from_millis)
                .transpose()
                .context("invalid --until")?;
            let options = replay::ReplayOptions {
                until,
                origin: *origin,
            };
            let mut stdout = io::stdout().lock();
            let summary = match input {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    replay::run(BufReader::new(file), &mut stdout, config, &options)?
                }
                None => replay::run(io::stdin().lock(), &mut stdout, config, &options)?,
            };
            tracing::info!(
                records = summary.records,
                emissions = summary.emissions,
                diagnostics = summary.diagnostics,
                "replay complete"
            );
        }
        Some(Commands::Format { millis, mode }) => {
            let mode = match mode {
                Some(mode) => *mode,
                None => load_config(cli.config.as_deref())?.node.output_mode,
            };
            format::run(&mut io::stdout().lock(), *millis, mode)?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            check::run(&mut io::stdout().lock(), &config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
