// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadflow - multi-tenant lead ingestion and qualification.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use leadflow_config::{ConfigError, LeadflowConfig};

/// Leadflow - multi-tenant lead ingestion and qualification.
#[derive(Parser, Debug)]
#[command(name = "leadflow", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the connector, qualification dispatcher, and ingress gateway.
    Serve,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate configuration and print the effective settings.
    Check,
}

fn load(path: Option<&PathBuf>) -> Result<LeadflowConfig, Vec<ConfigError>> {
    match path {
        Some(path) => leadflow_config::load_and_validate_path(path),
        None => leadflow_config::load_and_validate(),
    }
}

fn summary(config: &LeadflowConfig) -> String {
    let gateway = if config.gateway.enabled {
        format!("{}:{}", config.gateway.host, config.gateway.port)
    } else {
        "disabled".to_string()
    };
    format!(
        "service:  {}\ndatabase: {}\nbridge:   {}\ngateway:  {}\nscorer:   {}\nbuffer:   {} min default, {} min floor",
        config.service.name,
        config.storage.database_path,
        config.bridge.url,
        gateway,
        config.scorer.model,
        config.buffer.default_timeout_minutes,
        config.buffer.min_timeout_minutes,
    )
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            leadflow_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config {
            action: ConfigAction::Check,
        }) => {
            println!("configuration OK\n{}", summary(&config));
        }
        None => {
            println!("leadflow: use --help for available commands");
        }
    }
}
