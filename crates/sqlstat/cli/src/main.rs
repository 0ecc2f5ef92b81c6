// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! sqlstat CLI Tool
//!
//! Replays recorded database events into a statistics registry and prints the
//! resulting report.

mod events;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlstat_core::{SortKey, StatisticsConfig, StatisticsRegistry};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlstat")]
#[command(about = "SQL statement statistics")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML file with registry settings (defaults apply when omitted)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event log and print the statistics report
    Replay {
        /// Event log file
        event_log: PathBuf,
        /// Sort order: query, totalExecuteTime, executeAvgTotalTime or executeCount
        #[arg(long, short = 's')]
        sort: Option<String>,
        /// Replace line breaks in SQL text with spaces
        #[arg(long)]
        plain: bool,
        /// Print single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&Path>) -> Result<StatisticsConfig> {
    let config: StatisticsConfig = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => StatisticsConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { event_log, sort, plain, compact } => {
            let registry = StatisticsRegistry::new(config)?;
            let file = File::open(&event_log).with_context(|| format!("Failed to open event log {}", event_log.display()))?;
            let applied = events::replay(BufReader::new(file), &registry)?;
            info!("Applied {} events from {}", applied, event_log.display());

            let records = registry.report(SortKey::parse(sort.as_deref()), plain).records();
            let output = if compact { serde_json::to_string(&records)? } else { serde_json::to_string_pretty(&records)? };
            println!("{}", output);
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        process::exit(1);
    }
}
