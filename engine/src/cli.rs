//! CLI interface for Beacon
//!
//! Command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::strategies::StrategyKind;

/// Beacon node agent
///
/// Bootstraps a grid node from a chain of observable launchers.
#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the agent until interrupted
    Agent,

    /// Compare wait strategies under concurrent load
    Bench {
        /// Number of concurrent requests (default: from config)
        #[arg(short, long)]
        requests: Option<usize>,

        /// Run only this strategy
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyKind>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bench_with_global_flags() {
        let cli = Cli::parse_from(["beacon", "bench", "--requests", "50", "--strategy", "observer", "--json"]);

        assert!(cli.json);
        match cli.command {
            Command::Bench { requests, strategy } => {
                assert_eq!(requests, Some(50));
                assert_eq!(strategy, Some(StrategyKind::Observer));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_agent_with_config() {
        let cli = Cli::parse_from(["beacon", "--config", "/tmp/beacon.toml", "agent"]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/beacon.toml")));
        assert!(matches!(cli.command, Command::Agent));
    }
}
