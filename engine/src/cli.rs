//! CLI interface for warden
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running the controller.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::Domain;
use sdk::SafetyMode;

/// Grounded validation and safety-gated execution for datasets
///
/// Proposed fixes are checked against policy documents before they touch the
/// data, and every run can be rolled back to its starting point.
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the controller on a dataset
    Run {
        /// JSON dataset file (array of flat objects)
        dataset: PathBuf,

        /// Safety mode, overrides the configured one
        #[arg(long, value_parser = parse_mode)]
        mode: Option<SafetyMode>,

        /// Domain preset, overrides the configured one
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,

        /// Policy document directory, overrides the configured one
        #[arg(long, value_name = "DIR")]
        policies: Option<PathBuf>,

        /// Approve execution without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// Profile a dataset and show its badness score
    Profile {
        /// JSON dataset file
        dataset: PathBuf,

        /// Domain preset, overrides the configured one
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,
    },

    /// Review a proposal file with the critic without touching the dataset
    Validate {
        /// JSON dataset file
        dataset: PathBuf,

        /// JSON proposal file with a `proposed_actions` list
        proposal: PathBuf,

        /// Domain preset, overrides the configured one
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,

        /// Policy document directory, overrides the configured one
        #[arg(long, value_name = "DIR")]
        policies: Option<PathBuf>,
    },

    /// Show recent runs
    History {
        /// Number of runs to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

fn parse_mode(value: &str) -> Result<SafetyMode, String> {
    SafetyMode::parse(value)
        .ok_or_else(|| format!("unknown safety mode '{}' (strict, adaptive, permissive)", value))
}

fn parse_domain(value: &str) -> Result<Domain, String> {
    Domain::parse(value).ok_or_else(|| format!("unknown domain '{}' (cleaning, masking)", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "warden", "--json", "run", "data.json", "--mode", "strict", "--domain", "masking",
            "--yes",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Run {
                dataset,
                mode,
                domain,
                yes,
                policies,
            } => {
                assert_eq!(dataset, PathBuf::from("data.json"));
                assert_eq!(mode, Some(SafetyMode::Strict));
                assert_eq!(domain, Some(Domain::Masking));
                assert!(yes);
                assert!(policies.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["warden", "run", "d.json", "--mode", "yolo"]).is_err());
    }

    #[test]
    fn test_history_default_limit() {
        let cli = Cli::try_parse_from(["warden", "history"]).unwrap();
        assert!(matches!(cli.command, Command::History { limit: 10 }));
    }
}
