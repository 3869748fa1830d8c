// Warden controller
// Main entry point for the warden binary

use clap::Parser;
use sdk::{EngineError, RunStatus, WardenErrorExt};
use std::process::ExitCode;
use warden_engine::cli::{Cli, Command};
use warden_engine::config::Config;
use warden_engine::handlers::{
    handle_history, handle_profile, handle_run, handle_validate, OutputFormat, RunOptions,
};
use warden_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(engine_error) = e.downcast_ref::<EngineError>() {
                eprintln!("Hint: {}", engine_error.user_hint());
                if !engine_error.is_recoverable() {
                    eprintln!("The dataset may not match its pre-run state; restore it by hand.");
                }
            }
            ExitCode::from(error_exit_code(&e))
        }
    }
}

/// Exit code for an error that ended the command
///
/// 3 when the dataset could not be protected, 1 for everything else.
fn error_exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<EngineError>() {
        Some(engine_error) if !engine_error.is_recoverable() => 3,
        _ => 1,
    }
}

/// Exit code for a terminal run status
///
/// 0 when the dataset ends in an accepted state, 2 when the run stopped
/// before executing, 1 when changes were undone or the run failed.
fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Committed | RunStatus::NothingToDo => ExitCode::SUCCESS,
        RunStatus::Halted | RunStatus::Cancelled => ExitCode::from(2),
        RunStatus::RolledBack | RunStatus::Failed => ExitCode::FAILURE,
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Priority: RUST_LOG > --log > config
    match &cli.log {
        Some(level) => init_telemetry_with_level(level),
        None if config.core.log_level.is_empty() => init_telemetry(),
        None => init_telemetry_with_level(&config.core.log_level),
    }

    tracing::info!("Warden v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run {
            dataset,
            mode,
            domain,
            policies,
            yes,
        } => {
            tracing::info!("Running controller on {}", dataset.display());
            let options = RunOptions {
                mode,
                domain,
                policies,
                yes,
            };
            let status = handle_run(dataset, options, &config, format).await?;
            Ok(exit_code(status))
        }

        Command::Profile { dataset, domain } => {
            handle_profile(dataset, domain, &config, format).await?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Validate {
            dataset,
            proposal,
            domain,
            policies,
        } => {
            handle_validate(dataset, proposal, domain, policies, &config, format).await?;
            Ok(ExitCode::SUCCESS)
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} runs", limit);
            handle_history(limit, &config, format).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
