//! Confirmation gate
//!
//! Confirmers decide whether an accepted batch may be executed. The review
//! report is shown first so the human sees every verdict and its rationale.

use async_trait::async_trait;
use sdk::{Confirmer, ReviewReport};
use std::io::{self, BufRead, Write};
use tracing::warn;

/// Prompt shown after the review report
pub const CONFIRM_PROMPT: &str = "Apply accepted actions? (Y/N): ";

/// Whether a typed answer approves execution
///
/// Only `y` and `yes`, in any case, approve. Anything else declines.
pub fn is_approval(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Interactive confirmer on the terminal
///
/// The report and prompt go to stderr so stdout stays machine-readable
/// under `--json`. Blocks until a line is read; a read error declines.
#[derive(Debug, Default, Clone)]
pub struct StdinConfirmer;

impl StdinConfirmer {
    pub fn new() -> Self {
        Self
    }

    fn ask(rendered: String) -> io::Result<String> {
        let mut stderr = io::stderr();
        writeln!(stderr, "{}", rendered)?;
        write!(stderr, "{}", CONFIRM_PROMPT)?;
        stderr.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(input)
    }
}

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, report: &ReviewReport) -> bool {
        let rendered = report.render_text();
        match tokio::task::spawn_blocking(move || Self::ask(rendered)).await {
            Ok(Ok(answer)) => is_approval(&answer),
            Ok(Err(e)) => {
                warn!("Failed to read confirmation, declining: {}", e);
                false
            }
            Err(e) => {
                warn!("Confirmation prompt aborted, declining: {}", e);
                false
            }
        }
    }
}

/// Confirmer with a fixed answer, for `--yes` and unattended runs
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm {
    approve: bool,
}

impl AutoConfirm {
    pub fn approve() -> Self {
        Self { approve: true }
    }

    pub fn decline() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, _report: &ReviewReport) -> bool {
        self.approve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_yes_approves() {
        assert!(is_approval("y\n"));
        assert!(is_approval(" YES "));
        assert!(!is_approval("n"));
        assert!(!is_approval(""));
        assert!(!is_approval("yep"));
    }
}
