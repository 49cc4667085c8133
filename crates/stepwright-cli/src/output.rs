//! Output formatting and progress reporting

use crate::error::CliResult;
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stepwright::{RunReport, RunVerdict, StepVerdict, SuiteReport};

/// Output format for run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

impl OutputFormat {
    /// Render a suite in this format
    pub fn render(self, suite: &SuiteReport) -> CliResult<String> {
        Ok(match self {
            Self::Text => suite.summary(),
            Self::Json => suite.to_json()?,
        })
    }
}

/// Write a rendered suite to `path`, or stdout when `None`
pub fn write_report(format: OutputFormat, suite: &SuiteReport, path: Option<&Path>) -> CliResult<()> {
    let rendered = format.render(suite)?;
    match path {
        Some(path) => std::fs::write(path, rendered)?,
        None => {
            let term = Term::stdout();
            term.write_str(&rendered)?;
            if !rendered.ends_with('\n') {
                term.write_line("")?;
            }
        }
    }
    Ok(())
}

/// Progress and status lines on stderr
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a spinner while workflows run
    pub fn start_spinner(&mut self, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.progress_bar = Some(pb);
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Stop and clear the spinner
    pub fn finish(&mut self) {
        if let Some(pb) = self.progress_bar.take() {
            pb.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // failures print even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// One status line per run, naming the first failing step
    pub fn run_result(&self, report: &RunReport) {
        let line = format!(
            "{} [{}] seed={} ({}ms)",
            report.workflow,
            report.verdict,
            report.seed,
            report.duration.as_millis()
        );
        if report.is_success() {
            self.success(&line);
            return;
        }
        self.failure(&line);
        if let Some(error) = &report.error {
            self.failure(&format!("  {error}"));
        } else if let Some(step) = report.first_failure() {
            let kind = step
                .failure
                .map_or_else(String::new, |kind| format!("{kind}: "));
            self.failure(&format!("  step {} {}: {kind}{}", step.index, step.step, step.diagnostic));
        }
    }

    /// Print the totals line
    pub fn summary(&self, suite: &SuiteReport) {
        if self.quiet && suite.is_success() {
            return;
        }

        let steps = |verdict: StepVerdict| -> usize {
            suite.runs.iter().map(|run| run.count(verdict)).sum()
        };
        let total = suite.runs.len();
        let secs = suite.duration.as_secs_f64();
        let failed = suite.failed() + suite.aborted();

        let _ = self.term.write_line("");
        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let status = if failed > 0 {
                failed_style.apply_to(RunVerdict::Fail.to_string())
            } else {
                passed_style.apply_to(RunVerdict::Pass.to_string())
            };
            let _ = self.term.write_line(&format!(
                "{status} {total} workflow(s) in {secs:.2}s ({} passed, {} failed, {} aborted; {} steps skipped)",
                passed_style.apply_to(suite.passed()),
                failed_style.apply_to(suite.failed()),
                suite.aborted(),
                steps(StepVerdict::Skipped)
            ));
        } else {
            let status = if failed > 0 { RunVerdict::Fail } else { RunVerdict::Pass };
            let _ = self.term.write_line(&format!(
                "{status} {total} workflow(s) in {secs:.2}s ({} passed, {} failed, {} aborted; {} steps skipped)",
                suite.passed(),
                suite.failed(),
                suite.aborted(),
                steps(StepVerdict::Skipped)
            ));
        }
    }
}
