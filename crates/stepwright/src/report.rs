//! Run reports.
//!
//! A [`RunReport`] is the only output of a run: ordered step results, the
//! overall verdict and everything needed to replay it (seed and fixture
//! values). Reports serialize to JSON with durations in milliseconds.

use crate::fixture::FixtureValue;
use crate::result::{FailureKind, StepError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::time::Duration;
use uuid::Uuid;

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Verdict of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepVerdict {
    /// Step completed
    Pass,
    /// Step failed
    Fail,
    /// Step never ran
    Skipped,
}

impl StepVerdict {
    const fn tag(self) -> &'static str {
        match self {
            Self::Pass => "ok",
            Self::Fail => "FAIL",
            Self::Skipped => "skip",
        }
    }
}

/// Verdict of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    /// Every step passed
    Pass,
    /// All steps ran and at least one failed
    Fail,
    /// The run stopped early
    Aborted,
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Aborted => "ABORTED",
        })
    }
}

/// Runner lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started
    #[default]
    Pending,
    /// Executing steps
    Running,
    /// Every step reached a verdict
    Completed,
    /// Stopped early (failure policy, run timeout or session failure)
    Aborted,
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the workflow
    pub index: usize,
    /// Step description (never contains payloads)
    pub step: String,
    /// Verdict
    pub verdict: StepVerdict,
    /// Failure class when the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Human-readable diagnostic
    pub diagnostic: String,
    /// Time spent on the step
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    /// Actionability checks were skipped
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forced: bool,
}

impl StepResult {
    /// Passing result
    #[must_use]
    pub fn passed(index: usize, step: impl Into<String>, diagnostic: impl Into<String>, duration: Duration) -> Self {
        Self {
            index,
            step: step.into(),
            verdict: StepVerdict::Pass,
            failure: None,
            diagnostic: diagnostic.into(),
            duration,
            forced: false,
        }
    }

    /// Failing result
    #[must_use]
    pub fn failed(index: usize, step: impl Into<String>, error: StepError, duration: Duration) -> Self {
        Self {
            index,
            step: step.into(),
            verdict: StepVerdict::Fail,
            failure: Some(error.kind),
            diagnostic: error.message,
            duration,
            forced: false,
        }
    }

    /// Skipped result
    #[must_use]
    pub fn skipped(index: usize, step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            index,
            step: step.into(),
            verdict: StepVerdict::Skipped,
            failure: None,
            diagnostic: reason.into(),
            duration: Duration::ZERO,
            forced: false,
        }
    }

    /// Mark as forced
    #[must_use]
    pub const fn with_forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }
}

/// Report of one workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Workflow name
    pub workflow: String,
    /// Overall verdict
    pub verdict: RunVerdict,
    /// Final runner state
    pub state: RunState,
    /// Step results in declared order
    pub steps: Vec<StepResult>,
    /// Wall time of the run
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Fixture seed, for replay
    pub seed: u64,
    /// Fixture values bound for the run
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fixtures: BTreeMap<String, FixtureValue>,
    /// Error that kept the run from starting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Report for a run whose session could not be opened
    #[must_use]
    pub fn session_failed(workflow: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow: workflow.into(),
            verdict: RunVerdict::Aborted,
            state: RunState::Aborted,
            steps: Vec::new(),
            duration: Duration::ZERO,
            started_at: Utc::now(),
            seed: 0,
            fixtures: BTreeMap::new(),
            error: Some(message.into()),
        }
    }

    /// Verdict is `Pass`
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.verdict == RunVerdict::Pass
    }

    /// Number of steps with `verdict`
    #[must_use]
    pub fn count(&self, verdict: StepVerdict) -> usize {
        self.steps.iter().filter(|s| s.verdict == verdict).count()
    }

    /// First failed step
    #[must_use]
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.verdict == StepVerdict::Fail)
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Serializer failure
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering, one line per step
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}: {} ({} passed, {} failed, {} skipped in {}ms) seed={}",
            self.workflow,
            self.verdict,
            self.count(StepVerdict::Pass),
            self.count(StepVerdict::Fail),
            self.count(StepVerdict::Skipped),
            self.duration.as_millis(),
            self.seed
        );
        if let Some(error) = &self.error {
            let _ = writeln!(out, "  error: {error}");
        }
        for step in &self.steps {
            let forced = if step.forced { " [forced]" } else { "" };
            let _ = write!(
                out,
                "  [{:>4}] {:>2} {}{forced} ({}ms)",
                step.verdict.tag(),
                step.index,
                step.step,
                step.duration.as_millis()
            );
            match (step.verdict, step.failure) {
                (StepVerdict::Fail, Some(kind)) => {
                    let _ = writeln!(out, "\n         {kind}: {}", step.diagnostic);
                }
                _ => out.push('\n'),
            }
        }
        out
    }
}

/// Reports of several runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Run reports in input order
    pub runs: Vec<RunReport>,
    /// Wall time of the whole suite
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
}

impl SuiteReport {
    /// Create a suite report
    #[must_use]
    pub fn new(runs: Vec<RunReport>, duration: Duration) -> Self {
        Self { runs, duration }
    }

    fn count(&self, verdict: RunVerdict) -> usize {
        self.runs.iter().filter(|r| r.verdict == verdict).count()
    }

    /// Passing runs
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(RunVerdict::Pass)
    }

    /// Failed runs
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(RunVerdict::Fail)
    }

    /// Aborted runs
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.count(RunVerdict::Aborted)
    }

    /// Every run passed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.runs.iter().all(RunReport::is_success)
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Serializer failure
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Run summaries followed by a totals line
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out: String = self.runs.iter().map(RunReport::summary).collect();
        let _ = writeln!(
            out,
            "{} workflow(s): {} passed, {} failed, {} aborted in {}ms",
            self.runs.len(),
            self.passed(),
            self.failed(),
            self.aborted(),
            self.duration.as_millis()
        );
        out
    }
}
