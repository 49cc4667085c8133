//! Assertion engine for UI state.
//!
//! An [`Expectation`] is evaluated against every attached match of a
//! selector. `Immediate` checks once; `Eventually` polls until the
//! expectation holds or the deadline passes. Evaluation never mutates the
//! page.

use crate::locator::{attached_matches, Picked, SelectorSpec};
use crate::result::StepError;
use crate::session::{ElementSnapshot, UiSession};
use crate::wait::{poll_until, Probe, DEFAULT_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Expected UI state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// At least one attached match (exactly one when strict)
    Exists,
    /// No attached match
    Absent,
    /// The match is rendered
    Visible,
    /// No visible match (absence counts as hidden)
    Hidden,
    /// The match's text contains the string
    ContainsText(String),
    /// The match's trimmed text equals the string
    TextEquals(String),
    /// The match's form value equals the string
    ValueEquals(String),
    /// Exactly n attached matches
    Count(usize),
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => f.write_str("exists"),
            Self::Absent => f.write_str("is absent"),
            Self::Visible => f.write_str("is visible"),
            Self::Hidden => f.write_str("is hidden"),
            Self::ContainsText(text) => write!(f, "contains text {text:?}"),
            Self::TextEquals(text) => write!(f, "has text {text:?}"),
            Self::ValueEquals(value) => write!(f, "has value {value:?}"),
            Self::Count(n) => write!(f, "matches {n} element(s)"),
        }
    }
}

/// A selector paired with what should hold for it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    /// Elements under test
    #[serde(flatten)]
    pub target: SelectorSpec,
    /// Expected state
    pub expect: Expectation,
}

impl Condition {
    /// Create a condition
    #[must_use]
    pub fn new(target: impl Into<SelectorSpec>, expect: Expectation) -> Self {
        Self {
            target: target.into(),
            expect,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.target, self.expect)
    }
}

/// Immediate or bounded-wait evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertMode {
    /// Check current state once
    #[default]
    Immediate,
    /// Poll until the expectation holds
    Eventually {
        /// Polling budget
        timeout_ms: u64,
    },
}

/// Assertion verdict with diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the expectation held
    pub passed: bool,
    /// Names the selector, the expectation and what was observed
    pub diagnostic: String,
}

impl Verdict {
    fn pass(condition: &Condition) -> Self {
        Self {
            passed: true,
            diagnostic: format!("{condition}: ok"),
        }
    }

    fn fail(condition: &Condition, observed: &str) -> Self {
        Self {
            passed: false,
            diagnostic: format!("expected {condition}, observed {observed}"),
        }
    }
}

/// Evaluates [`Condition`]s against a session
#[derive(Debug, Clone)]
pub struct AssertionEngine {
    poll_interval: Duration,
}

impl Default for AssertionEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl AssertionEngine {
    /// Create an engine with a custom poll interval
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Evaluate `condition` once against current state
    pub async fn check<S: UiSession + ?Sized>(&self, session: &S, condition: &Condition) -> Verdict {
        match evaluate(session, condition).await {
            Ok(()) => Verdict::pass(condition),
            Err(observed) => Verdict::fail(condition, &observed),
        }
    }

    /// Poll `condition` until it holds or `deadline` passes
    pub async fn check_until<S: UiSession + ?Sized>(
        &self,
        session: &S,
        condition: &Condition,
        deadline: Instant,
    ) -> Verdict {
        let outcome = poll_until(deadline, self.poll_interval, || async move {
            match evaluate(session, condition).await {
                Ok(()) => Probe::Ready(()),
                Err(observed) => Probe::Retry(observed),
            }
        })
        .await;
        match outcome {
            Ok(()) => Verdict::pass(condition),
            Err(e) => Verdict::fail(condition, &e.into_inner()),
        }
    }

    /// Run an `Assert` step
    ///
    /// # Errors
    ///
    /// `AssertionFailed` with the verdict's diagnostic
    pub async fn assert<S: UiSession + ?Sized>(
        &self,
        session: &S,
        condition: &Condition,
        mode: AssertMode,
    ) -> Result<String, StepError> {
        let verdict = match mode {
            AssertMode::Immediate => self.check(session, condition).await,
            AssertMode::Eventually { timeout_ms } => {
                let deadline = Instant::now() + Duration::from_millis(timeout_ms);
                self.check_until(session, condition, deadline).await
            }
        };
        if verdict.passed {
            Ok(verdict.diagnostic)
        } else {
            Err(StepError::assertion_failed(verdict.diagnostic))
        }
    }

    /// Run a `WaitFor` step
    ///
    /// # Errors
    ///
    /// `AssertionFailed` stating how long the wait lasted
    pub async fn wait_for<S: UiSession + ?Sized>(
        &self,
        session: &S,
        condition: &Condition,
        timeout_ms: u64,
    ) -> Result<String, StepError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let verdict = self.check_until(session, condition, deadline).await;
        if verdict.passed {
            Ok(verdict.diagnostic)
        } else {
            Err(StepError::assertion_failed(format!(
                "wait timed out after {timeout_ms} ms: {}",
                verdict.diagnostic
            )))
        }
    }
}

/// `Ok` when the condition holds, otherwise the observed state
async fn evaluate<S: UiSession + ?Sized>(session: &S, condition: &Condition) -> Result<(), String> {
    let handles = attached_matches(session, &condition.target.selector)
        .await
        .map_err(|e| format!("session error ({e})"))?;

    match &condition.expect {
        Expectation::Absent => {
            return match handles.len() {
                0 => Ok(()),
                n => Err(format!("{n} attached element(s)")),
            }
        }
        Expectation::Count(expected) => {
            return if handles.len() == *expected {
                Ok(())
            } else {
                Err(format!("{} element(s)", handles.len()))
            }
        }
        _ => {}
    }

    let handle = match condition.target.pick_from(&handles) {
        Picked::One(handle) => handle,
        Picked::Ambiguous(n) => return Err(format!("{n} elements matched (ambiguous)")),
        Picked::None | Picked::TooFew(_) => {
            return match condition.expect {
                Expectation::Hidden => Ok(()),
                _ => Err("no element matched".to_string()),
            };
        }
    };

    let state = session
        .read_state(handle)
        .await
        .map_err(|e| format!("session error ({e})"))?;
    check_snapshot(&condition.expect, &state)
}

fn check_snapshot(expect: &Expectation, state: &ElementSnapshot) -> Result<(), String> {
    if !state.attached {
        return match expect {
            Expectation::Hidden => Ok(()),
            _ => Err("element detached".to_string()),
        };
    }
    match expect {
        Expectation::Exists => Ok(()),
        Expectation::Visible if state.visible => Ok(()),
        Expectation::Visible => Err("element hidden".to_string()),
        Expectation::Hidden if !state.visible => Ok(()),
        Expectation::Hidden => Err("element visible".to_string()),
        Expectation::ContainsText(text) if state.text_or_empty().contains(text.as_str()) => Ok(()),
        Expectation::TextEquals(text) if state.text_or_empty().trim() == text.trim() => Ok(()),
        Expectation::ContainsText(_) | Expectation::TextEquals(_) => {
            Err(format!("text {:?}", state.text_or_empty()))
        }
        Expectation::ValueEquals(value) if state.value.as_deref().unwrap_or("") == value => Ok(()),
        Expectation::ValueEquals(_) => Err(format!(
            "value {:?}",
            state.value.as_deref().unwrap_or("")
        )),
        Expectation::Absent | Expectation::Count(_) => Ok(()),
    }
}
