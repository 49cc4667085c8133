//! Result and error types for Stepwright.
//!
//! Two layers of errors live here:
//!
//! - [`StepError`] is step-local. It always ends up inside a
//!   [`StepResult`](crate::StepResult) and never escapes a run.
//! - [`FlowError`] covers everything around a run: unparsable workflow
//!   files, invalid configuration, a browser that will not launch.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for Stepwright operations outside of a run
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors raised while preparing or hosting a run
#[derive(Debug, Error)]
pub enum FlowError {
    /// Workflow definition is malformed or inconsistent
    #[error("Invalid workflow '{workflow}': {message}")]
    InvalidWorkflow {
        /// Workflow name (or file path when unnamed)
        workflow: String,
        /// Error message
        message: String,
    },

    /// Run configuration is inconsistent
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Browser executable not found or failed to start
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// A UI session could not be opened
    #[error("Failed to open session: {0}")]
    Session(#[from] SessionError),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Create an invalid workflow error
    #[must_use]
    pub fn invalid_workflow(workflow: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidWorkflow {
            workflow: workflow.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Errors reported by a [`UiSession`](crate::UiSession) implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The element behind a handle is no longer part of the page
    #[error("element {handle} is detached")]
    Detached {
        /// Handle id
        handle: u64,
    },

    /// The page refused the action (read-only input, missing option, ...)
    #[error("input rejected: {message}")]
    Rejected {
        /// Error message
        message: String,
    },

    /// Navigation did not complete
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// Target URL
        url: String,
        /// Error message
        message: String,
    },

    /// Transport-level failure talking to the browser
    #[error("transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },
}

impl SessionError {
    /// Create a rejected-input error
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Step failure taxonomy.
///
/// `LocatorTimeout` means the element never showed up; `ActionFailed` means it
/// showed up and the page rejected what was done to it. Callers rely on the
/// difference to tell flaky timing apart from application defects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No unique attached element appeared before the deadline
    LocatorTimeout,
    /// Several elements matched a strict selector
    LocatorAmbiguous,
    /// The element was found but the action did not go through
    ActionFailed,
    /// An expectation did not hold (immediately or before its deadline)
    AssertionFailed,
    /// The whole-run deadline preempted the step
    RunTimeout,
}

impl FailureKind {
    /// Stable identifier used in reports
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocatorTimeout => "LocatorTimeout",
            Self::LocatorAmbiguous => "LocatorAmbiguous",
            Self::ActionFailed => "ActionFailed",
            Self::AssertionFailed => "AssertionFailed",
            Self::RunTimeout => "RunTimeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step-local failure with its diagnostic
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StepError {
    /// Failure class
    pub kind: FailureKind,
    /// Human-readable diagnostic
    pub message: String,
}

impl StepError {
    /// Create a step error of the given kind
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Element never appeared
    #[must_use]
    pub fn locator_timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::LocatorTimeout, message)
    }

    /// Strict selector matched several elements
    #[must_use]
    pub fn locator_ambiguous(message: impl Into<String>) -> Self {
        Self::new(FailureKind::LocatorAmbiguous, message)
    }

    /// Action rejected or interrupted
    #[must_use]
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ActionFailed, message)
    }

    /// Expectation not met
    #[must_use]
    pub fn assertion_failed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AssertionFailed, message)
    }

    /// Whole-run deadline exceeded
    #[must_use]
    pub fn run_timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RunTimeout, message)
    }
}
