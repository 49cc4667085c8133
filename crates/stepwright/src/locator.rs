//! Locator abstraction for element selection.
//!
//! # Design Philosophy
//!
//! - **Auto-Waiting**: resolution polls until an attached element appears
//! - **Strict Selection**: several attached matches fail with
//!   `LocatorAmbiguous` unless the `SelectorSpec` says which one to take
//! - **Bounded**: never polls past the step deadline; a zero budget still
//!   probes once

use crate::result::{SessionError, StepError};
use crate::session::{ElementHandle, UiSession};
use crate::wait::{poll_until, Probe, WaitError, DEFAULT_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Attribute used by [`Selector::test_id`]
pub const TEST_ID_ATTRIBUTE: &str = "data-cy";

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector (e.g., ".Login_buttonBox > .v-btn")
    Css(String),
    /// Test id attribute (`data-cy` unless the session maps it elsewhere)
    TestId(String),
    /// Arbitrary attribute equality
    Attribute {
        /// Attribute name
        name: String,
        /// Expected value
        value: String,
    },
    /// Elements whose own text contains the string
    Text(String),
    /// CSS selector filtered by contained text
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
    /// XPath expression
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a test id selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create an attribute selector
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Narrow a CSS selector to elements containing `text`
    ///
    /// Non-CSS selectors are returned unchanged.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        match self {
            Self::Css(css) => Self::CssWithText {
                css,
                text: text.into(),
            },
            other => other,
        }
    }

    /// CSS form of attribute-based selectors, `None` for text/XPath ones
    #[must_use]
    pub fn to_css(&self, test_id_attribute: &str) -> Option<String> {
        match self {
            Self::Css(css) | Self::CssWithText { css, .. } => Some(css.clone()),
            Self::TestId(id) => Some(attribute_css(test_id_attribute, id)),
            Self::Attribute { name, value } => Some(attribute_css(name, value)),
            Self::Text(_) | Self::XPath(_) => None,
        }
    }
}

fn attribute_css(name: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("[{name}=\"{escaped}\"]")
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "css `{css}`"),
            Self::TestId(id) => write!(f, "{}", attribute_css(TEST_ID_ATTRIBUTE, id)),
            Self::Attribute { name, value } => write!(f, "{}", attribute_css(name, value)),
            Self::Text(text) => write!(f, "text {text:?}"),
            Self::CssWithText { css, text } => write!(f, "css `{css}` with text {text:?}"),
            Self::XPath(xpath) => write!(f, "xpath `{xpath}`"),
        }
    }
}

/// What to do when several attached elements match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disambiguation {
    /// Exactly one match is required
    #[default]
    Strict,
    /// Take the first match in document order
    First,
    /// Take the n-th match (0-based) in document order
    Nth(usize),
}

/// Declarative element reference with its own resolution budget
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectorSpec {
    /// Which elements match
    pub selector: Selector,
    /// Resolution timeout; the run's per-step timeout when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Choice among several matches
    #[serde(default, skip_serializing_if = "is_strict")]
    pub pick: Disambiguation,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_strict(pick: &Disambiguation) -> bool {
    *pick == Disambiguation::Strict
}

impl SelectorSpec {
    /// Strict spec with the run's default timeout
    #[must_use]
    pub const fn new(selector: Selector) -> Self {
        Self {
            selector,
            timeout_ms: None,
            pick: Disambiguation::Strict,
        }
    }

    /// Shorthand for a CSS spec
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Selector::css(selector))
    }

    /// Shorthand for a test id spec
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::new(Selector::test_id(id))
    }

    /// Set a custom resolution timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Take the first match instead of requiring a unique one
    #[must_use]
    pub const fn first(mut self) -> Self {
        self.pick = Disambiguation::First;
        self
    }

    /// Take the n-th match (0-based)
    #[must_use]
    pub const fn nth(mut self, index: usize) -> Self {
        self.pick = Disambiguation::Nth(index);
        self
    }

    /// Resolution budget given the run's default
    #[must_use]
    pub fn timeout_or(&self, default_ms: u64) -> u64 {
        self.timeout_ms.unwrap_or(default_ms)
    }

    /// Apply the disambiguation rule to attached matches
    pub(crate) fn pick_from(&self, attached: &[ElementHandle]) -> Picked {
        match (self.pick, attached.len()) {
            (_, 0) => Picked::None,
            (Disambiguation::Strict, 1) | (Disambiguation::First, _) => Picked::One(attached[0]),
            (Disambiguation::Strict, n) => Picked::Ambiguous(n),
            (Disambiguation::Nth(i), n) if i < n => Picked::One(attached[i]),
            (Disambiguation::Nth(_), n) => Picked::TooFew(n),
        }
    }
}

impl From<Selector> for SelectorSpec {
    fn from(selector: Selector) -> Self {
        Self::new(selector)
    }
}

impl fmt::Display for SelectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pick {
            Disambiguation::Strict => write!(f, "{}", self.selector),
            Disambiguation::First => write!(f, "{} (first)", self.selector),
            Disambiguation::Nth(i) => write!(f, "{} (nth {i})", self.selector),
        }
    }
}

/// Result of applying a [`Disambiguation`] rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Picked {
    One(ElementHandle),
    None,
    Ambiguous(usize),
    TooFew(usize),
}

/// Attached matches for `selector`, dropping detached ones
pub(crate) async fn attached_matches<S: UiSession + ?Sized>(
    session: &S,
    selector: &Selector,
) -> Result<Vec<ElementHandle>, SessionError> {
    let handles = session.query_elements(selector).await?;
    let mut attached = Vec::with_capacity(handles.len());
    for handle in handles {
        match session.read_state(handle).await {
            Ok(state) if state.attached => attached.push(handle),
            Ok(_) | Err(SessionError::Detached { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(attached)
}

/// Resolves [`SelectorSpec`]s to element handles
#[derive(Debug, Clone)]
pub struct LocatorResolver {
    poll_interval: Duration,
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl LocatorResolver {
    /// Create a resolver with a custom poll interval
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Poll until `spec` resolves to a unique attached element.
    ///
    /// # Errors
    ///
    /// `LocatorTimeout` when nothing (or too few for `Nth`) is attached by
    /// `deadline`; `LocatorAmbiguous` as soon as a strict spec sees several.
    pub async fn resolve<S: UiSession + ?Sized>(
        &self,
        session: &S,
        spec: &SelectorSpec,
        deadline: Instant,
    ) -> Result<ElementHandle, StepError> {
        let started = Instant::now();
        let outcome = poll_until(deadline, self.poll_interval, || async move {
            match attached_matches(session, &spec.selector).await {
                Ok(attached) => match spec.pick_from(&attached) {
                    Picked::One(handle) => Probe::Ready(handle),
                    Picked::Ambiguous(n) => Probe::Fail(format!(
                        "{} matched {n} elements; use `pick: first` or `pick: {{nth: i}}`",
                        spec.selector
                    )),
                    Picked::None => Probe::Retry("no attached element matched".to_string()),
                    Picked::TooFew(n) => Probe::Retry(format!("only {n} attached element(s)")),
                },
                Err(e) => Probe::Retry(format!("last session error: {e}")),
            }
        })
        .await;

        match outcome {
            Ok(handle) => {
                tracing::trace!(selector = %spec, %handle, "locator resolved");
                Ok(handle)
            }
            Err(WaitError::Failed(message)) => Err(StepError::locator_ambiguous(message)),
            Err(WaitError::TimedOut(observed)) => Err(StepError::locator_timeout(format!(
                "{spec} not found after {}ms ({observed})",
                started.elapsed().as_millis()
            ))),
        }
    }
}
