//! UiSession - the abstract browser capability the executor drives.
//!
//! The executor never talks to a browser directly. It needs four things:
//! navigate, query, act, read. Anything that can provide them (a CDP page,
//! a WebDriver bridge, the in-memory [`MockSession`](crate::MockSession))
//! can host a workflow run.
//!
//! ```text
//! ┌────────────────────┐      ┌─────────────────────────────────────┐
//! │  WorkflowRunner     │ ───► │  UiSession (trait)                  │
//! │  LocatorResolver    │      │   navigate / query_elements         │
//! │  ActionExecutor     │      │   perform_action / read_state       │
//! │  AssertionEngine    │      ├───────────────┬─────────────────────┤
//! └────────────────────┘      │  CdpSession   │  MockSession        │
//!                             │  (browser)    │  (tests, demos)     │
//!                             └───────────────┴─────────────────────┘
//! ```

use crate::locator::Selector;
use crate::result::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to an element inside one session.
///
/// Handles stay valid only while the element is attached; a navigation
/// invalidates every handle issued before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(u64);

impl ElementHandle {
    /// Wrap a session-specific id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Session-specific id
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Point-in-time view of one element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Element is still connected to the document
    pub attached: bool,
    /// Element has a rendered, non-hidden box
    pub visible: bool,
    /// Element accepts input (not `disabled`)
    pub enabled: bool,
    /// Rendered text content
    #[serde(default)]
    pub text: Option<String>,
    /// Current form value, for inputs
    #[serde(default)]
    pub value: Option<String>,
}

impl ElementSnapshot {
    /// Snapshot of an element that is gone
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Attached, visible and enabled
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        self.attached && self.visible && self.enabled
    }

    /// Text content, empty when absent
    #[must_use]
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// A concrete action against one element, payload already rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementAction {
    /// Click the element
    Click,
    /// Type text into the element (appends to the current value)
    TypeText(String),
    /// Choose an option by value or label
    SelectOption(String),
    /// Clear the current value
    Clear,
    /// Scroll the element into the viewport
    ScrollIntoView,
}

impl ElementAction {
    /// Verb used in logs and diagnostics; never includes the payload
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::TypeText(_) => "type",
            Self::SelectOption(_) => "select",
            Self::Clear => "clear",
            Self::ScrollIntoView => "scroll",
        }
    }
}

/// Abstract UI session.
///
/// Implementations must be safe to move between tasks: several sessions
/// may run side by side, one workflow each.
#[async_trait]
pub trait UiSession: Send + Sync {
    /// Load `url` in the session's page
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// All elements currently matching `selector`, in document order
    async fn query_elements(&self, selector: &Selector) -> Result<Vec<ElementHandle>, SessionError>;

    /// Perform `action` on the element behind `handle`
    async fn perform_action(
        &mut self,
        handle: ElementHandle,
        action: &ElementAction,
    ) -> Result<(), SessionError>;

    /// Read the element's current state. Detached elements yield a
    /// snapshot with `attached == false` rather than an error.
    async fn read_state(&self, handle: ElementHandle) -> Result<ElementSnapshot, SessionError>;
}
