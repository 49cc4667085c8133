//! Stepwright: declarative browser-workflow executor
//!
//! A workflow is a list of typed steps (navigate, locate, act, wait, assert)
//! run in order against a [`UiSession`]. Each step has a bounded budget, the
//! whole run has a deadline, and the outcome is a [`RunReport`] rather than
//! an error.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   STEPWRIGHT Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────────┐    ┌────────────────┐    │
//! │   │ Workflow   │    │ WorkflowRunner │    │ UiSession      │    │
//! │   │ (YAML or   │───►│ Locator/Action │───►│ CdpSession     │    │
//! │   │  builder)  │    │ Assertion      │    │ MockSession    │    │
//! │   └────────────┘    └────────────────┘    └────────────────┘    │
//! │         │                   │                                    │
//! │   ┌─────▼──────┐    ┌───────▼────────┐                           │
//! │   │ Fixtures   │    │ RunReport      │                           │
//! │   │ (seeded)   │    │ (text / JSON)  │                           │
//! │   └────────────┘    └────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use stepwright::{
//!     AssertMode, Condition, Expectation, MockElement, MockSession, RunVerdict, Selector,
//!     SelectorSpec, Workflow, WorkflowRunner,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let mut session = MockSession::new()
//!     .with_element(MockElement::new(Selector::test_id("acceptCookies")))
//!     .with_element(MockElement::new(Selector::css(".v-app-bar__nav-icon")));
//!
//! let workflow = Workflow::new("login")
//!     .click(SelectorSpec::test_id("acceptCookies"))
//!     .assert(
//!         Condition::new(Selector::css(".v-app-bar__nav-icon"), Expectation::Visible),
//!         AssertMode::Immediate,
//!     );
//!
//! let report = WorkflowRunner::default().run(&workflow, &mut session).await;
//! assert_eq!(report.verdict, RunVerdict::Pass);
//! # });
//! ```

#![warn(missing_docs)]

mod action;
mod assertion;
#[cfg(feature = "browser")]
pub mod cdp;
mod config;
pub mod fixture;
mod locator;
mod mock;
mod report;
mod result;
mod runner;
mod session;
pub mod template;
mod wait;
mod workflow;

pub use action::ActionExecutor;
pub use assertion::{AssertMode, AssertionEngine, Condition, Expectation, Verdict};
pub use config::{
    BrowserConfig, FailurePolicy, PartialRunConfig, RunConfig, DEFAULT_RUN_TIMEOUT_MS,
    DEFAULT_STEP_TIMEOUT_MS,
};
pub use fixture::{FixtureGenerator, FixtureRule, FixtureValue};
pub use locator::{Disambiguation, LocatorResolver, Selector, SelectorSpec, TEST_ID_ATTRIBUTE};
pub use mock::{MockEffect, MockElement, MockPage, MockSession};
pub use report::{RunReport, RunState, RunVerdict, StepResult, StepVerdict, SuiteReport};
pub use result::{FailureKind, FlowError, FlowResult, SessionError, StepError};
pub use runner::{run_all, ExecutionContext, WorkflowRunner};
pub use session::{ElementAction, ElementHandle, ElementSnapshot, UiSession};
pub use wait::DEFAULT_POLL_INTERVAL_MS;
pub use workflow::{ActStep, ActionKind, AssertStep, WaitStep, Workflow, WorkflowStep};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        AssertMode, Condition, Expectation, FailurePolicy, FixtureRule, MockElement, MockSession,
        RunConfig, RunReport, RunVerdict, Selector, SelectorSpec, StepVerdict, UiSession,
        Workflow, WorkflowRunner,
    };
}
