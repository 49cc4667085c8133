//! Workflow definitions.
//!
//! A [`Workflow`] is an ordered, immutable list of [`WorkflowStep`]s plus the
//! fixtures its payloads refer to. Workflows are built in code or loaded from
//! YAML:
//!
//! ```yaml
//! name: login
//! fixtures:
//!   user_email: { rule: email }
//! steps:
//!   - navigate: /client/login
//!   - click: { selector: { test_id: acceptCookies } }
//!   - type: { selector: { test_id: txtFieldEmail }, text: "${user_email}" }
//!   - wait_for: { selector: { css: .v-app-bar__nav-icon }, expect: visible, timeout_ms: 5000 }
//! ```

use crate::assertion::{AssertMode, Condition};
use crate::config::PartialRunConfig;
use crate::fixture::FixtureRule;
use crate::locator::{Selector, SelectorSpec};
use crate::result::{FlowError, FlowResult};
use crate::session::ElementAction;
use crate::template::{placeholders, Placeholder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::with::singleton_map_recursive;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Action performed by an `Act` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Click
    Click,
    /// Type a payload template
    TypeText(String),
    /// Select an option given by a payload template
    SelectOption(String),
    /// Clear the value
    Clear,
    /// Scroll into view
    ScrollIntoView,
}

impl ActionKind {
    /// Payload template, if the action carries one
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::TypeText(text) | Self::SelectOption(text) => Some(text),
            Self::Click | Self::Clear | Self::ScrollIntoView => None,
        }
    }

    /// Concrete session action with the payload already rendered
    #[must_use]
    pub fn to_element_action(&self, rendered: Option<String>) -> ElementAction {
        match self {
            Self::Click => ElementAction::Click,
            Self::TypeText(_) => ElementAction::TypeText(rendered.unwrap_or_default()),
            Self::SelectOption(_) => ElementAction::SelectOption(rendered.unwrap_or_default()),
            Self::Clear => ElementAction::Clear,
            Self::ScrollIntoView => ElementAction::ScrollIntoView,
        }
    }

    const fn verb(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::TypeText(_) => "type into",
            Self::SelectOption(_) => "select in",
            Self::Clear => "clear",
            Self::ScrollIntoView => "scroll to",
        }
    }
}

/// An `Act` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActStep {
    /// What to do
    pub action: ActionKind,
    /// Element to do it to
    pub target: SelectorSpec,
    /// Skip actionability checks
    pub force: bool,
}

/// A `WaitFor` step
///
/// In YAML the step carries a single `timeout_ms` key, read as the wait
/// budget rather than the selector's resolution budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Condition", into = "Condition")]
pub struct WaitStep {
    /// Condition to wait for
    pub condition: Condition,
    /// Wait budget; the per-step timeout when absent
    pub timeout_ms: Option<u64>,
}

impl WaitStep {
    /// Wait up to `timeout_ms` for `condition`
    ///
    /// A timeout already set on the condition's selector is replaced.
    #[must_use]
    pub fn new(mut condition: Condition, timeout_ms: u64) -> Self {
        condition.target.timeout_ms = None;
        Self {
            condition,
            timeout_ms: Some(timeout_ms),
        }
    }
}

impl From<Condition> for WaitStep {
    fn from(mut condition: Condition) -> Self {
        let timeout_ms = condition.target.timeout_ms.take();
        Self {
            condition,
            timeout_ms,
        }
    }
}

impl From<WaitStep> for Condition {
    fn from(wait: WaitStep) -> Self {
        let mut condition = wait.condition;
        condition.target.timeout_ms = wait.timeout_ms.or(condition.target.timeout_ms);
        condition
    }
}

/// An `Assert` step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertStep {
    /// Expectation under test
    #[serde(flatten)]
    pub condition: Condition,
    /// Immediate or bounded wait
    #[serde(default)]
    pub mode: AssertMode,
}

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StepDef", into = "StepDef")]
pub enum WorkflowStep {
    /// Load a URL (relative targets are joined to the base URL)
    Navigate(String),
    /// Resolve an element and remember it for later steps
    Locate(SelectorSpec),
    /// Act on an element
    Act(ActStep),
    /// Wait for a condition
    WaitFor(WaitStep),
    /// Check an expectation
    Assert(AssertStep),
}

impl WorkflowStep {
    /// Element spec the step targets, if any
    #[must_use]
    pub const fn target(&self) -> Option<&SelectorSpec> {
        match self {
            Self::Navigate(_) => None,
            Self::Locate(spec) => Some(spec),
            Self::Act(act) => Some(&act.target),
            Self::WaitFor(wait) => Some(&wait.condition.target),
            Self::Assert(assert) => Some(&assert.condition.target),
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate(url) => write!(f, "navigate {url}"),
            Self::Locate(spec) => write!(f, "locate {spec}"),
            Self::Act(act) if act.force => write!(f, "{} {} (forced)", act.action.verb(), act.target),
            Self::Act(act) => write!(f, "{} {}", act.action.verb(), act.target),
            Self::WaitFor(wait) => write!(f, "wait for {}", wait.condition),
            Self::Assert(assert) => match assert.mode {
                AssertMode::Immediate => write!(f, "assert {}", assert.condition),
                AssertMode::Eventually { timeout_ms } => {
                    write!(f, "assert {} within {timeout_ms}ms", assert.condition)
                }
            },
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// YAML shape of a step: actions are top-level keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StepDef {
    Navigate(String),
    Locate(SelectorSpec),
    Click(TargetDef),
    Type(TextDef),
    Select(OptionDef),
    Clear(TargetDef),
    ScrollIntoView(TargetDef),
    WaitFor(WaitStep),
    Assert(AssertStep),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TargetDef {
    #[serde(flatten)]
    target: SelectorSpec,
    #[serde(default, skip_serializing_if = "is_false")]
    force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TextDef {
    #[serde(flatten)]
    target: SelectorSpec,
    text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OptionDef {
    #[serde(flatten)]
    target: SelectorSpec,
    option: String,
    #[serde(default, skip_serializing_if = "is_false")]
    force: bool,
}

impl From<StepDef> for WorkflowStep {
    fn from(def: StepDef) -> Self {
        let act = |action, target, force| Self::Act(ActStep { action, target, force });
        match def {
            StepDef::Navigate(url) => Self::Navigate(url),
            StepDef::Locate(spec) => Self::Locate(spec),
            StepDef::Click(t) => act(ActionKind::Click, t.target, t.force),
            StepDef::Type(t) => act(ActionKind::TypeText(t.text), t.target, t.force),
            StepDef::Select(t) => act(ActionKind::SelectOption(t.option), t.target, t.force),
            StepDef::Clear(t) => act(ActionKind::Clear, t.target, t.force),
            StepDef::ScrollIntoView(t) => act(ActionKind::ScrollIntoView, t.target, t.force),
            StepDef::WaitFor(wait) => Self::WaitFor(wait),
            StepDef::Assert(assert) => Self::Assert(assert),
        }
    }
}

impl From<WorkflowStep> for StepDef {
    fn from(step: WorkflowStep) -> Self {
        match step {
            WorkflowStep::Navigate(url) => Self::Navigate(url),
            WorkflowStep::Locate(spec) => Self::Locate(spec),
            WorkflowStep::Act(ActStep {
                action,
                target,
                force,
            }) => match action {
                ActionKind::Click => Self::Click(TargetDef { target, force }),
                ActionKind::TypeText(text) => Self::Type(TextDef {
                    target,
                    text,
                    force,
                }),
                ActionKind::SelectOption(option) => Self::Select(OptionDef {
                    target,
                    option,
                    force,
                }),
                ActionKind::Clear => Self::Clear(TargetDef { target, force }),
                ActionKind::ScrollIntoView => Self::ScrollIntoView(TargetDef { target, force }),
            },
            WorkflowStep::WaitFor(wait) => Self::WaitFor(wait),
            WorkflowStep::Assert(assert) => Self::Assert(assert),
        }
    }
}

/// Parse YAML that writes enum variants as single-key maps (`css: .btn`)
/// rather than `!tag` values
pub(crate) fn yaml_from_str<T: DeserializeOwned>(yaml: &str) -> Result<T, serde_yaml_ng::Error> {
    singleton_map_recursive::deserialize(serde_yaml_ng::Deserializer::from_str(yaml))
}

/// Ordered list of steps with the fixtures they use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name, used in reports
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fixtures bound before the first step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fixtures: BTreeMap<String, FixtureRule>,
    /// Run settings written in the file
    #[serde(default)]
    pub config: PartialRunConfig,
    /// Steps, in execution order
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Empty workflow
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fixtures: BTreeMap::new(),
            config: PartialRunConfig::default(),
            steps: Vec::new(),
        }
    }

    /// Parse from YAML
    ///
    /// # Errors
    ///
    /// `Yaml` when the document does not describe a workflow
    pub fn from_yaml(yaml: &str) -> FlowResult<Self> {
        Ok(yaml_from_str(yaml)?)
    }

    /// Load and validate a YAML file
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read, `InvalidWorkflow` when it does not
    /// parse or does not validate
    pub fn load(path: impl AsRef<Path>) -> FlowResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let workflow = Self::from_yaml(&text)
            .map_err(|e| FlowError::invalid_workflow(path.display().to_string(), e.to_string()))?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// `Yaml` on serializer failure
    pub fn to_yaml(&self) -> FlowResult<String> {
        let value = singleton_map_recursive::serialize(self, serde_yaml_ng::value::Serializer)?;
        Ok(serde_yaml_ng::to_string(&value)?)
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Bind a fixture
    #[must_use]
    pub fn fixture(mut self, name: impl Into<String>, rule: FixtureRule) -> Self {
        self.fixtures.insert(name.into(), rule);
        self
    }

    /// Set file-level run settings
    #[must_use]
    pub fn with_config(mut self, config: PartialRunConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a `Navigate` step
    #[must_use]
    pub fn navigate(self, url: impl Into<String>) -> Self {
        self.step(WorkflowStep::Navigate(url.into()))
    }

    /// Append a `Locate` step
    #[must_use]
    pub fn locate(self, spec: impl Into<SelectorSpec>) -> Self {
        self.step(WorkflowStep::Locate(spec.into()))
    }

    /// Append an `Act` step
    #[must_use]
    pub fn act(self, action: ActionKind, target: impl Into<SelectorSpec>) -> Self {
        self.step(WorkflowStep::Act(ActStep {
            action,
            target: target.into(),
            force: false,
        }))
    }

    /// Append a click
    #[must_use]
    pub fn click(self, target: impl Into<SelectorSpec>) -> Self {
        self.act(ActionKind::Click, target)
    }

    /// Append a click that skips actionability checks
    #[must_use]
    pub fn force_click(self, target: impl Into<SelectorSpec>) -> Self {
        self.step(WorkflowStep::Act(ActStep {
            action: ActionKind::Click,
            target: target.into(),
            force: true,
        }))
    }

    /// Append a type-text action; `text` may contain placeholders
    #[must_use]
    pub fn type_text(self, target: impl Into<SelectorSpec>, text: impl Into<String>) -> Self {
        self.act(ActionKind::TypeText(text.into()), target)
    }

    /// Append a select-option action
    #[must_use]
    pub fn select(self, target: impl Into<SelectorSpec>, option: impl Into<String>) -> Self {
        self.act(ActionKind::SelectOption(option.into()), target)
    }

    /// Append a `WaitFor` step
    #[must_use]
    pub fn wait_for(self, condition: Condition, timeout_ms: u64) -> Self {
        self.step(WorkflowStep::WaitFor(WaitStep::new(condition, timeout_ms)))
    }

    /// Append an `Assert` step
    #[must_use]
    pub fn assert(self, condition: Condition, mode: AssertMode) -> Self {
        self.step(WorkflowStep::Assert(AssertStep { condition, mode }))
    }

    /// Check the workflow is runnable
    ///
    /// # Errors
    ///
    /// `InvalidWorkflow` naming the first problem found
    pub fn validate(&self) -> FlowResult<()> {
        let invalid = |message: String| FlowError::invalid_workflow(self.name.clone(), message);

        if self.name.trim().is_empty() {
            return Err(FlowError::invalid_workflow("<unnamed>", "name is empty"));
        }
        if self.steps.is_empty() {
            return Err(invalid("workflow has no steps".to_string()));
        }
        for (name, rule) in &self.fixtures {
            rule.check()
                .map_err(|e| invalid(format!("fixture `{name}`: {e}")))?;
        }

        for (index, step) in self.steps.iter().enumerate() {
            let at = |message: String| invalid(format!("step {index} ({step}): {message}"));
            if let WorkflowStep::Navigate(url) = step {
                if url.trim().is_empty() {
                    return Err(at("empty URL".to_string()));
                }
            }
            if let Some(spec) = step.target() {
                if selector_is_empty(&spec.selector) {
                    return Err(at("empty selector".to_string()));
                }
            }
            if let WorkflowStep::Act(act) = step {
                if let Some(payload) = act.action.payload() {
                    self.check_placeholders(payload).map_err(at)?;
                }
            }
        }
        Ok(())
    }

    fn check_placeholders(&self, payload: &str) -> Result<(), String> {
        for placeholder in placeholders(payload).map_err(|e| e.to_string())? {
            let Placeholder::Fixture { name, field } = placeholder else {
                continue;
            };
            let rule = self
                .fixtures
                .get(name)
                .ok_or_else(|| format!("unbound fixture placeholder ${{{name}}}"))?;
            match (rule.fields(), field) {
                ([], None) => {}
                ([], Some(field)) => {
                    return Err(format!("fixture `{name}` is text; ${{{name}.{field}}} is invalid"))
                }
                (_, None) => return Err(format!("fixture `{name}` is a record; name a field")),
                (fields, Some(field)) if fields.contains(&field) => {}
                (_, Some(field)) => return Err(format!("fixture `{name}` has no field `{field}`")),
            }
        }
        Ok(())
    }
}

fn selector_is_empty(selector: &Selector) -> bool {
    match selector {
        Selector::Css(s) | Selector::TestId(s) | Selector::Text(s) | Selector::XPath(s) => {
            s.trim().is_empty()
        }
        Selector::Attribute { name, .. } => name.trim().is_empty(),
        Selector::CssWithText { css, .. } => css.trim().is_empty(),
    }
}
