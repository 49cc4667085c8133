//! Workflow runner.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──► Running ──┬──► Completed   every step has a Pass/Fail verdict
//!                       └──► Aborted     stop-on-failure, run deadline
//! ```
//!
//! Steps run strictly in declared order. Every step future is wrapped in
//! the whole-run deadline, so an in-flight wait is dropped (cancelled) the
//! moment the run budget is spent. Step problems never surface as errors:
//! they end up in the [`RunReport`].

use crate::action::ActionExecutor;
use crate::assertion::AssertionEngine;
use crate::config::{FailurePolicy, PartialRunConfig, RunConfig};
use crate::fixture::{FixtureGenerator, FixtureValue};
use crate::locator::{Disambiguation, LocatorResolver, Selector};
use crate::report::{RunReport, RunState, RunVerdict, StepResult, StepVerdict, SuiteReport};
use crate::result::{FailureKind, FlowResult, StepError};
use crate::session::{ElementHandle, UiSession};
use crate::template;
use crate::workflow::{ActStep, Workflow, WorkflowStep};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-run mutable state, owned by the runner for one run
#[derive(Debug)]
pub struct ExecutionContext<'s, S: ?Sized> {
    session: &'s mut S,
    run_deadline: Instant,
    located: HashMap<(Selector, Disambiguation), ElementHandle>,
    bindings: BTreeMap<String, FixtureValue>,
    results: Vec<StepResult>,
    state: RunState,
}

impl<'s, S: UiSession + ?Sized> ExecutionContext<'s, S> {
    fn new(session: &'s mut S, run_deadline: Instant, bindings: BTreeMap<String, FixtureValue>) -> Self {
        Self {
            session,
            run_deadline,
            located: HashMap::new(),
            bindings,
            results: Vec::new(),
            state: RunState::Pending,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Results recorded so far
    #[must_use]
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Fixture values bound for this run
    #[must_use]
    pub const fn bindings(&self) -> &BTreeMap<String, FixtureValue> {
        &self.bindings
    }

    /// Deadline of the whole run
    #[must_use]
    pub const fn run_deadline(&self) -> Instant {
        self.run_deadline
    }

    fn record(&mut self, result: StepResult) {
        debug_assert_eq!(result.index, self.results.len());
        self.results.push(result);
    }
}

/// Executes workflows against a [`UiSession`]
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    config: RunConfig,
    resolver: LocatorResolver,
    executor: ActionExecutor,
    assertions: AssertionEngine,
}

impl Default for WorkflowRunner {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}

impl WorkflowRunner {
    /// Create a runner with `config`
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        let poll = Duration::from_millis(config.poll_interval_ms.max(1));
        Self {
            config,
            resolver: LocatorResolver::new(poll),
            executor: ActionExecutor::new(poll),
            assertions: AssertionEngine::new(poll),
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Generate a value for every fixture the workflow declares
    #[must_use]
    pub fn bind_fixtures(workflow: &Workflow, seed: u64) -> BTreeMap<String, FixtureValue> {
        let mut generator = FixtureGenerator::seeded(seed);
        workflow
            .fixtures
            .iter()
            .map(|(name, rule)| (name.clone(), generator.generate(rule)))
            .collect()
    }

    /// Run `workflow` to completion or abort.
    ///
    /// Never fails: every problem is a step verdict in the returned report.
    pub async fn run<S: UiSession + ?Sized>(&self, workflow: &Workflow, session: &mut S) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", workflow = %workflow.name, %run_id);
        self.run_inner(run_id, workflow, session).instrument(span).await
    }

    async fn run_inner<S: UiSession + ?Sized>(
        &self,
        run_id: Uuid,
        workflow: &Workflow,
        session: &mut S,
    ) -> RunReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let run_deadline = started + Duration::from_millis(self.config.whole_run_timeout_ms);
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let bindings = Self::bind_fixtures(workflow, seed);

        let mut ctx = ExecutionContext::new(session, run_deadline, bindings);
        ctx.state = RunState::Running;
        info!(steps = workflow.steps.len(), seed, "run started");

        let mut skip_reason: Option<String> = None;
        for (index, step) in workflow.steps.iter().enumerate() {
            let description = step.to_string();
            if let Some(reason) = &skip_reason {
                ctx.record(StepResult::skipped(index, description, reason.clone()));
                continue;
            }

            debug!(index, step = %description, "step started");
            let step_started = Instant::now();
            let outcome = if step_started >= run_deadline {
                Err(self.run_timeout_error())
            } else {
                match tokio::time::timeout_at(run_deadline, self.execute_step(&mut ctx, step)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(self.run_timeout_error()),
                }
            };
            let elapsed = step_started.elapsed();
            let forced = matches!(step, WorkflowStep::Act(ActStep { force: true, .. }));

            let result = match outcome {
                Ok(diagnostic) => {
                    debug!(index, elapsed_ms = elapsed.as_millis() as u64, "step passed");
                    StepResult::passed(index, description, diagnostic, elapsed)
                }
                Err(error) => {
                    warn!(index, step = %description, kind = %error.kind, "step failed: {}", error.message);
                    let kind = error.kind;
                    if kind == FailureKind::RunTimeout {
                        skip_reason = Some("skipped: run deadline exceeded".to_string());
                    } else if self.config.failure_policy == FailurePolicy::StopOnFailure
                        && index + 1 < workflow.steps.len()
                    {
                        skip_reason = Some(format!("skipped after step {index} failed"));
                    }
                    StepResult::failed(index, description, error, elapsed)
                }
            };
            ctx.record(result.with_forced(forced));
        }

        // A failure on the last step leaves nothing to skip: the run completes.
        let aborted = skip_reason.is_some();
        ctx.state = if aborted {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        let verdict = if aborted {
            RunVerdict::Aborted
        } else if ctx.results.iter().any(|r| r.verdict == StepVerdict::Fail) {
            RunVerdict::Fail
        } else {
            RunVerdict::Pass
        };
        let duration = started.elapsed();
        info!(%verdict, elapsed_ms = duration.as_millis() as u64, "run finished");

        RunReport {
            run_id,
            workflow: workflow.name.clone(),
            verdict,
            state: ctx.state,
            steps: ctx.results,
            duration,
            started_at,
            seed,
            fixtures: ctx.bindings,
            error: None,
        }
    }

    fn run_timeout_error(&self) -> StepError {
        StepError::run_timeout(format!(
            "run deadline of {} ms exceeded",
            self.config.whole_run_timeout_ms
        ))
    }

    fn step_deadline(&self, timeout_ms: Option<u64>) -> Instant {
        Instant::now() + Duration::from_millis(timeout_ms.unwrap_or(self.config.per_step_timeout_ms))
    }

    async fn execute_step<S: UiSession + ?Sized>(
        &self,
        ctx: &mut ExecutionContext<'_, S>,
        step: &WorkflowStep,
    ) -> Result<String, StepError> {
        match step {
            WorkflowStep::Navigate(target) => {
                let url = self.resolve_url(target);
                let deadline = self.step_deadline(None);
                ctx.located.clear();
                match tokio::time::timeout_at(deadline, ctx.session.navigate(&url)).await {
                    Ok(Ok(())) => Ok(format!("loaded {url}")),
                    Ok(Err(e)) => Err(StepError::action_failed(e.to_string())),
                    Err(_) => Err(StepError::action_failed(format!(
                        "navigation to {url} did not finish within {} ms",
                        self.config.per_step_timeout_ms
                    ))),
                }
            }
            WorkflowStep::Locate(spec) => {
                let deadline = self.step_deadline(spec.timeout_ms);
                let handle = self.resolver.resolve(&*ctx.session, spec, deadline).await?;
                ctx.located.insert((spec.selector.clone(), spec.pick), handle);
                Ok(format!("{spec} resolved to {handle}"))
            }
            WorkflowStep::Act(act) => self.execute_act(ctx, act).await,
            WorkflowStep::WaitFor(wait) => {
                let timeout_ms = wait
                    .timeout_ms
                    .or(wait.condition.target.timeout_ms)
                    .unwrap_or(self.config.per_step_timeout_ms);
                self.assertions
                    .wait_for(&*ctx.session, &wait.condition, timeout_ms)
                    .await
            }
            WorkflowStep::Assert(assert) => {
                self.assertions
                    .assert(&*ctx.session, &assert.condition, assert.mode)
                    .await
            }
        }
    }

    async fn execute_act<S: UiSession + ?Sized>(
        &self,
        ctx: &mut ExecutionContext<'_, S>,
        act: &ActStep,
    ) -> Result<String, StepError> {
        let rendered = match act.action.payload() {
            Some(payload) => Some(
                template::render(payload, &ctx.bindings, |key| self.config.env_value(key))
                    .map_err(|e| StepError::action_failed(e.to_string()))?,
            ),
            None => None,
        };
        let action = act.action.to_element_action(rendered);

        let deadline = self.step_deadline(act.target.timeout_ms);
        let key = (act.target.selector.clone(), act.target.pick);
        let cached = match ctx.located.get(&key) {
            Some(&handle) => match ctx.session.read_state(handle).await {
                Ok(state) if state.attached => Some(handle),
                _ => None,
            },
            None => None,
        };
        let handle = match cached {
            Some(handle) => handle,
            None => {
                let handle = self.resolver.resolve(&*ctx.session, &act.target, deadline).await?;
                ctx.located.insert(key, handle);
                handle
            }
        };

        self.executor
            .execute(&mut *ctx.session, handle, &action, act.force, deadline)
            .await?;
        Ok(format!("{} {} ok", action.verb(), act.target))
    }

    fn resolve_url(&self, target: &str) -> String {
        let absolute = target.contains("://") || target.starts_with("about:");
        match (&self.config.base_url, absolute) {
            (Some(base), false) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                target.trim_start_matches('/')
            ),
            _ => target.to_string(),
        }
    }
}

/// Run several workflows, each on its own session, at most `jobs` at a time.
///
/// Each run's settings are `base`, then the workflow file's `config:`, then
/// `overrides`. Reports come back in input order.
pub async fn run_all<'a, S, F, Fut>(
    workflows: &'a [Workflow],
    base: &'a RunConfig,
    overrides: &'a PartialRunConfig,
    jobs: usize,
    open_session: F,
) -> SuiteReport
where
    S: UiSession,
    F: Fn(&'a Workflow) -> Fut,
    Fut: Future<Output = FlowResult<S>>,
{
    let started = Instant::now();
    let open_session = &open_session;
    let runs = stream::iter(workflows)
        .map(|workflow| async move {
            let config = base
                .clone()
                .merged_with(&workflow.config)
                .merged_with(overrides);
            if let Err(e) = config.validate() {
                return RunReport::session_failed(workflow.name.clone(), e.to_string());
            }
            match open_session(workflow).await {
                Ok(mut session) => WorkflowRunner::new(config).run(workflow, &mut session).await,
                Err(e) => {
                    warn!(workflow = %workflow.name, "could not open session: {e}");
                    RunReport::session_failed(workflow.name.clone(), e.to_string())
                }
            }
        })
        .buffered(jobs.max(1))
        .collect::<Vec<_>>()
        .await;
    SuiteReport::new(runs, started.elapsed())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::assertion::{AssertMode, Condition, Expectation};
    use crate::fixture::FixtureRule;
    use crate::locator::SelectorSpec;
    use crate::mock::{MockEffect, MockElement, MockPage, MockSession};

    mod url_tests {
        use super::*;

        #[test]
        fn test_relative_urls_join_base() {
            let runner = WorkflowRunner::new(RunConfig::new().with_base_url("https://app.test/"));
            assert_eq!(runner.resolve_url("/client/login"), "https://app.test/client/login");
            assert_eq!(runner.resolve_url("https://other.test/x"), "https://other.test/x");
        }

        #[test]
        fn test_without_base_url_targets_are_kept() {
            assert_eq!(WorkflowRunner::default().resolve_url("/a"), "/a");
        }
    }

    mod step_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_navigate_clears_located_cache() {
            let mut session = MockSession::new()
                .with_page("/a", MockPage::new().with(MockElement::new(Selector::css("#x"))))
                .with_page("/b", MockPage::new().with(MockElement::new(Selector::css("#x"))));
            let workflow = Workflow::new("cache")
                .navigate("/a")
                .locate(SelectorSpec::css("#x"))
                .navigate("/b")
                .click(SelectorSpec::css("#x"));
            let report = WorkflowRunner::default().run(&workflow, &mut session).await;
            assert_eq!(report.verdict, RunVerdict::Pass, "{}", report.summary());
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigation_failure_is_action_failed() {
            let mut session = MockSession::new().failing_navigation("https://down.test/");
            let workflow = Workflow::new("down").navigate("https://down.test/");
            let report = WorkflowRunner::default().run(&workflow, &mut session).await;
            assert_eq!(report.steps[0].failure, Some(FailureKind::ActionFailed));
        }

        #[tokio::test(start_paused = true)]
        async fn test_payload_is_rendered_but_not_reported() {
            let mut session =
                MockSession::new().with_element(MockElement::new(Selector::test_id("txtFieldPassword")));
            let workflow = Workflow::new("pw")
                .type_text(SelectorSpec::test_id("txtFieldPassword"), "${env:APP_PASSWORD}");
            let runner = WorkflowRunner::new(RunConfig::new().with_env("APP_PASSWORD", "s3cret-pw"));
            let report = runner.run(&workflow, &mut session).await;
            assert!(report.is_success());
            assert_eq!(
                session.value_of(&Selector::test_id("txtFieldPassword")).as_deref(),
                Some("s3cret-pw")
            );
            assert!(!report.to_json().unwrap().contains("s3cret-pw"));
            assert!(!report.summary().contains("s3cret-pw"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_unresolved_placeholder_fails_step() {
            let mut session = MockSession::new().with_element(MockElement::new(Selector::css("#u")));
            let workflow = Workflow::new("env").type_text(
                SelectorSpec::css("#u"),
                "${env:STEPWRIGHT_DEFINITELY_UNSET_VAR}",
            );
            let report = WorkflowRunner::default().run(&workflow, &mut session).await;
            assert_eq!(report.steps[0].failure, Some(FailureKind::ActionFailed));
            assert!(report.steps[0]
                .diagnostic
                .contains("${env:STEPWRIGHT_DEFINITELY_UNSET_VAR}"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_fixtures_are_bound_and_typed() {
            let mut session =
                MockSession::new().with_element(MockElement::new(Selector::test_id("txtFieldPatientCPF")));
            let workflow = Workflow::new("cpf")
                .fixture("cpf", FixtureRule::Cpf { formatted: true })
                .type_text(SelectorSpec::test_id("txtFieldPatientCPF"), "${cpf}");
            let report = WorkflowRunner::new(RunConfig::new().with_seed(5))
                .run(&workflow, &mut session)
                .await;
            assert!(report.is_success());
            let bound = report.fixtures["cpf"].as_text().unwrap().to_string();
            assert_eq!(
                session.value_of(&Selector::test_id("txtFieldPatientCPF")),
                Some(bound)
            );
            assert_eq!(report.seed, 5);
        }

        #[tokio::test(start_paused = true)]
        async fn test_forced_step_is_recorded() {
            let mut session =
                MockSession::new().with_element(MockElement::new(Selector::css(".v-overlay__scrim")).hidden());
            let workflow = Workflow::new("force").force_click(SelectorSpec::css(".v-overlay__scrim"));
            let report = WorkflowRunner::default().run(&workflow, &mut session).await;
            assert!(report.is_success());
            assert!(report.steps[0].forced);
        }

        #[tokio::test(start_paused = true)]
        async fn test_click_reveal_then_wait() {
            let mut session = MockSession::new().with_element(
                MockElement::new(Selector::test_id("buttonSave")).on_click(MockEffect::Reveal(
                    MockElement::new(Selector::css(".swal2-header"))
                        .text("Sucesso")
                        .appears_after(Duration::from_millis(800)),
                )),
            );
            let workflow = Workflow::new("save")
                .click(SelectorSpec::test_id("buttonSave"))
                .assert(
                    Condition::new(
                        Selector::css(".swal2-header"),
                        Expectation::ContainsText("Sucesso".into()),
                    ),
                    AssertMode::Eventually { timeout_ms: 2000 },
                );
            let report = WorkflowRunner::default().run(&workflow, &mut session).await;
            assert!(report.is_success(), "{}", report.summary());
        }
    }

    mod run_all_tests {
        use super::*;

        fn login_page() -> MockPage {
            MockPage::new().with(MockElement::new(Selector::test_id("acceptCookies")))
        }

        #[tokio::test(start_paused = true)]
        async fn test_reports_in_input_order() {
            let workflows = vec![
                Workflow::new("first")
                    .navigate("https://app.test/login")
                    .click(SelectorSpec::test_id("acceptCookies")),
                Workflow::new("second")
                    .navigate("https://app.test/login")
                    .click(SelectorSpec::test_id("missing").with_timeout(0)),
            ];
            let suite = run_all(
                &workflows,
                &RunConfig::default(),
                &PartialRunConfig::default(),
                2,
                |_| async { Ok(MockSession::new().with_page("https://app.test/login", login_page())) },
            )
            .await;
            assert_eq!(suite.runs.len(), 2);
            assert_eq!(suite.runs[0].workflow, "first");
            assert_eq!(suite.runs[0].verdict, RunVerdict::Pass);
            assert_eq!(suite.runs[1].verdict, RunVerdict::Fail);
            assert_ne!(suite.runs[0].run_id, suite.runs[1].run_id);
        }

        #[tokio::test(start_paused = true)]
        async fn test_session_open_failure_is_reported() {
            let workflows = vec![Workflow::new("w").navigate("/")];
            let suite = run_all(
                &workflows,
                &RunConfig::default(),
                &PartialRunConfig::default(),
                1,
                |_| async {
                    Err::<MockSession, _>(crate::result::FlowError::BrowserLaunch {
                        message: "no chromium".into(),
                    })
                },
            )
            .await;
            assert_eq!(suite.aborted(), 1);
            assert!(suite.runs[0].error.as_deref().unwrap().contains("no chromium"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_overrides_beat_file_config() {
            let workflows = vec![Workflow::new("w")
                .with_config(PartialRunConfig {
                    seed: Some(1),
                    ..PartialRunConfig::default()
                })
                .navigate("/")];
            let overrides = PartialRunConfig {
                seed: Some(2),
                ..PartialRunConfig::default()
            };
            let suite = run_all(&workflows, &RunConfig::default(), &overrides, 1, |_| async {
                Ok(MockSession::new())
            })
            .await;
            assert_eq!(suite.runs[0].seed, 2);
        }
    }
}
