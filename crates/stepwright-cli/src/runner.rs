//! Command implementations

use crate::commands::{FixtureArgs, FixtureSubcommand, RunArgs, ValidateArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{write_report, OutputFormat, ProgressReporter};
use std::path::PathBuf;
use stepwright::{fixture, BrowserConfig, FailurePolicy, PartialRunConfig, RunConfig, SuiteReport, Workflow};
use tracing::{debug, info};

/// Runs the `run`, `validate` and `fixture` subcommands
#[derive(Debug)]
pub struct CommandRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl CommandRunner {
    /// Create a runner for the given CLI settings
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// CLI settings
    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Load, run and report every workflow in `args.files`
    ///
    /// Returns the suite when every run passed, `RunFailed` otherwise.
    pub async fn run(&mut self, args: &RunArgs) -> CliResult<SuiteReport> {
        if args.jobs == 0 {
            return Err(CliError::invalid_argument("--jobs must be at least 1"));
        }
        let workflows = load_workflows(&args.files)?;
        let overrides = overrides_from(args);
        RunConfig::default().merged_with(&overrides).validate()?;

        self.reporter
            .start_spinner(&format!("running {} workflow(s)", workflows.len()));
        info!(count = workflows.len(), jobs = args.jobs, "starting suite");
        let suite = run_suite(&workflows, &overrides, args.jobs, browser_config_from(args)).await;
        self.reporter.finish();
        let suite = suite?;

        for report in &suite.runs {
            self.reporter.run_result(report);
        }
        write_report(OutputFormat::from(args.format), &suite, args.output.as_deref())?;
        if let Some(path) = &args.output {
            self.reporter.info(&format!("report written to {}", path.display()));
        }
        self.reporter.summary(&suite);

        if suite.is_success() {
            Ok(suite)
        } else {
            Err(CliError::RunFailed {
                failed: suite.failed() + suite.aborted(),
                total: suite.runs.len(),
            })
        }
    }

    /// Parse and check each file, reporting every problem before failing
    pub fn validate(&self, args: &ValidateArgs) -> CliResult<()> {
        let mut invalid = 0;
        for path in &args.files {
            match Workflow::load(path) {
                Ok(workflow) => self.reporter.success(&format!(
                    "{} ({}, {} steps)",
                    path.display(),
                    workflow.name,
                    workflow.steps.len()
                )),
                Err(e) => {
                    invalid += 1;
                    self.reporter.failure(&format!("{}: {e}", path.display()));
                }
            }
        }
        if invalid > 0 {
            return Err(CliError::config(format!(
                "{invalid} of {} workflow file(s) invalid",
                args.files.len()
            )));
        }
        Ok(())
    }

    /// Print generated fixture values, or check a CPF
    pub fn fixture(&self, args: &FixtureArgs) -> CliResult<Vec<String>> {
        if let Some(FixtureSubcommand::ValidateCpf { cpf }) = &args.command {
            if !fixture::validate_cpf(cpf) {
                return Err(CliError::invalid_argument(format!("{cpf} is not a valid CPF")));
            }
            let formatted = fixture::format_cpf(cpf).unwrap_or_else(|| cpf.clone());
            println!("{formatted} is valid");
            return Ok(vec![formatted]);
        }

        let Some(rule_arg) = args.rule else {
            return Err(CliError::invalid_argument(
                "name a rule (cpf, full-name, email, number, birth-date, patient) or use validate-cpf",
            ));
        };
        let rule = rule_arg.to_rule(args);
        rule.check().map_err(CliError::invalid_argument)?;

        if let Some(seed) = args.seed {
            fixture::reseed(seed);
        }
        let values: Vec<String> = (0..args.count)
            .map(|_| fixture::generate(&rule).to_string())
            .collect();
        for value in &values {
            println!("{value}");
        }
        Ok(values)
    }
}

/// Load every file, failing on the first invalid one
pub fn load_workflows(files: &[PathBuf]) -> CliResult<Vec<Workflow>> {
    files
        .iter()
        .map(|path| {
            debug!(path = %path.display(), "loading workflow");
            Workflow::load(path).map_err(CliError::from)
        })
        .collect()
}

/// Run settings named on the command line
#[must_use]
pub fn overrides_from(args: &RunArgs) -> PartialRunConfig {
    PartialRunConfig {
        per_step_timeout_ms: args.step_timeout,
        whole_run_timeout_ms: args.run_timeout,
        failure_policy: args
            .continue_on_failure
            .then_some(FailurePolicy::ContinueOnFailure),
        poll_interval_ms: None,
        base_url: args.base_url.clone(),
        seed: args.seed,
    }
}

/// Browser launch options from the command line
#[must_use]
pub fn browser_config_from(args: &RunArgs) -> BrowserConfig {
    let mut config = BrowserConfig::default()
        .with_headless(!args.headed)
        .with_sandbox(!args.no_sandbox)
        .with_test_id_attribute(args.test_id_attribute.clone());
    if let Some(path) = &args.chromium {
        config = config.with_chromium_path(path.display().to_string());
    }
    config
}

#[cfg(feature = "browser")]
async fn run_suite(
    workflows: &[Workflow],
    overrides: &PartialRunConfig,
    jobs: usize,
    browser_config: BrowserConfig,
) -> CliResult<SuiteReport> {
    let browser = stepwright::cdp::Browser::launch(browser_config).await?;
    let base = RunConfig::default();
    let suite = stepwright::run_all(workflows, &base, overrides, jobs, |_| browser.new_session()).await;
    if let Err(e) = browser.close().await {
        tracing::warn!("browser did not close cleanly: {e}");
    }
    Ok(suite)
}

#[cfg(not(feature = "browser"))]
#[allow(clippy::unused_async)]
async fn run_suite(
    _workflows: &[Workflow],
    _overrides: &PartialRunConfig,
    _jobs: usize,
    _browser_config: BrowserConfig,
) -> CliResult<SuiteReport> {
    Err(CliError::config(
        "browser support not enabled. Rebuild with --features browser",
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["stepwright", "run", "login.yaml"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("expected run, got {other:?}"),
        }
    }

    fn fixture_args(argv: &[&str]) -> FixtureArgs {
        let mut full = vec!["stepwright", "fixture"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Fixture(args) => args,
            other => panic!("expected fixture, got {other:?}"),
        }
    }

    fn quiet_runner() -> CommandRunner {
        CommandRunner::new(CliConfig::new().with_verbosity(crate::config::Verbosity::Quiet))
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_unset_flags_leave_file_values() {
            let overrides = overrides_from(&run_args(&[]));
            assert_eq!(overrides, PartialRunConfig::default());
        }

        #[test]
        fn test_flags_become_overrides() {
            let overrides = overrides_from(&run_args(&[
                "--step-timeout",
                "1500",
                "--continue-on-failure",
                "--seed",
                "9",
                "--base-url",
                "https://staging.test",
            ]));
            assert_eq!(overrides.per_step_timeout_ms, Some(1500));
            assert_eq!(overrides.failure_policy, Some(FailurePolicy::ContinueOnFailure));
            assert_eq!(overrides.seed, Some(9));
            assert_eq!(overrides.base_url.as_deref(), Some("https://staging.test"));
        }

        #[test]
        fn test_browser_flags() {
            let config = browser_config_from(&run_args(&["--headed", "--no-sandbox"]));
            assert!(!config.headless);
            assert!(!config.sandbox);
            let config = browser_config_from(&run_args(&[]));
            assert!(config.headless);
            assert!(config.sandbox);
        }
    }

    mod run_tests {
        use super::*;

        #[tokio::test]
        async fn test_zero_jobs_rejected() {
            let err = quiet_runner().run(&run_args(&["-j", "0"])).await.unwrap_err();
            assert!(matches!(err, CliError::InvalidArgument { .. }));
        }

        #[tokio::test]
        async fn test_missing_file_is_io_error() {
            let err = quiet_runner().run(&run_args(&[])).await.unwrap_err();
            assert_eq!(err.exit_code(), 2);
        }

        #[tokio::test]
        async fn test_inconsistent_timeouts_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("w.yaml");
            std::fs::write(&path, "name: w\nsteps:\n  - navigate: https://app.test/\n").unwrap();
            let mut args = run_args(&["--step-timeout", "9000", "--run-timeout", "1000"]);
            args.files = vec![path];
            let err = quiet_runner().run(&args).await.unwrap_err();
            assert!(err.to_string().contains("exceeds"));
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn test_reports_every_invalid_file() {
            let dir = tempfile::tempdir().unwrap();
            let good = dir.path().join("good.yaml");
            let bad = dir.path().join("bad.yaml");
            std::fs::write(&good, "name: ok\nsteps:\n  - navigate: /login\n").unwrap();
            std::fs::write(&bad, "name: empty\nsteps: []\n").unwrap();
            let args = ValidateArgs {
                files: vec![good.clone(), bad, dir.path().join("missing.yaml")],
            };
            let err = quiet_runner().validate(&args).unwrap_err();
            assert!(err.to_string().contains("2 of 3"));
            assert!(quiet_runner().validate(&ValidateArgs { files: vec![good] }).is_ok());
        }
    }

    mod fixture_tests {
        use super::*;

        #[test]
        fn test_seeded_values_repeat() {
            let runner = quiet_runner();
            let first = runner.fixture(&fixture_args(&["cpf", "--seed", "7", "-n", "3"])).unwrap();
            let second = runner.fixture(&fixture_args(&["cpf", "--seed", "7", "-n", "3"])).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.len(), 3);
            assert!(first.iter().all(|cpf| fixture::validate_cpf(cpf)));
        }

        #[test]
        fn test_bad_range_rejected() {
            let err = quiet_runner()
                .fixture(&fixture_args(&["number", "--min", "10", "--max", "1"]))
                .unwrap_err();
            assert!(matches!(err, CliError::InvalidArgument { .. }));
        }

        #[test]
        fn test_rule_required() {
            assert!(quiet_runner().fixture(&fixture_args(&[])).is_err());
        }

        #[test]
        fn test_validate_cpf() {
            let runner = quiet_runner();
            let ok = runner
                .fixture(&fixture_args(&["validate-cpf", "52998224725"]))
                .unwrap();
            assert_eq!(ok, vec!["529.982.247-25".to_string()]);
            assert!(runner
                .fixture(&fixture_args(&["validate-cpf", "529.982.247-24"]))
                .is_err());
        }
    }
}
