//! Run and browser configuration.

use crate::locator::TEST_ID_ATTRIBUTE;
use crate::result::{FlowError, FlowResult};
use crate::wait::DEFAULT_POLL_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default per-step timeout (5s)
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5_000;

/// Default whole-run timeout (60s)
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 60_000;

/// What happens after a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip the remaining steps and abort the run
    #[default]
    StopOnFailure,
    /// Run every step once; the run fails if any step failed
    ContinueOnFailure,
}

/// Settings for one workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Budget for each step that does not set its own
    pub per_step_timeout_ms: u64,
    /// Budget for the whole run
    pub whole_run_timeout_ms: u64,
    /// Reaction to a failed step
    pub failure_policy: FailurePolicy,
    /// Delay between two polls of a wait
    pub poll_interval_ms: u64,
    /// Prefix for relative `navigate` targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Fixture seed; a fresh entropy seed is drawn when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Values for `${env:VAR}` that override the process environment
    #[serde(skip_serializing)]
    pub env: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            per_step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            whole_run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            failure_policy: FailurePolicy::StopOnFailure,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            base_url: None,
            seed: None,
            env: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-step timeout
    #[must_use]
    pub const fn with_step_timeout(mut self, ms: u64) -> Self {
        self.per_step_timeout_ms = ms;
        self
    }

    /// Set the whole-run timeout
    #[must_use]
    pub const fn with_run_timeout(mut self, ms: u64) -> Self {
        self.whole_run_timeout_ms = ms;
        self
    }

    /// Set the failure policy
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the fixture seed
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Provide a value for `${env:key}`
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Look up `${env:key}`: explicit values first, then the process
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<String> {
        self.env
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// Overlay the fields `other` sets explicitly onto `self`.
    ///
    /// Used for defaults < workflow file < command line.
    #[must_use]
    pub fn merged_with(mut self, other: &PartialRunConfig) -> Self {
        if let Some(ms) = other.per_step_timeout_ms {
            self.per_step_timeout_ms = ms;
        }
        if let Some(ms) = other.whole_run_timeout_ms {
            self.whole_run_timeout_ms = ms;
        }
        if let Some(policy) = other.failure_policy {
            self.failure_policy = policy;
        }
        if let Some(ms) = other.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if other.base_url.is_some() {
            self.base_url.clone_from(&other.base_url);
        }
        if other.seed.is_some() {
            self.seed = other.seed;
        }
        self
    }

    /// Check for inconsistent settings
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the poll interval is zero, or a step budget
    /// exceeds the run budget
    pub fn validate(&self) -> FlowResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(FlowError::invalid_config("poll_interval_ms must be positive"));
        }
        if self.whole_run_timeout_ms == 0 {
            return Err(FlowError::invalid_config("whole_run_timeout_ms must be positive"));
        }
        if self.per_step_timeout_ms > self.whole_run_timeout_ms {
            return Err(FlowError::invalid_config(format!(
                "per_step_timeout_ms ({}) exceeds whole_run_timeout_ms ({})",
                self.per_step_timeout_ms, self.whole_run_timeout_ms
            )));
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(FlowError::invalid_config(format!(
                    "base_url must be http(s): {url}"
                )));
            }
        }
        Ok(())
    }
}

/// Run settings where every field is optional, as written in a workflow
/// file's `config:` block or taken from command-line flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    /// Per-step timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_step_timeout_ms: Option<u64>,
    /// Whole-run timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whole_run_timeout_ms: Option<u64>,
    /// Failure policy override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
    /// Poll interval override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    /// Base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Seed override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Browser launch options for the CDP session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run without a window
    pub headless: bool,
    /// Keep the Chromium sandbox (disable inside containers)
    pub sandbox: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Explicit Chromium executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chromium_path: Option<String>,
    /// Attribute behind `test_id` selectors
    pub test_id_attribute: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            viewport_width: 1280,
            viewport_height: 800,
            chromium_path: None,
            test_id_attribute: TEST_ID_ATTRIBUTE.to_string(),
        }
    }
}

impl BrowserConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Enable or disable the sandbox
    #[must_use]
    pub const fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Set viewport size
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set the Chromium executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Set the attribute behind `test_id` selectors
    #[must_use]
    pub fn with_test_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.test_id_attribute = attribute.into();
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod run_config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = RunConfig::default();
            assert_eq!(config.per_step_timeout_ms, 5_000);
            assert_eq!(config.whole_run_timeout_ms, 60_000);
            assert_eq!(config.poll_interval_ms, 100);
            assert_eq!(config.failure_policy, FailurePolicy::StopOnFailure);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_builder() {
            let config = RunConfig::new()
                .with_step_timeout(2_000)
                .with_run_timeout(10_000)
                .with_failure_policy(FailurePolicy::ContinueOnFailure)
                .with_base_url("https://app.test")
                .with_seed(42);
            assert_eq!(config.per_step_timeout_ms, 2_000);
            assert_eq!(config.base_url.as_deref(), Some("https://app.test"));
            assert_eq!(config.seed, Some(42));
        }

        #[test]
        fn test_validate_rejects_inconsistent_budgets() {
            assert!(RunConfig::new().with_poll_interval(0).validate().is_err());
            assert!(RunConfig::new()
                .with_step_timeout(90_000)
                .validate()
                .is_err());
            assert!(RunConfig::new().with_base_url("app.test").validate().is_err());
        }

        #[test]
        fn test_env_value_prefers_explicit() {
            let config = RunConfig::new().with_env("STEPWRIGHT_TEST_ONLY_VAR", "explicit");
            assert_eq!(
                config.env_value("STEPWRIGHT_TEST_ONLY_VAR").as_deref(),
                Some("explicit")
            );
            assert!(config.env_value("STEPWRIGHT_SURELY_UNSET_VAR").is_none());
        }

        #[test]
        fn test_env_is_never_serialized() {
            let config = RunConfig::new().with_env("APP_PASSWORD", "s3cret");
            let json = serde_json::to_string(&config).unwrap();
            assert!(!json.contains("s3cret"));
        }
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn test_partial_overrides_only_set_fields() {
            let file: PartialRunConfig =
                serde_yaml_ng::from_str("per_step_timeout_ms: 8000\nfailure_policy: continue_on_failure\n")
                    .unwrap();
            let cli = PartialRunConfig {
                per_step_timeout_ms: Some(3000),
                ..PartialRunConfig::default()
            };
            let config = RunConfig::default().merged_with(&file).merged_with(&cli);
            assert_eq!(config.per_step_timeout_ms, 3000);
            assert_eq!(config.failure_policy, FailurePolicy::ContinueOnFailure);
            assert_eq!(config.whole_run_timeout_ms, DEFAULT_RUN_TIMEOUT_MS);
        }

        #[test]
        fn test_unknown_keys_rejected() {
            let parsed: Result<PartialRunConfig, _> = serde_yaml_ng::from_str("step_timeout: 1\n");
            assert!(parsed.is_err());
        }
    }

    mod browser_config_tests {
        use super::*;

        #[test]
        fn test_browser_defaults() {
            let config = BrowserConfig::default();
            assert!(config.headless);
            assert!(config.sandbox);
            assert_eq!(config.test_id_attribute, "data-cy");
        }

        #[test]
        fn test_browser_builder() {
            let config = BrowserConfig::default()
                .with_headless(false)
                .with_sandbox(false)
                .with_viewport(1920, 1080)
                .with_chromium_path("/usr/bin/chromium");
            assert!(!config.headless);
            assert_eq!(config.viewport_width, 1920);
            assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));
        }
    }
}
