//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stepwright library error
    #[error("{0}")]
    Flow(#[from] stepwright::FlowError),

    /// Report serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// At least one workflow did not pass
    #[error("{failed} of {total} workflow(s) did not pass")]
    RunFailed {
        /// Runs that failed or aborted
        failed: usize,
        /// Runs attempted
        total: usize,
    },
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Process exit code: 1 when a workflow did not pass, 2 for everything
    /// that stopped the command from running
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::RunFailed { .. } => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod constructor_tests {
        use super::*;

        #[test]
        fn test_config_error() {
            let err = CliError::config("chromium not found");
            assert!(err.to_string().contains("chromium not found"));
            assert!(matches!(err, CliError::Config { .. }));
        }

        #[test]
        fn test_invalid_argument_error() {
            let err = CliError::invalid_argument("--jobs must be positive");
            assert!(err.to_string().starts_with("Invalid argument"));
        }
    }

    mod conversion_tests {
        use super::*;

        #[test]
        fn test_from_io_error() {
            let io = std::io::Error::new(std::io::ErrorKind::NotFound, "login.yaml");
            let err: CliError = io.into();
            assert!(matches!(err, CliError::Io(_)));
        }

        #[test]
        fn test_from_flow_error_keeps_message() {
            let flow = stepwright::FlowError::invalid_workflow("login", "workflow has no steps");
            let err: CliError = flow.into();
            assert!(err.to_string().contains("no steps"));
        }
    }

    mod exit_code_tests {
        use super::*;

        #[test]
        fn test_run_failed_is_one() {
            let err = CliError::RunFailed { failed: 1, total: 3 };
            assert_eq!(err.exit_code(), 1);
            assert_eq!(err.to_string(), "1 of 3 workflow(s) did not pass");
        }

        #[test]
        fn test_usage_errors_are_two() {
            assert_eq!(CliError::config("x").exit_code(), 2);
        }
    }
}
