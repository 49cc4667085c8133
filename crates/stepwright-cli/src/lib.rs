//! Stepwright CLI library
//!
//! Command-line front end for the stepwright workflow executor.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, FixtureArgs, FixtureSubcommand, FormatArg, RuleArg, RunArgs,
    ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{write_report, OutputFormat, ProgressReporter};
pub use runner::{browser_config_from, load_workflows, overrides_from, CommandRunner};
