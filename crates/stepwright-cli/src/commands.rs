//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Stepwright: run declarative browser workflows
#[derive(Parser, Debug)]
#[command(name = "stepwright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run workflow files against a browser
    Run(RunArgs),

    /// Parse and check workflow files without running them
    Validate(ValidateArgs),

    /// Generate fixture values
    Fixture(FixtureArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Workflow files (YAML)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Prefix for relative navigate targets
    #[arg(long, env = "STEPWRIGHT_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-step timeout in milliseconds
    #[arg(long)]
    pub step_timeout: Option<u64>,

    /// Whole-run timeout in milliseconds
    #[arg(long)]
    pub run_timeout: Option<u64>,

    /// Keep running steps after a failure
    #[arg(long)]
    pub continue_on_failure: bool,

    /// Fixture seed for reproducible data
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of workflows run at once
    #[arg(short = 'j', long, default_value = "1")]
    pub jobs: usize,

    /// Report format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the Chromium sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Path to the Chromium executable
    #[arg(long, env = "STEPWRIGHT_CHROMIUM")]
    pub chromium: Option<PathBuf>,

    /// Attribute used by test-id selectors
    #[arg(long, default_value = stepwright::TEST_ID_ATTRIBUTE)]
    pub test_id_attribute: String,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Workflow files (YAML)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the fixture command
#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct FixtureArgs {
    /// Fixture subcommand
    #[command(subcommand)]
    pub command: Option<FixtureSubcommand>,

    /// Rule to generate
    #[arg(value_enum)]
    pub rule: Option<RuleArg>,

    /// Number of values
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,

    /// Seed for reproducible values
    #[arg(long)]
    pub seed: Option<u64>,

    /// Format CPFs as XXX.XXX.XXX-XX
    #[arg(long)]
    pub formatted: bool,

    /// Lower bound for `number`
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub min: i64,

    /// Upper bound for `number`
    #[arg(long, default_value = "100", allow_hyphen_values = true)]
    pub max: i64,
}

/// Fixture subcommands
#[derive(Subcommand, Debug)]
pub enum FixtureSubcommand {
    /// Check a CPF's check digits
    ValidateCpf {
        /// CPF, with or without punctuation
        cpf: String,
    },
}

/// Fixture rule names on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleArg {
    /// Checksum-valid CPF
    Cpf,
    /// First and last name
    FullName,
    /// Email address
    Email,
    /// Integer in --min..=--max
    Number,
    /// DDMMYYYY birth date
    BirthDate,
    /// Name, CPF and birth date record
    Patient,
}

impl RuleArg {
    /// Build the library rule from this name and the shared flags
    #[must_use]
    pub fn to_rule(self, args: &FixtureArgs) -> stepwright::FixtureRule {
        use stepwright::FixtureRule;
        match self {
            Self::Cpf => FixtureRule::Cpf {
                formatted: args.formatted,
            },
            Self::FullName => FixtureRule::FullName,
            Self::Email => FixtureRule::Email,
            Self::Number => FixtureRule::Number {
                min: args.min,
                max: args.max,
            },
            Self::BirthDate => FixtureRule::BirthDate {
                min_year: stepwright::fixture::DEFAULT_MIN_BIRTH_YEAR,
                max_year: stepwright::fixture::DEFAULT_MAX_BIRTH_YEAR,
            },
            Self::Patient => FixtureRule::Patient,
        }
    }
}

/// Report format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable summary
    #[default]
    Text,
    /// Full JSON report
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Detect terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
