//! Stepwright CLI: run declarative browser workflows
//!
//! ## Usage
//!
//! ```bash
//! stepwright run workflows/login.yaml --base-url https://app.example
//! stepwright run workflows/*.yaml -j 4 --format json -o report.json
//! stepwright validate workflows/*.yaml
//! stepwright fixture cpf --formatted -n 5 --seed 42
//! stepwright fixture validate-cpf 529.982.247-25
//! ```
//!
//! Exit status is 0 when every workflow passed, 1 when one did not, and 2
//! when the command could not run.

use clap::Parser;
use std::process::ExitCode;
use stepwright_cli::{logging, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, CommandRunner, Verbosity};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init(config.verbosity, config.color.should_color());

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli, config: CliConfig) -> CliResult<()> {
    let mut runner = CommandRunner::new(config);
    match cli.command {
        Commands::Run(args) => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(CliError::Io)?;
            rt.block_on(runner.run(&args)).map(|_| ())
        }
        Commands::Validate(args) => runner.validate(&args),
        Commands::Fixture(args) => runner.fixture(&args).map(|_| ()),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
}
