//! Command implementations for the aq-stats CLI
//!
//! Each subcommand loads the input table, runs one engine and prints the
//! result. Logging is installed once from the shared input options before
//! dispatch.

pub mod bounds;
pub mod correlation;
pub mod descriptive;
pub mod shared;
pub mod trend;

use crate::Result;
use crate::cli::args::Commands;

/// Main command runner
pub fn run(command: &Commands) -> Result<()> {
    shared::setup_logging(command.input())?;

    match command {
        Commands::Descriptive(args) => descriptive::run_descriptive(args),
        Commands::Correlation(args) => correlation::run_correlation(args),
        Commands::Trend(args) => trend::run_trend(args),
        Commands::Bounds(args) => bounds::run_bounds(args),
    }
}
