use air_quality_stats::cli::{args::Args, commands};
use anyhow::Context;
use clap::Parser;
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    let Some(command) = args.get_command() else {
        show_help_and_commands();
        process::exit(0);
    };

    let result = commands::run(command).with_context(|| {
        format!(
            "Failed to analyse {}",
            command.input().input_path.display()
        )
    });

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("aq-stats - Air Quality Time Series Statistics");
    println!("=============================================");
    println!();
    println!("Quality-controlled statistics over long-format air quality data");
    println!("(datetime, site_id, pollutant, conc, flag) from CSV or Parquet.");
    println!();
    println!("USAGE:");
    println!("    aq-stats <COMMAND> --input <FILE> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    descriptive    Grouped descriptive statistics");
    println!("    correlation    Pairwise correlation between pollutants");
    println!("    trend          Linear trend per pollutant");
    println!("    bounds         Time span covered by the input");
    println!();
    println!("EXAMPLES:");
    println!("    aq-stats descriptive -i obs.csv --group-by site_id --category pollutant");
    println!("    aq-stats correlation -i obs.parquet --unit conc=ug/m3 --method spearman");
    println!("    aq-stats trend -i obs.csv --unit conc=ppb --time-unit calendar_year --json");
    println!();
    println!("For detailed help on any command, use:");
    println!("    aq-stats <COMMAND> --help");
}
