//! Linear trend command

use super::shared::{load_dataset, print_json, print_metadata, print_table};
use crate::Result;
use crate::analysis::compute_linear_trend;
use crate::cli::args::TrendArgs;
use colored::*;

pub fn run_trend(args: &TrendArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    let output = compute_linear_trend(&dataset, &args.to_config())?;

    if args.output.json {
        print_json(&output.records)?;
    } else {
        print_table(&format!("Linear trend per {}", output.time_unit), &output.table);
        let short = output.records.iter().filter(|r| r.short_duration_flag).count();
        if short > 0 {
            println!(
                "{}",
                format!(
                    "{} of {} trends span less than {} years",
                    short,
                    output.records.len(),
                    args.min_duration_years
                )
                .yellow()
            );
        }
    }
    if args.output.show_metadata {
        print_metadata(&output.metadata);
    }
    Ok(())
}
