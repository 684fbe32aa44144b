//! Pairwise correlation command

use super::shared::{load_dataset, print_json, print_metadata, print_table};
use crate::Result;
use crate::analysis::compute_pairwise;
use crate::cli::args::CorrelationArgs;

pub fn run_correlation(args: &CorrelationArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    let output = compute_pairwise(&dataset, &args.to_config())?;

    if args.output.json {
        print_json(&output.records)?;
    } else {
        print_table(&format!("{} correlation", output.method), &output.table);
    }
    if args.output.show_metadata {
        print_metadata(&output.metadata);
    }
    Ok(())
}
