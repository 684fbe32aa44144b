//! Descriptive statistics command

use super::shared::{load_dataset, print_json, print_metadata, print_table};
use crate::Result;
use crate::analysis::compute_descriptives;
use crate::cli::args::DescriptiveArgs;
use tracing::info;

pub fn run_descriptive(args: &DescriptiveArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    let config = args.to_config();

    let mut output = compute_descriptives(&dataset, &config)?;
    if args.round {
        let policy = args.reporting_config().rounding_policy();
        output = output.round_for_reporting(&policy, dataset.column_units(), config.output_format)?;
        info!("Rounded statistics to reporting precision");
    }

    if args.output.json {
        print_json(&output.records())?;
    } else {
        print_table("Descriptive statistics", &output.table);
    }
    if args.output.show_metadata {
        print_metadata(&output.metadata);
    }
    Ok(())
}
