//! Time bounds command

use super::shared::{load_dataset, print_bounds};
use crate::Result;
use crate::cli::args::BoundsArgs;

pub fn run_bounds(args: &BoundsArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    print_bounds(&dataset, args.time_unit)
}
