//! Shared utilities for command implementations
//!
//! Logging setup, input loading and result printing used by every
//! subcommand.

use crate::cli::args::InputArgs;
use crate::dataset::TimeSeriesDataset;
use crate::error::{Result, StatsError};
use crate::models::ResultMetadata;
use crate::time::TimeUnit;
use colored::*;
use polars::prelude::{DataFrame, LazyCsvReader, LazyFileListReader, LazyFrame, ScanArgsParquet};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Set up structured logging for any command
pub fn setup_logging(args: &InputArgs) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("air_quality_stats={}", log_level)));

    if args.quiet {
        // Minimal logging for quiet mode
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        // Standard logging with timestamps
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Read a CSV or Parquet file into memory, chosen by extension
///
/// CSV timestamps are parsed when polars recognises their format.
pub fn load_frame(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(StatsError::configuration(format!(
            "Input file does not exist: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let lazy_frame = match extension.as_deref() {
        Some("csv") => LazyCsvReader::new(path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()?,
        Some("parquet") | Some("pq") => LazyFrame::scan_parquet(path, ScanArgsParquet::default())?,
        _ => {
            return Err(StatsError::configuration(format!(
                "Unsupported input format for {}: expected .csv or .parquet",
                path.display()
            )));
        }
    };

    let frame = lazy_frame.collect()?;
    info!(
        "Loaded {} rows x {} columns from {}",
        frame.height(),
        frame.width(),
        path.display()
    );
    Ok(frame)
}

/// Load the input table and attach command-line unit metadata
pub fn load_dataset(args: &InputArgs) -> Result<TimeSeriesDataset> {
    let frame = load_frame(&args.input_path)?;
    TimeSeriesDataset::new(frame, args.time_column.clone())?
        .with_column_units(args.unit_mapping())
        .map(|dataset| dataset.with_metadata("source", args.input_path.display().to_string()))
}

pub fn print_table(title: &str, frame: &DataFrame) {
    println!("{}", title.bright_green().bold());
    println!("{}", frame);
}

pub fn print_json<T: Serialize + ?Sized>(records: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

/// Human-readable summary of result metadata
pub fn format_metadata(metadata: &ResultMetadata) -> Vec<String> {
    let mut lines = vec![
        format!("Input rows: {}", metadata.n_input_rows),
        format!("Groups: {}", metadata.n_groups),
    ];
    match &metadata.time_bounds {
        Some(bounds) => lines.push(format!(
            "Time span: {} to {}",
            bounds.start.to_rfc3339(),
            bounds.end.to_rfc3339()
        )),
        None => lines.push("Time span: (no timestamps)".to_string()),
    }

    let status = &metadata.units_status;
    let mut units = format!("Units: {}", status.status.as_str());
    if !status.missing_units.is_empty() {
        units.push_str(&format!(", missing for {}", status.missing_units.join(", ")));
    }
    if !status.mixed_families.is_empty() {
        let families: Vec<&str> = status.mixed_families.iter().map(|f| f.as_str()).collect();
        units.push_str(&format!(", mixed families {}", families.join(" + ")));
    }
    lines.push(units);
    lines
}

pub fn print_metadata(metadata: &ResultMetadata) {
    println!();
    println!("{}", "Metadata".bright_cyan().bold());
    for line in format_metadata(metadata) {
        println!("  {}", line);
    }
}

/// Print the span of the time index in `unit`
pub fn print_bounds(dataset: &TimeSeriesDataset, unit: TimeUnit) -> Result<()> {
    println!("{}", "Time bounds".bright_green().bold());
    println!("  Rows: {}", dataset.n_rows());
    match dataset.time_bounds()? {
        Some(bounds) => {
            println!("  Start: {}", bounds.start.to_rfc3339().bright_white());
            println!("  End:   {}", bounds.end.to_rfc3339().bright_white());
            println!("  Duration: {:.4} {}", bounds.duration(unit)?, unit);
        }
        None => println!("  {}", "No non-null timestamps".yellow()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitsStatus;
    use crate::units::UnitFamily;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_frame_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("obs.csv");
        fs::write(
            &path,
            "datetime,site_id,pollutant,conc,flag\n\
             2024-01-01 00:00:00,S1,NO2,12.5,valid\n\
             2024-01-01 01:00:00,S1,NO2,,below_dl\n",
        )
        .unwrap();

        let frame = load_frame(&path).unwrap();
        assert_eq!(frame.shape(), (2, 5));
        assert!(matches!(
            frame.column("datetime").unwrap().dtype(),
            polars::prelude::DataType::Datetime(_, _)
        ));
    }

    #[test]
    fn test_load_frame_rejects_missing_and_unknown() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            load_frame(&temp_dir.path().join("absent.csv")).unwrap_err(),
            StatsError::Configuration { .. }
        ));

        let path = temp_dir.path().join("obs.xlsx");
        fs::write(&path, "not a table").unwrap();
        assert!(matches!(
            load_frame(&path).unwrap_err(),
            StatsError::Configuration { .. }
        ));
    }

    #[test]
    fn test_format_metadata() {
        let metadata = ResultMetadata {
            time_bounds: None,
            units_status: UnitsStatus::overridden(
                vec!["conc".to_string()],
                vec![UnitFamily::MassConcentration, UnitFamily::VolumeConcentration],
            ),
            n_input_rows: 10,
            n_groups: 2,
        };
        let lines = format_metadata(&metadata);
        assert_eq!(lines[0], "Input rows: 10");
        assert_eq!(lines[1], "Groups: 2");
        assert_eq!(lines[2], "Time span: (no timestamps)");
        assert_eq!(
            lines[3],
            "Units: overridden, missing for conc, mixed families mass_concentration + volume_concentration"
        );
    }
}
