//! Pairwise correlation engine tests

use super::*;
use crate::analysis::correlation::{average_ranks, compute_pairwise, generate_ordered_pairs, pearson};
use crate::config::CorrelationConfig;
use crate::error::StatsError;
use crate::models::{CorrelationMethod, OutputFormat, UnitsEnforcement};
use crate::units::UnitFamily;

const UG: &[(&str, &str)] = &[("conc", "ug/m3")];

fn ascending_descending() -> Vec<Obs> {
    let mut rows = series("S1", "A", &[1.0, 2.0, 3.0, 4.0, 5.0]);
    rows.extend(series("S1", "B", &[1.0, 2.0, 3.0, 4.0, 5.0]));
    rows.extend(series("S1", "C", &[5.0, 4.0, 3.0, 2.0, 1.0]));
    rows
}

fn with_extra_column(rows: &[Obs], name: &str, values: Vec<f64>) -> TimeSeriesDataset {
    let mut frame = long_frame(rows);
    frame.with_column(Series::new(name.into(), values)).unwrap();
    TimeSeriesDataset::new(frame, "datetime").unwrap()
}

#[test]
fn test_perfect_positive_and_negative() {
    let data = dataset_with_units(&ascending_descending(), UG);
    let output = compute_pairwise(&data, &CorrelationConfig::default()).unwrap();

    assert_eq!(output.records.len(), 6);
    let ab = output.get(&[], "conc", "A", "B").unwrap();
    assert_close(ab.correlation, 1.0);
    assert_eq!(ab.n, 5);
    let ac = output.get(&[], "conc", "A", "C").unwrap();
    assert_close(ac.correlation, -1.0);
    assert_eq!(output.metadata.units_status.status, UnitsEnforcement::Enforced);
    assert_eq!(output.metadata.n_groups, 1);
}

#[test]
fn test_pairs_are_sorted_and_include_diagonal() {
    let data = dataset_with_units(&ascending_descending(), UG);
    let output = compute_pairwise(&data, &CorrelationConfig::default()).unwrap();

    let pairs: Vec<(&str, &str)> = output
        .records
        .iter()
        .map(|r| (r.var_x.as_str(), r.var_y.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![("A", "A"), ("A", "B"), ("A", "C"), ("B", "B"), ("B", "C"), ("C", "C")]
    );
    for record in output.records.iter().filter(|r| r.var_x == r.var_y) {
        assert_close(record.correlation, 1.0);
    }
}

#[test]
fn test_constant_category_gives_nan() {
    let mut rows = series("S1", "A", &[1.0, 2.0, 3.0]);
    rows.extend(series("S1", "D", &[3.0, 3.0, 3.0]));
    let data = dataset_with_units(&rows, UG);
    let output = compute_pairwise(&data, &CorrelationConfig::default()).unwrap();

    assert!(output.get(&[], "conc", "D", "D").unwrap().correlation.is_nan());
    assert!(output.get(&[], "conc", "A", "D").unwrap().correlation.is_nan());
    assert_close(output.get(&[], "conc", "A", "A").unwrap().correlation, 1.0);
}

#[test]
fn test_min_samples_drops_short_categories() {
    let mut rows = series("S1", "A", &[1.0, 2.0, 3.0]);
    rows.extend(series("S1", "B", &[2.0, 1.0, 0.0]));
    rows.extend(series("S1", "SHORT", &[1.0, 2.0]));
    let data = dataset_with_units(&rows, UG);
    let output = compute_pairwise(&data, &CorrelationConfig::default()).unwrap();

    assert_eq!(output.records.len(), 3);
    assert!(output.records.iter().all(|r| r.var_x != "SHORT" && r.var_y != "SHORT"));

    let relaxed = CorrelationConfig::default().with_min_samples(2);
    let output = compute_pairwise(&data, &relaxed).unwrap();
    let short = output.get(&[], "conc", "A", "SHORT").unwrap();
    assert_eq!(short.n, 2);
    assert_close(short.correlation, 1.0);
}

#[test]
fn test_qc_flags_applied_before_pairing() {
    let mut rows = series("S1", "A", &[1.0, 2.0, 3.0, 4.0]);
    rows.push(obs(4, "S1", "A", 100.0, "invalid"));
    rows.extend(series("S1", "B", &[2.0, 4.0, 6.0, 8.0]));
    rows.push(obs(4, "S1", "B", -50.0, "below_dl"));
    let data = dataset_with_units(&rows, UG);
    let output = compute_pairwise(&data, &CorrelationConfig::default()).unwrap();

    let ab = output.get(&[], "conc", "A", "B").unwrap();
    assert_eq!(ab.n, 4);
    assert_close(ab.correlation, 1.0);
}

#[test]
fn test_grouping_keeps_groups_independent() {
    let mut rows = series("S1", "A", &[1.0, 2.0, 3.0]);
    rows.extend(series("S1", "B", &[1.0, 2.0, 3.0]));
    rows.extend(series("S2", "A", &[1.0, 2.0, 3.0]));
    rows.extend(series("S2", "B", &[3.0, 2.0, 1.0]));
    let data = dataset_with_units(&rows, UG);
    let config = CorrelationConfig::default().with_group_by(["site_id"]);
    let output = compute_pairwise(&data, &config).unwrap();

    let s1 = [Some("S1".to_string())];
    let s2 = [Some("S2".to_string())];
    assert_close(output.get(&s1, "conc", "A", "B").unwrap().correlation, 1.0);
    assert_close(output.get(&s2, "conc", "A", "B").unwrap().correlation, -1.0);
    assert_eq!(output.metadata.n_groups, 2);
    assert_eq!(
        strings(&output.table, "site_id"),
        vec![Some("S1".to_string()); 3]
            .into_iter()
            .chain(vec![Some("S2".to_string()); 3])
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_spearman_is_rank_based() {
    let mut rows = series("S1", "A", &[1.0, 2.0, 3.0, 4.0, 5.0]);
    rows.extend(series("S1", "B", &[1.0, 4.0, 9.0, 16.0, 100.0]));
    let data = dataset_with_units(&rows, UG);

    let spearman = compute_pairwise(
        &data,
        &CorrelationConfig::default().with_method(CorrelationMethod::Spearman),
    )
    .unwrap();
    assert_close(spearman.get(&[], "conc", "A", "B").unwrap().correlation, 1.0);

    let pearson = compute_pairwise(&data, &CorrelationConfig::default()).unwrap();
    assert!(pearson.get(&[], "conc", "A", "B").unwrap().correlation < 0.95);
}

#[test]
fn test_missing_units_fail_unless_overridden() {
    let data = dataset(&ascending_descending());
    let err = compute_pairwise(&data, &CorrelationConfig::default()).unwrap_err();
    assert!(err.is_unit_error());
    assert!(err.to_string().contains("conc"));

    let config = CorrelationConfig::default().with_allow_missing_units(true);
    let output = compute_pairwise(&data, &config).unwrap();
    assert_eq!(output.metadata.units_status.status, UnitsEnforcement::Overridden);
    assert_eq!(output.metadata.units_status.missing_units, vec!["conc".to_string()]);
    assert_eq!(output.records.len(), 6);
}

#[test]
fn test_mixed_unit_families() {
    let rows = ascending_descending();
    let vmr: Vec<f64> = (0..rows.len()).map(|i| i as f64 * 0.5).collect();
    let data = with_extra_column(&rows, "vmr", vmr)
        .with_column_units([("conc", "ug/m3"), ("vmr", "ppb")])
        .unwrap();
    let config = CorrelationConfig::default().with_value_columns(["conc", "vmr"]);

    match compute_pairwise(&data, &config).unwrap_err() {
        StatsError::Unit { message } => {
            assert!(message.contains("mass_concentration"));
            assert!(message.contains("volume_concentration"));
        }
        other => panic!("Expected Unit error, got {:?}", other),
    }

    let output = compute_pairwise(&data, &config.with_allow_mixed_unit_families(true)).unwrap();
    let status = &output.metadata.units_status;
    assert_eq!(status.status, UnitsEnforcement::Overridden);
    assert_eq!(
        status.mixed_families,
        vec![UnitFamily::MassConcentration, UnitFamily::VolumeConcentration]
    );
    assert_eq!(output.records.len(), 12);
}

#[test]
fn test_same_family_different_units_allowed() {
    let rows = ascending_descending();
    let scaled: Vec<f64> = rows.iter().map(|r| r.conc.unwrap_or(0.0) / 1000.0).collect();
    let data = with_extra_column(&rows, "conc_mg", scaled)
        .with_column_units([("conc", "ug/m3"), ("conc_mg", "mg/m3")])
        .unwrap();
    let config = CorrelationConfig::default().with_value_columns(["conc", "conc_mg"]);
    let output = compute_pairwise(&data, &config).unwrap();

    assert_eq!(output.metadata.units_status.status, UnitsEnforcement::Enforced);
    let names: Vec<&str> = output.records.iter().map(|r| r.value_col_name.as_str()).collect();
    assert_eq!(names[0], "conc");
    assert_eq!(names[6], "conc_mg");
}

#[test]
fn test_configured_flag_column_must_exist() {
    let frame = long_frame(&ascending_descending()).drop("flag").unwrap();
    let data = TimeSeriesDataset::new(frame, "datetime")
        .unwrap()
        .with_column_units(UG.iter().copied())
        .unwrap();
    assert!(matches!(
        compute_pairwise(&data, &CorrelationConfig::default()).unwrap_err(),
        StatsError::Schema { .. }
    ));

    let output = compute_pairwise(&data, &CorrelationConfig::default().without_flag_column()).unwrap();
    assert_eq!(output.records.len(), 6);
}

#[test]
fn test_category_in_group_by_rejected() {
    let data = dataset_with_units(&ascending_descending(), UG);
    let config = CorrelationConfig::default().with_group_by(["pollutant"]);
    assert!(matches!(
        compute_pairwise(&data, &config).unwrap_err(),
        StatsError::Configuration { .. }
    ));
}

#[test]
fn test_wide_layout() {
    let data = dataset_with_units(&ascending_descending(), UG);
    let config = CorrelationConfig::default().with_output_format(OutputFormat::Wide);
    let output = compute_pairwise(&data, &config).unwrap();

    let names: Vec<String> = output
        .table
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(names, vec!["value_col_name", "var_x", "A", "B", "C"]);
    assert_eq!(
        strings(&output.table, "var_x"),
        vec![Some("A".to_string()), Some("B".to_string()), Some("C".to_string())]
    );
    let b = floats(&output.table, "B");
    assert_close(b[0].unwrap(), 1.0);
    assert_close(b[1].unwrap(), 1.0);
    assert_eq!(b[2], None);

    let tidy = output.to_frame(OutputFormat::Tidy).unwrap();
    assert_eq!(tidy.height(), 6);
}

#[test]
fn test_helpers() {
    assert_eq!(
        generate_ordered_pairs(&["NO2", "O3"]),
        vec![
            ("NO2".to_string(), "NO2".to_string()),
            ("NO2".to_string(), "O3".to_string()),
            ("O3".to_string(), "O3".to_string()),
        ]
    );
    assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    assert!(pearson(&[1.0], &[2.0]).is_nan());
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    const LABELS: [&str; 6] = ["CO", "NO", "NO2", "O3", "PM10", "PM25"];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn pair_count_is_triangular(
            k in 1usize..=6,
            values in proptest::collection::vec(-50.0f64..50.0, 30),
        ) {
            let rows: Vec<Obs> = LABELS[..k]
                .iter()
                .enumerate()
                .flat_map(|(c, &label)| (0..5).map(move |i| (c, label, i)))
                .map(|(c, label, i)| obs(i as i64, "S1", label, values[c * 5 + i], "valid"))
                .collect();
            let data = dataset_with_units(&rows, UG);
            let output = compute_pairwise(&data, &CorrelationConfig::default()).unwrap();

            prop_assert_eq!(output.records.len(), k * (k + 1) / 2);
            for record in &output.records {
                prop_assert!(record.var_x <= record.var_y);
                prop_assert!(record.correlation.is_nan() || record.correlation.abs() <= 1.0);
            }
        }
    }
}
