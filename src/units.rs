//! Unit registry, conversion and reporting rounding.
//!
//! Units are a closed vocabulary grouped into families. Family membership is
//! carried by the [`Unit`] variant: conversions inside one family go through
//! the family's own enum and cannot fail, while conversions between two
//! arbitrary [`Unit`] values are checked and reject cross-family pairs.
//!
//! | Symbol  | Family               | Factor to base | Precision |
//! |---------|----------------------|----------------|-----------|
//! | `ug/m3` | mass concentration   | 1.0            | 1         |
//! | `mg/m3` | mass concentration   | 1000.0         | 3         |
//! | `ppb`   | volume concentration | 1.0            | 1         |
//! | `ppm`   | volume concentration | 1000.0         | 3         |

use crate::error::{Result, StatsError};
use crate::schema::is_numeric_dtype;
use polars::prelude::{DataType, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Unit family classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    MassConcentration,
    VolumeConcentration,
}

impl UnitFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitFamily::MassConcentration => "mass_concentration",
            UnitFamily::VolumeConcentration => "volume_concentration",
        }
    }
}

impl fmt::Display for UnitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by the units of one family
pub trait FamilyUnit: Copy + Eq {
    fn symbol(self) -> &'static str;

    /// Multiplicative factor to the family's base unit
    fn to_base(self) -> f64;

    /// Default reporting precision in decimal places
    fn precision(self) -> u32;

    /// Factor such that `dst_value = src_value * factor`; infallible within a family
    fn factor_to(self, dst: Self) -> f64 {
        if self == dst {
            1.0
        } else {
            self.to_base() / dst.to_base()
        }
    }
}

/// Mass concentration units (base: µg/m³)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MassConcentration {
    MicrogramsPerCubicMetre,
    MilligramsPerCubicMetre,
}

impl FamilyUnit for MassConcentration {
    fn symbol(self) -> &'static str {
        match self {
            MassConcentration::MicrogramsPerCubicMetre => "ug/m3",
            MassConcentration::MilligramsPerCubicMetre => "mg/m3",
        }
    }

    fn to_base(self) -> f64 {
        match self {
            MassConcentration::MicrogramsPerCubicMetre => 1.0,
            MassConcentration::MilligramsPerCubicMetre => 1000.0,
        }
    }

    fn precision(self) -> u32 {
        match self {
            MassConcentration::MicrogramsPerCubicMetre => 1,
            MassConcentration::MilligramsPerCubicMetre => 3,
        }
    }
}

/// Volume concentration units (base: ppb)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VolumeConcentration {
    PartsPerBillion,
    PartsPerMillion,
}

impl FamilyUnit for VolumeConcentration {
    fn symbol(self) -> &'static str {
        match self {
            VolumeConcentration::PartsPerBillion => "ppb",
            VolumeConcentration::PartsPerMillion => "ppm",
        }
    }

    fn to_base(self) -> f64 {
        match self {
            VolumeConcentration::PartsPerBillion => 1.0,
            VolumeConcentration::PartsPerMillion => 1000.0,
        }
    }

    fn precision(self) -> u32 {
        match self {
            VolumeConcentration::PartsPerBillion => 1,
            VolumeConcentration::PartsPerMillion => 3,
        }
    }
}

/// A physical unit from the registry; the variant is the family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    MassConcentration(MassConcentration),
    VolumeConcentration(VolumeConcentration),
}

impl Unit {
    pub const UG_M3: Unit = Unit::MassConcentration(MassConcentration::MicrogramsPerCubicMetre);
    pub const MG_M3: Unit = Unit::MassConcentration(MassConcentration::MilligramsPerCubicMetre);
    pub const PPB: Unit = Unit::VolumeConcentration(VolumeConcentration::PartsPerBillion);
    pub const PPM: Unit = Unit::VolumeConcentration(VolumeConcentration::PartsPerMillion);

    /// Every registered unit
    pub const ALL: [Unit; 4] = [Unit::UG_M3, Unit::MG_M3, Unit::PPB, Unit::PPM];

    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::MassConcentration(u) => u.symbol(),
            Unit::VolumeConcentration(u) => u.symbol(),
        }
    }

    pub fn family(&self) -> UnitFamily {
        match self {
            Unit::MassConcentration(_) => UnitFamily::MassConcentration,
            Unit::VolumeConcentration(_) => UnitFamily::VolumeConcentration,
        }
    }

    pub fn to_base_factor(&self) -> f64 {
        match self {
            Unit::MassConcentration(u) => u.to_base(),
            Unit::VolumeConcentration(u) => u.to_base(),
        }
    }

    pub fn reporting_precision(&self) -> u32 {
        match self {
            Unit::MassConcentration(u) => u.precision(),
            Unit::VolumeConcentration(u) => u.precision(),
        }
    }

    /// Exact-match lookup of a unit symbol
    pub fn parse(token: &str) -> Result<Unit> {
        Unit::ALL
            .iter()
            .copied()
            .find(|unit| unit.symbol() == token)
            .ok_or_else(|| {
                let valid = Unit::ALL
                    .iter()
                    .map(|u| format!("'{}'", u.symbol()))
                    .collect::<Vec<_>>()
                    .join(", ");
                StatsError::unit(format!("Invalid unit '{}'. Valid units are: {}", token, valid))
            })
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        Unit::parse(s)
    }
}

impl Serialize for Unit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Unit::parse(&token).map_err(serde::de::Error::custom)
    }
}

/// Either a raw symbol or an already-resolved unit
#[derive(Debug, Clone, PartialEq)]
pub enum UnitSpec {
    Symbol(String),
    Resolved(Unit),
}

impl UnitSpec {
    /// Resolve to a registry unit; resolved units pass through unchanged
    pub fn resolve(&self) -> Result<Unit> {
        match self {
            UnitSpec::Symbol(token) => Unit::parse(token),
            UnitSpec::Resolved(unit) => Ok(*unit),
        }
    }
}

impl From<Unit> for UnitSpec {
    fn from(unit: Unit) -> Self {
        UnitSpec::Resolved(unit)
    }
}

impl From<&str> for UnitSpec {
    fn from(token: &str) -> Self {
        UnitSpec::Symbol(token.to_string())
    }
}

impl From<String> for UnitSpec {
    fn from(token: String) -> Self {
        UnitSpec::Symbol(token)
    }
}

/// True iff `src == dst` or both share a family
pub fn can_convert(src: Unit, dst: Unit) -> bool {
    src == dst || src.family() == dst.family()
}

/// Multiplicative factor from `src` to `dst`
pub fn factor(src: Unit, dst: Unit) -> Result<f64> {
    match (src, dst) {
        (Unit::MassConcentration(a), Unit::MassConcentration(b)) => Ok(a.factor_to(b)),
        (Unit::VolumeConcentration(a), Unit::VolumeConcentration(b)) => Ok(a.factor_to(b)),
        _ => Err(StatsError::unit(format!(
            "Cannot convert between different unit families: {} ({}) and {} ({})",
            src.symbol(),
            src.family(),
            dst.symbol(),
            dst.family()
        ))),
    }
}

/// Containers whose numeric contents can be scaled and rounded in place
pub trait NumericValues: Sized {
    fn scale(self, factor: f64) -> Result<Self>;
    fn round_to(self, decimals: u32) -> Result<Self>;
}

fn round_value(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

impl NumericValues for f64 {
    fn scale(self, factor: f64) -> Result<Self> {
        Ok(self * factor)
    }

    fn round_to(self, decimals: u32) -> Result<Self> {
        Ok(round_value(self, decimals))
    }
}

impl NumericValues for Vec<f64> {
    fn scale(mut self, factor: f64) -> Result<Self> {
        self.iter_mut().for_each(|v| *v *= factor);
        Ok(self)
    }

    fn round_to(mut self, decimals: u32) -> Result<Self> {
        self.iter_mut().for_each(|v| *v = round_value(*v, decimals));
        Ok(self)
    }
}

impl NumericValues for Vec<Option<f64>> {
    fn scale(mut self, factor: f64) -> Result<Self> {
        self.iter_mut().flatten().for_each(|v| *v *= factor);
        Ok(self)
    }

    fn round_to(mut self, decimals: u32) -> Result<Self> {
        self.iter_mut()
            .flatten()
            .for_each(|v| *v = round_value(*v, decimals));
        Ok(self)
    }
}

impl NumericValues for Series {
    fn scale(self, factor: f64) -> Result<Self> {
        map_numeric_series(&self, "convert", |v| v * factor)
    }

    fn round_to(self, decimals: u32) -> Result<Self> {
        map_numeric_series(&self, "round", |v| round_value(v, decimals))
    }
}

fn map_numeric_series(series: &Series, operation: &str, f: impl Fn(f64) -> f64) -> Result<Series> {
    if !is_numeric_dtype(series.dtype()) {
        return Err(StatsError::data_validation(format!(
            "Cannot {} non-numeric dtype {} in series '{}'. Expected numeric dtype.",
            operation,
            series.dtype(),
            series.name()
        )));
    }
    let cast = series.cast(&DataType::Float64)?;
    let mapped: Vec<Option<f64>> = cast.f64()?.into_iter().map(|v| v.map(&f)).collect();
    Ok(Series::new(series.name().clone(), mapped))
}

/// Convert values from `src` to `dst`, returning the same container type
///
/// Identity conversions return the input untouched without inspecting it.
pub fn convert<T: NumericValues>(values: T, src: Unit, dst: Unit) -> Result<T> {
    let factor = factor(src, dst)?;
    if factor == 1.0 {
        return Ok(values);
    }
    values.scale(factor)
}

/// Per-category rounding overrides layered over unit defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    /// Uppercased category label -> decimal places
    overrides: BTreeMap<String, u32>,
}

impl RoundingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_overrides(overrides: &HashMap<String, u32>) -> Self {
        overrides
            .iter()
            .fold(Self::new(), |policy, (category, decimals)| {
                policy.with_override(category, *decimals)
            })
    }

    /// Register an override; lookup is case-insensitive
    pub fn with_override(mut self, category: &str, decimals: u32) -> Self {
        self.overrides.insert(category.to_uppercase(), decimals);
        self
    }

    /// Decimal places for a unit, honouring a category override if registered
    pub fn precision_for(&self, unit: Unit, category: Option<&str>) -> u32 {
        category
            .and_then(|c| self.overrides.get(&c.to_uppercase()).copied())
            .unwrap_or_else(|| unit.reporting_precision())
    }

    pub fn round<T: NumericValues>(&self, values: T, unit: Unit, category: Option<&str>) -> Result<T> {
        values.round_to(self.precision_for(unit, category))
    }
}

/// Round with the unit default precision (no category overrides registered)
pub fn round_for_reporting<T: NumericValues>(values: T, unit: Unit, category: Option<&str>) -> Result<T> {
    RoundingPolicy::default().round(values, unit, category)
}

/// Normalize a column -> unit mapping, failing on the first bad entry
pub fn validate_schema<I, K, V>(mapping: I) -> Result<HashMap<String, Unit>>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<UnitSpec>,
{
    let mut normalized = HashMap::new();
    for (column, spec) in mapping {
        let column = column.into();
        let unit = spec.into().resolve().map_err(|e| {
            StatsError::unit(format!("Invalid unit for column '{}': {}", column, e))
        })?;
        normalized.insert(column, unit);
    }
    debug!("Validated unit metadata for {} columns", normalized.len());
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_symbols() {
        assert_eq!(Unit::parse("ug/m3").unwrap(), Unit::UG_M3);
        assert_eq!(Unit::parse("ppm").unwrap(), Unit::PPM);
        assert!(Unit::parse("UG/M3").is_err());
    }

    #[test]
    fn test_parse_error_names_token() {
        let err = Unit::parse("furlongs").unwrap_err();
        assert!(err.is_unit_error());
        assert!(err.to_string().contains("furlongs"));
    }

    #[test]
    fn test_resolved_unit_is_identity() {
        let spec = UnitSpec::from(Unit::MG_M3);
        assert_eq!(spec.resolve().unwrap(), Unit::MG_M3);
    }

    #[test]
    fn test_family_membership() {
        assert_eq!(Unit::UG_M3.family(), UnitFamily::MassConcentration);
        assert_eq!(Unit::PPB.family(), UnitFamily::VolumeConcentration);
        assert!(can_convert(Unit::UG_M3, Unit::MG_M3));
        assert!(can_convert(Unit::PPM, Unit::PPM));
        assert!(!can_convert(Unit::UG_M3, Unit::PPM));
    }

    #[test]
    fn test_factor_within_family() {
        assert_eq!(factor(Unit::UG_M3, Unit::MG_M3).unwrap(), 0.001);
        assert_eq!(factor(Unit::MG_M3, Unit::UG_M3).unwrap(), 1000.0);
        assert_eq!(factor(Unit::PPB, Unit::PPB).unwrap(), 1.0);
    }

    #[test]
    fn test_factor_cross_family_names_both_units() {
        let err = factor(Unit::UG_M3, Unit::PPM).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ug/m3"));
        assert!(message.contains("ppm"));
        assert!(message.contains("mass_concentration"));
        assert!(message.contains("volume_concentration"));
    }

    #[test]
    fn test_convert_scalar_and_vec() {
        assert_eq!(convert(1000.0, Unit::UG_M3, Unit::MG_M3).unwrap(), 1.0);
        let converted = convert(vec![Some(1.0), None, Some(2.5)], Unit::PPM, Unit::PPB).unwrap();
        assert_eq!(converted, vec![Some(1000.0), None, Some(2500.0)]);
    }

    #[test]
    fn test_identity_conversion_keeps_buffer() {
        let values = vec![1.5, 2.5, 3.5];
        let ptr = values.as_ptr();
        let converted = convert(values, Unit::UG_M3, Unit::UG_M3).unwrap();
        assert_eq!(converted.as_ptr(), ptr);
    }

    #[test]
    fn test_convert_series_integer_input() {
        let series = Series::new("conc".into(), &[100i64, 200]);
        let converted = convert(series, Unit::UG_M3, Unit::MG_M3).unwrap();
        let values: Vec<Option<f64>> = converted.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(0.1), Some(0.2)]);
        assert_eq!(converted.name().as_str(), "conc");
    }

    #[test]
    fn test_convert_series_rejects_strings() {
        let series = Series::new("conc".into(), &["a", "b"]);
        let err = convert(series, Unit::UG_M3, Unit::MG_M3).unwrap_err();
        assert!(err.to_string().contains("non-numeric dtype"));
    }

    #[test]
    fn test_round_for_reporting_unit_default() {
        assert_eq!(round_for_reporting(1.2345, Unit::UG_M3, None).unwrap(), 1.2);
        assert_eq!(round_for_reporting(0.123456, Unit::MG_M3, None).unwrap(), 0.123);
        assert_eq!(round_for_reporting(1.2345, Unit::UG_M3, Some("NO2")).unwrap(), 1.2);
    }

    #[test]
    fn test_rounding_override_case_insensitive() {
        let policy = RoundingPolicy::new().with_override("no2", 2);
        assert_eq!(policy.round(1.23456, Unit::UG_M3, Some("NO2")).unwrap(), 1.23);
        assert_eq!(policy.round(1.23456, Unit::UG_M3, Some("O3")).unwrap(), 1.2);
    }

    #[test]
    fn test_round_series_keeps_container() {
        let series = Series::new("conc".into(), &[1.26f64, 2.34]);
        let rounded = round_for_reporting(series, Unit::PPB, None).unwrap();
        let values: Vec<Option<f64>> = rounded.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1.3), Some(2.3)]);
    }

    #[test]
    fn test_validate_schema_names_column() {
        let ok = validate_schema([("conc", "ug/m3"), ("unc", "ppb")]).unwrap();
        assert_eq!(ok["conc"], Unit::UG_M3);

        let err = validate_schema([("conc", "ug/m3"), ("bad_col", "nope")]).unwrap_err();
        assert!(err.to_string().contains("bad_col"));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_unit_serde_as_symbol() {
        let json = serde_json::to_string(&Unit::MG_M3).unwrap();
        assert_eq!(json, "\"mg/m3\"");
        let back: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Unit::MG_M3);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn any_unit() -> impl Strategy<Value = Unit> {
            prop::sample::select(Unit::ALL.to_vec())
        }

        proptest! {
            #[test]
            fn identity_factor_is_one(unit in any_unit()) {
                prop_assert_eq!(factor(unit, unit).unwrap(), 1.0);
            }

            #[test]
            fn identity_conversion_returns_input(values in proptest::collection::vec(-1e6f64..1e6, 0..40), unit in any_unit()) {
                let converted = convert(values.clone(), unit, unit).unwrap();
                prop_assert_eq!(converted, values);
            }

            #[test]
            fn factor_defined_iff_convertible(src in any_unit(), dst in any_unit()) {
                prop_assert_eq!(factor(src, dst).is_ok(), can_convert(src, dst));
            }
        }
    }
}
