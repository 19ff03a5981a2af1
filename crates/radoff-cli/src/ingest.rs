//! NOAA monthly-global CSV ingestion and series merging.
//!
//! Each gas arrives as its own `*_mm_gl.csv` file with `#`-prefixed comment
//! headers followed by `year,month,decimal,average,...,trend,...` columns.
//! The two series are merged month by month (an inner join on the shared
//! year/month pair, which is what keying on the decimal year amounts to since
//! both files derive it identically), CH4 is converted from ppb to ppm, and
//! all merged fields are rounded to 4 decimal digits.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use radoff_core::dataset::{Dataset, FloatValue, Observation, Time};
use radoff_core::evaluator::round_to;
use serde::Deserialize;

/// Fractional digits kept on all merged fields.
const MERGED_DECIMALS: i32 = 4;

/// One row of a NOAA monthly-global series. Extra columns in the file
/// (uncertainties etc.) are ignored by name-based deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesRow {
    pub year: i32,
    pub month: u32,
    pub decimal: Time,
    pub average: FloatValue,
    pub trend: FloatValue,
}

/// One merged monthly observation with both gases, units normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub decimal: Time,
    pub co2_average: FloatValue,
    pub co2_trend: FloatValue,
    /// ppm (converted from ppb).
    pub ch4_average: FloatValue,
    /// ppm (converted from ppb).
    pub ch4_trend: FloatValue,
}

/// Read one monthly series, skipping `#` comment header lines.
pub fn read_series(path: &Path) -> Result<Vec<SeriesRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: SeriesRow =
            record.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Merge the CO2 and CH4 series into one table.
///
/// Months present in only one series are dropped. The CH4 fields are divided
/// by 1000 (ppb to ppm) and every numeric field is rounded to 4 digits.
/// Row order follows the CO2 series, which is time-ordered in the source
/// files, so the merged decimal key stays monotonically increasing.
pub fn merge_series(co2: &[SeriesRow], ch4: &[SeriesRow]) -> Vec<MergedRow> {
    let ch4_by_month: HashMap<(i32, u32), &SeriesRow> = ch4
        .iter()
        .map(|row| ((row.year, row.month), row))
        .collect();

    co2.iter()
        .filter_map(|row| {
            ch4_by_month.get(&(row.year, row.month)).map(|other| MergedRow {
                decimal: round_to(row.decimal, MERGED_DECIMALS),
                co2_average: round_to(row.average, MERGED_DECIMALS),
                co2_trend: round_to(row.trend, MERGED_DECIMALS),
                ch4_average: round_to(other.average / 1000.0, MERGED_DECIMALS),
                ch4_trend: round_to(other.trend / 1000.0, MERGED_DECIMALS),
            })
        })
        .collect()
}

/// Build the solver dataset from the merged table.
pub fn to_dataset(rows: &[MergedRow]) -> Dataset {
    Dataset::new(
        rows.iter()
            .map(|row| Observation::new(row.decimal, row.co2_average, row.ch4_average))
            .collect(),
    )
}
