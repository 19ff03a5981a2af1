use serde::{Deserialize, Serialize};

/// Scalar type used for concentrations, fluxes and offsets.
pub type FloatValue = f64;
/// Decimal-year time value.
pub type Time = f64;

/// Pre-industrial atmospheric CO2 concentration (ppm).
pub const PRE_INDUSTRIAL_CO2: FloatValue = 277.7;
/// Pre-industrial atmospheric CH4 concentration (ppm).
pub const PRE_INDUSTRIAL_CH4: FloatValue = 0.7233;

/// One monthly observation of the merged CO2/CH4 history.
///
/// The two derived fields are `None` until the solving phase has processed
/// the row. Afterwards `flux` holds the upward IR flux at zero offset and
/// `offset` the temperature adjustment whose flux matches the pre-industrial
/// baseline within the solver tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Decimal-year time key; strictly increasing across a dataset.
    pub time: Time,
    /// CO2 concentration (ppm).
    pub co2: FloatValue,
    /// CH4 concentration (ppm, already converted from ppb).
    pub ch4: FloatValue,
    pub flux: Option<FloatValue>,
    pub offset: Option<FloatValue>,
}

impl Observation {
    pub fn new(time: Time, co2: FloatValue, ch4: FloatValue) -> Self {
        Self {
            time,
            co2,
            ch4,
            flux: None,
            offset: None,
        }
    }

    /// True once both derived columns have been written.
    pub fn is_solved(&self) -> bool {
        self.flux.is_some() && self.offset.is_some()
    }
}

/// The ordered observation history, annotated in place by the solving phase.
///
/// The dataset is never resized while workers are running; only the derived
/// columns of each row are written, each by the single worker owning the
/// row's index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    rows: Vec<Observation>,
}

impl Dataset {
    pub fn new(rows: Vec<Observation>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Observation> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.rows.iter()
    }

    /// Number of rows with both derived columns populated.
    pub fn solved_rows(&self) -> usize {
        self.rows.iter().filter(|row| row.is_solved()).count()
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Observation] {
        &mut self.rows
    }
}
