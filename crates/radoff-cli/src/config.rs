//! TOML run configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use radoff_core::dataset::{FloatValue, PRE_INDUSTRIAL_CH4, PRE_INDUSTRIAL_CO2};
use radoff_core::evaluator::DEFAULT_BASE_URL;
use radoff_core::solver::SolverParameters;
use serde::{Deserialize, Serialize};

/// Gas levels defining the baseline flux the solver restores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreIndustrialLevels {
    /// CO2 concentration in ppm.
    pub co2: FloatValue,
    /// CH4 concentration in ppm.
    pub ch4: FloatValue,
}

impl Default for PreIndustrialLevels {
    fn default() -> Self {
        Self {
            co2: PRE_INDUSTRIAL_CO2,
            ch4: PRE_INDUSTRIAL_CH4,
        }
    }
}

/// Run configuration, loadable from a TOML file.
///
/// Every field has a default, so a missing file or an empty one yields a
/// usable configuration; CLI flags override individual fields afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// MODTRAN CGI endpoint.
    pub base_url: String,
    /// Number of solver workers.
    pub workers: usize,
    /// Output file for the offset column.
    pub output: PathBuf,
    /// Directory for diagnostic plots; no plots are drawn when unset.
    pub plots: Option<PathBuf>,
    /// Gas levels defining the baseline flux.
    pub pre_industrial: PreIndustrialLevels,
    /// Bisection parameters.
    pub solver: SolverParameters,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            workers: 6,
            output: PathBuf::from("toff_output.csv"),
            plots: None,
            pre_industrial: PreIndustrialLevels::default(),
            solver: SolverParameters::default(),
        }
    }
}

impl RunConfig {
    /// Load the configuration, falling back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
            }
        }
    }
}
