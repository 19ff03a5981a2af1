use log::trace;
use regex::Regex;

use crate::dataset::FloatValue;
use crate::errors::{RadoffError, RadoffResult};

/// Number of fractional digits kept when comparing fluxes.
///
/// The external model serves radiances with limited precision; rounding both
/// sides of every comparison to the same granularity keeps the solver's stop
/// test stable against floating-point noise from the network source.
pub const FLUX_DECIMALS: i32 = 3;

/// Scale factor from MODTRAN integrated radiance to upward IR flux (W/m^2).
const RADIANCE_SCALE: FloatValue = 3.14e4;

/// Default MODTRAN CGI endpoint.
pub const DEFAULT_BASE_URL: &str = "http://climatemodels.uchicago.edu/cgi-bin/modtran/modtran.cgi";

/// Round `value` to `digits` fractional digits.
pub fn round_to(value: FloatValue, digits: i32) -> FloatValue {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Oracle for the upward IR flux at a given gas/offset combination.
///
/// Implementations must return the same flux for the same inputs; the solver
/// relies on this when it re-visits bracket values, and nothing beyond it
/// (the call itself may be arbitrarily expensive).
///
/// # Precondition
///
/// The bisection solver additionally assumes the flux is strictly decreasing
/// in `offset` over its search bracket. This is never verified per call; an
/// evaluator violating it makes the solver converge to a meaningless root.
pub trait FluxEvaluator: Send + Sync {
    /// Flux for the given CO2 level (ppm), CH4 level (ppm) and temperature
    /// offset, rounded to [`FLUX_DECIMALS`] fractional digits.
    fn evaluate(
        &self,
        co2: FloatValue,
        ch4: FloatValue,
        offset: FloatValue,
    ) -> RadoffResult<FloatValue>;
}

/// Flux evaluator backed by the MODTRAN CGI endpoint.
///
/// Each evaluation is one blocking HTTP GET. No retries are attempted here;
/// transport-level resilience belongs to whatever sits in front of the
/// endpoint, not to the numeric contract.
#[derive(Debug)]
pub struct ModtranEvaluator {
    client: reqwest::blocking::Client,
    base_url: String,
    radiance: Regex,
}

impl ModtranEvaluator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
            radiance: Regex::new(r"INTEGRATED RADIANCE =\s+(\S+)\s+WATTS").expect("static regex"),
        }
    }

    /// Request URL for one evaluation.
    ///
    /// Everything except pco2, ch4 and Toffset is pinned: tropospheric ozone
    /// zeroed, stratospheric ozone and freon scales at 1, US Standard
    /// Atmosphere (model=2), clear sky, 70 km looking down.
    fn request_url(&self, co2: FloatValue, ch4: FloatValue, offset: FloatValue) -> String {
        format!(
            "{}?pco2={co2}&ch4={ch4}&trop_o3=0&strat_o3=1&Toffset={offset}\
             &h2otscaled=0&h2orat=1&scalefreon=1&model=2&icld=0&altitude=70&i_obs=180&i_save=0",
            self.base_url
        )
    }

    /// Extract the integrated radiance from a MODTRAN response body.
    fn parse_radiance(&self, body: &str) -> RadoffResult<FloatValue> {
        let captures = self.radiance.captures(body).ok_or_else(|| {
            RadoffError::evaluation("response contains no INTEGRATED RADIANCE line")
        })?;
        captures[1].parse::<FloatValue>().map_err(|err| {
            RadoffError::evaluation(format!("unparsable radiance '{}': {err}", &captures[1]))
        })
    }
}

impl Default for ModtranEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl FluxEvaluator for ModtranEvaluator {
    fn evaluate(
        &self,
        co2: FloatValue,
        ch4: FloatValue,
        offset: FloatValue,
    ) -> RadoffResult<FloatValue> {
        let url = self.request_url(co2, ch4, offset);
        trace!("GET {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| RadoffError::evaluation(err.to_string()))?;
        if !response.status().is_success() {
            return Err(RadoffError::evaluation(format!("HTTP {}", response.status())));
        }
        let body = response
            .text()
            .map_err(|err| RadoffError::evaluation(err.to_string()))?;

        let radiance = self.parse_radiance(&body)?;
        Ok(round_to(RADIANCE_SCALE * radiance, FLUX_DECIMALS))
    }
}
