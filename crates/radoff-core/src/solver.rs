use log::trace;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::dataset::FloatValue;
use crate::errors::{RadoffError, RadoffResult};
use crate::evaluator::FluxEvaluator;

/// Parameters for the bisection offset search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverParameters {
    /// Flux tolerance for accepting a midpoint, in flux units.
    ///
    /// The default matches the 3-digit rounding applied by the evaluator, so
    /// a midpoint is accepted as soon as its rounded flux is within one
    /// rounding step of the target.
    pub tolerance: FloatValue,
    /// Hard cap on bisection iterations before giving up.
    pub max_iterations: usize,
    /// Offset search bracket `(lower, upper)`, in degrees.
    ///
    /// `[0, 2]` is the physically expected range of the offset over the
    /// observed history; the bracket is fixed, not re-derived adaptively.
    pub bracket: (FloatValue, FloatValue),
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 64,
            bracket: (0.0, 2.0),
        }
    }
}

/// Bisection search for the offset reproducing a target flux.
///
/// The flux is assumed strictly decreasing in the offset over the bracket
/// (see [`FluxEvaluator`]); under that assumption the root of
/// `flux(offset) - target` is unique and each midpoint evaluation halves the
/// bracket. Every midpoint is evaluated exactly once and the cached value is
/// reused for both the stop test and the bracket update.
#[derive(Debug, Clone, Default)]
pub struct OffsetSolver {
    parameters: SolverParameters,
}

impl OffsetSolver {
    pub fn from_parameters(parameters: SolverParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &SolverParameters {
        &self.parameters
    }

    /// Find the offset whose flux matches `target` within the tolerance.
    ///
    /// Errors with [`RadoffError::NonConvergence`] when the target is not
    /// bracketed by the endpoint fluxes or the iteration cap is exhausted,
    /// and with [`RadoffError::Cancelled`] when the token fires mid-search.
    pub fn solve(
        &self,
        evaluator: &dyn FluxEvaluator,
        target: FloatValue,
        co2: FloatValue,
        ch4: FloatValue,
        cancel: &CancelToken,
    ) -> RadoffResult<FloatValue> {
        self.solve_with_lower_flux(evaluator, target, co2, ch4, None, cancel)
    }

    /// Like [`solve`](Self::solve), but reuses an already-evaluated flux at
    /// the lower bracket endpoint for the bracket guard.
    ///
    /// The caller is responsible for `lower_flux` actually being
    /// `evaluator.evaluate(co2, ch4, bracket.0)`; the scheduler uses this to
    /// share the zero-offset flux it computes for the row's flux column
    /// instead of paying a second external round trip.
    pub fn solve_with_lower_flux(
        &self,
        evaluator: &dyn FluxEvaluator,
        target: FloatValue,
        co2: FloatValue,
        ch4: FloatValue,
        lower_flux: Option<FloatValue>,
        cancel: &CancelToken,
    ) -> RadoffResult<FloatValue> {
        let tolerance = self.parameters.tolerance;
        let (mut lower, mut upper) = self.parameters.bracket;

        if cancel.is_cancelled() {
            return Err(RadoffError::Cancelled);
        }

        // The reachable flux interval over the bracket is
        // [flux(upper), flux(lower)] for a decreasing flux. A target outside
        // it has no root in the bracket; fail fast instead of silently
        // converging to an endpoint. This also rejects evaluators whose
        // endpoint fluxes are not ordered as a decreasing function requires.
        let flux_lower = match lower_flux {
            Some(flux) => flux,
            None => evaluator.evaluate(co2, ch4, lower)?,
        };
        if (flux_lower - target).abs() <= tolerance {
            return Ok(lower);
        }
        let flux_upper = evaluator.evaluate(co2, ch4, upper)?;
        if (flux_upper - target).abs() <= tolerance {
            return Ok(upper);
        }
        if target > flux_lower || target < flux_upper {
            let residual = (flux_lower - target)
                .abs()
                .min((flux_upper - target).abs());
            return Err(RadoffError::NonConvergence {
                iterations: 0,
                residual,
            });
        }

        let mut residual = FloatValue::INFINITY;
        for iteration in 0..self.parameters.max_iterations {
            if cancel.is_cancelled() {
                return Err(RadoffError::Cancelled);
            }

            let mid = (lower + upper) / 2.0;
            let flux = evaluator.evaluate(co2, ch4, mid)?;
            residual = flux - target;
            trace!(
                "bisection iteration {iteration}: bracket [{lower}, {upper}], \
                 flux(mid={mid}) = {flux}, target {target}"
            );

            if residual.abs() <= tolerance {
                return Ok(mid);
            }
            if residual > 0.0 {
                // Flux still too high; the root lies at a larger offset.
                lower = mid;
            } else {
                upper = mid;
            }
        }

        Err(RadoffError::NonConvergence {
            iterations: self.parameters.max_iterations,
            residual: residual.abs(),
        })
    }
}
