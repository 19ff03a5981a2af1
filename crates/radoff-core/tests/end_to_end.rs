//! End-to-end solving scenarios against synthetic flux models.
//!
//! These exercise the full baseline → schedule → solve → annotate flow the
//! CLI drives, with the network evaluator replaced by cheap closed-form
//! fluxes so the tests can assert exact roots.

use approx::assert_relative_eq;
use radoff_core::cancel::CancelToken;
use radoff_core::dataset::{
    Dataset, FloatValue, Observation, PRE_INDUSTRIAL_CH4, PRE_INDUSTRIAL_CO2,
};
use radoff_core::errors::RadoffResult;
use radoff_core::evaluator::{round_to, FluxEvaluator, FLUX_DECIMALS};
use radoff_core::scheduler::{compute_baseline, PartitionedScheduler};
use radoff_core::solver::OffsetSolver;

/// `flux = 10 - 5 * offset`, independent of the gas levels.
struct LinearEvaluator;

impl FluxEvaluator for LinearEvaluator {
    fn evaluate(&self, _co2: f64, _ch4: f64, offset: f64) -> RadoffResult<f64> {
        Ok(10.0 - 5.0 * offset)
    }
}

/// A gas-sensitive flux, decreasing in the offset as the solver assumes:
/// higher concentrations push the flux above the pre-industrial value and a
/// positive offset pulls it back down. Rounded like the real evaluator.
struct GreenhouseEvaluator;

impl FluxEvaluator for GreenhouseEvaluator {
    fn evaluate(&self, co2: f64, ch4: f64, offset: f64) -> RadoffResult<f64> {
        let flux = 300.0 + 0.02 * (co2 - 277.7) + (ch4 - 0.7233) - 3.0 * offset;
        Ok(round_to(flux, FLUX_DECIMALS))
    }
}

fn monthly_history(n: usize) -> Dataset {
    Dataset::new(
        (0..n)
            .map(|i| {
                Observation::new(
                    1984.0 + i as f64 / 12.0,
                    344.0 + 0.15 * i as f64,
                    1.62 + 0.001 * i as f64,
                )
            })
            .collect(),
    )
}

#[test]
fn three_rows_one_worker_converge_to_the_shared_root() {
    let mut dataset = monthly_history(3);
    let baseline = 7.5;

    let report = PartitionedScheduler::new(1)
        .run(
            &mut dataset,
            &LinearEvaluator,
            &OffsetSolver::default(),
            baseline,
            &CancelToken::new(),
        )
        .unwrap();

    assert!(report.is_complete());
    for row in dataset.iter() {
        // The linear evaluator ignores the gas levels, so every row shares
        // the root at offset 0.5.
        assert_relative_eq!(row.offset.unwrap(), 0.5);
    }
}

#[test]
fn solved_history_restores_the_baseline_within_tolerance() {
    let evaluator = GreenhouseEvaluator;
    let baseline =
        compute_baseline(&evaluator, PRE_INDUSTRIAL_CO2, PRE_INDUSTRIAL_CH4).unwrap();
    assert_relative_eq!(baseline, 300.0);

    let mut dataset = monthly_history(24);
    let solver = OffsetSolver::default();
    let report = PartitionedScheduler::new(6)
        .run(&mut dataset, &evaluator, &solver, baseline, &CancelToken::new())
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.solved, 24);

    let tolerance = solver.parameters().tolerance;
    for row in dataset.iter() {
        // Internal consistency: the flux at the solved offset matches the
        // pre-industrial baseline within the solver tolerance.
        let restored = evaluator
            .evaluate(row.co2, row.ch4, row.offset.unwrap())
            .unwrap();
        assert!(
            (restored - baseline).abs() <= tolerance,
            "row t={} restored flux {restored} vs baseline {baseline}",
            row.time
        );

        // The raw flux column reflects the zero-offset evaluation.
        let zero_offset = evaluator.evaluate(row.co2, row.ch4, 0.0).unwrap();
        assert_relative_eq!(row.flux.unwrap(), zero_offset);
    }

    // Later observations carry more greenhouse gas, so they need a larger
    // warming offset to restore the baseline.
    let first: FloatValue = dataset.get(0).unwrap().offset.unwrap();
    let last: FloatValue = dataset.get(23).unwrap().offset.unwrap();
    assert!(last > first);
}
