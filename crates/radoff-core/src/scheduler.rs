use std::ops::Range;
use std::thread;

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::dataset::{Dataset, FloatValue, Observation};
use crate::errors::{RadoffError, RadoffResult};
use crate::evaluator::FluxEvaluator;
use crate::solver::OffsetSolver;

/// Flux at the given pre-industrial gas levels and zero offset.
///
/// This is the root-finding target for every row. It is computed once,
/// before any worker starts, and passed into the run explicitly; neither the
/// levels nor the resulting baseline are ambient state. The stock levels are
/// [`PRE_INDUSTRIAL_CO2`](crate::dataset::PRE_INDUSTRIAL_CO2) and
/// [`PRE_INDUSTRIAL_CH4`](crate::dataset::PRE_INDUSTRIAL_CH4).
pub fn compute_baseline(
    evaluator: &dyn FluxEvaluator,
    co2: FloatValue,
    ch4: FloatValue,
) -> RadoffResult<FloatValue> {
    evaluator.evaluate(co2, ch4, 0.0)
}

/// One row the solving phase could not complete.
#[derive(Debug)]
pub struct RowFailure {
    pub index: usize,
    pub error: RadoffError,
}

/// Outcome of a scheduling run, aggregated after the join barrier.
///
/// A failed row never aborts the rest of its partition; it is recorded here
/// and the worker moves on to the next index.
#[derive(Debug, Default)]
pub struct SolveReport {
    /// Rows whose flux and offset columns were written.
    pub solved: usize,
    /// Per-row failures, sorted by row index.
    pub failures: Vec<RowFailure>,
}

impl SolveReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, other: SolveReport) {
        self.solved += other.solved;
        self.failures.extend(other.failures);
    }
}

/// Splits the dataset into contiguous per-worker partitions and solves them
/// concurrently.
///
/// Partitions are materialized as non-aliased `&mut [Observation]` slices, so
/// the disjoint-writes invariant the lock-free design depends on is enforced
/// by the borrow checker rather than by convention. Workers share nothing
/// else; the only synchronization is the final join barrier.
#[derive(Debug, Clone)]
pub struct PartitionedScheduler {
    workers: usize,
}

impl PartitionedScheduler {
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Contiguous index ranges covering `[0, rows)` exactly, one per worker.
    ///
    /// Every worker gets `rows / workers` indices except the last, which
    /// absorbs the remainder. Errors with [`RadoffError::Partition`] when the
    /// worker count is zero or exceeds the row count, since either would
    /// produce zero-width ranges.
    pub fn partition(&self, rows: usize) -> RadoffResult<Vec<Range<usize>>> {
        if self.workers == 0 || self.workers > rows {
            return Err(RadoffError::Partition {
                rows,
                workers: self.workers,
            });
        }

        let step = rows / self.workers;
        let ranges = (0..self.workers)
            .map(|k| {
                let end = if k == self.workers - 1 {
                    rows
                } else {
                    (k + 1) * step
                };
                k * step..end
            })
            .collect();
        Ok(ranges)
    }

    /// Populate the flux and offset columns of every row in place.
    ///
    /// For each row the worker evaluates the flux at zero offset, then runs
    /// the bisection against `baseline`. Blocks until all workers have
    /// joined; the dataset is not observable mid-run through this API.
    pub fn run(
        &self,
        dataset: &mut Dataset,
        evaluator: &dyn FluxEvaluator,
        solver: &OffsetSolver,
        baseline: FloatValue,
        cancel: &CancelToken,
    ) -> RadoffResult<SolveReport> {
        let rows = dataset.len();
        let ranges = self.partition(rows)?;
        info!(
            "solving {rows} rows across {} workers (baseline flux {baseline})",
            self.workers
        );

        // Carve the row vector into non-aliased slices, one per partition.
        let mut partitions: Vec<(usize, &mut [Observation])> = Vec::with_capacity(ranges.len());
        let mut rest = dataset.rows_mut();
        for range in &ranges {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            partitions.push((range.start, head));
            rest = tail;
        }
        debug_assert!(rest.is_empty());

        let outcomes = thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .into_iter()
                .map(|(start, slice)| {
                    scope.spawn(move || {
                        solve_partition(start, slice, evaluator, solver, baseline, cancel)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        });

        let mut report = SolveReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(partial) => report.absorb(partial),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        report.failures.sort_by_key(|failure| failure.index);

        info!(
            "solved {} of {rows} rows ({} failures)",
            report.solved,
            report.failures.len()
        );
        Ok(report)
    }
}

/// Worker body: solve every row of one partition in increasing index order.
fn solve_partition(
    start: usize,
    rows: &mut [Observation],
    evaluator: &dyn FluxEvaluator,
    solver: &OffsetSolver,
    baseline: FloatValue,
    cancel: &CancelToken,
) -> SolveReport {
    debug!("worker starting at row {start} ({} rows)", rows.len());

    let mut report = SolveReport::default();
    for (offset_in_partition, row) in rows.iter_mut().enumerate() {
        let index = start + offset_in_partition;
        if cancel.is_cancelled() {
            report.failures.push(RowFailure {
                index,
                error: RadoffError::Cancelled,
            });
            continue;
        }

        match solve_row(row, evaluator, solver, baseline, cancel) {
            Ok(()) => report.solved += 1,
            Err(error) => {
                warn!("row {index} (t={}) failed: {error}", row.time);
                report.failures.push(RowFailure { index, error });
            }
        }
    }
    report
}

fn solve_row(
    row: &mut Observation,
    evaluator: &dyn FluxEvaluator,
    solver: &OffsetSolver,
    baseline: FloatValue,
    cancel: &CancelToken,
) -> RadoffResult<()> {
    let flux = evaluator.evaluate(row.co2, row.ch4, 0.0)?;
    // When the search bracket starts at zero offset, the flux column doubles
    // as the solver's lower-endpoint flux; no second round trip needed.
    let lower_flux = (solver.parameters().bracket.0 == 0.0).then_some(flux);
    let offset =
        solver.solve_with_lower_flux(evaluator, baseline, row.co2, row.ch4, lower_flux, cancel)?;
    row.flux = Some(flux);
    row.offset = Some(offset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Synthetic monotonic-decreasing evaluator, `flux = 10 - 5 * offset`,
    /// independent of the gas levels.
    struct LinearEvaluator;

    impl FluxEvaluator for LinearEvaluator {
        fn evaluate(&self, _co2: f64, _ch4: f64, offset: f64) -> RadoffResult<f64> {
            Ok(10.0 - 5.0 * offset)
        }
    }

    /// Fails every evaluation for rows at a marked CO2 level.
    struct FailingEvaluator {
        poisoned_co2: f64,
    }

    impl FluxEvaluator for FailingEvaluator {
        fn evaluate(&self, co2: f64, _ch4: f64, offset: f64) -> RadoffResult<f64> {
            if co2 == self.poisoned_co2 {
                return Err(RadoffError::evaluation("simulated outage"));
            }
            Ok(10.0 - 5.0 * offset)
        }
    }

    fn dataset_of(n: usize) -> Dataset {
        Dataset::new(
            (0..n)
                .map(|i| Observation::new(2000.0 + i as f64 / 12.0, 300.0 + i as f64, 1.7))
                .collect(),
        )
    }

    #[test]
    fn partition_covers_the_dataset_without_gaps_or_overlap() {
        for (rows, workers) in [(12, 1), (12, 4), (13, 4), (100, 7), (6, 6)] {
            let ranges = PartitionedScheduler::new(workers).partition(rows).unwrap();
            assert_eq!(ranges.len(), workers);
            assert_eq!(ranges[0].start, 0);
            assert_eq!(ranges[workers - 1].end, rows);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }

    #[test]
    fn partition_sizes_are_fair() {
        let ranges = PartitionedScheduler::new(3).partition(10).unwrap();
        let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        // All workers take floor(10 / 3) = 3 rows; the last absorbs the rest.
        assert_eq!(sizes, vec![3, 3, 4]);
    }

    #[test]
    fn more_workers_than_rows_is_a_partition_error() {
        let result = PartitionedScheduler::new(6).partition(5);
        assert!(matches!(
            result,
            Err(RadoffError::Partition { rows: 5, workers: 6 })
        ));
    }

    #[test]
    fn zero_workers_is_a_partition_error() {
        let result = PartitionedScheduler::new(0).partition(5);
        assert!(matches!(result, Err(RadoffError::Partition { .. })));
    }

    #[test]
    fn single_worker_solves_every_row() {
        let mut dataset = dataset_of(3);
        let scheduler = PartitionedScheduler::new(1);
        // Baseline 7.5 has its root at offset 0.5 for the linear flux,
        // independent of the gas levels.
        let report = scheduler
            .run(
                &mut dataset,
                &LinearEvaluator,
                &OffsetSolver::default(),
                7.5,
                &CancelToken::new(),
            )
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.solved, 3);
        for row in dataset.iter() {
            assert_relative_eq!(row.offset.unwrap(), 0.5);
            assert_relative_eq!(row.flux.unwrap(), 10.0);
        }
    }

    #[test]
    fn row_flux_is_reused_as_the_solver_lower_endpoint() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingEvaluator {
            calls: AtomicUsize,
        }

        impl FluxEvaluator for CountingEvaluator {
            fn evaluate(&self, _co2: f64, _ch4: f64, offset: f64) -> RadoffResult<f64> {
                self.calls.fetch_add(1, Ordering::Relaxed);
                Ok(10.0 - 5.0 * offset)
            }
        }

        let evaluator = CountingEvaluator {
            calls: AtomicUsize::new(0),
        };
        let mut dataset = dataset_of(1);
        let report = PartitionedScheduler::new(1)
            .run(
                &mut dataset,
                &evaluator,
                &OffsetSolver::default(),
                7.5,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(report.solved, 1);
        // Four external calls for the row: the zero-offset flux (shared with
        // the bracket guard), the upper endpoint, and two midpoints.
        assert_eq!(evaluator.calls.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn concurrent_workers_fill_disjoint_partitions() {
        let mut dataset = dataset_of(13);
        let scheduler = PartitionedScheduler::new(4);
        let report = scheduler
            .run(
                &mut dataset,
                &LinearEvaluator,
                &OffsetSolver::default(),
                7.5,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(report.solved, 13);
        assert_eq!(dataset.solved_rows(), 13);
    }

    #[test]
    fn a_failing_row_does_not_abort_the_rest_of_its_partition() {
        let mut dataset = dataset_of(5);
        let poisoned_co2 = dataset.get(1).unwrap().co2;
        let scheduler = PartitionedScheduler::new(1);

        let report = scheduler
            .run(
                &mut dataset,
                &FailingEvaluator { poisoned_co2 },
                &OffsetSolver::default(),
                7.5,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(report.solved, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(matches!(
            report.failures[0].error,
            RadoffError::Evaluation { .. }
        ));

        // The poisoned row is left untouched; its neighbours are solved.
        assert!(!dataset.get(1).unwrap().is_solved());
        assert!(dataset.get(0).unwrap().is_solved());
        assert!(dataset.get(4).unwrap().is_solved());
    }

    #[test]
    fn cancelled_run_records_every_remaining_row() {
        let mut dataset = dataset_of(4);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = PartitionedScheduler::new(2)
            .run(
                &mut dataset,
                &LinearEvaluator,
                &OffsetSolver::default(),
                7.5,
                &cancel,
            )
            .unwrap();

        assert_eq!(report.solved, 0);
        assert_eq!(report.failures.len(), 4);
        assert!(report
            .failures
            .iter()
            .all(|failure| matches!(failure.error, RadoffError::Cancelled)));
        assert_eq!(dataset.solved_rows(), 0);
    }

    #[test]
    fn baseline_uses_the_given_levels_at_zero_offset() {
        use crate::dataset::{PRE_INDUSTRIAL_CH4, PRE_INDUSTRIAL_CO2};

        struct CapturingEvaluator;

        impl FluxEvaluator for CapturingEvaluator {
            fn evaluate(&self, co2: f64, ch4: f64, offset: f64) -> RadoffResult<f64> {
                assert_eq!(co2, PRE_INDUSTRIAL_CO2);
                assert_eq!(ch4, PRE_INDUSTRIAL_CH4);
                assert_eq!(offset, 0.0);
                Ok(266.931)
            }
        }

        let baseline =
            compute_baseline(&CapturingEvaluator, PRE_INDUSTRIAL_CO2, PRE_INDUSTRIAL_CH4).unwrap();
        assert_relative_eq!(baseline, 266.931);
    }
}
