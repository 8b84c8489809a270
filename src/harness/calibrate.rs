//! Two-run calibration: search cost isolated from generation cost.

use crate::backend::ComputeBackend;
use crate::harness::config::HarnessConfig;
use crate::harness::run::{run_benchmark, RunMode, RunReport};
use crate::image::MarkerPlacement;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{TileSearchError, TileSearchResult};

/// A search run and a generate-only run over the same configuration.
#[derive(Clone, Debug)]
pub struct Calibration {
    pub with_search: RunReport,
    pub without_search: RunReport,
}

impl Calibration {
    /// Pairs two reports, checking they are comparable.
    pub fn new(with_search: RunReport, without_search: RunReport) -> TileSearchResult<Self> {
        if with_search.mode != RunMode::WithSearch {
            return Err(TileSearchError::MismatchedRuns("first run must include search"));
        }
        if without_search.mode != RunMode::WithoutSearch {
            return Err(TileSearchError::MismatchedRuns("second run must omit search"));
        }
        if with_search.iterations != without_search.iterations {
            return Err(TileSearchError::MismatchedRuns("iteration counts differ"));
        }
        if with_search.device.name != without_search.device.name {
            return Err(TileSearchError::MismatchedRuns("runs used different devices"));
        }
        Ok(Self {
            with_search,
            without_search,
        })
    }

    pub fn iterations(&self) -> usize {
        self.with_search.iterations
    }

    pub fn total_ms(&self) -> f64 {
        self.with_search.elapsed_ms()
    }

    pub fn no_find_ms(&self) -> f64 {
        self.without_search.elapsed_ms()
    }

    /// Search-only time over all iterations. May be negative under noise.
    pub fn corrected_ms(&self) -> f64 {
        self.total_ms() - self.no_find_ms()
    }

    pub fn time_per_find_ms(&self) -> f64 {
        self.corrected_ms() / self.iterations() as f64
    }

    /// Searches per second, if the corrected time is positive.
    pub fn throughput(&self) -> Option<f64> {
        let corrected = self.corrected_ms();
        (corrected > 0.0).then(|| self.iterations() as f64 / corrected * 1000.0)
    }
}

/// Runs the search run, then the generate-only run, and subtracts.
///
/// Debug readback applies to the search run only.
pub fn calibrate<B, P>(config: &HarnessConfig, placement: &mut P) -> TileSearchResult<Calibration>
where
    B: ComputeBackend,
    P: MarkerPlacement + ?Sized,
{
    let _span = trace_span!("calibrate", iterations = config.iterations).entered();
    let with_search = run_benchmark::<B, P>(config, RunMode::WithSearch, placement)?;
    let without_search = run_benchmark::<B, P>(config, RunMode::WithoutSearch, placement)?;
    let calibration = Calibration::new(with_search, without_search)?;

    let corrected = calibration.corrected_ms();
    trace_event!(
        "calibrated",
        total_ms = calibration.total_ms(),
        no_find_ms = calibration.no_find_ms(),
        corrected_ms = corrected
    );
    if corrected <= 0.0 {
        trace_warn!("non_positive_search_time", corrected_ms = corrected);
    }
    Ok(calibration)
}
