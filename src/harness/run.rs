//! One timed benchmark run.
//!
//! A run arms a barrier on an in-order stream, enqueues every iteration
//! behind it, drops a marker after the last one and only then releases the
//! barrier. Host enqueue overhead therefore never lands inside the measured
//! interval; the elapsed time is read from device timestamps alone.

use crate::backend::{event_elapsed_ms, Access, ComputeBackend, DeviceInfo, TimingSample};
use crate::harness::config::{HarnessConfig, TimingOrigin};
use crate::image::{Cell, Image, MarkerPlacement, Position, BACKGROUND};
use crate::output::OutputGrid;
use crate::stage::{Generator, Search};
use crate::trace::{trace_event, trace_span};
use crate::util::TileSearchResult;
use std::fmt;

/// Whether a run includes the Search Stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    WithSearch,
    WithoutSearch,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::WithSearch => "with_search",
            RunMode::WithoutSearch => "without_search",
        }
    }

    pub fn searches(self) -> bool {
        self == RunMode::WithSearch
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device state read back after the final iteration of a search run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugDump {
    pub image: Image,
    pub output: OutputGrid,
    pub last_marker: Position,
}

impl DebugDump {
    /// Number of tiles that reported the marker.
    pub fn hit_count(&self) -> usize {
        self.output.hit_count()
    }
}

/// Outcome of one run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub mode: RunMode,
    pub device: DeviceInfo,
    pub iterations: usize,
    /// Device timestamps bounding the measured interval.
    pub timing: TimingSample,
    /// Execution time of the final generator dispatch.
    pub last_generate_ms: Option<f64>,
    /// Execution time of the final search dispatch; `None` without search.
    pub last_search_ms: Option<f64>,
    /// Present only for a search run with debug enabled.
    pub debug: Option<DebugDump>,
}

impl RunReport {
    pub fn elapsed_ms(&self) -> f64 {
        self.timing.elapsed_ms()
    }
}

/// Executes one run on a freshly opened device.
///
/// Everything allocated in setup is owned by this call and released on
/// return, including on error paths.
pub fn run_benchmark<B, P>(
    config: &HarnessConfig,
    mode: RunMode,
    placement: &mut P,
) -> TileSearchResult<RunReport>
where
    B: ComputeBackend,
    P: MarkerPlacement + ?Sized,
{
    config.validate()?;
    let _span = trace_span!(
        "benchmark_run",
        mode = mode.as_str(),
        iterations = config.iterations
    )
    .entered();
    let grid = config.grid;

    let (mut backend, generator, search, mut image, output) = {
        let _setup = trace_span!("setup").entered();
        let (generator_src, search_src) = config.kernels.load()?;
        let mut backend = B::open(&config.device)?;
        let generator = Generator::build(
            &mut backend,
            &generator_src,
            grid.image_width(),
            grid.image_height(),
        )?;
        let search = Search::build(&mut backend, &search_src, grid)?;
        let image = backend.alloc(grid.image_len(), Access::ReadWrite)?;
        let output = backend.alloc(grid.tile_count(), Access::WriteOnly)?;
        (backend, generator, search, image, output)
    };

    let (gate, barrier) = backend.enqueue_barrier()?;

    let mut last_marker = Position::default();
    let mut last_generate = None;
    let mut last_search = None;
    for _ in 0..config.iterations {
        let (pos, event) = generator.enqueue(&mut backend, &mut image, placement)?;
        last_marker = pos;
        last_generate = Some(event);
        if mode.searches() {
            last_search = Some(search.enqueue(&mut backend, &image, &output)?);
        }
    }

    let marker = backend.enqueue_marker()?;
    backend.release(gate)?;
    backend.wait(&marker)?;

    let barrier_times = backend.event_times(&barrier)?;
    let marker_times = backend.event_times(&marker)?;
    let origin = match config.timing_origin {
        TimingOrigin::BarrierEnqueue => barrier_times.queued,
        TimingOrigin::BarrierRelease => barrier_times.end,
    };
    let timing = TimingSample::new(origin, marker_times.end);

    let last_generate_ms = match &last_generate {
        Some(event) => Some(event_elapsed_ms(&mut backend, event)?),
        None => None,
    };
    let last_search_ms = match &last_search {
        Some(event) => Some(event_elapsed_ms(&mut backend, event)?),
        None => None,
    };

    let debug = if config.debug && mode.searches() {
        let mut image_cells = vec![BACKGROUND; grid.image_len()];
        backend.read_buffer(&image, &mut image_cells)?;
        let mut output_cells: Vec<Cell> = vec![BACKGROUND; grid.tile_count()];
        backend.read_buffer(&output, &mut output_cells)?;
        let dump = DebugDump {
            image: Image::from_cells(image_cells, grid.image_width(), grid.image_height())?,
            output: OutputGrid::from_cells(&grid, output_cells)?,
            last_marker,
        };
        trace_event!("debug_readback", hits = dump.hit_count());
        Some(dump)
    } else {
        None
    };

    let report = RunReport {
        mode,
        device: backend.device().clone(),
        iterations: config.iterations,
        timing,
        last_generate_ms,
        last_search_ms,
        debug,
    };
    trace_event!(
        "run_complete",
        mode = mode.as_str(),
        elapsed_ms = report.elapsed_ms()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CpuBackend, KernelSet};
    use crate::image::FixedPlacement;
    use crate::tile::{TileCoord, TileGrid};

    fn config(debug: bool) -> HarnessConfig {
        let grid = TileGrid::new(8, 8, 4, 4).unwrap();
        HarnessConfig::new(grid)
            .with_iterations(3)
            .with_debug(debug)
            .with_kernels(KernelSet::Builtin)
    }

    #[test]
    fn search_run_reads_back_last_iteration() {
        let mut placement = FixedPlacement::new(vec![
            Position::new(0, 0),
            Position::new(7, 7),
            Position::new(5, 1),
        ]);
        let report =
            run_benchmark::<CpuBackend, _>(&config(true), RunMode::WithSearch, &mut placement)
                .unwrap();
        let dump = report.debug.expect("debug dump");
        assert_eq!(dump.last_marker, Position::new(5, 1));
        assert_eq!(dump.image.markers(), vec![Position::new(5, 1)]);
        assert_eq!(dump.output.hits(), vec![TileCoord::new(1, 0)]);
        assert_eq!(report.iterations, 3);
        assert!(report.timing.end_ns >= report.timing.start_ns);
    }

    #[test]
    fn search_run_profiles_last_dispatches() {
        let mut placement = FixedPlacement::at(Position::new(2, 6));
        let report =
            run_benchmark::<CpuBackend, _>(&config(false), RunMode::WithSearch, &mut placement)
                .unwrap();
        let search_ms = report.last_search_ms.expect("search dispatch timed");
        let generate_ms = report.last_generate_ms.expect("generator dispatch timed");
        assert!(search_ms.is_finite() && search_ms >= 0.0);
        assert!(generate_ms.is_finite() && generate_ms >= 0.0);
    }

    #[test]
    fn no_search_run_never_dumps() {
        let mut placement = FixedPlacement::at(Position::new(1, 1));
        let report =
            run_benchmark::<CpuBackend, _>(&config(true), RunMode::WithoutSearch, &mut placement)
                .unwrap();
        assert!(report.debug.is_none());
        assert!(report.last_search_ms.is_none());
        assert!(report.last_generate_ms.is_some());
        assert_eq!(report.mode, RunMode::WithoutSearch);
    }

    #[test]
    fn placement_outside_image_aborts_run() {
        let mut placement = FixedPlacement::at(Position::new(8, 0));
        let err =
            run_benchmark::<CpuBackend, _>(&config(false), RunMode::WithSearch, &mut placement)
                .unwrap_err();
        assert_eq!(err.kind(), crate::util::ErrorKind::Configuration);
    }
}
