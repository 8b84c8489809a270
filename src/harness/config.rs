//! Harness configuration.

use crate::backend::{DeviceSelector, KernelSet};
use crate::tile::TileGrid;
use crate::util::{TileSearchError, TileSearchResult};

/// Iterations per run when the command line does not give a count.
pub const DEFAULT_ITERATIONS: usize = 100;

/// Which barrier timestamp a run is measured from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimingOrigin {
    /// When the barrier command was submitted to the stream.
    BarrierEnqueue,
    /// When the barrier was released and the queued work began to drain.
    #[default]
    BarrierRelease,
}

impl TimingOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            TimingOrigin::BarrierEnqueue => "enqueue",
            TimingOrigin::BarrierRelease => "release",
        }
    }
}

/// Settings shared by both runs of a calibration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Image size and tile partition.
    pub grid: TileGrid,
    /// Generator (and search) dispatches per run.
    pub iterations: usize,
    /// Read back and report the output grid after the search run.
    pub debug: bool,
    /// Where kernel programs come from.
    pub kernels: KernelSet,
    /// Device to open for each run.
    pub device: DeviceSelector,
    pub timing_origin: TimingOrigin,
}

impl HarnessConfig {
    pub fn new(grid: TileGrid) -> Self {
        Self {
            grid,
            iterations: DEFAULT_ITERATIONS,
            debug: false,
            kernels: KernelSet::default(),
            device: DeviceSelector::default(),
            timing_origin: TimingOrigin::default(),
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_kernels(mut self, kernels: KernelSet) -> Self {
        self.kernels = kernels;
        self
    }

    pub fn with_device(mut self, device: DeviceSelector) -> Self {
        self.device = device;
        self
    }

    pub fn with_timing_origin(mut self, origin: TimingOrigin) -> Self {
        self.timing_origin = origin;
        self
    }

    /// Rejects settings no run can execute.
    pub fn validate(&self) -> TileSearchResult<()> {
        if self.iterations == 0 {
            return Err(TileSearchError::InvalidIterations);
        }
        if self.device.threads == Some(0) {
            return Err(TileSearchError::InvalidArgument(
                "thread count must be > 0".into(),
            ));
        }
        Ok(())
    }
}
