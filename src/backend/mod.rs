//! Compute backend abstraction.
//!
//! A backend owns one selected device and one in-order command stream on it.
//! Enqueue calls return as soon as the command is queued; execution order is
//! submission order, so consecutive stages need no extra synchronization.
//! Timing always comes from device-recorded event timestamps.

use crate::image::Cell;
use crate::util::TileSearchResult;
use std::fmt;

pub mod cpu;
mod native;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod source;
pub mod status;

pub use cpu::CpuBackend;
#[cfg(feature = "opencl")]
pub use opencl::OpenClBackend;
pub use source::{KernelPaths, KernelSet, KernelSource};

/// Access mode of a device buffer as seen by kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn kernel_can_write(self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }

    pub fn kernel_can_read(self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }
}

/// Class of device requested by a [`DeviceSelector`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceKind {
    #[default]
    Any,
    Cpu,
    Gpu,
    Accelerator,
}

impl DeviceKind {
    /// Returns true if a device of class `actual` satisfies this request.
    pub fn accepts(self, actual: DeviceKind) -> bool {
        self == DeviceKind::Any || self == actual
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Any => "any",
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::Accelerator => "accelerator",
        };
        f.write_str(name)
    }
}

/// Which device to open.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSelector {
    /// Required device class.
    pub kind: DeviceKind,
    /// Index among the matching devices; the first match when `None`.
    pub index: Option<usize>,
    /// Worker thread count for host-executed devices; `None` uses all cores.
    pub threads: Option<usize>,
}

impl DeviceSelector {
    pub fn kind(kind: DeviceKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "kind={} index={index}", self.kind),
            None => write!(f, "kind={}", self.kind),
        }
    }
}

/// Description of the opened device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: DeviceKind,
    pub compute_units: usize,
}

/// Device-side timestamps of one command, in nanoseconds.
///
/// `queued` is when the host submitted the command, `start` and `end` bracket
/// its execution. All three are read from the device clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventTimes {
    pub queued: u64,
    pub start: u64,
    pub end: u64,
}

impl EventTimes {
    /// Execution time of the command alone.
    pub fn execution(&self) -> TimingSample {
        TimingSample::new(self.start, self.end)
    }
}

/// A pair of device timestamps bracketing a unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingSample {
    pub start_ns: u64,
    pub end_ns: u64,
}

impl TimingSample {
    pub fn new(start_ns: u64, end_ns: u64) -> Self {
        Self { start_ns, end_ns }
    }

    /// Elapsed milliseconds; zero if the clock ran backwards.
    pub fn elapsed_ms(&self) -> f64 {
        self.end_ns.saturating_sub(self.start_ns) as f64 * 1.0e-6
    }
}

/// Argument passed to a kernel dispatch, in declaration order.
#[derive(Debug)]
pub enum KernelArg<'a, B> {
    Buffer(&'a B),
    Uint(u32),
}

/// An in-order compute stream on one device.
///
/// Buffers hold [`Cell`]s. Every `enqueue_*` call is asynchronous and returns
/// an event for the command; `read_buffer` and `wait` block the host.
pub trait ComputeBackend: Sized {
    type Buffer;
    type Kernel;
    type Event;
    /// Handle that holds a barrier closed until passed to [`release`](Self::release).
    type Gate;

    /// Enumerates devices and opens the one matching `selector`.
    fn open(selector: &DeviceSelector) -> TileSearchResult<Self>;

    /// Describes the opened device.
    fn device(&self) -> &DeviceInfo;

    /// Builds `entry` from `source` for the opened device.
    fn build_kernel(&mut self, source: &KernelSource, entry: &str)
        -> TileSearchResult<Self::Kernel>;

    /// Allocates a zero-initialized buffer of `len` cells.
    fn alloc(&mut self, len: usize, access: Access) -> TileSearchResult<Self::Buffer>;

    /// Sets every cell of `buffer` to `value`.
    fn enqueue_fill(&mut self, buffer: &mut Self::Buffer, value: Cell)
        -> TileSearchResult<Self::Event>;

    /// Writes a single cell.
    fn enqueue_write_point(
        &mut self,
        buffer: &mut Self::Buffer,
        index: usize,
        value: Cell,
    ) -> TileSearchResult<Self::Event>;

    /// Runs `kernel` over a 2-D index domain of `global` work-items.
    fn enqueue_dispatch(
        &mut self,
        kernel: &Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer>],
        global: [usize; 2],
    ) -> TileSearchResult<Self::Event>;

    /// Copies `buffer` into `out` once all earlier commands have finished.
    fn read_buffer(&mut self, buffer: &Self::Buffer, out: &mut [Cell]) -> TileSearchResult<()>;

    /// Enqueues a barrier that blocks every later command until released.
    fn enqueue_barrier(&mut self) -> TileSearchResult<(Self::Gate, Self::Event)>;

    /// Enqueues a marker that completes once all earlier commands have.
    fn enqueue_marker(&mut self) -> TileSearchResult<Self::Event>;

    /// Opens a barrier gate.
    fn release(&mut self, gate: Self::Gate) -> TileSearchResult<()>;

    /// Blocks until `event` has completed.
    fn wait(&mut self, event: &Self::Event) -> TileSearchResult<()>;

    /// Returns device timestamps for a completed event.
    fn event_times(&self, event: &Self::Event) -> TileSearchResult<EventTimes>;
}

/// Waits for `event` and returns its execution time in milliseconds.
pub fn event_elapsed_ms<B: ComputeBackend>(
    backend: &mut B,
    event: &B::Event,
) -> TileSearchResult<f64> {
    backend.wait(event)?;
    Ok(backend.event_times(event)?.execution().elapsed_ms())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_sample_converts_to_ms() {
        let sample = TimingSample::new(1_000_000, 3_500_000);
        assert!((sample.elapsed_ms() - 2.5).abs() < 1e-12);
        assert_eq!(TimingSample::new(5, 1).elapsed_ms(), 0.0);
    }

    #[test]
    fn device_kind_any_accepts_everything() {
        assert!(DeviceKind::Any.accepts(DeviceKind::Gpu));
        assert!(DeviceKind::Cpu.accepts(DeviceKind::Cpu));
        assert!(!DeviceKind::Gpu.accepts(DeviceKind::Cpu));
    }
}
