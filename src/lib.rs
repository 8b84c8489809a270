//! Tilesearch is a tiled, data-parallel marker search with a calibrated
//! device timing harness.
//!
//! An image is partitioned into fixed-size tiles; each tile is scanned
//! independently for the single marker cell and reports a hit in its own
//! output cell. The harness measures the search over many generated images
//! on an in-order compute stream and subtracts a generate-only run to
//! isolate search cost. Devices sit behind [`ComputeBackend`]: a
//! rayon-backed [`CpuBackend`] is always available, and an OpenCL backend
//! is provided with the `opencl` feature.

pub mod backend;
pub mod harness;
pub mod image;
pub mod output;
pub mod stage;
pub mod tile;
mod trace;
pub mod util;

pub use backend::{
    Access, ComputeBackend, CpuBackend, DeviceInfo, DeviceKind, DeviceSelector, EventTimes,
    KernelPaths, KernelSet, KernelSource, TimingSample,
};
#[cfg(feature = "opencl")]
pub use backend::OpenClBackend;
pub use harness::{
    calibrate, run_benchmark, verify_detection, Calibration, HarnessConfig, RunMode, RunReport,
    TimingOrigin,
};
pub use image::{
    Cell, FixedPlacement, Image, ImageView, MarkerPlacement, Position, RandomPlacement,
    BACKGROUND, MARKER,
};
pub use output::{OutputGrid, FOUND};
pub use stage::{evaluate_tile, search_image, Generator, Search};
pub use tile::{TileCoord, TileGrid, TileRect};
pub use util::{ErrorKind, TileSearchError, TileSearchResult};
