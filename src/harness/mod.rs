//! Timing harness: calibrated benchmark runs over a compute backend.

pub mod calibrate;
pub mod config;
pub mod run;
pub mod verify;

pub use calibrate::{calibrate, Calibration};
pub use config::{HarnessConfig, TimingOrigin, DEFAULT_ITERATIONS};
pub use run::{run_benchmark, DebugDump, RunMode, RunReport};
pub use verify::{all_positions, verify_detection, Misdetection, VerifyReport};
