//! Instrumentation for benchmark runs.
//!
//! Spans: `benchmark_run` (mode, iterations) wraps one timed run, with
//! `setup` nested around device open and kernel builds; `calibrate` wraps
//! the paired runs; `verify_detection` wraps a position sweep. Backends open
//! `device_select` and `kernel_build` (entry).
//!
//! Events: `run_complete` (mode, elapsed_ms), `debug_readback` (hits),
//! `calibrated` (total_ms, no_find_ms, corrected_ms), `device_opened`
//! (device), `verified` (checked, failures), `misdetection` (x, y, hits). Warnings: `non_positive_search_time` (corrected_ms) and
//! `gate_release_failed`.
//!
//! All of this compiles away unless the `tracing` feature is enabled.

/// Info span; enter it with `.entered()` for the phase's scope.
#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name $(, $($field)*)?)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        $crate::trace::NoopSpan
    };
}

/// Info event with `key = value` fields, or a bare name.
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(name: $name, $($key = $value),+)
    };
    ($name:expr) => {
        tracing::info!(name: $name)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
    ($name:expr) => {};
}

/// Warn event, e.g. a calibration whose search time came out non-positive.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::warn!(name: $name, $($key = $value),+)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
}

pub(crate) use trace_event;
pub(crate) use trace_span;
pub(crate) use trace_warn;

/// Span guard returned by `trace_span!` when tracing is compiled out.
#[cfg(not(feature = "tracing"))]
pub struct NoopSpan;

#[cfg(not(feature = "tracing"))]
impl NoopSpan {
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}
