//! Error types for tilesearch.

use std::fmt;
use thiserror::Error;

/// Result alias for tilesearch operations.
pub type TileSearchResult<T> = std::result::Result<T, TileSearchError>;

/// Errors that can occur while partitioning, searching or benchmarking.
///
/// Every variant is terminal for a benchmark run; nothing in the crate
/// retries. Status codes follow OpenCL numbering (see [`crate::backend::status`]).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TileSearchError {
    /// An image or chip dimension is not a positive integer.
    #[error("{name} ({value}) must be an integer > 0")]
    InvalidDimension { name: &'static str, value: i64 },
    /// The iteration count is zero.
    #[error("iteration count must be at least 1")]
    InvalidIterations,
    /// A command-line or configuration value could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A marker placement fell outside the image.
    #[error("marker position ({x}, {y}) is outside the {width}x{height} image")]
    MarkerOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    /// Two runs used for calibration do not share the same configuration.
    #[error("calibration runs differ: {0}")]
    MismatchedRuns(&'static str),
    /// No device matched the requested selector.
    #[error("no compute device found matching {selector}")]
    NoDeviceFound { selector: String },
    /// Device or platform enumeration failed.
    #[error("environment error in {op} ({code})")]
    Environment { op: &'static str, code: i32 },
    /// A kernel source file could not be read.
    #[error("cannot read kernel source {path}: {reason}")]
    KernelSourceIo { path: String, reason: String },
    /// A kernel program failed to build for the selected device.
    #[error("error in kernel {kernel}:\n{log}")]
    Compile { kernel: String, log: String },
    /// Any other backend call failed.
    #[error("backend error in {op} ({code})")]
    Backend { op: &'static str, code: i32 },
}

/// Coarse error taxonomy used for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Environment,
    Compile,
    Backend,
}

impl TileSearchError {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDimension { .. }
            | Self::InvalidIterations
            | Self::InvalidArgument(_)
            | Self::MarkerOutOfBounds { .. }
            | Self::MismatchedRuns(_) => ErrorKind::Configuration,
            Self::NoDeviceFound { .. } | Self::Environment { .. } | Self::KernelSourceIo { .. } => {
                ErrorKind::Environment
            }
            Self::Compile { .. } => ErrorKind::Compile,
            Self::Backend { .. } => ErrorKind::Backend,
        }
    }

    pub(crate) fn backend(op: &'static str, code: i32) -> Self {
        Self::Backend { op, code }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Environment => "environment error",
            ErrorKind::Compile => "compile error",
            ErrorKind::Backend => "backend error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, TileSearchError};

    #[test]
    fn kinds_follow_taxonomy() {
        let err = TileSearchError::InvalidDimension {
            name: "chip width",
            value: 0,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "chip width (0) must be an integer > 0");

        let err = TileSearchError::Compile {
            kernel: "find_image".into(),
            log: "line 3: syntax error".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(err.to_string().contains("line 3: syntax error"));

        assert_eq!(
            TileSearchError::backend("enqueue_fill", -5).kind(),
            ErrorKind::Backend
        );
    }
}
