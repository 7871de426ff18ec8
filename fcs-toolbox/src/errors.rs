use std::io;
use thiserror::Error as ThisError;

/// Errors raised while reading a PT3 file.
#[derive(ThisError, Debug)]
pub enum DecodeError {
    #[error("File {0} does not exist.")]
    FileNotAvailable(String),
    #[error("IO error.")]
    IOError(#[from] io::Error),
    #[error("Bad header field {field} at byte {offset}: {reason}")]
    BadHeader {
        field: &'static str,
        offset: u64,
        reason: String,
    },
    #[error("Expected {expected} records but only {found} are available (stopped at byte {offset})")]
    Truncated {
        expected: usize,
        found: usize,
        offset: u64,
    },
    #[error("{0}")]
    NotImplemented(String),
    /// Never returned by the reader. Unknown records are skipped and this
    /// variant is only used to log them.
    #[error("Record {record} has unknown channel {channel}, skipped")]
    UnknownChannel { record: usize, channel: u8 },
}

#[derive(ThisError, Debug, PartialEq)]
pub enum CorrelatorError {
    #[error("NcascStart ({start}) must not exceed NcascEnd ({end})")]
    InvalidCascadeConfig { start: usize, end: usize },
    #[error("Indicator matrix has {rows} rows but there are {events} photon times")]
    ShapeMismatch { rows: usize, events: usize },
    #[error("Photon times must be non-decreasing (index {0})")]
    UnsortedTimes(usize),
    #[error("Correlation cancelled after {0} cascade levels")]
    Cancelled(usize),
}

#[derive(ThisError, Debug, PartialEq)]
pub enum BinningError {
    #[error("Bin width must be a positive finite number, got {0}")]
    InvalidBinWidth(f64),
}

/// Errors raised by a full FCS analysis.
#[derive(ThisError, Debug, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Correlator(#[from] CorrelatorError),
    #[error(transparent)]
    Binning(#[from] BinningError),
    #[error("At least one channel must be selected for correlation")]
    NoChannels,
}

#[derive(ThisError, Debug)]
pub enum ConfigError {
    #[error("Could not read config file.")]
    IOError(#[from] io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Numerical caveats that do not stop a computation.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericWarning {
    /// The edge correction `dt / (dt - lag)` diverges for this lag. The value
    /// was kept without the correction.
    UnstableLag { index: usize, lag: f64, duration: f64 },
}

impl std::fmt::Display for NumericWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            NumericWarning::UnstableLag {
                index,
                lag,
                duration,
            } => write!(
                f,
                "lag #{} ({} ns) is too close to the acquisition length ({} ns), edge correction skipped",
                index, lag, duration
            ),
        }
    }
}
