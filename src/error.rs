//! Fatal and recoverable error types for the acquisition pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while loading a [`crate::model::SystemModel`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid topology: PCDRM<->PCFM round trip failed for panel={panel} cartridge={cartridge} fin={fin} module={module}")]
    InvalidTopology {
        panel: usize,
        cartridge: usize,
        fin: usize,
        module: usize,
    },

    #[error("daqboard_id {0} out of range [0, 32)")]
    InvalidBackendAddress(u32),

    #[error("{path}: expected {expected} lines, found {found}")]
    LineCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("{path}:{line}: malformed column {column}: {text}")]
    MalformedColumn {
        path: PathBuf,
        line: usize,
        column: usize,
        text: String,
    },
}

/// Fatal errors raised while opening sockets or output files.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open socket for endpoint {endpoint}: {source}")]
    SocketOpen {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open raw output file {path}: {source}")]
    RawFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open decoded output file {path}: {source}")]
    DecodedFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open calibrated output file {path}: {source}")]
    CalibratedFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Recoverable packet-decode rejections. Every variant maps to one
/// [`crate::pipeline::ProcessInfo`] counter; never logged per-event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeReject {
    EmptyBytes,
    BadFraming,
    EmptyTrigger,
    BadSize,
    InvalidAddress,
}

/// Recoverable calibration rejections, one per [`crate::pipeline::ProcessInfo`] counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalReject {
    TopologyError,
    BelowThreshold,
    DoubleTrigger,
    OutOfBounds,
    InvalidCrystal,
    EnergyGate,
}
