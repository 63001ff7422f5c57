//! Error taxonomy shared across the tracer's components.
//!
//! Kernel-interface failures already carry errno via [`std::io::Error`]; this
//! module only adds the distinctions the rest of the tracer needs: setup
//! failures that should abort the tracer, capability degradations and
//! buffer corruption that should not.

use thiserror::Error;

/// A capability, tracepoint, or resource the tracer could not set up at startup.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("required kernel capability unavailable: {0}")]
    MissingCapability(String),
    #[error("tracepoint not found: {subsystem}/{name}")]
    UnknownTracepoint { subsystem: String, name: String },
    #[error("file descriptor budget exhausted: {0}")]
    FdBudgetExhausted(String),
}

/// Top-level error type surfaced to the fleet coordinator and, ultimately, to
/// the embedding binary.
#[derive(Debug, Error)]
pub enum TracerError {
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),
    #[error("capability degraded: {0}")]
    CapabilityDegraded(String),
    #[error("buffer corrupted: {0}")]
    BufferCorrupted(String),
    #[error("finalize failed: {0}")]
    Finalize(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TracerError>;
