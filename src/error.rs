use thiserror::Error;

use crate::math::Float;

/// Errors reported by the body system and its serialization routines.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Storage for the requested capacity could not be allocated.
    #[error("out of memory while resizing body storage")]
    OutOfMemory,
    /// The system was never initialized or has been destroyed (capacity 0).
    #[error("body system is unusable: capacity is zero")]
    CapacityUnusable,
    #[error("body index {index} is out of range for {count} bodies")]
    IndexOutOfRange { index: usize, count: usize },
    /// A serialized system or body ended early or had a bad record.
    #[error("malformed stream: {0}")]
    MalformedStream(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("body mass {mass} and radius {radius} must both be positive")]
    InvalidBody { mass: Float, radius: Float },
    #[error("time step {0} must be positive and finite")]
    InvalidTimeStep(Float),
    #[error("invalid randomization settings: {0}")]
    InvalidSettings(&'static str),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors raised while loading or saving a [`SimulationConfig`](crate::config::SimulationConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::collections::TryReserveError> for SystemError {
    fn from(_: std::collections::TryReserveError) -> Self {
        SystemError::OutOfMemory
    }
}
