//! Custom error types for the traversal engine.
//!
//! This module defines `ParspaceError`, the error type returned by every fallible
//! operation of the crate that is not an instrument capability call. Instrument,
//! actuator and measurand capabilities use `anyhow::Result` (they wrap arbitrary
//! driver failures); those errors enter this type through the `Instrument` variant.
//!
//! ## Error Categories
//!
//! 1. **Configuration Errors** - `UnknownStrategy`, `TooFewAxes`, `NoAxes`,
//!    `NoStrategy`, `InvalidAxis`, `TraversalTooLarge`, `InvalidGain`,
//!    `InstrumentNotFound`, `MissingRampMetadata`, `Config`
//!    - Raised eagerly when a strategy is bound, an estimate is checked, or a
//!      traversal is configured. They bubble to the caller unmodified.
//!
//! 2. **Per-axis Run Errors** - `ReadyTimeout`, `Instrument`
//!    - Raised while driving one axis. The controller logs and counts them and
//!      carries on with the next axis of the row.
//!
//! 3. **Run-terminating Errors** - `Aborted`, `Sink`, `Io`, and `Instrument`
//!    errors raised by a measurand read
//!    - End the `Running` state. Collected rows are flushed before returning.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, ParspaceError>;

/// Primary error type of the traversal engine.
#[derive(Error, Debug)]
pub enum ParspaceError {
    /// A traversal strategy name that is not one of `sweep`, `star`, `hilbert`.
    #[error("Unknown traversal strategy '{0}' (expected one of: sweep, star, hilbert)")]
    UnknownStrategy(String),

    /// The strategy needs more axes than the parameter space holds.
    #[error("Strategy '{strategy}' needs at least {required} axes, found {found}")]
    TooFewAxes {
        /// Strategy name
        strategy: &'static str,
        /// Minimum number of axes
        required: usize,
        /// Number of axes present
        found: usize,
    },

    /// Traverse was requested without any axis.
    #[error("Parameter space has no axes")]
    NoAxes,

    /// Traverse was requested before a strategy was bound.
    #[error("No traversal strategy selected")]
    NoStrategy,

    /// Axis range or step is unusable.
    #[error("Invalid axis '{label}': {reason}")]
    InvalidAxis {
        /// Axis label
        label: String,
        /// What is wrong with it
        reason: String,
    },

    /// The strategy would visit more points than can be counted.
    #[error("Strategy '{strategy}' is too large: {reason}")]
    TraversalTooLarge {
        /// Strategy name
        strategy: &'static str,
        /// Which bound was exceeded
        reason: String,
    },

    /// Unit gain of zero (or non-finite) would divide every setpoint by zero.
    #[error("Invalid gain {gain} on axis '{label}'")]
    InvalidGain {
        /// Axis label
        label: String,
        /// Offending gain
        gain: f64,
    },

    /// The time estimator needs ramp metadata for this axis.
    #[error("Axis '{label}' has no usable ramp stepsize/delay")]
    MissingRampMetadata {
        /// Axis label
        label: String,
    },

    /// No instrument with that name in the registry.
    #[error("Instrument '{0}' not found in registry")]
    InstrumentNotFound(String),

    /// A `ready_when` condition did not become true in time.
    #[error("Axis '{axis}': '{parameter}' did not reach {target} within {waited:?}")]
    ReadyTimeout {
        /// Axis label
        axis: String,
        /// Polled parameter
        parameter: String,
        /// Value waited for
        target: f64,
        /// Time spent polling
        waited: Duration,
    },

    /// The run was interrupted through its abort handle.
    #[error("Traversal aborted")]
    Aborted,

    /// Error raised by an instrument, actuator or measurand.
    #[error("Instrument error: {0}")]
    Instrument(#[from] anyhow::Error),

    /// Data sink failure.
    #[error("Data sink error: {0}")]
    Sink(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ParspaceError {
    /// True for errors that must be fixed before a traversal can run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ParspaceError::UnknownStrategy(_)
                | ParspaceError::TooFewAxes { .. }
                | ParspaceError::NoAxes
                | ParspaceError::NoStrategy
                | ParspaceError::InvalidAxis { .. }
                | ParspaceError::TraversalTooLarge { .. }
                | ParspaceError::InvalidGain { .. }
                | ParspaceError::MissingRampMetadata { .. }
                | ParspaceError::InstrumentNotFound(_)
                | ParspaceError::Config(_)
        )
    }
}

impl From<figment::Error> for ParspaceError {
    fn from(value: figment::Error) -> Self {
        ParspaceError::Config(value.to_string())
    }
}
