//! # Parspace
//!
//! Parameter-space traversal for laboratory measurement automation. A
//! measurement is described as a set of axes (swept instrument parameters), a
//! set of measurands (quantities recorded at every point) and a traversal
//! strategy; the [`space::ParameterSpace`] controller walks the space, drives
//! the instruments and streams rows into a data sink.
//!
//! ## Crate Structure
//!
//! - **`axis`**: `Axis` ranges, ramp rates and instrument bindings (gain,
//!   post-call hooks, readiness conditions, set policy).
//! - **`instrument`**: The `Instrument` capability trait, the
//!   `InstrumentRegistry`, linked and parametric composite actuators and a
//!   simulated `MockSource`.
//! - **`measurand`**: Recorded quantities backed by closures or instrument
//!   parameters.
//! - **`traversal`**: Coordinate generators: nested sweep with optional
//!   sweepback, star sweep and a Hilbert curve over the two innermost axes.
//! - **`estimate`**: Pre-flight run-time prediction from ramp metadata.
//! - **`sink`**: The `DataSink` and `LivePlot` traits, an in-memory sink and a
//!   tab-separated `.dat` file sink (`storage_csv` feature).
//! - **`space`**: The `ParameterSpace` controller and its abort handle.
//! - **`sync`**: Post-run sync script launcher.
//! - **`config`**: Figment-based `Settings` (TOML file plus `PARSPACE_*`
//!   environment variables).
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: The crate-wide `ParspaceError`.

pub mod axis;
pub mod config;
pub mod error;
pub mod estimate;
pub mod instrument;
pub mod logging;
pub mod measurand;
pub mod sink;
pub mod space;
pub mod sync;
pub mod traversal;

/// Commonly used types.
pub mod prelude {
    pub use crate::axis::{
        Axis, AxisBinding, AxisLine, PostCall, RampRate, ReadyWhen, SetPolicy, Target,
    };
    pub use crate::config::Settings;
    pub use crate::error::{ParspaceError, Result};
    pub use crate::estimate::{estimate, EstimatorConfig, TimeEstimate};
    pub use crate::instrument::composite::{link_axes, parametric_axis, MemberFn};
    pub use crate::instrument::mock::MockSource;
    pub use crate::instrument::{Actuator, Instrument, InstrumentRegistry};
    pub use crate::measurand::{Measurand, Readable};
    #[cfg(feature = "storage_csv")]
    pub use crate::sink::DatFileSink;
    pub use crate::sink::{DataSink, LivePlot, MemoryRecord, MemorySink, RunInfo, RunMetadata};
    pub use crate::space::{
        AbortHandle, AxisId, ControllerState, ParameterSpace, RunOutcome, RunReport,
    };
    pub use crate::traversal::{Coordinate, Coordinates, Strategy, TraversalOptions};
}
