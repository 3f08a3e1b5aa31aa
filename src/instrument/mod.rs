//! Instrument capabilities and the instrument registry.
//!
//! Instrument drivers live outside this crate. The traversal engine only needs
//! three things from an instrument: set a named parameter, read a named
//! parameter, and (optionally) accept a ramp-rate limit for a parameter. Those
//! are the methods of the [`Instrument`] trait.
//!
//! Axes never hold instruments directly. A binding names an instrument, and the
//! controller resolves that name through an [`InstrumentRegistry`] into an
//! [`Actuator`]: the per-axis capability the run loop drives.
//!
//! - [`ParameterActuator`] - one parameter of one instrument
//! - [`composite::LinkedActuator`] - several parameters on a linear relation
//! - [`composite::ParametricActuator`] - several parameters through functions
//!
//! # Example
//!
//! ```rust
//! use parspace::axis::Target;
//! use parspace::instrument::{InstrumentRegistry, mock::MockSource};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mut registry = InstrumentRegistry::new();
//! registry.register(Arc::new(MockSource::new("dsgen1")));
//!
//! let target = Target::Parameter {
//!     instrument: "dsgen1".into(),
//!     parameter: "amplitude".into(),
//! };
//! let actuator = registry.actuator(&target).unwrap();
//! actuator.set(0.5).await.unwrap();
//! assert_eq!(actuator.get().await.unwrap(), 0.5);
//! # });
//! ```

use crate::axis::Target;
use crate::error::{ParspaceError, Result};
use anyhow::bail;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod composite;
pub mod mock;

use composite::{LinkedActuator, ParametricActuator};

/// Capability: named-parameter access to an instrument.
///
/// # Contract
/// - Values are in instrument units (the controller divides axis values by the
///   binding gain before calling `set`)
/// - `set` returns once the instrument accepted the value; rate-limited
///   instruments may ramp before returning
/// - All methods take `&self`; drivers use interior mutability for state
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Set `parameter` to `value`.
    async fn set(&self, parameter: &str, value: f64) -> anyhow::Result<()>;

    /// Read `parameter`.
    async fn get(&self, parameter: &str) -> anyhow::Result<f64>;

    /// Limit how fast `parameter` may change: `stepsize` per `delay_ms`.
    ///
    /// # Default Implementation
    /// Returns an error indicating rate limiting is not supported.
    async fn set_parameter_rate(
        &self,
        parameter: &str,
        stepsize: f64,
        delay_ms: f64,
    ) -> anyhow::Result<()> {
        let _ = (stepsize, delay_ms);
        bail!(
            "Instrument '{}' does not support rate limiting of '{}'",
            self.name(),
            parameter
        )
    }
}

/// Capability: the thing an axis drives.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Drive to `value` (instrument units).
    async fn set(&self, value: f64) -> anyhow::Result<()>;

    /// Current value (instrument units).
    async fn get(&self) -> anyhow::Result<f64>;

    /// Push a ramp-rate limit down to the instrument(s).
    async fn set_rate(&self, stepsize: f64, delay_ms: f64) -> anyhow::Result<()>;

    /// Short description for logs, e.g. `dsgen1.amplitude`.
    fn describe(&self) -> String;
}

/// One parameter of one instrument.
pub struct ParameterActuator {
    instrument: Arc<dyn Instrument>,
    parameter: String,
}

impl ParameterActuator {
    /// Wrap `parameter` of `instrument`.
    pub fn new(instrument: Arc<dyn Instrument>, parameter: impl Into<String>) -> Self {
        Self {
            instrument,
            parameter: parameter.into(),
        }
    }

    /// The instrument behind this actuator.
    pub fn instrument(&self) -> &Arc<dyn Instrument> {
        &self.instrument
    }
}

#[async_trait]
impl Actuator for ParameterActuator {
    async fn set(&self, value: f64) -> anyhow::Result<()> {
        self.instrument.set(&self.parameter, value).await
    }

    async fn get(&self) -> anyhow::Result<f64> {
        self.instrument.get(&self.parameter).await
    }

    async fn set_rate(&self, stepsize: f64, delay_ms: f64) -> anyhow::Result<()> {
        self.instrument
            .set_parameter_rate(&self.parameter, stepsize, delay_ms)
            .await
    }

    fn describe(&self) -> String {
        format!("{}.{}", self.instrument.name(), self.parameter)
    }
}

/// Lookup of instruments by name.
///
/// Instruments are shared (`Arc`); the registry does not own their lifecycle
/// beyond keeping them reachable.
#[derive(Default, Clone)]
pub struct InstrumentRegistry {
    instruments: HashMap<String, Arc<dyn Instrument>>,
}

impl InstrumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instrument` under its own name, replacing any previous entry.
    pub fn register(&mut self, instrument: Arc<dyn Instrument>) {
        let name = instrument.name().to_string();
        if self.instruments.insert(name.clone(), instrument).is_some() {
            tracing::warn!(instrument = %name, "Replaced previously registered instrument");
        }
    }

    /// Look up an instrument.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Instrument>> {
        self.instruments.get(name).cloned()
    }

    /// Look up an instrument or fail with `InstrumentNotFound`.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Instrument>> {
        self.get(name)
            .ok_or_else(|| ParspaceError::InstrumentNotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instruments.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Build the actuator for a binding target.
    pub fn actuator(&self, target: &Target) -> Result<Arc<dyn Actuator>> {
        match target {
            Target::Parameter {
                instrument,
                parameter,
            } => Ok(Arc::new(ParameterActuator::new(
                self.require(instrument)?,
                parameter.clone(),
            ))),
            Target::Linked(members) => Ok(Arc::new(LinkedActuator::resolve(members, self)?)),
            Target::Parametric(members) => {
                Ok(Arc::new(ParametricActuator::resolve(members, self)?))
            }
        }
    }
}

impl std::fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("instruments", &self.names())
            .finish()
    }
}
