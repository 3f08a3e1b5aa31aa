//! Measurands: the quantities recorded at every visited coordinate.
//!
//! A [`Measurand`] pairs display metadata with a [`Readable`] source. Sources
//! are usually closures over an instrument handle or a parameter of an
//! instrument in the registry, but anything implementing [`Readable`] works.
//! A source may produce several channels per read (e.g. X and Y of a lock-in);
//! each channel becomes one value column.

use crate::instrument::Instrument;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Capability: Scalar (or small vector) readout
///
/// # Contract
/// - `read()` performs one measurement and returns its value
/// - `read_channels()` returns exactly `channels()` values
/// - Units are the measurand's (document them through `Measurand::unit`)
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read the primary value.
    async fn read(&self) -> Result<f64>;

    /// Read every channel.
    ///
    /// # Default Implementation
    /// One channel, `read()`.
    async fn read_channels(&self) -> Result<Vec<f64>> {
        Ok(vec![self.read().await?])
    }

    /// Number of values `read_channels()` returns.
    fn channels(&self) -> usize {
        1
    }
}

type ReadFuture = Pin<Box<dyn Future<Output = Result<f64>> + Send>>;

/// Readable backed by an async closure.
pub struct FnReadable {
    read: Box<dyn Fn() -> ReadFuture + Send + Sync>,
}

impl FnReadable {
    /// Wrap `f`, called once per read.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<f64>> + Send + 'static,
    {
        Self {
            read: Box::new(move || Box::pin(f())),
        }
    }
}

#[async_trait]
impl Readable for FnReadable {
    async fn read(&self) -> Result<f64> {
        (self.read)().await
    }
}

/// Readable that reads a named parameter of an instrument.
pub struct ParameterReadable {
    instrument: Arc<dyn Instrument>,
    parameter: String,
}

impl ParameterReadable {
    /// Read `parameter` of `instrument`.
    pub fn new(instrument: Arc<dyn Instrument>, parameter: impl Into<String>) -> Self {
        Self {
            instrument,
            parameter: parameter.into(),
        }
    }
}

#[async_trait]
impl Readable for ParameterReadable {
    async fn read(&self) -> Result<f64> {
        self.instrument.get(&self.parameter).await
    }
}

/// A recorded quantity.
#[derive(Clone)]
pub struct Measurand {
    /// Display label
    pub label: String,
    /// Display unit
    pub unit: String,
    /// Where values come from
    pub source: Arc<dyn Readable>,
    /// Settling delay before each read
    pub measure_wait: Option<Duration>,
}

impl Measurand {
    /// Measurand reading from `source`.
    pub fn new(label: impl Into<String>, source: Arc<dyn Readable>) -> Self {
        Self {
            label: label.into(),
            unit: crate::axis::DEFAULT_UNIT.to_string(),
            source,
            measure_wait: None,
        }
    }

    /// Measurand backed by an async closure.
    pub fn from_fn<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<f64>> + Send + 'static,
    {
        Self::new(label, Arc::new(FnReadable::new(f)))
    }

    /// Measurand reading `parameter` of `instrument`.
    pub fn from_parameter(
        label: impl Into<String>,
        instrument: Arc<dyn Instrument>,
        parameter: impl Into<String>,
    ) -> Self {
        Self::new(label, Arc::new(ParameterReadable::new(instrument, parameter)))
    }

    /// Set the display unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Wait `wait` before each read.
    pub fn with_measure_wait(mut self, wait: Duration) -> Self {
        self.measure_wait = Some(wait);
        self
    }

    /// Value column names: `"label (unit)"`, then `"label[i] (unit)"` for
    /// further channels.
    pub fn column_labels(&self) -> Vec<String> {
        (0..self.source.channels().max(1))
            .map(|i| match i {
                0 => format!("{} ({})", self.label, self.unit),
                _ => format!("{}[{}] ({})", self.label, i, self.unit),
            })
            .collect()
    }

    /// Read every channel, checking the channel count.
    pub async fn read(&self) -> Result<Vec<f64>> {
        let values = self.source.read_channels().await?;
        let expected = self.source.channels().max(1);
        if values.len() != expected {
            anyhow::bail!(
                "Measurand '{}' returned {} values, expected {}",
                self.label,
                values.len(),
                expected
            );
        }
        Ok(values)
    }
}

impl fmt::Debug for Measurand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measurand")
            .field("label", &self.label)
            .field("unit", &self.unit)
            .field("channels", &self.source.channels())
            .field("measure_wait", &self.measure_wait)
            .finish()
    }
}
