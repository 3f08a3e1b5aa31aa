//! Mock Instrument Implementation
//!
//! Provides a simulated signal source for testing traversals without physical
//! hardware. All waiting uses `tokio::time::sleep`.
//!
//! `MockSource` behaves like a dummy signal generator with any number of named
//! parameters:
//!
//! - Unknown parameters read as `0.0` until set
//! - With a ramp rate configured, `set` walks to the target in increments of
//!   the rate stepsize, sleeping the rate delay between increments
//! - Reads can be scripted per parameter (consumed in order, then the stored
//!   value is returned again)
//! - Sets of chosen parameters can be made to fail
//! - Optional uniform read noise
//!
//! Every accepted `set` is appended to a history for assertions.

use super::Instrument;
use crate::axis::RampRate;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

#[derive(Default)]
struct MockState {
    values: HashMap<String, f64>,
    rates: HashMap<String, RampRate>,
    scripted: HashMap<String, VecDeque<f64>>,
    failing: HashSet<String>,
    history: Vec<(String, f64)>,
}

/// Simulated multi-parameter signal source.
///
/// # Example
///
/// ```rust
/// use parspace::instrument::{Instrument, mock::MockSource};
///
/// # tokio_test::block_on(async {
/// let source = MockSource::new("dsgen1");
/// source.set("frequency", 1e3).await.unwrap();
/// assert_eq!(source.get("frequency").await.unwrap(), 1e3);
/// assert_eq!(source.history().await, vec![("frequency".to_string(), 1e3)]);
/// # });
/// ```
pub struct MockSource {
    name: String,
    noise: f64,
    state: Mutex<MockState>,
}

impl MockSource {
    /// Create a noiseless source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            noise: 0.0,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add uniform noise of +/- `amplitude` to every read of a stored value.
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise = amplitude.abs();
        self
    }

    /// Queue readings returned by `get(parameter)` before the stored value.
    pub async fn script_reads(&self, parameter: &str, readings: impl IntoIterator<Item = f64>) {
        let mut state = self.state.lock().await;
        state
            .scripted
            .entry(parameter.to_string())
            .or_default()
            .extend(readings);
    }

    /// Make every future `set(parameter, ..)` fail.
    pub async fn fail_on_set(&self, parameter: &str) {
        self.state.lock().await.failing.insert(parameter.to_string());
    }

    /// Undo [`fail_on_set`](Self::fail_on_set).
    pub async fn clear_failures(&self) {
        self.state.lock().await.failing.clear();
    }

    /// Stored value of `parameter`, if it was ever set.
    pub async fn value(&self, parameter: &str) -> Option<f64> {
        self.state.lock().await.values.get(parameter).copied()
    }

    /// Ramp rate configured for `parameter`.
    pub async fn rate(&self, parameter: &str) -> Option<RampRate> {
        self.state.lock().await.rates.get(parameter).copied()
    }

    /// All accepted sets in order.
    pub async fn history(&self) -> Vec<(String, f64)> {
        self.state.lock().await.history.clone()
    }

    /// Accepted sets of one parameter in order.
    pub async fn history_of(&self, parameter: &str) -> Vec<f64> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|(name, _)| name == parameter)
            .map(|(_, value)| *value)
            .collect()
    }

    async fn ramp_to(&self, parameter: &str, target: f64, rate: RampRate) {
        let start = self.value(parameter).await.unwrap_or(0.0);
        let distance = target - start;
        let increments = (distance.abs() / rate.stepsize).ceil() as usize;
        for i in 1..increments {
            let intermediate = start + distance.signum() * rate.stepsize * i as f64;
            if rate.delay_ms > 0.0 {
                sleep(Duration::from_secs_f64(rate.delay_ms / 1e3)).await;
            }
            self.state
                .lock()
                .await
                .values
                .insert(parameter.to_string(), intermediate);
        }
        if increments > 0 && rate.delay_ms > 0.0 {
            sleep(Duration::from_secs_f64(rate.delay_ms / 1e3)).await;
        }
    }
}

#[async_trait]
impl Instrument for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set(&self, parameter: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(anyhow!(
                "{}: refusing non-finite value for '{}'",
                self.name,
                parameter
            ));
        }
        let rate = {
            let state = self.state.lock().await;
            if state.failing.contains(parameter) {
                return Err(anyhow!("{}: set of '{}' failed", self.name, parameter));
            }
            state.rates.get(parameter).copied()
        };

        if let Some(rate) = rate {
            self.ramp_to(parameter, value, rate).await;
        }

        let mut state = self.state.lock().await;
        state.values.insert(parameter.to_string(), value);
        state.history.push((parameter.to_string(), value));
        tracing::trace!(instrument = %self.name, parameter, value, "Mock set");
        Ok(())
    }

    async fn get(&self, parameter: &str) -> Result<f64> {
        let mut state = self.state.lock().await;
        if let Some(reading) = state
            .scripted
            .get_mut(parameter)
            .and_then(VecDeque::pop_front)
        {
            return Ok(reading);
        }
        let value = state.values.get(parameter).copied().unwrap_or(0.0);
        if self.noise > 0.0 {
            let jitter = rand::thread_rng().gen_range(-self.noise..=self.noise);
            return Ok(value + jitter);
        }
        Ok(value)
    }

    async fn set_parameter_rate(&self, parameter: &str, stepsize: f64, delay_ms: f64) -> Result<()> {
        let rate = RampRate::new(stepsize.abs(), delay_ms);
        if !rate.is_usable() {
            return Err(anyhow!(
                "{}: unusable ramp rate {} per {} ms for '{}'",
                self.name,
                stepsize,
                delay_ms,
                parameter
            ));
        }
        self.state
            .lock()
            .await
            .rates
            .insert(parameter.to_string(), rate);
        Ok(())
    }
}
