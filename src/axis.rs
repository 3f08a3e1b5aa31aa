//! Axis definitions.
//!
//! An [`Axis`] is one independent dimension of a parameter space: an inclusive
//! range walked with a fixed step, optional ramp-rate metadata of the instrument
//! behind it, and an optional [`AxisBinding`] telling the controller what to
//! drive when the traversal visits a coordinate.
//!
//! Axes are plain data. Nothing here talks to hardware; bindings only name
//! instruments, which the controller resolves through an
//! [`InstrumentRegistry`](crate::instrument::InstrumentRegistry) when a run starts.
//!
//! # Example
//!
//! ```rust
//! use parspace::axis::{Axis, AxisBinding, RampRate, SetPolicy};
//!
//! let field = Axis::new("B", -1.0, 1.0, 0.01)
//!     .with_unit("T")
//!     .with_ramp(RampRate::new(0.001, 50.0))
//!     .with_binding(AxisBinding::parameter("magnet", "field").with_policy(SetPolicy::OncePerBlock));
//!
//! assert_eq!(field.steps(), 200);
//! assert_eq!(field.values().len(), 201);
//! ```

use crate::error::{ParspaceError, Result};
use crate::instrument::composite::{LinkedMember, ParametricMember};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Relative tolerance used when turning a span/step quotient into a step count.
const STEP_TOLERANCE: f64 = 1e-9;

/// Unit used when none is given.
pub const DEFAULT_UNIT: &str = "a.u.";

/// Largest number of points a single axis may have.
///
/// [`Axis::validate`] rejects finer steps with [`ParspaceError::InvalidAxis`].
pub const MAX_AXIS_POINTS: usize = 10_000_000;

/// Physical ramp constraint of the instrument behind an axis.
///
/// The instrument may change its output by at most `stepsize` per `delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampRate {
    /// Largest increment per delay interval, in axis units
    pub stepsize: f64,
    /// Delay between increments in milliseconds
    pub delay_ms: f64,
}

impl RampRate {
    /// Create a ramp constraint.
    pub fn new(stepsize: f64, delay_ms: f64) -> Self {
        Self { stepsize, delay_ms }
    }

    /// Both fields finite, step positive and delay non-negative.
    pub fn is_usable(&self) -> bool {
        self.stepsize.is_finite()
            && self.stepsize > 0.0
            && self.delay_ms.is_finite()
            && self.delay_ms >= 0.0
    }
}

/// When the controller drives an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetPolicy {
    /// Set on every visited coordinate
    #[default]
    Always,
    /// Set only on the first coordinate of each block, skipped otherwise
    OncePerBlock,
}

/// Action run after every successful set of an axis.
#[derive(Clone)]
pub enum PostCall {
    /// Arbitrary callback receiving the instrument value (after gain division)
    Hook(Arc<dyn Fn(f64) -> anyhow::Result<()> + Send + Sync>),
    /// Set another parameter of the axis's primary instrument
    Set {
        /// Parameter to set
        parameter: String,
        /// Value to write
        value: f64,
    },
}

impl PostCall {
    /// Wrap a closure as a post-call hook.
    pub fn hook<F>(f: F) -> Self
    where
        F: Fn(f64) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        PostCall::Hook(Arc::new(f))
    }

    /// Set `parameter` to `value` after every set.
    pub fn set(parameter: impl Into<String>, value: f64) -> Self {
        PostCall::Set {
            parameter: parameter.into(),
            value,
        }
    }
}

impl fmt::Debug for PostCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostCall::Hook(_) => write!(f, "PostCall::Hook(..)"),
            PostCall::Set { parameter, value } => {
                write!(f, "PostCall::Set({parameter} = {value})")
            }
        }
    }
}

/// Blocking readiness condition polled after every set.
///
/// The controller reads `parameter` from the axis's primary instrument until it
/// equals `value` (within `tolerance`). `poll_interval` and `timeout` fall back
/// to the run settings when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyWhen {
    /// Parameter to poll
    pub parameter: String,
    /// Value that signals readiness
    pub value: f64,
    /// Accepted absolute deviation
    pub tolerance: f64,
    /// Sleep between polls
    pub poll_interval: Option<Duration>,
    /// Give up after this long
    pub timeout: Option<Duration>,
}

impl ReadyWhen {
    /// Wait until `parameter` reads exactly `value`.
    pub fn new(parameter: impl Into<String>, value: f64) -> Self {
        Self {
            parameter: parameter.into(),
            value,
            tolerance: 0.0,
            poll_interval: None,
            timeout: None,
        }
    }

    /// Accept readings within `tolerance` of the target.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Override the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether a reading satisfies the condition.
    pub fn is_met(&self, reading: f64) -> bool {
        (reading - self.value).abs() <= self.tolerance
    }
}

/// What an axis drives.
#[derive(Debug, Clone)]
pub enum Target {
    /// A single instrument parameter
    Parameter {
        /// Instrument name in the registry
        instrument: String,
        /// Parameter name on that instrument
        parameter: String,
    },
    /// Several parameters moved together on a linear relation
    Linked(Vec<LinkedMember>),
    /// Several parameters each fed through its own function of the axis value
    Parametric(Vec<ParametricMember>),
}

impl Target {
    /// Name of the instrument that hooks and readiness polls address.
    pub fn primary_instrument(&self) -> Option<&str> {
        match self {
            Target::Parameter { instrument, .. } => Some(instrument),
            Target::Linked(members) => members.first().map(|m| m.instrument.as_str()),
            Target::Parametric(members) => members.first().map(|m| m.instrument.as_str()),
        }
    }
}

/// Instrument binding of an axis.
#[derive(Debug, Clone)]
pub struct AxisBinding {
    /// What gets driven
    pub target: Target,
    /// Axis units per instrument unit; instrument value = axis value / gain
    pub gain: Option<f64>,
    /// Action after each set
    pub post_call: Option<PostCall>,
    /// Readiness condition polled after each set
    pub ready_when: Option<ReadyWhen>,
    /// When to set
    pub set_policy: SetPolicy,
}

impl AxisBinding {
    /// Bind to `parameter` of the instrument registered as `instrument`.
    pub fn parameter(instrument: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::new(Target::Parameter {
            instrument: instrument.into(),
            parameter: parameter.into(),
        })
    }

    /// Bind to an arbitrary target.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            gain: None,
            post_call: None,
            ready_when: None,
            set_policy: SetPolicy::Always,
        }
    }

    /// Set the unit gain.
    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = Some(gain);
        self
    }

    /// Run `post_call` after each set.
    pub fn with_post_call(mut self, post_call: PostCall) -> Self {
        self.post_call = Some(post_call);
        self
    }

    /// Poll a readiness condition after each set.
    pub fn with_ready_when(mut self, ready_when: ReadyWhen) -> Self {
        self.ready_when = Some(ready_when);
        self
    }

    /// Choose the set policy.
    pub fn with_policy(mut self, policy: SetPolicy) -> Self {
        self.set_policy = policy;
        self
    }

    /// Gain with the documented default of 1.0.
    pub fn gain(&self) -> f64 {
        self.gain.unwrap_or(1.0)
    }
}

/// One sweep dimension.
#[derive(Debug, Clone)]
pub struct Axis {
    /// Display label
    pub label: String,
    /// Display unit
    pub unit: String,
    /// First value (inclusive)
    pub begin: f64,
    /// Last value (inclusive); may be below `begin`
    pub end: f64,
    /// Step; only its magnitude matters
    pub stepsize: f64,
    /// Ramp constraint of the bound instrument
    pub ramp: Option<RampRate>,
    /// What to drive; `None` records coordinates without driving anything
    pub binding: Option<AxisBinding>,
}

impl Axis {
    /// Create an unbound axis from `begin` to `end`.
    pub fn new(label: impl Into<String>, begin: f64, end: f64, stepsize: f64) -> Self {
        Self {
            label: label.into(),
            unit: DEFAULT_UNIT.to_string(),
            begin,
            end,
            stepsize,
            ramp: None,
            binding: None,
        }
    }

    /// Set the display unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Attach ramp metadata.
    pub fn with_ramp(mut self, ramp: RampRate) -> Self {
        self.ramp = Some(ramp);
        self
    }

    /// Attach an instrument binding.
    pub fn with_binding(mut self, binding: AxisBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// `"label (unit)"`, the column name used in data files.
    pub fn label_with_unit(&self) -> String {
        format!("{} ({})", self.label, self.unit)
    }

    /// `|end - begin|`.
    pub fn span(&self) -> f64 {
        (self.end - self.begin).abs()
    }

    /// Reject axes the generators cannot walk.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ParspaceError::InvalidAxis {
            label: self.label.clone(),
            reason: reason.to_string(),
        };
        if !self.begin.is_finite() || !self.end.is_finite() {
            return Err(invalid("begin and end must be finite"));
        }
        if !self.stepsize.is_finite() {
            return Err(invalid("stepsize must be finite"));
        }
        if self.stepsize == 0.0 {
            return Err(invalid("stepsize must be non-zero"));
        }
        if self.points() > MAX_AXIS_POINTS {
            return Err(invalid(&format!(
                "{} points exceed the limit of {MAX_AXIS_POINTS}",
                self.points()
            )));
        }
        Ok(())
    }

    /// Number of steps, `ceil(|end - begin| / |stepsize|)`.
    ///
    /// Quotients within a relative 1e-9 of an integer count as that integer.
    /// Returns 0 for an invalid stepsize.
    pub fn steps(&self) -> usize {
        steps_for(self.span(), self.stepsize)
    }

    /// Number of visited values, `steps() + 1`, saturating.
    pub fn points(&self) -> usize {
        self.steps().saturating_add(1)
    }

    /// Index-addressed view of the values, computed on demand.
    pub fn line(&self) -> AxisLine {
        AxisLine {
            begin: self.begin,
            end: self.end,
            steps: self.steps(),
        }
    }

    /// Inclusive linspace from `begin` to `end`; both endpoints exact.
    pub fn values(&self) -> Vec<f64> {
        self.line().iter().collect()
    }
}

/// The values of an axis without materialising them.
///
/// Value `i` is `begin + i * (end - begin) / steps`; the last one is `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLine {
    begin: f64,
    end: f64,
    steps: usize,
}

impl AxisLine {
    /// Number of values.
    pub fn len(&self) -> usize {
        self.steps.saturating_add(1)
    }

    /// Always false; a line holds at least `begin`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value at `index`, clamped to `end` past the last step.
    pub fn get(&self, index: usize) -> f64 {
        if index >= self.steps {
            return if self.steps == 0 { self.begin } else { self.end };
        }
        let delta = (self.end - self.begin) / self.steps as f64;
        self.begin + delta * index as f64
    }

    /// Values in order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

pub(crate) fn steps_for(span: f64, stepsize: f64) -> usize {
    let step = stepsize.abs();
    if step == 0.0 || !step.is_finite() || !span.is_finite() {
        return 0;
    }
    let ratio = span / step;
    let nearest = ratio.round();
    if (ratio - nearest).abs() <= STEP_TOLERANCE * nearest.max(1.0) {
        nearest as usize
    } else {
        ratio.ceil() as usize
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_and_endpoints() {
        let axis = Axis::new("x", 0.0, 10.0, 1.0);
        assert_eq!(axis.steps(), 10);
        let values = axis.values();
        assert_eq!(values.len(), 11);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[10], 10.0);
    }

    #[test]
    fn test_descending_axis_with_signed_step() {
        // Sign of the step is irrelevant; direction comes from begin/end.
        let axis = Axis::new("x", 2.0, -1.0, 0.5);
        let negative = Axis::new("x", 2.0, -1.0, -0.5);
        assert_eq!(axis.values(), negative.values());
        assert_eq!(axis.values(), vec![2.0, 1.5, 1.0, 0.5, 0.0, -0.5, -1.0]);
    }

    #[test]
    fn test_non_dividing_step_keeps_endpoint() {
        let axis = Axis::new("x", 0.0, 1.0, 0.3);
        assert_eq!(axis.steps(), 4);
        let values = axis.values();
        assert_eq!(values.len(), 5);
        assert_eq!(*values.last().unwrap(), 1.0);
        for pair in values.windows(2) {
            assert!((pair[1] - pair[0] - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_floating_quotient_rounds_to_nearest_integer() {
        // (0.5 - 0.2) / 0.1 = 2.9999999999999996 in binary floating point
        let axis = Axis::new("x", 0.2, 0.5, 0.1);
        assert_eq!(axis.steps(), 3);
        // 0.7 / 0.1 = 6.999999999999999
        assert_eq!(Axis::new("x", 0.0, 0.7, 0.1).steps(), 7);
    }

    #[test]
    fn test_zero_span_is_single_point() {
        let axis = Axis::new("x", 3.0, 3.0, 0.1);
        assert_eq!(axis.steps(), 0);
        assert_eq!(axis.values(), vec![3.0]);
    }

    #[test]
    fn test_validate() {
        assert!(Axis::new("x", 0.0, 1.0, 0.1).validate().is_ok());
        assert!(matches!(
            Axis::new("x", 0.0, 1.0, 0.0).validate(),
            Err(ParspaceError::InvalidAxis { .. })
        ));
        assert!(Axis::new("x", f64::NAN, 1.0, 0.1).validate().is_err());
        assert!(Axis::new("x", 0.0, 1.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_tiny_step_is_rejected_without_allocating() {
        let axis = Axis::new("x", 0.0, 1.0, 1e-300);
        assert_eq!(axis.points(), usize::MAX);
        match axis.validate() {
            Err(ParspaceError::InvalidAxis { reason, .. }) => assert!(reason.contains("limit")),
            other => panic!("unexpected {other:?}"),
        }

        let line = axis.line();
        assert_eq!(line.get(0), 0.0);
        assert_eq!(line.get(usize::MAX), 1.0);
        assert!(Axis::new("x", 0.0, 1.0, 1e-6).validate().is_ok());
    }

    #[test]
    fn test_line_matches_values() {
        let axis = Axis::new("x", 1.0, -0.5, 0.25);
        let line = axis.line();
        assert_eq!(line.len(), 7);
        assert_eq!(line.iter().collect::<Vec<_>>(), axis.values());
        assert_eq!(line.get(6), -0.5);
        assert_eq!(Axis::new("x", 2.0, 2.0, 1.0).line().get(5), 2.0);
    }

    #[test]
    fn test_binding_defaults() {
        let binding = AxisBinding::parameter("dsgen1", "amplitude");
        assert_eq!(binding.gain(), 1.0);
        assert_eq!(binding.set_policy, SetPolicy::Always);
        assert_eq!(binding.target.primary_instrument(), Some("dsgen1"));
    }

    #[test]
    fn test_ready_when_tolerance() {
        let ready = ReadyWhen::new("status", 1.0).with_tolerance(0.01);
        assert!(ready.is_met(1.005));
        assert!(!ready.is_met(1.02));
        assert!(ReadyWhen::new("status", 2.0).is_met(2.0));
    }

    #[test]
    fn test_label_with_unit() {
        let axis = Axis::new("Vg", 0.0, 1.0, 0.1).with_unit("V");
        assert_eq!(axis.label_with_unit(), "Vg (V)");
        assert_eq!(Axis::new("t", 0.0, 1.0, 0.1).label_with_unit(), "t (a.u.)");
    }
}
