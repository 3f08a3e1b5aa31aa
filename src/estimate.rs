//! Pre-flight run-time estimation from ramp-rate physics.
//!
//! Every step of an axis costs the ramp increments the instrument needs to
//! cover it plus a fixed software-loop overhead:
//!
//! ```text
//! increments     = floor(|stepsize| / ramp.stepsize)   (minus one if exact)
//! delay_per_step = (increments * ramp.delay_ms + overhead_ms) / 1000
//! self_time      = steps * delay_per_step
//! ```
//!
//! When the axis step is smaller than the ramp step the ramp delay does not
//! apply and only the overhead remains. Nested sweeps combine axes with
//! `T(i) = self_time(i) + visits(i) * T(i + 1)` where `visits = steps + 1`
//! with sweepback and `2 * (steps + 1) - 1` without.
//!
//! Axes without usable ramp metadata are flagged instead of failing the
//! estimate; [`TimeEstimate::check`] turns a flag into an error.

use crate::axis::{steps_for, Axis, RampRate};
use crate::error::{ParspaceError, Result};
use crate::traversal::Strategy;
use std::fmt;
use std::time::Duration;

/// Column header of the per-axis report.
pub const COLUMN_SPECS: &str = "Label       sweep time (s)  steps    range        speed";

/// Default software overhead per step in milliseconds.
pub const DEFAULT_OVERHEAD_MS: f64 = 4.0;

/// Estimator tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Fixed cost of one loop iteration in milliseconds
    pub overhead_ms: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            overhead_ms: DEFAULT_OVERHEAD_MS,
        }
    }
}

/// Per-axis estimate line.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisEstimate {
    /// Axis label
    pub label: String,
    /// Axis unit
    pub unit: String,
    /// Time of one pass over the axis in seconds
    pub self_time: f64,
    /// Seconds per step
    pub delay_per_step: f64,
    /// Steps per pass
    pub steps: usize,
    /// `|end - begin|`
    pub range: f64,
    /// Units per second
    pub speed: f64,
    /// Why this axis was not estimated
    pub issue: Option<String>,
}

impl fmt::Display for AxisEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(issue) = &self.issue {
            return write!(f, "{:<12} {}", self.label, issue);
        }
        write!(
            f,
            "{:<12} {:<12}  {:<8} {:<7} {} {:>7} {}/s",
            self.label,
            general(self.self_time, 3),
            self.steps,
            format!("{:?}", self.range),
            self.unit,
            general(self.speed, 6),
            self.unit
        )
    }
}

/// Result of [`estimate`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEstimate {
    /// Total predicted seconds
    pub seconds: f64,
    /// One line per axis, in axis order
    pub axes: Vec<AxisEstimate>,
}

impl TimeEstimate {
    /// Predicted duration.
    pub fn total(&self) -> Duration {
        Duration::try_from_secs_f64(self.seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Whole seconds split into `(days, hours, minutes, seconds)`.
    pub fn breakdown(&self) -> (u64, u64, u64, u64) {
        let total = self.seconds.max(0.0) as u64;
        let (minutes, seconds) = (total / 60, total % 60);
        let (hours, minutes) = (minutes / 60, minutes % 60);
        let (days, hours) = (hours / 24, hours % 24);
        (days, hours, minutes, seconds)
    }

    /// Labels of axes that could not be estimated.
    pub fn flagged(&self) -> Vec<&str> {
        self.axes
            .iter()
            .filter(|axis| axis.issue.is_some())
            .map(|axis| axis.label.as_str())
            .collect()
    }

    /// Fail on the first flagged axis.
    pub fn check(&self) -> Result<()> {
        match self.axes.iter().find(|axis| axis.issue.is_some()) {
            Some(axis) => Err(ParspaceError::MissingRampMetadata {
                label: axis.label.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for TimeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{COLUMN_SPECS}")?;
        for axis in &self.axes {
            writeln!(f, "{axis}")?;
        }
        let (days, hours, minutes, seconds) = self.breakdown();
        write!(
            f,
            "Total estimated time: {days}d {hours}h {minutes}m {seconds}s"
        )
    }
}

/// Seconds per step of size `stepsize` under `ramp`.
pub fn delay_per_step(stepsize: f64, ramp: &RampRate, config: &EstimatorConfig) -> f64 {
    let step = stepsize.abs();
    let delay_ms = if step < ramp.stepsize { 0.0 } else { ramp.delay_ms };
    let mut increments = (step / ramp.stepsize).floor();
    if step % ramp.stepsize == 0.0 {
        increments -= 1.0;
    }
    let increments = increments.max(0.0);
    1e-3 * (increments * delay_ms + config.overhead_ms)
}

fn axis_estimate(axis: &Axis, stepsize: f64, config: &EstimatorConfig) -> AxisEstimate {
    let range = axis.span();
    let steps = steps_for(range, stepsize);
    let mut line = AxisEstimate {
        label: axis.label.clone(),
        unit: axis.unit.clone(),
        self_time: 0.0,
        delay_per_step: 0.0,
        steps,
        range,
        speed: 0.0,
        issue: None,
    };
    match axis.ramp.filter(RampRate::is_usable) {
        Some(ramp) if stepsize != 0.0 && stepsize.is_finite() => {
            let delay = delay_per_step(stepsize, &ramp, config);
            line.delay_per_step = delay;
            line.self_time = steps as f64 * delay;
            line.speed = if delay > 0.0 {
                stepsize.abs() / delay
            } else {
                f64::INFINITY
            };
        }
        Some(_) => line.issue = Some("unusable stepsize, not estimated".to_string()),
        None => {
            line.issue = Some("no ramp stepsize/delay, not estimated".to_string());
        }
    }
    line
}

/// `T(i) = self_time(i) + visits(i) * T(i + 1)`, innermost-to-outermost.
fn nested_total(lines: &[AxisEstimate], inner_time: f64, sweepback: bool) -> f64 {
    lines.iter().rev().fold(inner_time, |lower, line| {
        let mut visits = line.steps as f64 + 1.0;
        if !sweepback {
            visits = 2.0 * visits - 1.0;
        }
        line.self_time + visits * lower
    })
}

/// Predict the duration of traversing `axes` with `strategy`.
///
/// Never fails; axes lacking ramp metadata are flagged and contribute no
/// self-time.
pub fn estimate(axes: &[Axis], strategy: &Strategy, config: &EstimatorConfig) -> TimeEstimate {
    match *strategy {
        Strategy::Sweep { sweepback } => {
            let lines: Vec<AxisEstimate> = axes
                .iter()
                .map(|axis| axis_estimate(axis, axis.stepsize, config))
                .collect();
            let seconds = match lines.split_last() {
                Some((innermost, outer)) => nested_total(outer, innermost.self_time, sweepback),
                None => 0.0,
            };
            TimeEstimate {
                seconds,
                axes: lines,
            }
        }
        Strategy::Star => {
            let lines: Vec<AxisEstimate> = axes
                .iter()
                .map(|axis| axis_estimate(axis, axis.stepsize, config))
                .collect();
            let seconds = lines.iter().map(|line| line.self_time).sum();
            TimeEstimate {
                seconds,
                axes: lines,
            }
        }
        Strategy::Hilbert { n, sweepback } => {
            if axes.len() < 2 {
                return TimeEstimate {
                    seconds: 0.0,
                    axes: axes
                        .iter()
                        .map(|axis| axis_estimate(axis, axis.stepsize, config))
                        .collect(),
                };
            }
            let (lead, plane) = axes.split_at(axes.len() - 2);
            let cells_per_side = f64::from(2u32.saturating_pow(n));
            let moves = (4f64.powi(n as i32) - 1.0) / 2.0;

            let mut lines: Vec<AxisEstimate> = lead
                .iter()
                .map(|axis| axis_estimate(axis, axis.stepsize, config))
                .collect();
            let mut curve_time = 0.0;
            for axis in plane {
                let cell = axis.span() / cells_per_side;
                let mut line = axis_estimate(axis, cell, config);
                if line.issue.is_none() {
                    curve_time += moves * line.delay_per_step;
                }
                // cell moves along this axis over the whole curve
                line.steps = moves as usize;
                line.self_time = moves * line.delay_per_step;
                lines.push(line);
            }
            let seconds = nested_total(&lines[..lead.len()], curve_time, sweepback);
            TimeEstimate {
                seconds,
                axes: lines,
            }
        }
    }
}

/// `printf`-style `%g`: `significant` digits, trailing zeros dropped, exponent
/// form outside `[1e-4, 10^significant)`.
fn general(value: f64, significant: usize) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".into()
        } else if value > 0.0 {
            "inf".into()
        } else {
            "-inf".into()
        };
    }
    if value == 0.0 {
        return "0".into();
    }
    let significant = significant.max(1);
    let rounded = format!("{:.*e}", significant - 1, value);
    let (mantissa, exponent) = rounded.split_once('e').unwrap_or((&rounded, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= significant as i32 {
        let mantissa = trim_zeros(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        let decimals = (significant as i32 - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
