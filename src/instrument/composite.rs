//! Composite actuators: one axis value driving several instrument parameters.
//!
//! Two flavours exist:
//!
//! - **Linked**: every member follows the axis on a straight line,
//!   `member = value * scale + offset`. [`link_axes`] derives scale and offset
//!   from ordinary axes so that all members reach their own `begin` and `end`
//!   together with the first (master) axis.
//! - **Parametric**: every member is fed through its own function of a virtual
//!   axis value, e.g. two phases of one sine drive. [`parametric_axis`] builds
//!   such an axis.

use super::{Actuator, InstrumentRegistry, ParameterActuator};
use crate::axis::{Axis, AxisBinding, Target};
use crate::error::{ParspaceError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Member mapping function of a parametric axis.
pub type MemberFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// One parameter of a linked axis.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedMember {
    /// Instrument name in the registry
    pub instrument: String,
    /// Parameter name on that instrument
    pub parameter: String,
    /// Member units per axis unit
    pub scale: f64,
    /// Member value at axis value zero
    pub offset: f64,
}

impl LinkedMember {
    /// Member value for an axis value.
    pub fn map(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// One parameter of a parametric axis.
#[derive(Clone)]
pub struct ParametricMember {
    /// Instrument name in the registry
    pub instrument: String,
    /// Parameter name on that instrument
    pub parameter: String,
    /// Maps the virtual axis value to the member value (axis units)
    pub function: MemberFn,
    /// Member axis units per instrument unit
    pub gain: f64,
}

impl ParametricMember {
    /// Instrument value for a virtual axis value.
    pub fn map(&self, value: f64) -> f64 {
        (self.function)(value) / self.gain
    }
}

impl fmt::Debug for ParametricMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametricMember")
            .field("instrument", &self.instrument)
            .field("parameter", &self.parameter)
            .field("gain", &self.gain)
            .finish_non_exhaustive()
    }
}

fn parameter_binding<'a>(axis: &'a Axis) -> Result<(&'a str, &'a str, f64)> {
    match axis.binding.as_ref() {
        Some(AxisBinding {
            target:
                Target::Parameter {
                    instrument,
                    parameter,
                },
            ..
        }) => Ok((instrument.as_str(), parameter.as_str(), axis_gain(axis)?)),
        _ => Err(ParspaceError::InvalidAxis {
            label: axis.label.clone(),
            reason: "composite members must be bound to a single instrument parameter".into(),
        }),
    }
}

fn axis_gain(axis: &Axis) -> Result<f64> {
    let gain = axis.binding.as_ref().map_or(1.0, AxisBinding::gain);
    if gain == 0.0 || !gain.is_finite() {
        return Err(ParspaceError::InvalidGain {
            label: axis.label.clone(),
            gain,
        });
    }
    Ok(gain)
}

/// Combine axes into one linked axis.
///
/// The first axis is the master: the combined axis takes its range, step,
/// unit, ramp, gain and hooks. Followers are mapped so that they sweep their
/// own range in step with the master. The actuator receives master instrument
/// values (axis value divided by the master gain).
pub fn link_axes(axes: &[Axis]) -> Result<Axis> {
    let master = axes.first().ok_or(ParspaceError::NoAxes)?;
    master.validate()?;
    let (instrument, parameter, master_gain) = parameter_binding(master)?;

    let master_span = master.end - master.begin;
    if master_span == 0.0 && axes.len() > 1 {
        return Err(ParspaceError::InvalidAxis {
            label: master.label.clone(),
            reason: "master axis of a linked axis needs a non-zero range".into(),
        });
    }

    let mut members = vec![LinkedMember {
        instrument: instrument.to_string(),
        parameter: parameter.to_string(),
        scale: 1.0,
        offset: 0.0,
    }];

    for follower in &axes[1..] {
        let (instrument, parameter, gain) = parameter_binding(follower)?;
        let span = follower.end - follower.begin;
        let mut scale = (span / master_span).abs() * master_gain / gain;
        if (follower.begin > follower.end) != (master.begin > master.end) {
            scale = -scale;
        }
        let offset = follower.begin / gain - scale * master.begin / master_gain;
        members.push(LinkedMember {
            instrument: instrument.to_string(),
            parameter: parameter.to_string(),
            scale,
            offset,
        });
    }

    let mut combined = master.clone();
    combined.label = axes
        .iter()
        .map(|axis| axis.label.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if let Some(binding) = combined.binding.as_mut() {
        binding.target = Target::Linked(members);
    }
    tracing::debug!(label = %combined.label, members = axes.len(), "Linked axes");
    Ok(combined)
}

/// Build a virtual axis whose value is mapped through `functions` onto the
/// parameters bound to `axes`.
///
/// The first axis provides range, step, unit, ramp and hooks; the combined
/// axis has gain 1.0. Each member keeps its own gain for the division of the
/// mapped value.
pub fn parametric_axis(
    label: impl Into<String>,
    axes: &[Axis],
    functions: Vec<MemberFn>,
) -> Result<Axis> {
    let label = label.into();
    let template = axes.first().ok_or(ParspaceError::NoAxes)?;
    if axes.len() != functions.len() {
        return Err(ParspaceError::InvalidAxis {
            label,
            reason: format!(
                "{} member axes but {} mapping functions",
                axes.len(),
                functions.len()
            ),
        });
    }

    let members = axes
        .iter()
        .zip(functions)
        .map(|(axis, function)| {
            let (instrument, parameter, gain) = parameter_binding(axis)?;
            Ok(ParametricMember {
                instrument: instrument.to_string(),
                parameter: parameter.to_string(),
                function,
                gain,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut combined = template.clone();
    combined.label = label;
    if let Some(binding) = combined.binding.as_mut() {
        binding.target = Target::Parametric(members);
        binding.gain = Some(1.0);
    }
    Ok(combined)
}

/// Actuator for [`Target::Linked`].
pub struct LinkedActuator {
    members: Vec<(ParameterActuator, LinkedMember)>,
}

impl LinkedActuator {
    /// Resolve member instruments.
    pub fn resolve(members: &[LinkedMember], registry: &InstrumentRegistry) -> Result<Self> {
        if members.is_empty() {
            return Err(ParspaceError::Config("linked target without members".into()));
        }
        let members = members
            .iter()
            .map(|member| {
                let instrument = registry.require(&member.instrument)?;
                Ok((
                    ParameterActuator::new(instrument, member.parameter.clone()),
                    member.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { members })
    }
}

#[async_trait]
impl Actuator for LinkedActuator {
    async fn set(&self, value: f64) -> anyhow::Result<()> {
        for (actuator, member) in &self.members {
            actuator.set(member.map(value)).await?;
        }
        Ok(())
    }

    async fn get(&self) -> anyhow::Result<f64> {
        let (actuator, member) = self
            .members
            .first()
            .ok_or_else(|| anyhow::anyhow!("linked actuator has no members"))?;
        let raw = actuator.get().await?;
        Ok((raw - member.offset) / member.scale)
    }

    async fn set_rate(&self, stepsize: f64, delay_ms: f64) -> anyhow::Result<()> {
        for (actuator, member) in &self.members {
            actuator
                .set_rate(stepsize * member.scale.abs(), delay_ms)
                .await?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.members.iter().map(|(a, _)| a.describe()).collect();
        format!("linked[{}]", names.join(", "))
    }
}

/// Actuator for [`Target::Parametric`].
pub struct ParametricActuator {
    members: Vec<(ParameterActuator, ParametricMember)>,
    current: AtomicU64,
}

impl ParametricActuator {
    /// Resolve member instruments.
    pub fn resolve(members: &[ParametricMember], registry: &InstrumentRegistry) -> Result<Self> {
        if members.is_empty() {
            return Err(ParspaceError::Config(
                "parametric target without members".into(),
            ));
        }
        let members = members
            .iter()
            .map(|member| {
                let instrument = registry.require(&member.instrument)?;
                Ok((
                    ParameterActuator::new(instrument, member.parameter.clone()),
                    member.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            members,
            current: AtomicU64::new(0f64.to_bits()),
        })
    }
}

#[async_trait]
impl Actuator for ParametricActuator {
    async fn set(&self, value: f64) -> anyhow::Result<()> {
        for (actuator, member) in &self.members {
            actuator.set(member.map(value)).await?;
        }
        self.current.store(value.to_bits(), Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self) -> anyhow::Result<f64> {
        Ok(f64::from_bits(self.current.load(Ordering::SeqCst)))
    }

    async fn set_rate(&self, stepsize: f64, delay_ms: f64) -> anyhow::Result<()> {
        // Member slopes vary along the curve, so no single member rate applies.
        tracing::debug!(
            stepsize,
            delay_ms,
            "Ignoring ramp rate on parametric actuator"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.members.iter().map(|(a, _)| a.describe()).collect();
        format!("parametric[{}]", names.join(", "))
    }
}
