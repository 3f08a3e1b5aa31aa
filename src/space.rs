//! ParameterSpace - controller for one measurement over a set of axes
//!
//! A `ParameterSpace` owns axes, measurands and a traversal strategy. Every
//! call to [`ParameterSpace::traverse`] performs one full pass and produces one
//! data set; the object is reused between passes.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ traverse() ┌─────────────┐      ┌─────────┐
//! │ Idle │───────────▶│ Configuring │─────▶│ Running │
//! └──────┘            └──────┬──────┘      └────┬────┘
//!    ▲                       │ config error     │
//!    │◀──────────────────────┘                  ▼
//!    │                        ┌───────────┬─────────┬────────┐
//!    │                        │ Completed │ Aborted │ Failed │
//!    │                        └─────┬─────┴────┬────┴───┬────┘
//!    │          cleanup: close, metadata, sync, report   │
//!    └──────────────────────────────────────────────────┘
//! ```
//!
//! Per-axis failures inside `Running` are logged and counted; the row is still
//! measured and written. A failing measurand, a failing sink or a panic ends
//! the run as `Failed`; the abort handle ends it as `Aborted`. Cleanup runs on
//! every one of those paths.
//!
//! # Usage
//!
//! ```rust
//! use parspace::prelude::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let source = Arc::new(MockSource::new("dsgen1"));
//! let mut registry = InstrumentRegistry::new();
//! registry.register(source.clone());
//!
//! let mut space = ParameterSpace::new("amplitude_sweep", registry);
//! space.add_axis(
//!     Axis::new("A", 0.0, 1.0, 0.5)
//!         .with_unit("V")
//!         .with_binding(AxisBinding::parameter("dsgen1", "amplitude")),
//! );
//! space.add_measurand(Measurand::from_parameter("readback", source, "amplitude"));
//! space.set_strategy_by_name("sweep", TraversalOptions::default()).unwrap();
//!
//! let mut sink = MemorySink::new();
//! let report = space.traverse(&mut sink, &mut []).await.unwrap();
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert_eq!(sink.snapshot().rows[2], vec![1.0, 1.0]);
//! # });
//! ```

use crate::axis::{Axis, PostCall, ReadyWhen, SetPolicy};
use crate::config::Settings;
use crate::error::{ParspaceError, Result};
use crate::estimate::{estimate, TimeEstimate};
use crate::instrument::{Actuator, Instrument, InstrumentRegistry};
use crate::measurand::Measurand;
use crate::sink::{DataSink, LivePlot, RunInfo};
use crate::sync;
use crate::traversal::{Coordinates, Strategy, TraversalOptions};
use chrono::Local;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Ready for `traverse`
    Idle,
    /// Resolving bindings and pushing ramp rates
    Configuring,
    /// Walking the coordinate stream
    Running,
    /// Last run visited every coordinate
    Completed,
    /// Last run was stopped through the abort handle
    Aborted,
    /// Last run hit an unrecoverable error
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Configuring => write!(f, "configuring"),
            ControllerState::Running => write!(f, "running"),
            ControllerState::Completed => write!(f, "completed"),
            ControllerState::Aborted => write!(f, "aborted"),
            ControllerState::Failed => write!(f, "failed"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every coordinate was visited
    Completed,
    /// Stopped through the abort handle
    Aborted,
    /// Stopped by an error or panic
    Failed(String),
}

impl RunOutcome {
    /// Matching terminal controller state.
    pub fn state(&self) -> ControllerState {
        match self {
            RunOutcome::Completed => ControllerState::Completed,
            RunOutcome::Aborted => ControllerState::Aborted,
            RunOutcome::Failed(_) => ControllerState::Failed,
        }
    }
}

/// Summary of one `traverse` call.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Unique run id
    pub run_uid: Uuid,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Rows written to the sink
    pub rows: usize,
    /// Block boundaries written to the sink
    pub blocks: usize,
    /// Logged per-axis failures
    pub axis_errors: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// Pre-flight estimate
    pub predicted: TimeEstimate,
    /// Data location reported by the sink
    pub location: Option<PathBuf>,
}

/// Shared flag that stops a running traversal.
///
/// Checked before every row; readiness polls, the measurand settle delay and
/// the per-point yield are cut short when it is raised.
#[derive(Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    reason: Arc<RwLock<Option<String>>>,
    notify: Arc<Notify>,
}

impl AbortHandle {
    /// Create an untriggered handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the run to stop.
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Traversal abort requested");
        if let Ok(mut guard) = self.reason.write() {
            *guard = Some(reason);
        }
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once an abort has been requested.
    pub async fn aborted(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    /// Reason given to the last `abort`.
    pub fn reason(&self) -> Option<String> {
        self.reason.read().ok().and_then(|guard| guard.clone())
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.reason.write() {
            *guard = None;
        }
    }

    /// Abort on Ctrl-C. Drop or abort the returned task to stop listening.
    pub fn abort_on_ctrl_c(&self) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => handle.abort("keyboard interrupt"),
                Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
            }
        })
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Handle returned by [`ParameterSpace::add_axis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxisId(u64);

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis#{}", self.0)
    }
}

/// Resolved binding of one axis.
struct AxisDriver {
    actuator: Arc<dyn Actuator>,
    primary: Option<Arc<dyn Instrument>>,
    gain: f64,
    post_call: Option<PostCall>,
    ready_when: Option<ReadyWhen>,
    policy: SetPolicy,
}

#[derive(Debug, Default)]
struct Progress {
    rows: usize,
    blocks: usize,
    axis_errors: usize,
}

/// Controller for a multi-axis measurement.
pub struct ParameterSpace {
    name: String,
    user: Option<String>,
    registry: InstrumentRegistry,
    settings: Settings,
    axes: Vec<(AxisId, Axis)>,
    next_axis: u64,
    measurands: Vec<Measurand>,
    strategy: Option<Strategy>,
    abort: AbortHandle,
    state: watch::Sender<ControllerState>,
    last_outcome: Option<ControllerState>,
}

impl ParameterSpace {
    /// Create an empty parameter space with default settings.
    pub fn new(name: impl Into<String>, registry: InstrumentRegistry) -> Self {
        let (state, _) = watch::channel(ControllerState::Idle);
        Self {
            name: name.into(),
            user: None,
            registry,
            settings: Settings::default(),
            axes: Vec::new(),
            next_axis: 0,
            measurands: Vec::new(),
            strategy: None,
            abort: AbortHandle::new(),
            state,
            last_outcome: None,
        }
    }

    /// Use `settings` instead of the defaults.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Measurement name, used for data file names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the measurement.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Override the user passed to the sink and sync script.
    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = Some(user.into());
    }

    /// Effective user: explicit, else configured, else `"Default"`.
    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_else(|| self.settings.user())
    }

    /// Active settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Instrument registry used to resolve bindings.
    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Append an axis; later axes vary faster.
    pub fn add_axis(&mut self, axis: Axis) -> AxisId {
        let id = AxisId(self.next_axis);
        self.next_axis += 1;
        debug!(%id, label = %axis.label, "Axis added");
        self.axes.push((id, axis));
        id
    }

    /// Look up an axis.
    pub fn axis(&self, id: AxisId) -> Option<&Axis> {
        self.axes.iter().find(|(i, _)| *i == id).map(|(_, a)| a)
    }

    /// Mutable access to an axis.
    pub fn axis_mut(&mut self, id: AxisId) -> Option<&mut Axis> {
        self.axes
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, a)| a)
    }

    /// Remove an axis by handle.
    pub fn remove_axis(&mut self, id: AxisId) -> Option<Axis> {
        let index = self.axes.iter().position(|(i, _)| *i == id)?;
        Some(self.axes.remove(index).1)
    }

    /// Remove every axis.
    pub fn remove_all_axes(&mut self) {
        self.axes.clear();
    }

    /// Axes in traversal order.
    pub fn axes(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter().map(|(_, a)| a)
    }

    /// Append a measurand; values are recorded in insertion order.
    pub fn add_measurand(&mut self, measurand: Measurand) {
        self.measurands.push(measurand);
    }

    /// Remove every measurand.
    pub fn remove_all_measurands(&mut self) {
        self.measurands.clear();
    }

    /// Measurands in recording order.
    pub fn measurands(&self) -> &[Measurand] {
        &self.measurands
    }

    /// Bind a traversal strategy.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        info!(%strategy, "Traversal strategy selected");
        self.strategy = Some(strategy);
    }

    /// Bind a traversal strategy by name; unknown names fail here.
    pub fn set_strategy_by_name(&mut self, name: &str, options: TraversalOptions) -> Result<()> {
        let strategy = Strategy::from_name(name, options)?;
        self.set_strategy(strategy);
        Ok(())
    }

    /// Bound strategy.
    pub fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    /// Coordinate stream the next `traverse` would walk.
    pub fn coordinates(&self) -> Result<Coordinates> {
        let strategy = self.strategy.ok_or(ParspaceError::NoStrategy)?;
        strategy.coordinates(&self.axis_list())
    }

    /// Predicted duration of the next `traverse`.
    ///
    /// Axes without ramp metadata are flagged in the result rather than
    /// failing; call [`TimeEstimate::check`] for strict behaviour.
    pub fn estimate_time(&self) -> Result<TimeEstimate> {
        let strategy = self.strategy.ok_or(ParspaceError::NoStrategy)?;
        Ok(estimate(
            &self.axis_list(),
            &strategy,
            &self.settings.estimator(),
        ))
    }

    /// Current controller state.
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Receiver following every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Terminal state of the last run.
    pub fn last_outcome(&self) -> Option<ControllerState> {
        self.last_outcome
    }

    /// Handle that stops a running traversal.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn axis_list(&self) -> Vec<Axis> {
        self.axes.iter().map(|(_, a)| a.clone()).collect()
    }

    fn set_state(&self, state: ControllerState) {
        let previous = self.state.send_replace(state);
        debug!(from = %previous, to = %state, "Controller state change");
    }

    /// Perform one full pass over the parameter space.
    ///
    /// Configuration errors (no axes, no strategy, invalid axes, unknown
    /// instruments, zero gain) are returned before the sink is touched. Once
    /// running, the call always returns `Ok` with a report whose outcome says
    /// how the run ended; the sink has been closed and its metadata written in
    /// every case.
    ///
    /// An abort requested before the call is cleared when the run starts.
    #[instrument(skip_all, fields(name = %self.name), err)]
    pub async fn traverse(
        &mut self,
        sink: &mut dyn DataSink,
        plots: &mut [Box<dyn LivePlot>],
    ) -> Result<RunReport> {
        let strategy = self.strategy.ok_or(ParspaceError::NoStrategy)?;
        if self.axes.is_empty() {
            return Err(ParspaceError::NoAxes);
        }
        let axes = self.axis_list();
        strategy.check(&axes)?;
        let points = strategy.point_count(&axes)?;

        self.abort.reset();
        self.set_state(ControllerState::Configuring);
        let drivers = match self.configure(&axes).await {
            Ok(drivers) => drivers,
            Err(e) => {
                self.set_state(ControllerState::Idle);
                return Err(e);
            }
        };

        let predicted = estimate(&axes, &strategy, &self.settings.estimator());
        let run_uid = Uuid::new_v4();
        let user = self.user().to_string();
        info!(
            %run_uid,
            %strategy,
            axes = axes.len(),
            measurands = self.measurands.len(),
            points,
            "Starting traversal\n{predicted}"
        );

        sink.set_run_info(&RunInfo {
            run_uid,
            name: self.name.clone(),
            strategy: strategy.to_string(),
            started: Local::now(),
        });
        for axis in &axes {
            sink.add_coordinate(&axis.label_with_unit(), axis.points(), axis.begin, axis.end);
        }
        for measurand in &self.measurands {
            for label in measurand.column_labels() {
                sink.add_value(&label);
            }
        }

        self.set_state(ControllerState::Running);
        let started = Instant::now();
        let mut progress = Progress::default();

        let body = self.run(sink, plots, &axes, &drivers, strategy, &user, &mut progress);
        let outcome = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(Ok(())) => RunOutcome::Completed,
            Ok(Err(ParspaceError::Aborted)) => {
                let reason = self.abort.reason().unwrap_or_default();
                warn!(reason = %reason, rows = progress.rows, "Traversal aborted");
                RunOutcome::Aborted
            }
            Ok(Err(e)) => {
                error!(error = %e, rows = progress.rows, "Traversal failed");
                RunOutcome::Failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, rows = progress.rows, "Traversal panicked");
                RunOutcome::Failed(format!("panic: {message}"))
            }
        };

        self.set_state(outcome.state());
        self.finish(sink, &user).await;
        let elapsed = started.elapsed();
        info!(
            outcome = %outcome.state(),
            rows = progress.rows,
            blocks = progress.blocks,
            axis_errors = progress.axis_errors,
            "Time predicted was {}, measurement took {}",
            format_hms(predicted.total()),
            format_hms(elapsed)
        );

        self.last_outcome = Some(outcome.state());
        self.set_state(ControllerState::Idle);
        Ok(RunReport {
            run_uid,
            outcome,
            rows: progress.rows,
            blocks: progress.blocks,
            axis_errors: progress.axis_errors,
            elapsed,
            predicted,
            location: sink.location(),
        })
    }

    /// Resolve bindings and push ramp rates.
    async fn configure(&self, axes: &[Axis]) -> Result<Vec<Option<AxisDriver>>> {
        let mut drivers = Vec::with_capacity(axes.len());
        for axis in axes {
            let Some(binding) = axis.binding.as_ref() else {
                debug!(axis = %axis.label, "Unbound axis, values are recorded only");
                drivers.push(None);
                continue;
            };
            let gain = binding.gain();
            if gain == 0.0 || !gain.is_finite() {
                return Err(ParspaceError::InvalidGain {
                    label: axis.label.clone(),
                    gain,
                });
            }
            let actuator = self.registry.actuator(&binding.target)?;
            let primary = binding
                .target
                .primary_instrument()
                .map(|name| self.registry.require(name))
                .transpose()?;

            if let Some(ramp) = axis.ramp {
                let stepsize = ramp.stepsize / gain;
                match actuator.set_rate(stepsize, ramp.delay_ms).await {
                    Ok(()) => debug!(
                        axis = %axis.label,
                        target = %actuator.describe(),
                        stepsize,
                        delay_ms = ramp.delay_ms,
                        "Ramp rate configured"
                    ),
                    Err(e) => warn!(
                        axis = %axis.label,
                        target = %actuator.describe(),
                        error = %e,
                        "Instrument did not accept ramp rate"
                    ),
                }
            }

            drivers.push(Some(AxisDriver {
                actuator,
                primary,
                gain,
                post_call: binding.post_call.clone(),
                ready_when: binding.ready_when.clone(),
                policy: binding.set_policy,
            }));
        }
        Ok(drivers)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        sink: &mut dyn DataSink,
        plots: &mut [Box<dyn LivePlot>],
        axes: &[Axis],
        drivers: &[Option<AxisDriver>],
        strategy: Strategy,
        user: &str,
        progress: &mut Progress,
    ) -> Result<()> {
        let coordinates = strategy.coordinates(axes)?;
        sink.create_file(user).await.map_err(sink_error)?;
        update_plots(plots);

        let mut block_start = true;
        for coordinate in coordinates {
            if self.abort.is_aborted() {
                return Err(ParspaceError::Aborted);
            }

            for ((axis, driver), &value) in axes.iter().zip(drivers).zip(&coordinate.values) {
                let Some(driver) = driver else { continue };
                if driver.policy == SetPolicy::OncePerBlock && !block_start {
                    continue;
                }
                match self.drive(axis, driver, value).await {
                    Ok(()) => {}
                    Err(ParspaceError::Aborted) => return Err(ParspaceError::Aborted),
                    Err(e) => {
                        progress.axis_errors += 1;
                        warn!(axis = %axis.label, value, error = %e, "Failed to set axis");
                    }
                }
            }
            block_start = false;

            if let Some(wait) = self.measurands.first().and_then(|m| m.measure_wait) {
                self.pause(wait).await?;
            }
            let mut row = coordinate.values;
            for measurand in &self.measurands {
                let values = measurand.read().await.map_err(|e| {
                    ParspaceError::Instrument(e.context(format!(
                        "Measurand '{}' failed to read",
                        measurand.label
                    )))
                })?;
                row.extend(values);
            }
            sink.add_data_point(&row).await.map_err(sink_error)?;
            progress.rows += 1;

            if coordinate.block_boundary {
                sink.new_block().await.map_err(sink_error)?;
                progress.blocks += 1;
                update_plots(plots);
                block_start = true;
            }

            self.pause(self.settings.run.point_yield).await?;
        }
        Ok(())
    }

    /// Sleep for `duration`, returning early with `Aborted` on an abort.
    async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            () = sleep(duration) => Ok(()),
            () = self.abort.aborted() => Err(ParspaceError::Aborted),
        }
    }

    /// Set one axis, run its post-call and wait for readiness.
    async fn drive(&self, axis: &Axis, driver: &AxisDriver, value: f64) -> Result<()> {
        let setpoint = value / driver.gain;
        driver.actuator.set(setpoint).await?;

        match &driver.post_call {
            Some(PostCall::Hook(hook)) => hook(setpoint)?,
            Some(PostCall::Set { parameter, value }) => {
                self.primary(axis, driver)?.set(parameter, *value).await?;
            }
            None => {}
        }

        if let Some(ready) = &driver.ready_when {
            self.wait_ready(axis, self.primary(axis, driver)?, ready)
                .await?;
        }
        Ok(())
    }

    fn primary<'a>(&self, axis: &Axis, driver: &'a AxisDriver) -> Result<&'a Arc<dyn Instrument>> {
        driver
            .primary
            .as_ref()
            .ok_or_else(|| ParspaceError::InvalidAxis {
                label: axis.label.clone(),
                reason: "binding has no instrument for hooks".into(),
            })
    }

    /// Poll `ready.parameter` until it reads `ready.value`.
    async fn wait_ready(
        &self,
        axis: &Axis,
        instrument: &Arc<dyn Instrument>,
        ready: &ReadyWhen,
    ) -> Result<()> {
        let interval = ready
            .poll_interval
            .unwrap_or(self.settings.run.ready_poll_interval);
        let timeout = ready.timeout.or(self.settings.run.ready_timeout);
        let started = Instant::now();
        loop {
            let reading = instrument.get(&ready.parameter).await?;
            if ready.is_met(reading) {
                return Ok(());
            }
            if self.abort.is_aborted() {
                return Err(ParspaceError::Aborted);
            }
            let waited = started.elapsed();
            if timeout.is_some_and(|timeout| waited >= timeout) {
                return Err(ParspaceError::ReadyTimeout {
                    axis: axis.label.clone(),
                    parameter: ready.parameter.clone(),
                    target: ready.value,
                    waited,
                });
            }
            debug!(axis = %axis.label, parameter = %ready.parameter, reading, "Waiting for ready");
            self.pause(interval).await?;
        }
    }

    /// Cleanup shared by every exit path; each step is best-effort.
    async fn finish(&self, sink: &mut dyn DataSink, user: &str) {
        best_effort("close data file", sink.close_file()).await;
        best_effort("write metadata", sink.write_metadata()).await;
        if let Some(location) = sink.location() {
            info!(location = %location.display(), "Data written");
        }
        sync::run(&self.settings.sync, user);
    }
}

impl fmt::Debug for ParameterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpace")
            .field("name", &self.name)
            .field("axes", &self.axes)
            .field("measurands", &self.measurands)
            .field("strategy", &self.strategy)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn best_effort<F>(step: &str, future: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(step, error = %e, "Cleanup step failed"),
        Err(panic) => error!(step, panic = %panic_message(panic.as_ref()), "Cleanup step panicked"),
    }
}

fn update_plots(plots: &mut [Box<dyn LivePlot>]) {
    for plot in plots.iter_mut() {
        if let Err(e) = plot.update() {
            warn!(error = %e, "Live plot update failed");
        }
    }
}

fn sink_error(e: anyhow::Error) -> ParspaceError {
    ParspaceError::Sink(format!("{e:#}"))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// `HH:MM:SS`, hours not wrapped at 24.
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}
