use std::time::Duration;

use serde::Deserialize;
use tracing::{trace, warn};

use super::input::InputTracker;

/// Millisecond time source. Only differences between readings matter.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequestId(pub u64);

/// The host's per-frame callback primitive.
pub trait FrameHost {
    fn request_frame(&mut self) -> FrameRequestId;
    fn cancel_frame(&mut self, request: FrameRequestId);
}

/// Work executed by one scheduler tick, in order: update, draw, then the
/// input reset on [`TickHandler::input_mut`].
///
/// Under a fixed timestep each input edge is seen by exactly one update
/// step: the reset also runs between steps of a catch-up frame, and is
/// skipped after a frame that ran no step.
pub trait TickHandler {
    type Error;

    fn update(&mut self, dt_seconds: f32) -> Result<(), Self::Error>;
    fn draw(&mut self) -> Result<(), Self::Error>;
    fn input_mut(&mut self) -> &mut InputTracker;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Timestep {
    #[default]
    Variable,
    Fixed {
        hz: u32,
    },
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub timestep: Timestep,
    pub max_frame_delta: Duration,
    pub max_steps_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Desktop host closes on Escape while no action is bound to `key::ESC`.
    pub exit_on_escape: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Boogie".to_string(),
            window_width: 960,
            window_height: 540,
            timestep: Timestep::Variable,
            max_frame_delta: Duration::from_millis(250),
            max_steps_per_frame: 5,
            metrics_log_interval: Duration::from_secs(5),
            exit_on_escape: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub frame_dt: Duration,
    pub steps: u32,
}

#[derive(Debug)]
pub struct FrameScheduler {
    state: SchedulerState,
    timestep: Timestep,
    max_frame_delta: Duration,
    max_steps_per_frame: u32,
    last_step_ms: f64,
    pending: Option<FrameRequestId>,
    accumulator: Duration,
    ticks: u64,
}

impl FrameScheduler {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            state: SchedulerState::Stopped,
            timestep: normalize_timestep(config.timestep),
            max_frame_delta: normalize_non_zero_duration(
                config.max_frame_delta,
                Duration::from_millis(250),
            ),
            max_steps_per_frame: config.max_steps_per_frame.max(1),
            last_step_ms: 0.0,
            pending: None,
            accumulator: Duration::ZERO,
            ticks: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn pending(&self) -> Option<FrameRequestId> {
        self.pending
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn timestep(&self) -> Timestep {
        self.timestep
    }

    /// Returns false when already running.
    pub fn start(&mut self, clock: &dyn Clock, frames: &mut dyn FrameHost) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = SchedulerState::Running;
        self.last_step_ms = clock.now_ms();
        self.accumulator = Duration::ZERO;
        self.pending = Some(frames.request_frame());
        true
    }

    /// Returns false when already stopped. Never interrupts a tick in
    /// progress; it only withdraws the next one.
    pub fn stop(&mut self, frames: &mut dyn FrameHost) -> bool {
        if let Some(request) = self.pending.take() {
            frames.cancel_frame(request);
        }
        let was_running = self.is_running();
        self.state = SchedulerState::Stopped;
        was_running
    }

    /// Runs one tick for `request`. Callbacks for requests this scheduler no
    /// longer waits on (cancelled or already served) are ignored.
    ///
    /// A handler error halts the scheduler without requesting another frame.
    pub fn on_frame<H: TickHandler>(
        &mut self,
        request: FrameRequestId,
        clock: &dyn Clock,
        frames: &mut dyn FrameHost,
        handler: &mut H,
    ) -> Result<Option<TickReport>, H::Error> {
        if !self.is_running() || self.pending != Some(request) {
            trace!(request = request.0, "stale_frame_ignored");
            return Ok(None);
        }
        self.pending = None;

        let now = clock.now_ms();
        let frame_dt = elapsed_since(self.last_step_ms, now);
        self.last_step_ms = now;

        let steps = match self.run_updates(frame_dt, handler) {
            Ok(steps) => steps,
            Err(error) => {
                self.state = SchedulerState::Stopped;
                return Err(error);
            }
        };
        if let Err(error) = handler.draw() {
            self.state = SchedulerState::Stopped;
            return Err(error);
        }
        // A frame without an update step leaves its edges for the next step.
        if steps > 0 {
            handler.input_mut().clear_pressed();
        }

        self.ticks = self.ticks.saturating_add(1);
        self.pending = Some(frames.request_frame());
        Ok(Some(TickReport { frame_dt, steps }))
    }

    fn run_updates<H: TickHandler>(
        &mut self,
        frame_dt: Duration,
        handler: &mut H,
    ) -> Result<u32, H::Error> {
        match self.timestep {
            Timestep::Variable => {
                handler.update(frame_dt.as_secs_f32())?;
                Ok(1)
            }
            Timestep::Fixed { hz } => {
                let fixed_dt = Duration::from_secs_f64(1.0 / f64::from(hz));
                let clamped = clamp_frame_delta(frame_dt, self.max_frame_delta);
                self.accumulator = self.accumulator.saturating_add(clamped);

                let plan = plan_sim_steps(self.accumulator, fixed_dt, self.max_steps_per_frame);
                self.accumulator = plan.remaining_accumulator;
                if plan.dropped_backlog > Duration::ZERO {
                    warn!(
                        dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                        max_steps_per_frame = self.max_steps_per_frame,
                        "sim_clamp_triggered"
                    );
                }
                for step in 0..plan.ticks_to_run {
                    if step > 0 {
                        handler.input_mut().clear_pressed();
                    }
                    handler.update(fixed_dt.as_secs_f32())?;
                }
                Ok(plan.ticks_to_run)
            }
        }
    }
}

fn elapsed_since(last_ms: f64, now_ms: f64) -> Duration {
    let elapsed_seconds = (now_ms - last_ms) / 1000.0;
    if elapsed_seconds.is_finite() && elapsed_seconds > 0.0 {
        Duration::try_from_secs_f64(elapsed_seconds).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

fn normalize_timestep(timestep: Timestep) -> Timestep {
    match timestep {
        Timestep::Fixed { hz: 0 } => {
            warn!("fixed timestep of 0 hz requested; using variable timestep");
            Timestep::Variable
        }
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
