use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::entity::{entity, EntityAttributes, EntityHandle, EntityState, GameState};
use super::host::Platform;
use super::input::{EventDisposition, InputCode, InputTracker, RawInputEvent};
use super::metrics::{MetricsAccumulator, MetricsHandle};
use super::rendering::Surface;
use super::scene::{EntityRecord, Scene, SceneError, SceneId};
use super::scheduler::{FrameRequestId, FrameScheduler, LoopConfig, TickHandler, TickReport};
use super::store::{Store, StoreError};

static RUNTIME_BOOTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime already booted in this process")]
    AlreadyBooted,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

type DrawHook = Box<dyn FnMut(&mut dyn Surface, &GameState)>;

/// The process-wide entry point. Only the first call succeeds; use
/// [`Runtime::new`] directly where several runtimes must coexist.
pub fn boot<S: Surface>(
    platform: Platform<S>,
    config: &LoopConfig,
    initial_state: GameState,
) -> Result<Runtime<S>, RuntimeError> {
    if RUNTIME_BOOTED.swap(true, Ordering::SeqCst) {
        return Err(RuntimeError::AlreadyBooted);
    }
    Ok(Runtime::new(platform, config, initial_state))
}

/// Owns the store, the input tracker, the scene pipeline and the
/// scheduler, and drives them against an injected [`Platform`].
pub struct Runtime<S: Surface> {
    platform: Platform<S>,
    store: Store<EntityState>,
    input: InputTracker,
    scenes: Vec<Scene>,
    scheduler: FrameScheduler,
    draw_hook: Option<DrawHook>,
    metrics: MetricsHandle,
    metrics_accumulator: MetricsAccumulator,
}

impl<S: Surface> Runtime<S> {
    pub fn new(platform: Platform<S>, config: &LoopConfig, initial_state: GameState) -> Self {
        Self {
            platform,
            store: Store::new(initial_state),
            input: InputTracker::new(),
            scenes: Vec::new(),
            scheduler: FrameScheduler::new(config),
            draw_hook: None,
            metrics: MetricsHandle::default(),
            metrics_accumulator: MetricsAccumulator::new(config.metrics_log_interval),
        }
    }

    pub fn start(&mut self) -> bool {
        let started = self
            .scheduler
            .start(self.platform.clock.as_ref(), self.platform.frames.as_mut());
        if started {
            let (width, height) = self.platform.surface.size();
            info!(
                width,
                height,
                scenes = self.scenes.len(),
                entities = self.store.len(),
                timestep = ?self.scheduler.timestep(),
                "runtime_started"
            );
        }
        started
    }

    pub fn stop(&mut self) -> bool {
        let stopped = self.scheduler.stop(self.platform.frames.as_mut());
        if stopped {
            info!(ticks = self.scheduler.ticks(), "runtime_stopped");
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn pending_frame(&self) -> Option<FrameRequestId> {
        self.scheduler.pending()
    }

    /// Frame callback entry point: drains the platform's input source into
    /// the tracker, then runs one scheduler tick.
    ///
    /// Returns `Ok(None)` when `request` is not the one the scheduler is
    /// waiting on. On error the runtime is stopped.
    pub fn frame(&mut self, request: FrameRequestId) -> Result<Option<TickReport>, RuntimeError> {
        for event in self.platform.input.drain() {
            self.input.handle_event(event);
        }

        let mut pipeline = TickPipeline {
            surface: &mut self.platform.surface,
            store: &mut self.store,
            input: &mut self.input,
            scenes: &mut self.scenes,
            draw_hook: self.draw_hook.as_mut(),
        };
        let report = self.scheduler.on_frame(
            request,
            self.platform.clock.as_ref(),
            self.platform.frames.as_mut(),
            &mut pipeline,
        )?;

        if let Some(report) = report {
            self.record_metrics(report);
        }
        Ok(report)
    }

    fn record_metrics(&mut self, report: TickReport) {
        self.metrics_accumulator.record_frame(report.frame_dt);
        self.metrics_accumulator.record_ticks(report.steps);

        let now_ms = self.platform.clock.now_ms().max(0.0);
        let now = Duration::try_from_secs_f64(now_ms / 1000.0).unwrap_or(Duration::ZERO);
        if let Some(snapshot) = self.metrics_accumulator.maybe_snapshot(now) {
            self.metrics.publish(snapshot);
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                total_frames = snapshot.total_frames,
                entities = self.store.len(),
                "loop_metrics"
            );
        }
    }

    pub fn handle_event(&mut self, event: RawInputEvent) -> EventDisposition {
        self.input.handle_event(event)
    }

    pub fn bind(&mut self, code: InputCode, action: impl Into<String>) {
        self.input.bind(code, action);
    }

    /// Registers a new scene in the per-tick pipeline.
    pub fn scene(&mut self, width: u32, height: u32) -> SceneId {
        let id = SceneId(self.scenes.len());
        self.scenes.push(Scene::new(id, width, height));
        debug!(scene = %id, width, height, "scene_registered");
        id
    }

    pub fn scene_ref(&self, id: SceneId) -> Result<&Scene, SceneError> {
        self.scenes.get(id.0).ok_or(SceneError::UnknownScene(id))
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Result<&mut Scene, SceneError> {
        self.scenes.get_mut(id.0).ok_or(SceneError::UnknownScene(id))
    }

    pub fn add(&mut self, id: SceneId, record: EntityRecord) -> Result<EntityHandle, RuntimeError> {
        let scene = self
            .scenes
            .get_mut(id.0)
            .ok_or(SceneError::UnknownScene(id))?;
        Ok(scene.add(&mut self.store, record)?)
    }

    /// Registers a bare entity in the store without attaching it to a scene.
    pub fn entity(
        &mut self,
        key: impl Into<String>,
        attributes: &EntityAttributes,
    ) -> Result<EntityHandle, RuntimeError> {
        Ok(entity(&mut self.store, key, attributes)?)
    }

    /// Updates the viewport of every scene. Resizing the surface itself is
    /// up to the host.
    pub fn resize(&mut self, width: u32, height: u32) {
        for scene in &mut self.scenes {
            scene.resize(width, height);
        }
        debug!(width, height, "runtime_resized");
    }

    pub fn store(&self) -> &Store<EntityState> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<EntityState> {
        &mut self.store
    }

    pub fn input(&self) -> &InputTracker {
        &self.input
    }

    /// Runs once per frame after all scenes, before the input reset.
    pub fn set_draw_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&mut dyn Surface, &GameState) + 'static,
    {
        self.draw_hook = Some(Box::new(hook));
    }

    pub fn metrics(&self) -> MetricsHandle {
        self.metrics.clone()
    }

    pub fn surface(&self) -> &S {
        &self.platform.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.platform.surface
    }
}

struct TickPipeline<'a> {
    surface: &'a mut dyn Surface,
    store: &'a mut Store<EntityState>,
    input: &'a mut InputTracker,
    scenes: &'a mut [Scene],
    draw_hook: Option<&'a mut DrawHook>,
}

impl TickHandler for TickPipeline<'_> {
    type Error = RuntimeError;

    fn update(&mut self, dt_seconds: f32) -> Result<(), RuntimeError> {
        self.surface.clear();
        for scene in self.scenes.iter_mut() {
            scene.tick(dt_seconds, self.store, self.input, self.surface)?;
        }
        Ok(())
    }

    fn draw(&mut self) -> Result<(), RuntimeError> {
        if let Some(hook) = self.draw_hook.as_mut() {
            let state = self.store.get();
            (**hook)(self.surface, &state);
        }
        Ok(())
    }

    fn input_mut(&mut self) -> &mut InputTracker {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::app::entity::{Direction, EntityKind};
    use crate::app::host::{headless_platform, HeadlessControls};
    use crate::app::input::key;
    use crate::app::rendering::{Color, PixelBuffer};
    use crate::app::scene::{EntityContext, UpdateFn};
    use crate::app::scheduler::Timestep;

    fn runtime() -> (Runtime<PixelBuffer>, HeadlessControls) {
        let (platform, controls) = headless_platform(64, 48);
        let config = LoopConfig {
            metrics_log_interval: Duration::from_secs(1),
            ..LoopConfig::default()
        };
        (Runtime::new(platform, &config, GameState::new()), controls)
    }

    fn run_frame(
        runtime: &mut Runtime<PixelBuffer>,
        controls: &HeadlessControls,
        ms: f64,
    ) -> TickReport {
        controls.clock.advance(ms);
        let request = controls.frames.take_pending().expect("pending frame");
        runtime.frame(request).expect("frame").expect("tick ran")
    }

    #[test]
    fn boot_succeeds_once_per_process() {
        let (first, _) = headless_platform(8, 8);
        let (second, _) = headless_platform(8, 8);
        let config = LoopConfig::default();

        assert!(boot(first, &config, GameState::new()).is_ok());
        assert!(matches!(
            boot(second, &config, GameState::new()),
            Err(RuntimeError::AlreadyBooted)
        ));
    }

    #[test]
    fn start_requests_one_frame_and_stop_cancels_it() {
        let (mut runtime, controls) = runtime();
        assert!(runtime.start());
        assert!(!runtime.start());
        assert_eq!(controls.frames.pending().len(), 1);

        assert!(runtime.stop());
        assert!(!runtime.stop());
        assert!(controls.frames.pending().is_empty());
        assert!(!runtime.is_running());
    }

    #[test]
    fn held_left_arrow_moves_creature_with_edge_only_on_first_tick() {
        let (mut runtime, controls) = runtime();
        runtime.bind(key::LEFT_ARROW, "left");
        let scene = runtime.scene(64, 48);
        let player = runtime
            .add(
                scene,
                EntityRecord::new("player").with_attributes(&EntityAttributes {
                    kind: Some(EntityKind::Creature),
                    ..EntityAttributes::at(32.0, 16.0)
                }),
            )
            .expect("player");
        let edges = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&edges);
        runtime
            .add(
                scene,
                EntityRecord::new("observer").with_behavior(UpdateFn(
                    move |_dt: f32, ctx: &EntityContext<'_>| -> Option<EntityState> {
                        sink.borrow_mut()
                            .push((ctx.input.pressed("left"), ctx.input.down("left")));
                        None
                    },
                )),
            )
            .expect("observer");

        runtime.start();
        controls.events.push(RawInputEvent::KeyDown { code: 37 });
        run_frame(&mut runtime, &controls, 1000.0 / 60.0);
        run_frame(&mut runtime, &controls, 1000.0 / 60.0);

        assert_eq!(*edges.borrow(), vec![(true, true), (false, true)]);
        let state = player.get(runtime.store()).expect("player");
        assert_eq!(state.direction, Direction::W);
        assert!((state.x - 22.0).abs() < 0.01, "x = {}", state.x);

        controls.events.push(RawInputEvent::KeyUp { code: 37 });
        run_frame(&mut runtime, &controls, 1000.0 / 60.0);
        assert!(!runtime.input().down("left"));
        assert!(!runtime.input().released("left"));
    }

    #[test]
    fn fixed_timestep_delivers_press_to_first_update_step() {
        let (platform, controls) = headless_platform(64, 48);
        let config = LoopConfig {
            timestep: Timestep::Fixed { hz: 30 },
            ..LoopConfig::default()
        };
        let mut runtime = Runtime::new(platform, &config, GameState::new());
        runtime.bind(key::SPACE, "fire");
        let scene = runtime.scene(64, 48);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        runtime
            .add(
                scene,
                EntityRecord::new("trigger").with_behavior(UpdateFn(
                    move |_dt: f32, ctx: &EntityContext<'_>| -> Option<EntityState> {
                        sink.borrow_mut().push(ctx.input.pressed("fire"));
                        None
                    },
                )),
            )
            .expect("trigger");

        runtime.start();
        controls.events.push(RawInputEvent::KeyDown { code: 32 });
        let steps: Vec<u32> = (0..6)
            .map(|_| run_frame(&mut runtime, &controls, 16.0).steps)
            .collect();

        assert_eq!(steps, vec![0, 0, 1, 0, 1, 0]);
        assert_eq!(*seen.borrow(), vec![true, false]);
        assert!(runtime.input().down("fire"));
    }

    #[test]
    fn frame_draws_scenes_then_hook_onto_cleared_surface() {
        let (mut runtime, controls) = runtime();
        let scene = runtime.scene(64, 48);
        runtime
            .add(
                scene,
                EntityRecord::new("block").with_attributes(&EntityAttributes {
                    color: Some(Color::rgb(255, 0, 0)),
                    ..EntityAttributes::at(0.0, 0.0)
                }),
            )
            .expect("block");
        let hook_saw = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&hook_saw);
        runtime.set_draw_hook(move |surface, state| {
            surface.fill_rect(
                crate::app::rendering::Rect::new(8.0, 0.0, 4.0, 4.0),
                Color::WHITE,
            );
            *sink.borrow_mut() = Some(state.len());
        });

        runtime.start();
        run_frame(&mut runtime, &controls, 16.0);

        assert_eq!(*hook_saw.borrow(), Some(1));
        assert_eq!(runtime.surface().pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(runtime.surface().pixel(9, 1), Some([255, 255, 255, 255]));
        assert_eq!(runtime.surface().pixel(40, 40), Some([0, 0, 0, 0]));
    }

    #[test]
    fn stale_frame_after_stop_is_ignored() {
        let (mut runtime, controls) = runtime();
        runtime.start();
        let request = controls.frames.pending()[0];
        runtime.stop();

        assert_eq!(runtime.frame(request).expect("ignored"), None);
    }

    #[test]
    fn listener_failure_stops_runtime_and_keeps_state() {
        let (mut runtime, controls) = runtime();
        let scene = runtime.scene(64, 48);
        runtime
            .add(
                scene,
                EntityRecord::new("bolt").with_attributes(&EntityAttributes {
                    kind: Some(EntityKind::projectile()),
                    ..EntityAttributes::default()
                }),
            )
            .expect("bolt");
        let before = runtime.store().get();
        runtime.store_mut().subscribe(|_, _| Err("reject".into()));

        runtime.start();
        controls.clock.advance(16.0);
        let request = controls.frames.take_pending().expect("pending");
        let error = runtime.frame(request).expect_err("listener failure");

        assert!(matches!(
            error,
            RuntimeError::Scene(SceneError::Store(StoreError::Listener { .. }))
        ));
        assert!(!runtime.is_running());
        assert!(controls.frames.pending().is_empty());
        assert_eq!(runtime.store().get(), before);
    }

    #[test]
    fn add_to_unknown_scene_fails() {
        let (mut runtime, _) = runtime();
        let error = runtime
            .add(SceneId(3), EntityRecord::new("x"))
            .expect_err("unknown scene");
        assert!(matches!(
            error,
            RuntimeError::Scene(SceneError::UnknownScene(SceneId(3)))
        ));
    }

    #[test]
    fn resize_reaches_every_scene() {
        let (mut runtime, _) = runtime();
        let a = runtime.scene(10, 10);
        let b = runtime.scene(20, 20);
        runtime.resize(100, 50);

        for id in [a, b] {
            let viewport = runtime.scene_ref(id).expect("scene").viewport();
            assert_eq!((viewport.width, viewport.height), (100, 50));
        }
    }

    #[test]
    fn metrics_are_published_after_interval() {
        let (mut runtime, controls) = runtime();
        let metrics = runtime.metrics();
        runtime.start();

        run_frame(&mut runtime, &controls, 250.0);
        assert_eq!(metrics.snapshot().total_frames, 0);
        for _ in 0..4 {
            run_frame(&mut runtime, &controls, 250.0);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_frames, 5);
        assert!((snapshot.fps - 5.0).abs() < 0.05);
    }

    #[test]
    fn entity_registers_without_scene() {
        let (mut runtime, _) = runtime();
        let handle = runtime
            .entity("marker", &EntityAttributes::at(1.0, 2.0))
            .expect("entity");
        assert_eq!(handle.get(runtime.store()).map(|s| s.y), Some(2.0));
    }
}
