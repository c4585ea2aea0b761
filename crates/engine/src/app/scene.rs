use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::entity::{register, step_kind, EntityAttributes, EntityHandle, EntityState, GameState};
use super::input::InputTracker;
use super::rendering::Surface;
use super::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub(crate) usize);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("entity record has no key")]
    MissingKey,
    #[error("unknown scene {0}")]
    UnknownScene(SceneId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// What an entity sees while its scene folds one tick.
///
/// `state` is the accumulated game state: the store snapshot taken at the
/// start of the tick with every earlier entity's result already merged in.
pub struct EntityContext<'a> {
    pub key: &'a str,
    pub state: &'a GameState,
    pub input: &'a InputTracker,
    pub viewport: Viewport,
}

impl EntityContext<'_> {
    pub fn current(&self) -> Option<&EntityState> {
        self.state.get(self.key)
    }
}

/// Per-entity behavior attached to a live entity. Never persisted.
pub trait Behavior {
    /// Returns the next state for this entity's own key, or `None` to leave
    /// it untouched.
    fn update(&mut self, _dt: f32, _ctx: &EntityContext<'_>) -> Option<EntityState> {
        None
    }

    fn draw(&mut self, surface: &mut dyn Surface, ctx: &EntityContext<'_>) {
        if let Some(state) = ctx.current().filter(|state| state.alive) {
            surface.fill_rect(state.rect(), state.color);
        }
    }
}

/// Draws and never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Static;

impl Behavior for Static {}

/// Steps the entity according to its [`EntityKind`](super::entity::EntityKind).
#[derive(Debug, Clone, Copy, Default)]
pub struct KindBehavior;

impl Behavior for KindBehavior {
    fn update(&mut self, dt: f32, ctx: &EntityContext<'_>) -> Option<EntityState> {
        ctx.current()
            .and_then(|state| step_kind(state, dt, ctx.input))
    }
}

/// Adapts a closure into a [`Behavior`] that keeps the default draw.
pub struct UpdateFn<F>(pub F);

impl<F> Behavior for UpdateFn<F>
where
    F: FnMut(f32, &EntityContext<'_>) -> Option<EntityState>,
{
    fn update(&mut self, dt: f32, ctx: &EntityContext<'_>) -> Option<EntityState> {
        (self.0)(dt, ctx)
    }
}

/// An entity awaiting [`Scene::add`]: plain state plus attached behavior.
pub struct EntityRecord {
    key: Option<String>,
    state: EntityState,
    behavior: Box<dyn Behavior>,
}

impl EntityRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            state: EntityState::default(),
            behavior: Box::new(KindBehavior),
        }
    }

    pub fn unkeyed() -> Self {
        Self {
            key: None,
            state: EntityState::default(),
            behavior: Box::new(KindBehavior),
        }
    }

    pub fn with_attributes(mut self, attributes: &EntityAttributes) -> Self {
        self.state = attributes.merge_over(self.state);
        self
    }

    pub fn with_state(mut self, state: EntityState) -> Self {
        self.state = state;
        self
    }

    pub fn with_behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behavior = Box::new(behavior);
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }
}

impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRecord")
            .field("key", &self.key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

struct LiveEntity {
    key: String,
    behavior: Box<dyn Behavior>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneTick {
    pub updated: usize,
    pub drawn: usize,
}

pub struct Scene {
    id: SceneId,
    viewport: Viewport,
    paused: bool,
    entities: Vec<LiveEntity>,
}

impl Scene {
    pub(crate) fn new(id: SceneId, width: u32, height: u32) -> Self {
        Self {
            id,
            viewport: Viewport { width, height },
            paused: false,
            entities: Vec::new(),
        }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Writes the record's state into `store` under its key and keeps the
    /// behavior live. Re-adding a key replaces the live entity in place.
    pub fn add(
        &mut self,
        store: &mut Store<EntityState>,
        record: EntityRecord,
    ) -> Result<EntityHandle, SceneError> {
        let EntityRecord {
            key,
            state,
            behavior,
        } = record;
        let key = key.ok_or(SceneError::MissingKey)?;

        register(store, &key, state)?;

        match self.entities.iter_mut().find(|live| live.key == key) {
            Some(live) => {
                warn!(scene = %self.id, key = %key, "scene_entity_replaced");
                live.behavior = behavior;
            }
            None => {
                debug!(scene = %self.id, key = %key, "scene_entity_added");
                self.entities.push(LiveEntity {
                    key: key.clone(),
                    behavior,
                });
            }
        }
        Ok(EntityHandle::new(key))
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport { width, height };
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|live| live.key.as_str())
    }

    /// Folds every entity in registration order, drawing each right after
    /// its update, and commits the touched entries through a single
    /// [`Store::set`]. Paused scenes do nothing.
    pub fn tick(
        &mut self,
        dt: f32,
        store: &mut Store<EntityState>,
        input: &InputTracker,
        surface: &mut dyn Surface,
    ) -> Result<SceneTick, SceneError> {
        if self.paused {
            return Ok(SceneTick::default());
        }

        let mut accumulated = store.get();
        let mut touched = GameState::new();
        let mut report = SceneTick::default();

        for live in &mut self.entities {
            let next = {
                let ctx = EntityContext {
                    key: &live.key,
                    state: &accumulated,
                    input,
                    viewport: self.viewport,
                };
                live.behavior.update(dt, &ctx)
            };
            if let Some(next) = next {
                accumulated.insert(live.key.clone(), next);
                touched.insert(live.key.clone(), next);
                report.updated += 1;
            }

            let ctx = EntityContext {
                key: &live.key,
                state: &accumulated,
                input,
                viewport: self.viewport,
            };
            live.behavior.draw(surface, &ctx);
            report.drawn += 1;
        }

        if !touched.is_empty() {
            store.set(touched)?;
        }
        Ok(report)
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("viewport", &self.viewport)
            .field("paused", &self.paused)
            .field("entities", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::app::entity::EntityKind;
    use crate::app::input::{key, RawInputEvent};
    use crate::app::rendering::{Color, DrawCall, Rect, RecordingSurface};

    const FRAME: f32 = 1.0 / 60.0;

    fn scene() -> Scene {
        Scene::new(SceneId(0), 320, 240)
    }

    struct Logged {
        label: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Behavior for Logged {
        fn update(&mut self, _dt: f32, _ctx: &EntityContext<'_>) -> Option<EntityState> {
            self.log.borrow_mut().push(format!("update:{}", self.label));
            None
        }

        fn draw(&mut self, _surface: &mut dyn Surface, _ctx: &EntityContext<'_>) {
            self.log.borrow_mut().push(format!("draw:{}", self.label));
        }
    }

    #[test]
    fn add_without_key_is_rejected() {
        let mut store = Store::default();
        let error = scene()
            .add(&mut store, EntityRecord::unkeyed())
            .expect_err("missing key");
        assert!(matches!(error, SceneError::MissingKey));
        assert!(store.is_empty());
    }

    #[test]
    fn add_persists_plain_state_under_key() {
        let mut store = Store::default();
        let mut scene = scene();
        let handle = scene
            .add(
                &mut store,
                EntityRecord::new("hero").with_attributes(&EntityAttributes::at(8.0, 9.0)),
            )
            .expect("add");

        assert_eq!(handle.key(), "hero");
        let stored = store.get_entry("hero").expect("stored");
        assert_eq!((stored.x, stored.y), (8.0, 9.0));
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn re_adding_a_key_replaces_live_entity() {
        let mut store = Store::default();
        let mut scene = scene();
        scene
            .add(&mut store, EntityRecord::new("hero"))
            .expect("first");
        scene
            .add(
                &mut store,
                EntityRecord::new("hero").with_attributes(&EntityAttributes::at(1.0, 1.0)),
            )
            .expect("second");

        assert_eq!(scene.len(), 1);
        assert_eq!(store.get_entry("hero").map(|s| s.x), Some(1.0));
    }

    #[test]
    fn later_entity_sees_earlier_result_within_tick() {
        let mut store = Store::default();
        let mut scene = scene();
        scene
            .add(
                &mut store,
                EntityRecord::new("leader").with_behavior(UpdateFn(
                    |_dt: f32, ctx: &EntityContext<'_>| {
                        ctx.current().map(|state| EntityState { x: state.x + 10.0, ..*state })
                    },
                )),
            )
            .expect("leader");
        scene
            .add(
                &mut store,
                EntityRecord::new("follower").with_behavior(UpdateFn(
                    |_dt: f32, ctx: &EntityContext<'_>| {
                        let leader = ctx.state.get("leader")?;
                        ctx.current().map(|state| EntityState { x: leader.x, ..*state })
                    },
                )),
            )
            .expect("follower");

        let mut surface = RecordingSurface::new(320, 240);
        let input = InputTracker::new();
        scene
            .tick(FRAME, &mut store, &input, &mut surface)
            .expect("tick");

        assert_eq!(store.get_entry("leader").map(|s| s.x), Some(10.0));
        assert_eq!(store.get_entry("follower").map(|s| s.x), Some(10.0));
    }

    #[test]
    fn re_added_behavior_drives_later_ticks() {
        let mut store = Store::default();
        let mut scene = scene();
        scene
            .add(&mut store, EntityRecord::new("a"))
            .expect("a");
        let overwrite = |x: f32| {
            move |_dt: f32, _ctx: &EntityContext<'_>| {
                Some(EntityState {
                    x,
                    ..EntityState::default()
                })
            }
        };
        scene
            .add(
                &mut store,
                EntityRecord::new("b").with_behavior(UpdateFn(overwrite(5.0))),
            )
            .expect("b");
        scene
            .add(
                &mut store,
                EntityRecord::new("b").with_behavior(UpdateFn(overwrite(7.0))),
            )
            .expect("b again");

        let mut surface = RecordingSurface::new(320, 240);
        scene
            .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
            .expect("tick");
        assert_eq!(store.get_entry("b").map(|s| s.x), Some(7.0));
    }

    #[test]
    fn update_and_draw_are_interleaved_per_entity() {
        let mut store = Store::default();
        let mut scene = scene();
        let log = Rc::new(RefCell::new(Vec::new()));
        for label in ["a", "b"] {
            scene
                .add(
                    &mut store,
                    EntityRecord::new(label).with_behavior(Logged {
                        label,
                        log: Rc::clone(&log),
                    }),
                )
                .expect("add");
        }

        let mut surface = RecordingSurface::new(320, 240);
        let report = scene
            .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
            .expect("tick");

        assert_eq!(
            *log.borrow(),
            vec!["update:a", "draw:a", "update:b", "draw:b"]
        );
        assert_eq!(report, SceneTick { updated: 0, drawn: 2 });
    }

    #[test]
    fn one_store_write_per_tick_and_none_when_unchanged() {
        let mut store = Store::default();
        let writes = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&writes);
        let mut scene = scene();
        scene
            .add(
                &mut store,
                EntityRecord::new("p1").with_attributes(&EntityAttributes {
                    kind: Some(EntityKind::Creature),
                    ..EntityAttributes::default()
                }),
            )
            .expect("p1");
        scene
            .add(
                &mut store,
                EntityRecord::new("p2").with_attributes(&EntityAttributes {
                    kind: Some(EntityKind::Creature),
                    ..EntityAttributes::default()
                }),
            )
            .expect("p2");
        store.subscribe(move |_, _| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let mut input = InputTracker::new();
        let mut surface = RecordingSurface::new(320, 240);
        scene
            .tick(FRAME, &mut store, &input, &mut surface)
            .expect("idle tick");
        assert_eq!(*writes.borrow(), 0);

        input.bind(key::RIGHT_ARROW, "right");
        input.handle_event(RawInputEvent::KeyDown { code: 39 });
        scene
            .tick(FRAME, &mut store, &input, &mut surface)
            .expect("moving tick");
        assert_eq!(*writes.borrow(), 1);
    }

    #[test]
    fn paused_scene_neither_updates_nor_draws() {
        let mut store = Store::default();
        let mut scene = scene();
        scene
            .add(
                &mut store,
                EntityRecord::new("bolt").with_attributes(&EntityAttributes {
                    kind: Some(EntityKind::projectile()),
                    ..EntityAttributes::default()
                }),
            )
            .expect("bolt");
        let before = store.get();
        scene.pause();

        let mut surface = RecordingSurface::new(320, 240);
        for _ in 0..10 {
            let report = scene
                .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
                .expect("tick");
            assert_eq!(report, SceneTick::default());
        }
        assert_eq!(store.get(), before);
        assert!(surface.calls.is_empty());

        scene.resume();
        assert!(!scene.is_paused());
        scene
            .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
            .expect("tick");
        assert_ne!(store.get(), before);
    }

    #[test]
    fn default_draw_skips_dead_entities() {
        let mut store = Store::default();
        let mut scene = scene();
        scene
            .add(
                &mut store,
                EntityRecord::new("alive")
                    .with_behavior(Static)
                    .with_attributes(&EntityAttributes {
                        color: Some(Color::WHITE),
                        ..EntityAttributes::at(1.0, 2.0)
                    }),
            )
            .expect("alive");
        scene
            .add(
                &mut store,
                EntityRecord::new("dead")
                    .with_behavior(Static)
                    .with_attributes(&EntityAttributes {
                        alive: Some(false),
                        ..EntityAttributes::default()
                    }),
            )
            .expect("dead");

        let mut surface = RecordingSurface::new(320, 240);
        scene
            .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
            .expect("tick");

        assert_eq!(
            surface.calls,
            vec![DrawCall::Fill(Rect::new(1.0, 2.0, 16.0, 16.0), Color::WHITE)]
        );
    }

    #[test]
    fn resize_is_visible_to_the_next_draw() {
        let mut store = Store::default();
        let mut scene = scene();
        let seen = Rc::new(RefCell::new(Vec::new()));

        struct ViewportRecorder(Rc<RefCell<Vec<Viewport>>>);
        impl Behavior for ViewportRecorder {
            fn draw(&mut self, _surface: &mut dyn Surface, ctx: &EntityContext<'_>) {
                self.0.borrow_mut().push(ctx.viewport);
            }
        }

        scene
            .add(
                &mut store,
                EntityRecord::new("recorder").with_behavior(ViewportRecorder(Rc::clone(&seen))),
            )
            .expect("recorder");
        let mut surface = RecordingSurface::new(320, 240);
        scene
            .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
            .expect("tick");
        scene.resize(640, 480);
        scene
            .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
            .expect("tick");

        assert_eq!(
            *seen.borrow(),
            vec![
                Viewport {
                    width: 320,
                    height: 240
                },
                Viewport {
                    width: 640,
                    height: 480
                }
            ]
        );
    }

    #[test]
    fn failing_listener_surfaces_as_scene_error() {
        let mut store = Store::default();
        let mut scene = scene();
        scene
            .add(
                &mut store,
                EntityRecord::new("bolt").with_attributes(&EntityAttributes {
                    kind: Some(EntityKind::projectile()),
                    ..EntityAttributes::default()
                }),
            )
            .expect("bolt");
        store.subscribe(|_, _| Err("nope".into()));

        let mut surface = RecordingSurface::new(320, 240);
        let error = scene
            .tick(FRAME, &mut store, &InputTracker::new(), &mut surface)
            .expect_err("listener failure");
        assert!(matches!(error, SceneError::Store(_)));
    }
}
