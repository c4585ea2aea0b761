use serde::{Deserialize, Serialize};
use tracing::warn;

use super::input::InputTracker;
use super::rendering::{Color, Rect, Surface};
use super::store::{State, Store, StoreError};

pub type GameState = State<EntityState>;

/// Speeds are expressed in pixels per 1/60 s and scaled by the frame dt.
pub const REFERENCE_FRAME_RATE: f32 = 60.0;
pub const PROJECTILE_DEFAULT_LIFE: f32 = 16.0;

pub const DEFAULT_ENTITY_SIZE: f32 = 16.0;
pub const DEFAULT_ENTITY_SPEED: f32 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    N,
    E,
    #[default]
    S,
    W,
}

impl Direction {
    pub fn unit(self) -> Vec2 {
        match self {
            Direction::N => Vec2 { x: 0.0, y: -1.0 },
            Direction::E => Vec2 { x: 1.0, y: 0.0 },
            Direction::S => Vec2 { x: 0.0, y: 1.0 },
            Direction::W => Vec2 { x: -1.0, y: 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Block,
    Creature,
    Projectile {
        travelled: f32,
        life: f32,
    },
}

impl EntityKind {
    pub fn projectile() -> Self {
        Self::Projectile {
            travelled: 0.0,
            life: PROJECTILE_DEFAULT_LIFE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub alive: bool,
    pub color: Color,
    pub direction: Direction,
    pub speed: f32,
    pub kind: EntityKind,
}

impl Default for EntityState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: DEFAULT_ENTITY_SIZE,
            h: DEFAULT_ENTITY_SIZE,
            alive: true,
            color: Color::BLACK,
            direction: Direction::S,
            speed: DEFAULT_ENTITY_SPEED,
            kind: EntityKind::Block,
        }
    }
}

impl EntityState {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    /// Midpoint of the edge the entity is facing.
    pub fn face_midpoint(&self) -> Vec2 {
        match self.direction {
            Direction::N => Vec2 {
                x: self.x + self.w / 2.0,
                y: self.y,
            },
            Direction::E => Vec2 {
                x: self.x + self.w,
                y: self.y + self.h / 2.0,
            },
            Direction::S => Vec2 {
                x: self.x + self.w / 2.0,
                y: self.y + self.h,
            },
            Direction::W => Vec2 {
                x: self.x,
                y: self.y + self.h / 2.0,
            },
        }
    }

    pub fn step_distance(&self, dt: f32) -> f32 {
        self.speed * dt * REFERENCE_FRAME_RATE
    }

    pub fn moved(mut self, direction: Direction, distance: f32) -> Self {
        let unit = direction.unit();
        self.x += unit.x * distance;
        self.y += unit.y * distance;
        self
    }
}

/// Sparse overrides applied on top of [`EntityState::default`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntityAttributes {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub w: Option<f32>,
    pub h: Option<f32>,
    pub alive: Option<bool>,
    pub color: Option<Color>,
    pub direction: Option<Direction>,
    pub speed: Option<f32>,
    pub kind: Option<EntityKind>,
}

impl EntityAttributes {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn merge_over(&self, base: EntityState) -> EntityState {
        EntityState {
            x: self.x.unwrap_or(base.x),
            y: self.y.unwrap_or(base.y),
            w: self.w.unwrap_or(base.w),
            h: self.h.unwrap_or(base.h),
            alive: self.alive.unwrap_or(base.alive),
            color: self.color.unwrap_or(base.color),
            direction: self.direction.unwrap_or(base.direction),
            speed: self.speed.unwrap_or(base.speed),
            kind: self.kind.unwrap_or(base.kind),
        }
    }

    pub fn resolve(&self) -> EntityState {
        self.merge_over(EntityState::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHandle {
    key: String,
}

impl EntityHandle {
    pub(crate) fn new(key: String) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self, store: &Store<EntityState>) -> Option<EntityState> {
        store.get_entry(&self.key)
    }

    pub fn set(
        &self,
        store: &mut Store<EntityState>,
        state: EntityState,
    ) -> Result<(), StoreError> {
        store.set_entry(self.key.clone(), state)
    }

    /// Issues one filled rectangle for the stored entity. Returns false when
    /// the key is no longer present in the store.
    pub fn draw(&self, store: &Store<EntityState>, surface: &mut dyn Surface) -> bool {
        match store.get_entry(&self.key) {
            Some(state) => {
                surface.fill_rect(state.rect(), state.color);
                true
            }
            None => false,
        }
    }
}

/// Creates an entity from defaults plus `attributes` and registers it.
pub fn entity(
    store: &mut Store<EntityState>,
    key: impl Into<String>,
    attributes: &EntityAttributes,
) -> Result<EntityHandle, StoreError> {
    let key = key.into();
    register(store, &key, attributes.resolve())?;
    Ok(EntityHandle::new(key))
}

pub(crate) fn register(
    store: &mut Store<EntityState>,
    key: &str,
    state: EntityState,
) -> Result<(), StoreError> {
    if store.contains_key(key) {
        warn!(key, "entity_key_overwritten");
    }
    store.set_entry(key, state)
}

/// Per-kind update: returns the next state, or `None` when nothing changed.
pub fn step_kind(state: &EntityState, dt: f32, input: &InputTracker) -> Option<EntityState> {
    match state.kind {
        EntityKind::Block => None,
        EntityKind::Creature => steer_creature(state, dt, input),
        EntityKind::Projectile { travelled, life } => fly_projectile(state, dt, travelled, life),
    }
}

fn steer_creature(state: &EntityState, dt: f32, input: &InputTracker) -> Option<EntityState> {
    let heading = if input.down("left") {
        Direction::W
    } else if input.down("right") {
        Direction::E
    } else if input.down("up") {
        Direction::N
    } else if input.down("down") {
        Direction::S
    } else {
        return None;
    };

    let mut next = *state;
    next.direction = heading;
    Some(next.moved(heading, state.step_distance(dt)))
}

fn fly_projectile(
    state: &EntityState,
    dt: f32,
    travelled: f32,
    life: f32,
) -> Option<EntityState> {
    if !state.alive {
        return None;
    }
    let mut next = *state;
    if travelled >= life {
        next.alive = false;
        return Some(next);
    }
    let distance = state.step_distance(dt);
    next.kind = EntityKind::Projectile {
        travelled: travelled + distance,
        life,
    };
    Some(next.moved(state.direction, distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::input::{key, RawInputEvent};
    use crate::app::rendering::RecordingSurface;

    const FRAME: f32 = 1.0 / REFERENCE_FRAME_RATE;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.0001
    }

    #[test]
    fn defaults_match_documented_record() {
        let state = EntityState::default();
        assert!(state.alive);
        assert_eq!(state.color, Color::BLACK);
        assert_eq!((state.x, state.y, state.w, state.h), (0.0, 0.0, 16.0, 16.0));
        assert_eq!(state.direction, Direction::S);
        assert_eq!(state.speed, 5.0);
        assert_eq!(state.kind, EntityKind::Block);
    }

    #[test]
    fn factory_merges_attributes_over_defaults_and_registers() {
        let mut store = Store::default();
        let attributes = EntityAttributes {
            x: Some(40.0),
            color: Some(Color::rgb(255, 0, 0)),
            ..EntityAttributes::default()
        };

        let handle = entity(&mut store, "player", &attributes).expect("entity");
        let state = handle.get(&store).expect("stored");

        assert_eq!(handle.key(), "player");
        assert_eq!(state.x, 40.0);
        assert_eq!(state.y, 0.0);
        assert_eq!(state.w, 16.0);
        assert_eq!(state.color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn handle_set_writes_back_through_store() {
        let mut store = Store::default();
        let handle = entity(&mut store, "crate", &EntityAttributes::default()).expect("entity");
        let mut state = handle.get(&store).expect("stored");
        state.y = 12.0;

        assert_eq!(store.get_entry("crate").map(|s| s.y), Some(0.0));
        handle.set(&mut store, state).expect("set");
        assert_eq!(store.get_entry("crate").map(|s| s.y), Some(12.0));
    }

    #[test]
    fn handle_draw_issues_exactly_one_fill() {
        let mut store = Store::default();
        let handle = entity(
            &mut store,
            "wall",
            &EntityAttributes {
                w: Some(32.0),
                ..EntityAttributes::at(3.0, 4.0)
            },
        )
        .expect("entity");
        let mut surface = RecordingSurface::new(100, 100);

        assert!(handle.draw(&store, &mut surface));
        assert_eq!(surface.calls.len(), 1);
        assert_eq!(
            surface.fills(),
            vec![(Rect::new(3.0, 4.0, 32.0, 16.0), Color::BLACK)]
        );
    }

    #[test]
    fn handle_draw_without_entry_draws_nothing() {
        let store = Store::default();
        let handle = EntityHandle::new("ghost".to_string());
        let mut surface = RecordingSurface::new(10, 10);
        assert!(!handle.draw(&store, &mut surface));
        assert!(surface.calls.is_empty());
    }

    #[test]
    fn face_midpoint_follows_direction() {
        let mut state = EntityState {
            x: 10.0,
            y: 20.0,
            w: 8.0,
            h: 4.0,
            ..EntityState::default()
        };
        let expected = [
            (Direction::N, Vec2 { x: 14.0, y: 20.0 }),
            (Direction::E, Vec2 { x: 18.0, y: 22.0 }),
            (Direction::S, Vec2 { x: 14.0, y: 24.0 }),
            (Direction::W, Vec2 { x: 10.0, y: 22.0 }),
        ];
        for (direction, midpoint) in expected {
            state.direction = direction;
            assert_eq!(state.face_midpoint(), midpoint, "direction={direction:?}");
        }
    }

    #[test]
    fn creature_steers_with_priority_and_scales_by_dt() {
        let mut input = InputTracker::new();
        input.bind(key::LEFT_ARROW, "left");
        input.bind(key::UP_ARROW, "up");
        input.handle_event(RawInputEvent::KeyDown { code: 38 });
        input.handle_event(RawInputEvent::KeyDown { code: 37 });

        let creature = EntityState {
            kind: EntityKind::Creature,
            ..EntityState::default()
        };
        let next = step_kind(&creature, FRAME, &input).expect("moved");
        assert_eq!(next.direction, Direction::W);
        assert!(approx(next.x, -5.0));
        assert!(approx(next.y, 0.0));

        let half = step_kind(&creature, FRAME / 2.0, &input).expect("moved");
        assert!(approx(half.x, -2.5));
    }

    #[test]
    fn idle_creature_and_block_do_not_change() {
        let input = InputTracker::new();
        let creature = EntityState {
            kind: EntityKind::Creature,
            ..EntityState::default()
        };
        assert_eq!(step_kind(&creature, FRAME, &input), None);
        assert_eq!(step_kind(&EntityState::default(), FRAME, &input), None);
    }

    #[test]
    fn projectile_flies_until_life_is_spent() {
        let input = InputTracker::new();
        let mut state = EntityState {
            direction: Direction::E,
            kind: EntityKind::projectile(),
            ..EntityState::default()
        };

        let mut moving_ticks = 0;
        while state.alive {
            state = step_kind(&state, FRAME, &input).expect("projectile changes while alive");
            if state.alive {
                moving_ticks += 1;
            }
            assert!(moving_ticks < 100, "projectile never expired");
        }

        // 16 px of life at 5 px per frame: 4 moving frames, then expiry.
        assert_eq!(moving_ticks, 4);
        assert!(approx(state.x, 20.0));
        assert_eq!(step_kind(&state, FRAME, &input), None);
    }

    #[test]
    fn attributes_deserialize_sparse_and_reject_unknown_fields() {
        let attributes: EntityAttributes =
            serde_json::from_str(r##"{"x": 5, "color": "#fff", "kind": {"type": "creature"}}"##)
                .expect("attributes");
        let state = attributes.resolve();
        assert_eq!(state.x, 5.0);
        assert_eq!(state.color, Color::WHITE);
        assert_eq!(state.kind, EntityKind::Creature);
        assert_eq!(state.speed, 5.0);

        assert!(serde_json::from_str::<EntityAttributes>(r#"{"update": 1}"#).is_err());
    }
}
