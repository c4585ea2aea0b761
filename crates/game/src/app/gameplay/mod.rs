use std::path::Path;

use engine::{
    step_kind, Behavior, Color, EntityContext, EntityKind, EntityRecord, EntityState,
    GameState, Rect, Runtime, RuntimeError, SceneId, Sprite, SpriteOptions, Surface,
};
use tracing::{info, warn};

use super::bootstrap::GameConfig;

pub(crate) const PLAYER_KEY: &str = "player";
pub(crate) const BOLT_KEY: &str = "bolt";

const PLAYER_COLOR: Color = Color::rgb(0x22, 0xcc, 0x77);
const BOLT_COLOR: Color = Color::rgb(0xff, 0xdd, 0x33);
const BOLT_SIZE: f32 = 4.0;
const BOLT_SPEED: f32 = 8.0;
const BOLT_LIFE: f32 = 160.0;
const LIFE_BAR_HEIGHT: f32 = 3.0;

/// Binds keys, registers the arena scene with the player and its bolt, and
/// installs the HUD hook.
pub(crate) fn install<S: Surface>(
    runtime: &mut Runtime<S>,
    config: &GameConfig,
    images_dir: Option<&Path>,
) -> Result<SceneId, RuntimeError> {
    for binding in &config.bindings {
        runtime.bind(binding.code, binding.action.clone());
    }

    let (width, height) = (config.window.width, config.window.height);
    let scene = runtime.scene(width, height);

    let player = config.player.merge_over(player_base(width, height));
    let sprite = load_player_sprite(config, images_dir, &player);
    runtime.add(
        scene,
        EntityRecord::new(PLAYER_KEY)
            .with_state(player)
            .with_behavior(PlayerBehavior { sprite }),
    )?;
    runtime.add(
        scene,
        EntityRecord::new(BOLT_KEY)
            .with_state(bolt_base())
            .with_behavior(BoltBehavior),
    )?;

    runtime.set_draw_hook(draw_bolt_life);
    info!(
        scene = %scene,
        bindings = config.bindings.len(),
        sprite = sprite_label(config),
        "arena_ready"
    );
    Ok(scene)
}

fn player_base(width: u32, height: u32) -> EntityState {
    let base = EntityState {
        color: PLAYER_COLOR,
        kind: EntityKind::Creature,
        ..EntityState::default()
    };
    EntityState {
        x: (width as f32 - base.w) / 2.0,
        y: (height as f32 - base.h) / 2.0,
        ..base
    }
}

fn bolt_base() -> EntityState {
    EntityState {
        w: BOLT_SIZE,
        h: BOLT_SIZE,
        alive: false,
        color: BOLT_COLOR,
        speed: BOLT_SPEED,
        kind: EntityKind::Projectile {
            travelled: 0.0,
            life: BOLT_LIFE,
        },
        ..EntityState::default()
    }
}

fn sprite_label(config: &GameConfig) -> &str {
    config.player_sprite.as_deref().unwrap_or("none")
}

fn load_player_sprite(
    config: &GameConfig,
    images_dir: Option<&Path>,
    player: &EntityState,
) -> Option<Sprite> {
    let name = config.player_sprite.as_deref()?;
    let images_dir = images_dir?;
    let options = SpriteOptions {
        width: if config.sprite.width > 0.0 {
            config.sprite.width
        } else {
            player.w
        },
        height: if config.sprite.height > 0.0 {
            config.sprite.height
        } else {
            player.h
        },
        ..config.sprite
    };
    match Sprite::load(images_dir, name, options) {
        Ok(sprite) => Some(sprite),
        Err(error) => {
            warn!(sprite = name, error = %error, "sprite_load_failed");
            None
        }
    }
}

/// Steers like a creature and, when a sprite is loaded, animates it while
/// moving.
pub(crate) struct PlayerBehavior {
    sprite: Option<Sprite>,
}

impl Behavior for PlayerBehavior {
    fn update(&mut self, dt: f32, ctx: &EntityContext<'_>) -> Option<EntityState> {
        let next = ctx
            .current()
            .and_then(|state| step_kind(state, dt, ctx.input));
        if let (Some(sprite), Some(_)) = (self.sprite.as_mut(), next) {
            sprite.animate(dt);
        }
        next
    }

    fn draw(&mut self, surface: &mut dyn Surface, ctx: &EntityContext<'_>) {
        let Some(state) = ctx.current().filter(|state| state.alive) else {
            return;
        };
        match &self.sprite {
            Some(sprite) if sprite.is_ready() => sprite.draw(surface, state.x, state.y),
            _ => surface.fill_rect(state.rect(), state.color),
        }
    }
}

/// Relaunches from the player's facing edge whenever `fire` is pressed;
/// otherwise flies as a projectile.
pub(crate) struct BoltBehavior;

impl Behavior for BoltBehavior {
    fn update(&mut self, dt: f32, ctx: &EntityContext<'_>) -> Option<EntityState> {
        let current = ctx.current()?;
        if ctx.input.pressed("fire") {
            if let Some(player) = ctx.state.get(PLAYER_KEY) {
                return Some(launch_from(current, player));
            }
        }
        step_kind(current, dt, ctx.input)
    }
}

fn launch_from(bolt: &EntityState, shooter: &EntityState) -> EntityState {
    let muzzle = shooter.face_midpoint();
    let life = match bolt.kind {
        EntityKind::Projectile { life, .. } => life,
        _ => BOLT_LIFE,
    };
    EntityState {
        x: muzzle.x - bolt.w / 2.0,
        y: muzzle.y - bolt.h / 2.0,
        alive: true,
        direction: shooter.direction,
        kind: EntityKind::Projectile {
            travelled: 0.0,
            life,
        },
        ..*bolt
    }
}

/// Shrinking bar along the top edge showing how far the bolt can still fly.
fn draw_bolt_life(surface: &mut dyn Surface, state: &GameState) {
    let Some(bolt) = state.get(BOLT_KEY).filter(|bolt| bolt.alive) else {
        return;
    };
    let EntityKind::Projectile { travelled, life } = bolt.kind else {
        return;
    };
    if life <= 0.0 {
        return;
    }
    let remaining = ((life - travelled) / life).clamp(0.0, 1.0);
    let (width, _) = surface.size();
    surface.fill_rect(
        Rect::new(0.0, 0.0, width as f32 * remaining, LIFE_BAR_HEIGHT),
        bolt.color,
    );
}
