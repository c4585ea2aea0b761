use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;

pub use app::{
    boot, button, dom_key_code, entity, headless_platform, key, run_app, step_kind, AppError,
    Behavior, Clock, Color, ColorParseError, Direction, EntityAttributes, EntityContext,
    EntityHandle, EntityKind, EntityRecord, EntityState, EventDisposition, EventQueue, FrameHost,
    FrameRequestId, FrameScheduler, GameState, HeadlessControls, ImageData, ImageDataError,
    InputCode, InputSource, InputTracker, KindBehavior, ListenerError, LoopConfig,
    LoopMetricsSnapshot, ManualClock, MetricsHandle, Phase, PixelBuffer, Platform,
    PointerPosition, QueuedFrames, RawInputEvent, Rect, Runtime, RuntimeError, Scene, SceneError,
    SceneId, SceneTick, SchedulerState, Sprite, SpriteError, SpriteOptions, State, Static, Store,
    StoreError, Subscription, Surface, SystemClock, TickHandler, TickReport, Timestep, UpdateFn,
    Vec2, Viewport, DEFAULT_ENTITY_SIZE, DEFAULT_ENTITY_SPEED, PROJECTILE_DEFAULT_LIFE,
    REFERENCE_FRAME_RATE, SPRITE_EXTENSION,
};

pub const ROOT_ENV_VAR: &str = "BOOGIE_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub images_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "BOOGIE_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/boogie\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

/// Locates the asset root from `BOOGIE_ROOT`, or by walking up from the
/// running executable.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    Ok(app_paths_for_root(root))
}

fn app_paths_for_root(root: PathBuf) -> AppPaths {
    let images_dir = root.join("assets").join("images");
    AppPaths { root, images_dir }
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            find_root_from(&exe_dir).ok_or_else(|| StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| is_repo_marker(candidate))
        .map(normalize_path)
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
