use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use engine::{
    key, resolve_app_paths, EntityAttributes, InputCode, LoopConfig, SpriteOptions, Timestep,
};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub(crate) const CONFIG_ENV_VAR: &str = "BOOGIE_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct WindowConfig {
    pub(crate) title: String,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Boogie".to_string(),
            width: 480,
            height: 320,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct BindingConfig {
    pub(crate) code: InputCode,
    pub(crate) action: String,
}

impl BindingConfig {
    fn new(code: InputCode, action: &str) -> Self {
        Self {
            code,
            action: action.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct GameConfig {
    pub(crate) window: WindowConfig,
    pub(crate) timestep: Timestep,
    pub(crate) max_steps_per_frame: u32,
    pub(crate) metrics_log_interval_ms: u64,
    pub(crate) exit_on_escape: bool,
    pub(crate) bindings: Vec<BindingConfig>,
    pub(crate) player: EntityAttributes,
    pub(crate) player_sprite: Option<String>,
    pub(crate) sprite: SpriteOptions,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            timestep: Timestep::Variable,
            max_steps_per_frame: 5,
            metrics_log_interval_ms: 5_000,
            exit_on_escape: true,
            bindings: default_bindings(),
            player: EntityAttributes::default(),
            player_sprite: None,
            sprite: SpriteOptions::default(),
        }
    }
}

impl GameConfig {
    pub(crate) fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            window_title: self.window.title.clone(),
            window_width: self.window.width,
            window_height: self.window.height,
            timestep: self.timestep,
            max_steps_per_frame: self.max_steps_per_frame,
            metrics_log_interval: Duration::from_millis(self.metrics_log_interval_ms),
            exit_on_escape: self.exit_on_escape,
            ..LoopConfig::default()
        }
    }
}

fn default_bindings() -> Vec<BindingConfig> {
    vec![
        BindingConfig::new(key::LEFT_ARROW, "left"),
        BindingConfig::new(key::UP_ARROW, "up"),
        BindingConfig::new(key::RIGHT_ARROW, "right"),
        BindingConfig::new(key::DOWN_ARROW, "down"),
        BindingConfig::new(InputCode(65), "left"),
        BindingConfig::new(InputCode(87), "up"),
        BindingConfig::new(InputCode(68), "right"),
        BindingConfig::new(InputCode(83), "down"),
        BindingConfig::new(key::SPACE, "fire"),
    ]
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) game: GameConfig,
    pub(crate) images_dir: Option<PathBuf>,
}

pub(crate) fn build_app() -> Result<AppWiring, String> {
    init_tracing();
    info!("=== Boogie Startup ===");

    let game = load_game_config()?;
    let images_dir = match &game.player_sprite {
        Some(sprite) => match resolve_app_paths() {
            Ok(paths) => {
                info!(
                    root = %paths.root.display(),
                    images_dir = %paths.images_dir.display(),
                    "startup"
                );
                Some(paths.images_dir)
            }
            Err(error) => {
                warn!(sprite = %sprite, error = %error, "asset_root_unresolved");
                None
            }
        },
        None => None,
    };

    Ok(AppWiring {
        config: game.loop_config(),
        game,
        images_dir,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_game_config() -> Result<GameConfig, String> {
    let Some(path) = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) else {
        info!("no {CONFIG_ENV_VAR} set; using default game config");
        return Ok(GameConfig::default());
    };
    let raw = fs::read_to_string(&path)
        .map_err(|error| format!("read config '{}': {error}", path.display()))?;
    let config = parse_game_config(&raw)?;
    info!(
        path = %path.display(),
        bindings = config.bindings.len(),
        timestep = ?config.timestep,
        "game_config_loaded"
    );
    Ok(config)
}

pub(crate) fn parse_game_config(raw: &str) -> Result<GameConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, GameConfig>(&mut deserializer) {
        Ok(config) => Ok(config),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse config json: {source}"))
            } else {
                Err(format!("parse config json at {path}: {source}"))
            }
        }
    }
}
