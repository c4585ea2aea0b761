use std::path::{Path, PathBuf};

use image::ImageReader;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{ImageData, ImageDataError, Rect, Surface};

pub const SPRITE_EXTENSION: &str = "png";

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("invalid sprite name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("failed to open sprite image at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode sprite image at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("decoded sprite image at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: ImageDataError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpriteOptions {
    pub anim_speed: f32,
    pub frames: u32,
    pub current_frame: u32,
    pub sheet_x: f32,
    pub sheet_y: f32,
    pub width: f32,
    pub height: f32,
    pub sheet_width: f32,
    pub sheet_height: f32,
}

impl Default for SpriteOptions {
    fn default() -> Self {
        Self {
            anim_speed: 0.25,
            frames: 3,
            current_frame: 2,
            sheet_x: 0.0,
            sheet_y: 0.0,
            width: 0.0,
            height: 0.0,
            sheet_width: 0.0,
            sheet_height: 0.0,
        }
    }
}

/// A frame-animated view onto a sprite sheet. Drawing is a no-op until an
/// image has been attached.
#[derive(Debug, Clone)]
pub struct Sprite {
    options: SpriteOptions,
    elapsed: f32,
    image: Option<ImageData>,
}

impl Sprite {
    pub fn new(options: SpriteOptions) -> Self {
        Self {
            options,
            elapsed: 0.0,
            image: None,
        }
    }

    pub fn load(
        images_dir: &Path,
        name: &str,
        options: SpriteOptions,
    ) -> Result<Self, SpriteError> {
        let path = sprite_path(images_dir, name)?;
        let image = load_image_rgba(&path)?;
        debug!(
            sprite = name,
            width = image.width(),
            height = image.height(),
            "sprite_loaded"
        );
        let mut sprite = Self::new(options);
        sprite.attach(image);
        Ok(sprite)
    }

    pub fn attach(&mut self, image: ImageData) {
        if self.options.sheet_width == 0.0 {
            self.options.sheet_width = if image.width() > 0 {
                image.width() as f32
            } else {
                self.options.width
            };
        }
        if self.options.sheet_height == 0.0 {
            self.options.sheet_height = if image.height() > 0 {
                image.height() as f32
            } else {
                self.options.height
            };
        }
        self.image = Some(image);
    }

    pub fn is_ready(&self) -> bool {
        self.image.is_some()
    }

    pub fn options(&self) -> &SpriteOptions {
        &self.options
    }

    pub fn current_frame(&self) -> u32 {
        self.options.current_frame
    }

    pub fn sheet_x(&self) -> f32 {
        self.options.sheet_x
    }

    pub fn animate(&mut self, dt: f32) {
        if self.elapsed > self.options.anim_speed || self.elapsed == 0.0 {
            self.elapsed = 0.0;
            self.options.sheet_x = self.options.current_frame as f32 * self.options.width;
            self.options.current_frame += 1;
            if self.options.current_frame >= self.options.frames {
                self.options.current_frame = 0;
            }
        }
        self.elapsed += dt;
    }

    pub fn draw(&self, surface: &mut dyn Surface, x: f32, y: f32) {
        let Some(image) = &self.image else {
            return;
        };
        let SpriteOptions {
            sheet_x,
            sheet_y,
            width,
            height,
            ..
        } = self.options;
        surface.blit(
            image,
            Rect::new(sheet_x, sheet_y, width, height),
            Rect::new(x, y, width, height),
        );
    }

    pub fn fill(&self, surface: &mut dyn Surface, rect: Rect) {
        if let Some(image) = &self.image {
            surface.fill_pattern(image, rect);
        }
    }
}

fn sprite_path(images_dir: &Path, name: &str) -> Result<PathBuf, SpriteError> {
    validate_sprite_name(name)?;
    Ok(images_dir.join(format!("{name}.{SPRITE_EXTENSION}")))
}

fn validate_sprite_name(name: &str) -> Result<(), SpriteError> {
    let reject = |reason| {
        Err(SpriteError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return reject("name is empty");
    }
    if name.starts_with('/') || name.contains('\\') {
        return reject("name must be a relative forward-slash path");
    }
    if name.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return reject("name contains an empty or parent segment");
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '/'))
    {
        return reject("name contains a character outside [A-Za-z0-9_-/]");
    }
    Ok(())
}

fn load_image_rgba(path: &Path) -> Result<ImageData, SpriteError> {
    let reader = ImageReader::open(path).map_err(|source| SpriteError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = reader.decode().map_err(|source| SpriteError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let image = decoded.to_rgba8();
    let (width, height) = image.dimensions();
    ImageData::new(width, height, image.into_raw()).map_err(|source| SpriteError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}
