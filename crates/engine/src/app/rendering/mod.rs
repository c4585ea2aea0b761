mod color;
mod pixel_buffer;
mod sprite;

use thiserror::Error;

pub use color::{Color, ColorParseError};
pub use pixel_buffer::PixelBuffer;
pub use sprite::{Sprite, SpriteError, SpriteOptions, SPRITE_EXTENSION};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// The 2D drawable target the runtime renders into.
pub trait Surface {
    fn size(&self) -> (u32, u32);
    fn clear_rect(&mut self, rect: Rect);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn blit(&mut self, image: &ImageData, src: Rect, dst: Rect);
    fn fill_pattern(&mut self, image: &ImageData, rect: Rect);

    fn clear(&mut self) {
        let (width, height) = self.size();
        self.clear_rect(Rect::new(0.0, 0.0, width as f32, height as f32));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImageDataError {
    #[error("pixel byte count mismatch: expected {expected}, got {actual}")]
    ByteCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ImageDataError> {
        let expected = width as usize * height as usize * 4;
        let actual = rgba.len();
        if expected != actual {
            return Err(ImageDataError::ByteCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.rgba[offset..offset + 4]);
        Some(out)
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DrawCall {
    Clear(Rect),
    Fill(Rect, Color),
    Blit { src: Rect, dst: Rect },
    Pattern(Rect),
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSurface {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) calls: Vec<DrawCall>,
}

#[cfg(test)]
impl RecordingSurface {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
        }
    }

    pub(crate) fn fills(&self) -> Vec<(Rect, Color)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DrawCall::Fill(rect, color) => Some((*rect, *color)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.calls.push(DrawCall::Clear(rect));
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.calls.push(DrawCall::Fill(rect, color));
    }

    fn blit(&mut self, _image: &ImageData, src: Rect, dst: Rect) {
        self.calls.push(DrawCall::Blit { src, dst });
    }

    fn fill_pattern(&mut self, _image: &ImageData, rect: Rect) {
        self.calls.push(DrawCall::Pattern(rect));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_data_rejects_wrong_byte_count() {
        let error = ImageData::new(2, 2, vec![0; 15]).expect_err("mismatch");
        assert_eq!(
            error,
            ImageDataError::ByteCountMismatch {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn image_data_pixel_bounds() {
        let image = ImageData::new(1, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).expect("image");
        assert_eq!(image.pixel(0, 1), Some([5, 6, 7, 8]));
        assert_eq!(image.pixel(1, 0), None);
        assert_eq!(image.pixel(0, 2), None);
    }

    #[test]
    fn default_clear_covers_whole_surface() {
        let mut surface = RecordingSurface::new(320, 200);
        surface.clear();
        assert_eq!(
            surface.calls,
            vec![DrawCall::Clear(Rect::new(0.0, 0.0, 320.0, 200.0))]
        );
    }
}
