use super::{Color, ImageData, Rect, Surface};

/// RGBA8 frame buffer used by the headless platform and presented by the
/// desktop host.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.rgba.clear();
        self.rgba.resize(width as usize * height as usize * 4, 0);
    }

    pub fn frame(&self) -> &[u8] {
        &self.rgba
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

    /// Copies the buffer into a presentation frame of the same dimensions.
    /// Returns false when the byte lengths disagree.
    pub fn copy_into(&self, frame: &mut [u8]) -> bool {
        if frame.len() != self.rgba.len() {
            return false;
        }
        frame.copy_from_slice(&self.rgba);
        true
    }

    fn clip(&self, rect: Rect) -> Option<PixelRect> {
        if !(rect.x.is_finite() && rect.y.is_finite() && rect.w.is_finite() && rect.h.is_finite())
        {
            return None;
        }
        let left = rect.x.round() as i32;
        let top = rect.y.round() as i32;
        let right = (rect.x + rect.w).round() as i32;
        let bottom = (rect.y + rect.h).round() as i32;

        let clipped = PixelRect {
            left: left.max(0),
            top: top.max(0),
            right: right.min(self.width as i32),
            bottom: bottom.min(self.height as i32),
        };
        if clipped.left >= clipped.right || clipped.top >= clipped.bottom {
            return None;
        }
        Some(clipped)
    }

    fn fill_clipped(&mut self, rect: Rect, rgba: [u8; 4]) {
        let Some(area) = self.clip(rect) else {
            return;
        };
        for y in area.top..area.bottom {
            for x in area.left..area.right {
                write_pixel_rgba_clipped(&mut self.rgba, self.width as usize, x, y, rgba);
            }
        }
    }
}

impl Surface for PixelBuffer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.fill_clipped(rect, Color::TRANSPARENT.rgba());
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.fill_clipped(rect, color.rgba());
    }

    fn blit(&mut self, image: &ImageData, src: Rect, dst: Rect) {
        if image.width() == 0 || image.height() == 0 || dst.w <= 0.0 || dst.h <= 0.0 {
            return;
        }
        let Some(area) = self.clip(dst) else {
            return;
        };
        let scale_x = src.w / dst.w;
        let scale_y = src.h / dst.h;

        for out_y in area.top..area.bottom {
            let dy = out_y as f32 - dst.y;
            let src_y = (src.y + dy * scale_y).floor();
            if src_y < 0.0 {
                continue;
            }
            for out_x in area.left..area.right {
                let dx = out_x as f32 - dst.x;
                let src_x = (src.x + dx * scale_x).floor();
                if src_x < 0.0 {
                    continue;
                }
                let Some(texel) = image.pixel(src_x as u32, src_y as u32) else {
                    continue;
                };
                if texel[3] == 0 {
                    continue;
                }
                write_pixel_rgba_clipped(&mut self.rgba, self.width as usize, out_x, out_y, texel);
            }
        }
    }

    fn fill_pattern(&mut self, image: &ImageData, rect: Rect) {
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        let Some(area) = self.clip(rect) else {
            return;
        };
        let tile_w = image.width() as i32;
        let tile_h = image.height() as i32;

        // Patterns repeat from the surface origin, not from the rect corner.
        for y in area.top..area.bottom {
            for x in area.left..area.right {
                let Some(texel) =
                    image.pixel(x.rem_euclid(tile_w) as u32, y.rem_euclid(tile_h) as u32)
                else {
                    continue;
                };
                if texel[3] == 0 {
                    continue;
                }
                write_pixel_rgba_clipped(&mut self.rgba, self.width as usize, x, y, texel);
            }
        }
    }
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}
