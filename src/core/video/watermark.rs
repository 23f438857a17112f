use image::{Rgb, RgbImage};

use super::font::{self, GLYPH_HEIGHT, GLYPH_SPACING, GLYPH_WIDTH};
use super::frame::Frame;
use crate::core::config::WatermarkConfig;

/// 固定水印：文字右对齐贴在右下角
#[derive(Debug, Clone)]
pub struct Watermark {
    text: String,
    margin: u32,
    scale: u32,
    color: Rgb<u8>,
}

impl Watermark {
    pub fn new(text: impl Into<String>, margin: u32, scale: u32, color: [u8; 3]) -> Self {
        Self {
            text: text.into(),
            margin,
            scale: scale.max(1),
            color: Rgb(color),
        }
    }

    pub fn from_config(config: &WatermarkConfig) -> Self {
        Self::new(config.text.clone(), config.margin, config.scale, config.color)
    }

    /// 缩放后的文字像素尺寸
    pub fn text_size(&self) -> (u32, u32) {
        let (w, h) = font::measure(&self.text);
        (w * self.scale, h * self.scale)
    }

    /// 在帧的副本上绘制水印，原帧保持不变
    pub fn annotate(&self, frame: &Frame) -> Option<RgbImage> {
        let mut image = frame.to_image()?;
        self.apply(&mut image);
        Some(image)
    }

    /// 直接在图像上绘制，超出画面的部分被裁掉
    pub fn apply(&self, image: &mut RgbImage) {
        let (text_w, text_h) = self.text_size();
        if text_w == 0 {
            return;
        }
        let (width, height) = image.dimensions();
        let origin_x = width as i64 - text_w as i64 - self.margin as i64;
        let origin_y = height as i64 - text_h as i64 - self.margin as i64;
        let advance = ((GLYPH_WIDTH + GLYPH_SPACING) * self.scale) as i64;
        let scale = self.scale as i64;

        for (i, c) in self.text.chars().enumerate() {
            let glyph = font::glyph(c);
            let glyph_x = origin_x + i as i64 * advance;
            for col in 0..GLYPH_WIDTH {
                for row in 0..GLYPH_HEIGHT {
                    if !font::is_set(glyph, col, row) {
                        continue;
                    }
                    let x0 = glyph_x + col as i64 * scale;
                    let y0 = origin_y + row as i64 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let (x, y) = (x0 + dx, y0 + dy);
                            if x >= 0 && y >= 0 && x < width as i64 && y < height as i64 {
                                image.put_pixel(x as u32, y as u32, self.color);
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::from_config(&WatermarkConfig::default())
    }
}
