use rayon::prelude::*;

use super::frame::Frame;

/// 内容差的上限（通道均值差的最大值）
pub const MAX_SCORE: f64 = 255.0;

/// 帧内容签名：8 位 HSV 三个平面
///
/// H 使用 OpenCV 约定的 0..180，S/V 为 0..256。
#[derive(Debug, Clone)]
pub struct ContentSignature {
    width: u32,
    height: u32,
    hue: Vec<u8>,
    saturation: Vec<u8>,
    value: Vec<u8>,
}

impl ContentSignature {
    pub fn from_frame(frame: &Frame) -> Self {
        let hsv: Vec<[u8; 3]> = frame
            .data
            .par_chunks_exact(3)
            .map(|rgb| rgb_to_hsv(rgb[0], rgb[1], rgb[2]))
            .collect();

        let mut hue = Vec::with_capacity(hsv.len());
        let mut saturation = Vec::with_capacity(hsv.len());
        let mut value = Vec::with_capacity(hsv.len());
        for [h, s, v] in hsv {
            hue.push(h);
            saturation.push(s);
            value.push(v);
        }

        Self {
            width: frame.width,
            height: frame.height,
            hue,
            saturation,
            value,
        }
    }

    /// 与另一帧签名的内容差：三个通道各自的平均绝对差，再取平均，范围 0..=255
    pub fn distance(&self, other: &ContentSignature) -> f64 {
        if (self.width, self.height) != (other.width, other.height) || self.hue.is_empty() {
            return MAX_SCORE;
        }

        let delta_h = mean_abs_delta(&self.hue, &other.hue);
        let delta_s = mean_abs_delta(&self.saturation, &other.saturation);
        let delta_v = mean_abs_delta(&self.value, &other.value);
        (delta_h + delta_s + delta_v) / 3.0
    }
}

/// 逐帧计算相邻帧的内容差
pub struct FrameDiffFilter {
    last_signature: Option<ContentSignature>,
}

impl FrameDiffFilter {
    pub fn new() -> Self {
        Self {
            last_signature: None,
        }
    }

    /// 返回与上一帧的内容差；第一帧没有参照，返回 None
    pub fn score(&mut self, frame: &Frame) -> Option<f64> {
        let current = ContentSignature::from_frame(frame);
        let score = self
            .last_signature
            .as_ref()
            .map(|last| current.distance(last));
        self.last_signature = Some(current);
        score
    }

    pub fn reset(&mut self) {
        self.last_signature = None;
    }
}

impl Default for FrameDiffFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_abs_delta(a: &[u8], b: &[u8]) -> f64 {
    let sum: u64 = a
        .par_iter()
        .zip(b.par_iter())
        .map(|(&x, &y)| (x as i16 - y as i16).unsigned_abs() as u64)
        .sum();
    sum as f64 / a.len().max(1) as f64
}

/// RGB -> 8 位 HSV（与 OpenCV COLOR_RGB2HSV 一致的取值范围）
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = (max - min) as f32;

    let v = max;
    let s = if max == 0 {
        0
    } else {
        (255.0 * delta / max as f32).round() as u8
    };

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g as f32 - b as f32) / delta
    } else if max == g {
        120.0 + 60.0 * (b as f32 - r as f32) / delta
    } else {
        240.0 + 60.0 * (r as f32 - g as f32) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    let h = ((h / 2.0).round() as u32 % 180) as u8;

    [h, s, v]
}
