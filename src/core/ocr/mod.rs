//! 文字识别能力接口：给一帧像素，返回按引擎原始顺序排列的文字片段

pub mod tesseract;

use serde::Serialize;
use thiserror::Error;

use crate::core::video::frame::Frame;

pub use tesseract::TesseractRecognizer;

/// 文字所在的矩形区域（像素坐标，左上角为原点）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoundingRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingRegion {
    pub fn union(&self, other: &BoundingRegion) -> BoundingRegion {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        BoundingRegion {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSpan {
    pub region: BoundingRegion,
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("recognizer not available: {0}")]
    Unavailable(String),
    #[error("recognizer failed: {0}")]
    Engine(String),
    #[error("invalid frame buffer")]
    InvalidFrame,
}

pub trait TextRecognizer: Send + Sync {
    /// 识别一帧中的文字；片段顺序必须保持引擎的原始输出顺序
    fn read_text(&self, frame: &Frame) -> Result<Vec<TextSpan>, RecognitionError>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

/// 不做任何识别（关闭 OCR 时使用）
pub struct NoopRecognizer;

impl TextRecognizer for NoopRecognizer {
    fn read_text(&self, _frame: &Frame) -> Result<Vec<TextSpan>, RecognitionError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

type SpanPattern = Box<dyn Fn(&Frame) -> Result<Vec<String>, RecognitionError> + Send + Sync>;

pub struct MockTextRecognizer {
    // 根据帧内容模拟识别结果
    pattern: Option<SpanPattern>,
}

impl MockTextRecognizer {
    pub fn new() -> Self {
        Self { pattern: None }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&Frame) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(move |frame| Ok(pattern(frame)))),
        }
    }

    /// 每一帧都识别失败
    pub fn failing(reason: &str) -> Self {
        let reason = reason.to_string();
        Self {
            pattern: Some(Box::new(move |_| Err(RecognitionError::Engine(reason.clone())))),
        }
    }
}

impl Default for MockTextRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn read_text(&self, frame: &Frame) -> Result<Vec<TextSpan>, RecognitionError> {
        let Some(pattern) = self.pattern.as_ref() else {
            return Ok(Vec::new());
        };
        let region = BoundingRegion {
            x: 0,
            y: 0,
            width: frame.width,
            height: frame.height,
        };
        Ok(pattern(frame)?
            .into_iter()
            .map(|text| TextSpan {
                region,
                text,
                confidence: 0.85,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
