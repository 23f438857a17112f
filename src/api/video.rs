//! 视频摘要入口

use log::{info, warn};
use std::path::Path;
use thiserror::Error;

use crate::core::cancel::CancelToken;
use crate::core::config::Config;
use crate::core::error::PipelineError;
use crate::core::ocr::{NoopRecognizer, RecognitionError, TesseractRecognizer, TextRecognizer};
use crate::core::pipeline::{Pipeline, PipelineRun};
use crate::core::video::{FfmpegBackend, VideoBackend};

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("text recognizer unavailable: {0}")]
    Recognizer(#[from] RecognitionError),
}

/// 视频摘要器 - 场景切分 + 关键帧文字识别 + 预览动画
///
/// ```ignore
/// let summarizer = VideoSummarizer::create(Config::default())?;
/// let run = summarizer.summarize(Path::new("talk.mp4"), &CancelToken::new())?;
/// println!("{}", run.text.as_str());
/// ```
pub struct VideoSummarizer {
    pipeline: Pipeline,
}

impl VideoSummarizer {
    /// 使用 ffmpeg 解码；开启 OCR 时检查 tesseract 是否可用
    pub fn create(config: Config) -> Result<Self, SummarizerError> {
        let recognizer: Box<dyn TextRecognizer> = if config.ocr.enabled {
            Box::new(TesseractRecognizer::new(&config.ocr.language, config.ocr.min_confidence)?)
        } else {
            warn!("⚠️ OCR disabled, keyframes will carry no text");
            Box::new(NoopRecognizer)
        };
        Ok(Self::with_parts(&config, Box::new(FfmpegBackend::new()), recognizer))
    }

    /// 自定义解码后端和识别器
    pub fn with_parts(
        config: &Config,
        backend: Box<dyn VideoBackend>,
        recognizer: Box<dyn TextRecognizer>,
    ) -> Self {
        info!("🎬 VideoSummarizer: created");
        Self {
            pipeline: Pipeline::new(config, backend, recognizer),
        }
    }

    pub fn summarize(&self, input: &Path, cancel: &CancelToken) -> Result<PipelineRun, SummarizerError> {
        Ok(self.pipeline.run(input, cancel)?)
    }
}

impl Drop for VideoSummarizer {
    fn drop(&mut self) {
        info!("🗑️ VideoSummarizer: released");
    }
}
