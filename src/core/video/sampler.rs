//! 关键帧采样：在每个场景起点定位一帧，识别文字、加水印、落盘

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::scene::SceneList;
use super::source::{DecodeOptions, FrameSource, VideoBackend};
use super::text::AccumulatedText;
use super::watermark::Watermark;
use crate::core::cancel::CancelToken;
use crate::core::error::{Notice, PipelineError};
use crate::core::ocr::{TextRecognizer, TextSpan};

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub max_keyframes: usize,
    pub output_dir: PathBuf,
    pub jpeg_quality: u8,
    pub text_delimiter: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_keyframes: 5,
            output_dir: PathBuf::from("images"),
            jpeg_quality: 90,
            text_delimiter: "\n".to_string(),
        }
    }
}

/// 一张已落盘的关键帧，创建后不再修改
#[derive(Debug, Clone)]
pub struct Keyframe {
    pub source_timestamp: Duration,
    pub frame_number: u64,
    /// 加过水印的副本
    pub pixels: RgbImage,
    pub recognized_text: Vec<TextSpan>,
    pub artifact_path: PathBuf,
}

#[derive(Debug)]
pub struct SampleOutcome {
    pub keyframes: Vec<Keyframe>,
    pub text: AccumulatedText,
    pub notices: Vec<Notice>,
}

pub struct KeyframeSampler {
    config: SamplerConfig,
}

impl KeyframeSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// 按场景顺序采样，最多 `max_keyframes` 张；解码句柄在所有路径上都会关闭
    pub fn sample(
        &self,
        backend: &dyn VideoBackend,
        path: &Path,
        scenes: &SceneList,
        recognizer: &dyn TextRecognizer,
        watermark: &Watermark,
        cancel: &CancelToken,
    ) -> Result<SampleOutcome, PipelineError> {
        let mut outcome = SampleOutcome {
            keyframes: Vec::new(),
            text: AccumulatedText::new(self.config.text_delimiter.clone()),
            notices: Vec::new(),
        };

        if scenes.is_empty() {
            info!("⚠️ No scenes detected, nothing to sample");
            outcome.notices.push(Notice::NoScenesDetected);
            return Ok(outcome);
        }
        if self.config.max_keyframes == 0 {
            debug!("max_keyframes is 0, skipping sampling");
            return Ok(outcome);
        }

        let mut source = backend.open(path, &DecodeOptions::default())?;
        let result = self.sample_from(source.as_mut(), scenes, recognizer, watermark, cancel, &mut outcome);
        source.close();
        result?;

        info!(
            "📸 Sampled {} keyframes ({} text spans) into {}",
            outcome.keyframes.len(),
            outcome.text.span_count(),
            self.config.output_dir.display()
        );
        Ok(outcome)
    }

    fn sample_from(
        &self,
        source: &mut dyn FrameSource,
        scenes: &SceneList,
        recognizer: &dyn TextRecognizer,
        watermark: &Watermark,
        cancel: &CancelToken,
        outcome: &mut SampleOutcome,
    ) -> Result<(), PipelineError> {
        let mut seen: HashSet<u64> = HashSet::new();

        for interval in &scenes.intervals {
            if outcome.keyframes.len() >= self.config.max_keyframes {
                break;
            }
            cancel.check()?;

            let Some(frame) = source.seek(interval.start)? else {
                warn!(
                    "⏭️ Seek to {:.3}s hit end of stream, skipped",
                    interval.start.as_secs_f64()
                );
                outcome.notices.push(Notice::SeekMiss {
                    timestamp: interval.start,
                });
                continue;
            };
            if !seen.insert(frame.frame_number) {
                debug!("frame {} already sampled, skipped", frame.frame_number);
                continue;
            }

            let spans = match recognizer.read_text(&frame) {
                Ok(spans) => spans,
                Err(e) => {
                    warn!(
                        "⚠️ Text recognition failed at {:.3}s: {}",
                        frame.timestamp.as_secs_f64(),
                        e
                    );
                    outcome.notices.push(Notice::RecognitionFailed {
                        timestamp: frame.timestamp,
                        reason: e.to_string(),
                    });
                    Vec::new()
                }
            };

            let pixels = watermark.annotate(&frame).ok_or_else(|| {
                PipelineError::unreadable(
                    "frame buffer",
                    format!("frame {} has an inconsistent pixel buffer", frame.frame_number),
                )
            })?;

            let artifact_path = self.config.output_dir.join(artifact_name(frame.timestamp));
            write_jpeg_atomic(&pixels, &artifact_path, self.config.jpeg_quality)?;
            debug!(
                "🖼️ Keyframe {} at {:.3}s -> {}",
                frame.frame_number,
                frame.timestamp.as_secs_f64(),
                artifact_path.display()
            );

            outcome.text.push_spans(&spans);
            outcome.keyframes.push(Keyframe {
                source_timestamp: frame.timestamp,
                frame_number: frame.frame_number,
                pixels,
                recognized_text: spans,
                artifact_path,
            });
        }
        Ok(())
    }
}

/// `frame_at_{秒}_{毫秒}.jpg`
pub fn artifact_name(timestamp: Duration) -> String {
    format!(
        "frame_at_{}_{:03}.jpg",
        timestamp.as_secs(),
        timestamp.subsec_millis()
    )
}

/// 先写同目录临时文件再 rename，中断时不会留下半张图片
fn write_jpeg_atomic(image: &RgbImage, path: &Path, quality: u8) -> Result<(), PipelineError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".keyframe_")
        .suffix(".jpg.tmp")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        JpegEncoder::new_with_quality(&mut writer, quality).encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgb8,
        )?;
        writer.flush()?;
    }
    temp.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    Ok(())
}
