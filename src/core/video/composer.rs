//! 把关键帧图片按顺序合成一个循环播放的 GIF

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{Delay, Frame as AnimationFrame};
use log::{debug, info, warn};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::cancel::CancelToken;
use crate::core::error::PipelineError;

/// 量化调色板的速度（1 最慢最精细，30 最快）
const GIF_ENCODE_SPEED: i32 = 10;

/// 已写出的动画文件，`frame_duration_ms` 是写入文件的实际单帧时长
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimatedArtifact {
    pub path: PathBuf,
    pub frames: Vec<PathBuf>,
    pub frame_duration_ms: u32,
}

impl AnimatedArtifact {
    /// 总时长 = 帧数 × 单帧时长，不需要解码文件
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.frames.len() as u64 * u64::from(self.frame_duration_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composition {
    Composed(AnimatedArtifact),
    /// 没有可用的帧，不写文件
    Empty,
}

/// GIF 以 10ms 为单位记录帧延时（u16），低于 20ms 的值会被播放器改写
pub const GIF_DELAY_UNIT_MS: u32 = 10;
pub const GIF_MIN_DELAY_MS: u32 = 20;
const GIF_MAX_DELAY_MS: u32 = u16::MAX as u32 * GIF_DELAY_UNIT_MS;

/// 换算成 GIF 实际能表达的单帧时长（四舍五入到 10ms，限制在 20ms..=655350ms）
pub fn effective_frame_duration_ms(requested_ms: u32) -> u32 {
    let units = requested_ms.saturating_add(GIF_DELAY_UNIT_MS / 2) / GIF_DELAY_UNIT_MS;
    (units * GIF_DELAY_UNIT_MS).clamp(GIF_MIN_DELAY_MS, GIF_MAX_DELAY_MS)
}

pub struct SequenceComposer {
    max_frames: usize,
}

impl SequenceComposer {
    pub fn new(max_frames: usize) -> Self {
        Self { max_frames }
    }

    /// 按输入顺序合成，超过上限的帧被截断；空输入返回 `Composition::Empty`
    pub fn compose(
        &self,
        frames: &[PathBuf],
        frame_duration_ms: u32,
        out_path: &Path,
        cancel: &CancelToken,
    ) -> Result<Composition, PipelineError> {
        let selected = &frames[..frames.len().min(self.max_frames)];
        if selected.is_empty() {
            info!("⚠️ No content to compose, animation skipped");
            return Ok(Composition::Empty);
        }
        let effective_ms = effective_frame_duration_ms(frame_duration_ms);
        if effective_ms != frame_duration_ms {
            warn!("⏱️ GIF frame duration {}ms rounded to {}ms", frame_duration_ms, effective_ms);
        }
        let frame_duration_ms = effective_ms;
        if selected.len() < frames.len() {
            warn!(
                "✂️ Animation truncated to {} of {} frames",
                selected.len(),
                frames.len()
            );
        }

        let dir = match out_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".animation_")
            .suffix(".gif.tmp")
            .tempfile_in(dir)?;
        {
            let writer = BufWriter::new(temp.as_file_mut());
            let mut encoder = GifEncoder::new_with_speed(writer, GIF_ENCODE_SPEED);
            encoder.set_repeat(Repeat::Infinite)?;

            let delay = Delay::from_numer_denom_ms(frame_duration_ms, 1);
            let mut canvas: Option<(u32, u32)> = None;
            for path in selected {
                cancel.check()?;
                let mut image = image::open(path)?.to_rgba8();
                // 所有帧统一成第一帧的尺寸
                let (width, height) = *canvas.get_or_insert(image.dimensions());
                if image.dimensions() != (width, height) {
                    image = image::imageops::resize(&image, width, height, FilterType::Triangle);
                }
                encoder.encode_frame(AnimationFrame::from_parts(image, 0, 0, delay))?;
                debug!("GIF frame <- {}", path.display());
            }
        }
        temp.persist(out_path).map_err(|e| PipelineError::Io(e.error))?;

        let artifact = AnimatedArtifact {
            path: out_path.to_path_buf(),
            frames: selected.to_vec(),
            frame_duration_ms,
        };
        info!(
            "🎞️ Animation written: {} ({} frames, {:.1}s)",
            artifact.path.display(),
            artifact.frames.len(),
            artifact.total_duration().as_secs_f64()
        );
        Ok(Composition::Composed(artifact))
    }
}

impl Default for SequenceComposer {
    fn default() -> Self {
        Self::new(100)
    }
}
