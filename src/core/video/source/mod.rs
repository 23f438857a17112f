//! 帧源：按顺序或按时间戳解码视频帧
//!
//! `VideoBackend` 负责打开文件，`FrameSource` 是打开后的解码句柄。句柄持有
//! 解码器进程等系统资源，调用方必须在所有退出路径上调用 `close()`；
//! 各实现的 `Drop` 也会调用 `close()`，因此 `close()` 必须幂等。

pub mod ffmpeg;
pub mod synthetic;

use std::path::Path;
use std::time::Duration;

use super::frame::Frame;
use crate::core::error::PipelineError;

pub use ffmpeg::FfmpegBackend;
pub use synthetic::{SourceStats, SyntheticBackend, SyntheticVideo};

/// 视频流元数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: Option<Duration>,
}

impl StreamInfo {
    /// 第 n 帧的时间戳
    pub fn timestamp_of(&self, frame_number: u64) -> Duration {
        if self.fps <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frame_number as f64 / self.fps)
    }

    /// 时间戳所在或之后的第一帧（seek 的吸附规则）
    pub fn frame_at_or_after(&self, timestamp: Duration) -> u64 {
        if self.fps <= 0.0 {
            return 0;
        }
        // 1e-6 容差，避免 2.5s * 10fps 被浮点误差推到下一帧
        (timestamp.as_secs_f64() * self.fps - 1e-6).ceil().max(0.0) as u64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// 解码时直接缩放到该宽度（保持宽高比），None 为原始分辨率
    pub scale_width: Option<u32>,
}

pub trait FrameSource {
    fn info(&self) -> &StreamInfo;

    /// 顺序解码下一帧；`Ok(None)` 表示流结束
    fn decode_next(&mut self) -> Result<Option<Frame>, PipelineError>;

    /// 定位到时间戳所在或之后的第一帧并解码；超出视频长度时返回 `Ok(None)`
    fn seek(&mut self, timestamp: Duration) -> Result<Option<Frame>, PipelineError>;

    /// 释放解码资源，重复调用无副作用
    fn close(&mut self);
}

pub trait VideoBackend {
    fn open(&self, path: &Path, options: &DecodeOptions) -> Result<Box<dyn FrameSource>, PipelineError>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(fps: f64) -> StreamInfo {
        StreamInfo {
            width: 64,
            height: 36,
            fps,
            duration: None,
        }
    }

    #[test]
    fn test_frame_grid_snapping() {
        let info = info(10.0);
        assert_eq!(info.frame_at_or_after(Duration::ZERO), 0);
        assert_eq!(info.frame_at_or_after(Duration::from_millis(2500)), 25);
        assert_eq!(info.frame_at_or_after(Duration::from_millis(2510)), 26);
        assert_eq!(info.timestamp_of(25), Duration::from_millis(2500));
    }

    #[test]
    fn test_ntsc_rate_round_trips_on_grid() {
        let info = info(30000.0 / 1001.0);
        for n in [0u64, 1, 29, 30, 1799] {
            assert_eq!(info.frame_at_or_after(info.timestamp_of(n)), n);
        }
    }

    #[test]
    fn test_zero_fps_is_degenerate() {
        let info = info(0.0);
        assert_eq!(info.timestamp_of(10), Duration::ZERO);
        assert_eq!(info.frame_at_or_after(Duration::from_secs(3)), 0);
    }
}
