//! 内存中生成的确定性视频，用于测试和没有 ffmpeg 的环境

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{DecodeOptions, FrameSource, StreamInfo, VideoBackend};
use crate::core::error::PipelineError;
use crate::core::video::frame::Frame;

/// 一段画面的填充方式
#[derive(Debug, Clone, Copy)]
pub enum Fill {
    Solid([u8; 3]),
    /// 竖条每帧向右移动 `step` 像素，循环回卷；颜色直方图保持不变
    MovingBar {
        bar: [u8; 3],
        background: [u8; 3],
        bar_width: u32,
        step: u32,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub frames: u64,
    pub fill: Fill,
}

#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub segments: Vec<Segment>,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, frames: u64, color: [u8; 3]) -> Self {
        self.segments.push(Segment {
            frames,
            fill: Fill::Solid(color),
        });
        self
    }

    pub fn moving_bar(mut self, frames: u64, bar: [u8; 3], background: [u8; 3], bar_width: u32, step: u32) -> Self {
        self.segments.push(Segment {
            frames,
            fill: Fill::MovingBar {
                bar,
                background,
                bar_width,
                step,
            },
        });
        self
    }

    pub fn frame_count(&self) -> u64 {
        self.segments.iter().map(|s| s.frames).sum()
    }

    /// 第 n 帧所在的段及其段内序号
    fn segment_at(&self, frame_number: u64) -> Option<(&Segment, u64)> {
        let mut start = 0u64;
        for segment in &self.segments {
            if frame_number < start + segment.frames {
                return Some((segment, frame_number - start));
            }
            start += segment.frames;
        }
        None
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration: Some(Duration::from_secs_f64(
                self.frame_count() as f64 / self.fps.max(f64::MIN_POSITIVE),
            )),
        }
    }
}

/// 打开/关闭计数，用来验证句柄在所有路径上都被释放
#[derive(Debug, Default)]
pub struct SourceStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
    seeks: AtomicUsize,
}

impl SourceStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }
}

pub struct SyntheticBackend {
    video: SyntheticVideo,
    unreadable: bool,
    fail_at_frame: Option<u64>,
    stats: Arc<SourceStats>,
}

impl SyntheticBackend {
    pub fn new(video: SyntheticVideo) -> Self {
        Self {
            video,
            unreadable: false,
            fail_at_frame: None,
            stats: Arc::new(SourceStats::default()),
        }
    }

    /// 模拟无法识别的容器
    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    /// 模拟解码到第 n 帧时出错
    pub fn failing_at(mut self, frame_number: u64) -> Self {
        self.fail_at_frame = Some(frame_number);
        self
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }
}

impl VideoBackend for SyntheticBackend {
    fn open(&self, path: &Path, options: &DecodeOptions) -> Result<Box<dyn FrameSource>, PipelineError> {
        if self.unreadable {
            return Err(PipelineError::unreadable(path, "synthetic: unsupported container"));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);

        let mut info = self.video.info();
        if let Some(width) = options.scale_width {
            if width > 0 && width < info.width {
                info.height = ((info.height as u64 * width as u64) / info.width as u64).max(1) as u32;
                info.width = width;
            }
        }

        Ok(Box::new(SyntheticSource {
            video: self.video.clone(),
            info,
            cursor: 0,
            fail_at_frame: self.fail_at_frame,
            stats: Arc::clone(&self.stats),
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticSource {
    video: SyntheticVideo,
    info: StreamInfo,
    cursor: u64,
    fail_at_frame: Option<u64>,
    stats: Arc<SourceStats>,
    closed: bool,
}

impl SyntheticSource {
    fn render(&self, frame_number: u64) -> Result<Option<Frame>, PipelineError> {
        if self.closed {
            return Err(PipelineError::unreadable("synthetic", "source already closed"));
        }
        if self.fail_at_frame == Some(frame_number) {
            return Err(PipelineError::unreadable(
                "synthetic",
                format!("corrupt packet at frame {frame_number}"),
            ));
        }
        let Some((segment, offset)) = self.video.segment_at(frame_number) else {
            return Ok(None);
        };
        let data = paint(segment.fill, offset, self.info.width, self.info.height);
        Ok(Some(Frame::new(
            self.info.width,
            self.info.height,
            data,
            self.info.timestamp_of(frame_number),
            frame_number,
        )))
    }
}

fn paint(fill: Fill, offset: u64, width: u32, height: u32) -> Vec<u8> {
    match fill {
        Fill::Solid(color) => color
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect(),
        Fill::MovingBar {
            bar,
            background,
            bar_width,
            step,
        } => {
            let width = width.max(1);
            let left = ((offset * u64::from(step)) % u64::from(width)) as u32;
            let mut data = Vec::with_capacity((width * height * 3) as usize);
            for _ in 0..height {
                for x in 0..width {
                    // 相对竖条左边缘的距离（回卷）
                    let distance = (x + width - left) % width;
                    let color = if distance < bar_width { bar } else { background };
                    data.extend_from_slice(&color);
                }
            }
            data
        }
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn decode_next(&mut self) -> Result<Option<Frame>, PipelineError> {
        let frame = self.render(self.cursor)?;
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, timestamp: Duration) -> Result<Option<Frame>, PipelineError> {
        self.stats.seeks.fetch_add(1, Ordering::SeqCst);
        let target = self.info.frame_at_or_after(timestamp);
        let frame = self.render(target)?;
        self.cursor = target + u64::from(frame.is_some());
        Ok(frame)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.close();
    }
}
