//! 场景切分：顺序解码，相邻帧内容差超过阈值即记一个切点

use log::{debug, info};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use super::diff_filter::FrameDiffFilter;
use super::source::{DecodeOptions, FrameSource, VideoBackend};
use crate::core::cancel::CancelToken;
use crate::core::error::{duration_secs, PipelineError};

/// 场景区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SceneInterval {
    #[serde(with = "duration_secs")]
    pub start: Duration,
    #[serde(with = "duration_secs")]
    pub end: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneList {
    pub intervals: Vec<SceneInterval>,
    pub frame_count: u64,
    pub fps: f64,
    pub duration: Duration,
}

impl SceneList {
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// HSV 内容差阈值（0..=255），严格大于才算切点
    pub threshold: f64,
    /// 距离上一个切点（或片头）至少多少帧才允许再切
    pub min_scene_frames: u64,
    /// 检测时的最大宽度，0 为原始分辨率
    pub analysis_width: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 27.0,
            min_scene_frames: 15,
            analysis_width: 320,
        }
    }
}

pub struct SceneDetector {
    config: DetectorConfig,
}

impl SceneDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// 打开视频、扫描全片、关闭句柄；任何退出路径都会释放解码器
    pub fn detect(
        &self,
        backend: &dyn VideoBackend,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<SceneList, PipelineError> {
        let options = DecodeOptions {
            scale_width: (self.config.analysis_width > 0).then_some(self.config.analysis_width),
        };
        let mut source = backend.open(path, &options)?;
        let result = self.scan(source.as_mut(), cancel);
        source.close();

        let scenes = result?;
        info!(
            "🔍 Detected {} scenes in {} frames ({:.2}s)",
            scenes.intervals.len(),
            scenes.frame_count,
            scenes.duration.as_secs_f64()
        );
        Ok(scenes)
    }

    /// 扫描一个已打开的帧源（不负责关闭）
    pub fn scan(&self, source: &mut dyn FrameSource, cancel: &CancelToken) -> Result<SceneList, PipelineError> {
        let info = *source.info();
        let mut filter = FrameDiffFilter::new();
        let mut cuts: Vec<Duration> = Vec::new();
        let mut last_cut_frame = 0u64;
        let mut last_frame: Option<u64> = None;

        loop {
            cancel.check()?;
            let Some(frame) = source.decode_next()? else {
                break;
            };
            let frame_number = frame.frame_number;
            let timestamp = frame.timestamp;
            let frame = frame.downscale_to_width(self.config.analysis_width);

            if let Some(score) = filter.score(&frame) {
                let since_last = frame_number.saturating_sub(last_cut_frame);
                if score > self.config.threshold && since_last >= self.config.min_scene_frames {
                    debug!(
                        "✂️ Cut at frame {} ({:.3}s), score {:.2}",
                        frame_number,
                        timestamp.as_secs_f64(),
                        score
                    );
                    cuts.push(timestamp);
                    last_cut_frame = frame_number;
                }
            }
            last_frame = Some(frame_number);
        }

        let Some(last_frame) = last_frame else {
            return Ok(SceneList {
                intervals: Vec::new(),
                frame_count: 0,
                fps: info.fps,
                duration: Duration::ZERO,
            });
        };

        let end_of_stream = info.timestamp_of(last_frame + 1);
        Ok(SceneList {
            intervals: build_intervals(&cuts, end_of_stream),
            frame_count: last_frame + 1,
            fps: info.fps,
            duration: end_of_stream,
        })
    }
}

/// 把切点序列转换成覆盖全片的区间
fn build_intervals(cuts: &[Duration], end_of_stream: Duration) -> Vec<SceneInterval> {
    let mut intervals = Vec::with_capacity(cuts.len() + 1);
    let mut start = Duration::ZERO;
    for &cut in cuts {
        intervals.push(SceneInterval { start, end: cut });
        start = cut;
    }
    intervals.push(SceneInterval {
        start,
        end: end_of_stream,
    });
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::source::{SyntheticBackend, SyntheticVideo};

    fn detector(threshold: f64, min_scene_frames: u64) -> SceneDetector {
        SceneDetector::new(DetectorConfig {
            threshold,
            min_scene_frames,
            analysis_width: 320,
        })
    }

    /// 5 秒、10fps，在 2.5 秒处黑切白
    fn single_cut() -> SyntheticVideo {
        SyntheticVideo::new(32, 18, 10.0)
            .segment(25, [0, 0, 0])
            .segment(25, [255, 255, 255])
    }

    #[test]
    fn test_single_cut_yields_two_intervals() {
        let backend = SyntheticBackend::new(single_cut());
        let scenes = detector(27.0, 15)
            .detect(&backend, Path::new("cut.mp4"), &CancelToken::new())
            .unwrap();

        assert_eq!(
            scenes.intervals,
            vec![
                SceneInterval {
                    start: Duration::ZERO,
                    end: Duration::from_millis(2500)
                },
                SceneInterval {
                    start: Duration::from_millis(2500),
                    end: Duration::from_secs(5)
                },
            ]
        );
        assert_eq!(scenes.frame_count, 50);
        assert_eq!(scenes.duration, Duration::from_secs(5));
    }

    #[test]
    fn test_no_cuts_yields_single_interval() {
        let video = SyntheticVideo::new(16, 16, 25.0).segment(100, [40, 80, 120]);
        let backend = SyntheticBackend::new(video);
        let scenes = detector(27.0, 15)
            .detect(&backend, Path::new("still.mp4"), &CancelToken::new())
            .unwrap();

        assert_eq!(scenes.intervals.len(), 1);
        assert_eq!(scenes.intervals[0].start, Duration::ZERO);
        assert_eq!(scenes.intervals[0].end, Duration::from_secs(4));
    }

    #[test]
    fn test_empty_video_yields_no_intervals() {
        let backend = SyntheticBackend::new(SyntheticVideo::new(16, 16, 25.0));
        let scenes = detector(27.0, 15)
            .detect(&backend, Path::new("empty.mp4"), &CancelToken::new())
            .unwrap();
        assert!(scenes.is_empty());
        assert_eq!(scenes.frame_count, 0);
    }

    #[test]
    fn test_higher_threshold_never_adds_scenes() {
        // 内容差依次递增的多段画面
        let video = SyntheticVideo::new(16, 16, 10.0)
            .segment(20, [0, 0, 0])
            .segment(20, [30, 30, 30])
            .segment(20, [90, 90, 90])
            .segment(20, [200, 200, 200])
            .segment(20, [200, 0, 0])
            .segment(20, [0, 0, 200]);
        let backend = SyntheticBackend::new(video);

        let mut previous = usize::MAX;
        for threshold in [0.0, 5.0, 15.0, 27.0, 40.0, 60.0, 100.0, 255.0] {
            let count = detector(threshold, 15)
                .detect(&backend, Path::new("steps.mp4"), &CancelToken::new())
                .unwrap()
                .intervals
                .len();
            assert!(count <= previous, "threshold {threshold}: {count} > {previous}");
            previous = count;
        }
        assert_eq!(previous, 1);
    }

    #[test]
    fn test_min_scene_frames_suppresses_flash_cuts() {
        let video = SyntheticVideo::new(16, 16, 10.0)
            .segment(20, [0, 0, 0])
            .segment(2, [255, 255, 255])
            .segment(20, [0, 0, 0]);
        let backend = SyntheticBackend::new(video);

        let strict = detector(27.0, 15)
            .detect(&backend, Path::new("flash.mp4"), &CancelToken::new())
            .unwrap();
        assert_eq!(strict.intervals.len(), 2);

        let loose = detector(27.0, 1)
            .detect(&backend, Path::new("flash.mp4"), &CancelToken::new())
            .unwrap();
        assert_eq!(loose.intervals.len(), 3);
    }

    #[test]
    fn test_slow_motion_is_not_a_cut_but_a_jump_is() {
        // 竖条每帧移动 1 像素：内容差约 5.3，低于阈值
        let video = SyntheticVideo::new(32, 8, 10.0)
            .moving_bar(30, [255, 255, 255], [0, 0, 0], 4, 1)
            .moving_bar(30, [255, 255, 255], [0, 0, 0], 16, 16);
        let backend = SyntheticBackend::new(video);
        let scenes = detector(27.0, 15)
            .detect(&backend, Path::new("bar.mp4"), &CancelToken::new())
            .unwrap();

        // 第二段竖条占一半宽度，每帧跳半屏，每帧内容差 85
        assert_eq!(scenes.intervals[0].start, Duration::ZERO);
        assert_eq!(scenes.intervals[1].start, Duration::from_secs(3));
        assert!(scenes.intervals.len() >= 2);
        for pair in scenes.intervals.windows(2) {
            assert!(pair[1].start - pair[0].start >= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_decode_failure_propagates_and_releases_source() {
        let backend = SyntheticBackend::new(single_cut()).failing_at(10);
        let stats = backend.stats();
        let err = detector(27.0, 15)
            .detect(&backend, Path::new("corrupt.mp4"), &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, PipelineError::UnreadableMedia { .. }));
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_cancellation_releases_source() {
        let backend = SyntheticBackend::new(single_cut());
        let stats = backend.stats();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = detector(27.0, 15)
            .detect(&backend, Path::new("cut.mp4"), &cancel)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let backend = SyntheticBackend::new(single_cut());
        let d = detector(27.0, 15);
        let first = d.detect(&backend, Path::new("cut.mp4"), &CancelToken::new()).unwrap();
        let second = d.detect(&backend, Path::new("cut.mp4"), &CancelToken::new()).unwrap();
        assert_eq!(first, second);
    }
}
