//! 串联各阶段：场景检测 -> 关键帧采样 -> 动画合成

use log::{error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::cancel::CancelToken;
use crate::core::config::Config;
use crate::core::error::{duration_secs, Notice, PipelineError};
use crate::core::ocr::TextRecognizer;
use crate::core::video::{
    AccumulatedText, Composition, DetectorConfig, Keyframe, KeyframeSampler, SamplerConfig, SceneDetector,
    SceneInterval, SceneList, SequenceComposer, VideoBackend, Watermark,
};

/// 一次完整运行的结果
#[derive(Debug)]
pub struct PipelineRun {
    pub scenes: SceneList,
    pub keyframes: Vec<Keyframe>,
    pub text: AccumulatedText,
    pub composition: Composition,
    pub notices: Vec<Notice>,
}

impl PipelineRun {
    pub fn report(&self, input: &Path) -> RunReport {
        let (animation, animation_frames) = match &self.composition {
            Composition::Composed(artifact) => (Some(artifact.path.clone()), artifact.frames.len()),
            Composition::Empty => (None, 0),
        };
        RunReport {
            input: input.to_path_buf(),
            frame_count: self.scenes.frame_count,
            duration: self.scenes.duration,
            scenes: self.scenes.intervals.clone(),
            keyframes: self
                .keyframes
                .iter()
                .map(|k| KeyframeReport {
                    timestamp: k.source_timestamp,
                    path: k.artifact_path.clone(),
                    text: k.recognized_text.iter().map(|s| s.text.clone()).collect(),
                })
                .collect(),
            text: self.text.as_str().to_string(),
            animation,
            animation_frames,
            notices: self.notices.clone(),
        }
    }
}

/// 可序列化的运行摘要（CLI `--json` 输出）
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub frame_count: u64,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub scenes: Vec<SceneInterval>,
    pub keyframes: Vec<KeyframeReport>,
    pub text: String,
    pub animation: Option<PathBuf>,
    pub animation_frames: usize,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyframeReport {
    #[serde(with = "duration_secs")]
    pub timestamp: Duration,
    pub path: PathBuf,
    pub text: Vec<String>,
}

pub struct Pipeline {
    backend: Box<dyn VideoBackend>,
    recognizer: Box<dyn TextRecognizer>,
    detector: SceneDetector,
    sampler: KeyframeSampler,
    composer: SequenceComposer,
    watermark: Watermark,
    animation_file: PathBuf,
    frame_duration_ms: u32,
}

impl Pipeline {
    /// 识别器在这里构造一次，整个运行期间复用
    pub fn new(config: &Config, backend: Box<dyn VideoBackend>, recognizer: Box<dyn TextRecognizer>) -> Self {
        let detector = SceneDetector::new(DetectorConfig {
            threshold: config.pipeline.threshold,
            min_scene_frames: config.pipeline.min_scene_frames,
            analysis_width: config.pipeline.analysis_width,
        });
        let sampler = KeyframeSampler::new(SamplerConfig {
            max_keyframes: config.pipeline.max_keyframes,
            output_dir: config.output.dir.clone(),
            jpeg_quality: config.output.jpeg_quality,
            text_delimiter: config.ocr.delimiter.clone(),
        });
        info!(
            "🎬 Pipeline: backend={}, recognizer={}, threshold={}, max_keyframes={}",
            backend.name(),
            recognizer.name(),
            config.pipeline.threshold,
            config.pipeline.max_keyframes
        );
        Self {
            backend,
            recognizer,
            detector,
            sampler,
            composer: SequenceComposer::new(config.output.max_animation_frames),
            watermark: Watermark::from_config(&config.watermark),
            animation_file: config.output.animation_file.clone(),
            frame_duration_ms: config.output.frame_duration_ms,
        }
    }

    pub fn run(&self, input: &Path, cancel: &CancelToken) -> Result<PipelineRun, PipelineError> {
        let started = Instant::now();
        let result = self.run_stages(input, cancel);
        match &result {
            Ok(run) => info!(
                "✅ {} done in {:.2}s: {} scenes, {} keyframes, {} notices",
                input.display(),
                started.elapsed().as_secs_f64(),
                run.scenes.intervals.len(),
                run.keyframes.len(),
                run.notices.len()
            ),
            Err(e) => error!("❌ {} failed: {}", input.display(), e),
        }
        result
    }

    fn run_stages(&self, input: &Path, cancel: &CancelToken) -> Result<PipelineRun, PipelineError> {
        std::fs::create_dir_all(&self.sampler.config().output_dir)?;

        let scenes = self.detector.detect(self.backend.as_ref(), input, cancel)?;
        let outcome = self.sampler.sample(
            self.backend.as_ref(),
            input,
            &scenes,
            self.recognizer.as_ref(),
            &self.watermark,
            cancel,
        )?;

        let mut notices = outcome.notices;
        let artifacts: Vec<PathBuf> = outcome.keyframes.iter().map(|k| k.artifact_path.clone()).collect();
        let composition = self
            .composer
            .compose(&artifacts, self.frame_duration_ms, &self.animation_file, cancel)?;
        if composition == Composition::Empty {
            notices.push(Notice::EmptyComposition);
        }

        Ok(PipelineRun {
            scenes,
            keyframes: outcome.keyframes,
            text: outcome.text,
            composition,
            notices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ocr::MockTextRecognizer;
    use crate::core::video::{SyntheticBackend, SyntheticVideo};

    fn config_in(dir: &Path, max_keyframes: usize) -> Config {
        let mut config = Config::default();
        config.pipeline.max_keyframes = max_keyframes;
        config.output.dir = dir.join("images");
        config.output.animation_file = dir.join("images").join("summary.gif");
        config
    }

    fn slide_reader() -> Box<MockTextRecognizer> {
        Box::new(MockTextRecognizer::with_pattern(|frame| {
            if frame.data[0] > 128 {
                vec!["second slide".into()]
            } else {
                vec!["first slide".into()]
            }
        }))
    }

    fn single_cut() -> SyntheticVideo {
        SyntheticVideo::new(64, 36, 10.0)
            .segment(25, [0, 0, 0])
            .segment(25, [255, 255, 255])
    }

    #[test]
    fn test_single_cut_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 5);
        let backend = SyntheticBackend::new(single_cut());
        let stats = backend.stats();
        let pipeline = Pipeline::new(&config, Box::new(backend), slide_reader());

        let run = pipeline.run(Path::new("cut.mp4"), &CancelToken::new()).unwrap();

        assert_eq!(run.scenes.intervals.len(), 2);
        assert_eq!(run.scenes.intervals[1].start, Duration::from_millis(2500));
        let timestamps: Vec<Duration> = run.keyframes.iter().map(|k| k.source_timestamp).collect();
        assert_eq!(timestamps, vec![Duration::ZERO, Duration::from_millis(2500)]);
        assert_eq!(run.text.as_str(), "first slide\nsecond slide\n");
        assert!(run.notices.is_empty());

        let Composition::Composed(artifact) = &run.composition else {
            panic!("expected an animation");
        };
        assert_eq!(artifact.frames.len(), 2);
        assert_eq!(artifact.total_duration(), Duration::from_secs(2));
        assert!(config.output.animation_file.exists());

        // 检测和采样各打开一次，都已关闭
        assert_eq!(stats.opens(), 2);
        assert_eq!(stats.closes(), 2);
    }

    #[test]
    fn test_no_cuts_yields_one_keyframe() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 4);
        let video = SyntheticVideo::new(32, 32, 25.0).segment(100, [30, 60, 90]);
        let pipeline = Pipeline::new(&config, Box::new(SyntheticBackend::new(video)), slide_reader());

        let run = pipeline.run(Path::new("still.mp4"), &CancelToken::new()).unwrap();
        assert_eq!(run.scenes.intervals.len(), 1);
        assert_eq!(run.keyframes.len(), 1);
    }

    #[test]
    fn test_zero_keyframes_reports_empty_composition() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 0);
        let pipeline = Pipeline::new(&config, Box::new(SyntheticBackend::new(single_cut())), slide_reader());

        let run = pipeline.run(Path::new("cut.mp4"), &CancelToken::new()).unwrap();
        assert!(run.keyframes.is_empty());
        assert!(run.text.is_empty());
        assert_eq!(run.composition, Composition::Empty);
        assert_eq!(run.notices, vec![Notice::EmptyComposition]);
        assert!(!config.output.animation_file.exists());
        // 输出目录在开始时就已创建
        assert!(config.output.dir.is_dir());
    }

    #[test]
    fn test_empty_video_reports_notices() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 5);
        let backend = SyntheticBackend::new(SyntheticVideo::new(16, 16, 25.0));
        let pipeline = Pipeline::new(&config, Box::new(backend), slide_reader());

        let run = pipeline.run(Path::new("empty.mp4"), &CancelToken::new()).unwrap();
        assert_eq!(run.notices, vec![Notice::NoScenesDetected, Notice::EmptyComposition]);
    }

    #[test]
    fn test_animation_bounded_by_stricter_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), 5);
        config.output.max_animation_frames = 2;
        let video = SyntheticVideo::new(32, 32, 10.0)
            .segment(20, [0, 0, 0])
            .segment(20, [255, 255, 255])
            .segment(20, [0, 0, 0])
            .segment(20, [255, 255, 255]);
        let pipeline = Pipeline::new(&config, Box::new(SyntheticBackend::new(video)), slide_reader());

        let run = pipeline.run(Path::new("four.mp4"), &CancelToken::new()).unwrap();
        assert_eq!(run.keyframes.len(), 4);
        let Composition::Composed(artifact) = &run.composition else {
            panic!("expected an animation");
        };
        assert_eq!(artifact.frames.len(), 2);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();
        let run_in = |dir: &Path| {
            let config = config_in(dir, 5);
            Pipeline::new(&config, Box::new(SyntheticBackend::new(single_cut())), slide_reader())
                .run(Path::new("cut.mp4"), &CancelToken::new())
                .unwrap()
        };

        let first = run_in(first_dir.path());
        let second = run_in(second_dir.path());
        assert_eq!(first.scenes, second.scenes);
        assert_eq!(first.text, second.text);
        let stamps = |run: &PipelineRun| run.keyframes.iter().map(|k| k.source_timestamp).collect::<Vec<_>>();
        assert_eq!(stamps(&first), stamps(&second));
    }

    #[test]
    fn test_unreadable_media_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 5);
        let backend = SyntheticBackend::new(single_cut()).unreadable();
        let pipeline = Pipeline::new(&config, Box::new(backend), slide_reader());

        let err = pipeline.run(Path::new("garbage.bin"), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::UnreadableMedia { .. }));
    }

    #[test]
    fn test_report_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 5);
        let pipeline = Pipeline::new(&config, Box::new(SyntheticBackend::new(single_cut())), slide_reader());
        let run = pipeline.run(Path::new("cut.mp4"), &CancelToken::new()).unwrap();

        let report = run.report(Path::new("cut.mp4"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scenes"][1]["start"], 2.5);
        assert_eq!(json["keyframes"][1]["text"][0], "second slide");
        assert_eq!(json["animation_frames"], 2);
        assert_eq!(json["duration"], 5.0);
    }
}
