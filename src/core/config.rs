use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::video::composer::{GIF_DELAY_UNIT_MS, GIF_MIN_DELAY_MS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 场景检测与关键帧采样参数
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// HSV 内容差阈值，取值范围 0..=255
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// 两次切点之间至少间隔的帧数
    #[serde(default = "default_min_scene_frames")]
    pub min_scene_frames: u64,
    #[serde(default = "default_max_keyframes")]
    pub max_keyframes: usize,
    /// 检测前缩放到的最大宽度，0 表示保持原始分辨率
    #[serde(default = "default_analysis_width")]
    pub analysis_width: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_animation_file")]
    pub animation_file: PathBuf,
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u32,
    #[serde(default = "default_max_animation_frames")]
    pub max_animation_frames: usize,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatermarkConfig {
    #[serde(default = "default_watermark_text")]
    pub text: String,
    #[serde(default = "default_watermark_margin")]
    pub margin: u32,
    #[serde(default = "default_watermark_scale")]
    pub scale: u32,
    #[serde(default = "default_watermark_color")]
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// 为空时回退到 YOUTUBE_API_KEY 环境变量
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_scene_frames: default_min_scene_frames(),
            max_keyframes: default_max_keyframes(),
            analysis_width: default_analysis_width(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            animation_file: default_animation_file(),
            frame_duration_ms: default_frame_duration_ms(),
            max_animation_frames: default_max_animation_frames(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: default_watermark_text(),
            margin: default_watermark_margin(),
            scale: default_watermark_scale(),
            color: default_watermark_color(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: default_language(),
            min_confidence: default_min_confidence(),
            delimiter: default_delimiter(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: default_max_results(),
            max_duration_secs: default_max_duration_secs(),
            download_dir: default_download_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.pipeline.threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "pipeline.threshold must be a non-negative number, got {threshold}"
            )));
        }
        let frame_ms = self.output.frame_duration_ms;
        if frame_ms < GIF_MIN_DELAY_MS || frame_ms % GIF_DELAY_UNIT_MS != 0 {
            return Err(ConfigError::Invalid(format!(
                "output.frame_duration_ms must be a multiple of {GIF_DELAY_UNIT_MS} and at least {GIF_MIN_DELAY_MS}, got {frame_ms}"
            )));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "output.jpeg_quality must be within 1..=100, got {}",
                self.output.jpeg_quality
            )));
        }
        if self.watermark.scale == 0 {
            return Err(ConfigError::Invalid(
                "watermark.scale must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_threshold() -> f64 {
    27.0
}
fn default_min_scene_frames() -> u64 {
    15
}
fn default_max_keyframes() -> usize {
    5
}
fn default_analysis_width() -> u32 {
    320
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("images")
}
fn default_animation_file() -> PathBuf {
    PathBuf::from("images/summary.gif")
}
fn default_frame_duration_ms() -> u32 {
    1000
}
fn default_max_animation_frames() -> usize {
    100
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_watermark_text() -> String {
    "video-digest".into()
}
fn default_watermark_margin() -> u32 {
    10
}
fn default_watermark_scale() -> u32 {
    3
}
fn default_watermark_color() -> [u8; 3] {
    [0, 0, 255]
}
fn default_true() -> bool {
    true
}
fn default_language() -> String {
    "eng".into()
}
fn default_min_confidence() -> f32 {
    50.0
}
fn default_delimiter() -> String {
    "\n".into()
}
fn default_max_results() -> u32 {
    20
}
fn default_max_duration_secs() -> u64 {
    600
}
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}
fn default_log_level() -> String {
    "info".into()
}
