//! 基于 ffmpeg/ffprobe 子进程的解码后端
//!
//! 顺序解码时保持一个常驻 ffmpeg 进程，从 stdout 读取 rgb24 原始帧；
//! seek 时启动一次性进程只取一帧，并在返回前回收。

use log::{debug, info, warn};
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{DecodeOptions, FrameSource, StreamInfo, VideoBackend};
use crate::core::error::PipelineError;
use crate::core::video::frame::Frame;

pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
        }
    }

    /// 使用非 PATH 中的可执行文件
    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// 用 ffprobe 读取第一个视频流的尺寸、帧率和时长
    ///
    /// ffmpeg 解码时会按旋转元数据自动转正，所以旋转 ±90° 的流交换宽高
    pub fn probe(&self, path: &Path) -> Result<StreamInfo, PipelineError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate,duration\
                 :stream_tags=rotate:stream_side_data=rotation:format=duration",
                "-of", "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error("ffprobe", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::unreadable(path, stderr.trim().to_string()));
        }

        parse_probe_output(path, &output.stdout)
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(&self, path: &Path, options: &DecodeOptions) -> Result<Box<dyn FrameSource>, PipelineError> {
        let probed = self.probe(path)?;
        let (width, height) = scaled_dimensions(probed.width, probed.height, options.scale_width);
        let info = StreamInfo {
            width,
            height,
            ..probed
        };

        info!(
            "🎬 Opened {} ({}x{} -> {}x{} @ {:.3} fps)",
            path.display(),
            probed.width,
            probed.height,
            width,
            height,
            info.fps
        );

        Ok(Box::new(FfmpegSource {
            ffmpeg: self.ffmpeg.clone(),
            path: path.to_path_buf(),
            info,
            scale: (width, height) != (probed.width, probed.height),
            stream: None,
            cursor: 0,
            exhausted: false,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// 常驻的顺序解码进程
struct DecodeStream {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
}

impl DecodeStream {
    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn shutdown(mut self) {
        if let Err(e) = self.child.kill() {
            // 进程已经退出时 kill 会失败，这不是错误
            debug!("ffmpeg kill: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!("⚠️ Failed to reap ffmpeg decoder: {}", e);
        }
        self.collect_stderr();
    }
}

pub struct FfmpegSource {
    ffmpeg: String,
    path: PathBuf,
    info: StreamInfo,
    scale: bool,
    stream: Option<DecodeStream>,
    cursor: u64,
    exhausted: bool,
    closed: bool,
}

impl FfmpegSource {
    fn frame_size(&self) -> usize {
        (self.info.width as usize) * (self.info.height as usize) * 3
    }

    fn base_command(&self, start: Option<Duration>) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-nostdin"]);
        if let Some(start) = start {
            cmd.arg("-ss").arg(format!("{:.6}", start.as_secs_f64()));
        }
        cmd.arg("-i").arg(&self.path);
        if self.scale {
            cmd.arg("-vf")
                .arg(format!("scale={}:{}", self.info.width, self.info.height));
        }
        cmd.args(["-an", "-sn", "-vsync", "cfr", "-f", "rawvideo", "-pix_fmt", "rgb24"]);
        cmd
    }

    fn start_stream(&mut self) -> Result<(), PipelineError> {
        let start = (self.cursor > 0).then(|| self.info.timestamp_of(self.cursor));
        let mut cmd = self.base_command(start);
        cmd.arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| spawn_error("ffmpeg", e))?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::unreadable(&self.path, "ffmpeg stdout unavailable"));
            }
        };
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        debug!("ffmpeg decode stream started at frame {}", self.cursor);
        self.stream = Some(DecodeStream {
            child,
            stdout,
            stderr,
        });
        Ok(())
    }

    fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
        }
    }

    /// 流结束时检查 ffmpeg 退出状态，非零视为媒体不可读
    fn finish_stream(&mut self) -> Result<(), PipelineError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let status = stream.child.wait()?;
        let stderr = stream.collect_stderr();
        if status.success() {
            Ok(())
        } else {
            Err(PipelineError::unreadable(&self.path, stderr.trim().to_string()))
        }
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn decode_next(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.closed {
            return Err(PipelineError::unreadable(&self.path, "decoder already closed"));
        }
        if self.exhausted {
            return Ok(None);
        }
        if self.stream.is_none() {
            self.start_stream()?;
        }

        let size = self.frame_size();
        let mut buffer = vec![0u8; size];
        let filled = match self.stream.as_mut() {
            Some(stream) => read_full(&mut stream.stdout, &mut buffer)?,
            None => 0,
        };

        if filled == 0 {
            self.exhausted = true;
            self.finish_stream()?;
            return Ok(None);
        }
        if filled < size {
            self.stop_stream();
            return Err(PipelineError::unreadable(
                &self.path,
                format!("truncated frame {}: {} of {} bytes", self.cursor, filled, size),
            ));
        }

        let frame_number = self.cursor;
        self.cursor += 1;
        Ok(Some(Frame::new(
            self.info.width,
            self.info.height,
            buffer,
            self.info.timestamp_of(frame_number),
            frame_number,
        )))
    }

    fn seek(&mut self, timestamp: Duration) -> Result<Option<Frame>, PipelineError> {
        if self.closed {
            return Err(PipelineError::unreadable(&self.path, "decoder already closed"));
        }
        self.stop_stream();
        self.exhausted = false;

        let frame_number = self.info.frame_at_or_after(timestamp);
        let snapped = self.info.timestamp_of(frame_number);
        if matches!(self.info.duration, Some(duration) if snapped >= duration) {
            debug!("seek {:.3}s is past the end of the stream", snapped.as_secs_f64());
            return Ok(None);
        }

        let mut cmd = self.base_command(Some(snapped));
        let output = cmd
            .args(["-frames:v", "1", "pipe:1"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error("ffmpeg", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::unreadable(&self.path, stderr.trim().to_string()));
        }

        let size = self.frame_size();
        if output.stdout.len() < size {
            debug!("seek {:.3}s produced no frame", snapped.as_secs_f64());
            return Ok(None);
        }

        let mut data = output.stdout;
        data.truncate(size);
        self.cursor = frame_number + 1;
        Ok(Some(Frame::new(
            self.info.width,
            self.info.height,
            data,
            snapped,
            frame_number,
        )))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stop_stream();
        debug!("🗑️ ffmpeg source released: {}", self.path.display());
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_error(tool: &'static str, e: std::io::Error) -> PipelineError {
    if e.kind() == ErrorKind::NotFound {
        PipelineError::Tool { tool, source: e }
    } else {
        PipelineError::Io(e)
    }
}

/// 读满缓冲区或读到 EOF，返回实际读取的字节数
fn read_full(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// 缩放后的尺寸，宽高都取偶数（yuv420 编码器要求）
fn scaled_dimensions(width: u32, height: u32, scale_width: Option<u32>) -> (u32, u32) {
    match scale_width {
        Some(target) if target > 0 && target < width => {
            let w = (target & !1).max(2);
            let h = ((height as f64 * w as f64 / width as f64).round() as u32 & !1).max(2);
            (w, h)
        }
        _ => (width, height),
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

impl ProbeStream {
    /// 顺时针旋转角度，归一到 0..360；显示矩阵优先于旧的 rotate 标签
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .filter(|r| r.is_finite())
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_output(path: &Path, json: &[u8]) -> Result<StreamInfo, PipelineError> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| PipelineError::unreadable(path, format!("ffprobe output: {e}")))?;

    let stream = probe
        .streams
        .first()
        .ok_or_else(|| PipelineError::unreadable(path, "no video stream"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(PipelineError::unreadable(path, "video stream has no dimensions")),
    };
    let (width, height) = match stream.rotation() {
        90 | 270 => (height, width),
        _ => (width, height),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| PipelineError::unreadable(path, "video stream has no frame rate"))?;

    let duration = stream
        .duration
        .as_deref()
        .or_else(|| probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(Duration::from_secs_f64);

    Ok(StreamInfo {
        width,
        height,
        fps,
        duration,
    })
}

/// 解析 "30000/1001" 形式的帧率
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "programs": [],
            "streams": [{"width": 1280, "height": 720, "avg_frame_rate": "0/0", "r_frame_rate": "24/1"}],
            "format": {"duration": "12.500000"}
        }"#;
        let info = parse_probe_output(Path::new("a.mp4"), json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.fps, 24.0);
        assert_eq!(info.duration, Some(Duration::from_millis(12500)));
    }

    #[test]
    fn test_rotated_stream_swaps_dimensions() {
        let tagged = br#"{"streams": [{"width": 1920, "height": 1080, "avg_frame_rate": "30/1",
            "tags": {"rotate": "90"}}]}"#;
        let info = parse_probe_output(Path::new("portrait.mp4"), tagged).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let matrix = br#"{"streams": [{"width": 1920, "height": 1080, "avg_frame_rate": "30/1",
            "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}]}"#;
        let info = parse_probe_output(Path::new("portrait.mov"), matrix).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let flipped = br#"{"streams": [{"width": 1920, "height": 1080, "avg_frame_rate": "30/1",
            "side_data_list": [{"side_data_type": "Display Matrix", "rotation": 180}]}]}"#;
        let info = parse_probe_output(Path::new("upside_down.mp4"), flipped).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    #[test]
    fn test_probe_without_video_stream_is_unreadable() {
        let json = br#"{"streams": [], "format": {"duration": "3.0"}}"#;
        let err = parse_probe_output(Path::new("audio.m4a"), json).unwrap_err();
        assert!(matches!(err, PipelineError::UnreadableMedia { .. }));

        let garbage = parse_probe_output(Path::new("x"), b"not json").unwrap_err();
        assert!(matches!(garbage, PipelineError::UnreadableMedia { .. }));
    }

    #[test]
    fn test_scaled_dimensions_are_even() {
        assert_eq!(scaled_dimensions(1920, 1080, Some(320)), (320, 180));
        assert_eq!(scaled_dimensions(1280, 534, Some(321)), (320, 134));
        assert_eq!(scaled_dimensions(200, 100, Some(320)), (200, 100));
        assert_eq!(scaled_dimensions(200, 100, None), (200, 100));
    }

    #[test]
    fn test_read_full_stops_at_eof() {
        let data = [7u8; 10];
        let mut reader = &data[..];
        let mut buffer = [0u8; 16];
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 10);
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_missing_binary_maps_to_tool_error() {
        let backend = FfmpegBackend::with_binaries(
            "/nonexistent/ffmpeg-video-digest",
            "/nonexistent/ffprobe-video-digest",
        );
        let err = backend.probe(Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, PipelineError::Tool { tool: "ffprobe", .. }));
    }

    fn tools_available() -> bool {
        ["ffmpeg", "ffprobe"].iter().all(|tool| {
            Command::new(tool)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    /// 5 秒 10fps：前 2.5 秒全黑，后 2.5 秒全白
    fn black_then_white(dir: &Path) -> PathBuf {
        let path = dir.join("cut.mp4");
        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-y"])
            .args(["-f", "lavfi", "-i", "color=c=black:s=64x36:r=10:d=2.5"])
            .args(["-f", "lavfi", "-i", "color=c=white:s=64x36:r=10:d=2.5"])
            .args(["-filter_complex", "[0:v][1:v]concat=n=2:v=1:a=0"])
            .args(["-c:v", "mpeg4", "-q:v", "2", "-pix_fmt", "yuv420p"])
            .arg(&path)
            .status()
            .unwrap();
        assert!(status.success());
        path
    }

    #[test]
    fn test_real_clip_scenes_keyframes_and_seek() {
        use crate::core::cancel::CancelToken;
        use crate::core::ocr::NoopRecognizer;
        use crate::core::video::sampler::{KeyframeSampler, SamplerConfig};
        use crate::core::video::scene::{DetectorConfig, SceneDetector, SceneInterval};
        use crate::core::video::watermark::Watermark;

        if !tools_available() {
            eprintln!("ffmpeg/ffprobe not on PATH, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let clip = black_then_white(dir.path());
        let backend = FfmpegBackend::new();
        let cancel = CancelToken::new();

        let scenes = SceneDetector::new(DetectorConfig::default())
            .detect(&backend, &clip, &cancel)
            .unwrap();
        assert_eq!(scenes.frame_count, 50);
        assert_eq!(
            scenes.intervals,
            vec![
                SceneInterval {
                    start: Duration::ZERO,
                    end: Duration::from_millis(2500),
                },
                SceneInterval {
                    start: Duration::from_millis(2500),
                    end: Duration::from_secs(5),
                },
            ]
        );

        let outcome = KeyframeSampler::new(SamplerConfig {
            output_dir: dir.path().join("images"),
            ..SamplerConfig::default()
        })
        .sample(&backend, &clip, &scenes, &NoopRecognizer, &Watermark::default(), &cancel)
        .unwrap();
        let stamps: Vec<Duration> = outcome.keyframes.iter().map(|k| k.source_timestamp).collect();
        assert_eq!(stamps, vec![Duration::ZERO, Duration::from_millis(2500)]);
        assert!(outcome.keyframes[0].pixels.get_pixel(0, 0).0[0] < 40);
        assert!(outcome.keyframes[1].pixels.get_pixel(0, 0).0[0] > 215);
        assert!(outcome.keyframes.iter().all(|k| k.artifact_path.exists()));

        let mut source = backend.open(&clip, &DecodeOptions::default()).unwrap();
        assert_eq!(source.info().fps, 10.0);
        let first = source.decode_next().unwrap().unwrap();
        assert_eq!((first.frame_number, first.width, first.height), (0, 64, 36));

        let bright = source.seek(Duration::from_millis(2500)).unwrap().unwrap();
        assert_eq!(bright.frame_number, 25);
        assert!(bright.data[0] > 215);
        // 顺序解码从 seek 之后的帧继续
        assert_eq!(source.decode_next().unwrap().unwrap().frame_number, 26);
        assert!(source.seek(Duration::from_secs(6)).unwrap().is_none());

        source.close();
        source.close();
        assert!(source.decode_next().is_err());
        drop(source);

        // 顺序读到结尾后返回 None，而不是错误
        let mut source = backend.open(&clip, &DecodeOptions::default()).unwrap();
        let mut decoded = 0;
        while source.decode_next().unwrap().is_some() {
            decoded += 1;
        }
        assert_eq!(decoded, 50);
        assert!(source.decode_next().unwrap().is_none());
    }
}
