use image::ImageOutputFormat;
use log::{debug, info};
use std::io::ErrorKind;
use std::process::{Command, Stdio};

use super::{BoundingRegion, RecognitionError, TextRecognizer, TextSpan};
use crate::core::video::frame::Frame;

/// 调用系统 tesseract，按 TSV 输出把单词合并成行
pub struct TesseractRecognizer {
    binary: String,
    language: String,
    min_confidence: f32,
}

impl TesseractRecognizer {
    /// 启动时检查一次 tesseract 是否可用，之后所有帧复用同一个实例
    pub fn new(language: &str, min_confidence: f32) -> Result<Self, RecognitionError> {
        Self::with_binary("tesseract", language, min_confidence)
    }

    pub fn with_binary(binary: &str, language: &str, min_confidence: f32) -> Result<Self, RecognitionError> {
        let output = Command::new(binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => RecognitionError::Unavailable(format!("`{binary}` not found on PATH")),
                _ => RecognitionError::Io(e),
            })?;

        if !output.status.success() {
            return Err(RecognitionError::Unavailable(format!(
                "`{binary} --version` exited with {}",
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!(
            "🔤 Tesseract ready: {} (lang={})",
            version.lines().next().unwrap_or("unknown version").trim(),
            language
        );

        Ok(Self {
            binary: binary.to_string(),
            language: language.to_string(),
            min_confidence,
        })
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn read_text(&self, frame: &Frame) -> Result<Vec<TextSpan>, RecognitionError> {
        let image = frame.to_image().ok_or(RecognitionError::InvalidFrame)?;

        let mut temp = tempfile::Builder::new()
            .prefix("video_digest_ocr_")
            .suffix(".png")
            .tempfile()?;
        image.write_to(temp.as_file_mut(), ImageOutputFormat::Png)?;

        let output = Command::new(&self.binary)
            .arg(temp.path())
            .args(["stdout", "-l", self.language.as_str(), "tsv"])
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Engine(stderr.trim().to_string()));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let spans = parse_tsv(&tsv, self.min_confidence);
        debug!("tesseract: {} lines at frame {}", spans.len(), frame.frame_number);
        Ok(spans)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

struct LineAccumulator {
    key: (u32, u32, u32),
    region: BoundingRegion,
    words: Vec<String>,
    confidence_sum: f32,
}

impl LineAccumulator {
    fn into_span(self) -> TextSpan {
        let count = self.words.len().max(1) as f32;
        TextSpan {
            region: self.region,
            text: self.words.join(" "),
            confidence: self.confidence_sum / count,
        }
    }
}

/// 解析 tesseract TSV：level 5 为单词行，按 (block, par, line) 合并，保持出现顺序
fn parse_tsv(tsv: &str, min_confidence: f32) -> Vec<TextSpan> {
    let mut lines: Vec<LineAccumulator> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let confidence: f32 = match cols[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        if confidence < min_confidence {
            continue;
        }
        let parse = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let key = (parse(2), parse(3), parse(4));
        let region = BoundingRegion {
            x: parse(6),
            y: parse(7),
            width: parse(8),
            height: parse(9),
        };

        match lines.iter_mut().find(|line| line.key == key) {
            Some(line) => {
                line.region = line.region.union(&region);
                line.words.push(text.to_string());
                line.confidence_sum += confidence;
            }
            None => lines.push(LineAccumulator {
                key,
                region,
                words: vec![text.to_string()],
                confidence_sum: confidence,
            }),
        }
    }

    lines.into_iter().map(LineAccumulator::into_span).collect()
}
