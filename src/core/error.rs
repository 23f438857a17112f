use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unreadable media {path}: {reason}")]
    UnreadableMedia { path: PathBuf, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encode/decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("required tool `{tool}` could not be started: {source}")]
    Tool {
        tool: &'static str,
        source: std::io::Error,
    },
    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::UnreadableMedia {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// 非致命事件：流水线照常完成，但记录在运行报告里
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    NoScenesDetected,
    SeekMiss {
        #[serde(with = "duration_secs")]
        timestamp: Duration,
    },
    RecognitionFailed {
        #[serde(with = "duration_secs")]
        timestamp: Duration,
        reason: String,
    },
    EmptyComposition,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::NoScenesDetected => write!(f, "no scenes detected"),
            Notice::SeekMiss { timestamp } => {
                write!(f, "seek to {:.3}s hit end of stream", timestamp.as_secs_f64())
            }
            Notice::RecognitionFailed { timestamp, reason } => write!(
                f,
                "text recognition failed at {:.3}s: {}",
                timestamp.as_secs_f64(),
                reason
            ),
            Notice::EmptyComposition => write!(f, "no content to compose"),
        }
    }
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
