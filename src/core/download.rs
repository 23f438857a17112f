//! 远程视频下载（调用 yt-dlp）

use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("`{0}` not found on PATH")]
    ToolMissing(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download of {video_id} failed: {reason}")]
    Failed { video_id: String, reason: String },
}

pub trait VideoDownloader {
    /// 下载到 `dest_dir`，返回最终的本地文件路径
    fn download(&self, video_id: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError>;
}

pub struct YtDlpDownloader {
    binary: String,
}

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDownloader for YtDlpDownloader {
    fn download(&self, video_id: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        std::fs::create_dir_all(dest_dir)?;
        let url = format!("https://www.youtube.com/watch?v={video_id}");
        let template = dest_dir.join("%(id)s.%(ext)s");
        info!("⬇️ Downloading {} into {}", url, dest_dir.display());

        let output = Command::new(&self.binary)
            // 只要带音轨的单文件 mp4
            .args(["-f", "best[ext=mp4]", "--no-playlist", "--no-progress"])
            .args(["--print", "after_move:filepath", "-o"])
            .arg(&template)
            .arg(&url)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DownloadError::ToolMissing(self.binary.clone()),
                _ => DownloadError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::Failed {
                video_id: video_id.to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = parse_printed_path(&stdout).ok_or_else(|| DownloadError::Failed {
            video_id: video_id.to_string(),
            reason: "yt-dlp did not report an output file".to_string(),
        })?;
        debug!("yt-dlp wrote {}", path.display());
        Ok(path)
    }
}

/// `--print after_move:filepath` 的最后一个非空行
fn parse_printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_printed_path() {
        assert_eq!(
            parse_printed_path("downloads/abc123.mp4\n"),
            Some(PathBuf::from("downloads/abc123.mp4"))
        );
        assert_eq!(
            parse_printed_path("WARNING: something\n/tmp/x/abc.mp4\n\n"),
            Some(PathBuf::from("/tmp/x/abc.mp4"))
        );
        assert_eq!(parse_printed_path("  \n"), None);
    }

    #[test]
    fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = YtDlpDownloader::with_binary("/nonexistent/yt-dlp-video-digest");
        assert!(matches!(
            downloader.download("abc", dir.path()),
            Err(DownloadError::ToolMissing(_))
        ));
    }
}
