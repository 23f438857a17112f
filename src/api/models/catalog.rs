//! YouTube Data API v3 的响应结构（只保留用到的字段）

use serde::{Deserialize, Serialize};

/// 目录搜索选中的视频
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub duration_secs: u64,
    pub view_count: u64,
}

impl VideoSummary {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    pub id: SearchItemId,
    #[serde(default)]
    pub snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItemId {
    #[serde(rename = "videoId", default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Snippet {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoItem {
    pub id: String,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<ContentDetails>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentDetails {
    pub duration: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Statistics {
    /// API 以字符串返回计数
    #[serde(rename = "viewCount", default)]
    pub view_count: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}
