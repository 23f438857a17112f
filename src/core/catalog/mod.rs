//! 视频目录搜索：按关键词找到播放量最高、且足够短的视频

use log::{debug, info, warn};
use reqwest::blocking::Client;
use std::time::Duration;
use thiserror::Error;

use crate::api::models::catalog::{
    ApiErrorResponse, SearchListResponse, VideoItem, VideoListResponse, VideoSummary,
};

mod duration;

pub use duration::parse_iso8601_duration;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON 数据解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("未配置 API key（catalog.api_key 或 YOUTUBE_API_KEY）")]
    MissingApiKey,
    #[error("API 返回错误 {status}: {message}")]
    Api { status: u16, message: String },
}

pub trait CatalogSearch {
    /// 返回第一个满足时长上限的候选；没有候选时返回 `Ok(None)`
    fn top_video(&self, query: &str) -> Result<Option<VideoSummary>, CatalogError>;
}

pub struct YouTubeCatalog {
    client: Client,
    api_key: String,
    max_results: u32,
    max_duration_secs: u64,
}

impl YouTubeCatalog {
    pub fn new(api_key: &str, max_results: u32, max_duration_secs: u64) -> Result<Self, CatalogError> {
        let api_key = if api_key.is_empty() {
            std::env::var("YOUTUBE_API_KEY").unwrap_or_default()
        } else {
            api_key.to_string()
        };
        if api_key.is_empty() {
            return Err(CatalogError::MissingApiKey);
        }

        let client = Client::builder()
            .user_agent(concat!("video-digest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key,
            max_results,
            max_duration_secs,
        })
    }

    fn search(&self, query: &str) -> Result<SearchListResponse, CatalogError> {
        let max_results = self.max_results.to_string();
        let body = self.get(
            "search",
            &[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                // 4 到 20 分钟
                ("videoDuration", "medium"),
                ("order", "viewCount"),
                ("maxResults", max_results.as_str()),
            ],
        )?;
        Ok(serde_json::from_str(&body)?)
    }

    fn details(&self, ids: &[String]) -> Result<VideoListResponse, CatalogError> {
        let ids = ids.join(",");
        let body = self.get("videos", &[("part", "contentDetails,statistics"), ("id", ids.as_str())])?;
        Ok(serde_json::from_str(&body)?)
    }

    fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, CatalogError> {
        let url = format!("{API_BASE}/{endpoint}");
        let resp = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: error_message(body),
            });
        }
        Ok(body)
    }
}

impl CatalogSearch for YouTubeCatalog {
    fn top_video(&self, query: &str) -> Result<Option<VideoSummary>, CatalogError> {
        let search = self.search(query)?;
        let candidates = candidate_ids(&search);
        debug!("catalog: {} candidates for {:?}", candidates.len(), query);
        if candidates.is_empty() {
            return Ok(None);
        }

        let details = self.details(&candidates)?;
        let picked = select_candidate(&search, &details, self.max_duration_secs);
        match &picked {
            Some(video) => info!(
                "🔎 Top video: {} ({}s, {} views)",
                video.title, video.duration_secs, video.view_count
            ),
            None => info!("🔎 No video under {}s for {:?}", self.max_duration_secs, query),
        }
        Ok(picked)
    }
}

/// 错误响应里有 `error.message` 就用它，否则原样返回响应体
fn error_message(body: String) -> String {
    serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

fn candidate_ids(search: &SearchListResponse) -> Vec<String> {
    search
        .items
        .iter()
        .filter_map(|item| item.id.video_id.clone())
        .collect()
}

/// 按搜索结果的顺序（播放量降序）挑第一个时长严格小于上限的视频
fn select_candidate(
    search: &SearchListResponse,
    details: &VideoListResponse,
    max_duration_secs: u64,
) -> Option<VideoSummary> {
    for item in &search.items {
        let Some(video_id) = item.id.video_id.as_deref() else {
            continue;
        };
        let Some(detail) = details.items.iter().find(|d| d.id == video_id) else {
            continue;
        };
        let Some(duration_secs) = detail_duration(detail) else {
            warn!("catalog: unparseable duration for {}", video_id);
            continue;
        };
        if duration_secs >= max_duration_secs as f64 {
            continue;
        }
        let view_count = detail
            .statistics
            .as_ref()
            .and_then(|s| s.view_count.as_deref())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        return Some(VideoSummary {
            video_id: video_id.to_string(),
            title: item.snippet.as_ref().map(|s| s.title.clone()).unwrap_or_default(),
            duration_secs: duration_secs as u64,
            view_count,
        });
    }
    None
}

fn detail_duration(detail: &VideoItem) -> Option<f64> {
    parse_iso8601_duration(&detail.content_details.as_ref()?.duration)
}
