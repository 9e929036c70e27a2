//! YouTube source implementation.
//!
//! Video search, details, and comments come from the YouTube Data API v3;
//! transcripts are pulled from caption tracks discovered via yt-dlp.

use super::{
    clean_transcript_text, Comment, SourceProvider, TranscriptSegment, VideoContent, VideoMetadata,
};
use crate::error::{GranskeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube video source.
pub struct YouTubeProvider {
    http: reqwest::Client,
    api_key: String,
    max_comments: usize,
    duration_regex: Regex,
}

impl YouTubeProvider {
    /// Create a provider with the given Data API key.
    pub fn new(api_key: String, max_comments: usize) -> Self {
        let duration_regex = Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$")
            .expect("Invalid regex");

        Self {
            http: reqwest::Client::new(),
            api_key,
            max_comments,
            duration_regex,
        }
    }

    /// Run one search.list call for a duration class.
    async fn search_page(
        &self,
        term: &str,
        duration: &str,
        max_results: usize,
    ) -> Result<Vec<SearchItem>> {
        let max_results = max_results.to_string();
        let response: SearchResponse = self
            .http
            .get(format!("{}/search", API_BASE))
            .query(&[
                ("part", "id,snippet"),
                ("q", term),
                ("type", "video"),
                ("videoDuration", duration),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GranskeError::Source(format!("Video search failed: {}", e)))?
            .json()
            .await?;

        Ok(response.items)
    }

    /// Fetch contentDetails and statistics for a batch of video ids.
    async fn video_details(&self, video_ids: &[String]) -> Result<Vec<VideoItem>> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = video_ids.join(",");
        let response: VideoListResponse = self
            .http
            .get(format!("{}/videos", API_BASE))
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", ids.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GranskeError::Source(format!("Video lookup failed: {}", e)))?
            .json()
            .await?;

        Ok(response.items)
    }

    /// Convert ISO 8601 duration (e.g. "PT1H2M3S") to seconds.
    fn parse_duration(&self, duration: &str) -> Option<u32> {
        let caps = self.duration_regex.captures(duration)?;
        let part = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };
        Some(part(1) * 3600 + part(2) * 60 + part(3))
    }

    fn metadata_from_item(&self, item: &VideoItem) -> VideoMetadata {
        VideoMetadata {
            video_id: item.id.clone(),
            title: item.snippet.title.clone(),
            description: Some(item.snippet.description.clone()).filter(|d| !d.is_empty()),
            duration_seconds: item
                .content_details
                .as_ref()
                .and_then(|d| self.parse_duration(&d.duration)),
            view_count: item
                .statistics
                .as_ref()
                .and_then(|s| s.view_count.as_ref())
                .and_then(|v| v.parse().ok()),
            channel: Some(item.snippet.channel_title.clone()).filter(|c| !c.is_empty()),
            published_at: parse_datetime(item.snippet.published_at.as_deref()),
        }
    }

    /// Fetch top-level comments. Comment failures degrade to an empty list;
    /// many videos have comments disabled.
    async fn fetch_comments(&self, video_id: &str) -> Vec<Comment> {
        let max_comments = self.max_comments.to_string();
        let result: std::result::Result<CommentThreadsResponse, reqwest::Error> = async {
            self.http
                .get(format!("{}/commentThreads", API_BASE))
                .query(&[
                    ("part", "snippet"),
                    ("videoId", video_id),
                    ("maxResults", max_comments.as_str()),
                    ("order", "relevance"),
                    ("textFormat", "plainText"),
                    ("key", self.api_key.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match result {
            Ok(response) => response
                .items
                .into_iter()
                .map(|item| {
                    let snippet = item.snippet.top_level_comment.snippet;
                    Comment {
                        text: snippet.text_display,
                        author: snippet.author_display_name,
                        like_count: snippet.like_count,
                        published_at: parse_datetime(snippet.published_at.as_deref()),
                    }
                })
                .collect(),
            Err(e) => {
                warn!("Failed to fetch comments for {}: {}", video_id, e);
                Vec::new()
            }
        }
    }

    /// Fetch the transcript via a caption track discovered with yt-dlp.
    async fn fetch_transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);

        let output = tokio::process::Command::new("yt-dlp")
            .args(["--dump-json", "--no-download", "--no-warnings", &url])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GranskeError::ToolNotFound("yt-dlp".to_string())
                } else {
                    GranskeError::Source(format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GranskeError::ToolFailed(format!(
                "yt-dlp failed for {}: {}",
                video_id, stderr
            )));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value = serde_json::from_str(&json_str)
            .map_err(|e| GranskeError::Source(format!("Failed to parse yt-dlp output: {}", e)))?;

        let track_url = caption_track_url(&json)
            .ok_or_else(|| GranskeError::TranscriptUnavailable(video_id.to_string()))?;

        debug!("Fetching caption track for {}", video_id);
        let track: serde_json::Value = self
            .http
            .get(track_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|_| GranskeError::TranscriptUnavailable(video_id.to_string()))?
            .json()
            .await
            .map_err(|_| GranskeError::TranscriptUnavailable(video_id.to_string()))?;

        let segments = parse_json3_track(&track);
        if segments.is_empty() {
            return Err(GranskeError::TranscriptUnavailable(video_id.to_string()));
        }

        Ok(segments)
    }
}

#[async_trait]
impl SourceProvider for YouTubeProvider {
    /// Search favors short videos with a couple of longer ones mixed in,
    /// mirroring how varied formats cover a topic differently.
    #[instrument(skip(self), fields(term = %term))]
    async fn search_videos(&self, term: &str, max_results: usize) -> Result<Vec<VideoMetadata>> {
        let medium_count = max_results / 3;
        let short_count = max_results - medium_count;

        let mut items = self.search_page(term, "short", short_count).await?;
        if medium_count > 0 {
            match self.search_page(term, "medium", medium_count).await {
                Ok(more) => items.extend(more),
                Err(e) => warn!("Medium-length search for '{}' failed: {}", term, e),
            }
        }

        let video_ids: Vec<String> = items
            .iter()
            .filter_map(|i| i.id.video_id.clone())
            .collect();

        let details = self.video_details(&video_ids).await?;
        Ok(details.iter().map(|i| self.metadata_from_item(i)).collect())
    }

    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn fetch_content(&self, video_id: &str) -> Result<VideoContent> {
        let details = self.video_details(&[video_id.to_string()]).await?;
        let item = details
            .first()
            .ok_or_else(|| GranskeError::Source(format!("Video {} not found", video_id)))?;
        let metadata = self.metadata_from_item(item);

        let transcript = self.fetch_transcript(video_id).await?;
        let comments = self.fetch_comments(video_id).await;

        Ok(VideoContent {
            metadata,
            transcript,
            comments,
        })
    }
}

fn parse_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Pick an English json3 caption track URL from yt-dlp metadata,
/// preferring manual subtitles over automatic captions.
fn caption_track_url(json: &serde_json::Value) -> Option<String> {
    for field in ["subtitles", "automatic_captions"] {
        let tracks = &json[field];
        for lang in ["en", "en-US", "en-GB", "en-orig"] {
            if let Some(formats) = tracks[lang].as_array() {
                for format in formats {
                    if format["ext"].as_str() == Some("json3") {
                        if let Some(url) = format["url"].as_str() {
                            return Some(url.to_string());
                        }
                    }
                }
            }
        }
    }
    None
}

/// Parse YouTube's json3 caption format into cleaned transcript segments.
fn parse_json3_track(track: &serde_json::Value) -> Vec<TranscriptSegment> {
    let Some(events) = track["events"].as_array() else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    for event in events {
        let Some(start_ms) = event["tStartMs"].as_f64() else {
            continue;
        };
        let duration_ms = event["dDurationMs"].as_f64().unwrap_or(0.0);

        let text: String = event["segs"]
            .as_array()
            .map(|segs| {
                segs.iter()
                    .filter_map(|s| s["utf8"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let text = clean_transcript_text(&text);
        if text.is_empty() {
            continue;
        }

        let start = start_ms / 1000.0;
        segments.push(TranscriptSegment::new(
            start,
            start + duration_ms / 1000.0,
            text,
        ));
    }

    segments
}

// ============================================================================
// Data API response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    #[serde(default)]
    view_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentThreadsResponse {
    #[serde(default)]
    items: Vec<CommentThread>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    author_display_name: String,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    published_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let provider = YouTubeProvider::new("key".to_string(), 10);
        assert_eq!(provider.parse_duration("PT1H2M3S"), Some(3723));
        assert_eq!(provider.parse_duration("PT4M13S"), Some(253));
        assert_eq!(provider.parse_duration("PT58S"), Some(58));
        assert_eq!(provider.parse_duration("PT2H"), Some(7200));
        assert_eq!(provider.parse_duration("nonsense"), None);
    }

    #[test]
    fn test_parse_json3_track() {
        let track = serde_json::json!({
            "events": [
                {"tStartMs": 0.0, "dDurationMs": 2000.0, "segs": [{"utf8": "hello "}, {"utf8": "there"}]},
                {"tStartMs": 2000.0, "dDurationMs": 1500.0, "segs": [{"utf8": "[Music]"}]},
                {"tStartMs": 3500.0, "dDurationMs": 1000.0, "segs": [{"utf8": "general kenobi"}]}
            ]
        });

        let segments = parse_json3_track(&track);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello there");
        assert_eq!(segments[0].start_seconds, 0.0);
        assert_eq!(segments[0].end_seconds, 2.0);
        assert_eq!(segments[1].text, "general kenobi");
    }

    #[test]
    fn test_caption_track_url_prefers_subtitles() {
        let json = serde_json::json!({
            "subtitles": {
                "en": [
                    {"ext": "vtt", "url": "https://example.com/vtt"},
                    {"ext": "json3", "url": "https://example.com/manual"}
                ]
            },
            "automatic_captions": {
                "en": [{"ext": "json3", "url": "https://example.com/auto"}]
            }
        });

        assert_eq!(
            caption_track_url(&json),
            Some("https://example.com/manual".to_string())
        );
    }

    #[test]
    fn test_caption_track_url_missing() {
        let json = serde_json::json!({"subtitles": {}});
        assert_eq!(caption_track_url(&json), None);
    }
}
