//! Video source abstraction for Granske.
//!
//! Provides a trait-based interface for searching videos and fetching their
//! transcripts and comments.

mod youtube;

pub use youtube::YouTubeProvider;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Unique video identifier.
    pub video_id: String,
    /// Title.
    pub title: String,
    /// Description (if available).
    pub description: Option<String>,
    /// Duration in seconds (if known).
    pub duration_seconds: Option<u32>,
    /// View count (if known).
    pub view_count: Option<u64>,
    /// Channel or author name (if available).
    pub channel: Option<String>,
    /// Publication date (if available).
    pub published_at: Option<DateTime<Utc>>,
}

impl VideoMetadata {
    /// Create a URL for this video.
    pub fn watch_url(&self) -> String {
        format!("https://youtube.com/watch?v={}", self.video_id)
    }

    /// Create a URL pointing at a specific second of this video.
    pub fn url_with_timestamp(&self, seconds: f64) -> String {
        format!(
            "https://youtube.com/watch?v={}&t={}s",
            self.video_id, seconds as u32
        )
    }

    /// Format seconds as MM:SS or HH:MM:SS.
    pub fn format_timestamp(seconds: f64) -> String {
        let total_seconds = seconds as u32;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{:02}:{:02}", minutes, secs)
        }
    }
}

/// A timestamped piece of a video transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Segment text.
    pub text: String,
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
}

impl TranscriptSegment {
    /// Create a new transcript segment.
    pub fn new(start_seconds: f64, end_seconds: f64, text: String) -> Self {
        Self {
            text,
            start_seconds,
            end_seconds,
        }
    }
}

/// A top-level comment on a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Comment text.
    pub text: String,
    /// Author display name.
    pub author: String,
    /// Like count.
    pub like_count: u64,
    /// When the comment was published.
    pub published_at: Option<DateTime<Utc>>,
}

/// Everything fetched for one video: metadata, transcript, comments.
#[derive(Debug, Clone)]
pub struct VideoContent {
    pub metadata: VideoMetadata,
    pub transcript: Vec<TranscriptSegment>,
    pub comments: Vec<Comment>,
}

/// Trait for video source providers.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Search for videos matching a term, best matches first.
    async fn search_videos(&self, term: &str, max_results: usize) -> Result<Vec<VideoMetadata>>;

    /// Fetch a video's metadata, transcript, and comments.
    ///
    /// Fails with `TranscriptUnavailable` when the video has no usable
    /// transcript.
    async fn fetch_content(&self, video_id: &str) -> Result<VideoContent>;
}

/// Transcript artifacts that carry no semantic content.
const TRANSCRIPT_ARTIFACTS: &[&str] = &[
    "[Music]",
    "[Applause]",
    "[Laughter]",
    "[Background Noise]",
    "[Silence]",
];

/// Clean a transcript segment's text: strip non-speech artifacts and
/// collapse whitespace.
pub fn clean_transcript_text(text: &str) -> String {
    let mut text = text.to_string();
    for artifact in TRANSCRIPT_ARTIFACTS {
        text = text.replace(artifact, " ");
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
