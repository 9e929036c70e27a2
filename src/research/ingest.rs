//! Content ingestion: fetched video content in, indexed chunks out.

use crate::chunking::TokenChunker;
use crate::config::ChunkingSettings;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::Chunk;
use crate::session::ResearchSession;
use crate::source::{clean_transcript_text, TranscriptSegment, VideoContent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Turns one fetched video into embedded, indexed chunks.
pub struct ContentIngestor {
    embedder: Arc<dyn Embedder>,
    chunker: TokenChunker,
}

impl ContentIngestor {
    /// Create an ingestor with the given embedder and chunking configuration.
    pub fn new(embedder: Arc<dyn Embedder>, chunking: &ChunkingSettings) -> Self {
        Self {
            embedder,
            chunker: TokenChunker::new(chunking.chunk_target_length, chunking.chunk_overlap),
        }
    }

    /// Ingest a video's content into the session's index.
    ///
    /// Returns the number of chunks added. A video already claimed in this
    /// session is a no-op returning 0; a video without a usable transcript
    /// is skipped with a warning, stays claimed, and returns 0.
    #[instrument(skip(self, session, content), fields(video_id = %content.metadata.video_id))]
    pub async fn ingest(&self, session: &ResearchSession, content: &VideoContent) -> Result<usize> {
        let video_id = &content.metadata.video_id;

        if !session.try_claim(&content.metadata) {
            debug!("Video {} already processed in this session", video_id);
            return Ok(0);
        }

        let segments = clean_segments(&content.transcript);
        if segments.is_empty() {
            warn!("No usable transcript for {}, skipping", video_id);
            return Ok(0);
        }

        let drafts = self.chunker.chunk(&segments);
        if drafts.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut added = 0;
        for (draft, embedding) in drafts.into_iter().zip(embeddings) {
            let chunk = Chunk {
                text: draft.text,
                video_id: video_id.clone(),
                start_seconds: draft.start_seconds,
                end_seconds: draft.end_seconds,
                metadata: content.metadata.clone(),
                embedding,
            };

            // A bad embedding dimension poisons only this chunk.
            match session.index().insert(chunk) {
                Ok(()) => added += 1,
                Err(e) => warn!("Skipping chunk of {}: {}", video_id, e),
            }
        }

        info!(
            "Added {} chunks for video {} ({} comments fetched)",
            added,
            video_id,
            content.comments.len()
        );

        Ok(added)
    }
}

/// Clean segment texts and drop the ones with nothing left.
fn clean_segments(segments: &[TranscriptSegment]) -> Vec<TranscriptSegment> {
    segments
        .iter()
        .filter_map(|s| {
            let text = clean_transcript_text(&s.text);
            if text.is_empty() {
                None
            } else {
                Some(TranscriptSegment::new(s.start_seconds, s.end_seconds, text))
            }
        })
        .collect()
}
