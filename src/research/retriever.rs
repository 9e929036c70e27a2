//! Topic retrieval over a session's index.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{Chunk, ScoredChunk};
use crate::session::ResearchSession;
use std::sync::Arc;

/// Retrieves the chunks most relevant to a topic from a session's index.
///
/// Topics are embedded with the same embedder used at ingestion, so query
/// and chunk vectors live in the same space.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    /// Create a retriever around the session's embedder.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Retrieve up to `k` chunks relevant to `topic`, most relevant first.
    ///
    /// `min_similarity` is a score in (0, 1]; chunks below it are dropped.
    /// `scope` restricts results to one video. An empty result is a valid
    /// outcome.
    pub async fn retrieve(
        &self,
        session: &ResearchSession,
        topic: &str,
        k: usize,
        min_similarity: Option<f32>,
        scope: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        let scored = self
            .retrieve_scored(session, topic, k, min_similarity, scope)
            .await?;
        Ok(scored.into_iter().map(|s| s.chunk).collect())
    }

    /// Like [`retrieve`](Self::retrieve), keeping distances for display.
    pub async fn retrieve_scored(
        &self,
        session: &ResearchSession,
        topic: &str,
        k: usize,
        min_similarity: Option<f32>,
        scope: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        if session.index().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(topic).await?;
        let max_distance = min_similarity.and_then(distance_bound);

        session.index().search(&query_embedding, k, max_distance, scope)
    }
}

/// Convert a minimum similarity score into the index's distance bound,
/// inverting `similarity = 1 / (1 + distance)`. Non-positive thresholds
/// mean "no bound".
fn distance_bound(min_similarity: f32) -> Option<f32> {
    if min_similarity <= 0.0 {
        return None;
    }
    Some(1.0 / min_similarity - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Chunk;
    use crate::source::VideoMetadata;
    use async_trait::async_trait;

    /// Embedder with a fixed vocabulary of directions, so test topics land
    /// exactly on the chunks built from the same word.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(match text {
                "alpha" => vec![1.0, 0.0],
                "beta" => vec![0.0, 1.0],
                _ => vec![0.5, 0.5],
            })
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn chunk(video_id: &str, text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            text: text.to_string(),
            video_id: video_id.to_string(),
            start_seconds: 0.0,
            end_seconds: 10.0,
            metadata: VideoMetadata {
                video_id: video_id.to_string(),
                title: video_id.to_string(),
                description: None,
                duration_seconds: None,
                view_count: None,
                channel: None,
                published_at: None,
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_relevance_and_drops_distances() {
        let session = ResearchSession::new("query", 3, 2);
        session
            .index()
            .insert(chunk("v1", "alpha", vec![1.0, 0.0]))
            .unwrap();
        session
            .index()
            .insert(chunk("v2", "beta", vec![0.0, 1.0]))
            .unwrap();

        let retriever = Retriever::new(Arc::new(AxisEmbedder));
        let chunks = retriever
            .retrieve(&session, "alpha", 5, None, None)
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "alpha");
        assert_eq!(chunks[1].text, "beta");
    }

    #[tokio::test]
    async fn test_retrieve_applies_threshold_and_scope() {
        let session = ResearchSession::new("query", 3, 2);
        session
            .index()
            .insert(chunk("v1", "alpha", vec![1.0, 0.0]))
            .unwrap();
        session
            .index()
            .insert(chunk("v2", "beta", vec![0.0, 1.0]))
            .unwrap();

        let retriever = Retriever::new(Arc::new(AxisEmbedder));

        // similarity 0.5 == distance 1.0, which only the exact match meets
        let chunks = retriever
            .retrieve(&session, "alpha", 5, Some(0.5), None)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "alpha");

        // scoping to the other video yields only its chunk
        let chunks = retriever
            .retrieve(&session, "alpha", 5, None, Some("v2"))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].video_id, "v2");
    }

    #[tokio::test]
    async fn test_retrieve_from_empty_index_is_empty() {
        let session = ResearchSession::new("query", 3, 2);
        let retriever = Retriever::new(Arc::new(AxisEmbedder));

        let chunks = retriever
            .retrieve(&session, "anything", 5, Some(0.9), None)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_distance_bound_inverts_similarity() {
        // similarity 0.5 corresponds to distance 1.0
        let bound = distance_bound(0.5).unwrap();
        assert!((bound - 1.0).abs() < 1e-6);

        // similarity 1.0 corresponds to distance 0.0
        let bound = distance_bound(1.0).unwrap();
        assert!(bound.abs() < 1e-6);

        assert!(distance_bound(0.0).is_none());
        assert!(distance_bound(-1.0).is_none());
    }
}
