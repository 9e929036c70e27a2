//! Per-session in-memory vector index.
//!
//! An append-only collection of embedded transcript chunks supporting
//! nearest-neighbor search, globally or scoped to one video. Each research
//! session exclusively owns one index; nothing is persisted.

use crate::error::{GranskeError, Result};
use crate::source::VideoMetadata;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// An embedded, retrievable span of transcript text.
///
/// Immutable after insertion: created by the ingestor, inserted once,
/// released only when the owning session is cleaned up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Video this chunk came from.
    pub video_id: String,
    /// Start time in the video (seconds).
    pub start_seconds: f64,
    /// End time in the video (seconds).
    pub end_seconds: f64,
    /// Metadata of the source video.
    pub metadata: VideoMetadata,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Format the chunk's start time for display.
    pub fn format_timestamp(&self) -> String {
        VideoMetadata::format_timestamp(self.start_seconds)
    }
}

/// A search hit with its distance to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The matched chunk.
    pub chunk: Chunk,
    /// Euclidean distance to the query embedding (lower is better).
    pub distance: f32,
}

impl ScoredChunk {
    /// Similarity score in (0, 1], higher is better.
    pub fn similarity(&self) -> f32 {
        1.0 / (1.0 + self.distance)
    }
}

/// Append-only vector index over chunks with a fixed embedding dimension.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    chunks: RwLock<Vec<Chunk>>,
}

impl VectorIndex {
    /// Create an empty index for embeddings of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// The fixed embedding dimension of this index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of chunks stored.
    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a chunk. The chunk is visible to `search` as soon as this
    /// returns.
    pub fn insert(&self, chunk: Chunk) -> Result<()> {
        if chunk.embedding.len() != self.dimension {
            return Err(GranskeError::DimensionMismatch {
                expected: self.dimension,
                actual: chunk.embedding.len(),
            });
        }

        self.chunks.write().unwrap().push(chunk);
        Ok(())
    }

    /// Return up to `k` nearest chunks by Euclidean distance.
    ///
    /// When `max_distance` is given, only chunks with `distance <=
    /// max_distance` qualify. When `scope` is given, only chunks from that
    /// video are considered. Ties are broken by insertion order, earlier
    /// chunk first. An empty result is a valid outcome, not an error.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        max_distance: Option<f32>,
        scope: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dimension {
            return Err(GranskeError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let chunks = self.chunks.read().unwrap();

        let mut results: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|c| scope.map_or(true, |s| c.video_id == s))
            .map(|c| ScoredChunk {
                chunk: c.clone(),
                distance: euclidean_distance(query, &c.embedding),
            })
            .filter(|r| max_distance.map_or(true, |d| r.distance <= d))
            .collect();

        // Stable sort preserves insertion order among equal distances.
        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);

        Ok(results)
    }
}

/// Compute Euclidean distance between two vectors of equal length.
fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metadata(video_id: &str) -> VideoMetadata {
        VideoMetadata {
            video_id: video_id.to_string(),
            title: format!("Video {}", video_id),
            description: None,
            duration_seconds: Some(120),
            view_count: Some(1000),
            channel: Some("Test Channel".to_string()),
            published_at: None,
        }
    }

    fn test_chunk(video_id: &str, text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            text: text.to_string(),
            video_id: video_id.to_string(),
            start_seconds: 0.0,
            end_seconds: 30.0,
            metadata: test_metadata(video_id),
            embedding,
        }
    }

    #[test]
    fn test_insert_then_search() {
        let index = VectorIndex::new(3);
        index
            .insert(test_chunk("v1", "close", vec![1.0, 0.0, 0.0]))
            .unwrap();
        index
            .insert(test_chunk("v1", "far", vec![0.0, 1.0, 0.0]))
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 10, None, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "close");
        assert_eq!(results[0].distance, 0.0);
        assert!(results[1].distance > results[0].distance);
    }

    #[test]
    fn test_search_respects_k() {
        let index = VectorIndex::new(2);
        for i in 0..10 {
            index
                .insert(test_chunk("v1", &format!("c{}", i), vec![i as f32, 0.0]))
                .unwrap();
        }

        let results = index.search(&[0.0, 0.0], 3, None, None).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_distance_bound() {
        let index = VectorIndex::new(2);
        index.insert(test_chunk("v1", "near", vec![0.5, 0.0])).unwrap();
        index.insert(test_chunk("v1", "far", vec![5.0, 0.0])).unwrap();

        let results = index.search(&[0.0, 0.0], 10, Some(1.0), None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "near");
        assert!(results.iter().all(|r| r.distance <= 1.0));
    }

    #[test]
    fn test_search_scope_filter() {
        let index = VectorIndex::new(2);
        index.insert(test_chunk("v1", "first", vec![0.0, 0.0])).unwrap();
        index.insert(test_chunk("v2", "second", vec![0.1, 0.0])).unwrap();

        let results = index.search(&[0.0, 0.0], 10, None, Some("v2")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.video_id, "v2");
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let index = VectorIndex::new(2);
        index.insert(test_chunk("v1", "earlier", vec![1.0, 1.0])).unwrap();
        index.insert(test_chunk("v2", "later", vec![1.0, 1.0])).unwrap();

        let results = index.search(&[0.0, 0.0], 2, None, None).unwrap();
        assert_eq!(results[0].chunk.text, "earlier");
        assert_eq!(results[1].chunk.text, "later");
    }

    #[test]
    fn test_dimension_mismatch_on_insert() {
        let index = VectorIndex::new(3);
        let err = index
            .insert(test_chunk("v1", "bad", vec![1.0, 0.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            GranskeError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let index = VectorIndex::new(2);
        index.insert(test_chunk("v1", "far", vec![10.0, 10.0])).unwrap();

        let results = index.search(&[0.0, 0.0], 5, Some(0.5), None).unwrap();
        assert!(results.is_empty());

        let scoped = index.search(&[0.0, 0.0], 5, None, Some("missing")).unwrap();
        assert!(scoped.is_empty());
    }

    #[test]
    fn test_similarity_from_distance() {
        let scored = ScoredChunk {
            chunk: test_chunk("v1", "x", vec![0.0]),
            distance: 0.0,
        };
        assert!((scored.similarity() - 1.0).abs() < f32::EPSILON);

        let scored = ScoredChunk {
            chunk: test_chunk("v1", "x", vec![0.0]),
            distance: 1.0,
        };
        assert!((scored.similarity() - 0.5).abs() < f32::EPSILON);
    }
}
