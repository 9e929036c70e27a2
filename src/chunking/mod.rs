//! Transcript chunking into overlapping token windows.
//!
//! Chunking is a pure function of the segment sequence and configuration:
//! identical input always yields identical chunk boundaries.

use crate::source::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// A chunk of transcript text before embedding: the unit handed to the
/// embedder and then stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDraft {
    /// Concatenated segment texts.
    pub text: String,
    /// Start time of the first segment in the window.
    pub start_seconds: f64,
    /// End time of the last segment in the window.
    pub end_seconds: f64,
}

impl ChunkDraft {
    fn from_window(window: &[TranscriptSegment]) -> Self {
        let text = window
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            text,
            start_seconds: window.first().map(|s| s.start_seconds).unwrap_or(0.0),
            end_seconds: window.last().map(|s| s.end_seconds).unwrap_or(0.0),
        }
    }
}

/// Token-window chunker.
///
/// Accumulates segments until a window has absorbed `target_length`
/// whitespace-delimited tokens of new material, emits the window as a chunk,
/// and seeds the next window with the last `overlap` segments of the emitted
/// one. Carried segments do not count toward the next window's target, so
/// every chunk after the first covers a full target's worth of fresh
/// transcript plus its overlap prefix.
#[derive(Debug, Clone)]
pub struct TokenChunker {
    target_length: usize,
    overlap: usize,
}

impl TokenChunker {
    /// Create a chunker with the given target token count and segment overlap.
    pub fn new(target_length: usize, overlap: usize) -> Self {
        Self {
            target_length: target_length.max(1),
            overlap,
        }
    }

    /// Split segments into overlapping chunks.
    ///
    /// A trailing window shorter than the target is still emitted as the
    /// final chunk. A single segment whose token count already exceeds the
    /// target becomes its own chunk, unsplit.
    pub fn chunk(&self, segments: &[TranscriptSegment]) -> Vec<ChunkDraft> {
        let mut drafts = Vec::new();
        let mut window: Vec<TranscriptSegment> = Vec::new();
        let mut new_tokens = 0usize;

        for segment in segments {
            new_tokens += segment.text.split_whitespace().count();
            window.push(segment.clone());

            if new_tokens >= self.target_length {
                drafts.push(ChunkDraft::from_window(&window));
                let carry = self.overlap.min(window.len());
                window.drain(..window.len() - carry);
                new_tokens = 0;
            }
        }

        // Only fresh segments justify a trailing chunk; a window holding
        // nothing but carried overlap has already been emitted.
        if new_tokens > 0 {
            drafts.push(ChunkDraft::from_window(&window));
        }

        drafts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_segments(count: usize) -> Vec<TranscriptSegment> {
        (0..count)
            .map(|i| {
                TranscriptSegment::new(i as f64, (i + 1) as f64, format!("w{}", i))
            })
            .collect()
    }

    #[test]
    fn test_chunk_geometry_900_tokens() {
        // 900 one-token segments, target 300, overlap 50.
        let chunker = TokenChunker::new(300, 50);
        let chunks = chunker.chunk(&word_segments(900));

        assert_eq!(chunks.len(), 3);

        // Chunk 2 begins with the last 50 segments of chunk 1's window.
        let chunk1_words: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let overlap_prefix = chunk1_words[chunk1_words.len() - 50..].join(" ");
        assert!(chunks[1].text.starts_with(&overlap_prefix));

        // Every chunk carries at least the target's worth of tokens.
        for chunk in &chunks {
            assert!(chunk.text.split_whitespace().count() >= 300);
            assert!(chunk.end_seconds >= chunk.start_seconds);
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let segments = word_segments(417);
        let chunker = TokenChunker::new(100, 10);

        let first = chunker.chunk(&segments);
        let second = chunker.chunk(&segments);
        assert_eq!(first, second);
    }

    #[test]
    fn test_trailing_partial_window_is_emitted() {
        let chunker = TokenChunker::new(10, 2);
        let chunks = chunker.chunk(&word_segments(25));

        let last = chunks.last().unwrap();
        assert!(last.text.split_whitespace().count() < 10 + 2);
        // All but the final chunk meet the target.
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.split_whitespace().count() >= 10);
        }
    }

    #[test]
    fn test_oversized_single_segment_is_not_split() {
        let text = (0..500).map(|i| format!("t{}", i)).collect::<Vec<_>>().join(" ");
        let segments = vec![TranscriptSegment::new(0.0, 60.0, text.clone())];

        let chunker = TokenChunker::new(300, 50);
        let chunks = chunker.chunk(&segments);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].start_seconds, 0.0);
        assert_eq!(chunks[0].end_seconds, 60.0);
    }

    #[test]
    fn test_empty_input() {
        let chunker = TokenChunker::new(300, 50);
        assert!(chunker.chunk(&[]).is_empty());
    }

    #[test]
    fn test_time_ranges_follow_windows() {
        let chunker = TokenChunker::new(3, 1);
        let segments = vec![
            TranscriptSegment::new(0.0, 2.0, "a b".to_string()),
            TranscriptSegment::new(2.0, 4.0, "c".to_string()),
            TranscriptSegment::new(4.0, 6.0, "d e".to_string()),
        ];

        let chunks = chunker.chunk(&segments);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a b c");
        assert_eq!(chunks[0].start_seconds, 0.0);
        assert_eq!(chunks[0].end_seconds, 4.0);
        // Second window seeded with the carried segment.
        assert_eq!(chunks[1].text, "c d e");
        assert_eq!(chunks[1].start_seconds, 2.0);
        assert_eq!(chunks[1].end_seconds, 6.0);
    }
}
