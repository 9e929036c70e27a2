//! The bounded research iteration controller.
//!
//! Drives a session through `Initial -> Searching -> Assessing ->
//! (Searching | Concluding) -> Done`. Search-term branches fan out
//! concurrently and fail independently; the loop never runs more than
//! `max_iterations` passes no matter what the assessment says.

use super::analyst::{Analyst, AssessmentRequest, OpenAiAnalyst};
use super::ingest::ContentIngestor;
use super::retriever::Retriever;
use crate::config::{Prompts, ResearchSettings, RetrievalSettings, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{GranskeError, Result};
use crate::session::{Phase, ResearchSession, SessionRegistry};
use crate::source::{SourceProvider, VideoMetadata, YouTubeProvider};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of a completed research run.
#[derive(Debug, Clone)]
pub struct ResearchSummary {
    /// Search passes completed.
    pub iterations: u32,
    /// Videos claimed during the run.
    pub videos_processed: usize,
    /// Chunks in the session index.
    pub chunks_indexed: usize,
    /// The final working outline.
    pub outline: String,
}

/// Orchestrates the research loop for sessions it starts.
pub struct ResearchController {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn SourceProvider>,
    analyst: Arc<dyn Analyst>,
    embedder: Arc<dyn Embedder>,
    ingestor: ContentIngestor,
    retriever: Retriever,
    research: ResearchSettings,
    retrieval: RetrievalSettings,
}

impl ResearchController {
    /// Create a controller with the production collaborators.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.youtube.resolve_api_key().ok_or_else(|| {
            GranskeError::Config(
                "YouTube API key missing: set youtube.api_key or YOUTUBE_API_KEY".to_string(),
            )
        })?;

        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let provider = Arc::new(YouTubeProvider::new(api_key, settings.youtube.max_comments));
        let analyst = Arc::new(OpenAiAnalyst::new(&settings.analysis).with_prompts(prompts));
        let embedder = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions as usize,
        ));

        Ok(Self::with_components(
            provider,
            analyst,
            embedder,
            settings.clone(),
        ))
    }

    /// Create a controller with custom collaborators.
    pub fn with_components(
        provider: Arc<dyn SourceProvider>,
        analyst: Arc<dyn Analyst>,
        embedder: Arc<dyn Embedder>,
        settings: Settings,
    ) -> Self {
        let ingestor = ContentIngestor::new(embedder.clone(), &settings.chunking);
        let retriever = Retriever::new(embedder.clone());

        Self {
            registry: Arc::new(SessionRegistry::new()),
            provider,
            analyst,
            embedder,
            ingestor,
            retriever,
            research: settings.research,
            retrieval: settings.retrieval,
        }
    }

    /// The controller's session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// A retriever sharing this controller's embedder.
    pub fn retriever(&self) -> Retriever {
        self.retriever.clone()
    }

    /// Start a new session for a query.
    pub fn start_session(&self, key: &str, query: &str) -> Result<Arc<ResearchSession>> {
        self.start_session_with_limit(key, query, None)
    }

    /// Start a new session with an optional per-session iteration limit.
    pub fn start_session_with_limit(
        &self,
        key: &str,
        query: &str,
        max_iterations: Option<u32>,
    ) -> Result<Arc<ResearchSession>> {
        self.registry.start(
            key,
            query,
            max_iterations
                .unwrap_or(self.research.max_iterations)
                .max(1),
            self.embedder.dimensions(),
        )
    }

    /// Look up an active session.
    pub fn get_session(&self, key: &str) -> Result<Arc<ResearchSession>> {
        self.registry.get(key)
    }

    /// Release a session and everything it owns. Idempotent.
    pub fn cleanup_session(&self, key: &str) {
        self.registry.cleanup(key);
    }

    /// Run the research loop to completion.
    ///
    /// Cancellation-safe: dropping the returned future between external
    /// calls leaves the session with every chunk ingested so far intact and
    /// queryable.
    #[instrument(skip(self, session), fields(query = %session.query()))]
    pub async fn run(&self, session: Arc<ResearchSession>) -> Result<ResearchSummary> {
        info!("Starting research: {}", session.query());

        // Nothing to research without initial terms, so this one propagates.
        let mut pending = self.analyst.generate_initial_terms(session.query()).await?;
        info!("Initial search terms: {}", pending.join(", "));

        loop {
            session.set_phase(Phase::Searching);
            self.run_search_pass(&session, &pending).await;
            session.record_pass(&pending);

            session.set_phase(Phase::Assessing);
            let digest = self.build_digest(&session).await;
            let terms = session.search_terms();

            let assessment = match self
                .analyst
                .assess(AssessmentRequest {
                    query: session.query(),
                    outline: &session.outline(),
                    digest: &digest,
                    iteration: session.iteration(),
                    max_iterations: session.max_iterations(),
                    search_terms: &terms,
                })
                .await
            {
                Ok(assessment) => assessment,
                Err(e) => {
                    warn!("Assessment failed, concluding with current outline: {}", e);
                    break;
                }
            };

            session.set_outline(assessment.outline);

            if assessment.done {
                info!("Coverage judged sufficient after {} passes", session.iteration());
                break;
            }
            if session.iteration() >= session.max_iterations() {
                info!("Iteration limit reached ({})", session.max_iterations());
                break;
            }
            if assessment.next_terms.is_empty() {
                warn!("Assessment proposed no further terms, concluding");
                break;
            }

            info!("Next search terms: {}", assessment.next_terms.join(", "));
            pending = assessment.next_terms;
        }

        session.set_phase(Phase::Concluding);
        let summary = ResearchSummary {
            iterations: session.iteration(),
            videos_processed: session.processed_count(),
            chunks_indexed: session.index().len(),
            outline: session.outline(),
        };
        session.set_phase(Phase::Done);

        info!(
            "Research done: {} passes, {} videos, {} chunks",
            summary.iterations, summary.videos_processed, summary.chunks_indexed
        );
        Ok(summary)
    }

    /// One search pass: all pending terms fan out concurrently. Branch
    /// failures are isolated; the pass itself cannot fail.
    async fn run_search_pass(&self, session: &Arc<ResearchSession>, terms: &[String]) {
        let mut branches = stream::iter(terms.iter().cloned())
            .map(|term| {
                let session = session.clone();
                async move {
                    let ingested = self.process_term(&session, &term).await;
                    (term, ingested)
                }
            })
            .buffer_unordered(self.research.max_concurrent_terms.max(1));

        while let Some((term, ingested)) = branches.next().await {
            debug!("Term '{}' contributed {} chunks", term, ingested);
        }
    }

    /// One term branch: search for candidates, then fetch and ingest the
    /// unprocessed ones concurrently. Returns chunks ingested.
    async fn process_term(&self, session: &Arc<ResearchSession>, term: &str) -> usize {
        let videos = match self
            .provider
            .search_videos(term, self.research.max_videos_per_term)
            .await
        {
            Ok(videos) => videos,
            Err(e) => {
                warn!("Source search for '{}' failed: {}", term, e);
                return 0;
            }
        };

        debug!("Term '{}' matched {} candidate videos", term, videos.len());

        let candidates: Vec<VideoMetadata> = videos
            .into_iter()
            .filter(|v| !session.is_processed(&v.video_id))
            .collect();

        let mut fetches = stream::iter(candidates)
            .map(|video| {
                let session = session.clone();
                async move { self.process_video(&session, video).await }
            })
            .buffer_unordered(self.research.max_concurrent_videos.max(1));

        let mut total = 0;
        while let Some(count) = fetches.next().await {
            total += count;
        }
        total
    }

    /// Fetch and ingest one video. Every failure degrades to "skip this
    /// video": nothing in a search pass is fatal to the session.
    async fn process_video(&self, session: &ResearchSession, video: VideoMetadata) -> usize {
        let video_id = video.video_id.clone();

        let content = match self.provider.fetch_content(&video_id).await {
            Ok(content) => content,
            Err(GranskeError::TranscriptUnavailable(_)) => {
                warn!("No transcript for {}, skipping", video_id);
                // Claim it anyway so later terms don't refetch a known-bad
                // video.
                session.try_claim(&video);
                return 0;
            }
            Err(e) => {
                warn!("Fetching {} failed: {}", video_id, e);
                return 0;
            }
        };

        match self.ingestor.ingest(session, &content).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Ingest of {} failed: {}", video_id, e);
                0
            }
        }
    }

    /// Build the assessment digest from the most relevant indexed chunks.
    async fn build_digest(&self, session: &ResearchSession) -> String {
        let scored = match self
            .retriever
            .retrieve_scored(
                session,
                session.query(),
                self.retrieval.top_k,
                Some(self.retrieval.similarity_threshold),
                None,
            )
            .await
        {
            Ok(scored) => scored,
            Err(e) => {
                warn!("Digest retrieval failed: {}", e);
                Vec::new()
            }
        };

        if scored.is_empty() {
            return "No relevant material retrieved yet.".to_string();
        }

        scored
            .iter()
            .map(|s| {
                format!(
                    "- {} @ {} (similarity {:.2}): {}",
                    s.chunk.metadata.title,
                    s.chunk.format_timestamp(),
                    s.similarity(),
                    snippet(&s.chunk.text, 300)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Truncate text to a display snippet on a char boundary.
fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::analyst::Assessment;
    use super::*;
    use crate::config::Settings;
    use crate::source::{SourceProvider, TranscriptSegment, VideoContent};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let sum: u32 = text.bytes().map(u32::from).sum();
            Ok(vec![
                (sum % 31) as f32,
                (sum % 17) as f32,
                (sum % 7) as f32,
                (text.len() % 13) as f32,
            ])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    fn metadata(video_id: &str) -> VideoMetadata {
        VideoMetadata {
            video_id: video_id.to_string(),
            title: format!("Video {}", video_id),
            description: None,
            duration_seconds: Some(90),
            view_count: Some(5000),
            channel: Some("Channel".to_string()),
            published_at: None,
        }
    }

    fn transcript(words: usize) -> Vec<TranscriptSegment> {
        (0..words)
            .map(|i| TranscriptSegment::new(i as f64, (i + 1) as f64, format!("word{}", i)))
            .collect()
    }

    /// Scripted source provider: terms map to videos, videos to transcripts.
    struct ScriptedProvider {
        videos_by_term: HashMap<String, Vec<VideoMetadata>>,
        transcripts: HashMap<String, Vec<TranscriptSegment>>,
        failing_terms: Vec<String>,
    }

    #[async_trait]
    impl SourceProvider for ScriptedProvider {
        async fn search_videos(
            &self,
            term: &str,
            _max_results: usize,
        ) -> Result<Vec<VideoMetadata>> {
            if self.failing_terms.iter().any(|t| t == term) {
                return Err(GranskeError::Source(format!("search down for '{}'", term)));
            }
            Ok(self.videos_by_term.get(term).cloned().unwrap_or_default())
        }

        async fn fetch_content(&self, video_id: &str) -> Result<VideoContent> {
            let transcript = self
                .transcripts
                .get(video_id)
                .cloned()
                .ok_or_else(|| GranskeError::TranscriptUnavailable(video_id.to_string()))?;
            Ok(VideoContent {
                metadata: metadata(video_id),
                transcript,
                comments: Vec::new(),
            })
        }
    }

    /// Scripted analyst: fixed initial terms, queued assessments.
    struct ScriptedAnalyst {
        assessments: Mutex<Vec<Assessment>>,
        assess_calls: AtomicUsize,
    }

    impl ScriptedAnalyst {
        fn new(assessments: Vec<Assessment>) -> Self {
            Self {
                assessments: Mutex::new(assessments),
                assess_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Analyst for ScriptedAnalyst {
        async fn generate_initial_terms(&self, _query: &str) -> Result<Vec<String>> {
            Ok(vec!["term one".to_string(), "term two".to_string()])
        }

        async fn assess(&self, _request: AssessmentRequest<'_>) -> Result<Assessment> {
            self.assess_calls.fetch_add(1, Ordering::SeqCst);
            let mut queued = self.assessments.lock().unwrap();
            if queued.is_empty() {
                Ok(Assessment {
                    outline: "# Done".to_string(),
                    done: true,
                    next_terms: Vec::new(),
                })
            } else {
                Ok(queued.remove(0))
            }
        }
    }

    fn settings(max_iterations: u32) -> Settings {
        let mut settings = Settings::default();
        settings.research.max_iterations = max_iterations;
        settings.chunking.chunk_target_length = 10;
        settings.chunking.chunk_overlap = 2;
        settings
    }

    fn controller(
        provider: ScriptedProvider,
        analyst: ScriptedAnalyst,
        max_iterations: u32,
    ) -> (ResearchController, Arc<ScriptedAnalyst>) {
        let analyst = Arc::new(analyst);
        let controller = ResearchController::with_components(
            Arc::new(provider),
            analyst.clone(),
            Arc::new(HashEmbedder),
            settings(max_iterations),
        );
        (controller, analyst)
    }

    #[tokio::test]
    async fn test_single_iteration_reaches_done_regardless_of_assessment() {
        // The analyst keeps asking for more, but max_iterations=1 wins.
        let provider = ScriptedProvider {
            videos_by_term: HashMap::from([
                ("term one".to_string(), vec![metadata("v1")]),
                ("term two".to_string(), vec![metadata("v2")]),
            ]),
            transcripts: HashMap::from([
                ("v1".to_string(), transcript(30)),
                ("v2".to_string(), transcript(30)),
            ]),
            failing_terms: Vec::new(),
        };
        let analyst = ScriptedAnalyst::new(vec![Assessment {
            outline: "# Early outline".to_string(),
            done: false,
            next_terms: vec!["more a".to_string(), "more b".to_string()],
        }]);

        let (controller, analyst) = controller(provider, analyst, 1);
        let session = controller
            .start_session("research_1", "sourdough starter hydration")
            .unwrap();

        let summary = controller.run(session.clone()).await.unwrap();

        assert_eq!(summary.iterations, 1);
        assert_eq!(session.phase(), Phase::Done);
        assert_eq!(analyst.assess_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.search_terms(), vec!["term one", "term two"]);
        assert!(summary.chunks_indexed > 0);
        assert_eq!(summary.outline, "# Early outline");
    }

    #[tokio::test]
    async fn test_term_failure_does_not_abort_siblings() {
        let provider = ScriptedProvider {
            videos_by_term: HashMap::from([(
                "term two".to_string(),
                vec![metadata("v1")],
            )]),
            transcripts: HashMap::from([("v1".to_string(), transcript(30))]),
            failing_terms: vec!["term one".to_string()],
        };
        let analyst = ScriptedAnalyst::new(Vec::new());

        let (controller, _) = controller(provider, analyst, 3);
        let session = controller.start_session("research_2", "any topic").unwrap();

        let summary = controller.run(session.clone()).await.unwrap();

        // The healthy branch still ingested its video.
        assert_eq!(summary.videos_processed, 1);
        assert!(summary.chunks_indexed > 0);
        assert_eq!(session.phase(), Phase::Done);
    }

    #[tokio::test]
    async fn test_video_discovered_by_both_terms_ingests_once() {
        let shared = metadata("shared");
        let provider = ScriptedProvider {
            videos_by_term: HashMap::from([
                ("term one".to_string(), vec![shared.clone()]),
                ("term two".to_string(), vec![shared.clone()]),
            ]),
            transcripts: HashMap::from([("shared".to_string(), transcript(30))]),
            failing_terms: Vec::new(),
        };
        let analyst = ScriptedAnalyst::new(Vec::new());

        let (controller, _) = controller(provider, analyst, 3);
        let session = controller.start_session("research_3", "dedup").unwrap();

        let summary = controller.run(session.clone()).await.unwrap();

        assert_eq!(summary.videos_processed, 1);
        // 30 one-token words at target 10 / overlap 2: deterministic count.
        let expected = {
            let chunker = crate::chunking::TokenChunker::new(10, 2);
            chunker.chunk(&transcript(30)).len()
        };
        assert_eq!(summary.chunks_indexed, expected);
    }

    #[tokio::test]
    async fn test_assessment_terms_drive_next_pass() {
        let provider = ScriptedProvider {
            videos_by_term: HashMap::from([
                ("term one".to_string(), vec![metadata("v1")]),
                ("term two".to_string(), Vec::new()),
                ("gap term".to_string(), vec![metadata("v2")]),
                ("tangent term".to_string(), Vec::new()),
            ]),
            transcripts: HashMap::from([
                ("v1".to_string(), transcript(30)),
                ("v2".to_string(), transcript(30)),
            ]),
            failing_terms: Vec::new(),
        };
        let analyst = ScriptedAnalyst::new(vec![
            Assessment {
                outline: "# First pass".to_string(),
                done: false,
                next_terms: vec!["gap term".to_string(), "tangent term".to_string()],
            },
            Assessment {
                outline: "# Final outline".to_string(),
                done: true,
                next_terms: Vec::new(),
            },
        ]);

        let (controller, analyst) = controller(provider, analyst, 3);
        let session = controller.start_session("research_4", "two passes").unwrap();

        let summary = controller.run(session.clone()).await.unwrap();

        assert_eq!(summary.iterations, 2);
        assert_eq!(analyst.assess_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            session.search_terms(),
            vec!["term one", "term two", "gap term", "tangent term"]
        );
        assert_eq!(summary.videos_processed, 2);
        assert_eq!(summary.outline, "# Final outline");
    }

    #[tokio::test]
    async fn test_no_transcript_video_is_skipped_and_claimed() {
        let provider = ScriptedProvider {
            videos_by_term: HashMap::from([
                ("term one".to_string(), vec![metadata("silent")]),
                ("term two".to_string(), vec![metadata("silent")]),
            ]),
            transcripts: HashMap::new(),
            failing_terms: Vec::new(),
        };
        let analyst = ScriptedAnalyst::new(Vec::new());

        let (controller, _) = controller(provider, analyst, 3);
        let session = controller.start_session("research_5", "quiet topic").unwrap();

        let summary = controller.run(session.clone()).await.unwrap();

        // Research still completes with zero content; the report side will
        // just see an empty index.
        assert_eq!(summary.chunks_indexed, 0);
        assert_eq!(session.phase(), Phase::Done);
        assert!(session.is_processed("silent"));
    }
}
