//! Research session state and the process-wide session registry.
//!
//! One session per query. A session exclusively owns its vector index and
//! processed-video registry; sessions never share state, so all locking is
//! internal and per-session. The registry has an explicit create/lookup/
//! destroy lifecycle: nothing is evicted implicitly, callers must clean up.

use crate::error::{GranskeError, Result};
use crate::index::VectorIndex;
use crate::source::VideoMetadata;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Position of a session in the research state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Session created, initial terms not yet generated.
    Initial,
    /// Term branches fetching and ingesting sources.
    Searching,
    /// Coverage assessment in progress.
    Assessing,
    /// Loop finished, wrapping up.
    Concluding,
    /// Research complete; session remains queryable until cleanup.
    Done,
}

#[derive(Debug)]
struct SessionState {
    iteration: u32,
    phase: Phase,
    search_terms: Vec<String>,
    outline: String,
}

/// One isolated research run.
#[derive(Debug)]
pub struct ResearchSession {
    query: String,
    max_iterations: u32,
    index: VectorIndex,
    state: RwLock<SessionState>,
    // Claim registry: insertion is serialized so a video discovered by two
    // concurrent term branches is only ever ingested once.
    processed: Mutex<HashMap<String, VideoMetadata>>,
}

impl ResearchSession {
    /// Create a fresh session owning an empty index of the given dimension.
    pub fn new(query: &str, max_iterations: u32, dimension: usize) -> Self {
        Self {
            query: query.to_string(),
            max_iterations,
            index: VectorIndex::new(dimension),
            state: RwLock::new(SessionState {
                iteration: 0,
                phase: Phase::Initial,
                search_terms: Vec::new(),
                outline: String::new(),
            }),
            processed: Mutex::new(HashMap::new()),
        }
    }

    /// The research query this session was started for.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Upper bound on search passes.
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Completed search passes so far.
    pub fn iteration(&self) -> u32 {
        self.state.read().unwrap().iteration
    }

    /// Current state-machine phase.
    pub fn phase(&self) -> Phase {
        self.state.read().unwrap().phase
    }

    /// Move the session to a new phase.
    pub fn set_phase(&self, phase: Phase) {
        self.state.write().unwrap().phase = phase;
    }

    /// The current working outline.
    pub fn outline(&self) -> String {
        self.state.read().unwrap().outline.clone()
    }

    /// Replace the working outline.
    pub fn set_outline(&self, outline: String) {
        self.state.write().unwrap().outline = outline;
    }

    /// All search terms ever issued, in order.
    pub fn search_terms(&self) -> Vec<String> {
        self.state.read().unwrap().search_terms.clone()
    }

    /// Record a completed search pass: append the issued terms and bump the
    /// iteration counter.
    pub fn record_pass(&self, terms: &[String]) {
        let mut state = self.state.write().unwrap();
        state.search_terms.extend(terms.iter().cloned());
        state.iteration += 1;
        debug_assert!(state.iteration <= self.max_iterations);
    }

    /// Whether a video has already been claimed in this session.
    pub fn is_processed(&self, video_id: &str) -> bool {
        self.processed.lock().unwrap().contains_key(video_id)
    }

    /// Atomically claim a video for ingestion. Returns false if another
    /// branch got there first.
    pub fn try_claim(&self, metadata: &VideoMetadata) -> bool {
        let mut processed = self.processed.lock().unwrap();
        if processed.contains_key(&metadata.video_id) {
            return false;
        }
        processed.insert(metadata.video_id.clone(), metadata.clone());
        true
    }

    /// Metadata of all claimed videos.
    pub fn processed_videos(&self) -> Vec<VideoMetadata> {
        self.processed.lock().unwrap().values().cloned().collect()
    }

    /// Number of claimed videos.
    pub fn processed_count(&self) -> usize {
        self.processed.lock().unwrap().len()
    }

    /// The session's vector index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

/// Process-wide registry mapping session keys to active sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<ResearchSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session under the given key.
    pub fn start(
        &self,
        key: &str,
        query: &str,
        max_iterations: u32,
        dimension: usize,
    ) -> Result<Arc<ResearchSession>> {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(key) {
            return Err(GranskeError::SessionConflict(key.to_string()));
        }

        let session = Arc::new(ResearchSession::new(query, max_iterations, dimension));
        sessions.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// Look up an active session.
    pub fn get(&self, key: &str) -> Result<Arc<ResearchSession>> {
        self.sessions
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| GranskeError::SessionNotFound(key.to_string()))
    }

    /// Remove a session, releasing its index and chunks. Idempotent: an
    /// absent key is a no-op.
    pub fn cleanup(&self, key: &str) {
        self.sessions.write().unwrap().remove(key);
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Whether the registry holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
