//! The research iteration engine.
//!
//! Couples the analyst collaborator (term generation, coverage assessment),
//! the content ingestor, and the retriever under a bounded iteration
//! controller that drives a session from its initial query to `Done`.

mod analyst;
mod controller;
mod ingest;
mod retriever;

pub use analyst::{Analyst, Assessment, AssessmentRequest, OpenAiAnalyst};
pub use controller::{ResearchController, ResearchSummary};
pub use ingest::ContentIngestor;
pub use retriever::Retriever;
