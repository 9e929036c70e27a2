//! Granske - Iterative Video Research
//!
//! A CLI tool and MCP server that researches a topic across YouTube videos
//! and converges on a cited markdown report.
//!
//! The name "Granske" comes from the Norwegian/Scandinavian word for
//! "investigate" or "examine closely."
//!
//! # Overview
//!
//! Granske allows you to:
//! - Run bounded, multi-pass research over video transcripts for a query
//! - Expand search terms automatically from coverage gaps
//! - Build a per-session semantic index of transcript chunks
//! - Generate a markdown report with timestamped video citations
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt templates
//! - `source` - Video source abstraction (search, content, transcripts)
//! - `chunking` - Transcript chunking into overlapping token windows
//! - `embedding` - Embedding generation
//! - `index` - Per-session in-memory vector index
//! - `session` - Research session state and registry
//! - `research` - The iteration controller, analyst, ingestor, retriever
//! - `report` - Cited markdown report rendering
//! - `mcp` - MCP stdio server exposing the research tool
//!
//! # Example
//!
//! ```rust,no_run
//! use granske::config::Settings;
//! use granske::research::ResearchController;
//! use granske::report::ReportGenerator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let controller = ResearchController::from_settings(&settings)?;
//!
//!     let session = controller.start_session("sourdough", "sourdough starter hydration")?;
//!     controller.run(session.clone()).await?;
//!
//!     let report = ReportGenerator::new(controller.retriever(), settings.retrieval.clone())
//!         .generate(&session)
//!         .await?;
//!     println!("{report}");
//!
//!     controller.cleanup_session("sourdough");
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod mcp;
pub mod openai;
pub mod report;
pub mod research;
pub mod session;
pub mod source;

pub use error::{GranskeError, Result};
