//! Configuration module for Granske.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AssessmentPrompts, Prompts, TermPrompts};
pub use settings::{
    AnalysisSettings, ChunkingSettings, EmbeddingSettings, GeneralSettings, PromptSettings,
    ResearchSettings, RetrievalSettings, Settings, YoutubeSettings,
};
