//! Cited markdown report rendering.
//!
//! A downstream consumer of the research core: walks the final outline,
//! gathers citation evidence per section through the retriever, and renders
//! a deterministic markdown report. No LLM calls happen here.

use crate::config::RetrievalSettings;
use crate::error::Result;
use crate::index::ScoredChunk;
use crate::research::Retriever;
use crate::session::ResearchSession;
use crate::source::VideoMetadata;
use std::collections::HashMap;
use tracing::instrument;

/// One outline section with its retrieved evidence.
#[derive(Debug, Clone)]
pub struct ReportSection {
    /// Section title, without the leading '#'s.
    pub title: String,
    /// Full section text as it appeared in the outline.
    pub body: String,
    /// Chunks cited in this section, most relevant first.
    pub chunks: Vec<ScoredChunk>,
}

/// Renders the final research report for a session.
pub struct ReportGenerator {
    retriever: Retriever,
    retrieval: RetrievalSettings,
}

impl ReportGenerator {
    /// Create a generator using the session's retriever.
    pub fn new(retriever: Retriever, retrieval: RetrievalSettings) -> Self {
        Self {
            retriever,
            retrieval,
        }
    }

    /// Generate the full markdown report.
    ///
    /// A session with little or no indexed content still produces a report;
    /// sections without matching material say so instead of failing.
    #[instrument(skip(self, session), fields(query = %session.query()))]
    pub async fn generate(&self, session: &ResearchSession) -> Result<String> {
        let sections = self.gather_sections(session).await?;
        Ok(self.render(session, &sections))
    }

    /// Split the outline into sections and retrieve evidence for each.
    async fn gather_sections(&self, session: &ResearchSession) -> Result<Vec<ReportSection>> {
        let outline = session.outline();
        let raw_sections = split_outline(&outline, session.query());

        let mut sections = Vec::with_capacity(raw_sections.len());
        for (title, body) in raw_sections {
            let chunks = self
                .retriever
                .retrieve_scored(
                    session,
                    &body,
                    self.retrieval.top_k,
                    Some(self.retrieval.similarity_threshold),
                    None,
                )
                .await?;

            sections.push(ReportSection {
                title,
                body,
                chunks,
            });
        }

        Ok(sections)
    }

    fn render(&self, session: &ResearchSession, sections: &[ReportSection]) -> String {
        let mut parts = vec![format!("# Research Report: {}\n\n", session.query())];

        // Table of contents
        parts.push("## Table of Contents\n".to_string());
        for (i, section) in sections.iter().enumerate() {
            parts.push(format!(
                "{}. [{}](#{})\n",
                i + 1,
                section.title,
                anchor_slug(&section.title)
            ));
        }
        parts.push("\n".to_string());

        // Sections with cited evidence
        for section in sections {
            parts.push(format!("## {}\n\n", section.title));

            if section.chunks.is_empty() {
                parts.push("_No indexed material matched this section._\n\n".to_string());
                continue;
            }

            for scored in &section.chunks {
                parts.push(format!("{}\n\n", scored.chunk.text));
                parts.push(format!("*Source: {}*\n\n", format_citation(scored)));
            }
        }

        // Recommended videos
        parts.push("## Recommended Videos\n".to_string());
        parts.push(
            "The following videos are recommended based on relevance and coverage:\n\n".to_string(),
        );
        parts.push(render_recommendations(sections));

        parts.concat()
    }
}

/// Split an outline into `(title, body)` sections on '#'-headed lines.
///
/// An outline without headings (or an empty one) collapses into a single
/// section for the query itself, so report generation always has something
/// to retrieve against.
fn split_outline(outline: &str, query: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();

    for line in outline.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(heading) = line.strip_prefix('#') {
            let title = heading.trim_start_matches('#').trim().to_string();
            sections.push((title, vec![line.to_string()]));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push(line.to_string());
        } else {
            sections.push((line.to_string(), vec![line.to_string()]));
        }
    }

    if sections.is_empty() {
        return vec![(query.to_string(), query.to_string())];
    }

    sections
        .into_iter()
        .map(|(title, body)| (title, body.join("\n")))
        .collect()
}

/// Markdown anchor for a section title.
fn anchor_slug(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect()
}

/// Format a timestamped video citation.
fn format_citation(scored: &ScoredChunk) -> String {
    let meta = &scored.chunk.metadata;
    let channel = meta.channel.as_deref().unwrap_or("Unknown Channel");
    format!(
        "[{} by {} at {}]({})",
        meta.title,
        channel,
        scored.chunk.format_timestamp(),
        meta.url_with_timestamp(scored.chunk.start_seconds)
    )
}

struct VideoUsage {
    metadata: VideoMetadata,
    citations: usize,
    similarity_sum: f32,
    sections: Vec<String>,
}

/// Rank cited videos by citation count, then mean similarity.
fn render_recommendations(sections: &[ReportSection]) -> String {
    let mut usage: HashMap<String, VideoUsage> = HashMap::new();

    for section in sections {
        for scored in &section.chunks {
            let entry = usage
                .entry(scored.chunk.video_id.clone())
                .or_insert_with(|| VideoUsage {
                    metadata: scored.chunk.metadata.clone(),
                    citations: 0,
                    similarity_sum: 0.0,
                    sections: Vec::new(),
                });

            entry.citations += 1;
            entry.similarity_sum += scored.similarity();
            if !entry.sections.contains(&section.title) {
                entry.sections.push(section.title.clone());
            }
        }
    }

    if usage.is_empty() {
        return "_No videos were cited in this report._\n".to_string();
    }

    let mut ranked: Vec<VideoUsage> = usage.into_values().collect();
    ranked.sort_by(|a, b| {
        b.citations.cmp(&a.citations).then(
            (b.similarity_sum / b.citations as f32)
                .partial_cmp(&(a.similarity_sum / a.citations as f32))
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    let mut parts = Vec::new();
    for video in ranked {
        let meta = &video.metadata;
        let avg_similarity = video.similarity_sum / video.citations as f32;
        let mut sections = video.sections.clone();
        sections.sort();

        parts.push(format!(
            "### {}\n\
             - **Channel**: {}\n\
             - **Link**: {}\n\
             - **Duration**: {}\n\
             - **Relevance Score**: {:.2}\n\
             - **Referenced In**: {}\n\
             - **Views**: {}\n\n",
            meta.title,
            meta.channel.as_deref().unwrap_or("Unknown"),
            meta.watch_url(),
            VideoMetadata::format_timestamp(meta.duration_seconds.unwrap_or(0) as f64),
            avg_similarity,
            sections.join(", "),
            meta.view_count
                .map(|v| v.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
        ));
    }

    parts.join("\n")
}
