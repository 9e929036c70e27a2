//! The analyst collaborator: search term generation and coverage assessment.

use crate::config::{AnalysisSettings, Prompts};
use crate::error::{GranskeError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Everything the analyst sees when assessing a research pass.
#[derive(Debug, Clone, Copy)]
pub struct AssessmentRequest<'a> {
    /// The original research query.
    pub query: &'a str,
    /// The current working outline (may be empty on the first pass).
    pub outline: &'a str,
    /// Retrieval-derived digest of the most relevant indexed material.
    pub digest: &'a str,
    /// Completed search passes.
    pub iteration: u32,
    /// Upper bound on search passes.
    pub max_iterations: u32,
    /// All search terms issued so far.
    pub search_terms: &'a [String],
}

/// The analyst's verdict on a research pass.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Replacement for the working outline.
    pub outline: String,
    /// Whether coverage is sufficient to stop searching.
    pub done: bool,
    /// Search terms for the next pass; empty when done.
    pub next_terms: Vec<String>,
}

/// Trait for the term-generation and assessment collaborator.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Generate the initial pair of search terms for a query.
    async fn generate_initial_terms(&self, query: &str) -> Result<Vec<String>>;

    /// Assess accumulated coverage and propose the next step.
    async fn assess(&self, request: AssessmentRequest<'_>) -> Result<Assessment>;
}

/// OpenAI-backed analyst.
pub struct OpenAiAnalyst {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    prompts: Prompts,
}

impl OpenAiAnalyst {
    /// Create an analyst from analysis settings.
    pub fn new(settings: &AnalysisSettings) -> Self {
        Self {
            client: create_client(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            prompts: Prompts::default(),
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    async fn chat(&self, system: String, user: String) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| GranskeError::Collaborator(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| GranskeError::Collaborator(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| GranskeError::Collaborator(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| GranskeError::Collaborator(format!("Analyst API error: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| GranskeError::Collaborator("Empty response from analyst".to_string()))
    }
}

#[async_trait]
impl Analyst for OpenAiAnalyst {
    #[instrument(skip(self), fields(query = %query))]
    async fn generate_initial_terms(&self, query: &str) -> Result<Vec<String>> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), query.to_string());

        let system = self
            .prompts
            .render_with_custom(&self.prompts.terms.system, &vars);
        let user = self
            .prompts
            .render_with_custom(&self.prompts.terms.user, &vars);

        let response = self.chat(system, user).await?;
        debug!("Initial terms response: {}", truncate(&response, 300));

        let parsed: TermsResponse = parse_json_object(&response)?;
        Ok(vec![parsed.search_term_1, parsed.search_term_2])
    }

    #[instrument(skip(self, request), fields(iteration = request.iteration))]
    async fn assess(&self, request: AssessmentRequest<'_>) -> Result<Assessment> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), request.query.to_string());
        vars.insert(
            "outline".to_string(),
            if request.outline.is_empty() {
                "No outline yet".to_string()
            } else {
                request.outline.to_string()
            },
        );
        vars.insert("digest".to_string(), request.digest.to_string());
        vars.insert("iteration".to_string(), request.iteration.to_string());
        vars.insert(
            "max_iterations".to_string(),
            request.max_iterations.to_string(),
        );
        vars.insert(
            "search_terms".to_string(),
            serde_json::to_string(request.search_terms)?,
        );

        let system = self
            .prompts
            .render_with_custom(&self.prompts.assessment.system, &vars);
        let user = self
            .prompts
            .render_with_custom(&self.prompts.assessment.user, &vars);

        let response = self.chat(system, user).await?;
        debug!("Assessment response: {}", truncate(&response, 300));

        let parsed: AssessmentResponse = parse_json_object(&response)?;

        let next_terms: Vec<String> = [parsed.search_term_1, parsed.search_term_2]
            .into_iter()
            .flatten()
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Assessment {
            outline: parsed.outline,
            done: parsed.coverage_complete,
            next_terms,
        })
    }
}

/// Wire format of the initial-terms response.
#[derive(Debug, Deserialize)]
struct TermsResponse {
    search_term_1: String,
    search_term_2: String,
    #[serde(default)]
    #[allow(dead_code)]
    rationale: Option<String>,
}

/// Wire format of the assessment response.
#[derive(Debug, Deserialize)]
struct AssessmentResponse {
    outline: String,
    #[serde(default)]
    coverage_complete: bool,
    #[serde(default)]
    search_term_1: Option<String>,
    #[serde(default)]
    search_term_2: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    assessment: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    gaps_identified: Vec<String>,
}

/// Extract and strictly parse a JSON object from an LLM response that may
/// wrap it in prose or a markdown fence. A malformed payload is a
/// collaborator failure, never a silent default.
fn parse_json_object<T: serde::de::DeserializeOwned>(response: &str) -> Result<T> {
    let json_start = response.find('{');
    let json_end = response.rfind('}');

    let json_str = match (json_start, json_end) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response,
    };

    serde_json::from_str(json_str).map_err(|e| {
        GranskeError::Collaborator(format!(
            "Malformed analyst response: {}. Response was: {}",
            e,
            truncate(response, 500)
        ))
    })
}

fn truncate(text: &str, max_len: usize) -> &str {
    match text.char_indices().nth(max_len) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terms_response() {
        let response = r#"{"search_term_1": "sourdough hydration basics",
                           "search_term_2": "starter feeding ratios",
                           "rationale": "covers both angles"}"#;

        let parsed: TermsResponse = parse_json_object(response).unwrap();
        assert_eq!(parsed.search_term_1, "sourdough hydration basics");
        assert_eq!(parsed.search_term_2, "starter feeding ratios");
    }

    #[test]
    fn test_parse_response_with_markdown_fence() {
        let response = r##"Here is my assessment:

```json
{"outline": "# Basics", "coverage_complete": true}
```
"##;

        let parsed: AssessmentResponse = parse_json_object(response).unwrap();
        assert_eq!(parsed.outline, "# Basics");
        assert!(parsed.coverage_complete);
        assert!(parsed.search_term_1.is_none());
    }

    #[test]
    fn test_malformed_response_is_collaborator_error() {
        let err = parse_json_object::<AssessmentResponse>("not json at all").unwrap_err();
        assert!(matches!(err, GranskeError::Collaborator(_)));

        // Missing required field is also a parse failure, not a default.
        let err =
            parse_json_object::<AssessmentResponse>(r#"{"coverage_complete": false}"#).unwrap_err();
        assert!(matches!(err, GranskeError::Collaborator(_)));
    }
}
