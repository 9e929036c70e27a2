//! Prompt templates for Granske.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    /// Prompts for generating the initial pair of search terms.
    pub terms: TermPrompts,
    /// Prompts for coverage assessment between iterations.
    pub assessment: AssessmentPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}


/// Prompts for initial search term generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TermPrompts {
    pub system: String,
    pub user: String,
}

impl Default for TermPrompts {
    fn default() -> Self {
        Self {
            system: "You are a research planner. You turn a research query into YouTube \
                     search terms that surface high-quality, relevant videos. \
                     Respond with JSON only, no prose around it."
                .to_string(),

            user: r#"Given this research query: "{{query}}"

Generate TWO optimized YouTube search terms that will:
1. Cover different aspects or approaches to answering the query
2. Be likely to find high-quality, relevant content
3. Include any technical terms or specific phrases that would improve search results

Response format:
{"search_term_1": "your first search term",
 "search_term_2": "your second search term",
 "rationale": "brief explanation of why you chose these terms"}"#
                .to_string(),
        }
    }
}

/// Prompts for the per-iteration coverage assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentPrompts {
    pub system: String,
    pub user: String,
}

impl Default for AssessmentPrompts {
    fn default() -> Self {
        Self {
            system: "You are a research analyst tracking an iterative video research session. \
                     You judge whether the collected material answers the query, maintain a \
                     working outline, and propose search terms that fill knowledge gaps. \
                     Respond with JSON only, no prose around it."
                .to_string(),

            user: r#"Research Progress Assessment

Original Query: "{{query}}"

Current Iteration: {{iteration}}/{{max_iterations}}

Previous Search Terms: {{search_terms}}

Current Working Outline:
{{outline}}

Most relevant material retrieved so far:
{{digest}}

Based on our current knowledge and progress:

1. Assess what we've learned
2. Identify important knowledge gaps or areas needing deeper exploration
3. Decide whether coverage is already sufficient to write the report
4. If it is not, generate TWO new search terms designed to:
   - Fill knowledge gaps
   - Explore interesting tangents relevant to the query
   - Find contrasting viewpoints if relevant
5. Rewrite the working outline as markdown '#' sections reflecting everything learned

Response format:
{
  "assessment": "brief assessment of current knowledge",
  "gaps_identified": ["list of specific knowledge gaps"],
  "coverage_complete": false,
  "search_term_1": "first new search term",
  "search_term_2": "second new search term",
  "outline": "the full updated outline"
}

Set "coverage_complete" to true (and omit the search terms) only when the
material already answers the query well."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let terms_path = custom_path.join("terms.toml");
            if terms_path.exists() {
                let content = std::fs::read_to_string(&terms_path)?;
                prompts.terms = toml::from_str(&content)?;
            }

            let assessment_path = custom_path.join("assessment.toml");
            if assessment_path.exists() {
                let content = std::fs::read_to_string(&assessment_path)?;
                prompts.assessment = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
