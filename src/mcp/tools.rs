//! MCP tool definitions for Granske.

use super::protocol::Tool;
use serde_json::json;

/// Get all available tools.
pub fn get_tools() -> Vec<Tool> {
    vec![Tool {
        name: "video-research".to_string(),
        description: "Research a topic across YouTube videos (Shorts and longer form). \
            Iteratively expands search terms from coverage gaps, indexes transcripts, \
            and returns a markdown report with timestamped video citations."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Research topic or question"
                },
                "max_iterations": {
                    "type": "integer",
                    "description": "Maximum search/assess passes (default from config)",
                    "minimum": 1
                }
            },
            "required": ["topic"]
        }),
    }]
}
