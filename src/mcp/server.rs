//! MCP server implementation.

use super::protocol::*;
use super::tools::get_tools;
use crate::config::Settings;
use crate::report::ReportGenerator;
use crate::research::ResearchController;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use uuid::Uuid;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "granske";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for Granske.
pub struct McpServer {
    settings: Settings,
    controller: Option<ResearchController>,
}

impl McpServer {
    /// Create a new MCP server.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            controller: None,
        }
    }

    /// Run the MCP server (reads from stdin, writes to stdout).
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        // Log to stderr so it doesn't interfere with JSON-RPC
        eprintln!("Granske MCP server starting...");

        for line in stdin.lock().lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    eprintln!("Failed to parse request: {}", e);
                    let response = JsonRpcResponse::error(None, -32700, "Parse error");
                    writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                    stdout.flush()?;
                    continue;
                }
            };

            let response = self.handle_request(request).await;
            writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
            stdout.flush()?;
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "initialized" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            _ => JsonRpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        }
    }

    /// Handle initialize request.
    fn handle_initialize(&mut self, id: Option<Value>) -> JsonRpcResponse {
        match ResearchController::from_settings(&self.settings) {
            Ok(controller) => {
                self.controller = Some(controller);
                eprintln!("Research controller initialized");
            }
            Err(e) => {
                eprintln!("Failed to initialize research controller: {}", e);
                return JsonRpcResponse::error(id, -32000, &format!("Init failed: {}", e));
            }
        }

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };

        JsonRpcResponse::success(id, serde_json::to_value(result).unwrap())
    }

    /// Handle tools/list request.
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = ToolsListResult { tools: get_tools() };
        JsonRpcResponse::success(id, serde_json::to_value(result).unwrap())
    }

    /// Handle tools/call request.
    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, &format!("Invalid params: {}", e))
                }
            },
            None => return JsonRpcResponse::error(id, -32602, "Missing params"),
        };

        let result = match params.name.as_str() {
            "video-research" => self.tool_research(params.arguments).await,
            _ => ToolCallResult::error(format!("Unknown tool: {}", params.name)),
        };

        JsonRpcResponse::success(id, serde_json::to_value(result).unwrap())
    }

    /// Research tool: run the full loop and return the rendered report.
    async fn tool_research(&self, args: Option<Value>) -> ToolCallResult {
        let args = match args {
            Some(a) => a,
            None => return ToolCallResult::error("Missing arguments".to_string()),
        };

        let topic = match args.get("topic").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => return ToolCallResult::error("Missing 'topic' argument".to_string()),
        };

        let max_iterations = args
            .get("max_iterations")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);

        let controller = match &self.controller {
            Some(c) => c,
            None => return ToolCallResult::error("Server not initialized".to_string()),
        };

        let session_key = format!("research-{}", Uuid::new_v4());
        let session = match controller.start_session_with_limit(&session_key, &topic, max_iterations)
        {
            Ok(session) => session,
            Err(e) => return ToolCallResult::error(format!("Failed to start research: {}", e)),
        };

        let outcome = controller.run(session.clone()).await;

        let result = match outcome {
            Ok(summary) => {
                eprintln!(
                    "Research complete: {} videos, {} chunks",
                    summary.videos_processed, summary.chunks_indexed
                );
                let generator = ReportGenerator::new(
                    controller.retriever(),
                    self.settings.retrieval.clone(),
                );
                match generator.generate(&session).await {
                    Ok(report) => ToolCallResult::text(report),
                    Err(e) => ToolCallResult::error(format!("Report generation failed: {}", e)),
                }
            }
            Err(e) => ToolCallResult::error(format!("Research failed: {}", e)),
        };

        // The session holds the index; release it whether or not we produced
        // a report.
        controller.cleanup_session(&session_key);

        result
    }
}
