//! MCP server for Quarry. Exposes knowledge base management and
//! grounded test generation via the Model Context Protocol.
//!
//! Tools: 4 knowledge base + 2 generation + diagnostics = 7 total.

pub mod params;

use params::*;
use crate::config::QuarryConfig;
use crate::pipeline::QaPipeline;
use crate::store::ScoredChunk;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok_text(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn err_text(msg: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg)]))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize result: {}", e))
}

fn reply(result: Result<String, String>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(text) => ok_text(text),
        Err(msg) => {
            warn!(error = %msg, "tool call failed");
            err_text(msg)
        }
    }
}

#[derive(Serialize)]
struct Hit<'a> {
    source: &'a str,
    sequence: usize,
    score: f32,
    text: &'a str,
}

fn hits_json(hits: &[ScoredChunk]) -> Result<String, String> {
    let hits: Vec<Hit<'_>> = hits
        .iter()
        .map(|h| Hit {
            source: &h.chunk.source,
            sequence: h.chunk.sequence,
            score: h.score,
            text: &h.chunk.text,
        })
        .collect();
    to_json(&hits)
}

// ---------------------------------------------------------------------------
// Tool bodies (transport-free so they can be tested directly)
// ---------------------------------------------------------------------------

async fn build_knowledge_base(pipeline: &QaPipeline, p: BuildKnowledgeBaseParams) -> Result<String, String> {
    if p.paths.is_empty() {
        return Err("at least one path is required".to_string());
    }
    let paths: Vec<PathBuf> = p.paths.iter().map(PathBuf::from).collect();
    let report = pipeline
        .ingest_paths(&paths)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&report)
}

fn query_knowledge_base(pipeline: &QaPipeline, p: QueryKnowledgeBaseParams) -> Result<String, String> {
    let k = p.k.unwrap_or_else(|| pipeline.top_k());
    let hits = pipeline.query(&p.query, k).map_err(|e| e.to_string())?;
    hits_json(&hits)
}

fn knowledge_base_status(pipeline: &QaPipeline) -> Result<String, String> {
    let status = pipeline.status().map_err(|e| e.to_string())?;
    to_json(&status)
}

fn clear_knowledge_base(pipeline: &QaPipeline) -> Result<String, String> {
    let generation = pipeline.clear_knowledge_base().map_err(|e| e.to_string())?;
    to_json(&serde_json::json!({ "cleared": true, "generation": generation }))
}

async fn generate_test_cases(pipeline: &QaPipeline, p: GenerateTestCasesParams) -> Result<String, String> {
    let cases = pipeline
        .try_generate_test_cases(&p.feature)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&cases)
}

async fn generate_script(pipeline: &QaPipeline, p: GenerateScriptParams) -> Result<String, String> {
    let test_case = p
        .test_case
        .validated()
        .map_err(|e| format!("invalid test case: {}", e))?;
    pipeline
        .try_generate_script(&test_case, p.page_markup.as_deref())
        .await
        .map_err(|e| e.to_string())
}

fn diagnostics(pipeline: &QaPipeline) -> Result<String, String> {
    to_json(&pipeline.diagnostics().drain())
}

// ---------------------------------------------------------------------------
// QuarryMcpServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct QuarryMcpServer {
    pipeline: Arc<QaPipeline>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl QuarryMcpServer {
    pub fn new(pipeline: Arc<QaPipeline>) -> Self {
        Self {
            pipeline,
            tool_router: Self::tool_router(),
        }
    }

    // ── Knowledge base tools ────────────────────────────────────────────

    #[tool(description = "Replace the knowledge base with the given files and directories; returns an ingest report")]
    async fn build_knowledge_base(
        &self,
        Parameters(p): Parameters<BuildKnowledgeBaseParams>,
    ) -> Result<CallToolResult, McpError> {
        reply(build_knowledge_base(&self.pipeline, p).await)
    }

    #[tool(description = "Return the chunks most relevant to a query, best first, with sources and scores")]
    fn query_knowledge_base(
        &self,
        Parameters(p): Parameters<QueryKnowledgeBaseParams>,
    ) -> Result<CallToolResult, McpError> {
        reply(query_knowledge_base(&self.pipeline, p))
    }

    #[tool(description = "Show collection name, generation, chunk count and embedder")]
    fn knowledge_base_status(&self) -> Result<CallToolResult, McpError> {
        reply(knowledge_base_status(&self.pipeline))
    }

    #[tool(description = "Remove every document from the knowledge base")]
    fn clear_knowledge_base(&self) -> Result<CallToolResult, McpError> {
        reply(clear_knowledge_base(&self.pipeline))
    }

    // ── Generation tools ────────────────────────────────────────────────

    #[tool(description = "Generate test cases for a feature, grounded in the knowledge base; returns a JSON array")]
    async fn generate_test_cases(
        &self,
        Parameters(p): Parameters<GenerateTestCasesParams>,
    ) -> Result<CallToolResult, McpError> {
        reply(generate_test_cases(&self.pipeline, p).await)
    }

    #[tool(description = "Generate a Python Selenium script for a test case, optionally using the target page's HTML")]
    async fn generate_script(
        &self,
        Parameters(p): Parameters<GenerateScriptParams>,
    ) -> Result<CallToolResult, McpError> {
        reply(generate_script(&self.pipeline, p).await)
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    #[tool(description = "Return and clear the failures recorded since the last call (unparsable files, skipped chunks, generation errors and timeouts)")]
    fn diagnostics(&self) -> Result<CallToolResult, McpError> {
        reply(diagnostics(&self.pipeline))
    }
}

#[tool_handler]
impl ServerHandler for QuarryMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Quarry MCP server: build a knowledge base from product documents, then generate grounded test cases and Selenium scripts"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run_mcp_server(config: &QuarryConfig) -> i32 {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    rt.block_on(async {
        let pipeline = match QaPipeline::from_config(config) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("failed to open knowledge base at {}: {}", config.database.display(), e);
                return 1;
            }
        };

        let server = QuarryMcpServer::new(Arc::new(pipeline));

        info!(database = %config.database.display(), collection = %config.collection, "quarry mcp server starting on stdio");

        let service = match server.serve(rmcp::transport::stdio()).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("failed to start MCP server: {}", e);
                return 1;
            }
        };

        if let Err(e) = service.waiting().await {
            eprintln!("MCP server error: {}", e);
            return 1;
        }

        0
    })
}
