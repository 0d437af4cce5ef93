//! MCP tool parameter structs with schemars-derived JSON schemas.

use crate::generate::TestCase;
use schemars::JsonSchema;
use serde::Deserialize;

// ── Knowledge base params ───────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BuildKnowledgeBaseParams {
    #[schemars(
        description = "Files or directories to ingest (.txt, .md, .html, .json, .pdf). Replaces the current knowledge base."
    )]
    pub paths: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryKnowledgeBaseParams {
    #[schemars(description = "Natural-language query")]
    pub query: String,
    #[schemars(description = "Maximum number of chunks to return (default: configured top_k)")]
    pub k: Option<usize>,
}

// ── Generation params ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateTestCasesParams {
    #[schemars(description = "Feature to generate test cases for, e.g. 'Discount Code'")]
    pub feature: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateScriptParams {
    #[schemars(description = "A test case as returned by generate_test_cases")]
    pub test_case: TestCase,
    #[schemars(description = "HTML of the page under test, used to pick selectors")]
    pub page_markup: Option<String>,
}
