//! Quarry CLI: document knowledge base and grounded QA generation.
//!
//! Usage:
//!   quarry ingest <FILES...>
//!   quarry query <TEXT> [-k N]
//!   quarry test-cases <FEATURE> [--out FILE]
//!   quarry script --test-case FILE [--index N] [--page FILE] [--out FILE]
//!   quarry status | clear | mcp
//!
//! Global: [--config PATH] [--db PATH] [--collection NAME]

use clap::{Parser, Subcommand};
use quarry::{IngestFailure, QaPipeline, QuarryConfig, TestCase};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "quarry",
    version,
    about = "Document knowledge base with grounded test case and script generation"
)]
struct Cli {
    /// YAML config file (default: $QUARRY_CONFIG, else built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Collection name inside the database
    #[arg(long, global = true)]
    collection: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the knowledge base from files and directories
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show the chunks most relevant to a query
    Query {
        text: String,
        /// Number of chunks to return
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Show collection, generation, chunk count and embedder
    Status,
    /// Remove every chunk from the collection
    Clear,
    /// Generate test cases for a feature (JSON)
    TestCases {
        feature: String,
        /// Write the JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a Selenium script for a test case
    Script {
        /// JSON file holding a test case or an array of them
        #[arg(long)]
        test_case: PathBuf,
        /// Which test case to use when the file holds an array
        #[arg(long, default_value_t = 0)]
        index: usize,
        /// HTML of the page under test
        #[arg(long)]
        page: Option<PathBuf>,
        /// Write the script here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Start the MCP (Model Context Protocol) server on stdio
    Mcp,
}

fn load_config(cli: &Cli) -> Result<QuarryConfig, String> {
    let mut config = QuarryConfig::discover(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(db) = &cli.db {
        config.database = db.clone();
    }
    if let Some(collection) = &cli.collection {
        config.collection = collection.clone();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))
}

fn write_output(out: Option<&Path>, text: &str) -> i32 {
    match out {
        Some(path) => match std::fs::write(path, text) {
            Ok(()) => {
                eprintln!("Wrote {}", path.display());
                0
            }
            Err(e) => {
                eprintln!("Error: cannot write '{}': {}", path.display(), e);
                1
            }
        },
        None => {
            println!("{}", text);
            0
        }
    }
}

fn cmd_ingest(pipeline: &QaPipeline, paths: &[PathBuf]) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match rt.block_on(pipeline.ingest_paths(paths)) {
        Ok(report) => {
            println!(
                "Indexed {} chunks from {} of {} documents (generation {})",
                report.chunks_indexed, report.parsed, report.documents, report.generation
            );
            for failure in &report.failures {
                match failure {
                    IngestFailure::Parse { document, message } => {
                        eprintln!("  skipped {}: {}", document, message)
                    }
                    IngestFailure::Index(e) => eprintln!("  skipped {}", e),
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_query(pipeline: &QaPipeline, text: &str, k: Option<usize>) -> i32 {
    let k = k.unwrap_or_else(|| pipeline.top_k());
    match pipeline.query(text, k) {
        Ok(hits) if hits.is_empty() => {
            println!("No matching chunks.");
            0
        }
        Ok(hits) => {
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.4}] {} #{}",
                    rank + 1,
                    hit.score,
                    hit.chunk.source,
                    hit.chunk.sequence
                );
                for line in hit.chunk.text.lines() {
                    println!("     {}", line);
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_status(pipeline: &QaPipeline, config: &QuarryConfig) -> i32 {
    match pipeline.status() {
        Ok(status) => {
            println!("{:<12}  {}", "DATABASE", config.database.display());
            println!("{:<12}  {}", "COLLECTION", status.collection);
            println!("{:<12}  {}", "GENERATION", status.knowledge_base.generation);
            println!("{:<12}  {}", "CHUNKS", status.knowledge_base.chunks);
            println!(
                "{:<12}  {} ({} dims)",
                "EMBEDDER", status.knowledge_base.embedder_id, status.knowledge_base.dimensions
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_clear(pipeline: &QaPipeline) -> i32 {
    match pipeline.clear_knowledge_base() {
        Ok(generation) => {
            println!("Cleared knowledge base (generation {})", generation);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_test_cases(pipeline: &QaPipeline, feature: &str, out: Option<&Path>) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let cases = match rt.block_on(pipeline.try_generate_test_cases(feature)) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match serde_json::to_string_pretty(&cases) {
        Ok(json) => write_output(out, &json),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Read a test case from a file holding either one object or an array.
fn read_test_case(path: &Path, index: usize) -> Result<TestCase, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON in '{}': {}", path.display(), e))?;
    let record = match value {
        serde_json::Value::Array(mut items) => {
            if index >= items.len() {
                return Err(format!(
                    "index {} out of range: '{}' holds {} test cases",
                    index,
                    path.display(),
                    items.len()
                ));
            }
            items.swap_remove(index)
        }
        other => other,
    };
    TestCase::from_json(record).map_err(|e| format!("invalid test case: {}", e))
}

fn cmd_script(
    pipeline: &QaPipeline,
    test_case: &Path,
    index: usize,
    page: Option<&Path>,
    out: Option<&Path>,
) -> i32 {
    let case = match read_test_case(test_case, index) {
        Ok(case) => case,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let markup = match page.map(std::fs::read_to_string).transpose() {
        Ok(markup) => markup,
        Err(e) => {
            eprintln!("Error: cannot read page markup: {}", e);
            return 1;
        }
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match rt.block_on(pipeline.try_generate_script(&case, markup.as_deref())) {
        Ok(script) => write_output(out, &script),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    quarry::logging::init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::Mcp = cli.command {
        std::process::exit(quarry::mcp::run_mcp_server(&config));
    }

    let pipeline = match QaPipeline::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: failed to open knowledge base at {}: {}", config.database.display(), e);
            std::process::exit(1);
        }
    };

    let code = match &cli.command {
        Commands::Ingest { paths } => cmd_ingest(&pipeline, paths),
        Commands::Query { text, k } => cmd_query(&pipeline, text, *k),
        Commands::Status => cmd_status(&pipeline, &config),
        Commands::Clear => cmd_clear(&pipeline),
        Commands::TestCases { feature, out } => cmd_test_cases(&pipeline, feature, out.as_deref()),
        Commands::Script {
            test_case,
            index,
            page,
            out,
        } => cmd_script(&pipeline, test_case, *index, page.as_deref(), out.as_deref()),
        Commands::Mcp => 0,
    };
    std::process::exit(code);
}
