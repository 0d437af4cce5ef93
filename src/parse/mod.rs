//! Document parsing: raw bytes to plain text
//!
//! Each supported declared type has its own extractor. Parsing is pure and
//! per-document; callers decide what to do with a `ParseError` (the ingest
//! pipeline records it and carries on with the rest of the batch).

mod html;
mod json;
mod pdf;
mod text;

pub use html::html_to_text;
pub use json::canonicalize_json;
pub use pdf::pdf_to_text;
pub use text::decode_text;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while extracting text from a document
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("invalid JSON in {name}: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unreadable PDF {name}: {reason}")]
    Pdf { name: String, reason: String },

    #[error("duplicate document name in batch: {0}")]
    DuplicateName(String),

    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// The declared type of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Markdown,
    Html,
    Json,
    Pdf,
}

impl DocumentKind {
    /// Resolve a kind from a file extension (case-insensitive, no dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "json" => Some(Self::Json),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Resolve a kind from a file name's extension.
    pub fn from_name(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Json => "json",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded artifact awaiting text extraction.
///
/// Consumed once by [`parse`]; the raw bytes are not retained afterwards.
#[derive(Debug, Clone)]
pub struct Document {
    /// File name, unique within an ingestion batch
    pub name: String,
    pub bytes: Vec<u8>,
    /// `None` when the extension is not one of the supported types
    pub kind: Option<DocumentKind>,
}

impl Document {
    /// Create a document whose kind is inferred from the name's extension.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let kind = DocumentKind::from_name(&name);
        Self {
            name,
            bytes: bytes.into(),
            kind,
        }
    }

    /// Create a document with an explicitly declared kind.
    pub fn with_kind(name: impl Into<String>, bytes: impl Into<Vec<u8>>, kind: DocumentKind) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            kind: Some(kind),
        }
    }

    /// Read a document from disk, naming it by its file name.
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
            name: name.clone(),
            source,
        })?;
        Ok(Self::new(name, bytes))
    }
}

/// Extract plain text from a document according to its declared kind.
pub fn parse(document: &Document) -> Result<String, ParseError> {
    let kind = document
        .kind
        .ok_or_else(|| ParseError::Unsupported(document.name.clone()))?;

    match kind {
        DocumentKind::Text | DocumentKind::Markdown => Ok(decode_text(&document.bytes)),
        DocumentKind::Html => Ok(html_to_text(&decode_text(&document.bytes))),
        DocumentKind::Json => {
            canonicalize_json(&document.bytes).map_err(|source| ParseError::Json {
                name: document.name.clone(),
                source,
            })
        }
        DocumentKind::Pdf => pdf_to_text(&document.bytes).map_err(|reason| ParseError::Pdf {
            name: document.name.clone(),
            reason,
        }),
    }
}
