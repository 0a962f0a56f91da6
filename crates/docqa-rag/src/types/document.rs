//! Document and chunk metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Documents are identified by their filename
pub type DocumentId = String;

/// Supported document formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// PDF document
    Pdf,
    /// Plain text file (UTF-8)
    Txt,
    /// Markdown file
    Markdown,
}

impl DocumentFormat {
    /// Detect format from a file extension
    pub fn from_extension(ext: &str) -> Result<Self> {
        ext.parse()
    }

    /// Detect format from a file path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))?;
        Self::from_extension(ext)
    }

    /// Canonical extension
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Markdown => "md",
        }
    }
}

impl FromStr for DocumentFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" | "text" => Ok(Self::Txt),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-document registry entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    /// Document ID (the uploaded filename)
    pub document_id: DocumentId,
    /// Filename as shown to users
    pub filename: String,
    /// Source format
    pub format: DocumentFormat,
    /// SHA-256 of the extracted text
    pub content_hash: String,
    /// When this version was committed
    pub ingested_at: DateTime<Utc>,
}

impl DocumentInfo {
    /// Create a registry entry for freshly extracted text
    pub fn new(document_id: impl Into<String>, format: DocumentFormat, text: &str) -> Self {
        let document_id = document_id.into();
        Self {
            filename: document_id.clone(),
            document_id,
            format,
            content_hash: hash_content(text),
            ingested_at: Utc::now(),
        }
    }
}

/// Chunk attributes kept in the metadata store (everything except the embedding)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Owning document
    pub document_id: DocumentId,
    /// Position within the document
    pub ordinal: u32,
    /// Chunk text
    pub text: String,
    /// Character offset of the first character in the extracted text
    pub char_start: usize,
    /// Character offset one past the last character
    pub char_end: usize,
    /// 1-based page the chunk starts on, for paged formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Listing entry for one stored document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub document_id: DocumentId,
    pub filename: String,
    pub format: DocumentFormat,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Compute SHA-256 hash of content
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
