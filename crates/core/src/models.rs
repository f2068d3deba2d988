use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Provenance for one chunk, stored as the document map value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMeta {
    pub text: String,
    pub file: String,
    /// 1-based page number.
    pub page: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PageKind {
    TextBearing,
    ImageOnly,
}

/// Page partition of one PDF. Page indices are 0-based.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageClassification {
    pub text_pages: BTreeSet<u32>,
    pub image_pages: BTreeSet<u32>,
    pub total_pages: u32,
    pub failed_ranges: usize,
}

impl PageClassification {
    pub fn kind_of(&self, page: u32) -> Option<PageKind> {
        if self.text_pages.contains(&page) {
            Some(PageKind::TextBearing)
        } else if self.image_pages.contains(&page) {
            Some(PageKind::ImageOnly)
        } else {
            None
        }
    }

    /// Pages attributed to neither set because a worker failed.
    pub fn gaps(&self) -> u32 {
        let classified = (self.text_pages.len() + self.image_pages.len()) as u32;
        self.total_pages.saturating_sub(classified)
    }
}

/// Output of the chunker for one document, `chunks[i]` pairs with `metadata[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkBatch {
    pub chunks: Vec<String>,
    pub metadata: Vec<ChunkMeta>,
}

impl ChunkBatch {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn extend(&mut self, other: ChunkBatch) {
        self.chunks.extend(other.chunks);
        self.metadata.extend(other.metadata);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub chunk_id: String,
    /// Squared L2 distance to the query vector.
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptFields {
    pub query: String,
    pub retrieved_results: Vec<String>,
    pub citation_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponderReply {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub query: String,
    pub content: String,
    pub citations: Vec<String>,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub files_processed: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub text_pages: usize,
    pub image_pages: usize,
    pub chunks_added: usize,
    pub index_len: usize,
    pub completed_at: DateTime<Utc>,
}
