use crate::classifier::{PdfPages, PdfReader};
use crate::config::RagConfig;
use crate::error::IngestError;
use crate::models::{ChunkBatch, ChunkMeta};
use crate::workers::{partition_pages, WorkerPool};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        if max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "window size must be positive".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {overlap_chars} must be smaller than window size {max_chars}"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: crate::config::DEFAULT_CHUNK_SIZE,
            overlap_chars: crate::config::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TryFrom<&RagConfig> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &RagConfig) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Splits `text` into windows of `max_chars` characters that overlap by
/// `overlap_chars`. The final window may be shorter.
pub fn split_windows(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

/// Chunks the text of one page. `page_index` is 0-based; metadata pages are 1-based.
pub fn chunk_page_text(
    file: &str,
    page_index: u32,
    page_text: &str,
    config: ChunkingConfig,
) -> ChunkBatch {
    let trimmed = page_text.trim();
    if trimmed.is_empty() {
        return ChunkBatch::default();
    }

    let chunks = split_windows(trimmed, config);
    let metadata = chunks
        .iter()
        .map(|chunk| ChunkMeta {
            text: chunk.clone(),
            file: file.to_string(),
            page: page_index + 1,
        })
        .collect();

    ChunkBatch { chunks, metadata }
}

pub fn file_name_of(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

/// Chunks the given pages of `path`, splitting the page list across the pool.
///
/// Each worker opens its own handle; a failing worker contributes no chunks.
pub fn chunk_pages<R: PdfReader>(
    reader: &R,
    pool: &WorkerPool,
    path: &Path,
    pages: &BTreeSet<u32>,
    config: ChunkingConfig,
) -> Result<ChunkBatch, IngestError> {
    let file = file_name_of(path)?;
    let pages: Vec<u32> = pages.iter().copied().collect();
    let ranges = partition_pages(pages.len() as u32, pool.size());

    let parts = pool.run_ranges(&ranges, |range| {
        let assigned = &pages[range.start as usize..range.end as usize];
        chunk_worker(reader, path, &file, assigned, config)
    });

    let mut batch = ChunkBatch::default();
    for part in parts {
        batch.extend(part);
    }
    debug!(path = %path.display(), pages = pages.len(), chunks = batch.len(), "chunked pdf");
    Ok(batch)
}

fn chunk_worker<R: PdfReader>(
    reader: &R,
    path: &Path,
    file: &str,
    assigned: &[u32],
    config: ChunkingConfig,
) -> ChunkBatch {
    let attempt = || -> Result<ChunkBatch, IngestError> {
        let document = reader.open(path)?;
        let mut batch = ChunkBatch::default();
        for &page_index in assigned {
            let text = document.page_text(page_index)?;
            batch.extend(chunk_page_text(file, page_index, &text, config));
        }
        Ok(batch)
    };

    attempt().unwrap_or_else(|failure| {
        error!(
            path = %path.display(),
            pages = ?assigned,
            error = %failure,
            "failed to chunk pages"
        );
        ChunkBatch::default()
    })
}
