use crate::error::IngestError;
use crate::models::PageClassification;
use crate::workers::{partition_pages, WorkerPool};
use lopdf::Document;
use std::ops::Range;
use std::path::Path;
use tracing::{error, info, warn};

/// Characters inspected per page when deciding whether it carries text.
pub const CLASSIFY_PREFIX_CHARS: usize = 100;

/// An opened, read-only view of one PDF. Handles are never shared between workers.
pub trait PdfPages {
    fn page_count(&self) -> u32;

    /// Extracted text for the 0-based `index`.
    fn page_text(&self, index: u32) -> Result<String, IngestError>;
}

/// Opens independent document handles, one per worker task.
pub trait PdfReader: Sync {
    type Pages: PdfPages;

    fn open(&self, path: &Path) -> Result<Self::Pages, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfReader;

pub struct LopdfPages {
    document: Document,
    page_numbers: Vec<u32>,
}

impl PdfReader for LopdfReader {
    type Pages = LopdfPages;

    fn open(&self, path: &Path) -> Result<LopdfPages, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let page_numbers = document.get_pages().into_keys().collect();
        Ok(LopdfPages {
            document,
            page_numbers,
        })
    }
}

impl PdfPages for LopdfPages {
    fn page_count(&self) -> u32 {
        self.page_numbers.len() as u32
    }

    fn page_text(&self, index: u32) -> Result<String, IngestError> {
        let page_no = self
            .page_numbers
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                IngestError::PdfParse(format!(
                    "page index {index} is out of range for {} pages",
                    self.page_numbers.len()
                ))
            })?;

        self.document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))
    }
}

pub fn is_text_bearing(raw_text: &str) -> bool {
    let prefix: String = raw_text.chars().take(CLASSIFY_PREFIX_CHARS).collect();
    !prefix.trim().is_empty()
}

/// Page count of `path`, read through a short-lived handle.
pub fn count_pages<R: PdfReader>(reader: &R, path: &Path) -> Result<u32, IngestError> {
    Ok(reader.open(path)?.page_count())
}

/// Classifies every page of `path`.
///
/// Errors only when the document cannot be opened at all; a failing worker range
/// is logged and left out of both page sets.
pub fn classify_pdf<R: PdfReader>(
    reader: &R,
    pool: &WorkerPool,
    path: &Path,
) -> Result<PageClassification, IngestError> {
    let total_pages = count_pages(reader, path)?;
    if total_pages == 0 {
        warn!(path = %path.display(), "pdf has no pages");
        return Ok(PageClassification::default());
    }

    info!(path = %path.display(), total_pages, "classifying pages");
    let classification = classify_range(reader, pool, path, 0..total_pages);
    info!(
        path = %path.display(),
        text_pages = classification.text_pages.len(),
        image_pages = classification.image_pages.len(),
        failed_ranges = classification.failed_ranges,
        "classified pages"
    );

    Ok(classification)
}

/// Classifies the contiguous `pages` of `path` across the pool.
pub fn classify_range<R: PdfReader>(
    reader: &R,
    pool: &WorkerPool,
    path: &Path,
    pages: Range<u32>,
) -> PageClassification {
    let offset = pages.start;
    let ranges: Vec<Range<u32>> = partition_pages(pages.end.saturating_sub(pages.start), pool.size())
        .into_iter()
        .map(|range| range.start + offset..range.end + offset)
        .collect();

    let outcomes = pool.run_ranges(&ranges, |range| classify_worker(reader, path, range));

    let mut classification = PageClassification {
        total_pages: pages.end.saturating_sub(pages.start),
        ..PageClassification::default()
    };
    for outcome in outcomes {
        match outcome {
            Some((text_pages, image_pages)) => {
                classification.text_pages.extend(text_pages);
                classification.image_pages.extend(image_pages);
            }
            None => classification.failed_ranges += 1,
        }
    }
    classification
}

fn classify_worker<R: PdfReader>(
    reader: &R,
    path: &Path,
    range: Range<u32>,
) -> Option<(Vec<u32>, Vec<u32>)> {
    let attempt = || -> Result<(Vec<u32>, Vec<u32>), IngestError> {
        let pages = reader.open(path)?;
        let mut text_pages = Vec::new();
        let mut image_pages = Vec::new();
        for index in range.clone() {
            if is_text_bearing(&pages.page_text(index)?) {
                text_pages.push(index);
            } else {
                image_pages.push(index);
            }
        }
        Ok((text_pages, image_pages))
    };

    match attempt() {
        Ok(result) => Some(result),
        Err(failure) => {
            error!(
                path = %path.display(),
                start = range.start,
                end = range.end,
                error = %failure,
                "failed to classify page range"
            );
            None
        }
    }
}
