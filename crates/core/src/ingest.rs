use crate::chunking::{chunk_pages, file_name_of, ChunkingConfig};
use crate::classifier::{classify_pdf, PdfReader};
use crate::error::IngestError;
use crate::models::{ChunkBatch, PageClassification, SkippedPdf};
use crate::workers::WorkerPool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// `*.pdf` files directly inside `folder`, sorted by path.
pub fn discover_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "input directory does not exist: {}",
            folder.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

/// Classifies every PDF in `folder`, keyed by file name.
///
/// Files that cannot be read are logged and reported with empty page sets.
pub fn classify_folder<R: PdfReader>(
    reader: &R,
    pool: &WorkerPool,
    folder: &Path,
) -> Result<BTreeMap<String, PageClassification>, IngestError> {
    let files = discover_pdf_files(folder)?;
    if files.is_empty() {
        warn!(folder = %folder.display(), "no pdf files found");
    }

    let mut results = BTreeMap::new();
    for path in files {
        let name = file_name_of(&path)?;
        let classification = classify_pdf(reader, pool, &path).unwrap_or_else(|failure| {
            error!(path = %path.display(), error = %failure, "failed to classify pdf");
            PageClassification::default()
        });
        results.insert(name, classification);
    }
    Ok(results)
}

/// Chunks gathered from one folder before they are embedded.
#[derive(Debug, Default)]
pub struct FolderChunks {
    pub batch: ChunkBatch,
    pub files_processed: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub text_pages: usize,
    pub image_pages: usize,
}

/// Classifies and chunks every PDF in `folder` in file-list order.
///
/// A file that cannot be opened is skipped; the call fails only when the folder is
/// missing, holds no PDFs, or every PDF was skipped.
pub fn collect_folder_chunks<R: PdfReader>(
    reader: &R,
    pool: &WorkerPool,
    folder: &Path,
    chunking: ChunkingConfig,
) -> Result<FolderChunks, IngestError> {
    let files = discover_pdf_files(folder)?;
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }
    info!(folder = %folder.display(), files = files.len(), "ingesting folder");

    let mut collected = FolderChunks::default();
    for path in files {
        let outcome = (|| {
            let classification = classify_pdf(reader, pool, &path)?;
            let batch = chunk_pages(reader, pool, &path, &classification.text_pages, chunking)?;
            Ok::<_, IngestError>((classification, batch))
        })();

        match outcome {
            Ok((classification, batch)) => {
                info!(
                    path = %path.display(),
                    text_pages = classification.text_pages.len(),
                    image_pages = classification.image_pages.len(),
                    chunks = batch.len(),
                    "processed pdf"
                );
                collected.files_processed += 1;
                collected.text_pages += classification.text_pages.len();
                collected.image_pages += classification.image_pages.len();
                collected.batch.extend(batch);
            }
            Err(failure) => {
                warn!(path = %path.display(), error = %failure, "skipping pdf");
                collected.skipped_files.push(SkippedPdf {
                    path,
                    reason: failure.to_string(),
                });
            }
        }
    }

    if collected.files_processed == 0 {
        return Err(IngestError::AllFilesFailed {
            folder: folder.display().to_string(),
            failed: collected.skipped_files.len(),
        });
    }
    Ok(collected)
}
