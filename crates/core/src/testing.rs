//! Fixtures shared by unit tests: generated PDFs, scripted readers, fake providers.

use crate::classifier::{PdfPages, PdfReader};
use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::{IngestError, ProviderError};
use crate::models::{ChunkMeta, PromptFields, ResponderReply};
use crate::responder::Responder;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Writes a PDF with one page per entry; `None` pages have an empty content stream.
pub(crate) fn write_pdf(path: &Path, pages: &[Option<&str>]) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = match text {
            Some(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
            None => Vec::new(),
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}

pub(crate) fn meta(file: &str, page: u32, text: &str) -> ChunkMeta {
    ChunkMeta {
        text: text.to_string(),
        file: file.to_string(),
        page,
    }
}

/// In-memory document whose page `failing_page` errors on extraction.
#[derive(Debug, Clone)]
pub(crate) struct FlakyReader {
    pages: Vec<Option<String>>,
    failing_page: Option<u32>,
}

impl FlakyReader {
    pub(crate) fn new(pages: Vec<Option<&str>>, failing_page: Option<u32>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| page.map(str::to_string))
                .collect(),
            failing_page,
        }
    }
}

impl PdfReader for FlakyReader {
    type Pages = FlakyReader;

    fn open(&self, _path: &Path) -> Result<FlakyReader, IngestError> {
        Ok(self.clone())
    }
}

impl PdfPages for FlakyReader {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, index: u32) -> Result<String, IngestError> {
        if self.failing_page == Some(index) {
            return Err(IngestError::PdfParse(format!("page {index} is corrupt")));
        }
        Ok(self
            .pages
            .get(index as usize)
            .cloned()
            .flatten()
            .unwrap_or_default())
    }
}

/// Succeeds for `allowed` batches, then fails every call.
#[derive(Debug)]
pub(crate) struct FailingEmbedder {
    allowed: usize,
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub(crate) fn after_batches(allowed: usize) -> Self {
        Self {
            allowed,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.allowed {
            return CharacterNgramEmbedder::default().embed_batch(texts).await;
        }
        Err(ProviderError::BackendResponse {
            backend: "failing".to_string(),
            status: 503,
            details: "embedding service unavailable".to_string(),
        })
    }
}

/// Returns fixed vectors per text and records every batch size.
#[derive(Debug, Default)]
pub(crate) struct TableEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    batches: Mutex<Vec<usize>>,
}

impl TableEmbedder {
    pub(crate) fn with_vectors(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().map(|sizes| sizes.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn name(&self) -> &str {
        "table"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if let Ok(mut sizes) = self.batches.lock() {
            sizes.push(texts.len());
        }
        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| vec![text.len() as f32, 1.0])
            })
            .collect())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingResponder {
    seen: Mutex<Vec<PromptFields>>,
}

impl RecordingResponder {
    pub(crate) fn seen(&self) -> Vec<PromptFields> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    fn name(&self) -> &str {
        "recording"
    }

    async fn respond(&self, fields: &PromptFields) -> Result<ResponderReply, ProviderError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(fields.clone());
        }
        Ok(ResponderReply {
            content: "recorded".to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct FailingResponder;

#[async_trait]
impl Responder for FailingResponder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn respond(&self, _fields: &PromptFields) -> Result<ResponderReply, ProviderError> {
        Err(ProviderError::BackendResponse {
            backend: "failing".to_string(),
            status: 401,
            details: "invalid api key".to_string(),
        })
    }
}

/// Sleeps for `delay` before every call; pair with a paused tokio clock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlowProvider {
    delay: Duration,
}

impl SlowProvider {
    pub(crate) fn sleeping(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Embedder for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        tokio::time::sleep(self.delay).await;
        CharacterNgramEmbedder::default().embed_batch(texts).await
    }
}

#[async_trait]
impl Responder for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn respond(&self, _fields: &PromptFields) -> Result<ResponderReply, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(ResponderReply {
            content: "too late".to_string(),
        })
    }
}
