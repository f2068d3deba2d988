pub mod chunking;
pub mod citation;
pub mod classifier;
pub mod config;
pub mod embeddings;
pub mod error;
mod index_file;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod responder;
pub mod store;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{chunk_page_text, chunk_pages, split_windows, ChunkingConfig};
pub use citation::{similarity_ratio, Citation, CitationResolver, FILENAME_MATCH_THRESHOLD};
pub use classifier::{classify_pdf, classify_range, LopdfReader, PdfPages, PdfReader};
pub use config::{
    EmbedderProvider, EmbedderSettings, RagConfig, ResponderProvider, ResponderSettings,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbedderBackend, OpenAiEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, ProviderError, QueryError, StoreError};
pub use ingest::{classify_folder, collect_folder_chunks, discover_pdf_files, FolderChunks};
pub use models::{
    ChunkBatch, ChunkMeta, IngestionReport, PageClassification, PageKind, PromptFields,
    QueryAnswer, ResponderReply, SearchHit, SkippedPdf,
};
pub use orchestrator::RetrievalOrchestrator;
pub use responder::{
    ChatCompletionResponder, ExtractiveResponder, Responder, ResponderBackend,
};
pub use store::{chunk_id, EmbeddingStore};
pub use workers::{partition_pages, WorkerPool};
