use crate::chunking::ChunkingConfig;
use crate::citation::CitationResolver;
use crate::classifier::{LopdfReader, PdfReader};
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::error::{with_deadline, IngestError, QueryError, StoreError};
use crate::ingest::collect_folder_chunks;
use crate::models::{IngestionReport, PromptFields, QueryAnswer};
use crate::responder::Responder;
use crate::store::EmbeddingStore;
use crate::workers::WorkerPool;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Public entry point: folder ingestion and cited question answering.
pub struct RetrievalOrchestrator<E, Q, R = LopdfReader>
where
    E: Embedder,
    Q: Responder,
    R: PdfReader,
{
    config: RagConfig,
    embedder: E,
    responder: Q,
    reader: Arc<R>,
    pool: Arc<WorkerPool>,
    citations: CitationResolver,
}

impl<E, Q> RetrievalOrchestrator<E, Q, LopdfReader>
where
    E: Embedder,
    Q: Responder,
{
    pub fn new(config: RagConfig, embedder: E, responder: Q) -> Result<Self, IngestError> {
        Self::with_reader(config, embedder, responder, LopdfReader)
    }
}

impl<E, Q, R> RetrievalOrchestrator<E, Q, R>
where
    E: Embedder,
    Q: Responder,
    R: PdfReader + Send + 'static,
{
    pub fn with_reader(
        config: RagConfig,
        embedder: E,
        responder: Q,
        reader: R,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        let pool = WorkerPool::new(config.worker_count())?;
        let citations = CitationResolver::new()?;

        Ok(Self {
            config,
            embedder,
            responder,
            reader: Arc::new(reader),
            pool: Arc::new(pool),
            citations,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    fn open_writable_store(&self) -> Result<EmbeddingStore, StoreError> {
        Ok(
            EmbeddingStore::open_or_create(&self.config.index_path, &self.config.doc_map_path)?
                .with_request_timeout(self.config.request_timeout()),
        )
    }

    fn open_readable_store(&self) -> Result<EmbeddingStore, StoreError> {
        Ok(
            EmbeddingStore::open_read_only(&self.config.index_path, &self.config.doc_map_path)?
                .with_request_timeout(self.config.request_timeout()),
        )
    }

    /// Classifies, chunks and embeds every PDF in `input_dir`, appending to the index.
    ///
    /// Re-ingesting the same folder appends the same chunks again.
    pub async fn ingest(&self, input_dir: &Path) -> Result<IngestionReport, IngestError> {
        let chunking = ChunkingConfig::try_from(&self.config)?;
        let reader = Arc::clone(&self.reader);
        let pool = Arc::clone(&self.pool);
        let folder = input_dir.to_path_buf();

        let collected = tokio::task::spawn_blocking(move || {
            collect_folder_chunks(reader.as_ref(), pool.as_ref(), &folder, chunking)
        })
        .await
        .map_err(|error| IngestError::WorkerPool(error.to_string()))??;

        let mut store = self.open_writable_store()?;
        let added = store
            .append(
                &self.embedder,
                &collected.batch.chunks,
                &collected.batch.metadata,
                self.config.batch_size,
            )
            .await?;
        store.persist()?;

        let report = IngestionReport {
            files_processed: collected.files_processed,
            skipped_files: collected.skipped_files,
            text_pages: collected.text_pages,
            image_pages: collected.image_pages,
            chunks_added: added,
            index_len: store.len(),
            completed_at: Utc::now(),
        };
        info!(
            folder = %input_dir.display(),
            files_processed = report.files_processed,
            files_skipped = report.skipped_files.len(),
            chunks_added = report.chunks_added,
            index_len = report.index_len,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Retrieves the closest chunks for `text` and asks the responder for a cited answer.
    pub async fn query(&self, text: &str) -> Result<QueryAnswer, QueryError> {
        let query = text.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let store = self.open_readable_store()?;
        let hits = store.search(&self.embedder, query, self.config.top_k).await?;
        let citations = self.citations.resolve(&hits, &store.known_filenames());

        let fields = PromptFields {
            query: query.to_string(),
            retrieved_results: hits.iter().map(|hit| hit.text.clone()).collect(),
            citation_text: citations.join("\n"),
        };
        let reply = with_deadline(
            "language responder call",
            self.config.request_timeout(),
            self.responder.respond(&fields),
        )
        .await
        .map_err(QueryError::Responder)?;

        info!(query, hits = hits.len(), responder = self.responder.name(), "answered query");
        Ok(QueryAnswer {
            query: query.to_string(),
            content: reply.content,
            citations,
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::ProviderError;
    use crate::responder::ExtractiveResponder;
    use crate::testing::{
        write_pdf, FailingEmbedder, FailingResponder, RecordingResponder, SlowProvider,
    };
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn config_in(dir: &TempDir) -> RagConfig {
        RagConfig {
            workers: Some(2),
            index_path: dir.path().join("out/index.bin"),
            doc_map_path: dir.path().join("out/doc_map.json"),
            ..RagConfig::default()
        }
    }

    fn local_orchestrator<Q: Responder>(
        dir: &TempDir,
        responder: Q,
    ) -> Result<RetrievalOrchestrator<CharacterNgramEmbedder, Q>, IngestError> {
        RetrievalOrchestrator::new(config_in(dir), CharacterNgramEmbedder::default(), responder)
    }

    fn input_dir(dir: &TempDir) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let input = dir.path().join("input");
        std::fs::create_dir(&input)?;
        write_pdf(&input.join("hello.pdf"), &[Some("Hello world"), None])?;
        Ok(input)
    }

    #[tokio::test]
    async fn two_page_document_yields_one_chunk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let orchestrator = local_orchestrator(&dir, ExtractiveResponder)?;

        let report = orchestrator.ingest(&input).await?;
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.text_pages, 1);
        assert_eq!(report.image_pages, 1);
        assert_eq!(report.chunks_added, 1);
        assert_eq!(report.index_len, 1);

        let store = EmbeddingStore::open_or_create(
            &orchestrator.config().index_path,
            &orchestrator.config().doc_map_path,
        )?;
        assert_eq!(store.len(), 1);
        let meta = store.get("hello.pdf_page1_0").ok_or("chunk id missing")?;
        assert!(meta.text.contains("Hello world"));
        Ok(())
    }

    #[tokio::test]
    async fn ingesting_twice_duplicates_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let orchestrator = local_orchestrator(&dir, ExtractiveResponder)?;

        orchestrator.ingest(&input).await?;
        let second = orchestrator.ingest(&input).await?;

        assert_eq!(second.chunks_added, 1);
        assert_eq!(second.index_len, 2);

        let answer = orchestrator.query("hello").await?;
        assert_eq!(answer.hits.len(), 2);
        assert_eq!(answer.hits[0].text, answer.hits[1].text);
        assert_ne!(answer.hits[0].chunk_id, answer.hits[1].chunk_id);
        Ok(())
    }

    #[tokio::test]
    async fn query_returns_answer_and_citations() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let responder = RecordingResponder::default();
        let orchestrator = local_orchestrator(&dir, responder)?;
        orchestrator.ingest(&input).await?;

        let answer = orchestrator.query("  Hello world  ").await?;
        assert_eq!(answer.citations, vec!["hello.pdf (page 1)"]);
        assert_eq!(answer.content, "recorded");

        let seen = orchestrator.responder.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].query, "Hello world");
        assert_eq!(seen[0].citation_text, "hello.pdf (page 1)");
        assert!(seen[0].retrieved_results[0].contains("Hello world"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_fails_before_touching_the_index() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let orchestrator = local_orchestrator(&dir, ExtractiveResponder)?;

        assert!(matches!(orchestrator.query("   ").await, Err(QueryError::EmptyQuery)));
        assert!(!orchestrator.config().index_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn query_on_missing_index_answers_from_nothing() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let orchestrator = local_orchestrator(&dir, ExtractiveResponder)?;

        let answer = orchestrator.query("anything").await?;
        assert!(answer.hits.is_empty());
        assert!(answer.citations.is_empty());
        assert_eq!(answer.content, crate::responder::NOT_AVAILABLE_ANSWER);
        Ok(())
    }

    #[tokio::test]
    async fn embedder_failure_aborts_ingest_without_persisting(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let orchestrator = RetrievalOrchestrator::new(
            config_in(&dir),
            FailingEmbedder::after_batches(0),
            ExtractiveResponder,
        )?;

        let result = orchestrator.ingest(&input).await;
        assert!(matches!(result, Err(IngestError::Store(_))));
        assert!(!orchestrator.config().index_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn responder_failure_names_the_failing_call() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let orchestrator = local_orchestrator(&dir, FailingResponder)?;
        orchestrator.ingest(&input).await?;

        let failure = orchestrator.query("hello").await.err().ok_or("query should fail")?;
        assert!(matches!(
            failure,
            QueryError::Responder(ProviderError::BackendResponse { status: 401, .. })
        ));
        assert!(failure.to_string().starts_with("language responder failed"));
        Ok(())
    }

    #[tokio::test]
    async fn query_never_touches_persist_temp_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let orchestrator = local_orchestrator(&dir, ExtractiveResponder)?;
        orchestrator.ingest(&input).await?;

        let map_tmp = dir.path().join("out/doc_map.json.tmp");
        let index_tmp = dir.path().join("out/index.bin.tmp");
        std::fs::write(&map_tmp, b"{}")?;
        std::fs::write(&index_tmp, b"pending")?;

        let answer = orchestrator.query("hello").await?;
        assert_eq!(answer.hits.len(), 1);
        assert_eq!(std::fs::read(&map_tmp)?, b"{}");
        assert_eq!(std::fs::read(&index_tmp)?, b"pending");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn slow_embedder_fails_ingest_with_timeout() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let config = RagConfig {
            request_timeout_secs: 1,
            ..config_in(&dir)
        };
        let orchestrator = RetrievalOrchestrator::new(
            config,
            SlowProvider::sleeping(Duration::from_secs(30)),
            ExtractiveResponder,
        )?;

        let result = orchestrator.ingest(&input).await;
        assert!(matches!(
            result,
            Err(IngestError::Store(StoreError::Embedder(ProviderError::Timeout { ref operation, .. })))
                if operation == "embedder batch call"
        ));
        assert!(!orchestrator.config().index_path.exists());
        assert!(!orchestrator.config().doc_map_path.exists());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn slow_responder_fails_query_with_timeout() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = input_dir(&dir)?;
        let config = RagConfig {
            request_timeout_secs: 1,
            ..config_in(&dir)
        };
        let orchestrator = RetrievalOrchestrator::new(
            config,
            CharacterNgramEmbedder::default(),
            SlowProvider::sleeping(Duration::from_secs(30)),
        )?;
        orchestrator.ingest(&input).await?;

        let failure = orchestrator.query("hello").await.err().ok_or("query should time out")?;
        assert!(matches!(
            failure,
            QueryError::Responder(ProviderError::Timeout { ref operation, seconds: 1 })
                if operation == "language responder call"
        ));
        Ok(())
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = RagConfig {
            chunk_overlap: 2_000,
            ..RagConfig::default()
        };
        let result =
            RetrievalOrchestrator::new(config, CharacterNgramEmbedder::default(), ExtractiveResponder);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }
}
