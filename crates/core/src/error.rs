use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("every pdf in {folder} failed to ingest ({failed} file(s))")]
    AllFilesFailed { folder: String, failed: usize },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("embedding store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("document map serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt index file {path}: {details}")]
    CorruptIndex { path: String, details: String },

    #[error(
        "index and document map disagree: index has {index_len} vectors, {ids_len} ids, map has {map_len} entries"
    )]
    InvariantViolation {
        index_len: usize,
        ids_len: usize,
        map_len: usize,
    },

    #[error("document map has no entry for indexed chunk id {0}")]
    MissingMapEntry(String),

    #[error("chunk id {0} is already present in the index")]
    DuplicateChunkId(String),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedder returned {returned} vectors for {requested} texts")]
    EmbeddingCount { requested: usize, returned: usize },

    #[error("{chunks} chunks were given with {metadata} metadata records")]
    MetadataCount { chunks: usize, metadata: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedder call failed: {0}")]
    Embedder(#[from] ProviderError),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid response from {backend} ({status}): {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("malformed response from {backend}: {details}")]
    MalformedResponse { backend: String, details: String },
}

/// Awaits `call`, failing with [`ProviderError::Timeout`] once `limit` elapses.
pub async fn with_deadline<T, F>(
    operation: &str,
    limit: std::time::Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: std::future::Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("index search failed: {0}")]
    Store(#[from] StoreError),

    #[error("language responder failed: {0}")]
    Responder(#[source] ProviderError),
}
