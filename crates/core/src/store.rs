use crate::embeddings::Embedder;
use crate::error::{with_deadline, StoreError};
use crate::index_file::{self, FlatIndex};
use crate::models::{ChunkMeta, SearchHit};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Chunk ids are `<file>_page<page>_<position>`, where `position` is the row the
/// chunk occupies in the index. Rows only grow, so ids never repeat across appends.
pub fn chunk_id(file: &str, page: u32, position: usize) -> String {
    format!("{file}_page{page}_{position}")
}

/// Vector index, id list and document map, kept in lockstep.
///
/// Mutated only through [`EmbeddingStore::append`]; read through
/// [`EmbeddingStore::search`] and the lookup accessors.
#[derive(Debug)]
pub struct EmbeddingStore {
    index_path: PathBuf,
    doc_map_path: PathBuf,
    index: FlatIndex,
    documents: BTreeMap<String, ChunkMeta>,
    request_timeout: Duration,
}

impl EmbeddingStore {
    /// Opens the store for writing. A persist interrupted by a crash is rolled
    /// forward or discarded first, so only one writer may call this at a time.
    pub fn open_or_create(
        index_path: impl Into<PathBuf>,
        doc_map_path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let index_path = index_path.into();
        let doc_map_path = doc_map_path.into();
        recover_interrupted_persist(&index_path, &doc_map_path)?;
        Self::load_pair(index_path, doc_map_path)
    }

    /// Opens the store for searching without touching any file on disk.
    ///
    /// Leftover `*.tmp` files belong to a writer and are ignored. A pair caught
    /// between the writer's two renames fails the invariant check instead of
    /// being repaired.
    pub fn open_read_only(
        index_path: impl Into<PathBuf>,
        doc_map_path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        Self::load_pair(index_path.into(), doc_map_path.into())
    }

    fn load_pair(index_path: PathBuf, doc_map_path: PathBuf) -> Result<Self, StoreError> {
        let mut store = Self {
            index_path,
            doc_map_path,
            index: FlatIndex::default(),
            documents: BTreeMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };

        match (store.index_path.exists(), store.doc_map_path.exists()) {
            (true, true) => {
                store.load()?;
                info!(
                    index = %store.index_path.display(),
                    doc_map = %store.doc_map_path.display(),
                    vectors = store.len(),
                    "loaded embedding store"
                );
            }
            (false, false) => {
                info!(index = %store.index_path.display(), "creating new embedding store");
            }
            (index_exists, map_exists) => {
                warn!(
                    index = %store.index_path.display(),
                    doc_map = %store.doc_map_path.display(),
                    index_exists,
                    map_exists,
                    "index/map pair incomplete, starting an empty store"
                );
            }
        }

        Ok(store)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn load(&mut self) -> Result<(), StoreError> {
        let bytes = fs::read(&self.index_path).map_err(|error| StoreError::io(&self.index_path, error))?;
        let index = index_file::decode(&bytes, &self.index_path)?;

        let raw_map =
            fs::read(&self.doc_map_path).map_err(|error| StoreError::io(&self.doc_map_path, error))?;
        let documents: BTreeMap<String, ChunkMeta> = serde_json::from_slice(&raw_map)?;

        if index.len() != index.ids.len() || documents.len() != index.ids.len() {
            return Err(StoreError::InvariantViolation {
                index_len: index.len(),
                ids_len: index.ids.len(),
                map_len: documents.len(),
            });
        }
        if let Some(missing) = index.ids.iter().find(|id| !documents.contains_key(*id)) {
            return Err(StoreError::MissingMapEntry(missing.clone()));
        }

        self.index = index;
        self.documents = documents;
        Ok(())
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn doc_map_path(&self) -> &Path {
        &self.doc_map_path
    }

    pub fn len(&self) -> usize {
        self.index.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.ids.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension
    }

    pub fn get(&self, chunk_id: &str) -> Option<&ChunkMeta> {
        self.documents.get(chunk_id)
    }

    /// Distinct source file names, sorted.
    pub fn known_filenames(&self) -> Vec<String> {
        self.documents
            .values()
            .map(|meta| meta.file.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Embeds `chunks` in batches of `batch_size` and appends them.
    ///
    /// An embedder failure aborts the call; batches appended before it stay in
    /// memory until [`EmbeddingStore::persist`].
    pub async fn append<E>(
        &mut self,
        embedder: &E,
        chunks: &[String],
        metadata: &[ChunkMeta],
        batch_size: usize,
    ) -> Result<usize, StoreError>
    where
        E: Embedder + ?Sized,
    {
        if chunks.len() != metadata.len() {
            return Err(StoreError::MetadataCount {
                chunks: chunks.len(),
                metadata: metadata.len(),
            });
        }
        if batch_size == 0 {
            return Err(StoreError::InvalidArgument(
                "batch size must be positive".to_string(),
            ));
        }

        let started = Instant::now();
        let mut added = 0;
        for (texts, metas) in chunks.chunks(batch_size).zip(metadata.chunks(batch_size)) {
            let offset = self.len();
            let ids: Vec<String> = metas
                .iter()
                .enumerate()
                .map(|(position, meta)| chunk_id(&meta.file, meta.page, offset + position))
                .collect();
            if let Some(duplicate) = ids.iter().find(|id| self.documents.contains_key(*id)) {
                return Err(StoreError::DuplicateChunkId(duplicate.clone()));
            }

            let vectors = with_deadline(
                "embedder batch call",
                self.request_timeout,
                embedder.embed_batch(texts),
            )
            .await?;
            if vectors.len() != texts.len() {
                return Err(StoreError::EmbeddingCount {
                    requested: texts.len(),
                    returned: vectors.len(),
                });
            }
            self.check_dimensions(&vectors)?;

            for ((id, vector), meta) in ids.into_iter().zip(&vectors).zip(metas) {
                self.index.push(id.clone(), vector)?;
                self.documents.insert(id, meta.clone());
            }
            added += texts.len();
            debug!(batch = texts.len(), total = self.len(), "appended embedding batch");
        }

        info!(
            added,
            total = self.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedding append finished"
        );
        Ok(added)
    }

    fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<(), StoreError> {
        let expected = match self.index.dimension {
            Some(dimension) => dimension,
            None => match vectors.first() {
                Some(first) => first.len(),
                None => return Ok(()),
            },
        };
        match vectors.iter().find(|vector| vector.len() != expected || vector.is_empty()) {
            Some(bad) => Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }

    /// Writes the document map and index through temp files, then renames the map
    /// followed by the index.
    pub fn persist(&self) -> Result<(), StoreError> {
        let map_tmp = tmp_path(&self.doc_map_path);
        let index_tmp = tmp_path(&self.index_path);

        write_synced(&map_tmp, &serde_json::to_vec_pretty(&self.documents)?)?;
        write_synced(&index_tmp, &index_file::encode(&self.index))?;

        fs::rename(&map_tmp, &self.doc_map_path)
            .map_err(|error| StoreError::io(&self.doc_map_path, error))?;
        fs::rename(&index_tmp, &self.index_path)
            .map_err(|error| StoreError::io(&self.index_path, error))?;

        info!(
            index = %self.index_path.display(),
            doc_map = %self.doc_map_path.display(),
            vectors = self.len(),
            "persisted embedding store"
        );
        Ok(())
    }

    /// Embeds `query_text` once and returns the `top_k` nearest chunks.
    pub async fn search<E>(
        &self,
        embedder: &E,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, StoreError>
    where
        E: Embedder + ?Sized,
    {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = with_deadline(
            "embedder query call",
            self.request_timeout,
            embedder.embed_one(query_text),
        )
        .await?;
        self.nearest(&query_vector, top_k)
    }

    /// Exact linear scan by squared L2 distance, ties kept in insertion order.
    pub fn nearest(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, StoreError> {
        let Some(dimension) = self.index.dimension else {
            return Ok(Vec::new());
        };
        if query_vector.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<(usize, f64)> = self
            .index
            .rows()
            .map(|row| squared_l2(query_vector, row))
            .enumerate()
            .collect();
        scored.sort_by(|left, right| left.1.total_cmp(&right.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(position, distance)| {
                let chunk_id = &self.index.ids[position];
                let meta = self
                    .documents
                    .get(chunk_id)
                    .ok_or_else(|| StoreError::MissingMapEntry(chunk_id.clone()))?;
                Ok(SearchHit {
                    text: meta.text.clone(),
                    chunk_id: chunk_id.clone(),
                    distance,
                })
            })
            .collect()
    }
}

/// Squared Euclidean distance accumulated in f64.
pub fn squared_l2(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = f64::from(*a) - f64::from(*b);
            delta * delta
        })
        .sum()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| StoreError::io(parent, error))?;
    }
    let mut file = fs::File::create(path).map_err(|error| StoreError::io(path, error))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|error| StoreError::io(path, error))
}

/// A leftover map temp file means the last persist never reached its first rename,
/// so both temp files are discarded. A lone index temp file means the map was
/// already swapped in, so the index rename is completed.
fn recover_interrupted_persist(index_path: &Path, doc_map_path: &Path) -> Result<(), StoreError> {
    let map_tmp = tmp_path(doc_map_path);
    let index_tmp = tmp_path(index_path);

    if map_tmp.exists() {
        warn!(doc_map = %map_tmp.display(), "discarding incomplete persist");
        for leftover in [&map_tmp, &index_tmp] {
            if leftover.exists() {
                fs::remove_file(leftover).map_err(|error| StoreError::io(leftover, error))?;
            }
        }
    } else if index_tmp.exists() {
        warn!(index = %index_tmp.display(), "completing interrupted persist");
        fs::rename(&index_tmp, index_path).map_err(|error| StoreError::io(index_path, error))?;
    }
    Ok(())
}
