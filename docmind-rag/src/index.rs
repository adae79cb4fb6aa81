//! Persistent, collection-scoped vector index.
//!
//! [`VectorIndex`] keeps one [`FlatIndex`] plus a parallel list of
//! [`IndexedDocument`]s per named collection. Collections are loaded lazily
//! from two artifacts under the store directory and written back inside the
//! critical section of every mutation:
//!
//! - `<collection>.index`: bincode snapshot of the similarity structure
//! - `<collection>.docs.json`: the document list, embeddings included
//!
//! Each collection sits behind its own `tokio::sync::RwLock`, so independent
//! collections never contend and readers never observe a half-applied
//! mutation. A save stages both artifacts before renaming either into place,
//! and filesystem work runs on the blocking pool.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{IndexedDocument, Metadata, RetrievalResult};
use crate::error::{RagError, Result};
use crate::flat::{FlatIndex, normalize, normalize_batch};

const INDEX_EXTENSION: &str = "index";
const DOCUMENTS_EXTENSION: &str = "docs.json";

/// Read-only summary of a collection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectionInfo {
    /// The collection name.
    pub name: String,
    /// Number of stored documents.
    pub document_count: usize,
    /// Established embedding width, if any document has been stored.
    pub dimension: Option<usize>,
    /// Directory holding the collection's artifacts.
    pub persist_directory: PathBuf,
    /// Kind of similarity structure, if one exists.
    pub index_type: Option<&'static str>,
}

/// In-memory state of one collection.
///
/// Invariant: `index` is `None` exactly when `documents` is empty, and
/// otherwise holds one row per document in the same order.
#[derive(Debug, Default)]
struct CollectionState {
    index: Option<FlatIndex>,
    documents: Vec<IndexedDocument>,
}

impl CollectionState {
    fn dimension(&self) -> Option<usize> {
        self.index.as_ref().map(FlatIndex::dimension)
    }
}

type Slot = Arc<RwLock<CollectionState>>;

/// Artifact locations of one collection.
struct ArtifactPaths {
    index: PathBuf,
    documents: PathBuf,
}

/// A persistent vector index holding any number of named collections.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::VectorIndex;
///
/// let index = VectorIndex::open("database/vector_store")?;
/// let ids = index.add_documents("docs", &texts, &embeddings, None).await?;
/// let hits = index.search("docs", &query_embedding, 5).await?;
/// ```
#[derive(Debug)]
pub struct VectorIndex {
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<OnceCell<Slot>>>>,
}

impl VectorIndex {
    /// Open (creating if needed) an index rooted at `root`.
    ///
    /// No collection is read until it is first accessed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| RagError::storage(&root, e))?;
        info!(path = %root.display(), "vector index ready");
        Ok(Self { root, collections: RwLock::new(HashMap::new()) })
    }

    /// The directory holding every collection's artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Insert documents with their embeddings, returning one fresh id per
    /// document in insertion order.
    ///
    /// The first insert into an empty collection establishes its width.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if the slice lengths disagree
    /// - [`RagError::DimensionMismatch`] if any embedding has the wrong width
    /// - [`RagError::InvalidVector`] if any embedding cannot be normalized
    /// - [`RagError::Storage`] if persisting fails; memory is rolled back
    pub async fn add_documents(
        &self,
        collection: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Option<&[Metadata]>,
    ) -> Result<Vec<String>> {
        if texts.len() != embeddings.len() {
            return Err(RagError::InvalidInput(format!(
                "documents and embeddings length mismatch: {} vs {}",
                texts.len(),
                embeddings.len()
            )));
        }
        if let Some(metadatas) = metadatas {
            if metadatas.len() != texts.len() {
                return Err(RagError::InvalidInput(format!(
                    "metadatas length must match documents: {} vs {}",
                    metadatas.len(),
                    texts.len()
                )));
            }
        }
        if texts.is_empty() {
            warn!(collection, "no documents provided for insertion");
            return Ok(Vec::new());
        }

        let slot = self.collection(collection).await?;
        let mut state = slot.write().await;

        let dimension = state.dimension().unwrap_or(embeddings[0].len());
        let rows = normalize_batch(embeddings, dimension)?;
        debug!(collection, count = texts.len(), dimension, "adding documents");

        let ids: Vec<String> = texts.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let previous_len = state.documents.len();
        let created = state.index.is_none();

        state.index.get_or_insert_with(|| FlatIndex::new(dimension)).add(&rows)?;
        for (i, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
            state.documents.push(IndexedDocument {
                id: ids[i].clone(),
                text: text.clone(),
                metadata: metadatas.map(|m| m[i].clone()).unwrap_or_default(),
                embedding: Some(embedding.clone()),
                collection: collection.to_string(),
            });
        }

        if let Err(e) = self.persist(collection, &state).await {
            // Roll back to the last durable state.
            state.documents.truncate(previous_len);
            if created {
                state.index = None;
            } else if let Some(index) = state.index.as_mut() {
                index.truncate(previous_len);
            }
            self.restore(collection, &state).await;
            return Err(e);
        }

        info!(collection, count = ids.len(), "inserted documents");
        Ok(ids)
    }

    /// Return the `top_k` documents most similar to `query_embedding`.
    ///
    /// The query is normalized like stored vectors. `top_k` is clamped to the
    /// collection size; an empty collection yields an empty result.
    pub async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if query_embedding.is_empty() {
            return Err(RagError::InvalidInput("query embedding is empty".to_string()));
        }

        let slot = self.collection(collection).await?;
        let state = slot.read().await;

        let Some(index) = state.index.as_ref().filter(|index| !index.is_empty()) else {
            debug!(collection, "no documents in collection to search");
            return Ok(Vec::new());
        };
        if query_embedding.len() != index.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: index.dimension(),
                actual: query_embedding.len(),
            });
        }

        let query = normalize(query_embedding)?;
        let k = top_k.min(index.len());
        let hits = index.search(&query, k)?;

        let results: Vec<RetrievalResult> = hits
            .into_iter()
            .filter_map(|(row, score)| {
                state.documents.get(row).map(|doc| RetrievalResult {
                    document_id: doc.id.clone(),
                    text: doc.text.clone(),
                    metadata: doc.metadata.clone(),
                    score,
                })
            })
            .collect();

        debug!(collection, top_k, result_count = results.len(), "search completed");
        Ok(results)
    }

    /// Like [`search`](Self::search) but returns only `(text, score)` pairs.
    pub async fn search_with_scores(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let results = self.search(collection, query_embedding, top_k).await?;
        Ok(results.into_iter().map(|r| (r.text, r.score)).collect())
    }

    /// Remove documents by id and rebuild the similarity structure from the
    /// survivors' retained embeddings. Unknown ids are ignored.
    ///
    /// Returns the number of documents removed. Removing the last document
    /// clears both artifacts, so the next insert may establish a new width.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CorruptIndexState`] if a surviving document has no
    /// retained embedding.
    pub async fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let slot = self.collection(collection).await?;
        let mut state = slot.write().await;

        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let survivors: Vec<IndexedDocument> = state
            .documents
            .iter()
            .filter(|doc| !doomed.contains(doc.id.as_str()))
            .cloned()
            .collect();
        let removed = state.documents.len() - survivors.len();
        if removed == 0 {
            info!(collection, "no matching documents to delete");
            return Ok(0);
        }

        let rebuilt = if survivors.is_empty() {
            CollectionState::default()
        } else {
            let dimension = state.dimension().ok_or_else(|| {
                RagError::corrupt(collection, "documents exist without a similarity structure")
            })?;
            let embeddings = survivors
                .iter()
                .map(|doc| {
                    doc.embedding.clone().ok_or_else(|| {
                        RagError::corrupt(
                            collection,
                            format!("document '{}' has no retained embedding", doc.id),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let rows = normalize_batch(&embeddings, dimension)?;
            CollectionState { index: Some(FlatIndex::from_rows(dimension, &rows)?), documents: survivors }
        };

        if let Err(e) = self.persist(collection, &rebuilt).await {
            self.restore(collection, &state).await;
            return Err(e);
        }
        *state = rebuilt;

        if state.documents.is_empty() {
            info!(collection, removed, "cleared all documents");
        } else {
            info!(collection, removed, remaining = state.documents.len(), "deleted documents");
        }
        Ok(removed)
    }

    /// Remove both artifacts of a collection and reset it to empty.
    ///
    /// The artifacts are never read, so a collection that fails to load can
    /// still be dropped.
    pub async fn delete_collection(&self, collection: &str) -> Result<()> {
        let cell = self.cell(collection).await?;
        let slot = cell
            .get_or_try_init(|| async {
                self.clear(collection).await?;
                Ok::<_, RagError>(Arc::new(RwLock::new(CollectionState::default())))
            })
            .await?;

        let mut state = slot.write().await;
        self.clear(collection).await?;
        *state = CollectionState::default();

        info!(collection, "deleted collection");
        Ok(())
    }

    /// Number of documents stored in a collection.
    pub async fn document_count(&self, collection: &str) -> Result<usize> {
        let slot = self.collection(collection).await?;
        let count = slot.read().await.documents.len();
        Ok(count)
    }

    /// Summarize a collection.
    pub async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let slot = self.collection(collection).await?;
        let state = slot.read().await;
        Ok(CollectionInfo {
            name: collection.to_string(),
            document_count: state.documents.len(),
            dimension: state.dimension(),
            persist_directory: self.root.clone(),
            index_type: state.index.as_ref().map(|_| FlatIndex::KIND),
        })
    }

    /// Fetch the lock guarding a collection, loading it on first access.
    ///
    /// A collection whose artifacts fail to load is not cached, so every
    /// access keeps failing until the artifacts are repaired.
    /// Concurrent first accesses to one name share a single load, and a load
    /// never blocks access to other collections.
    async fn collection(&self, name: &str) -> Result<Slot> {
        let cell = self.cell(name).await?;
        let slot = cell
            .get_or_try_init(|| async {
                let owned = name.to_string();
                let paths = self.artifact_paths(name);
                let state =
                    on_blocking_pool(&self.root, move || load_collection(&owned, &paths)).await?;
                Ok::<_, RagError>(Arc::new(RwLock::new(state)))
            })
            .await?;
        Ok(Arc::clone(slot))
    }

    /// The once-initialized slot for `name`, registered on first sight.
    async fn cell(&self, name: &str) -> Result<Arc<OnceCell<Slot>>> {
        validate_collection_name(name)?;

        if let Some(cell) = self.collections.read().await.get(name) {
            return Ok(Arc::clone(cell));
        }
        let mut collections = self.collections.write().await;
        Ok(Arc::clone(collections.entry(name.to_string()).or_default()))
    }

    fn artifact_paths(&self, collection: &str) -> ArtifactPaths {
        ArtifactPaths {
            index: self.root.join(format!("{collection}.{INDEX_EXTENSION}")),
            documents: self.root.join(format!("{collection}.{DOCUMENTS_EXTENSION}")),
        }
    }

    async fn persist(&self, collection: &str, state: &CollectionState) -> Result<()> {
        let Some(index) = state.index.as_ref() else {
            return self.clear(collection).await;
        };

        let index_bytes =
            bincode::serialize(index).map_err(|e| RagError::Serialization(e.to_string()))?;
        let document_bytes = serde_json::to_vec(&state.documents)
            .map_err(|e| RagError::Serialization(e.to_string()))?;

        let paths = self.artifact_paths(collection);
        on_blocking_pool(&self.root, move || {
            write_artifacts(&paths, &index_bytes, &document_bytes)
        })
        .await?;
        debug!(collection, documents = state.documents.len(), "saved collection");
        Ok(())
    }

    /// Rewrite the artifacts from `state` after a failed save, so that a save
    /// which renamed only one artifact cannot survive a restart.
    async fn restore(&self, collection: &str, state: &CollectionState) {
        if let Err(e) = self.persist(collection, state).await {
            warn!(collection, error = %e, "failed to restore artifacts after a failed save");
        }
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        let paths = self.artifact_paths(collection);
        on_blocking_pool(&self.root, move || clear_artifacts(&paths)).await
    }
}

/// Run filesystem work off the async worker threads.
async fn on_blocking_pool<T, F>(root: &Path, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::storage(root, std::io::Error::other(e)))?
}

/// Collection names become file names, so only `[A-Za-z0-9_-]` is allowed.
fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RagError::InvalidInput("collection name is empty".to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(RagError::InvalidInput(format!(
            "collection name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

fn load_collection(name: &str, paths: &ArtifactPaths) -> Result<CollectionState> {
    let index_bytes = read_optional(&paths.index)?;
    let document_bytes = read_optional(&paths.documents)?;

    let (index_bytes, document_bytes) = match (index_bytes, document_bytes) {
        (None, None) => {
            info!(collection = name, "no existing artifacts, starting fresh");
            return Ok(CollectionState::default());
        }
        (Some(index), Some(documents)) => (index, documents),
        (Some(_), None) => return Err(RagError::corrupt(name, "document list artifact is missing")),
        (None, Some(_)) => return Err(RagError::corrupt(name, "structure artifact is missing")),
    };

    let index: FlatIndex = bincode::deserialize(&index_bytes)
        .map_err(|e| RagError::corrupt(name, format!("unreadable structure artifact: {e}")))?;
    let documents: Vec<IndexedDocument> = serde_json::from_slice(&document_bytes)
        .map_err(|e| RagError::corrupt(name, format!("unreadable document list: {e}")))?;

    if !index.is_well_formed() {
        return Err(RagError::corrupt(name, "structure data is not a whole number of rows"));
    }
    if index.len() != documents.len() {
        return Err(RagError::corrupt(
            name,
            format!(
                "structure holds {} vectors but document list holds {} documents",
                index.len(),
                documents.len()
            ),
        ));
    }

    info!(collection = name, documents = documents.len(), "loaded existing collection");
    Ok(CollectionState { index: Some(index), documents })
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RagError::storage(path, e)),
    }
}

/// Stage both artifacts in sibling temporary files, then rename each over
/// its target. Nothing is renamed unless both files were staged.
fn write_artifacts(paths: &ArtifactPaths, index: &[u8], documents: &[u8]) -> Result<()> {
    let staged_index = staging_path(&paths.index);
    let staged_documents = staging_path(&paths.documents);

    let staged = fs::write(&staged_index, index)
        .map_err(|e| RagError::storage(&staged_index, e))
        .and_then(|()| {
            fs::write(&staged_documents, documents)
                .map_err(|e| RagError::storage(&staged_documents, e))
        });
    if let Err(e) = staged {
        for path in [&staged_index, &staged_documents] {
            // Best effort; a leftover temporary file is overwritten next time.
            let _ = fs::remove_file(path);
        }
        return Err(e);
    }

    fs::rename(&staged_index, &paths.index).map_err(|e| RagError::storage(&paths.index, e))?;
    fs::rename(&staged_documents, &paths.documents)
        .map_err(|e| RagError::storage(&paths.documents, e))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}

fn clear_artifacts(paths: &ArtifactPaths) -> Result<()> {
    for path in [&paths.index, &paths.documents] {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(RagError::storage(path, e)),
        }
    }
    Ok(())
}
