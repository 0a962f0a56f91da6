//! Vector index store with a parallel metadata store
//!
//! The whole in-memory state sits behind one `parking_lot::RwLock`. Every
//! mutation records an undo log, persists both files before the write lock
//! is released, and rolls the in-memory state back if persisting fails, so
//! readers never observe a change that is not on disk.

use chrono::Utc;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::index::FlatIndex;
use super::persistence::{self, IndexFile, MetadataFile, FORMAT_VERSION};
use crate::error::{Error, Result};
use crate::types::{ChunkMetadata, DocumentFormat, DocumentId, DocumentInfo, DocumentSummary};

/// One chunk ready to be committed
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Search result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// What `open` found and repaired
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub documents: usize,
    pub live_chunks: usize,
    /// Vectors whose chunk had no metadata record
    pub dropped_orphan_vectors: usize,
    /// Metadata records whose chunk had no vector
    pub dropped_orphan_metadata: usize,
}

impl LoadReport {
    pub fn repaired(&self) -> bool {
        self.dropped_orphan_vectors > 0 || self.dropped_orphan_metadata > 0
    }
}

/// Result of `compact`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub live_chunks: usize,
    pub reclaimed_slots: usize,
    pub revision: u64,
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub live_chunks: usize,
    pub physical_slots: usize,
    pub dimension: usize,
    pub revision: u64,
}

#[derive(Debug, Clone)]
struct DocumentEntry {
    info: DocumentInfo,
    /// Chunk ids in insertion order
    chunk_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
struct StoreState {
    index: FlatIndex,
    /// Reverse of the index slot table
    slot_of: HashMap<Uuid, usize>,
    chunks: HashMap<Uuid, ChunkMetadata>,
    documents: BTreeMap<DocumentId, DocumentEntry>,
    revision: u64,
}

/// Undo log for one transaction
struct Undo {
    physical_len: usize,
    revision: u64,
    added: Vec<Uuid>,
    vacated: Vec<(usize, ChunkMetadata)>,
    /// Prior registry entry of every document touched
    documents: Vec<(DocumentId, Option<DocumentEntry>)>,
}

impl Undo {
    fn begin(state: &StoreState) -> Self {
        Self {
            physical_len: state.index.physical_len(),
            revision: state.revision,
            added: Vec::new(),
            vacated: Vec::new(),
            documents: Vec::new(),
        }
    }

    fn touch_document(&mut self, state: &StoreState, document_id: &str) {
        if self.documents.iter().all(|(id, _)| id != document_id) {
            self.documents
                .push((document_id.to_string(), state.documents.get(document_id).cloned()));
        }
    }

    fn rollback(self, state: &mut StoreState) {
        for id in &self.added {
            state.slot_of.remove(id);
            state.chunks.remove(id);
        }
        state.index.truncate(self.physical_len);

        for (slot, metadata) in self.vacated {
            state.index.restore(slot, metadata.chunk_id);
            state.slot_of.insert(metadata.chunk_id, slot);
            state.chunks.insert(metadata.chunk_id, metadata);
        }

        for (document_id, prior) in self.documents {
            match prior {
                Some(entry) => state.documents.insert(document_id, entry),
                None => state.documents.remove(&document_id),
            };
        }

        state.revision = self.revision;
    }
}

impl StoreState {
    fn empty(dimension: usize) -> Self {
        Self {
            index: FlatIndex::new(dimension),
            slot_of: HashMap::new(),
            chunks: HashMap::new(),
            documents: BTreeMap::new(),
            revision: 0,
        }
    }

    fn append(
        &mut self,
        chunk_id: Uuid,
        embedding: &[f32],
        metadata: ChunkMetadata,
        undo: &mut Undo,
    ) -> Result<()> {
        if metadata.chunk_id != chunk_id {
            return Err(Error::config(format!(
                "metadata belongs to chunk {}, not {}",
                metadata.chunk_id, chunk_id
            )));
        }
        if self.slot_of.contains_key(&chunk_id) {
            return Err(Error::config(format!("chunk {} is already stored", chunk_id)));
        }

        let slot = self.index.push(chunk_id, embedding)?;
        undo.added.push(chunk_id);
        self.slot_of.insert(chunk_id, slot);

        undo.touch_document(self, &metadata.document_id);
        self.documents
            .entry(metadata.document_id.clone())
            .or_insert_with(|| DocumentEntry {
                info: untracked_document(&metadata.document_id),
                chunk_ids: Vec::new(),
            })
            .chunk_ids
            .push(chunk_id);
        self.chunks.insert(chunk_id, metadata);
        Ok(())
    }

    fn remove_document(&mut self, document_id: &str, undo: &mut Undo) -> usize {
        undo.touch_document(self, document_id);
        let Some(entry) = self.documents.remove(document_id) else {
            return 0;
        };

        for chunk_id in &entry.chunk_ids {
            let slot = self.slot_of.remove(chunk_id);
            let metadata = self.chunks.remove(chunk_id);
            if let (Some(slot), Some(metadata)) = (slot, metadata) {
                self.index.vacate(slot);
                undo.vacated.push((slot, metadata));
            }
        }
        entry.chunk_ids.len()
    }

    fn persist(&self, dir: &Path) -> Result<()> {
        let index = IndexFile {
            version: FORMAT_VERSION,
            dimension: self.index.dimension(),
            revision: self.revision,
            slots: Cow::Borrowed(self.index.slots()),
            vectors: Cow::Borrowed(self.index.vectors()),
        };
        let metadata = MetadataFile {
            version: FORMAT_VERSION,
            dimension: self.index.dimension(),
            revision: self.revision,
            documents: self
                .documents
                .values()
                .map(|entry| Cow::Borrowed(&entry.info))
                .collect(),
            chunks: self
                .index
                .live()
                .filter_map(|(_, id, _)| self.chunks.get(&id))
                .map(Cow::Borrowed)
                .collect(),
        };

        persistence::write_index(dir, &index)?;
        persistence::write_metadata(dir, &metadata)
    }

    fn compacted(&self) -> Self {
        let index = self.index.compacted();
        let slot_of = index
            .live()
            .map(|(slot, id, _)| (id, slot))
            .collect();

        Self {
            index,
            slot_of,
            chunks: self.chunks.clone(),
            documents: self.documents.clone(),
            revision: self.revision + 1,
        }
    }
}

/// Registry entry for a chunk added without a prior `replace_document`
fn untracked_document(document_id: &str) -> DocumentInfo {
    DocumentInfo {
        document_id: document_id.to_string(),
        filename: document_id.to_string(),
        format: DocumentFormat::from_path(Path::new(document_id)).unwrap_or(DocumentFormat::Txt),
        content_hash: String::new(),
        ingested_at: Utc::now(),
    }
}

fn report_inconsistency(message: String) {
    tracing::warn!("{}", Error::InconsistentStore(message));
}

/// Persisted vector index plus chunk metadata
pub struct IndexStore {
    dir: PathBuf,
    state: RwLock<StoreState>,
}

impl IndexStore {
    /// Open (or create) the store in `dir`.
    ///
    /// Both files are read together. Chunks present on only one side are
    /// dropped and reported; a dimension different from `dimension` is an
    /// error and nothing is written.
    pub fn open(dir: impl AsRef<Path>, dimension: usize) -> Result<(Self, LoadReport)> {
        let dir = dir.as_ref().to_path_buf();
        if dimension == 0 {
            return Err(Error::config("index dimension must be positive"));
        }
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::persistence(format!("create {}: {}", dir.display(), e)))?;

        let index_file = persistence::read_index(&dir)?;
        let metadata_file = persistence::read_metadata(&dir)?;

        for stored in [
            index_file.as_ref().map(|f| f.dimension),
            metadata_file.as_ref().map(|f| f.dimension),
        ]
        .into_iter()
        .flatten()
        {
            if stored != dimension {
                return Err(Error::DimensionMismatch {
                    expected: stored,
                    actual: dimension,
                });
            }
        }

        if let (Some(index), Some(metadata)) = (&index_file, &metadata_file) {
            if index.revision != metadata.revision {
                report_inconsistency(format!(
                    "{} is at revision {} but {} is at revision {}",
                    persistence::INDEX_FILE,
                    index.revision,
                    persistence::METADATA_FILE,
                    metadata.revision
                ));
            }
        }

        let (state, report) = Self::rebuild(dimension, index_file, metadata_file)?;
        let store = Self {
            dir,
            state: RwLock::new(state),
        };

        if report.repaired() {
            let mut state = store.state.write();
            state.revision += 1;
            if let Err(e) = state.persist(&store.dir) {
                tracing::warn!("Failed to persist repaired index: {}", e);
            }
        }

        tracing::info!(
            "Opened index at {}: {} documents, {} chunks",
            store.dir.display(),
            report.documents,
            report.live_chunks
        );
        Ok((store, report))
    }

    /// Alias of [`IndexStore::open`]
    pub fn load(dir: impl AsRef<Path>, dimension: usize) -> Result<(Self, LoadReport)> {
        Self::open(dir, dimension)
    }

    fn rebuild(
        dimension: usize,
        index_file: Option<IndexFile<'static>>,
        metadata_file: Option<MetadataFile<'static>>,
    ) -> Result<(StoreState, LoadReport)> {
        let mut state = StoreState::empty(dimension);
        let mut report = LoadReport::default();

        if let Some(file) = index_file {
            state.index =
                FlatIndex::from_parts(dimension, file.vectors.into_owned(), file.slots.into_owned())?;
            state.revision = file.revision;
        }

        let mut registry: HashMap<DocumentId, DocumentInfo> = HashMap::new();
        if let Some(file) = metadata_file {
            state.revision = state.revision.max(file.revision);
            for info in file.documents {
                let info = info.into_owned();
                registry.insert(info.document_id.clone(), info);
            }
            for chunk in file.chunks {
                let chunk = chunk.into_owned();
                state.chunks.insert(chunk.chunk_id, chunk);
            }
        }

        // Vectors without metadata, or a chunk id claiming more than one slot
        for slot in 0..state.index.physical_len() {
            let Some(id) = state.index.owner(slot) else {
                continue;
            };
            if state.chunks.contains_key(&id) && !state.slot_of.contains_key(&id) {
                state.slot_of.insert(id, slot);
            } else {
                state.index.vacate(slot);
                report.dropped_orphan_vectors += 1;
                report_inconsistency(format!("dropped vector slot {} for chunk {}", slot, id));
            }
        }

        // Metadata without a vector
        let orphans: Vec<Uuid> = state
            .chunks
            .keys()
            .filter(|id| !state.slot_of.contains_key(*id))
            .copied()
            .collect();
        for id in orphans {
            state.chunks.remove(&id);
            report.dropped_orphan_metadata += 1;
            report_inconsistency(format!("dropped metadata for chunk {} with no vector", id));
        }

        for (_, id, _) in state.index.live() {
            let Some(chunk) = state.chunks.get(&id) else {
                continue;
            };
            state
                .documents
                .entry(chunk.document_id.clone())
                .or_insert_with(|| DocumentEntry {
                    info: registry
                        .remove(&chunk.document_id)
                        .unwrap_or_else(|| untracked_document(&chunk.document_id)),
                    chunk_ids: Vec::new(),
                })
                .chunk_ids
                .push(id);
        }

        report.documents = state.documents.len();
        report.live_chunks = state.chunks.len();
        Ok((state, report))
    }

    /// Directory holding the store files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dimension(&self) -> usize {
        self.state.read().index.dimension()
    }

    /// Apply `mutate` as one transaction: persist on success, roll back on
    /// any failure. The caller holds the write lock.
    fn transact<T>(
        &self,
        state: &mut StoreState,
        mutate: impl FnOnce(&mut StoreState, &mut Undo) -> Result<T>,
    ) -> Result<T> {
        let mut undo = Undo::begin(state);
        let value = match mutate(state, &mut undo) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Rolling back index transaction: {}", e);
                undo.rollback(state);
                return Err(e);
            }
        };

        state.revision += 1;
        if let Err(e) = state.persist(&self.dir) {
            tracing::warn!("Rolling back index transaction: {}", e);
            undo.rollback(state);
            self.restore_files(state);
            return Err(e);
        }
        Ok(value)
    }

    /// Rewrite both files from `state` after a failed persist.
    ///
    /// The failed write may have replaced one file already, leaving a pair
    /// that load would repair by dropping chunks. Best effort.
    fn restore_files(&self, state: &StoreState) {
        match state.persist(&self.dir) {
            Ok(()) => tracing::info!("Restored index files at revision {}", state.revision),
            Err(e) => tracing::error!(
                "Failed to restore index files in {}: {}",
                self.dir.display(),
                e
            ),
        }
    }

    /// Add one chunk
    pub fn add(&self, chunk_id: Uuid, embedding: &[f32], metadata: ChunkMetadata) -> Result<()> {
        let mut state = self.state.write();
        self.transact(&mut state, |state, undo| {
            state.append(chunk_id, embedding, metadata, undo)
        })
    }

    /// Replace every chunk of `document` with `entries` in one transaction.
    ///
    /// Returns the number of chunks removed from the previous version. An
    /// empty `entries` deletes the document.
    pub fn replace_document(&self, document: DocumentInfo, entries: Vec<IndexEntry>) -> Result<usize> {
        if entries.is_empty() {
            return self.delete(&document.document_id);
        }
        if let Some(stray) = entries
            .iter()
            .find(|e| e.metadata.document_id != document.document_id)
        {
            return Err(Error::config(format!(
                "chunk {} belongs to '{}', not '{}'",
                stray.metadata.chunk_id, stray.metadata.document_id, document.document_id
            )));
        }

        let mut state = self.state.write();
        self.transact(&mut state, move |state, undo| {
            let removed = state.remove_document(&document.document_id, undo);
            state.documents.insert(
                document.document_id.clone(),
                DocumentEntry {
                    info: document,
                    chunk_ids: Vec::with_capacity(entries.len()),
                },
            );
            for entry in entries {
                state.append(entry.metadata.chunk_id, &entry.embedding, entry.metadata, undo)?;
            }
            Ok(removed)
        })
    }

    /// Remove every chunk of a document, returning how many were removed.
    /// Unknown documents return 0 without writing anything.
    pub fn delete(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write();
        if !state.documents.contains_key(document_id) {
            return Ok(0);
        }

        let removed = self.transact(&mut state, |state, undo| {
            Ok(state.remove_document(document_id, undo))
        })?;
        tracing::info!("Deleted {} chunks of {}", removed, document_id);
        Ok(removed)
    }

    /// Top-`k` chunks by cosine similarity, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::config("k must be at least 1"));
        }

        let state = self.state.read();
        if query.len() != state.index.dimension() {
            return Err(Error::DimensionMismatch {
                expected: state.index.dimension(),
                actual: query.len(),
            });
        }
        if state.chunks.is_empty() {
            return Err(Error::EmptyIndex);
        }

        let hits = state
            .index
            .rank(query, k)
            .into_iter()
            .filter_map(|(_, chunk_id, score)| {
                state.chunks.get(&chunk_id).map(|metadata| SearchHit {
                    chunk_id,
                    score,
                    metadata: metadata.clone(),
                })
            })
            .collect();
        Ok(hits)
    }

    /// Write the current state to disk
    pub fn persist(&self) -> Result<()> {
        let state = self.state.write();
        state.persist(&self.dir)
    }

    /// Rebuild the physical index from live entries only.
    ///
    /// Readers keep using the old state while the compacted copy is built and
    /// persisted; the swap happens under the write lock.
    pub fn compact(&self) -> Result<CompactionReport> {
        let state = self.state.upgradable_read();
        let reclaimed = state.index.physical_len() - state.chunks.len();
        if reclaimed == 0 {
            return Ok(CompactionReport {
                live_chunks: state.chunks.len(),
                reclaimed_slots: 0,
                revision: state.revision,
            });
        }

        let compacted = state.compacted();
        if let Err(e) = compacted.persist(&self.dir) {
            self.restore_files(&state);
            return Err(e);
        }

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        *state = compacted;
        tracing::info!("Compacted index, reclaimed {} slots", reclaimed);

        Ok(CompactionReport {
            live_chunks: state.chunks.len(),
            reclaimed_slots: reclaimed,
            revision: state.revision,
        })
    }

    /// Remove every document and reset the index
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        let mut cleared = StoreState::empty(state.index.dimension());
        cleared.revision = state.revision + 1;

        if let Err(e) = cleared.persist(&self.dir) {
            self.restore_files(&state);
            return Err(e);
        }
        *state = cleared;
        tracing::info!("Cleared index");
        Ok(())
    }

    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.read().chunks.len()
    }

    /// Stored documents ordered by id
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.state
            .read()
            .documents
            .values()
            .map(|entry| DocumentSummary {
                document_id: entry.info.document_id.clone(),
                filename: entry.info.filename.clone(),
                format: entry.info.format,
                chunk_count: entry.chunk_ids.len(),
                ingested_at: entry.info.ingested_at,
            })
            .collect()
    }

    /// Registry entry of one document
    pub fn document(&self, document_id: &str) -> Option<DocumentInfo> {
        self.state
            .read()
            .documents
            .get(document_id)
            .map(|entry| entry.info.clone())
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            documents: state.documents.len(),
            live_chunks: state.chunks.len(),
            physical_slots: state.index.physical_len(),
            dimension: state.index.dimension(),
            revision: state.revision,
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        use std::collections::HashSet;

        let state = self.state.read();
        let live: HashSet<Uuid> = state.index.live().map(|(_, id, _)| id).collect();
        let metadata: HashSet<Uuid> = state.chunks.keys().copied().collect();
        assert_eq!(live, metadata, "index and metadata disagree");

        let mut partitioned = HashSet::new();
        for (document_id, entry) in &state.documents {
            for id in &entry.chunk_ids {
                assert!(partitioned.insert(*id), "chunk {} listed twice", id);
                assert_eq!(&state.chunks[id].document_id, document_id);
            }
        }
        assert_eq!(partitioned, metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    const DIM: usize = 3;

    fn chunk(document_id: &str, ordinal: u32, text: &str) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            ordinal,
            text: text.to_string(),
            char_start: 0,
            char_end: text.chars().count(),
            page: None,
        }
    }

    fn entries(document_id: &str, vectors: &[[f32; DIM]]) -> Vec<IndexEntry> {
        vectors
            .iter()
            .enumerate()
            .map(|(i, v)| IndexEntry {
                embedding: v.to_vec(),
                metadata: chunk(document_id, i as u32, &format!("{} chunk {}", document_id, i)),
            })
            .collect()
    }

    fn doc(document_id: &str) -> DocumentInfo {
        DocumentInfo::new(document_id, DocumentFormat::Txt, document_id)
    }

    fn open(dir: &Path) -> IndexStore {
        IndexStore::open(dir, DIM).unwrap().0
    }

    #[test]
    fn test_open_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (store, report) = IndexStore::open(dir.path().join("index"), DIM).unwrap();

        assert_eq!(report, LoadReport::default());
        assert_eq!(store.chunk_count(), 0);
        assert!(matches!(store.search(&[1.0, 0.0, 0.0], 1), Err(Error::EmptyIndex)));
    }

    #[test]
    fn test_ingest_then_delete_restores_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.replace_document(doc("base.txt"), entries("base.txt", &[[1.0, 0.0, 0.0]])).unwrap();

        let (docs, chunks) = (store.document_count(), store.chunk_count());
        store
            .replace_document(doc("a.txt"), entries("a.txt", &[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]))
            .unwrap();
        assert_eq!(store.chunk_count(), chunks + 2);

        assert_eq!(store.delete("a.txt").unwrap(), 2);
        assert_eq!((store.document_count(), store.chunk_count()), (docs, chunks));
        store.assert_consistent();
    }

    #[test]
    fn test_delete_unknown_is_noop_without_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();
        let revision = store.stats().revision;

        assert_eq!(store.delete("a.txt").unwrap(), 1);
        assert_eq!(store.delete("a.txt").unwrap(), 0);
        assert_eq!(store.delete("never.txt").unwrap(), 0);
        assert_eq!(store.stats().revision, revision + 1);
    }

    #[test]
    fn test_persist_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let query = [0.9, 0.1, 0.0];
        let before = {
            let store = open(dir.path());
            store
                .replace_document(
                    doc("a.txt"),
                    entries("a.txt", &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.5, 0.5, 0.0]]),
                )
                .unwrap();
            store.replace_document(doc("b.md"), entries("b.md", &[[0.0, 0.0, 1.0]])).unwrap();
            store.delete("b.md").unwrap();
            store.search(&query, 3).unwrap()
        };

        let (store, report) = IndexStore::open(dir.path(), DIM).unwrap();
        assert!(!report.repaired());
        assert_eq!(report.live_chunks, 3);
        let after = store.search(&query, 3).unwrap();

        let ids = |hits: &[SearchHit]| hits.iter().map(|h| (h.chunk_id, h.score)).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
        assert_eq!(store.list_documents()[0].document_id, "a.txt");
        store.assert_consistent();
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let vectors = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.8, 0.6, 0.0]];
        store.replace_document(doc("a.txt"), entries("a.txt", &vectors)).unwrap();

        let hits = store.search(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.ordinal, 0);
        assert_eq!(hits[1].metadata.ordinal, 2);
        assert!(hits[0].score >= hits[1].score);

        // k larger than the store is clamped
        assert_eq!(store.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn test_search_rejects_bad_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();

        assert!(matches!(store.search(&[1.0, 0.0, 0.0], 0), Err(Error::Configuration(_))));
        assert!(matches!(
            store.search(&[1.0, 0.0], 1),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_replace_document_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let old = entries("a.txt", &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let old_ids: HashSet<Uuid> = old.iter().map(|e| e.metadata.chunk_id).collect();
        store.replace_document(doc("a.txt"), old).unwrap();

        let removed = store
            .replace_document(doc("a.txt"), entries("a.txt", &[[0.5, 0.5, 0.0]]))
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.chunk_count(), 1);

        let hits = store.search(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(!old_ids.contains(&hits[0].chunk_id));
        store.assert_consistent();
    }

    #[test]
    fn test_failed_replace_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();

        let mut bad = entries("a.txt", &[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        bad[1].embedding.pop();
        let err = store.replace_document(doc("a.txt"), bad).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));

        assert_eq!(store.chunk_count(), 1);
        assert_eq!(store.stats().physical_slots, 1);
        let hits = store.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].metadata.text, "a.txt chunk 0");
        store.assert_consistent();
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let index_dir = dir.path().join("index");
        let store = open(&index_dir);
        store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();
        let before = store.stats();

        std::fs::remove_dir_all(&index_dir).unwrap();

        let err = store
            .replace_document(doc("a.txt"), entries("a.txt", &[[0.0, 1.0, 0.0]]))
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(store.delete("a.txt").is_err());

        assert_eq!(store.stats(), before);
        assert_eq!(store.search(&[1.0, 0.0, 0.0], 1).unwrap()[0].metadata.text, "a.txt chunk 0");
        store.assert_consistent();
    }

    /// Make the next `metadata.json` write fail by putting a directory in its place
    fn block_metadata_write(dir: &Path) -> Vec<u8> {
        let path = dir.join(persistence::METADATA_FILE);
        let saved = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        saved
    }

    fn unblock_metadata_write(dir: &Path, saved: &[u8]) {
        let path = dir.join(persistence::METADATA_FILE);
        std::fs::remove_dir(&path).unwrap();
        std::fs::write(&path, saved).unwrap();
    }

    #[test]
    fn test_failed_metadata_write_keeps_prior_version_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path());
            store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();

            let saved = block_metadata_write(dir.path());
            let err = store
                .replace_document(doc("a.txt"), entries("a.txt", &[[0.0, 1.0, 0.0]]))
                .unwrap_err();
            assert!(matches!(err, Error::Persistence(_)));
            assert_eq!(store.chunk_count(), 1);
            unblock_metadata_write(dir.path(), &saved);
        }

        let (store, report) = IndexStore::open(dir.path(), DIM).unwrap();
        assert!(!report.repaired());
        assert_eq!(store.chunk_count(), 1);
        let hits = store.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].metadata.text, "a.txt chunk 0");
        store.assert_consistent();
    }

    #[test]
    fn test_failed_clear_keeps_documents_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path());
            store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();

            let saved = block_metadata_write(dir.path());
            assert!(matches!(store.clear(), Err(Error::Persistence(_))));
            assert_eq!(store.document_count(), 1);
            unblock_metadata_write(dir.path(), &saved);
        }

        let (store, report) = IndexStore::open(dir.path(), DIM).unwrap();
        assert!(!report.repaired());
        assert_eq!(store.document_count(), 1);
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn test_replace_with_no_chunks_deletes_document() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path());
            store
                .replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]))
                .unwrap();

            assert_eq!(store.replace_document(doc("a.txt"), Vec::new()).unwrap(), 2);
            assert_eq!(store.document_count(), 0);
            assert_eq!(store.replace_document(doc("never.txt"), Vec::new()).unwrap(), 0);
            assert_eq!(store.document_count(), 0);
            assert_eq!(store.delete("a.txt").unwrap(), 0);
        }

        let (store, _) = IndexStore::open(dir.path(), DIM).unwrap();
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.chunk_count(), 0);
    }

    #[test]
    fn test_add_validates_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let meta = chunk("notes.md", 0, "hello");
        let id = meta.chunk_id;

        assert!(store.add(Uuid::new_v4(), &[1.0, 0.0, 0.0], meta.clone()).is_err());
        store.add(id, &[1.0, 0.0, 0.0], meta.clone()).unwrap();
        assert!(store.add(id, &[1.0, 0.0, 0.0], meta).is_err());

        assert_eq!(store.chunk_count(), 1);
        assert_eq!(store.list_documents()[0].format, DocumentFormat::Markdown);
        store.assert_consistent();
    }

    #[test]
    fn test_dimension_mismatch_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path());
            store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();
        }
        let metadata_before = std::fs::read(dir.path().join(persistence::METADATA_FILE)).unwrap();

        let err = IndexStore::open(dir.path(), 4).err().unwrap();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 4 }));
        assert_eq!(
            std::fs::read(dir.path().join(persistence::METADATA_FILE)).unwrap(),
            metadata_before
        );
    }

    #[test]
    fn test_load_repairs_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let kept = entries("a.txt", &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let kept_ids: Vec<Uuid> = kept.iter().map(|e| e.metadata.chunk_id).collect();
        {
            let store = open(dir.path());
            store.replace_document(doc("a.txt"), kept).unwrap();
        }

        // One vector with no metadata, one metadata record with no vector
        let mut index = persistence::read_index(dir.path()).unwrap().unwrap();
        let mut slots = index.slots.into_owned();
        let mut vectors = index.vectors.into_owned();
        slots.push(Some(Uuid::new_v4()));
        vectors.extend_from_slice(&[0.0, 0.0, 1.0]);
        index.slots = Cow::Owned(slots);
        index.vectors = Cow::Owned(vectors);
        persistence::write_index(dir.path(), &index).unwrap();

        let mut metadata = persistence::read_metadata(dir.path()).unwrap().unwrap();
        metadata.chunks.push(Cow::Owned(chunk("a.txt", 9, "ghost")));
        persistence::write_metadata(dir.path(), &metadata).unwrap();

        let (store, report) = IndexStore::open(dir.path(), DIM).unwrap();
        assert_eq!(report.dropped_orphan_vectors, 1);
        assert_eq!(report.dropped_orphan_metadata, 1);
        assert_eq!(report.live_chunks, 2);

        let hits = store.search(&[0.0, 0.0, 1.0], 10).unwrap();
        let mut found: Vec<Uuid> = hits.iter().map(|h| h.chunk_id).collect();
        found.sort();
        let mut expected = kept_ids.clone();
        expected.sort();
        assert_eq!(found, expected);
        store.assert_consistent();

        // The repair was persisted
        let (_, report) = IndexStore::open(dir.path(), DIM).unwrap();
        assert!(!report.repaired());
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store
            .replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]))
            .unwrap();
        store.replace_document(doc("b.txt"), entries("b.txt", &[[0.0, 0.0, 1.0]])).unwrap();
        store.delete("a.txt").unwrap();
        let before = store.search(&[0.0, 0.0, 1.0], 1).unwrap();

        let first = store.compact().unwrap();
        assert_eq!(first.reclaimed_slots, 2);
        assert_eq!(store.stats().physical_slots, 1);

        let second = store.compact().unwrap();
        assert_eq!(second.reclaimed_slots, 0);
        assert_eq!(second.revision, first.revision);

        let after = store.search(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(before[0].chunk_id, after[0].chunk_id);
        store.assert_consistent();

        let (reopened, _) = IndexStore::open(dir.path(), DIM).unwrap();
        assert_eq!(reopened.stats().physical_slots, 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.replace_document(doc("a.txt"), entries("a.txt", &[[1.0, 0.0, 0.0]])).unwrap();

        store.clear().unwrap();
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.stats().physical_slots, 0);

        let (reopened, report) = IndexStore::open(dir.path(), DIM).unwrap();
        assert_eq!(report.live_chunks, 0);
        assert_eq!(reopened.chunk_count(), 0);
    }

    #[test]
    fn test_concurrent_search_and_add() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.replace_document(doc("seed.txt"), entries("seed.txt", &[[1.0, 0.0, 0.0]])).unwrap();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..20 {
                    let name = format!("doc-{}.txt", i);
                    store
                        .replace_document(doc(&name), entries(&name, &[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]))
                        .unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });

            scope.spawn(|| {
                let mut last_seen = 0;
                while !done.load(Ordering::SeqCst) {
                    let hits = store.search(&[0.0, 1.0, 0.0], 10).unwrap();
                    let count = store.chunk_count();
                    assert!(count >= last_seen);
                    assert!(hits.len() <= count.min(10));
                    for hit in &hits {
                        assert_eq!(hit.metadata.chunk_id, hit.chunk_id);
                    }
                    last_seen = count;
                }
            });
        });

        assert_eq!(store.chunk_count(), 41);
        store.assert_consistent();
    }

    #[test]
    fn test_concurrent_search_and_compact() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let mut keep = HashSet::new();
        for name in ["a.txt", "b.txt", "c.txt"] {
            let chunks = entries(name, &[[1.0, 0.0, 0.0]]);
            keep.insert(chunks[0].metadata.chunk_id);
            store.replace_document(doc(name), chunks).unwrap();
        }
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..15 {
                    store
                        .replace_document(doc("junk.txt"), entries("junk.txt", &[[0.0, 1.0, 0.0]]))
                        .unwrap();
                    store.delete("junk.txt").unwrap();
                    store.compact().unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });

            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let hits = store.search(&[1.0, 0.0, 0.0], 3).unwrap();
                    let found: HashSet<Uuid> = hits.iter().map(|h| h.chunk_id).collect();
                    assert_eq!(found, keep);
                    for hit in &hits {
                        assert!((hit.score - 1.0).abs() < 1e-5);
                        assert_eq!(hit.metadata.chunk_id, hit.chunk_id);
                    }
                }
            });
        });

        assert_eq!(store.stats().physical_slots, 3);
        store.assert_consistent();
    }
}
