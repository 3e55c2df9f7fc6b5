//! In-memory vector index with SQLite snapshots.
//!
//! Search is an exhaustive scan over every stored embedding. Snapshots are
//! SQLite files with a `meta` table (format version, dimension, metric) and
//! a `chunks` table holding each embedding as little-endian `f32` bytes.

use crate::types::{Chunk, IndexStats};
use crate::vector_index::{similarity, VectorIndex};
use mitra_core::{AppError, AppResult, SimilarityMetric};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const FORMAT_VERSION: &str = "1";

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Brute-force in-memory vector index.
///
/// Entries keep insertion order; re-adding a chunk id replaces the entry in
/// place.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    dimension: usize,
    metric: SimilarityMetric,
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
}

impl MemoryIndex {
    pub fn new(dimension: usize, metric: SimilarityMetric) -> Self {
        Self {
            dimension,
            metric,
            entries: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Load a snapshot written by [`VectorIndex::save`].
    ///
    /// Snapshots are only read when `allow_dangerous_deserialization` is set:
    /// a snapshot file is trusted input. The snapshot metric must match
    /// `metric`.
    pub fn restore(
        path: &Path,
        metric: SimilarityMetric,
        allow_dangerous_deserialization: bool,
    ) -> AppResult<Self> {
        if !allow_dangerous_deserialization {
            return Err(AppError::InvalidConfiguration(format!(
                "Refusing to load index snapshot {}: set vector_store.allow_dangerous_deserialization \
                 (or pass --allow-dangerous-deserialization) for snapshots you created",
                path.display()
            )));
        }

        if !path.exists() {
            return Err(AppError::IndexUnavailable(format!(
                "No index snapshot at {}. Run `mitra ingest` first.",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| corrupt(path, e))?;

        let version = read_meta(&conn, "format_version").map_err(|e| corrupt(path, e))?;
        if version.as_deref() != Some(FORMAT_VERSION) {
            return Err(AppError::IndexUnavailable(format!(
                "Unsupported index snapshot format {:?} at {}",
                version,
                path.display()
            )));
        }

        let dimension: usize = read_meta(&conn, "dimension")
            .map_err(|e| corrupt(path, e))?
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| {
                AppError::IndexUnavailable(format!("Snapshot {} has no dimension", path.display()))
            })?;

        let stored_metric: SimilarityMetric = read_meta(&conn, "metric")
            .map_err(|e| corrupt(path, e))?
            .and_then(|m| m.parse().ok())
            .ok_or_else(|| {
                AppError::IndexUnavailable(format!("Snapshot {} has no metric", path.display()))
            })?;

        if stored_metric != metric {
            return Err(AppError::InvalidConfiguration(format!(
                "Index snapshot uses {} similarity but configuration requests {}",
                stored_metric, metric
            )));
        }

        let mut index = Self::new(dimension, metric);

        let mut stmt = conn
            .prepare(
                "SELECT id, document_id, source, page, position, char_offset, text, embedding
                 FROM chunks ORDER BY rowid",
            )
            .map_err(|e| corrupt(path, e))?;

        let rows = stmt
            .query_map([], |row| {
                let page: Option<i64> = row.get(3)?;
                let chunk = Chunk {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    source: row.get(2)?,
                    page: page.map(|p| p as u32),
                    position: row.get::<_, i64>(4)? as u32,
                    offset: row.get::<_, i64>(5)? as usize,
                    text: row.get(6)?,
                };
                let bytes: Vec<u8> = row.get(7)?;
                Ok((chunk, bytes))
            })
            .map_err(|e| corrupt(path, e))?;

        for row in rows {
            let (chunk, bytes) = row.map_err(|e| corrupt(path, e))?;
            let embedding = bytes_to_embedding(&bytes)?;
            index.add(chunk, embedding).map_err(|e| {
                AppError::IndexUnavailable(format!("Corrupt index snapshot {}: {}", path.display(), e))
            })?;
        }

        tracing::info!(
            "Restored index from {:?} ({} chunks, dimension {}, {})",
            path,
            index.len(),
            dimension,
            metric
        );

        Ok(index)
    }
}

impl VectorIndex for MemoryIndex {
    fn add(&mut self, chunk: Chunk, embedding: Vec<f32>) -> AppResult<bool> {
        if embedding.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        if let Some(&slot) = self.by_id.get(&chunk.id) {
            self.entries[slot] = Entry { chunk, embedding };
            return Ok(false);
        }

        self.by_id.insert(chunk.id.clone(), self.entries.len());
        self.entries.push(Entry { chunk, embedding });
        Ok(true)
    }

    fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        if query.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, similarity(self.metric, query, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        tracing::debug!(
            "Retrieved {} chunks (requested top-{}) from {} indexed",
            scored.len(),
            k,
            self.entries.len()
        );

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.entries[i].chunk.clone(), score))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> IndexStats {
        let documents: HashSet<&str> = self
            .entries
            .iter()
            .map(|e| e.chunk.document_id.as_str())
            .collect();

        IndexStats {
            documents: documents.len(),
            chunks: self.entries.len(),
            dimension: self.dimension,
            metric: self.metric,
        }
    }

    fn contains(&self, chunk_id: &str) -> bool {
        self.by_id.contains_key(chunk_id)
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.chunk.document_id != document_id);
        let removed = before - self.entries.len();

        if removed > 0 {
            self.by_id = self
                .entries
                .iter()
                .enumerate()
                .map(|(i, e)| (e.chunk.id.clone(), i))
                .collect();
        }

        removed
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
        tracing::info!("Cleared vector index");
    }

    /// Write a snapshot next to `path` and rename it into place, so a crash
    /// never leaves a half-written snapshot behind.
    fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("sqlite.tmp");
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path)?;
        }

        let mut conn = Connection::open(&tmp_path).map_err(|e| write_failed(path, e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                source TEXT NOT NULL,
                page INTEGER,
                position INTEGER NOT NULL,
                char_offset INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )
        .map_err(|e| write_failed(path, e))?;

        let tx = conn.transaction().map_err(|e| write_failed(path, e))?;
        {
            let mut meta = tx
                .prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")
                .map_err(|e| write_failed(path, e))?;
            let dimension = self.dimension.to_string();
            for (key, value) in [
                ("format_version", FORMAT_VERSION),
                ("dimension", dimension.as_str()),
                ("metric", self.metric.as_str()),
            ] {
                meta.execute(params![key, value])
                    .map_err(|e| write_failed(path, e))?;
            }

            let mut insert = tx
                .prepare(
                    "INSERT INTO chunks (id, document_id, source, page, position, char_offset, text, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(|e| write_failed(path, e))?;

            for entry in &self.entries {
                let chunk = &entry.chunk;
                insert
                    .execute(params![
                        chunk.id,
                        chunk.document_id,
                        chunk.source,
                        chunk.page.map(i64::from),
                        chunk.position as i64,
                        chunk.offset as i64,
                        chunk.text,
                        embedding_to_bytes(&entry.embedding),
                    ])
                    .map_err(|e| write_failed(path, e))?;
            }
        }
        tx.commit().map_err(|e| write_failed(path, e))?;
        drop(conn);

        std::fs::rename(&tmp_path, path)?;

        tracing::info!("Saved index snapshot to {:?} ({} chunks)", path, self.len());
        Ok(())
    }
}

fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
}

fn corrupt(path: &Path, e: rusqlite::Error) -> AppError {
    AppError::IndexUnavailable(format!(
        "Failed to read index snapshot {}: {}",
        path.display(),
        e
    ))
}

fn write_failed(path: &Path, e: rusqlite::Error) -> AppError {
    AppError::IndexUnavailable(format!(
        "Failed to write index snapshot {}: {}",
        path.display(),
        e
    ))
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::IndexUnavailable(
            "Invalid embedding bytes length in snapshot".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, doc: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            source: doc.to_string(),
            page: None,
            position: 0,
            offset: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_add_and_search() {
        let mut index = MemoryIndex::new(3, SimilarityMetric::Cosine);
        index.add(chunk("a", "faq", "alpha"), vec![1.0, 0.0, 0.0]).unwrap();
        index.add(chunk("b", "faq", "beta"), vec![0.0, 1.0, 0.0]).unwrap();
        index.add(chunk("c", "faq", "gamma"), vec![0.7, 0.7, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "a");
        assert_eq!(results[1].0.id, "c");
        assert!(results[0].1 >= results[1].1);
    }

    #[test]
    fn test_upsert_by_id_does_not_grow() {
        let mut index = MemoryIndex::new(2, SimilarityMetric::Cosine);
        assert!(index.add(chunk("a", "faq", "v1"), vec![1.0, 0.0]).unwrap());
        assert!(!index.add(chunk("a", "faq", "v2"), vec![0.0, 1.0]).unwrap());

        assert_eq!(index.len(), 1);
        let results = index.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(results[0].0.text, "v2");
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = MemoryIndex::new(3, SimilarityMetric::Cosine);
        let err = index.add(chunk("a", "faq", "x"), vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            AppError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_empty_index_search() {
        let index = MemoryIndex::new(2, SimilarityMetric::Cosine);
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_stats_and_clear() {
        let mut index = MemoryIndex::new(2, SimilarityMetric::DotProduct);
        index.add(chunk("a", "faq", "x"), vec![1.0, 0.0]).unwrap();
        index.add(chunk("b", "faq", "y"), vec![0.0, 1.0]).unwrap();
        index.add(chunk("c", "guide", "z"), vec![1.0, 1.0]).unwrap();

        let stats = index.stats();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.metric, SimilarityMetric::DotProduct);

        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_document_keeps_other_documents_searchable() {
        let mut index = MemoryIndex::new(2, SimilarityMetric::Cosine);
        index.add(chunk("a", "faq", "x"), vec![1.0, 0.0]).unwrap();
        index.add(chunk("b", "guide", "y"), vec![0.0, 1.0]).unwrap();
        index.add(chunk("c", "faq", "z"), vec![1.0, 1.0]).unwrap();

        assert_eq!(index.remove_document("faq"), 2);
        assert_eq!(index.remove_document("faq"), 0);
        assert_eq!(index.len(), 1);
        assert!(!index.contains("a"));
        assert!(index.contains("b"));

        // Slots were renumbered: upserting the survivor must not grow the index.
        assert!(!index.add(chunk("b", "guide", "y2"), vec![0.0, 1.0]).unwrap());
        assert_eq!(index.len(), 1);
        let results = index.search(&[0.0, 1.0], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.text, "y2");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");

        let mut index = MemoryIndex::new(2, SimilarityMetric::Cosine);
        let mut paged = chunk("p", "guide.pdf#p2", "paged text");
        paged.page = Some(2);
        paged.offset = 800;
        index.add(chunk("a", "faq", "x"), vec![1.0, 0.0]).unwrap();
        index.add(paged.clone(), vec![0.6, 0.8]).unwrap();
        index.save(&path).unwrap();

        let restored = MemoryIndex::restore(&path, SimilarityMetric::Cosine, true).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.dimension(), 2);

        let results = restored.search(&[0.6, 0.8], 1).unwrap();
        assert_eq!(results[0].0, paged);
    }

    #[test]
    fn test_restore_requires_opt_in() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        MemoryIndex::new(2, SimilarityMetric::Cosine)
            .save(&path)
            .unwrap();

        let result = MemoryIndex::restore(&path, SimilarityMetric::Cosine, false);
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_restore_metric_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        MemoryIndex::new(2, SimilarityMetric::Cosine)
            .save(&path)
            .unwrap();

        let result = MemoryIndex::restore(&path, SimilarityMetric::Euclidean, true);
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_restore_missing_or_corrupt_snapshot() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.sqlite");
        assert!(matches!(
            MemoryIndex::restore(&missing, SimilarityMetric::Cosine, true),
            Err(AppError::IndexUnavailable(_))
        ));

        let garbage = temp.path().join("garbage.sqlite");
        std::fs::write(&garbage, b"this is not a sqlite database at all").unwrap();
        assert!(matches!(
            MemoryIndex::restore(&garbage, SimilarityMetric::Cosine, true),
            Err(AppError::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_save_overwrites_existing_snapshot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("index.sqlite");

        let mut index = MemoryIndex::new(2, SimilarityMetric::Cosine);
        index.add(chunk("a", "faq", "x"), vec![1.0, 0.0]).unwrap();
        index.save(&path).unwrap();
        index.add(chunk("b", "faq", "y"), vec![0.0, 1.0]).unwrap();
        index.save(&path).unwrap();

        let restored = MemoryIndex::restore(&path, SimilarityMetric::Cosine, true).unwrap();
        assert_eq!(restored.len(), 2);
    }
}
