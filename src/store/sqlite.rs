//! SQLite index backend
//!
//! One database file can hold several named collections. Each collection
//! row carries the active generation; chunk rows are keyed by
//! (collection, generation, chunk_id). A rebuild inserts the next
//! generation, flips the pointer and deletes the old rows inside a single
//! transaction, so readers on other connections see either the old or the
//! new generation, never a mix.

use super::traits::{
    rank, IndexMetadata, IndexedChunk, OpenIndex, ScoredChunk, StoreError, StoreResult,
    VectorIndex,
};
use crate::chunk::Chunk;
use crate::embedding::cosine_similarity;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite-backed vector index
///
/// Similarity is computed in Rust over the active generation (brute force).
/// Thread-safe via internal mutex on the connection.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    collection: String,
}

impl SqliteIndex {
    fn init_schema(conn: &Connection, collection: &str) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                generation INTEGER NOT NULL,
                embedder_id TEXT,
                dimensions INTEGER,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                collection TEXT NOT NULL,
                generation INTEGER NOT NULL,
                chunk_id TEXT NOT NULL,
                source TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, generation, chunk_id)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_generation
                ON chunks(collection, generation);

            -- Readers keep working while a rebuild commits
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO collections (name, generation, updated_at) VALUES (?1, 0, ?2)",
            params![collection, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection, collection: &str) -> StoreResult<Self> {
        Self::init_schema(&conn, collection)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
        })
    }

    /// Name of the collection this index reads and writes
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn active_generation(conn: &Connection, collection: &str) -> StoreResult<i64> {
        let generation = conn.query_row(
            "SELECT generation FROM collections WHERE name = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(generation)
    }

    /// Load every (chunk, embedding) pair of the active generation.
    fn load_active(&self) -> StoreResult<Vec<IndexedChunk>> {
        let conn = self.lock()?;
        let generation = Self::active_generation(&conn, &self.collection)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_id, source, sequence, text, embedding
            FROM chunks
            WHERE collection = ?1 AND generation = ?2
            "#,
        )?;
        let rows = stmt.query_map(params![self.collection, generation], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, source, sequence, text, blob) = row?;
            entries.push(IndexedChunk {
                chunk: row_to_chunk(&id, source, sequence, text)?,
                embedding: decode_embedding(&blob)?,
            });
        }
        Ok(entries)
    }
}

fn row_to_chunk(id: &str, source: String, sequence: i64, text: String) -> StoreResult<Chunk> {
    let id = Uuid::parse_str(id)
        .map_err(|e| StoreError::Corrupt(format!("chunk id {:?}: {}", id, e)))?;
    let sequence = usize::try_from(sequence)
        .map_err(|_| StoreError::Corrupt(format!("negative sequence {} for {}", sequence, id)))?;
    Ok(Chunk {
        id,
        source,
        sequence,
        text,
    })
}

/// Little-endian f32 encoding of an embedding.
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> StoreResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "embedding blob of {} bytes is not a whole number of f32s",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl OpenIndex for SqliteIndex {
    fn open(path: impl AsRef<Path>, collection: &str) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?, collection)
    }

    fn open_in_memory(collection: &str) -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, collection)
    }
}

impl VectorIndex for SqliteIndex {
    fn replace_all(&self, chunks: Vec<IndexedChunk>, metadata: &IndexMetadata) -> StoreResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let next = Self::active_generation(&tx, &self.collection)? + 1;
        {
            let mut insert = tx.prepare(
                r#"
                INSERT INTO chunks (collection, generation, chunk_id, source, sequence, text, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for entry in &chunks {
                insert.execute(params![
                    self.collection,
                    next,
                    entry.chunk.id.to_string(),
                    entry.chunk.source,
                    entry.chunk.sequence as i64,
                    entry.chunk.text,
                    encode_embedding(&entry.embedding),
                ])?;
            }
        }

        tx.execute(
            r#"
            UPDATE collections
            SET generation = ?2, embedder_id = ?3, dimensions = ?4, updated_at = ?5
            WHERE name = ?1
            "#,
            params![
                self.collection,
                next,
                metadata.embedder_id,
                metadata.dimensions as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        tx.execute(
            "DELETE FROM chunks WHERE collection = ?1 AND generation <> ?2",
            params![self.collection, next],
        )?;
        tx.commit()?;

        Ok(next as u64)
    }

    fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        // Scoring happens after the connection lock is released
        let entries = self.load_active()?;
        let hits = entries
            .into_iter()
            .map(|entry| ScoredChunk {
                score: cosine_similarity(query, &entry.embedding),
                chunk: entry.chunk,
            })
            .collect();
        Ok(rank(hits, k))
    }

    fn clear(&self) -> StoreResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let next = Self::active_generation(&tx, &self.collection)? + 1;
        tx.execute(
            r#"
            UPDATE collections
            SET generation = ?2, embedder_id = NULL, dimensions = NULL, updated_at = ?3
            WHERE name = ?1
            "#,
            params![self.collection, next, chrono::Utc::now().to_rfc3339()],
        )?;
        tx.execute(
            "DELETE FROM chunks WHERE collection = ?1",
            params![self.collection],
        )?;
        tx.commit()?;
        Ok(next as u64)
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let generation = Self::active_generation(&conn, &self.collection)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE collection = ?1 AND generation = ?2",
            params![self.collection, generation],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn generation(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        Ok(Self::active_generation(&conn, &self.collection)? as u64)
    }

    fn metadata(&self) -> StoreResult<Option<IndexMetadata>> {
        let conn = self.lock()?;
        let row: Option<(Option<String>, Option<i64>)> = conn
            .query_row(
                "SELECT embedder_id, dimensions FROM collections WHERE name = ?1",
                params![self.collection],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((Some(embedder_id), Some(dimensions))) => Some(IndexMetadata {
                embedder_id,
                dimensions: dimensions as usize,
            }),
            _ => None,
        })
    }

    fn chunks(&self) -> StoreResult<Vec<Chunk>> {
        let conn = self.lock()?;
        let generation = Self::active_generation(&conn, &self.collection)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_id, source, sequence, text
            FROM chunks
            WHERE collection = ?1 AND generation = ?2
            ORDER BY source, sequence
            "#,
        )?;
        let rows = stmt.query_map(params![self.collection, generation], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let (id, source, sequence, text) = row?;
            chunks.push(row_to_chunk(&id, source, sequence, text)?);
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn meta(dimensions: usize) -> IndexMetadata {
        IndexMetadata {
            embedder_id: "test".to_string(),
            dimensions,
        }
    }

    fn entry(source: &str, sequence: usize, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk::new(source, sequence, format!("{} #{}", source, sequence)),
            embedding,
        }
    }

    #[test]
    fn test_new_index_is_empty_at_generation_zero() {
        let index = SqliteIndex::open_in_memory("kb").unwrap();
        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.generation().unwrap(), 0);
        assert_eq!(index.metadata().unwrap(), None);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_replace_all_swaps_generation() {
        let index = SqliteIndex::open_in_memory("kb").unwrap();
        let gen1 = index
            .replace_all(vec![entry("a.md", 0, vec![1.0, 0.0])], &meta(2))
            .unwrap();
        let gen2 = index
            .replace_all(
                vec![entry("b.md", 0, vec![0.0, 1.0]), entry("b.md", 1, vec![1.0, 1.0])],
                &meta(2),
            )
            .unwrap();
        assert_eq!((gen1, gen2), (1, 2));
        assert_eq!(index.count().unwrap(), 2);

        let sources: Vec<String> = index.chunks().unwrap().into_iter().map(|c| c.source).collect();
        assert_eq!(sources, vec!["b.md", "b.md"]);
    }

    #[test]
    fn test_search_ranks_by_cosine() {
        let index = SqliteIndex::open_in_memory("kb").unwrap();
        index
            .replace_all(
                vec![
                    entry("far.md", 0, vec![0.0, 1.0]),
                    entry("near.md", 0, vec![1.0, 0.1]),
                    entry("mid.md", 0, vec![1.0, 1.0]),
                ],
                &meta(2),
            )
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        let sources: Vec<&str> = hits.iter().map(|h| h.chunk.source.as_str()).collect();
        assert_eq!(sources, vec!["near.md", "mid.md"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_clear_empties_and_forgets_metadata() {
        let index = SqliteIndex::open_in_memory("kb").unwrap();
        index
            .replace_all(vec![entry("a.md", 0, vec![1.0])], &meta(1))
            .unwrap();
        let generation = index.clear().unwrap();
        assert_eq!(generation, 2);
        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.metadata().unwrap(), None);
    }

    #[test]
    fn test_collections_are_isolated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kb.db");
        let first = SqliteIndex::open(&path, "first").unwrap();
        let second = SqliteIndex::open(&path, "second").unwrap();

        first
            .replace_all(vec![entry("a.md", 0, vec![1.0])], &meta(1))
            .unwrap();
        assert_eq!(first.count().unwrap(), 1);
        assert_eq!(second.count().unwrap(), 0);

        second.clear().unwrap();
        assert_eq!(first.count().unwrap(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("kb.db");
        {
            let index = SqliteIndex::open(&path, "kb").unwrap();
            index
                .replace_all(vec![entry("a.md", 0, vec![0.5, -0.25])], &meta(2))
                .unwrap();
        }
        let index = SqliteIndex::open(&path, "kb").unwrap();
        assert_eq!(index.generation().unwrap(), 1);
        assert_eq!(index.metadata().unwrap(), Some(meta(2)));
        let hits = index.search(&[0.5, -0.25], 1).unwrap();
        assert_eq!(hits[0].chunk, Chunk::new("a.md", 0, "a.md #0"));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_generation() {
        let index = SqliteIndex::open_in_memory("kb").unwrap();
        index
            .replace_all(vec![entry("a.md", 0, vec![1.0])], &meta(1))
            .unwrap();

        // Duplicate primary key aborts the transaction
        let dup = vec![entry("b.md", 0, vec![1.0]), entry("b.md", 0, vec![1.0])];
        assert!(index.replace_all(dup, &meta(1)).is_err());

        assert_eq!(index.generation().unwrap(), 1);
        let chunks = index.chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "a.md");
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let v = vec![0.0, -1.5, f32::MIN_POSITIVE, 42.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)).unwrap(), v);
        assert!(decode_embedding(&[0, 1, 2]).is_err());
    }
}
