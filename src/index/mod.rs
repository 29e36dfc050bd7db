//! Persisted vector index
//!
//! SQLite file `index.sqlite3` under the persistence directory, one row per
//! source path. Re-ingesting a file replaces its row, so repeated runs over
//! the same directory never grow the index. The database runs in WAL mode:
//! readers see a consistent snapshot while an ingestion run writes.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embedding::Embedding;
use crate::error::{Error, Result};

/// File name of the index inside the persistence directory
pub const INDEX_FILE: &str = "index.sqlite3";

/// One indexed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexEntry {
    /// Source path of the document
    pub source: String,
    /// Trimmed document text
    pub text: String,
    pub embedding: Embedding,
}

/// Embedding model the index was built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub model_name: String,
    pub dimension: usize,
    pub created_at: String,
}

/// Attach `context` and map any failure onto [`Error::VectorStore`]
trait StoreResult<T> {
    fn store(self, context: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> StoreResult<T> for std::result::Result<T, E> {
    fn store(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::VectorStore(e.into().context(context.to_string())))
    }
}

/// Handle on an index file
pub struct VectorIndex {
    conn: Connection,
    path: PathBuf,
}

impl VectorIndex {
    /// Path of the index file for a persistence directory
    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    /// Whether an index has been written under `dir`
    pub fn exists(dir: &Path) -> bool {
        Self::file_path(dir).is_file()
    }

    /// Open an existing index; `None` when nothing was ever written
    pub fn open(dir: &Path) -> Result<Option<Self>> {
        if !Self::exists(dir) {
            return Ok(None);
        }
        Self::connect(&Self::file_path(dir)).map(Some)
    }

    /// Open the index for writing, creating it when absent
    ///
    /// A new index records `model_name` and `dimension`. An existing one must
    /// have the same dimension; a different model name only warns.
    pub fn create_or_open(dir: &Path, model_name: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(dir).store("Failed to create index directory")?;
        let index = Self::connect(&Self::file_path(dir))?;

        match index.metadata()? {
            Some(existing) => {
                if existing.dimension != dimension {
                    return Err(Error::VectorStore(anyhow::anyhow!(
                        "index at {:?} holds {}-dimensional embeddings from {}, got {} from {}",
                        index.path,
                        existing.dimension,
                        existing.model_name,
                        dimension,
                        model_name
                    )));
                }
                if existing.model_name != model_name {
                    tracing::warn!(
                        "Embedder model mismatch: index={}, embedder={}",
                        existing.model_name,
                        model_name
                    );
                }
            }
            None => {
                let created_at = chrono::Utc::now().to_rfc3339();
                for (key, value) in [
                    ("model_name", model_name.to_string()),
                    ("dimension", dimension.to_string()),
                    ("created_at", created_at),
                ] {
                    index
                        .conn
                        .execute(
                            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                            params![key, value],
                        )
                        .store("Failed to write index metadata")?;
                }
                tracing::info!("Created vector index at {:?}", index.path);
            }
        }

        Ok(index)
    }

    fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .store(&format!("Failed to open index database: {:?}", path))?;
        conn.busy_timeout(Duration::from_secs(5))
            .store("Failed to set busy timeout")?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .store("Failed to enable WAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                source TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .store("Failed to create index tables")?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Model and dimension recorded at creation
    pub fn metadata(&self) -> Result<Option<IndexMetadata>> {
        let get = |key: &str| -> Result<Option<String>> {
            self.conn
                .query_row(
                    "SELECT value FROM metadata WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .store("Failed to read index metadata")
        };

        let (Some(model_name), Some(dimension)) = (get("model_name")?, get("dimension")?) else {
            return Ok(None);
        };
        let dimension = dimension
            .parse::<usize>()
            .store("Corrupt dimension in index metadata")?;

        Ok(Some(IndexMetadata {
            model_name,
            dimension,
            created_at: get("created_at")?.unwrap_or_default(),
        }))
    }

    /// Insert or replace entries by source path, in one transaction
    pub fn upsert(&mut self, entries: &[VectorIndexEntry]) -> Result<usize> {
        let dimension = self.metadata()?.map(|m| m.dimension);
        let updated_at = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.transaction().store("Failed to begin transaction")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO entries (source, text, embedding, dimension, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .store("Failed to prepare upsert")?;

            for entry in entries {
                if entry.text.trim().is_empty() {
                    return Err(Error::VectorStore(anyhow::anyhow!(
                        "refusing to index empty text from {}",
                        entry.source
                    )));
                }
                if let Some(expected) = dimension {
                    if entry.embedding.len() != expected {
                        return Err(Error::VectorStore(anyhow::anyhow!(
                            "embedding for {} has dimension {}, index expects {}",
                            entry.source,
                            entry.embedding.len(),
                            expected
                        )));
                    }
                }

                stmt.execute(params![
                    entry.source,
                    entry.text,
                    serialize_embedding(&entry.embedding),
                    entry.embedding.len() as i64,
                    updated_at,
                ])
                .store("Failed to write index entry")?;
            }
        }
        tx.commit().store("Failed to commit index update")?;

        tracing::debug!("Upserted {} entries into {:?}", entries.len(), self.path);
        Ok(entries.len())
    }

    /// All entries, ordered by source path
    pub fn entries(&self) -> Result<Vec<VectorIndexEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source, text, embedding FROM entries ORDER BY source")
            .store("Failed to query index")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })
            .store("Failed to query index")?;

        let mut entries = Vec::new();
        for row in rows {
            let (source, text, bytes) = row.store("Failed to read index row")?;
            let embedding = deserialize_embedding(&bytes)
                .store(&format!("Corrupt embedding for {}", source))?;
            entries.push(VectorIndexEntry {
                source,
                text,
                embedding,
            });
        }
        Ok(entries)
    }

    /// Number of entries
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .store("Failed to count index entries")?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|&f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> anyhow::Result<Embedding> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("Invalid embedding bytes length {}", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
