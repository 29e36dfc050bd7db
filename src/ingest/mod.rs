//! Knowledge-base ingestion
//!
//! discover → read → drop blank documents → embed → upsert into the index.
//! A file that cannot be read is skipped; the run carries on with the rest.
//! When nothing usable is found the index is left untouched, not even
//! created.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::data::{Document, MultiFormatLoader};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::{VectorIndex, VectorIndexEntry};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files matching the extension allow-list
    pub files_discovered: usize,
    /// Entries upserted into the index
    pub documents_indexed: usize,
    /// Files whose trimmed text was empty
    pub skipped_empty: Vec<PathBuf>,
    /// Files that could not be read
    pub failed: Vec<PathBuf>,
    /// Whether the index was opened for writing
    pub index_written: bool,
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files discovered, {} indexed, {} empty, {} failed",
            self.files_discovered,
            self.documents_indexed,
            self.skipped_empty.len(),
            self.failed.len()
        )
    }
}

/// Builds or extends the vector index from a directory of text files
pub struct IngestionPipeline {
    loader: MultiFormatLoader,
    embedder: Arc<dyn Embedder>,
    recursive: bool,
}

impl IngestionPipeline {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            loader: MultiFormatLoader::new(),
            embedder,
            recursive: false,
        }
    }

    /// Also descend into subdirectories
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Ingest every text and Markdown file under `root` into `index_path`
    ///
    /// Fails only when the embedder or the index fails.
    pub fn ingest(&self, root: &Path, index_path: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        let files = self.loader.discover(root, self.recursive)?;
        report.files_discovered = files.len();
        if files.is_empty() {
            tracing::warn!("{}", Error::EmptyKnowledgeBase(root.to_path_buf()));
            return Ok(report);
        }
        tracing::info!("Ingesting {} files from {:?}", files.len(), root);

        let mut documents: Vec<Document> = Vec::with_capacity(files.len());
        for path in files {
            match self.loader.load(&path) {
                Ok(doc) if doc.is_blank() => {
                    tracing::warn!("Skipping empty document {:?}", path);
                    report.skipped_empty.push(path);
                }
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::warn!("Skipping file: {}", e);
                    report.failed.push(path);
                }
            }
        }

        if documents.is_empty() {
            tracing::warn!("{}", Error::EmptyKnowledgeBase(root.to_path_buf()));
            return Ok(report);
        }

        let texts: Vec<&str> = documents.iter().map(Document::trimmed).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .map_err(|e| Error::Embedding(e.context("Failed to embed documents")))?;
        if embeddings.len() != documents.len() {
            return Err(Error::Embedding(anyhow::anyhow!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let entries: Vec<VectorIndexEntry> = documents
            .iter()
            .zip(embeddings)
            .map(|(doc, embedding)| VectorIndexEntry {
                source: doc.source_key(),
                text: doc.trimmed().to_string(),
                embedding,
            })
            .collect();

        let mut index = VectorIndex::create_or_open(
            index_path,
            self.embedder.model_name(),
            self.embedder.dimension(),
        )?;
        report.index_written = true;
        report.documents_indexed = index.upsert(&entries)?;

        tracing::info!(
            "Ingestion finished in {:.2?}: {} (index holds {} entries)",
            start.elapsed(),
            report,
            index.len()?
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TokenEmbedder;
    use tempfile::TempDir;

    fn pipeline() -> IngestionPipeline {
        IngestionPipeline::new(Arc::new(TokenEmbedder::default()))
    }

    #[test]
    fn test_ingest_text_and_markdown() {
        let kb = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(kb.path().join("delivery.txt"), "  Delivery takes 3 days.\n").unwrap();
        std::fs::write(kb.path().join("faq.md"), "# FAQ\n\nWe ship worldwide.").unwrap();
        std::fs::write(kb.path().join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47]).unwrap();

        let report = pipeline().ingest(kb.path(), out.path()).unwrap();
        assert_eq!(report.files_discovered, 2);
        assert_eq!(report.documents_indexed, 2);
        assert!(report.index_written);

        let index = VectorIndex::open(out.path()).unwrap().unwrap();
        let entries = index.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.text == "Delivery takes 3 days."));
    }

    #[test]
    fn test_whitespace_only_file_produces_no_entries() {
        let kb = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(kb.path().join("blank.txt"), " \n\t\n ").unwrap();

        let report = pipeline().ingest(kb.path(), out.path()).unwrap();
        assert_eq!(report.documents_indexed, 0);
        assert_eq!(report.skipped_empty.len(), 1);
        assert!(!report.index_written);
        assert!(!VectorIndex::exists(out.path()));
    }

    #[test]
    fn test_empty_directory_leaves_index_untouched() {
        let kb = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let index_dir = out.path().join("index");

        let report = pipeline().ingest(kb.path(), &index_dir).unwrap();
        assert_eq!(report.files_discovered, 0);
        assert!(!index_dir.exists());
    }

    #[test]
    fn test_empty_run_does_not_modify_existing_index() {
        let kb = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(kb.path().join("a.txt"), "alpha").unwrap();

        pipeline().ingest(kb.path(), out.path()).unwrap();
        let before = std::fs::read(VectorIndex::file_path(out.path())).unwrap();

        pipeline().ingest(empty.path(), out.path()).unwrap();
        let after = std::fs::read(VectorIndex::file_path(out.path())).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reingest_keeps_content_without_duplicates() {
        let kb = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(kb.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(kb.path().join("b.md"), "beta").unwrap();

        let first = pipeline().ingest(kb.path(), out.path()).unwrap();
        let second = pipeline().ingest(kb.path(), out.path()).unwrap();
        assert_eq!(first, second);

        let index = VectorIndex::open(out.path()).unwrap().unwrap();
        assert_eq!(index.len().unwrap(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_files_are_skipped_and_run_continues() {
        use std::os::unix::fs::PermissionsExt;

        let kb = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(kb.path().join("a.txt"), "alpha").unwrap();
        let locked = kb.path().join("locked.txt");
        std::fs::write(&locked, "secret").unwrap();
        let private = kb.path().join("private");
        std::fs::create_dir(&private).unwrap();
        std::fs::write(private.join("hidden.md"), "hidden").unwrap();

        let no_access = || std::fs::Permissions::from_mode(0o000);
        std::fs::set_permissions(&locked, no_access()).unwrap();
        std::fs::set_permissions(&private, no_access()).unwrap();

        // Permission bits do not bind root
        let readable = std::fs::read(&locked).is_ok();
        let report = pipeline()
            .with_recursive(true)
            .ingest(kb.path(), out.path());
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        let report = report.unwrap();
        assert_eq!(report.files_discovered, 2);
        assert_eq!(report.failed, vec![locked]);
        assert_eq!(report.documents_indexed, 1);
        let index = VectorIndex::open(out.path()).unwrap().unwrap();
        assert_eq!(index.entries().unwrap()[0].text, "alpha");
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_symlink_loop_indexes_each_file_once() {
        let kb = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(kb.path().join("a.txt"), "alpha").unwrap();
        std::os::unix::fs::symlink(kb.path(), kb.path().join("loop")).unwrap();

        let report = pipeline()
            .with_recursive(true)
            .ingest(kb.path(), out.path())
            .unwrap();
        assert_eq!(report.files_discovered, 1);
        assert_eq!(report.documents_indexed, 1);
    }

    #[test]
    fn test_recursive_flag() {
        let kb = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::create_dir(kb.path().join("nested")).unwrap();
        std::fs::write(kb.path().join("nested/deep.txt"), "deep").unwrap();

        let flat = pipeline().ingest(kb.path(), out.path()).unwrap();
        assert_eq!(flat.files_discovered, 0);

        let deep = pipeline()
            .with_recursive(true)
            .ingest(kb.path(), out.path())
            .unwrap();
        assert_eq!(deep.documents_indexed, 1);
    }
}
