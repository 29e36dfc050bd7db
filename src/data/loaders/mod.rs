//! Document discovery and loaders
//!
//! Only plain text and Markdown are ingested; every other extension is
//! skipped silently. Files are decoded as UTF-8 with malformed bytes
//! replaced, so a stray byte never fails a file.

use crate::data::{Document, DocumentMetadata};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Trait for loading documents from files
pub trait DocumentLoader: Send + Sync {
    /// Load a document from the given path
    fn load(&self, path: &Path) -> Result<Document>;

    /// Check if this loader can handle the given file extension
    fn can_load(&self, path: &Path) -> bool;
}

/// Plain text loader
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        read_document(path, "txt")
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, "txt")
    }
}

/// Markdown loader; the body is taken as-is
pub struct MarkdownLoader;

impl DocumentLoader for MarkdownLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        read_document(path, "md")
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, "md")
    }
}

/// Loader that delegates to the first format loader accepting a path
pub struct MultiFormatLoader {
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl MultiFormatLoader {
    pub fn new() -> Self {
        let loaders: Vec<Box<dyn DocumentLoader>> = vec![Box::new(TextLoader), Box::new(MarkdownLoader)];
        Self { loaders }
    }

    pub fn can_load(&self, path: &Path) -> bool {
        self.loaders.iter().any(|l| l.can_load(path))
    }

    /// Load a document, automatically selecting the appropriate loader
    pub fn load(&self, path: &Path) -> Result<Document> {
        match self.loaders.iter().find(|l| l.can_load(path)) {
            Some(loader) => loader.load(path),
            None => Err(Error::Ingestion {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "no loader for this file type",
                ),
            }),
        }
    }

    /// Loadable files under `root`, sorted by path
    ///
    /// Flat unless `recursive`. A missing root yields no files; an unreadable
    /// root is an error. Unreadable subdirectories are skipped. Symlinked
    /// files are loaded, symlinked directories are never followed.
    pub fn discover(&self, root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !root.is_dir() {
            tracing::warn!("Knowledge base directory {:?} does not exist", root);
            return Ok(files);
        }
        let entries = fs::read_dir(root).map_err(|source| Error::Ingestion {
            path: root.to_path_buf(),
            source,
        })?;
        self.walk(entries, root, recursive, &mut files);
        files.sort();
        tracing::debug!("Discovered {} files under {:?}", files.len(), root);
        Ok(files)
    }

    fn walk(&self, entries: fs::ReadDir, dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };

            if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_file() => {
                        if self.can_load(&path) {
                            files.push(path);
                        }
                    }
                    Ok(meta) if meta.is_dir() => {
                        tracing::debug!("Not following symlinked directory {:?}", path);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping dangling link {:?}: {}", path, e),
                }
            } else if file_type.is_file() {
                if self.can_load(&path) {
                    files.push(path);
                }
            } else if recursive && file_type.is_dir() {
                match fs::read_dir(&path) {
                    Ok(sub) => self.walk(sub, &path, recursive, files),
                    Err(e) => tracing::warn!("Skipping unreadable directory {:?}: {}", path, e),
                }
            }
        }
    }
}

impl Default for MultiFormatLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

fn read_document(path: &Path, file_type: &str) -> Result<Document> {
    let bytes = fs::read(path).map_err(|source| Error::Ingestion {
        path: path.to_path_buf(),
        source,
    })?;

    let size = bytes.len();
    let (text, lossy) = match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(e) => {
            tracing::debug!("{:?} is not valid UTF-8, replacing malformed bytes", path);
            (String::from_utf8_lossy(e.as_bytes()).into_owned(), true)
        }
    };

    Ok(Document::new(
        path.to_path_buf(),
        text,
        DocumentMetadata {
            file_type: file_type.to_string(),
            size,
            lossy,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_text_loader() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "Hello, world!").unwrap();

        let doc = TextLoader.load(file.path()).unwrap();
        assert!(doc.text.contains("Hello, world!"));
        assert_eq!(doc.metadata.file_type, "txt");
        assert!(!doc.metadata.lossy);
    }

    #[test]
    fn test_markdown_loader() {
        let mut file = NamedTempFile::with_suffix(".MD").unwrap();
        writeln!(file, "# Header\n\nContent").unwrap();

        let loader = MultiFormatLoader::new();
        assert!(loader.can_load(file.path()));
        let doc = loader.load(file.path()).unwrap();
        assert!(doc.text.starts_with("# Header"));
        assert_eq!(doc.metadata.file_type, "md");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(b"price: 10\xff\xfe EUR").unwrap();

        let doc = TextLoader.load(file.path()).unwrap();
        assert!(doc.metadata.lossy);
        assert!(doc.text.starts_with("price: 10"));
        assert!(doc.text.ends_with(" EUR"));
    }

    #[test]
    fn test_discovery_flat_and_recursive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("notes.pdf"), "pdf").unwrap();
        std::fs::write(dir.path().join("README"), "none").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.TXT"), "c").unwrap();

        let loader = MultiFormatLoader::new();
        let flat = loader.discover(dir.path(), false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.md"), dir.path().join("b.txt")]);

        let deep = loader.discover(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("sub/c.TXT")));
    }

    #[test]
    fn test_missing_root_discovers_nothing() {
        let dir = TempDir::new().unwrap();
        let files = MultiFormatLoader::new()
            .discover(&dir.path().join("absent"), true)
            .unwrap();
        assert!(files.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let private = dir.path().join("private");
        std::fs::create_dir(&private).unwrap();
        std::fs::write(private.join("hidden.txt"), "hidden").unwrap();
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind root
        let readable = std::fs::read_dir(&private).is_ok();
        let files = MultiFormatLoader::new().discover(dir.path(), true);
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        assert_eq!(files.unwrap(), vec![dir.path().join("a.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_not_followed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("alias.md")).unwrap();

        let files = MultiFormatLoader::new().discover(dir.path(), true).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("alias.md")]
        );
    }

    #[test]
    fn test_unreadable_file_is_ingestion_error() {
        let dir = TempDir::new().unwrap();
        let err = TextLoader.load(&dir.path().join("gone.txt")).unwrap_err();
        assert!(matches!(err, Error::Ingestion { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_blank_document() {
        let doc = Document::new(PathBuf::from("x.txt"), " \n\t ".to_string(), DocumentMetadata::default());
        assert!(doc.is_blank());
        assert_eq!(doc.trimmed(), "");
    }
}
