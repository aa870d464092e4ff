use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::book::{content_hash, Book};
use crate::ebook::{EbookError, Epub};

/// One scanned book file, addressable by a stable per-session integer id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub id: usize,
    pub path: PathBuf,
}

impl LibraryEntry {
    pub fn display_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// The user's shelf: every `*.epub` under the configured library paths.
#[derive(Debug, Clone, Default)]
pub struct Library {
    entries: Vec<LibraryEntry>,
}

impl Library {
    /// Scan the library paths recursively. Entries are sorted by path so
    /// ids are stable for a given set of files; missing paths warn once
    /// and are skipped.
    pub fn scan(paths: &[PathBuf]) -> Self {
        let mut files: Vec<PathBuf> = Vec::new();
        for root in paths {
            if !root.exists() {
                warn!(path = %root.display(), "library path does not exist; skipped");
                continue;
            }
            for entry in WalkDir::new(root).follow_links(true) {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("epub")) {
                            files.push(path.to_path_buf());
                        }
                    }
                    Err(err) => warn!(%err, "library scan error"),
                }
            }
        }
        files.sort();
        files.dedup();
        let entries = files
            .into_iter()
            .enumerate()
            .map(|(i, path)| LibraryEntry { id: i + 1, path })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: usize) -> Option<&LibraryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Parse a library entry into a full [`Book`], hashing its content for
    /// the persistent identity.
    pub fn open(&self, id: usize) -> Result<Book, EbookError> {
        let Some(entry) = self.entry(id) else {
            return Err(EbookError::Malformed(format!("no book with id {id}")));
        };
        open_book_file(&entry.path)
    }
}

pub fn open_book_file(path: &Path) -> Result<Book, EbookError> {
    let hash = content_hash(path)?;
    let epub = Epub::open(path)?;
    Ok(Book::from_epub(epub, path, hash))
}
