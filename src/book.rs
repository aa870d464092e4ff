use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_128;

use crate::ebook::{Chapter, Epub};

/// A loaded book. Identity is a 128-bit content hash of the file, so a
/// moved or renamed EPUB keeps its progress.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: u128,
    pub title: String,
    pub author: String,
    pub path: PathBuf,
    pub chapters: Vec<Chapter>,
    /// Chapter archive filename -> spine index, for intra-book links.
    pub chapter_lookup: HashMap<String, usize>,
    /// Percentage typed, in `[0, 100]`. Mutated only by the typing engine.
    pub progress: f64,
    /// Set on any engine advance; cleared after a successful save.
    pub dirty: bool,
}

impl Book {
    pub fn new(
        id: u128,
        title: impl Into<String>,
        author: impl Into<String>,
        path: impl Into<PathBuf>,
        chapters: Vec<Chapter>,
    ) -> Self {
        let chapter_lookup = chapters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.filename.clone(), i))
            .collect();
        Self {
            id,
            title: title.into(),
            author: author.into(),
            path: path.into(),
            chapters,
            chapter_lookup,
            progress: 0.0,
            dirty: false,
        }
    }

    pub fn from_epub(epub: Epub, path: &Path, id: u128) -> Self {
        let title = if epub.title.is_empty() {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Untitled".to_string())
        } else {
            epub.title
        };
        Self::new(id, title, epub.author, path, epub.chapters)
    }

    /// The persisted save key.
    pub fn id_hex(&self) -> String {
        format!("{:032x}", self.id)
    }

    /// Total typable chars across readable chapters: the progress
    /// denominator.
    pub fn total_len(&self) -> usize {
        self.chapters.iter().map(|c| c.length).sum()
    }

    pub fn chapter_by_filename(&self, filename: &str) -> Option<usize> {
        self.chapter_lookup.get(filename).copied()
    }
}

/// Hash a book file's content into its stable 128-bit identity.
pub fn content_hash(path: &Path) -> io::Result<u128> {
    let bytes = std::fs::read(path)?;
    Ok(xxh3_128(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters() -> Vec<Chapter> {
        vec![
            Chapter::from_plain("a.xhtml".into(), "first"),
            Chapter::from_plain("b.xhtml".into(), "second!"),
        ]
    }

    #[test]
    fn test_lookup_and_total_len() {
        let book = Book::new(7, "T", "A", "/x.epub", chapters());
        assert_eq!(book.chapter_by_filename("b.xhtml"), Some(1));
        assert_eq!(book.chapter_by_filename("missing"), None);
        assert_eq!(book.total_len(), 5 + 7);
    }

    #[test]
    fn test_id_hex_is_stable_width() {
        let book = Book::new(0xabc, "T", "A", "/x.epub", vec![]);
        assert_eq!(book.id_hex().len(), 32);
        assert!(book.id_hex().ends_with("abc"));
    }

    #[test]
    fn test_content_hash_depends_on_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("one.epub");
        let p2 = dir.path().join("two.epub");
        std::fs::write(&p1, b"same").unwrap();
        std::fs::write(&p2, b"same").unwrap();
        assert_eq!(content_hash(&p1).unwrap(), content_hash(&p2).unwrap());
        std::fs::write(&p2, b"different").unwrap();
        assert_ne!(content_hash(&p1).unwrap(), content_hash(&p2).unwrap());
    }
}
