use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Everything needed to resume a book: the committed position within the
/// saved chapter, the chapter itself, overall progress and a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub persistent_pos: usize,
    pub chapter_index: usize,
    pub progress: f64,
    pub friendly_name: String,
}

/// Per-book save records in `saves.json`, keyed by the book's content hash
/// in hex. Version-1 files keyed records by absolute path; those are still
/// readable and get migrated to the hash key on the next save.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    records: Mutex<HashMap<String, SaveRecord>>,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(err) => {
                    error!(%err, path = %path.display(), "unreadable save file; starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look a book up by content-hash key, falling back to the legacy
    /// path key. A legacy hit is migrated in memory immediately and hits
    /// disk with the next save.
    pub fn load(&self, book_id: &str, book_path: &Path) -> Option<SaveRecord> {
        let mut records = self.records.lock().ok()?;
        if let Some(record) = records.get(book_id) {
            return Some(record.clone());
        }
        let legacy_key = book_path.to_string_lossy().into_owned();
        if let Some(record) = records.remove(&legacy_key) {
            info!(book_id, "migrated v1 path-keyed save record");
            records.insert(book_id.to_string(), record.clone());
            return Some(record);
        }
        None
    }

    /// Insert or update a record and write the file. On an I/O error the
    /// record stays in memory and the caller's dirty flag should survive
    /// so the next idle tick retries.
    pub fn save(&self, book_id: &str, book_path: &Path, record: SaveRecord) -> std::io::Result<()> {
        let snapshot = {
            let Ok(mut records) = self.records.lock() else {
                return Err(std::io::Error::other("save store poisoned"));
            };
            let legacy_key = book_path.to_string_lossy().into_owned();
            records.remove(&legacy_key);
            records.insert(book_id.to_string(), record);
            records.clone()
        };
        self.write_file(&snapshot)
    }

    /// Write everything currently held; used on shutdown.
    pub fn flush(&self) -> std::io::Result<()> {
        let snapshot = {
            let Ok(records) = self.records.lock() else {
                return Err(std::io::Error::other("save store poisoned"));
            };
            records.clone()
        };
        self.write_file(&snapshot)
    }

    /// Atomic write-then-rename so a crash mid-write never clobbers the
    /// existing save file.
    fn write_file(&self, records: &HashMap<String, SaveRecord>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(records).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        if let Err(err) = fs::rename(&tmp, &self.path) {
            warn!(%err, "atomic rename failed; removing temp file");
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(())
    }
}
