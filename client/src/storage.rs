//! Durable storage for the queue snapshot.
//!
//! The sync engine saves a [`QueueSnapshot`] after every mutation and loads
//! it once at startup. Storage is deliberately dumb: it moves bytes, and the
//! engine decides what the bytes mean.

use crate::error::Result;
use ferry_engine::QueueSnapshot;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Where the queue lives between runs.
pub trait QueueStorage: Send + Sync + 'static {
    /// Load the last saved snapshot, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<QueueSnapshot>>;

    /// Replace the saved snapshot.
    fn save(&self, snapshot: &QueueSnapshot) -> Result<()>;
}

/// JSON file storage.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl QueueStorage for FileStorage {
    fn load(&self) -> Result<Option<QueueSnapshot>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if json.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(QueueSnapshot::from_json(&json)?))
    }

    fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();

        let mut file = std::fs::File::create(&temp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            operations = snapshot.operations.len(),
            "Queue snapshot saved"
        );
        Ok(())
    }
}

/// In-memory storage for tests and embedding.
///
/// Stores the serialized form so that a load goes through the same
/// validation as a file would.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    json: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the storage with a snapshot.
    pub fn with_snapshot(snapshot: &QueueSnapshot) -> Result<Self> {
        let storage = Self::new();
        storage.save(snapshot)?;
        Ok(storage)
    }

    /// The raw JSON last saved.
    pub fn raw(&self) -> Option<String> {
        self.json.lock().map(|json| json.clone()).unwrap_or_default()
    }
}

impl QueueStorage for MemoryStorage {
    fn load(&self) -> Result<Option<QueueSnapshot>> {
        match self.raw() {
            Some(json) => Ok(Some(QueueSnapshot::from_json(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        let json = snapshot.to_json()?;
        if let Ok(mut slot) = self.json.lock() {
            *slot = Some(json);
        }
        Ok(())
    }
}
