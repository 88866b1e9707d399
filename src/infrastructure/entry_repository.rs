use crate::domain::models::Entry;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Persistence seam for the entry list. Saves are best-effort caching; the
/// engine swallows save failures and never blocks scheduling on them.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    async fn load(&self) -> Result<Vec<Entry>, InfraError>;
    async fn save(&self, entries: &[Entry]) -> Result<(), InfraError>;
}

/// Stores the full entry list as one pretty-printed JSON array. A missing
/// file reads as an empty list; a malformed file is a load error the engine
/// turns into an empty store.
#[derive(Debug, Clone)]
pub struct JsonFileEntryRepository {
    path: PathBuf,
}

impl JsonFileEntryRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EntryRepository for JsonFileEntryRepository {
    async fn load(&self) -> Result<Vec<Entry>, InfraError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let entries: Vec<Entry> = serde_json::from_str(&raw)?;
        Ok(dedupe_by_id(entries))
    }

    async fn save(&self, entries: &[Entry]) -> Result<(), InfraError> {
        let formatted = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, format!("{formatted}\n"))?;
        Ok(())
    }
}

/// In-memory stand-in used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryEntryRepository {
    entries: Mutex<Vec<Entry>>,
}

impl InMemoryEntryRepository {
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn stored(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntryRepository for InMemoryEntryRepository {
    async fn load(&self) -> Result<Vec<Entry>, InfraError> {
        let entries = self
            .entries
            .lock()
            .map_err(|error| InfraError::State(format!("entry store lock poisoned: {error}")))?;
        Ok(dedupe_by_id(entries.clone()))
    }

    async fn save(&self, entries: &[Entry]) -> Result<(), InfraError> {
        let mut stored = self
            .entries
            .lock()
            .map_err(|error| InfraError::State(format!("entry store lock poisoned: {error}")))?;
        *stored = entries.to_vec();
        Ok(())
    }
}

// Ids must be unique within the store; when a persisted list disagrees the
// newest record wins and earlier duplicates are dropped.
fn dedupe_by_id(entries: Vec<Entry>) -> Vec<Entry> {
    let total = entries.len();
    let mut seen = HashSet::new();
    let mut deduped: Vec<Entry> = entries
        .into_iter()
        .rev()
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect();
    deduped.reverse();
    let dropped = total - deduped.len();
    if dropped > 0 {
        warn!(dropped, "dropped duplicate entry ids while loading");
    }
    deduped
}
