//! Result store: a JSON file database keyed by kanji.
//!
//! The store is the durable mapping consumed by the downstream renderer.
//! Layout on disk:
//!
//! ```json
//! {
//!   "meta": {"version": 2, "total": 1026, "completed": 3, "last_updated": "..."},
//!   "kanji": {
//!     "水": {"grade": 1, "status": "completed", "attempts": 1, "backend": "claude", "data": {...}},
//!     "火": {"grade": 1, "status": "failed", "attempts": 4, "retryable": false, "error": {...}}
//!   }
//! }
//! ```
//!
//! Every `put` is a single-item upsert followed by an atomic
//! write-to-tempfile-then-rename of the whole database, so a crash never
//! leaves a partial record on disk. Concurrent workers serialize through the
//! mutex the orchestrator wraps around the store.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::BackendKind;
use crate::catalog::{Catalog, Item};
use crate::error::{ClassifiedError, RetryClass, StoreError};
use crate::schema::KanjiRecord;

/// Database format version written to `meta.version`.
const DB_FORMAT_VERSION: u32 = 2;

/// Persisted status of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

/// Final outcome of processing one item in a run.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Succeeded {
        record: KanjiRecord,
        backend: BackendKind,
        attempts: u32,
    },
    Failed {
        error: ClassifiedError,
        backend: BackendKind,
        attempts: u32,
        /// Failed attempts tallied per retry class. Each class is measured
        /// against its own ceiling, so a late-appearing class still gets its
        /// configured retries.
        attempts_by_class: BTreeMap<RetryClass, u32>,
        retryable: bool,
    },
}

/// One stored entry. `data` is set only for completed items, `error` only
/// for failed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub grade: u8,
    pub status: EntryStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attempts_by_class: BTreeMap<RetryClass, u32>,
    #[serde(default = "default_retryable")]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<KanjiRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_retryable() -> bool {
    true
}

impl StoredEntry {
    fn pending(grade: u8) -> Self {
        Self {
            grade,
            status: EntryStatus::Pending,
            attempts: 0,
            attempts_by_class: BTreeMap::new(),
            retryable: true,
            backend: None,
            data: None,
            error: None,
            updated_at: None,
        }
    }

    /// Whether this entry still needs work: pending, or failed but not
    /// terminal.
    pub fn needs_work(&self) -> bool {
        match self.status {
            EntryStatus::Pending => true,
            EntryStatus::Failed => self.retryable,
            EntryStatus::Completed => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Meta {
    version: u32,
    total: usize,
    completed: usize,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Database {
    meta: Meta,
    kanji: BTreeMap<String, StoredEntry>,
}

impl Database {
    fn empty() -> Self {
        Self {
            meta: Meta {
                version: DB_FORMAT_VERSION,
                total: 0,
                completed: 0,
                last_updated: Utc::now(),
            },
            kanji: BTreeMap::new(),
        }
    }
}

/// Per-status counts, reported by the CLI `status` subcommand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed_retryable: usize,
    pub failed_terminal: usize,
}

/// The file-backed result store.
pub struct ResultStore {
    path: PathBuf,
    db: Database,
}

impl ResultStore {
    /// Opens the store at `path`, loading the existing database or starting
    /// an empty one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` if the file exists but cannot be
    /// parsed, or `IoFailure` if it cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let db = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            Database::empty()
        };
        Ok(Self { path, db })
    }

    /// Seeds pending entries for every catalog item not yet present and
    /// refreshes `meta.total`. Existing entries are never touched.
    pub fn seed(&mut self, catalog: &Catalog) -> Result<(), StoreError> {
        let mut added = 0usize;
        for item in catalog.items() {
            self.db
                .kanji
                .entry(item.kanji.clone())
                .or_insert_with(|| {
                    added += 1;
                    StoredEntry::pending(item.grade)
                });
        }
        self.db.meta.total = self.db.kanji.len();
        if added > 0 {
            debug!(added, "Seeded new catalog items into the store");
            self.persist()?;
        }
        Ok(())
    }

    /// Returns the stored entry for one kanji.
    pub fn get(&self, kanji: &str) -> Option<&StoredEntry> {
        self.db.kanji.get(kanji)
    }

    /// Upserts the outcome for one item and persists the database.
    ///
    /// This is the only mutation path; the write is atomic with respect to
    /// readers of the file.
    pub fn put(&mut self, item: &Item, outcome: GenerationOutcome) -> Result<(), StoreError> {
        let entry = self
            .db
            .kanji
            .entry(item.kanji.clone())
            .or_insert_with(|| StoredEntry::pending(item.grade));

        match outcome {
            GenerationOutcome::Succeeded {
                record,
                backend,
                attempts,
            } => {
                entry.status = EntryStatus::Completed;
                entry.attempts = attempts;
                entry.attempts_by_class.clear();
                entry.retryable = false;
                entry.backend = Some(backend);
                entry.data = Some(record);
                entry.error = None;
            }
            GenerationOutcome::Failed {
                error,
                backend,
                attempts,
                attempts_by_class,
                retryable,
            } => {
                entry.status = EntryStatus::Failed;
                entry.attempts = attempts;
                entry.attempts_by_class = attempts_by_class;
                entry.retryable = retryable;
                entry.backend = Some(backend);
                entry.data = None;
                entry.error = Some(error);
            }
        }
        entry.updated_at = Some(Utc::now());

        self.db.meta.completed = self
            .db
            .kanji
            .values()
            .filter(|e| e.status == EntryStatus::Completed)
            .count();
        self.persist()
    }

    /// Per-status counts.
    pub fn counts(&self) -> StoreCounts {
        let mut counts = StoreCounts {
            total: self.db.kanji.len(),
            ..Default::default()
        };
        for entry in self.db.kanji.values() {
            match entry.status {
                EntryStatus::Pending => counts.pending += 1,
                EntryStatus::Completed => counts.completed += 1,
                EntryStatus::Failed if entry.retryable => counts.failed_retryable += 1,
                EntryStatus::Failed => counts.failed_terminal += 1,
            }
        }
        counts
    }

    /// The renderer view: validated records only, failures excluded.
    pub fn validated(&self) -> BTreeMap<String, &KanjiRecord> {
        self.db
            .kanji
            .iter()
            .filter_map(|(kanji, entry)| entry.data.as_ref().map(|r| (kanji.clone(), r)))
            .collect()
    }

    /// Writes the database atomically: serialize to a temp file in the same
    /// directory, then rename over the target.
    fn persist(&mut self) -> Result<(), StoreError> {
        self.db.meta.last_updated = Utc::now();

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(&self.db)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::WriteConflict(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{validate, SchemaVersion};
    use crate::extract::{CandidateDocument, ExtractionPath};

    fn item(kanji: &str) -> Item {
        Item {
            kanji: kanji.to_string(),
            grade: 1,
        }
    }

    fn sample_record() -> KanjiRecord {
        let text = serde_json::json!({
            "summary": "水",
            "readings": [{
                "kana": "すい", "romaji": "sui", "type": "on",
                "origin": "中古汉语", "usage": "音读词",
                "anchor": {"word": "水曜日", "reading": "すいようび", "meaning": "星期三", "hint": "水之日"},
                "examples": [
                    {"word": "水分", "reading": "すいぶん", "meaning": "水分", "link": "同音"},
                    {"word": "海水", "reading": "かいすい", "meaning": "海水", "link": "同音"}
                ]
            }],
            "composition": "独体字",
            "culture": "五行之一",
            "memory_chain": "河水 → すい"
        })
        .to_string();
        let doc = CandidateDocument {
            text,
            backend: BackendKind::Claude,
            path: ExtractionPath::PlainText,
        };
        validate(&doc, SchemaVersion::V2).unwrap()
    }

    fn temp_store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("db.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_seed_creates_pending_entries_once() {
        let (_dir, mut store) = temp_store();
        let catalog = Catalog::from_items(vec![item("水"), item("火")]);
        store.seed(&catalog).unwrap();

        assert_eq!(store.counts().pending, 2);
        assert_eq!(store.counts().total, 2);

        // Reseeding never resets existing entries.
        store
            .put(&item("水"), succeeded_outcome(&sample_record()))
            .unwrap();
        store.seed(&catalog).unwrap();
        assert_eq!(store.counts().completed, 1);
    }

    fn succeeded_outcome(record: &KanjiRecord) -> GenerationOutcome {
        GenerationOutcome::Succeeded {
            record: record.clone(),
            backend: BackendKind::Claude,
            attempts: 1,
        }
    }

    #[test]
    fn test_put_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let record = sample_record();

        {
            let mut store = ResultStore::open(&path).unwrap();
            store.seed(&Catalog::from_items(vec![item("水")])).unwrap();
            store.put(&item("水"), succeeded_outcome(&record)).unwrap();
        }

        let store = ResultStore::open(&path).unwrap();
        let entry = store.get("水").unwrap();
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.backend, Some(BackendKind::Claude));
        assert_eq!(entry.data.as_ref().unwrap(), &record);
    }

    #[test]
    fn test_failed_entries_track_retryability() {
        let (_dir, mut store) = temp_store();
        store
            .seed(&Catalog::from_items(vec![item("水"), item("火"), item("山")]))
            .unwrap();

        store
            .put(
                &item("火"),
                GenerationOutcome::Failed {
                    error: ClassifiedError::new(ErrorKind::Timeout, "timed out"),
                    backend: BackendKind::Codex,
                    attempts: 2,
                    attempts_by_class: BTreeMap::from([(RetryClass::Transient, 2)]),
                    retryable: true,
                },
            )
            .unwrap();
        store
            .put(
                &item("山"),
                GenerationOutcome::Failed {
                    error: ClassifiedError::new(ErrorKind::NotJson, "prose output"),
                    backend: BackendKind::Codex,
                    attempts: 2,
                    attempts_by_class: BTreeMap::from([(RetryClass::Format, 2)]),
                    retryable: false,
                },
            )
            .unwrap();

        let counts = store.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed_retryable, 1);
        assert_eq!(counts.failed_terminal, 1);

        // Terminal failures are excluded from the next run's work.
        assert!(store.get("水").unwrap().needs_work());
        assert!(store.get("火").unwrap().needs_work());
        assert!(!store.get("山").unwrap().needs_work());
    }

    #[test]
    fn test_validated_view_excludes_failures() {
        let (_dir, mut store) = temp_store();
        store
            .seed(&Catalog::from_items(vec![item("水"), item("火")]))
            .unwrap();
        store
            .put(&item("水"), succeeded_outcome(&sample_record()))
            .unwrap();
        store
            .put(
                &item("火"),
                GenerationOutcome::Failed {
                    error: ClassifiedError::new(ErrorKind::EmptyOutput, "empty"),
                    backend: BackendKind::Claude,
                    attempts: 4,
                    attempts_by_class: BTreeMap::from([(RetryClass::Transient, 4)]),
                    retryable: false,
                },
            )
            .unwrap();

        let view = store.validated();
        assert_eq!(view.len(), 1);
        assert!(view.contains_key("水"));
    }

    #[test]
    fn test_open_corrupt_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ResultStore::open(&path),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_error_message_preserved_verbatim() {
        let (_dir, mut store) = temp_store();
        store.seed(&Catalog::from_items(vec![item("火")])).unwrap();
        let message = "backend exited with code 7: connection reset";
        store
            .put(
                &item("火"),
                GenerationOutcome::Failed {
                    error: ClassifiedError::new(ErrorKind::BackendFailure, message),
                    backend: BackendKind::Codex,
                    attempts: 1,
                    attempts_by_class: BTreeMap::from([(RetryClass::Transient, 1)]),
                    retryable: true,
                },
            )
            .unwrap();
        assert_eq!(store.get("火").unwrap().error.as_ref().unwrap().message, message);
    }

    #[test]
    fn test_per_class_attempts_survive_reload_and_clear_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");

        {
            let mut store = ResultStore::open(&path).unwrap();
            store.seed(&Catalog::from_items(vec![item("火")])).unwrap();
            store
                .put(
                    &item("火"),
                    GenerationOutcome::Failed {
                        error: ClassifiedError::new(ErrorKind::Timeout, "timed out"),
                        backend: BackendKind::Claude,
                        attempts: 2,
                        attempts_by_class: BTreeMap::from([
                            (RetryClass::Transient, 1),
                            (RetryClass::Format, 1),
                        ]),
                        retryable: true,
                    },
                )
                .unwrap();
        }

        let mut store = ResultStore::open(&path).unwrap();
        let entry = store.get("火").unwrap();
        assert_eq!(entry.attempts_by_class.get(&RetryClass::Transient), Some(&1));
        assert_eq!(entry.attempts_by_class.get(&RetryClass::Format), Some(&1));

        store
            .put(&item("火"), succeeded_outcome(&sample_record()))
            .unwrap();
        assert!(store.get("火").unwrap().attempts_by_class.is_empty());
    }
}
