//! Item catalog loaded from the external scraping step.
//!
//! The catalog file maps school grades to kanji lists:
//!
//! ```json
//! {"total": 1026, "by_grade": {"1": ["一", "右"], "2": ["引"]}}
//! ```
//!
//! The catalog is read once at startup and is read-only afterwards. Its order
//! (grade, then kanji) defines the default processing order only; correctness
//! never depends on it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog contains no items")]
    Empty,

    #[error("invalid grade key '{0}': expected an integer 1-6")]
    InvalidGrade(String),
}

/// A single catalog entry: one kanji and the school grade it is taught in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub kanji: String,
    pub grade: u8,
}

/// On-disk catalog shape.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[allow(dead_code)]
    total: Option<usize>,
    by_grade: BTreeMap<String, Vec<String>>,
}

/// The full item catalog, sorted by (grade, kanji).
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    /// Loads the catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the file cannot be read or parsed, contains
    /// no items, or has a non-numeric grade key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&text)?;

        let mut items = Vec::new();
        for (grade_key, kanji_list) in &file.by_grade {
            let grade: u8 = grade_key
                .parse()
                .map_err(|_| CatalogError::InvalidGrade(grade_key.clone()))?;
            for kanji in kanji_list {
                items.push(Item {
                    kanji: kanji.clone(),
                    grade,
                });
            }
        }

        if items.is_empty() {
            return Err(CatalogError::Empty);
        }

        items.sort_by(|a, b| (a.grade, &a.kanji).cmp(&(b.grade, &b.kanji)));
        Ok(Self { items })
    }

    /// Builds a catalog directly from items. Used for single-item runs and
    /// in tests.
    pub fn from_items(mut items: Vec<Item>) -> Self {
        items.sort_by(|a, b| (a.grade, &a.kanji).cmp(&(b.grade, &b.kanji)));
        Self { items }
    }

    /// Returns all items in processing order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Looks up a single item by its kanji.
    pub fn find(&self, kanji: &str) -> Option<&Item> {
        self.items.iter().find(|it| it.kanji == kanji)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
