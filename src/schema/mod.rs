//! Structured record schema for generated kanji explanations.
//!
//! Two schema revisions are first-class:
//! - [`SchemaVersion::V1`]: a dedicated top-level `etymology` object is
//!   required.
//! - [`SchemaVersion::V2`]: etymology is folded into `summary` and the
//!   per-reading `origin` fields, so the top-level object is optional.
//!
//! The validator (see [`validate`]) checks structural conformance only; it
//! never judges whether an explanation is factually right.

mod validate;

use serde::{Deserialize, Serialize};

pub use validate::validate;

/// Which revision of the record schema a run validates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    /// Whether a top-level `etymology` object is required.
    pub fn requires_etymology(&self) -> bool {
        matches!(self, SchemaVersion::V1)
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
        }
    }
}

impl std::str::FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "v1" => Ok(SchemaVersion::V1),
            "2" | "v2" => Ok(SchemaVersion::V2),
            other => Err(format!("Unknown schema version: {}", other)),
        }
    }
}

/// On-reading vs. kun-reading.
///
/// Backends phrase this field in several ways (romanized, hyphenated, or in
/// CJK); aliases cover the forms seen in practice while serialization stays
/// canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingKind {
    #[serde(rename = "on", alias = "on-reading", alias = "音读", alias = "音読み")]
    On,
    #[serde(rename = "kun", alias = "kun-reading", alias = "训读", alias = "訓読み")]
    Kun,
}

/// The anchor word for a reading: one high-frequency word a learner pins the
/// reading to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub word: String,
    pub reading: String,
    pub meaning: String,
    pub hint: String,
}

/// An example word demonstrating a reading, linked back to the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub word: String,
    pub reading: String,
    pub meaning: String,
    pub link: String,
}

/// One reading of the kanji with its anchor word and examples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub kana: String,
    pub romaji: String,
    #[serde(rename = "type")]
    pub kind: ReadingKind,
    pub origin: String,
    pub usage: String,
    pub anchor: Anchor,
    pub examples: Vec<Example>,
}

/// Etymology of the character (schema v1 only).
///
/// The category is free-form text (pictograph, compound ideograph, ...);
/// the original prompt never pins a closed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Etymology {
    #[serde(rename = "type")]
    pub kind: String,
    pub explanation: String,
}

/// One graphical component of the character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub part: String,
    pub meaning: String,
    pub extension: String,
}

/// A schema-conformant kanji explanation. Immutable once constructed; the
/// only way to obtain one from untrusted text is [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanjiRecord {
    pub summary: String,
    pub readings: Vec<Reading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etymology: Option<Etymology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    pub composition: String,
    pub culture: String,
    pub memory_chain: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version_parse() {
        assert_eq!("1".parse::<SchemaVersion>().unwrap(), SchemaVersion::V1);
        assert_eq!("v2".parse::<SchemaVersion>().unwrap(), SchemaVersion::V2);
        assert!("3".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_schema_version_etymology_requirement() {
        assert!(SchemaVersion::V1.requires_etymology());
        assert!(!SchemaVersion::V2.requires_etymology());
    }

    #[test]
    fn test_reading_kind_aliases() {
        for raw in ["\"on\"", "\"on-reading\"", "\"音读\"", "\"音読み\""] {
            let kind: ReadingKind = serde_json::from_str(raw).unwrap();
            assert_eq!(kind, ReadingKind::On);
        }
        for raw in ["\"kun\"", "\"kun-reading\"", "\"训读\"", "\"訓読み\""] {
            let kind: ReadingKind = serde_json::from_str(raw).unwrap();
            assert_eq!(kind, ReadingKind::Kun);
        }
    }

    #[test]
    fn test_reading_kind_serializes_canonical() {
        assert_eq!(serde_json::to_string(&ReadingKind::On).unwrap(), "\"on\"");
        assert_eq!(serde_json::to_string(&ReadingKind::Kun).unwrap(), "\"kun\"");
    }
}
