//! Structural validation of candidate documents.
//!
//! Checks run in a fixed order and fail fast on the first violation:
//! JSON parse, required top-level field presence, then per-field shape.
//! A document that passes is deserialized into a typed [`KanjiRecord`];
//! downstream code never sees a record missing a field the renderer needs.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::extract::CandidateDocument;

use super::{KanjiRecord, SchemaVersion};

/// How much raw text to keep in a `NotJson` diagnostic.
const RAW_PREVIEW_CHARS: usize = 300;

/// Accepted spellings of the reading `type` field. Must stay in sync with
/// the serde aliases on [`super::ReadingKind`].
const READING_KINDS: &[&str] = &[
    "on",
    "on-reading",
    "音读",
    "音読み",
    "kun",
    "kun-reading",
    "训读",
    "訓読み",
];

/// Validates a candidate document against the given schema version.
///
/// # Errors
///
/// - `NotJson` when the text does not parse (raw preview preserved)
/// - `MissingField` when a required field is absent (dotted path)
/// - `ShapeMismatch` when a field has the wrong type, is empty, or violates
///   a length constraint
pub fn validate(
    doc: &CandidateDocument,
    version: SchemaVersion,
) -> Result<KanjiRecord, ValidationError> {
    let value: Value =
        serde_json::from_str(&doc.text).map_err(|e| ValidationError::NotJson {
            reason: e.to_string(),
            raw_preview: preview(&doc.text),
        })?;

    let obj = value
        .as_object()
        .ok_or_else(|| shape("$", "expected a JSON object"))?;

    // Presence of every required top-level field is checked before any
    // shape, so a missing field is always reported as MissingField no
    // matter what else is wrong.
    let mut required = vec!["summary", "readings"];
    if version.requires_etymology() {
        required.push("etymology");
    }
    required.extend(["composition", "culture", "memory_chain"]);
    for field in required {
        if !obj.contains_key(field) {
            return Err(ValidationError::MissingField(field.to_string()));
        }
    }

    require_nonempty_string(obj, "", "summary")?;

    let readings = obj["readings"]
        .as_array()
        .ok_or_else(|| shape("readings", "expected an array"))?;
    if readings.is_empty() {
        return Err(shape("readings", "must contain at least one reading"));
    }
    for (i, reading) in readings.iter().enumerate() {
        check_reading(i, reading)?;
    }

    match obj.get("etymology") {
        Some(ety) if !ety.is_null() => check_etymology(ety)?,
        Some(_) | None if version.requires_etymology() => {
            return Err(shape("etymology", "expected an object"));
        }
        _ => {}
    }

    if let Some(components) = obj.get("components").filter(|v| !v.is_null()) {
        check_components(components)?;
    }

    require_nonempty_string(obj, "", "composition")?;
    require_nonempty_string(obj, "", "culture")?;
    require_nonempty_string(obj, "", "memory_chain")?;

    serde_json::from_value(value).map_err(|e| shape("$", e.to_string()))
}

fn check_reading(index: usize, value: &Value) -> Result<(), ValidationError> {
    let path = format!("readings[{}]", index);
    let obj = value
        .as_object()
        .ok_or_else(|| shape(&path, "expected an object"))?;

    require_nonempty_string(obj, &path, "kana")?;
    require_string(obj, &path, "romaji")?;
    require_string(obj, &path, "origin")?;
    require_string(obj, &path, "usage")?;

    let kind = require_string(obj, &path, "type")?;
    if !READING_KINDS.contains(&kind) {
        return Err(shape(
            &format!("{}.type", path),
            format!("expected an on/kun reading kind, got '{}'", kind),
        ));
    }

    let anchor_path = format!("{}.anchor", path);
    let anchor = require_member(obj, &path, "anchor")?
        .as_object()
        .ok_or_else(|| shape(&anchor_path, "expected an object"))?;
    for field in ["word", "reading", "meaning", "hint"] {
        require_string(anchor, &anchor_path, field)?;
    }

    let examples_path = format!("{}.examples", path);
    let examples = require_member(obj, &path, "examples")?
        .as_array()
        .ok_or_else(|| shape(&examples_path, "expected an array"))?;
    if examples.len() < 2 {
        return Err(shape(
            &examples_path,
            format!("at least 2 example words are required, got {}", examples.len()),
        ));
    }
    for (i, example) in examples.iter().enumerate() {
        let example_path = format!("{}[{}]", examples_path, i);
        let example = example
            .as_object()
            .ok_or_else(|| shape(&example_path, "expected an object"))?;
        for field in ["word", "reading", "meaning", "link"] {
            require_string(example, &example_path, field)?;
        }
    }

    Ok(())
}

fn check_etymology(value: &Value) -> Result<(), ValidationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| shape("etymology", "expected an object"))?;
    require_nonempty_string(obj, "etymology", "type")?;
    require_nonempty_string(obj, "etymology", "explanation")?;
    Ok(())
}

fn check_components(value: &Value) -> Result<(), ValidationError> {
    let components = value
        .as_array()
        .ok_or_else(|| shape("components", "expected an array"))?;
    for (i, component) in components.iter().enumerate() {
        let path = format!("components[{}]", i);
        let obj = component
            .as_object()
            .ok_or_else(|| shape(&path, "expected an object"))?;
        for field in ["part", "meaning", "extension"] {
            require_string(obj, &path, field)?;
        }
    }
    Ok(())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn require_member<'a>(
    obj: &'a Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<&'a Value, ValidationError> {
    obj.get(key)
        .ok_or_else(|| ValidationError::MissingField(join_path(prefix, key)))
}

fn require_string<'a>(
    obj: &'a Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<&'a str, ValidationError> {
    let value = require_member(obj, prefix, key)?;
    value
        .as_str()
        .ok_or_else(|| shape(&join_path(prefix, key), "expected a string"))
}

fn require_nonempty_string<'a>(
    obj: &'a Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<&'a str, ValidationError> {
    let value = require_string(obj, prefix, key)?;
    if value.trim().is_empty() {
        return Err(shape(&join_path(prefix, key), "must not be empty"));
    }
    Ok(value)
}

fn shape(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::ShapeMismatch {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= RAW_PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(RAW_PREVIEW_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::extract::ExtractionPath;
    use serde_json::json;

    fn candidate(text: String) -> CandidateDocument {
        CandidateDocument {
            text,
            backend: BackendKind::Claude,
            path: ExtractionPath::PlainText,
        }
    }

    fn sample(with_etymology: bool) -> Value {
        let mut value = json!({
            "summary": "表示水、液体的基本汉字",
            "readings": [
                {
                    "kana": "すい",
                    "romaji": "sui",
                    "type": "on",
                    "origin": "中古汉语读音",
                    "usage": "多用于音读复合词",
                    "anchor": {
                        "word": "水曜日",
                        "reading": "すいようび",
                        "meaning": "星期三",
                        "hint": "水的日子"
                    },
                    "examples": [
                        {"word": "水分", "reading": "すいぶん", "meaning": "水分", "link": "与锚点同音"},
                        {"word": "海水", "reading": "かいすい", "meaning": "海水", "link": "同为音读"}
                    ]
                }
            ],
            "components": [
                {"part": "水", "meaning": "水流", "extension": "独体象形字"}
            ],
            "composition": "独体字，无构件组合",
            "culture": "五行之一，日本周三以水命名",
            "memory_chain": "河水流动 → 水曜日 → すい"
        });
        if with_etymology {
            value["etymology"] = json!({
                "type": "象形字",
                "explanation": "字形描绘流动的河水"
            });
        }
        value
    }

    #[test]
    fn test_valid_v2_document() {
        let doc = candidate(sample(false).to_string());
        let record = validate(&doc, SchemaVersion::V2).unwrap();
        assert_eq!(record.readings.len(), 1);
        assert!(record.etymology.is_none());
        assert_eq!(record.readings[0].examples.len(), 2);
    }

    #[test]
    fn test_valid_v1_document() {
        let doc = candidate(sample(true).to_string());
        let record = validate(&doc, SchemaVersion::V1).unwrap();
        assert_eq!(record.etymology.unwrap().kind, "象形字");
    }

    #[test]
    fn test_v1_requires_etymology() {
        let doc = candidate(sample(false).to_string());
        assert_eq!(
            validate(&doc, SchemaVersion::V1).unwrap_err(),
            ValidationError::MissingField("etymology".to_string())
        );
    }

    #[test]
    fn test_v2_accepts_etymology_when_present() {
        let doc = candidate(sample(true).to_string());
        let record = validate(&doc, SchemaVersion::V2).unwrap();
        assert!(record.etymology.is_some());
    }

    #[test]
    fn test_missing_memory_chain() {
        let mut value = sample(false);
        value.as_object_mut().unwrap().remove("memory_chain");
        let doc = candidate(value.to_string());
        assert_eq!(
            validate(&doc, SchemaVersion::V2).unwrap_err(),
            ValidationError::MissingField("memory_chain".to_string())
        );
    }

    #[test]
    fn test_single_example_is_shape_mismatch() {
        let mut value = sample(false);
        let examples = &mut value["readings"][0]["examples"];
        *examples = json!([examples[0].clone()]);
        let doc = candidate(value.to_string());
        match validate(&doc, SchemaVersion::V2).unwrap_err() {
            ValidationError::ShapeMismatch { field, .. } => {
                assert_eq!(field, "readings[0].examples");
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_readings_is_shape_mismatch() {
        let mut value = sample(false);
        value["readings"] = json!([]);
        let doc = candidate(value.to_string());
        assert!(matches!(
            validate(&doc, SchemaVersion::V2).unwrap_err(),
            ValidationError::ShapeMismatch { field, .. } if field == "readings"
        ));
    }

    #[test]
    fn test_empty_kana_is_shape_mismatch() {
        let mut value = sample(false);
        value["readings"][0]["kana"] = json!("  ");
        let doc = candidate(value.to_string());
        assert!(matches!(
            validate(&doc, SchemaVersion::V2).unwrap_err(),
            ValidationError::ShapeMismatch { field, .. } if field == "readings[0].kana"
        ));
    }

    #[test]
    fn test_missing_anchor_hint() {
        let mut value = sample(false);
        value["readings"][0]["anchor"]
            .as_object_mut()
            .unwrap()
            .remove("hint");
        let doc = candidate(value.to_string());
        assert_eq!(
            validate(&doc, SchemaVersion::V2).unwrap_err(),
            ValidationError::MissingField("readings[0].anchor.hint".to_string())
        );
    }

    #[test]
    fn test_unknown_reading_kind() {
        let mut value = sample(false);
        value["readings"][0]["type"] = json!("nanori");
        let doc = candidate(value.to_string());
        assert!(matches!(
            validate(&doc, SchemaVersion::V2).unwrap_err(),
            ValidationError::ShapeMismatch { field, .. } if field == "readings[0].type"
        ));
    }

    #[test]
    fn test_not_json_preserves_preview() {
        let doc = candidate("I could not produce the answer.".to_string());
        match validate(&doc, SchemaVersion::V2).unwrap_err() {
            ValidationError::NotJson { raw_preview, .. } => {
                assert_eq!(raw_preview, "I could not produce the answer.");
            }
            other => panic!("expected NotJson, got {:?}", other),
        }
    }

    #[test]
    fn test_not_json_preview_is_truncated() {
        let doc = candidate("x".repeat(1000));
        match validate(&doc, SchemaVersion::V2).unwrap_err() {
            ValidationError::NotJson { raw_preview, .. } => {
                assert_eq!(raw_preview.chars().count(), RAW_PREVIEW_CHARS);
            }
            other => panic!("expected NotJson, got {:?}", other),
        }
    }

    #[test]
    fn test_top_level_array_is_shape_mismatch() {
        let doc = candidate("[1, 2, 3]".to_string());
        assert!(matches!(
            validate(&doc, SchemaVersion::V2).unwrap_err(),
            ValidationError::ShapeMismatch { field, .. } if field == "$"
        ));
    }

    #[test]
    fn test_validation_is_idempotent_over_serialized_records() {
        for version in [SchemaVersion::V1, SchemaVersion::V2] {
            let doc = candidate(sample(version.requires_etymology()).to_string());
            let record = validate(&doc, version).unwrap();
            let reserialized = candidate(serde_json::to_string(&record).unwrap());
            let record2 = validate(&reserialized, version).unwrap();
            assert_eq!(record, record2);
        }
    }
}
