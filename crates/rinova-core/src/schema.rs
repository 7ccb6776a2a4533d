//! Versioned normalization of stored extraction documents.
//!
//! Extraction documents written by earlier releases differ from the current
//! shape: confidences were stored as `confidence_score` percentages, codes
//! lived in a flat `extracted_codes` list tagged by category, the result sat
//! under an `extraction_result` wrapper, and statuses were upper-case
//! literals. Every read goes through [`normalize_extraction`], which upgrades
//! a document to [`EXTRACTION_SCHEMA_VERSION`] and then sanitizes it, so query
//! code only ever sees one shape.

use serde_json::{Map, Value};

use crate::defaults::EXTRACTION_SCHEMA_VERSION;
use crate::error::Result;
use crate::ext_json::unwrap_extended;
use crate::models::{ExtractionResult, NoteStatus};
use crate::sanitize::sanitize_extraction;

const CODE_SECTIONS: [&str; 5] = [
    "icd10_codes",
    "cpt_codes",
    "alternative_cpts",
    "hcpcs_codes",
    "modifiers",
];

/// Read a stored extraction document of any known version.
pub fn normalize_extraction(raw: Value) -> Result<ExtractionResult> {
    let unwrapped = unwrap_extended(raw)?;
    sanitize_extraction(&upgrade(unwrapped))
}

/// Schema version recorded in a document; unversioned documents are 0.
pub fn document_version(doc: &Value) -> u64 {
    doc.get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Upgrade a raw document to the current schema version.
///
/// Documents already at the current version are returned unchanged.
pub fn upgrade(doc: Value) -> Value {
    if document_version(&doc) >= u64::from(EXTRACTION_SCHEMA_VERSION) {
        return doc;
    }
    let Value::Object(map) = doc else {
        return doc;
    };

    let mut map = unwrap_result_wrapper(map);
    split_extracted_codes(&mut map);
    for section in CODE_SECTIONS {
        if let Some(Value::Array(entries)) = map.get_mut(section) {
            for entry in entries.iter_mut() {
                upgrade_code_entry(entry);
            }
        }
    }
    map.insert(
        "schema_version".to_string(),
        Value::from(EXTRACTION_SCHEMA_VERSION),
    );
    Value::Object(map)
}

/// Map current and legacy status literals onto [`NoteStatus`].
pub fn normalize_status(raw: &str) -> Option<NoteStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" | "queued" => Some(NoteStatus::Pending),
        "in_progress" | "processing" | "running" => Some(NoteStatus::InProgress),
        "completed" | "complete" | "done" => Some(NoteStatus::Completed),
        "failed" | "error" => Some(NoteStatus::Failed),
        _ => None,
    }
}

fn unwrap_result_wrapper(mut map: Map<String, Value>) -> Map<String, Value> {
    let has_sections = CODE_SECTIONS.iter().any(|s| map.contains_key(*s));
    if has_sections {
        return map;
    }
    for key in ["extraction_result", "extraction", "data"] {
        if let Some(Value::Object(inner)) = map.remove(key) {
            let mut inner = inner;
            // Outer metadata wins over a missing inner one.
            if let Some(meta) = map.remove("metadata") {
                inner.entry("metadata").or_insert(meta);
            }
            return inner;
        }
    }
    map
}

fn split_extracted_codes(map: &mut Map<String, Value>) {
    let Some(Value::Array(flat)) = map.remove("extracted_codes") else {
        return;
    };
    for entry in flat {
        let category = entry
            .get("category")
            .or_else(|| entry.get("code_type"))
            .and_then(Value::as_str)
            .map(|s| s.to_ascii_lowercase().replace(['-', '_'], ""))
            .unwrap_or_default();
        let section = match category.as_str() {
            "icd10" | "icd" | "diagnosis" => "icd10_codes",
            "cpt" | "procedure" => "cpt_codes",
            "hcpcs" => "hcpcs_codes",
            "modifier" => "modifiers",
            // Unlabelled entries were diagnoses in the flat layout.
            _ => "icd10_codes",
        };
        if let Value::Array(list) = map
            .entry(section)
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            list.push(entry);
        }
    }
}

fn upgrade_code_entry(entry: &mut Value) {
    let Value::Object(obj) = entry else {
        return;
    };
    if !obj.contains_key("confidence") {
        if let Some(score) = obj.remove("confidence_score") {
            let fraction = match &score {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .map(|pct| pct / 100.0);
            if let Some(f) = fraction {
                obj.insert("confidence".to_string(), Value::from(f));
            }
        }
    }
    if let Some(Value::Array(alts)) = obj.get_mut("alternative_codes") {
        for alt in alts.iter_mut() {
            upgrade_code_entry(alt);
        }
    }
}
