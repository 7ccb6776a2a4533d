//! Sanitization of model-produced extraction payloads.
//!
//! The text-generation service returns JSON that is usually close to the
//! requested shape but cannot be trusted: confidences drift outside [0, 1] or
//! arrive as strings, lists turn into scalars, entries lose their code. This
//! module coerces such a payload into a canonical [`ExtractionResult`] in one
//! pass. Unusable child entries are dropped and logged; only a payload whose
//! top level is not an object is rejected.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::{
    AlternativeCode, CPTCode, DocumentationGap, Evidence, ExtractionMetadata, ExtractionResult,
    GapImpact, GapRecommendation, HCPCSCode, ICD10Code, Modifier,
};

type Object = Map<String, Value>;

/// Coerce an untyped payload into a canonical [`ExtractionResult`].
///
/// Returns [`Error::InvalidFormat`] only when `raw` is not a JSON object.
/// Sanitizing the serialized output again yields the same value.
pub fn sanitize_extraction(raw: &Value) -> Result<ExtractionResult> {
    let obj = raw.as_object().ok_or_else(|| {
        Error::InvalidFormat(format!(
            "extraction payload must be an object, got {}",
            json_kind(raw)
        ))
    })?;

    let mut s = Sanitizer::default();
    let result = ExtractionResult {
        schema_version: defaults::EXTRACTION_SCHEMA_VERSION,
        note_type: note_type(obj.get("note_type")),
        icd10_codes: s.collect(obj, "icd10_codes", icd10_code),
        cpt_codes: s.collect(obj, "cpt_codes", cpt_code),
        alternative_cpts: s.collect(obj, "alternative_cpts", alternative_code),
        hcpcs_codes: s.collect(obj, "hcpcs_codes", hcpcs_code),
        modifiers: s.collect(obj, "modifiers", modifier),
        documentation_gaps: s.collect(obj, "documentation_gaps", documentation_gap),
        metadata: obj
            .get("metadata")
            .and_then(Value::as_object)
            .map(metadata)
            .unwrap_or_default(),
    };

    debug!(
        subsystem = "core",
        component = "sanitize",
        note_type = %result.note_type,
        icd10_count = result.icd10_codes.len(),
        cpt_count = result.cpt_codes.len(),
        hcpcs_count = result.hcpcs_codes.len(),
        modifier_count = result.modifiers.len(),
        gap_count = result.documentation_gaps.len(),
        dropped_count = s.dropped,
        "Sanitized extraction payload"
    );

    Ok(result)
}

/// Clamp a confidence into [0, 1]; NaN falls back to the default.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        defaults::DEFAULT_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Default)]
struct Sanitizer {
    dropped: usize,
}

impl Sanitizer {
    /// Apply `parse` to every entry under `key`, skipping the ones it rejects.
    fn collect<T>(
        &mut self,
        obj: &Object,
        key: &str,
        parse: fn(&Value) -> Result<T>,
    ) -> Vec<T> {
        let Some(entries) = obj.get(key).and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match parse(entry) {
                Ok(item) => out.push(item),
                Err(e) => {
                    self.dropped += 1;
                    warn!(
                        subsystem = "core",
                        component = "sanitize",
                        section = key,
                        index,
                        error = %e,
                        "Dropped extraction entry"
                    );
                }
            }
        }
        out
    }
}

fn entry_object<'a>(entry: &'a Value, kind: &str) -> Result<&'a Object> {
    entry.as_object().ok_or_else(|| {
        Error::MalformedEntry(format!("{kind} entry is {}, not an object", json_kind(entry)))
    })
}

fn required_code(obj: &Object, keys: &[&str], kind: &str) -> Result<String> {
    let code = keys
        .iter()
        .find_map(|k| obj.get(*k))
        .map(|v| string(Some(v)))
        .unwrap_or_default();
    if code.is_empty() {
        return Err(Error::MalformedEntry(format!("{kind} entry has empty code")));
    }
    Ok(code)
}

fn icd10_code(entry: &Value) -> Result<ICD10Code> {
    let obj = entry_object(entry, "icd10")?;
    Ok(ICD10Code {
        code: required_code(obj, &["code"], "icd10")?,
        description: string(obj.get("description")),
        confidence: confidence(obj.get("confidence")),
        primary: boolean(obj.get("primary")),
        evidence: evidence(obj.get("evidence")),
        suggestions: string_list(obj.get("suggestions")),
    })
}

fn cpt_code(entry: &Value) -> Result<CPTCode> {
    let obj = entry_object(entry, "cpt")?;
    let code = required_code(obj, &["code"], "cpt")?;

    // Nested alternatives are filtered on their own; a bad one never drops the parent.
    let alternative_codes = obj
        .get("alternative_codes")
        .and_then(Value::as_array)
        .map(|alts| {
            alts.iter()
                .filter_map(|alt| match alternative_code(alt) {
                    Ok(a) => Some(a),
                    Err(e) => {
                        warn!(
                            subsystem = "core",
                            component = "sanitize",
                            parent = %code,
                            error = %e,
                            "Dropped alternative code"
                        );
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CPTCode {
        description: string(obj.get("description")),
        confidence: confidence(obj.get("confidence")),
        evidence: evidence(obj.get("evidence")),
        alternative_codes,
        suggestions: string_list(obj.get("suggestions")),
        code,
    })
}

fn alternative_code(entry: &Value) -> Result<AlternativeCode> {
    let obj = entry_object(entry, "alternative")?;
    Ok(AlternativeCode {
        code: required_code(obj, &["code"], "alternative")?,
        description: string(obj.get("description")),
        confidence: confidence(obj.get("confidence")),
        justification: string(obj.get("justification")),
        missing_documentation: string_list(obj.get("missing_documentation")),
    })
}

fn hcpcs_code(entry: &Value) -> Result<HCPCSCode> {
    let obj = entry_object(entry, "hcpcs")?;
    Ok(HCPCSCode {
        code: required_code(obj, &["code"], "hcpcs")?,
        description: string(obj.get("description")),
        confidence: confidence(obj.get("confidence")),
        suggestions: string_list(obj.get("suggestions")),
    })
}

fn modifier(entry: &Value) -> Result<Modifier> {
    let obj = entry_object(entry, "modifier")?;
    Ok(Modifier {
        modifier: required_code(obj, &["modifier", "code"], "modifier")?,
        description: string(obj.get("description")),
        confidence: confidence(obj.get("confidence")),
        suggestions: string_list(obj.get("suggestions")),
    })
}

fn documentation_gap(entry: &Value) -> Result<DocumentationGap> {
    let obj = entry_object(entry, "documentation gap")?;

    let severity = string(obj.get("severity")).to_lowercase();
    let impact = obj
        .get("impact")
        .and_then(Value::as_object)
        .map(|i| GapImpact {
            affected_codes: string_list(i.get("affected_codes")),
            current_limitation: string(i.get("current_limitation")),
            potential_improvement: string(i.get("potential_improvement")),
        })
        .unwrap_or_default();
    let recommendation = obj
        .get("recommendation")
        .and_then(Value::as_object)
        .map(|r| GapRecommendation {
            what_to_add: string(r.get("what_to_add")),
            example: string(r.get("example")),
            rationale: string(r.get("rationale")),
        })
        .unwrap_or_default();

    Ok(DocumentationGap {
        severity: if severity.is_empty() {
            defaults::DEFAULT_GAP_SEVERITY.to_string()
        } else {
            severity
        },
        description: string(obj.get("description")),
        impact,
        recommendation,
    })
}

fn evidence(value: Option<&Value>) -> Evidence {
    match value {
        Some(Value::Object(obj)) => Evidence {
            direct_quotes: string_list(obj.get("direct_quotes").or_else(|| obj.get("quotes"))),
            reasoning: string(obj.get("reasoning")),
            guidelines_applied: string_list(
                obj.get("guidelines_applied")
                    .or_else(|| obj.get("guidelines")),
            ),
        },
        Some(Value::String(_)) | Some(Value::Array(_)) => Evidence {
            direct_quotes: string_list(value),
            ..Evidence::default()
        },
        _ => Evidence::default(),
    }
}

fn metadata(obj: &Object) -> ExtractionMetadata {
    ExtractionMetadata {
        model_version: string(obj.get("model_version")),
        processing_time_ms: unsigned(obj.get("processing_time_ms")),
        timestamp: obj
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
        note_length: unsigned(obj.get("note_length")) as usize,
    }
}

fn note_type(value: Option<&Value>) -> String {
    let note_type = string(value).to_lowercase();
    if note_type.is_empty() {
        defaults::DEFAULT_NOTE_TYPE.to_string()
    } else {
        note_type
    }
}

// ─── Scalar coercion ───────────────────────────────────────────────────────

/// Trimmed string; numbers and booleans are rendered, anything else is empty.
fn string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// List of non-empty strings; a bare scalar becomes a one-element list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| string(Some(v)))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(v @ (Value::String(_) | Value::Number(_))) => {
            let s = string(Some(v));
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s]
            }
        }
        _ => Vec::new(),
    }
}

fn confidence(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .map(clamp_confidence)
        .unwrap_or(defaults::DEFAULT_CONFIDENCE)
}

fn boolean(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn unsigned(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sanitize(v: Value) -> ExtractionResult {
        sanitize_extraction(&v).unwrap()
    }

    #[test]
    fn test_empty_object_yields_defaults() {
        let result = sanitize(json!({}));
        assert_eq!(result.note_type, "brief");
        assert_eq!(result.schema_version, 1);
        assert!(result.icd10_codes.is_empty());
        assert!(result.cpt_codes.is_empty());
        assert!(result.alternative_cpts.is_empty());
        assert!(result.hcpcs_codes.is_empty());
        assert!(result.modifiers.is_empty());
        assert!(result.documentation_gaps.is_empty());
    }

    #[test]
    fn test_non_object_top_level_is_invalid_format() {
        for raw in [json!([]), json!("text"), json!(42), json!(null), json!(true)] {
            let err = sanitize_extraction(&raw).unwrap_err();
            assert!(matches!(err, Error::InvalidFormat(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn test_clamps_icd10_and_drops_empty_cpt() {
        let result = sanitize(json!({
            "icd10_codes": [{"code": "E11.9", "confidence": 1.5}],
            "cpt_codes": [{"code": "", "confidence": 0.9}]
        }));
        assert_eq!(result.icd10_codes.len(), 1);
        assert_eq!(result.icd10_codes[0].code, "E11.9");
        assert_eq!(result.icd10_codes[0].confidence, 1.0);
        assert!(result.cpt_codes.is_empty());
    }

    #[test]
    fn test_confidence_coercion() {
        let result = sanitize(json!({
            "icd10_codes": [
                {"code": "A", "confidence": -3},
                {"code": "B", "confidence": "0.75"},
                {"code": "C", "confidence": "high"},
                {"code": "D"},
                {"code": "E", "confidence": null},
                {"code": "F", "confidence": "NaN"},
                {"code": "G", "confidence": 0.42}
            ]
        }));
        let confidences: Vec<f64> = result.icd10_codes.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.0, 0.75, 0.5, 0.5, 0.5, 0.5, 0.42]);
    }

    #[test]
    fn test_codes_are_trimmed_and_whitespace_codes_dropped() {
        let result = sanitize(json!({
            "hcpcs_codes": [
                {"code": "  J1100 ", "description": " dexamethasone "},
                {"code": "   "},
                {"description": "no code at all"},
                "J3490",
                null
            ]
        }));
        assert_eq!(result.hcpcs_codes.len(), 1);
        assert_eq!(result.hcpcs_codes[0].code, "J1100");
        assert_eq!(result.hcpcs_codes[0].description, "dexamethasone");
    }

    #[test]
    fn test_numeric_code_is_stringified() {
        let result = sanitize(json!({"cpt_codes": [{"code": 99213}]}));
        assert_eq!(result.cpt_codes[0].code, "99213");
    }

    #[test]
    fn test_non_list_sections_are_empty() {
        let result = sanitize(json!({
            "icd10_codes": {"code": "E11.9"},
            "cpt_codes": "99213",
            "documentation_gaps": 3
        }));
        assert!(result.icd10_codes.is_empty());
        assert!(result.cpt_codes.is_empty());
        assert!(result.documentation_gaps.is_empty());
    }

    #[test]
    fn test_primary_flag_coercion() {
        let result = sanitize(json!({
            "icd10_codes": [
                {"code": "A", "primary": true},
                {"code": "B", "primary": "TRUE"},
                {"code": "C", "primary": 0},
                {"code": "D"}
            ]
        }));
        let flags: Vec<bool> = result.icd10_codes.iter().map(|c| c.primary).collect();
        assert_eq!(flags, vec![true, true, false, false]);
    }

    #[test]
    fn test_cpt_evidence_and_alternatives() {
        let result = sanitize(json!({
            "cpt_codes": [{
                "code": "99214",
                "confidence": 0.85,
                "evidence": {
                    "direct_quotes": ["BP 150/90", ""],
                    "reasoning": "moderate MDM",
                    "guidelines_applied": "E/M 2021"
                },
                "alternative_codes": [
                    {"code": "99213", "confidence": 2, "missing_documentation": ["time"]},
                    {"code": ""},
                    "junk"
                ]
            }]
        }));
        let cpt = &result.cpt_codes[0];
        assert_eq!(cpt.evidence.direct_quotes, vec!["BP 150/90"]);
        assert_eq!(cpt.evidence.reasoning, "moderate MDM");
        assert_eq!(cpt.evidence.guidelines_applied, vec!["E/M 2021"]);
        assert_eq!(cpt.alternative_codes.len(), 1);
        assert_eq!(cpt.alternative_codes[0].confidence, 1.0);
        assert_eq!(cpt.alternative_codes[0].missing_documentation, vec!["time"]);
    }

    #[test]
    fn test_malformed_evidence_defaults_without_dropping_parent() {
        let result = sanitize(json!({
            "cpt_codes": [
                {"code": "99213", "evidence": 17, "alternative_codes": "none"},
                {"code": "99214", "evidence": "pt reports chest pain"}
            ]
        }));
        assert_eq!(result.cpt_codes.len(), 2);
        assert_eq!(result.cpt_codes[0].evidence, Evidence::default());
        assert!(result.cpt_codes[0].alternative_codes.is_empty());
        assert_eq!(
            result.cpt_codes[1].evidence.direct_quotes,
            vec!["pt reports chest pain"]
        );
    }

    #[test]
    fn test_modifier_accepts_code_key() {
        let result = sanitize(json!({
            "modifiers": [{"modifier": "25"}, {"code": "59"}, {"description": "none"}]
        }));
        let mods: Vec<&str> = result.modifiers.iter().map(|m| m.modifier.as_str()).collect();
        assert_eq!(mods, vec!["25", "59"]);
    }

    #[test]
    fn test_note_type_is_lowercased_and_open() {
        assert_eq!(sanitize(json!({"note_type": " Comprehensive "})).note_type, "comprehensive");
        assert_eq!(sanitize(json!({"note_type": "Consult-Note"})).note_type, "consult-note");
        assert_eq!(sanitize(json!({"note_type": ""})).note_type, "brief");
        assert_eq!(sanitize(json!({"note_type": ["x"]})).note_type, "brief");
    }

    #[test]
    fn test_documentation_gap_defaults() {
        let result = sanitize(json!({
            "documentation_gaps": [
                {"description": "No HbA1c value"},
                {"severity": "MAJOR", "impact": {"affected_codes": ["E11.9"]},
                 "recommendation": {"what_to_add": "latest HbA1c"}},
                "free text gap"
            ]
        }));
        assert_eq!(result.documentation_gaps.len(), 2);
        let first = &result.documentation_gaps[0];
        assert_eq!(first.severity, "minor");
        assert_eq!(first.impact, GapImpact::default());
        assert_eq!(first.recommendation, GapRecommendation::default());
        let second = &result.documentation_gaps[1];
        assert_eq!(second.severity, "major");
        assert_eq!(second.impact.affected_codes, vec!["E11.9"]);
        assert_eq!(second.recommendation.what_to_add, "latest HbA1c");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let raw = json!({
            "note_type": "Comprehensive",
            "icd10_codes": [
                {"code": " I10 ", "confidence": "1.7", "primary": "true",
                 "evidence": {"quotes": ["BP elevated"]}},
                {"code": "", "confidence": 0.2}
            ],
            "cpt_codes": [{"code": 99214, "confidence": -1,
                "alternative_codes": [{"code": "99213", "justification": " lower MDM "}]}],
            "alternative_cpts": [{"code": "99215", "confidence": 0.3}],
            "hcpcs_codes": [{"code": "G0439"}],
            "modifiers": [{"code": "25", "confidence": 0.9}],
            "documentation_gaps": [{"severity": "Critical", "description": "x"}],
            "metadata": {"model_version": "1.0", "processing_time_ms": 1234,
                         "timestamp": "2024-03-01T12:00:00Z", "note_length": 80}
        });
        let once = sanitize(raw);
        let twice = sanitize(serde_json::to_value(&once).unwrap());
        assert_eq!(once, twice);
        assert_eq!(once.metadata.processing_time_ms, 1234);
        assert_eq!(once.metadata.note_length, 80);
    }

    #[test]
    fn test_all_confidences_within_unit_interval() {
        let inputs = [
            json!(-1e308),
            json!(1e308),
            json!("-0.0001"),
            json!("1.0001"),
            json!("inf"),
            json!({}),
            json!([]),
            json!(0.5),
        ];
        for input in inputs {
            let result = sanitize(json!({
                "icd10_codes": [{"code": "X", "confidence": input.clone()}],
                "modifiers": [{"modifier": "Y", "confidence": input}]
            }));
            for c in result.code_confidences().chain(result.modifiers.iter().map(|m| m.confidence)) {
                assert!((0.0..=1.0).contains(&c), "confidence {c} out of range");
            }
        }
    }

    #[test]
    fn test_clamp_confidence_nan() {
        assert_eq!(clamp_confidence(f64::NAN), 0.5);
        assert_eq!(clamp_confidence(f64::INFINITY), 1.0);
        assert_eq!(clamp_confidence(f64::NEG_INFINITY), 0.0);
    }
}
