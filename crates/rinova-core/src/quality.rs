//! Documentation quality scoring and in-memory dashboard aggregation.
//!
//! Each score is a fraction in [0, 1] per note; the dashboard reports the
//! mean over completed notes as a percentage. All divisions are guarded so an
//! empty collection produces zeros.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::models::{
    CodeCategory, CodeFrequency, DailyCount, DashboardStats, ExtractionResult, MedicalNote,
    NoteStatus, QualityScores,
};

const COMPLETENESS_NO_GAPS: f64 = 0.4;
const COMPLETENESS_CONFIDENCE: f64 = 0.3;
const COMPLETENESS_EVIDENCE: f64 = 0.3;

const ACCURACY_CONFIDENCE: f64 = 0.7;
const ACCURACY_EVIDENCE: f64 = 0.3;

const RETRY_PENALTY: f64 = 0.1;

/// 0.4 for no gaps, 0.3 × mean confidence, 0.3 if any code cites a quote.
pub fn completeness_score(result: &ExtractionResult) -> f64 {
    let no_gaps = if result.documentation_gaps.is_empty() { 1.0 } else { 0.0 };
    let evidence = if result.has_any_evidence() { 1.0 } else { 0.0 };
    (COMPLETENESS_NO_GAPS * no_gaps
        + COMPLETENESS_CONFIDENCE * result.average_confidence()
        + COMPLETENESS_EVIDENCE * evidence)
        .clamp(0.0, 1.0)
}

/// 0.7 × mean confidence, 0.3 if every code cites a quote.
pub fn accuracy_score(result: &ExtractionResult) -> f64 {
    let evidence = if result.all_codes_have_evidence() { 1.0 } else { 0.0 };
    (ACCURACY_CONFIDENCE * result.average_confidence() + ACCURACY_EVIDENCE * evidence)
        .clamp(0.0, 1.0)
}

/// Tiered turnaround score less 0.1 per retry beyond the first attempt.
pub fn timeliness_score(turnaround_secs: f64, attempts: i32) -> f64 {
    let tier = if turnaround_secs < 5.0 {
        1.0
    } else if turnaround_secs < 10.0 {
        0.8
    } else if turnaround_secs < 30.0 {
        0.6
    } else {
        0.4
    };
    let retries = (attempts - 1).max(0) as f64;
    (tier - RETRY_PENALTY * retries).clamp(0.0, 1.0)
}

/// Percentage of `part` in `total`, 0 when `total` is 0.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Completed share of finished notes, as a percentage.
pub fn success_rate(completed: i64, failed: i64) -> f64 {
    percentage(completed, completed + failed)
}

/// Running sums for the three quality scores.
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityAccumulator {
    completeness: f64,
    accuracy: f64,
    timeliness: f64,
    count: u64,
}

impl QualityAccumulator {
    pub fn add(&mut self, result: &ExtractionResult, turnaround_secs: f64, attempts: i32) {
        self.completeness += completeness_score(result);
        self.accuracy += accuracy_score(result);
        self.timeliness += timeliness_score(turnaround_secs, attempts);
        self.count += 1;
    }

    /// Add a note when it is completed and carries a result.
    pub fn add_note(&mut self, note: &MedicalNote) {
        if note.status != NoteStatus::Completed {
            return;
        }
        if let Some(result) = &note.extraction {
            self.add(result, note.turnaround_secs(), note.extraction_attempts);
        }
    }

    pub fn finish(self) -> QualityScores {
        if self.count == 0 {
            return QualityScores::default();
        }
        let n = self.count as f64;
        QualityScores {
            completeness: (self.completeness / n * 100.0).clamp(0.0, 100.0),
            accuracy: (self.accuracy / n * 100.0).clamp(0.0, 100.0),
            timeliness: (self.timeliness / n * 100.0).clamp(0.0, 100.0),
        }
    }
}

/// Per-status counts with every status present, zero-filled.
pub fn status_breakdown<I>(counts: I) -> BTreeMap<String, i64>
where
    I: IntoIterator<Item = (NoteStatus, i64)>,
{
    let mut out: BTreeMap<String, i64> = NoteStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for (status, count) in counts {
        *out.entry(status.as_str().to_string()).or_default() += count;
    }
    out
}

/// Convert status counts into percentages of `total`.
pub fn status_percentages(counts: &BTreeMap<String, i64>, total: i64) -> BTreeMap<String, f64> {
    counts
        .iter()
        .map(|(k, v)| (k.clone(), percentage(*v, total)))
        .collect()
}

impl DashboardStats {
    /// Aggregate a slice of already filtered notes.
    pub fn from_notes(notes: &[MedicalNote], top_n: usize) -> Self {
        let total = notes.len() as i64;

        let status_counts = status_breakdown(notes.iter().map(|n| (n.status, 1)));
        let completed = status_counts.get("completed").copied().unwrap_or(0);
        let failed = status_counts.get("failed").copied().unwrap_or(0);

        let mut note_type_counts = BTreeMap::new();
        let mut daily: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        let mut codes: HashMap<(CodeCategory, String), (String, i64)> = HashMap::new();
        let mut processing_total = 0.0;
        let mut processing_count = 0u64;
        let mut quality = QualityAccumulator::default();

        // Earliest first, so each top code keeps its first-seen description.
        let mut ordered: Vec<&MedicalNote> = notes.iter().collect();
        ordered.sort_by_key(|n| (n.created_at, n.id));

        for note in ordered {
            *daily.entry(note.created_at.date_naive()).or_default() += 1;
            quality.add_note(note);

            let Some(result) = &note.extraction else {
                continue;
            };
            *note_type_counts.entry(result.note_type.clone()).or_default() += 1;
            if note.status == NoteStatus::Completed {
                processing_total += result.metadata.processing_time_ms as f64;
                processing_count += 1;
            }

            let entries = result
                .icd10_codes
                .iter()
                .map(|c| (CodeCategory::Icd10, &c.code, &c.description))
                .chain(
                    result
                        .cpt_codes
                        .iter()
                        .map(|c| (CodeCategory::Cpt, &c.code, &c.description)),
                )
                .chain(
                    result
                        .hcpcs_codes
                        .iter()
                        .map(|c| (CodeCategory::Hcpcs, &c.code, &c.description)),
                );
            for (category, code, description) in entries {
                let slot = codes
                    .entry((category, code.clone()))
                    .or_insert_with(|| (description.clone(), 0));
                slot.1 += 1;
            }
        }

        let mut top_codes: Vec<CodeFrequency> = codes
            .into_iter()
            .map(|((category, code), (description, count))| CodeFrequency {
                code,
                category,
                description,
                count,
            })
            .collect();
        top_codes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
        top_codes.truncate(top_n);

        Self {
            total_notes: total,
            status_percentages: status_percentages(&status_counts, total),
            status_counts,
            note_type_counts,
            success_rate: success_rate(completed, failed),
            avg_processing_time_ms: if processing_count == 0 {
                0.0
            } else {
                processing_total / processing_count as f64
            },
            top_codes,
            daily_counts: daily
                .into_iter()
                .map(|(date, count)| DailyCount { date, count })
                .collect(),
            quality: quality.finish(),
        }
    }
}
