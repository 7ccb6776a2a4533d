//! Query parameter types with user-facing validation.
//!
//! Axum's own deserialization errors are terse, so date values are parsed by
//! [`FlexibleDateTime`] with a message listing accepted formats, and range
//! checks on paging parameters produce `InvalidInput` (422).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Deref;
use utoipa::IntoParams;

use rinova_core::{
    defaults, normalize_status, DashboardRequest, Error, ListNotesRequest, NoteFilter,
    NoteSortField, Result, SortOrder, Timeframe,
};

/// A UTC timestamp accepting several spellings.
///
/// Accepts:
/// - RFC 3339: `2026-01-15T10:30:00Z`, `2026-01-15T10:30:00+02:00`
/// - ISO 8601 without timezone (UTC assumed): `2026-01-15T10:30:00`
/// - Date only (midnight UTC): `2026-01-15`
/// - Relative shorthand: `7d`, `1w`, `12h`, `30min`
/// - `now`, `today`, `yesterday`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexibleDateTime(pub DateTime<Utc>);

impl FlexibleDateTime {
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Deref for FlexibleDateTime {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for FlexibleDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for FlexibleDateTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_flexible_datetime(&s, Utc::now()).map_err(de::Error::custom)
    }
}

/// Parse a datetime relative to `now`.
fn parse_flexible_datetime(
    s: &str,
    now: DateTime<Utc>,
) -> std::result::Result<FlexibleDateTime, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Date value cannot be empty. Expected ISO 8601 (e.g. '2026-01-15T10:30:00Z') or shorthand (e.g. '7d')".to_string());
    }

    let s_lower = s.to_lowercase();
    let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    match s_lower.as_str() {
        "now" => return Ok(FlexibleDateTime(now)),
        "today" => {
            if let Some(dt) = midnight(now.date_naive()) {
                return Ok(FlexibleDateTime(dt));
            }
        }
        "yesterday" => {
            if let Some(dt) = midnight(now.date_naive() - Duration::days(1)) {
                return Ok(FlexibleDateTime(dt));
            }
        }
        _ => {}
    }

    if let Some(ago) = parse_relative_shorthand(&s_lower)? {
        return now
            .checked_sub_signed(ago)
            .map(FlexibleDateTime)
            .ok_or_else(|| format!("Relative date '{s}' reaches too far back"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(FlexibleDateTime(dt.with_timezone(&Utc)));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(FlexibleDateTime(naive.and_utc()));
        }
    }

    if let Some(dt) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(midnight)
    {
        return Ok(FlexibleDateTime(dt));
    }

    Err(format!(
        "Invalid date format: '{}'. Examples: '2026-01-15T10:30:00Z', \
        '2026-01-15T10:30:00' (UTC), '2026-01-15', '7d', 'yesterday'",
        s
    ))
}

/// Parse `7d`, `1w`, `2h`, `30min` into a look-back duration.
///
/// `Ok(None)` when `s` is not shorthand at all; an error when it is but the
/// amount does not fit in a duration.
fn parse_relative_shorthand(s: &str) -> std::result::Result<Option<Duration>, String> {
    let Some(split) = s.find(|c: char| !c.is_ascii_digit()) else {
        return Ok(None);
    };
    let (num, unit) = s.split_at(split);
    if num.is_empty() {
        return Ok(None);
    }
    let build: fn(i64) -> Option<Duration> = match unit {
        "min" | "mins" | "minute" | "minutes" => Duration::try_minutes,
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::try_hours,
        "d" | "day" | "days" => Duration::try_days,
        "w" | "wk" | "week" | "weeks" => Duration::try_weeks,
        _ => return Ok(None),
    };
    num.parse::<i64>()
        .ok()
        .and_then(build)
        .map(Some)
        .ok_or_else(|| format!("Relative date '{s}' is out of range"))
}

// =============================================================================
// FILTERS AND PAGING
// =============================================================================

/// Build a [`NoteFilter`] from raw query values.
fn build_filter(
    note_type: &Option<String>,
    status: &Option<String>,
    start_date: Option<FlexibleDateTime>,
    end_date: Option<FlexibleDateTime>,
    search: &Option<String>,
    has_gaps: Option<bool>,
    patient_id: &Option<String>,
) -> Result<NoteFilter> {
    let mut filter = NoteFilter::new().created_between(
        start_date.map(FlexibleDateTime::into_inner),
        end_date.map(FlexibleDateTime::into_inner),
    );

    if let (Some(after), Some(before)) = (filter.created_after, filter.created_before) {
        if after > before {
            return Err(Error::InvalidInput(
                "start_date must not be after end_date".to_string(),
            ));
        }
    }
    if let Some(t) = note_type {
        filter = filter.with_note_type(t.as_str());
    }
    if let Some(raw) = status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = normalize_status(raw).ok_or_else(|| {
            Error::InvalidInput(format!(
                "status must be one of pending, in_progress, completed, failed (got '{raw}')"
            ))
        })?;
        filter = filter.with_status(status);
    }
    if let Some(q) = search {
        filter = filter.with_search(q.as_str());
    }
    if let Some(gaps) = has_gaps {
        filter = filter.with_documentation_gaps(gaps);
    }
    if let Some(p) = patient_id.as_deref().filter(|p| !p.trim().is_empty()) {
        filter = filter.with_patient_id(p.trim());
    }
    Ok(filter)
}

fn check_range(name: &str, value: i64, min: i64, max: i64) -> Result<i64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{name} must be between {min} and {max} (got {value})"
        )))
    }
}

/// Filters, paging and sorting for note listings and search.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotesQuery {
    /// Note type, case-insensitive.
    pub note_type: Option<String>,
    /// `pending`, `in_progress`, `completed` or `failed`.
    pub status: Option<String>,
    /// Inclusive lower bound on creation time.
    #[param(value_type = Option<String>)]
    pub start_date: Option<FlexibleDateTime>,
    /// Inclusive upper bound on creation time.
    #[param(value_type = Option<String>)]
    pub end_date: Option<FlexibleDateTime>,
    /// Full-text search terms.
    #[serde(alias = "query", alias = "search")]
    pub q: Option<String>,
    /// Only notes whose extraction did (or did not) report documentation gaps.
    pub has_gaps: Option<bool>,
    pub patient_id: Option<String>,
    /// Page size, 1 to 100 (default 20).
    pub limit: Option<i64>,
    /// Rows to skip (default 0).
    #[serde(alias = "skip")]
    pub offset: Option<i64>,
    pub sort_by: Option<NoteSortField>,
    pub sort_order: Option<SortOrder>,
}

impl NotesQuery {
    pub fn into_request(self) -> Result<ListNotesRequest> {
        let limit = self
            .limit
            .map(|l| check_range("limit", l, 1, defaults::PAGE_LIMIT_MAX))
            .transpose()?;
        let offset = self
            .offset
            .map(|o| check_range("offset", o, 0, i64::MAX))
            .transpose()?;
        let filter = build_filter(
            &self.note_type,
            &self.status,
            self.start_date,
            self.end_date,
            &self.q,
            self.has_gaps,
            &self.patient_id,
        )?;

        Ok(ListNotesRequest {
            filter,
            limit,
            offset,
            sort_by: self.sort_by.unwrap_or_default(),
            sort_order: self.sort_order.unwrap_or_default(),
        })
    }
}

/// Filters and window for the dashboard.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    pub note_type: Option<String>,
    pub status: Option<String>,
    #[param(value_type = Option<String>)]
    pub start_date: Option<FlexibleDateTime>,
    #[param(value_type = Option<String>)]
    pub end_date: Option<FlexibleDateTime>,
    #[serde(alias = "query", alias = "search")]
    pub q: Option<String>,
    pub has_gaps: Option<bool>,
    pub patient_id: Option<String>,
    /// Look-back window in days, 1 to 365 (default 30).
    pub days: Option<i64>,
    /// Length of the most-frequent-codes list, 1 to 50 (default 10).
    pub top_codes: Option<i64>,
}

impl DashboardQuery {
    pub fn into_request(self) -> Result<DashboardRequest> {
        let days = check_range("days", self.days.unwrap_or(defaults::DASHBOARD_DAYS), 1, 365)?;
        let top_codes = check_range(
            "top_codes",
            self.top_codes.unwrap_or(defaults::TOP_CODES_LIMIT),
            1,
            defaults::TOP_CODES_LIMIT_MAX,
        )?;
        let filter = build_filter(
            &self.note_type,
            &self.status,
            self.start_date,
            self.end_date,
            &self.q,
            self.has_gaps,
            &self.patient_id,
        )?;
        Ok(DashboardRequest {
            filter,
            days,
            top_codes,
        })
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimeframeQuery {
    /// `24h`, `7d` or `30d` (default `24h`).
    pub timeframe: Option<String>,
}

impl TimeframeQuery {
    pub fn timeframe(&self) -> Result<Timeframe> {
        match self.timeframe.as_deref() {
            Some(raw) => raw.trim().parse(),
            None => Ok(Timeframe::default()),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CleanupQuery {
    /// Delete failed and pending notes older than this many days (7 to 36500, default 30).
    pub days: Option<i64>,
}

impl CleanupQuery {
    pub fn days(&self) -> Result<i64> {
        check_range(
            "days",
            self.days.unwrap_or(defaults::CLEANUP_DAYS),
            defaults::CLEANUP_MIN_DAYS,
            defaults::CLEANUP_MAX_DAYS,
        )
    }

    /// Creation-time cutoff `days` before `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let days = self.days()?;
        Duration::try_days(days)
            .and_then(|d| now.checked_sub_signed(d))
            .ok_or_else(|| Error::InvalidInput(format!("days is out of range (got {days})")))
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReprocessQuery {
    /// Maximum failed notes to requeue, 1 to 1000 (default 100).
    #[serde(alias = "max_items")]
    pub limit: Option<i64>,
}

impl ReprocessQuery {
    pub fn limit(&self) -> Result<i64> {
        check_range(
            "limit",
            self.limit.unwrap_or(defaults::REPROCESS_LIMIT),
            1,
            defaults::REPROCESS_LIMIT_MAX,
        )
    }
}

/// Position of a page within a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PageInfo {
    /// 1-based page number.
    pub current: i64,
    pub size: i64,
    pub total_pages: i64,
}

impl PageInfo {
    pub fn new(limit: i64, offset: i64, total: i64) -> Self {
        let size = limit.max(1);
        Self {
            current: offset.max(0) / size + 1,
            size,
            total_pages: (total.max(0) + size - 1) / size,
        }
    }
}
