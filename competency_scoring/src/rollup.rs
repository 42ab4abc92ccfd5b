//! Reduction of historical development levels into dashboard summaries.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use log::{debug, info, warn};

use crate::config::*;
use crate::document::{DescriptionsRow, FormResponseRow, ReportRow, ResponseDocument};
use crate::dotted_id::{epa_of, DottedId};

/// An EPA can only be shown as fully entrustable when at least this many key functions
/// have data.
pub const ALL_GREEN_MIN_KEY_FUNCTIONS: usize = 3;

/// Needle positions of the gauge, in degrees, per level.
const NEEDLE_ANGLES: [u32; 4] = [23, 68, 113, 158];

/// The average level of one key function.
#[derive(PartialEq, Debug, Clone)]
pub struct KfAverage {
    pub kf: String,
    pub count: usize,
    pub mean: f64,
    /// `floor(mean)` on the scale.
    pub level: DevLevel,
}

/// What the half-circle gauge of an EPA shows.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Gauge {
    pub level: Option<DevLevel>,
    pub all_green: bool,
}

impl Gauge {
    pub fn label(&self) -> &'static str {
        DevLevel::label_of(self.level)
    }

    /// The needle points straight to the left when there is no data.
    pub fn needle_angle(&self) -> u32 {
        self.level
            .map(|l| NEEDLE_ANGLES[l.index() as usize])
            .unwrap_or(0)
    }
}

/// A point of a time series: the average of one bucket.
#[derive(PartialEq, Debug, Clone)]
pub struct SeriesPoint {
    pub start: NaiveDate,
    /// For instance `Jan '24`.
    pub label: String,
    pub count: usize,
    pub mean: f64,
    pub level: DevLevel,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EpaStats {
    /// Number of evaluations, not of key function levels.
    pub assessments: usize,
    pub days_since_last: Option<i64>,
    pub assessors: usize,
    pub settings: Vec<String>,
}

/// A row of the key function table: a described key function and its level, if any.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct KfTableRow {
    pub kf: String,
    pub description: String,
    pub level: Option<DevLevel>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct EpaSummary {
    pub epa: EpaId,
    pub title: Option<String>,
    pub key_functions: Vec<KfAverage>,
    pub overall: Option<DevLevel>,
    pub all_green: bool,
    pub lifetime: Option<DevLevel>,
    pub series: Vec<SeriesPoint>,
    pub stats: EpaStats,
    pub comments: Vec<String>,
}

impl EpaSummary {
    pub fn gauge(&self) -> Gauge {
        Gauge {
            level: self.overall,
            all_green: self.all_green,
        }
    }
}

fn in_window(a: &Assessment, window: Option<TimeWindow>, now: DateTime<Utc>) -> bool {
    window.map(|w| w.contains(a.date, now)).unwrap_or(true)
}

/// Averages the levels of each key function of an EPA, within the time window.
///
/// Key functions are returned in dotted-id order. Those without data are absent.
pub fn kf_averages(
    assessments: &[Assessment],
    epa: EpaId,
    window: Option<TimeWindow>,
    now: DateTime<Utc>,
) -> Vec<KfAverage> {
    let mut groups: BTreeMap<DottedId, Vec<DevLevel>> = BTreeMap::new();
    for a in assessments
        .iter()
        .filter(|a| a.epa == epa && in_window(a, window, now))
    {
        groups
            .entry(DottedId::from(a.kf.as_str()))
            .or_default()
            .push(a.level);
    }
    groups
        .into_iter()
        .map(|(kf, levels)| {
            let total: u32 = levels.iter().map(|l| l.index() as u32).sum();
            let mean = total as f64 / levels.len() as f64;
            KfAverage {
                kf: kf.into_string(),
                count: levels.len(),
                mean,
                level: DevLevel::floor_of(mean),
            }
        })
        .collect()
}

/// The level of an EPA: the floored average of its floored key function levels.
pub fn overall_level(averages: &[KfAverage]) -> Option<DevLevel> {
    let levels: Vec<DevLevel> = averages.iter().map(|a| a.level).collect();
    DevLevel::floor_mean(&levels)
}

/// All key functions entrustable, with at least `ALL_GREEN_MIN_KEY_FUNCTIONS` of them.
pub fn is_all_green(averages: &[KfAverage]) -> bool {
    averages.len() >= ALL_GREEN_MIN_KEY_FUNCTIONS
        && averages.iter().all(|a| a.level == DevLevel::MAX)
}

/// Lifetime average of a list of levels, ignoring any time window.
pub fn lifetime_average(points: &[(DateTime<Utc>, DevLevel)]) -> Option<DevLevel> {
    let levels: Vec<DevLevel> = points.iter().map(|(_, l)| *l).collect();
    DevLevel::floor_mean(&levels)
}

fn bucket_start(date: NaiveDate, bucketing: Bucketing) -> Option<NaiveDate> {
    let step = bucketing.months();
    let month0 = (date.month0() / step) * step;
    NaiveDate::from_ymd_opt(date.year(), month0 + 1, 1)
}

/// Buckets the levels by month or calendar quarter and averages each bucket.
///
/// The buckets go from the bucket of the earliest point to the bucket containing `now`.
/// Empty buckets are left out, and later points are ignored.
pub fn time_series(
    points: &[(DateTime<Utc>, DevLevel)],
    bucketing: Bucketing,
    now: DateTime<Utc>,
) -> Vec<SeriesPoint> {
    let last_bucket = match bucket_start(now.date_naive(), bucketing) {
        Some(d) => d,
        None => return Vec::new(),
    };
    let mut buckets: BTreeMap<NaiveDate, Vec<DevLevel>> = BTreeMap::new();
    for (date, level) in points.iter() {
        if let Some(start) = bucket_start(date.date_naive(), bucketing) {
            if start <= last_bucket {
                buckets.entry(start).or_default().push(*level);
            } else {
                debug!("time_series: ignoring point in the future: {:?}", date);
            }
        }
    }
    buckets
        .into_iter()
        .map(|(start, levels)| {
            let total: u32 = levels.iter().map(|l| l.index() as u32).sum();
            let mean = total as f64 / levels.len() as f64;
            SeriesPoint {
                start,
                label: start.format("%b '%y").to_string(),
                count: levels.len(),
                mean,
                level: DevLevel::floor_of(mean),
            }
        })
        .collect()
}

/// The start of every bucket from `from` to `now`, including empty ones.
pub fn bucket_starts(
    from: DateTime<Utc>,
    bucketing: Bucketing,
    now: DateTime<Utc>,
) -> Vec<NaiveDate> {
    let mut res: Vec<NaiveDate> = Vec::new();
    let (mut cur, last) = match (
        bucket_start(from.date_naive(), bucketing),
        bucket_start(now.date_naive(), bucketing),
    ) {
        (Some(c), Some(l)) => (c, l),
        _ => return res,
    };
    while cur <= last {
        res.push(cur);
        cur = match cur.checked_add_months(Months::new(bucketing.months())) {
            Some(next) => next,
            None => break,
        };
    }
    res
}

/// Statistics over the assessments of an EPA within the window.
pub fn epa_stats(
    assessments: &[Assessment],
    epa: EpaId,
    window: Option<TimeWindow>,
    now: DateTime<Utc>,
) -> EpaStats {
    let filtered: Vec<&Assessment> = assessments
        .iter()
        .filter(|a| a.epa == epa && in_window(a, window, now))
        .collect();
    // One evaluation yields one record per key function.
    let forms: BTreeSet<&str> = filtered
        .iter()
        .filter_map(|a| a.response_id.as_deref())
        .collect();
    let anonymous = filtered.iter().filter(|a| a.response_id.is_none()).count();
    let last = filtered.iter().map(|a| a.date).max();
    let assessors: BTreeSet<&str> = filtered
        .iter()
        .filter_map(|a| a.assessor.as_deref())
        .collect();
    let settings: BTreeSet<String> = filtered
        .iter()
        .filter_map(|a| a.setting.clone())
        .filter(|s| !s.trim().is_empty())
        .collect();
    EpaStats {
        assessments: forms.len() + anonymous,
        days_since_last: last.map(|d| now.signed_duration_since(d).num_days()),
        assessors: assessors.len(),
        settings: settings.into_iter().collect(),
    }
}

/// Collects the non-blank comments left for an EPA, key function after key function.
pub fn extract_comments<'a, I>(documents: I, epa: EpaId) -> Vec<String>
where
    I: IntoIterator<Item = &'a ResponseDocument>,
{
    let mut res: Vec<String> = Vec::new();
    for doc in documents {
        for (_, agg) in doc.key_functions(epa) {
            res.extend(agg.text.iter().filter(|t| !t.trim().is_empty()).cloned());
        }
    }
    res
}

/// Joins the described key functions of an EPA with their levels.
pub fn key_function_table(
    descriptions: &DescriptionsRow,
    epa: EpaId,
    averages: &[KfAverage],
) -> Vec<KfTableRow> {
    descriptions
        .key_functions(epa)
        .into_iter()
        .map(|(kf, description)| {
            let level = averages
                .iter()
                .find(|a| DottedId::from(a.kf.as_str()) == DottedId::from(kf.as_str()))
                .map(|a| a.level);
            KfTableRow {
                kf,
                description,
                level,
            }
        })
        .collect()
}

/// Builds the full summary of an EPA.
///
/// The key function table, the overall level, the statistics and the comments use the time
/// window. The time series and the lifetime average use all the assessments.
pub fn summarize_epa(
    assessments: &[Assessment],
    responses: &[FormResponseRow],
    descriptions: Option<&DescriptionsRow>,
    epa: EpaId,
    window: Option<TimeWindow>,
    bucketing: Bucketing,
    now: DateTime<Utc>,
) -> EpaSummary {
    let key_functions = kf_averages(assessments, epa, window, now);
    let overall = overall_level(&key_functions);
    let all_green = is_all_green(&key_functions);
    let points: Vec<(DateTime<Utc>, DevLevel)> = assessments
        .iter()
        .filter(|a| a.epa == epa)
        .map(|a| (a.date, a.level))
        .collect();
    let summary = EpaSummary {
        epa,
        title: descriptions
            .and_then(|d| d.epa_title(epa))
            .map(|s| s.to_string()),
        overall,
        all_green,
        lifetime: lifetime_average(&points),
        series: time_series(&points, bucketing, now),
        stats: epa_stats(assessments, epa, window, now),
        comments: extract_comments(
            responses
                .iter()
                .filter(|r| window.map(|w| w.contains(r.created_at, now)).unwrap_or(true))
                .map(|r| &r.response),
            epa,
        ),
        key_functions,
    };
    info!(
        "EPA {}: overall {} all green {} ({} key functions)",
        epa,
        DevLevel::label_of(summary.overall),
        summary.all_green,
        summary.key_functions.len()
    );
    summary
}

/// A persisted report, mapped onto the scale.
#[derive(PartialEq, Debug, Clone)]
pub struct ReportSummary {
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub window: TimeWindow,
    pub epa_levels: Vec<(EpaId, Option<DevLevel>)>,
    pub kf_levels: Vec<(String, Option<DevLevel>)>,
    pub feedback: Option<String>,
}

pub fn summarize_report(row: &ReportRow) -> Result<ReportSummary, ScoringErrors> {
    let window = TimeWindow::parse(&row.time_window)?;
    let mut epa_levels: Vec<(EpaId, Option<DevLevel>)> = Vec::new();
    for (k, v) in row.report_data.iter() {
        match k.trim().parse::<EpaId>() {
            Ok(epa) => epa_levels.push((epa, v.map(DevLevel::floor_of))),
            Err(_) => warn!("summarize_report: skipping EPA level with key {:?}", k),
        }
    }
    epa_levels.sort_by_key(|p| p.0);
    let mut kf_levels: Vec<(String, Option<DevLevel>)> = row
        .kf_avg_data
        .iter()
        .filter(|(k, _)| {
            let known = epa_of(k).is_some();
            if !known {
                warn!("summarize_report: skipping key function level with key {:?}", k);
            }
            known
        })
        .map(|(k, v)| (k.clone(), v.map(DevLevel::floor_of)))
        .collect();
    kf_levels.sort_by(|a, b| DottedId::from(a.0.as_str()).cmp(&DottedId::from(b.0.as_str())));
    Ok(ReportSummary {
        title: row.title.clone(),
        created_at: row.created_at,
        window,
        epa_levels,
        kf_levels,
        feedback: row
            .llm_feedback
            .clone()
            .filter(|s| !s.trim().is_empty()),
    })
}
