//! System-wide statistics of the admin dashboard.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, Utc};
use log::debug;

use crate::config::*;
use crate::document::{FormRequestRow, ResponseDocument};

/// How long computed statistics are served before being recomputed.
pub const DEFAULT_TTL_SECONDS: i64 = 5 * 60;

/// Form requests older than this many days and still open are delinquent.
pub const DEFAULT_DELINQUENT_THRESHOLD_DAYS: i64 = 14;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DelinquentRater {
    pub rater_id: String,
    pub display_name: String,
    pub email: String,
    pub count: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SystemStats {
    pub total_submitted_forms: usize,
    pub active_form_requests: usize,
    pub delinquent_form_requests: usize,
    pub average_turnaround_days: Option<f64>,
    pub top_delinquent_raters: Vec<DelinquentRater>,
    /// `(YYYY-MM, count)`, ascending.
    pub monthly_submission_trends: Vec<(String, usize)>,
    /// How many submissions cover each EPA.
    pub epa_distribution: Vec<(EpaId, usize)>,
}

pub fn is_delinquent(request: &FormRequestRow, threshold_days: i64, now: DateTime<Utc>) -> bool {
    request.completed_at.is_none() && request.created_at < now - Duration::days(threshold_days)
}

/// Computes the dashboard statistics.
///
/// `submissions` are the creation dates of the submitted forms and `documents` their
/// contents.
pub fn compute_system_stats(
    requests: &[FormRequestRow],
    documents: &[ResponseDocument],
    submissions: &[DateTime<Utc>],
    threshold_days: i64,
    now: DateTime<Utc>,
) -> SystemStats {
    let active = requests.iter().filter(|r| r.completed_at.is_none()).count();

    let mut delinquent_count = 0;
    let mut by_rater: HashMap<&str, DelinquentRater> = HashMap::new();
    for r in requests.iter().filter(|r| is_delinquent(r, threshold_days, now)) {
        delinquent_count += 1;
        let e = by_rater
            .entry(r.completed_by.as_str())
            .or_insert_with(|| DelinquentRater {
                rater_id: r.completed_by.clone(),
                display_name: "Unknown".to_string(),
                email: "Not available".to_string(),
                count: 0,
            });
        e.count += 1;
        if let Some(name) = r.rater_display_name.as_ref().filter(|s| !s.trim().is_empty()) {
            e.display_name = name.clone();
        }
        if let Some(email) = r.rater_email.as_ref().filter(|s| !s.trim().is_empty()) {
            e.email = email.clone();
        }
    }
    let mut top: Vec<DelinquentRater> = by_rater.into_values().collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.rater_id.cmp(&b.rater_id)));

    let turnarounds: Vec<f64> = requests
        .iter()
        .filter_map(|r| r.completed_at.map(|c| c - r.created_at))
        .map(|d| d.num_seconds() as f64 / 86_400.0)
        .collect();
    let average_turnaround_days = if turnarounds.is_empty() {
        None
    } else {
        Some(turnarounds.iter().sum::<f64>() / turnarounds.len() as f64)
    };

    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for d in submissions.iter() {
        *months
            .entry(format!("{:04}-{:02}", d.year(), d.month()))
            .or_insert(0) += 1;
    }

    let mut epas: BTreeMap<EpaId, usize> = BTreeMap::new();
    for doc in documents.iter() {
        for epa in doc.epas() {
            *epas.entry(epa).or_insert(0) += 1;
        }
    }

    let stats = SystemStats {
        total_submitted_forms: submissions.len(),
        active_form_requests: active,
        delinquent_form_requests: delinquent_count,
        average_turnaround_days,
        top_delinquent_raters: top,
        monthly_submission_trends: months.into_iter().collect(),
        epa_distribution: epas.into_iter().collect(),
    };
    debug!("compute_system_stats: {:?}", stats);
    stats
}

/// Holds the last computed value for a limited time.
///
/// The cache is an explicit object: whoever needs shared statistics owns one and passes it
/// around.
pub struct StatsCache<T, C: Clock> {
    clock: C,
    ttl: Duration,
    entry: Option<(DateTime<Utc>, T)>,
}

impl<T: Clone, C: Clock> StatsCache<T, C> {
    pub fn new(clock: C) -> StatsCache<T, C> {
        StatsCache::with_ttl(clock, Duration::seconds(DEFAULT_TTL_SECONDS))
    }

    pub fn with_ttl(clock: C, ttl: Duration) -> StatsCache<T, C> {
        StatsCache {
            clock,
            ttl,
            entry: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        match &self.entry {
            Some((at, _)) => self.clock.now() - *at < self.ttl,
            None => false,
        }
    }

    /// Returns the cached value, or calls the loader when it is missing or expired.
    ///
    /// A failing loader leaves the cache as it was.
    pub fn get_or_refresh<E, F>(&mut self, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if self.is_fresh() {
            if let Some((_, v)) = &self.entry {
                return Ok(v.clone());
            }
        }
        debug!("StatsCache: refreshing");
        let value = loader()?;
        self.entry = Some((self.clock.now(), value.clone()));
        Ok(value)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
