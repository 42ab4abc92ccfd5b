//! Rows exchanged with the remote store.
//!
//! A persisted submission has the following shape:
//!
//! ```json
//! {
//!   "metadata": { "student_id": "...", "rater_id": "..." },
//!   "response": {
//!     "<epa>": {
//!       "<kf>": { "text": ["comment", "..."], "<optionKey>": true, "...": false }
//!     }
//!   }
//! }
//! ```
//!
//! `text` may be missing. Any other key of a key function must be a boolean.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::*;
use crate::dotted_id::{epa_of, DottedId};

/// Reads the timestamps found in exports: RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ScoringErrors> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    Err(ScoringErrors::InvalidTimestamp(s.to_string()))
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s).map_err(serde::de::Error::custom)
}

fn de_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let o: Option<String> = Option::deserialize(deserializer)?;
    match o {
        Some(s) if !s.trim().is_empty() => parse_timestamp(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// A row of the question bank.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRow {
    pub epa: String,
    pub kf: String,
    pub question: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Explicit question id. When missing, it is derived from the key function.
    #[serde(default)]
    pub id: Option<String>,
}

/// A submission, as persisted.
///
/// Serialized with the EPAs in numeric order and the key functions in dotted order.
#[derive(Eq, PartialEq, Debug, Clone, Default, Deserialize)]
pub struct ResponseDocument {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub response: BTreeMap<String, BTreeMap<String, KfAggregate>>,
}

impl ResponseDocument {
    pub fn new(metadata: Metadata) -> ResponseDocument {
        ResponseDocument {
            metadata,
            response: BTreeMap::new(),
        }
    }

    /// The EPAs mentioned by this document. Keys that are not EPA numbers are ignored.
    pub fn epas(&self) -> Vec<EpaId> {
        let mut res: Vec<EpaId> = self
            .response
            .keys()
            .filter_map(|k| k.trim().parse::<EpaId>().ok())
            .collect();
        res.sort_unstable();
        res.dedup();
        res
    }

    /// The key functions recorded for an EPA, ordered by dotted id.
    pub fn key_functions(&self, epa: EpaId) -> Vec<(&str, &KfAggregate)> {
        let mut res: Vec<(&str, &KfAggregate)> = self
            .response
            .iter()
            .filter(|(k, _)| k.trim().parse::<EpaId>().ok() == Some(epa))
            .flat_map(|(_, kfs)| kfs.iter().map(|(kf, agg)| (kf.as_str(), agg)))
            .collect();
        res.sort_by(|a, b| DottedId::from(a.0).cmp(&DottedId::from(b.0)));
        res
    }
}

// Keys sorted as dotted ids: `2` before `10`, `2.2` before `2.10`.
fn dotted_keys<V>(m: &BTreeMap<String, V>) -> Vec<(&String, &V)> {
    let mut res: Vec<(&String, &V)> = m.iter().collect();
    res.sort_by(|a, b| DottedId::from(a.0.as_str()).cmp(&DottedId::from(b.0.as_str())));
    res
}

struct OrderedKfs<'a>(&'a BTreeMap<String, KfAggregate>);

impl Serialize for OrderedKfs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kf, agg) in dotted_keys(self.0) {
            map.serialize_entry(kf, agg)?;
        }
        map.end()
    }
}

struct OrderedResponse<'a>(&'a BTreeMap<String, BTreeMap<String, KfAggregate>>);

impl Serialize for OrderedResponse<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (epa, kfs) in dotted_keys(self.0) {
            map.serialize_entry(epa, &OrderedKfs(kfs))?;
        }
        map.end()
    }
}

impl Serialize for ResponseDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("ResponseDocument", 2)?;
        st.serialize_field("metadata", &self.metadata)?;
        st.serialize_field("response", &OrderedResponse(&self.response))?;
        st.end()
    }
}

/// The document written when a rater submits a form.
pub type SubmissionDocument = ResponseDocument;

/// A row of submitted forms, wrapping the persisted document.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormResponseRow {
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    pub response: ResponseDocument,
}

/// The finalized development levels of one evaluation.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    pub response_id: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Keyed by key function, `"<epa>.<k>"`.
    #[serde(default)]
    pub results: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub rater_id: Option<String>,
    #[serde(default)]
    pub setting: Option<String>,
}

impl ScoreRow {
    /// Flattens the results into one assessment per key function.
    ///
    /// Missing, fractional or out-of-scale values are skipped.
    pub fn assessments(&self) -> Vec<Assessment> {
        let mut res: Vec<Assessment> = Vec::new();
        for (key, value) in self.results.iter() {
            let epa = match epa_of(key) {
                Some(epa) => epa,
                None => {
                    warn!(
                        "assessments: response {}: skipping result with key {:?}",
                        self.response_id, key
                    );
                    continue;
                }
            };
            let level = match value.map(DevLevel::from_value) {
                Some(Ok(level)) => level,
                Some(Err(e)) => {
                    warn!(
                        "assessments: response {}: skipping {}: {}",
                        self.response_id, key, e
                    );
                    continue;
                }
                None => {
                    debug!(
                        "assessments: response {}: no level for {}",
                        self.response_id, key
                    );
                    continue;
                }
            };
            res.push(Assessment {
                epa,
                kf: key.trim().to_string(),
                level,
                date: self.created_at,
                response_id: Some(self.response_id.clone()),
                assessor: self.rater_id.clone(),
                setting: self.setting.clone(),
            });
        }
        res
    }
}

/// A report generated for a student over a time window.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    pub time_window: String,
    #[serde(default)]
    pub report_data: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub kf_avg_data: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub llm_feedback: Option<String>,
}

/// An invitation for a rater to evaluate a student.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormRequestRow {
    pub id: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    pub student_id: String,
    /// The rater.
    pub completed_by: String,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clinical_settings: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub goals: Option<String>,
    #[serde(default)]
    pub rater_display_name: Option<String>,
    #[serde(default)]
    pub rater_email: Option<String>,
}

/// The descriptions of the EPAs and key functions.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptionsRow {
    #[serde(default)]
    pub epa_descriptions: BTreeMap<String, String>,
    /// Keyed by `"<epa>-<n>"` or `"<epa>.<n>"`.
    #[serde(default)]
    pub kf_descriptions: BTreeMap<String, String>,
}

impl DescriptionsRow {
    pub fn epa_title(&self, epa: EpaId) -> Option<&str> {
        self.epa_descriptions
            .iter()
            .find(|(k, _)| k.trim().parse::<EpaId>().ok() == Some(epa))
            .map(|(_, v)| v.as_str())
    }

    /// The described key functions of an EPA, as `("<epa>.<n>", description)`, in order.
    pub fn key_functions(&self, epa: EpaId) -> Vec<(String, String)> {
        let mut res: Vec<(String, String)> = self
            .kf_descriptions
            .iter()
            .filter_map(|(k, v)| {
                let normalized = k.trim().replace('-', ".");
                match epa_of(&normalized) {
                    Some(e) if e == epa => Some((normalized, v.clone())),
                    _ => None,
                }
            })
            .collect();
        res.sort_by(|a, b| DottedId::from(a.0.as_str()).cmp(&DottedId::from(b.0.as_str())));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps() {
        let t = parse_timestamp("2024-01-15T10:30:00.123456+00:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-15T10:30:00.123456+00:00");
        let d = parse_timestamp("2024-02-20").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-02-20T00:00:00+00:00");
        assert!(parse_timestamp("15/01/2024").is_err());
    }

    #[test]
    fn response_document_tree() {
        let js = r#"{
            "metadata": {"student_id": "s1", "rater_id": "r1"},
            "response": {
                "2": {
                    "2.10": {"a": true},
                    "2.1": {"text": ["first", " "], "a": false, "b": true}
                },
                "1": {"1.1": {"text": ["other"]}}
            }
        }"#;
        let doc: ResponseDocument = serde_json::from_str(js).unwrap();
        assert_eq!(doc.epas(), vec![1, 2]);
        let kfs: Vec<&str> = doc.key_functions(2).iter().map(|p| p.0).collect();
        assert_eq!(kfs, vec!["2.1", "2.10"]);
        let agg = doc.key_functions(2)[0].1;
        assert_eq!(agg.text, vec!["first".to_string(), " ".to_string()]);
        assert_eq!(agg.options.get("b"), Some(&true));
        assert!(doc.key_functions(2)[1].1.text.is_empty());
    }

    #[test]
    fn non_boolean_options_are_rejected() {
        let js = r#"{"metadata": {}, "response": {"1": {"1.1": {"a": "yes"}}}}"#;
        assert!(serde_json::from_str::<ResponseDocument>(js).is_err());
    }

    #[test]
    fn score_rows_flatten() {
        let js = r#"{
            "response_id": "r-1",
            "created_at": "2024-01-15T00:00:00Z",
            "results": {"1.1": 3, "1.2": 2.5, "2.1": null, "x": 1, "2.3": 0, "3.1": 7}
        }"#;
        let row: ScoreRow = serde_json::from_str(js).unwrap();
        let a = row.assessments();
        let keys: Vec<(EpaId, &str, DevLevel)> =
            a.iter().map(|x| (x.epa, x.kf.as_str(), x.level)).collect();
        assert_eq!(
            keys,
            vec![
                (1, "1.1", DevLevel::Entrustable),
                (2, "2.3", DevLevel::Remedial)
            ]
        );
    }

    #[test]
    fn descriptions_are_grouped_by_epa() {
        let mut d = DescriptionsRow::default();
        d.epa_descriptions.insert("1".to_string(), "Gather a history".to_string());
        d.kf_descriptions.insert("1-2".to_string(), "second".to_string());
        d.kf_descriptions.insert("1-10".to_string(), "tenth".to_string());
        d.kf_descriptions.insert("1-1".to_string(), "first".to_string());
        d.kf_descriptions.insert("2-1".to_string(), "other".to_string());
        assert_eq!(d.epa_title(1), Some("Gather a history"));
        let kfs: Vec<String> = d.key_functions(1).into_iter().map(|p| p.0).collect();
        assert_eq!(kfs, vec!["1.1", "1.2", "1.10"]);
    }
}
