// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// The identifier of an Entrustable Professional Activity.
pub type EpaId = u32;

/// The development level reached for a key function.
///
/// The scale is ordinal: the index of a level is what gets averaged, and averages are
/// always floored back onto the scale (never rounded).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum DevLevel {
    Remedial,
    EarlyDeveloping,
    Developing,
    Entrustable,
}

impl DevLevel {
    pub const MAX: DevLevel = DevLevel::Entrustable;

    pub const ALL: [DevLevel; 4] = [
        DevLevel::Remedial,
        DevLevel::EarlyDeveloping,
        DevLevel::Developing,
        DevLevel::Entrustable,
    ];

    /// What gets displayed when there is no level to show.
    pub const NO_DATA_LABEL: &'static str = "No Data";

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(idx: u8) -> Option<DevLevel> {
        DevLevel::ALL.get(idx as usize).copied()
    }

    /// Reads a finalized score. Only the integral values of the scale are accepted.
    pub fn from_value(value: f64) -> Result<DevLevel, ScoringErrors> {
        if value.fract() != 0.0 || !(0.0..=3.0).contains(&value) {
            return Err(ScoringErrors::InvalidDevLevel(value.to_string()));
        }
        DevLevel::from_index(value as u8)
            .ok_or_else(|| ScoringErrors::InvalidDevLevel(value.to_string()))
    }

    /// Maps an average onto the scale: `labels[floor(avg)]`.
    pub fn floor_of(mean: f64) -> DevLevel {
        if mean.is_nan() {
            return DevLevel::Remedial;
        }
        let idx = mean.floor().clamp(0.0, 3.0) as u8;
        DevLevel::from_index(idx).unwrap_or(DevLevel::Remedial)
    }

    /// Floored mean of a list of levels, or None for an empty list.
    pub fn floor_mean(levels: &[DevLevel]) -> Option<DevLevel> {
        if levels.is_empty() {
            return None;
        }
        let total: u32 = levels.iter().map(|l| l.index() as u32).sum();
        Some(DevLevel::floor_of(total as f64 / levels.len() as f64))
    }

    pub fn label(self) -> &'static str {
        match self {
            DevLevel::Remedial => "Remedial",
            DevLevel::EarlyDeveloping => "Early-Developing",
            DevLevel::Developing => "Developing",
            DevLevel::Entrustable => "Entrustable",
        }
    }

    pub fn label_of(level: Option<DevLevel>) -> &'static str {
        level.map(DevLevel::label).unwrap_or(DevLevel::NO_DATA_LABEL)
    }

    /// Parses the kebab-case names used by the forms (`none` is the absence of a level).
    pub fn parse_name(s: &str) -> Result<Option<DevLevel>, ScoringErrors> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(None),
            "remedial" => Ok(Some(DevLevel::Remedial)),
            "early-developing" => Ok(Some(DevLevel::EarlyDeveloping)),
            "developing" => Ok(Some(DevLevel::Developing)),
            "entrustable" => Ok(Some(DevLevel::Entrustable)),
            _ => Err(ScoringErrors::InvalidDevLevel(s.to_string())),
        }
    }
}

impl Display for DevLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A multiple-choice question of the question bank, once its identifiers are resolved.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Question {
    pub epa: EpaId,
    pub kf: String,
    /// Dotted identifier, unique in the bank, for instance `2.3.1`.
    pub question_id: String,
    pub question: String,
    pub options: BTreeMap<String, String>,
}

/// The answer of a rater to one question: which options are ticked, and a comment.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionResponse {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub options: BTreeMap<String, bool>,
}

impl QuestionResponse {
    /// A question counts as answered once an option has been touched or a comment written.
    pub fn is_answered(&self) -> bool {
        !self.options.is_empty() || !self.text.trim().is_empty()
    }
}

/// All the answers of one form session, keyed by EPA and then by question id.
pub type RaterResponses = BTreeMap<EpaId, BTreeMap<String, QuestionResponse>>;

/// The merged answers of all the questions of a key function.
///
/// Serialized with the options first and `text` last.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct KfAggregate {
    #[serde(flatten)]
    pub options: BTreeMap<String, bool>,
    #[serde(default)]
    pub text: Vec<String>,
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EpaAggregate {
    pub epa: EpaId,
    /// Key functions, ordered by dotted id.
    pub key_functions: Vec<(String, KfAggregate)>,
}

/// The aggregated answers, ready to be submitted.
///
/// EPAs are in ascending order. This order is part of the output and does not depend on the
/// order in which the answers were collected.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct AggregatedResponses {
    pub epas: Vec<EpaAggregate>,
}

impl AggregatedResponses {
    pub fn is_empty(&self) -> bool {
        self.epas.is_empty()
    }

    pub fn get(&self, epa: EpaId, kf: &str) -> Option<&KfAggregate> {
        self.epas
            .iter()
            .find(|e| e.epa == epa)
            .and_then(|e| e.key_functions.iter().find(|(k, _)| k == kf))
            .map(|(_, agg)| agg)
    }
}

/// Who evaluated whom.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub rater_id: String,
}

/// One finalized development level, as used by the dashboards.
#[derive(PartialEq, Debug, Clone)]
pub struct Assessment {
    pub epa: EpaId,
    pub kf: String,
    pub level: DevLevel,
    pub date: DateTime<Utc>,
    pub response_id: Option<String>,
    pub assessor: Option<String>,
    pub setting: Option<String>,
}

/// Errors that prevent the scoring from completing successfully.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ScoringErrors {
    InvalidDevLevel(String),
    InvalidEpa(String),
    InvalidTimeWindow(String),
    InvalidBucketing(String),
    InvalidTimestamp(String),
    EmptyQuestionBank,
    DuplicateQuestion(String),
    UnknownQuestion(String),
    UnknownOption {
        question_id: String,
        option: String,
    },
    MismatchedEpa {
        question_id: String,
        epa: EpaId,
    },
    MissingRequiredFields,
    DuplicateFormRequest {
        student_id: String,
    },
    MissingMetadata(String),
    EmptySubmission,
}

impl Error for ScoringErrors {}

impl Display for ScoringErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringErrors::InvalidDevLevel(s) => write!(f, "invalid development level: {}", s),
            ScoringErrors::InvalidEpa(s) => write!(f, "invalid EPA identifier: {}", s),
            ScoringErrors::InvalidTimeWindow(s) => write!(f, "invalid time window: {}", s),
            ScoringErrors::InvalidBucketing(s) => write!(f, "invalid bucketing: {}", s),
            ScoringErrors::InvalidTimestamp(s) => write!(f, "invalid timestamp: {}", s),
            ScoringErrors::EmptyQuestionBank => write!(f, "the question bank is empty"),
            ScoringErrors::DuplicateQuestion(s) => write!(f, "duplicate question id: {}", s),
            ScoringErrors::UnknownQuestion(s) => write!(f, "unknown question id: {}", s),
            ScoringErrors::UnknownOption {
                question_id,
                option,
            } => write!(f, "unknown option {} for question {}", option, question_id),
            ScoringErrors::MismatchedEpa { question_id, epa } => write!(
                f,
                "question {} does not belong to EPA {}",
                question_id, epa
            ),
            ScoringErrors::MissingRequiredFields => write!(f, "All fields are required."),
            ScoringErrors::DuplicateFormRequest { student_id } => write!(
                f,
                "student {} has already requested this rater",
                student_id
            ),
            ScoringErrors::MissingMetadata(field) => {
                write!(f, "missing submission metadata: {}", field)
            }
            ScoringErrors::EmptySubmission => write!(f, "the submission has no answers"),
        }
    }
}

// ********* Configuration **********

/// How far back the dashboards look.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TimeWindow {
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl TimeWindow {
    pub fn months(self) -> u32 {
        match self {
            TimeWindow::ThreeMonths => 3,
            TimeWindow::SixMonths => 6,
            TimeWindow::TwelveMonths => 12,
        }
    }

    /// Accepts `3`, `6`, `12` and the stored forms `3m`, `6m`, `12m`.
    pub fn parse(s: &str) -> Result<TimeWindow, ScoringErrors> {
        match s.trim().trim_end_matches('m') {
            "3" => Ok(TimeWindow::ThreeMonths),
            "6" => Ok(TimeWindow::SixMonths),
            "12" => Ok(TimeWindow::TwelveMonths),
            _ => Err(ScoringErrors::InvalidTimeWindow(s.to_string())),
        }
    }

    /// The oldest instant still inside the window.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.months()))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn contains(self, date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        date >= self.cutoff(now)
    }
}

impl Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.months())
    }
}

/// The width of the buckets of a time series.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Bucketing {
    Monthly,
    /// Calendar quarters: Jan-Mar, Apr-Jun, Jul-Sep, Oct-Dec.
    Quarterly,
}

impl Bucketing {
    pub fn months(self) -> u32 {
        match self {
            Bucketing::Monthly => 1,
            Bucketing::Quarterly => 3,
        }
    }

    pub fn parse(s: &str) -> Result<Bucketing, ScoringErrors> {
        match s.trim() {
            "monthly" => Ok(Bucketing::Monthly),
            "quarterly" => Ok(Bucketing::Quarterly),
            _ => Err(ScoringErrors::InvalidBucketing(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(DevLevel::parse_name("remedial"), Ok(Some(DevLevel::Remedial)));
        assert_eq!(
            DevLevel::parse_name("early-developing"),
            Ok(Some(DevLevel::EarlyDeveloping))
        );
        assert_eq!(
            DevLevel::parse_name("developing"),
            Ok(Some(DevLevel::Developing))
        );
        assert_eq!(
            DevLevel::parse_name(" Entrustable "),
            Ok(Some(DevLevel::Entrustable))
        );
        assert_eq!(DevLevel::parse_name("NONE"), Ok(None));
        assert_eq!(
            DevLevel::parse_name("Early Developing"),
            Err(ScoringErrors::InvalidDevLevel("Early Developing".to_string()))
        );
        for level in DevLevel::ALL {
            let name = level.label().to_lowercase();
            assert_eq!(DevLevel::parse_name(&name), Ok(Some(level)));
        }
    }

    #[test]
    fn levels_from_values() {
        assert_eq!(DevLevel::from_value(2.0), Ok(DevLevel::Developing));
        assert!(DevLevel::from_value(2.5).is_err());
        assert!(DevLevel::from_value(4.0).is_err());
        assert_eq!(DevLevel::floor_of(2.99), DevLevel::Developing);
        assert_eq!(DevLevel::label_of(None), "No Data");
    }
}
