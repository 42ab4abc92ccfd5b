use crate::calc::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "jobName")]
    pub job_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "studentName")]
    pub student_name: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "firstScoreColumnIndex")]
    _first_score_column_index: Option<JSValue>,
    #[serde(rename = "idColumnIndex")]
    _id_column_index: Option<JSValue>,
    #[serde(rename = "dateColumnIndex")]
    _date_column_index: Option<JSValue>,
    #[serde(rename = "raterColumnIndex")]
    _rater_column_index: Option<JSValue>,
    #[serde(rename = "settingColumnIndex")]
    _setting_column_index: Option<JSValue>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

// All the column indexes are 1-based in the configuration and 0-based once read.
impl FileSource {
    pub fn id_column_index(&self) -> CalcResult<usize> {
        read_column_index(&self._id_column_index, 1)
    }

    pub fn date_column_index(&self) -> CalcResult<usize> {
        read_column_index(&self._date_column_index, 2)
    }

    pub fn first_score_column_index(&self) -> CalcResult<usize> {
        read_column_index(&self._first_score_column_index, 3)
    }

    pub fn rater_column_index(&self) -> CalcResult<Option<usize>> {
        match self._rater_column_index {
            Some(_) => read_column_index(&self._rater_column_index, 0).map(Some),
            None => Ok(None),
        }
    }

    pub fn setting_column_index(&self) -> CalcResult<Option<usize>> {
        match self._setting_column_index {
            Some(_) => read_column_index(&self._setting_column_index, 0).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DraftSettings {
    pub directory: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobRules {
    #[serde(rename = "timeWindow")]
    pub time_window: Option<String>,
    pub bucketing: Option<String>,
    pub now: Option<String>,
    pub epas: Option<Vec<EpaId>>,
    #[serde(rename = "delinquentThresholdDays")]
    pub delinquent_threshold_days: Option<i64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    pub task: String,
    #[serde(rename = "questionBank")]
    pub question_bank: Option<FileSource>,
    pub answers: Option<FileSource>,
    pub metadata: Option<Metadata>,
    pub draft: Option<DraftSettings>,
    #[serde(rename = "scoreSources", default)]
    pub score_sources: Vec<FileSource>,
    #[serde(rename = "responseSources", default)]
    pub response_sources: Vec<FileSource>,
    #[serde(rename = "reportSources", default)]
    pub report_sources: Vec<FileSource>,
    #[serde(rename = "requestSources", default)]
    pub request_sources: Vec<FileSource>,
    pub descriptions: Option<FileSource>,
    pub rules: Option<JobRules>,
}

pub fn read_config(path: &str) -> BCalcResult<JobConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: JobConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(config)
}

pub fn read_summary(path: &str) -> BCalcResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_summary: {} bytes", contents.len());
    let js: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

// Numbers, digits in a string, or spreadsheet letters (`A` is 1, `AA` is 27).
fn read_js_int(x: &Option<JSValue>) -> CalcResult<usize> {
    match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(s.to_ascii_lowercase()
                .chars()
                .fold(0, |acc, c| acc * 26 + (c as usize - 'a' as usize + 1)))
        }
        Some(JSValue::String(s)) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}

fn read_column_index(x: &Option<JSValue>, default: usize) -> CalcResult<usize> {
    let idx = match x {
        Some(_) => read_js_int(x)?,
        None => default,
    };
    if idx == 0 {
        whatever!("column indexes start at 1, got {:?}", x)
    }
    Ok(idx - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_indexes() {
        assert_eq!(read_js_int(&Some(json!(3))).ok(), Some(3));
        assert_eq!(read_js_int(&Some(json!("12"))).ok(), Some(12));
        assert_eq!(read_js_int(&Some(json!("C"))).ok(), Some(3));
        assert_eq!(read_js_int(&Some(json!("aa"))).ok(), Some(27));
        assert!(read_js_int(&Some(json!(-1))).is_err());
        assert!(read_js_int(&None).is_err());

        let cfs: FileSource = serde_json::from_value(json!({
            "provider": "csv",
            "filePath": "scores.csv",
            "firstScoreColumnIndex": "E",
            "raterColumnIndex": 3
        }))
        .unwrap();
        assert_eq!(cfs.id_column_index().ok(), Some(0));
        assert_eq!(cfs.date_column_index().ok(), Some(1));
        assert_eq!(cfs.first_score_column_index().ok(), Some(4));
        assert_eq!(cfs.rater_column_index().ok(), Some(Some(2)));
        assert_eq!(cfs.setting_column_index().ok(), Some(None));

        let bad: FileSource = serde_json::from_value(json!({
            "provider": "csv",
            "filePath": "scores.csv",
            "idColumnIndex": 0
        }))
        .unwrap();
        assert!(bad.id_column_index().is_err());
    }
}
