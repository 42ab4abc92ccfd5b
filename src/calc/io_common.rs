use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use competency_scoring::ScoreRow;
use log::warn;

use crate::calc::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Identifier of a row that has no id column: `<file name>-<line number>`.
pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

pub fn resolve_path(root: &Path, file_path: &str) -> String {
    let p: PathBuf = root.join(file_path);
    p.as_path().display().to_string()
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|x| x.trim().to_string()).filter(|x| !x.is_empty())
}

/// Reads a score cell: a number, a level name (`early-developing`, `none`, ...) or nothing.
///
/// Returns None when the cell is neither.
pub fn parse_score_text(cell: &str) -> Option<Option<f64>> {
    let s = cell.trim();
    if s.is_empty() {
        return Some(None);
    }
    if let Ok(x) = s.parse::<f64>() {
        return Some(Some(x));
    }
    DevLevel::parse_name(s)
        .ok()
        .map(|level_o| level_o.map(|l| l.index() as f64))
}

/// The cells of one line of a score table, once decoded.
pub struct ScoreLine {
    pub lineno: usize,
    pub id: Option<String>,
    pub date: String,
    pub rater: Option<String>,
    pub setting: Option<String>,
    pub scores: Vec<Option<f64>>,
}

/// Assembles the score rows of a table. `headers` are the names of the score columns.
pub fn assemble_score_rows(
    path: &str,
    headers: &[String],
    lines: Vec<ScoreLine>,
) -> CalcResult<Vec<ScoreRow>> {
    let default_id = make_default_id(path);
    let mut res: Vec<ScoreRow> = Vec::new();
    for line in lines {
        if line.date.trim().is_empty() && line.scores.iter().all(|s| s.is_none()) {
            warn!(
                "assemble_score_rows: {}: skipping empty line {}",
                path, line.lineno
            );
            continue;
        }
        let created_at = parse_timestamp(&line.date).context(ScoringSnafu {})?;
        let mut results: BTreeMap<String, Option<f64>> = BTreeMap::new();
        for (kf, score) in headers.iter().zip(line.scores.iter()) {
            results.insert(kf.trim().to_string(), *score);
        }
        res.push(ScoreRow {
            response_id: non_blank(line.id).unwrap_or_else(|| default_id(line.lineno)),
            created_at,
            results,
            rater_id: non_blank(line.rater),
            setting: non_blank(line.setting),
        });
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ids() {
        assert_eq!(simplify_file_name("/tmp/data/scores.csv"), "scores.csv");
        let f = make_default_id("/tmp/data/scores.csv");
        assert_eq!(f(12), "scores.csv-00000012");
    }

    #[test]
    fn score_cells() {
        assert_eq!(parse_score_text(" 2 "), Some(Some(2.0)));
        assert_eq!(parse_score_text(""), Some(None));
        assert_eq!(parse_score_text("Early-Developing"), Some(Some(1.0)));
        assert_eq!(parse_score_text("none"), Some(None));
        assert_eq!(parse_score_text("excellent"), None);
    }

    #[test]
    fn score_rows() {
        let lines = vec![
            ScoreLine {
                lineno: 2,
                id: Some(" ".to_string()),
                date: "2024-01-15".to_string(),
                rater: Some("rat-1".to_string()),
                setting: Some("".to_string()),
                scores: vec![Some(3.0), None],
            },
            ScoreLine {
                lineno: 3,
                id: None,
                date: "".to_string(),
                rater: None,
                setting: None,
                scores: vec![None, None],
            },
        ];
        let headers = vec!["1.1".to_string(), " 1.2".to_string()];
        let rows = assemble_score_rows("scores.csv", &headers, lines).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].response_id, "scores.csv-00000002");
        assert_eq!(rows[0].results.get("1.2"), Some(&None));
        assert_eq!(rows[0].rater_id.as_deref(), Some("rat-1"));
        assert_eq!(rows[0].setting, None);
        assert_eq!(rows[0].assessments().len(), 1);
    }
}
