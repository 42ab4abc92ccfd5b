// Primitives for reading CSV files.

use std::fs::File;

use competency_scoring::ScoreRow;

use crate::calc::{
    io_common::{assemble_score_rows, parse_score_text, ScoreLine},
    *,
};

/// Reads finalized scores from a CSV export.
///
/// The first line holds the headers. Every column from the first score column on is named
/// after a key function.
pub fn read_csv_scores(path: String, cfs: &FileSource) -> BCalcResult<Vec<ScoreRow>> {
    let id_idx = cfs.id_column_index()?;
    let date_idx = cfs.date_column_index()?;
    let rater_idx_o = cfs.rater_column_index()?;
    let setting_idx_o = cfs.setting_column_index()?;
    let scores_start_col = cfs.first_score_column_index()?;

    let mut records = get_records(&path)?;
    let header = match records.next() {
        Some(line_r) => line_r.context(CsvLineParseSnafu { lineno: 1_usize })?,
        None => return Err(Box::new(CalcError::EmptyCsv { path })),
    };
    let headers: Vec<String> = header
        .iter()
        .skip(scores_start_col)
        .map(|s| s.to_string())
        .collect();
    debug!("read_csv_scores: headers: {:?}", headers);

    let mut lines: Vec<ScoreLine> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        debug!("read_csv_scores: {:?} {:?}", lineno, line);
        let date = line
            .get(date_idx)
            .context(CsvLineTooShortSnafu { lineno })?
            .to_string();
        let mut scores: Vec<Option<f64>> = Vec::new();
        for cell in line.iter().skip(scores_start_col) {
            scores.push(read_score(cell, lineno)?);
        }
        lines.push(ScoreLine {
            lineno,
            id: line.get(id_idx).map(|s| s.to_string()),
            date,
            rater: rater_idx_o.and_then(|i| line.get(i)).map(|s| s.to_string()),
            setting: setting_idx_o.and_then(|i| line.get(i)).map(|s| s.to_string()),
            scores,
        });
    }
    let res = assemble_score_rows(&path, &headers, lines)?;
    Ok(res)
}

fn read_score(cell: &str, lineno: usize) -> CalcResult<Option<f64>> {
    parse_score_text(cell).context(InvalidScoreSnafu {
        lineno,
        content: cell.trim().to_string(),
    })
}

fn get_records(path: &String) -> CalcResult<csv::StringRecordsIntoIter<File>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    Ok(rdr.into_records())
}
