use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate, SecondsFormat, TimeZone};

use competency_scoring::ScoreRow;

use crate::calc::{
    io_common::{assemble_score_rows, parse_score_text, ScoreLine},
    *,
};

/// Reads finalized scores from an Excel workbook, laid out like the CSV exports.
pub fn read_excel_scores(path: String, cfs: &FileSource) -> BCalcResult<Vec<ScoreRow>> {
    let id_idx = cfs.id_column_index()?;
    let date_idx = cfs.date_column_index()?;
    let rater_idx_o = cfs.rater_column_index()?;
    let setting_idx_o = cfs.setting_column_index()?;
    let scores_start_col = cfs.first_score_column_index()?;

    let wrange = get_range(&path, cfs)?;

    let header = wrange.rows().next().context(EmptyExcelSnafu {})?;
    debug!("read_excel_scores: header: {:?}", header);
    let headers: Vec<String> = header
        .iter()
        .skip(scores_start_col)
        .map(read_text)
        .collect::<Option<Vec<String>>>()
        .context(ExcelWrongCellTypeSnafu {
            lineno: 1_usize,
            content: format!("{:?}", header),
        })?;

    let mut lines: Vec<ScoreLine> = Vec::new();
    for (idx, row) in wrange.rows().enumerate().skip(1) {
        let lineno = idx + 1;
        debug!("read_excel_scores: lineno: {:?} row: {:?}", lineno, row);
        let date_cell = row.get(date_idx).unwrap_or(&DataType::Empty);
        let date = read_date(date_cell).context(ExcelWrongCellTypeSnafu {
            lineno,
            content: format!("{:?}", date_cell),
        })?;
        let mut scores: Vec<Option<f64>> = Vec::new();
        for cell in row.iter().skip(scores_start_col) {
            let score = read_score(cell).context(ExcelWrongCellTypeSnafu {
                lineno,
                content: format!("{:?}", cell),
            })?;
            scores.push(score);
        }
        lines.push(ScoreLine {
            lineno,
            id: row.get(id_idx).and_then(read_text),
            date,
            rater: rater_idx_o.and_then(|i| row.get(i)).and_then(read_text),
            setting: setting_idx_o.and_then(|i| row.get(i)).and_then(read_text),
            scores,
        });
    }
    let res = assemble_score_rows(&path, &headers, lines)?;
    Ok(res)
}

fn read_text(cell: &DataType) -> Option<String> {
    match cell {
        DataType::String(s) => Some(s.clone()),
        DataType::Int(i) => Some(i.to_string()),
        DataType::Float(f) => Some(f.to_string()),
        DataType::Empty => Some("".to_string()),
        _ => None,
    }
}

fn read_score(cell: &DataType) -> Option<Option<f64>> {
    match cell {
        DataType::Empty => Some(None),
        DataType::Int(i) => Some(Some(*i as f64)),
        DataType::Float(f) => Some(Some(*f)),
        DataType::String(s) => parse_score_text(s),
        _ => None,
    }
}

// Dates are either text or native Excel dates, which count days since 1899-12-30.
fn read_date(cell: &DataType) -> Option<String> {
    match cell {
        DataType::String(s) => Some(s.clone()),
        DataType::Empty => Some("".to_string()),
        DataType::DateTime(serial) | DataType::Float(serial) => {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
            let millis = (serial * 86_400_000.0).round() as i64;
            let ndt = epoch.checked_add_signed(Duration::milliseconds(millis))?;
            Some(
                Utc.from_utc_datetime(&ndt)
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            )
        }
        _ => None,
    }
}

fn get_range(path: &String, cfs: &FileSource) -> BCalcResult<calamine::Range<DataType>> {
    let worksheet_name_o = cfs.excel_worksheet_name.clone();
    debug!(
        "read_excel_scores: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> =
        open_workbook(path.clone()).context(OpeningExcelSnafu { path: path.clone() })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(&worksheet_name)
            .context(MissingWorksheetSnafu {
                path: path.clone(),
                name: worksheet_name.clone(),
            })?
            .context(OpeningExcelSnafu { path: path.clone() })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => Err(Box::new(CalcError::EmptyExcel {})),
            [(worksheet_name, wrange)] => {
                debug!(
                    "read_excel_scores: path: {:?} using worksheet: {:?}",
                    &path, &worksheet_name
                );
                Ok(wrange.clone())
            }
            _ => {
                let names: Vec<String> = all_worksheets.iter().map(|p| p.0.clone()).collect();
                Err(Box::new(CalcError::Whatever {
                    message: format!(
                        "{}: several worksheets found ({:?}), set excelWorksheetName",
                        path, names
                    ),
                    source: None,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excel_dates() {
        assert_eq!(
            read_date(&DataType::DateTime(45306.5)).as_deref(),
            Some("2024-01-15T12:00:00Z")
        );
        assert_eq!(
            read_date(&DataType::String("2024-01-15".to_string())).as_deref(),
            Some("2024-01-15")
        );
        assert_eq!(read_date(&DataType::Bool(true)), None);
    }

    #[test]
    fn excel_scores() {
        assert_eq!(read_score(&DataType::Float(3.0)), Some(Some(3.0)));
        assert_eq!(read_score(&DataType::Int(1)), Some(Some(1.0)));
        assert_eq!(read_score(&DataType::Empty), Some(None));
        assert_eq!(read_score(&DataType::String(" ".to_string())), Some(None));
        assert_eq!(read_score(&DataType::String("x".to_string())), None);
        assert_eq!(
            read_score(&DataType::String("Developing".to_string())),
            Some(Some(2.0))
        );
    }
}
