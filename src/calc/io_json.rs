// Readers for the rows exported as JSON.

use serde::de::DeserializeOwned;

use crate::calc::*;

pub fn read_json<T: DeserializeOwned>(path: &str) -> BCalcResult<T> {
    info!("Reading JSON file {:?}", path);
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let res: T = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(res)
}

/// Reads a list of rows. A single object is accepted as a list of one row.
pub fn read_json_rows<T: DeserializeOwned>(path: &str) -> BCalcResult<Vec<T>> {
    let js: JSValue = read_json(path)?;
    let rows = match js {
        JSValue::Array(_) => serde_json::from_value(js).context(ParsingJsonSnafu { path })?,
        JSValue::Object(_) => vec![serde_json::from_value(js).context(ParsingJsonSnafu { path })?],
        _ => {
            return Err(Box::new(CalcError::Whatever {
                message: format!("{}: expected a list of rows", path),
                source: None,
            }))
        }
    };
    debug!("read_json_rows: {}: {} rows", path, rows.len());
    Ok(rows)
}
