/*!

This is the long-form manual for `competency_scoring` and `cccalc`.

## Tasks

`cccalc` runs one task per invocation:
* `aggregate` merges the answers of a rater into the document that gets submitted
* `report` summarizes the finalized development levels of a student, EPA by EPA
* `stats` computes the system-wide statistics of the admin dashboard

## Development levels

| index | label            |
|-------|------------------|
| 0     | Remedial         |
| 1     | Early-Developing |
| 2     | Developing       |
| 3     | Entrustable      |

Averages are always floored back onto the scale: an average of `2.99` is `Developing`.
The level of an EPA is the floored average of the floored levels of its key functions.
An EPA is "all green" when at least 3 key functions have data and all of them are
`Entrustable`.

## Input formats

### Question bank (`json`)

A list of questions. The `id` is optional: when missing, the questions of a key function are
numbered in bank order (`2.1.1`, `2.1.2`, ...).

```json
[
  {"epa": "2", "kf": "2.1", "question": "Did the student gather a history?",
   "options": {"a": "Needed prompting", "b": "Complete"}}
]
```

### Answers (`json`)

The answers of a rater, keyed by EPA and then by question id:

```json
{"2": {"2.1.1": {"a": true, "text": "Thorough"}}}
```

### Scores (`json`, `csv`, `xlsx`)

Finalized development levels, one row per evaluation. In JSON:

```json
[{"response_id": "r1", "created_at": "2024-01-15T10:00:00Z", "results": {"2.1": 3, "2.2": 2}}]
```

In CSV or Excel, one column holds the evaluation id, one holds the date, and every column
from `firstScoreColumnIndex` on is a key function, named `<epa>.<k>` in the header row:

```text
response_id,created_at,1.1,1.2,2.1
r1,2024-01-15,3,2,
r2,2024-02-20,1,,0
```

Blank cells and `none` are "no score". A cell may also hold a level name (`remedial`,
`early-developing`, `developing`, `entrustable`, any case). Excel dates may be text or native
dates.

### Response documents, reports, form requests (`json`)

Lists of the rows exported from the store. See the `document` module for their shape.

## Configuration

A job is described by a JSON file, with keys in camelCase. File paths are relative to the
configuration file.

```json
{
  "outputSettings": {"jobName": "Week 3", "outputDirectory": "out"},
  "task": "report",
  "scoreSources": [{"provider": "csv", "filePath": "scores.csv", "firstScoreColumnIndex": 3}],
  "rules": {"timeWindow": "6m", "bucketing": "quarterly", "now": "2024-06-01"}
}
```

`rules`:
 - `timeWindow` (optional): `3m`, `6m` or `12m`. Without it, all the history is used.
 - `bucketing` (optional): `monthly` or `quarterly` (default).
 - `now` (optional): the reference date. Defaults to the current time.
 - `epas` (optional): the EPAs to report on. Defaults to all the EPAs with data.
 - `delinquentThresholdDays` (optional): for `stats`, defaults to 14.

Options of a file source:
 - `idColumnIndex`, `dateColumnIndex` (1-based, CSV and Excel only): default to 1 and 2.
 - `firstScoreColumnIndex` (1-based, CSV and Excel only): defaults to 3.
 - `raterColumnIndex`, `settingColumnIndex` (1-based, CSV and Excel only): no default, the
   rater and the clinical setting are left empty without them.
 - Column indexes may also be given as spreadsheet letters (`"C"`).
 - `excelWorksheetName` (Excel only): required when the workbook has several sheets.

The `draft` section of an `aggregate` job stores the submission in
`<directory>/<requestId>.json`, reusing the metadata already saved there.

 */
