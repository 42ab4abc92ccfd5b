use log::{debug, info, warn};

use competency_scoring::builder::ResponseBuilder;
use competency_scoring::rollup::*;
use competency_scoring::stats::*;
use competency_scoring::*;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use serde::de::DeserializeOwned;
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::calc::config_reader::*;
use crate::calc::drafts::{draft_path, load_draft, save_draft};
use crate::calc::io_common::resolve_path;
use crate::calc::io_csv::read_csv_scores;
use crate::calc::io_excel::read_excel_scores;
use crate::calc::io_json::{read_json, read_json_rows};

pub mod config_reader;
mod drafts;
mod io_common;
mod io_csv;
mod io_excel;
mod io_json;

#[derive(Debug, Snafu)]
pub enum CalcError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Worksheet {name} not found in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("The Excel file has no data"))]
    EmptyExcel {},
    #[snafu(display("Line {lineno}: could not understand cell {content}"))]
    ExcelWrongCellType { lineno: usize, content: String },

    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("The CSV file {path} has no header line"))]
    EmptyCsv { path: String },
    #[snafu(display("Line {lineno}: could not parse the line"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno}: the line is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("Line {lineno}: {content} is not a score"))]
    InvalidScore { lineno: usize, content: String },

    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Expected a column index"))]
    ParsingJsonNumber {},
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Provider not implemented: {provider}"))]
    UnknownProvider { provider: String },
    #[snafu(display("The {task} task needs {what} in its configuration"))]
    MissingSource { task: String, what: String },

    #[snafu(display("{source}"))]
    Scoring { source: ScoringErrors },

    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CalcResult<T> = Result<T, CalcError>;

pub type BCalcResult<T> = Result<T, Box<CalcError>>;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Task {
    Aggregate,
    Report,
    Stats,
}

impl Task {
    fn parse(s: &str) -> CalcResult<Task> {
        match s.trim() {
            "aggregate" => Ok(Task::Aggregate),
            "report" => Ok(Task::Report),
            "stats" => Ok(Task::Stats),
            x => whatever!("Unknown task {:?}: expected aggregate, report or stats", x),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Task::Aggregate => "aggregate",
            Task::Report => "report",
            Task::Stats => "stats",
        }
    }
}

/// Settings given on the command line, which take precedence over the configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct JobOverrides {
    pub task: Option<String>,
    pub now: Option<String>,
    pub time_window: Option<String>,
    pub out: Option<String>,
}

#[derive(PartialEq, Debug, Clone)]
struct Rules {
    window: Option<TimeWindow>,
    bucketing: Bucketing,
    now: DateTime<Utc>,
    epas: Option<Vec<EpaId>>,
    delinquent_threshold_days: i64,
}

fn validate_rules(job_rules: &JobRules, overrides: &JobOverrides) -> CalcResult<Rules> {
    let window = match overrides
        .time_window
        .as_ref()
        .or(job_rules.time_window.as_ref())
    {
        Some(s) if s.trim() == "all" => None,
        Some(s) => Some(TimeWindow::parse(s).context(ScoringSnafu {})?),
        None => None,
    };
    let bucketing = match &job_rules.bucketing {
        Some(s) => Bucketing::parse(s).context(ScoringSnafu {})?,
        None => Bucketing::Quarterly,
    };
    let now = match overrides.now.as_ref().or(job_rules.now.as_ref()) {
        Some(s) => parse_timestamp(s).context(ScoringSnafu {})?,
        None => Utc::now(),
    };
    let delinquent_threshold_days = match job_rules.delinquent_threshold_days {
        Some(x) if x >= 0 => x,
        Some(x) => whatever!("delinquentThresholdDays cannot be negative: {}", x),
        None => DEFAULT_DELINQUENT_THRESHOLD_DAYS,
    };
    Ok(Rules {
        window,
        bucketing,
        now,
        epas: job_rules.epas.clone(),
        delinquent_threshold_days,
    })
}

fn read_score_rows(root: &Path, cfs: &FileSource) -> BCalcResult<Vec<ScoreRow>> {
    let p = resolve_path(root, &cfs.file_path);
    info!("Attempting to read score file {:?}", p);
    let res = match cfs.provider.as_str() {
        "json" => read_json_rows(&p),
        "csv" => read_csv_scores(p.clone(), cfs),
        "xlsx" => read_excel_scores(p.clone(), cfs),
        x => Err(Box::new(CalcError::UnknownProvider {
            provider: x.to_string(),
        })),
    };
    if let Err(e) = &res {
        warn!("read_score_rows: failed to read {:?}: {}", p, e);
    }
    res
}

fn read_json_source<T: DeserializeOwned>(root: &Path, cfs: &FileSource) -> BCalcResult<Vec<T>> {
    if cfs.provider != "json" {
        return Err(Box::new(CalcError::UnknownProvider {
            provider: cfs.provider.clone(),
        }));
    }
    let p = resolve_path(root, &cfs.file_path);
    let res = read_json_rows(&p);
    if let Err(e) = &res {
        warn!("read_json_source: failed to read {:?}: {}", p, e);
    }
    res
}

fn read_json_sources<T: DeserializeOwned>(
    root: &Path,
    sources: &[FileSource],
) -> BCalcResult<Vec<T>> {
    let mut res: Vec<T> = Vec::new();
    for cfs in sources.iter() {
        let mut rows = read_json_source(root, cfs)?;
        res.append(&mut rows);
    }
    Ok(res)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn config_to_json(config: &JobConfig, task: Task) -> JSValue {
    let mut c: JSMap<String, JSValue> = JSMap::new();
    c.insert(
        "jobName".to_string(),
        json!(config.output_settings.job_name),
    );
    c.insert("task".to_string(), json!(task.name()));
    if let Some(name) = &config.output_settings.student_name {
        c.insert("studentName".to_string(), json!(name));
    }
    JSValue::Object(c)
}

fn epa_summary_to_json(s: &EpaSummary, descriptions: Option<&DescriptionsRow>) -> JSValue {
    let key_functions: Vec<JSValue> = s
        .key_functions
        .iter()
        .map(|a| {
            json!({
                "kf": a.kf,
                "count": a.count,
                "mean": round2(a.mean),
                "level": a.level.label()
            })
        })
        .collect();
    let series: Vec<JSValue> = s
        .series
        .iter()
        .map(|p| {
            json!({
                "start": p.start.to_string(),
                "label": p.label,
                "count": p.count,
                "mean": round2(p.mean),
                "level": p.level.label()
            })
        })
        .collect();
    let gauge = s.gauge();
    let mut js = json!({
        "epa": s.epa,
        "title": s.title,
        "level": DevLevel::label_of(s.overall),
        "allGreen": s.all_green,
        "gauge": {"label": gauge.label(), "needleAngle": gauge.needle_angle()},
        "lifetimeLevel": DevLevel::label_of(s.lifetime),
        "keyFunctions": key_functions,
        "series": series,
        "stats": {
            "assessments": s.stats.assessments,
            "daysSinceLast": s.stats.days_since_last,
            "assessors": s.stats.assessors,
            "settings": s.stats.settings
        },
        "comments": s.comments
    });
    if let Some(d) = descriptions {
        let table: Vec<JSValue> = key_function_table(d, s.epa, &s.key_functions)
            .iter()
            .map(|r| {
                json!({
                    "kf": r.kf,
                    "description": r.description,
                    "level": DevLevel::label_of(r.level)
                })
            })
            .collect();
        js["keyFunctionTable"] = json!(table);
    }
    js
}

fn report_to_json(r: &ReportSummary) -> JSValue {
    let epa_levels: Vec<JSValue> = r
        .epa_levels
        .iter()
        .map(|(epa, level)| json!({"epa": epa, "level": DevLevel::label_of(*level)}))
        .collect();
    let kf_levels: Vec<JSValue> = r
        .kf_levels
        .iter()
        .map(|(kf, level)| json!({"kf": kf, "level": DevLevel::label_of(*level)}))
        .collect();
    json!({
        "title": r.title,
        "createdAt": r.created_at.to_rfc3339(),
        "timeWindow": r.window.to_string(),
        "epaLevels": epa_levels,
        "kfLevels": kf_levels,
        "feedback": r.feedback
    })
}

fn stats_to_json(s: &SystemStats) -> JSValue {
    let raters: Vec<JSValue> = s
        .top_delinquent_raters
        .iter()
        .map(|r| {
            json!({
                "raterId": r.rater_id,
                "displayName": r.display_name,
                "email": r.email,
                "count": r.count
            })
        })
        .collect();
    let trends: Vec<JSValue> = s
        .monthly_submission_trends
        .iter()
        .map(|(month, count)| json!({"month": month, "count": count}))
        .collect();
    let distribution: Vec<JSValue> = s
        .epa_distribution
        .iter()
        .map(|(epa, count)| json!({"epa": epa, "count": count}))
        .collect();
    json!({
        "totalSubmittedForms": s.total_submitted_forms,
        "activeFormRequests": s.active_form_requests,
        "delinquentFormRequests": s.delinquent_form_requests,
        "averageTurnaroundDays": s.average_turnaround_days.map(round2),
        "topDelinquentRaters": raters,
        "monthlySubmissionTrends": trends,
        "epaDistribution": distribution
    })
}

fn run_aggregate(config: &JobConfig, root: &Path) -> BCalcResult<JSValue> {
    let bank_src = config
        .question_bank
        .as_ref()
        .context(MissingSourceSnafu {
            task: "aggregate",
            what: "questionBank",
        })?;
    let answers_src = config.answers.as_ref().context(MissingSourceSnafu {
        task: "aggregate",
        what: "answers",
    })?;

    let rows: Vec<QuestionRow> = read_json_source(root, bank_src)?;
    let bank = QuestionBank::from_rows(&rows).context(ScoringSnafu {})?;
    info!("Question bank: {} questions", bank.len());

    let answers: RaterResponses = read_json(&resolve_path(root, &answers_src.file_path))?;
    let mut builder = ResponseBuilder::new(&bank);
    for (epa, questions) in answers.iter() {
        for (question_id, response) in questions.iter() {
            builder
                .add_response(*epa, question_id, response)
                .context(ScoringSnafu {})?;
        }
    }
    let aggregated = aggregate_responses(builder.responses(), &bank);

    let draft_p = config.draft.as_ref().map(|d| draft_path(root, d));
    let metadata = match (&config.metadata, &draft_p) {
        (Some(m), _) => m.clone(),
        (None, Some(p)) => load_draft(p, &Metadata::default()).metadata,
        (None, None) => Metadata::default(),
    };
    let doc = SubmissionDocument::from_aggregated(metadata, &aggregated);
    doc.validate().context(ScoringSnafu {})?;
    let doc_js = serde_json::to_value(&doc).context(SerializingJsonSnafu {})?;
    if let Some(p) = &draft_p {
        save_draft(p, &doc_js)?;
    }

    Ok(json!({
        "config": config_to_json(config, Task::Aggregate),
        "submission": doc_js
    }))
}

fn run_report(config: &JobConfig, root: &Path, rules: &Rules) -> BCalcResult<JSValue> {
    if config.score_sources.is_empty() && config.report_sources.is_empty() {
        return Err(Box::new(CalcError::MissingSource {
            task: "report".to_string(),
            what: "scoreSources or reportSources".to_string(),
        }));
    }
    let mut score_rows: Vec<ScoreRow> = Vec::new();
    for cfs in config.score_sources.iter() {
        let mut rows = read_score_rows(root, cfs)?;
        score_rows.append(&mut rows);
    }
    let assessments: Vec<Assessment> = score_rows.iter().flat_map(|r| r.assessments()).collect();
    info!(
        "Read {} evaluations, {} key function levels",
        score_rows.len(),
        assessments.len()
    );

    let responses: Vec<FormResponseRow> = read_json_sources(root, &config.response_sources)?;
    let mut reports: Vec<ReportRow> = read_json_sources(root, &config.report_sources)?;
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let descriptions: Option<DescriptionsRow> = match &config.descriptions {
        Some(cfs) => read_json_source::<DescriptionsRow>(root, cfs)?
            .into_iter()
            .next(),
        None => None,
    };

    let epas: Vec<EpaId> = match &rules.epas {
        Some(l) => l.clone(),
        None => {
            let mut s: BTreeSet<EpaId> = assessments.iter().map(|a| a.epa).collect();
            for r in responses.iter() {
                s.extend(r.response.epas());
            }
            s.into_iter().collect()
        }
    };
    debug!("run_report: EPAs: {:?}", epas);

    let mut epas_js: Vec<JSValue> = Vec::new();
    for epa in epas {
        let s = summarize_epa(
            &assessments,
            &responses,
            descriptions.as_ref(),
            epa,
            rules.window,
            rules.bucketing,
            rules.now,
        );
        epas_js.push(epa_summary_to_json(&s, descriptions.as_ref()));
    }
    let mut reports_js: Vec<JSValue> = Vec::new();
    for r in reports.iter() {
        let s = summarize_report(r).context(ScoringSnafu {})?;
        reports_js.push(report_to_json(&s));
    }

    Ok(json!({
        "config": config_to_json(config, Task::Report),
        "epas": epas_js,
        "reports": reports_js
    }))
}

fn run_stats(config: &JobConfig, root: &Path, rules: &Rules) -> BCalcResult<JSValue> {
    if config.request_sources.is_empty() && config.response_sources.is_empty() {
        return Err(Box::new(CalcError::MissingSource {
            task: "stats".to_string(),
            what: "requestSources or responseSources".to_string(),
        }));
    }
    let requests: Vec<FormRequestRow> = read_json_sources(root, &config.request_sources)?;
    let responses: Vec<FormResponseRow> = read_json_sources(root, &config.response_sources)?;
    let submissions: Vec<DateTime<Utc>> = responses.iter().map(|r| r.created_at).collect();
    let documents: Vec<ResponseDocument> = responses.into_iter().map(|r| r.response).collect();
    let stats = compute_system_stats(
        &requests,
        &documents,
        &submissions,
        rules.delinquent_threshold_days,
        rules.now,
    );
    Ok(json!({
        "config": config_to_json(config, Task::Stats),
        "stats": stats_to_json(&stats)
    }))
}

/// Runs the job described by a configuration file and returns its summary.
pub fn compute_summary(
    config_path: &str,
    overrides: &JobOverrides,
) -> BCalcResult<(JobConfig, JSValue)> {
    let config = read_config(config_path)?;
    info!("config: {:?}", config);
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;

    let task = Task::parse(overrides.task.as_ref().unwrap_or(&config.task))?;
    let rules = validate_rules(&config.rules.clone().unwrap_or_default(), overrides)?;
    info!("Running task {} with rules {:?}", task.name(), rules);

    let summary = match task {
        Task::Aggregate => run_aggregate(&config, root_p)?,
        Task::Report => run_report(&config, root_p, &rules)?,
        Task::Stats => run_stats(&config, root_p, &rules)?,
    };
    Ok((config, summary))
}

fn summary_file_name(job_name: &str) -> String {
    let safe: String = job_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_summary.json", safe)
}

fn write_summary(
    config_path: &str,
    config: &JobConfig,
    out: Option<&String>,
    pretty: &str,
) -> BCalcResult<()> {
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;
    let target: Option<String> = match out {
        Some(o) => Some(o.clone()),
        None => config.output_settings.output_directory.as_ref().map(|d| {
            let dir = resolve_path(root_p, d);
            resolve_path(
                Path::new(&dir),
                &summary_file_name(&config.output_settings.job_name),
            )
        }),
    };
    match target.as_deref() {
        None | Some("stdout") => {
            println!("{}", pretty);
        }
        Some(p) => {
            fs::write(p, pretty).context(WritingFileSnafu { path: p })?;
            info!("Summary written to {:?}", p);
        }
    }
    Ok(())
}

pub fn run_job(
    config_path: &str,
    check_summary_path: Option<String>,
    overrides: &JobOverrides,
) -> BCalcResult<()> {
    let (config, result_js) = compute_summary(config_path, overrides)?;

    let pretty_js_stats =
        serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu {})?;
    write_summary(config_path, &config, overrides.out.as_ref(), &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return Err(Box::new(CalcError::ReferenceMismatch {}));
        }
        info!("The summary matches the reference {:?}", summary_p);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use snafu::ErrorCompat;

    fn test_path(name: &str) -> String {
        format!("{}/testdata/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn run_job_test(config_lpath: &str, summary_lpath: &str) {
        let _ = env_logger::builder().is_test(true).try_init();
        info!("Running test {}", config_lpath);
        let res = run_job(
            &test_path(config_lpath),
            Some(test_path(summary_lpath)),
            &JobOverrides::default(),
        );
        if let Err(e) = &res {
            eprintln!("An error occured {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&**e) {
                eprintln!("trace: {}", bt);
            }
        }
        assert!(res.is_ok());
    }

    fn report(overrides: &JobOverrides) -> JSValue {
        let _ = env_logger::builder().is_test(true).try_init();
        let (_, js) = compute_summary(&test_path("report_config.json"), overrides).unwrap();
        js
    }

    #[test]
    fn aggregate_job() {
        run_job_test("aggregate_config.json", "aggregate_expected_summary.json");
    }

    #[test]
    fn stats_job() {
        run_job_test("stats_config.json", "stats_expected_summary.json");
    }

    #[test]
    fn reference_mismatch() {
        let res = run_job(
            &test_path("aggregate_config.json"),
            Some(test_path("stats_expected_summary.json")),
            &JobOverrides::default(),
        );
        assert!(matches!(
            res.map_err(|e| *e),
            Err(CalcError::ReferenceMismatch {})
        ));
    }

    #[test]
    fn report_job() {
        let js = report(&JobOverrides::default());
        let epas = js["epas"].as_array().unwrap();
        assert_eq!(epas.len(), 2);

        let epa1 = &epas[0];
        assert_eq!(epa1["epa"], json!(1));
        assert_eq!(
            epa1["title"],
            json!("Gather a history and perform a physical examination")
        );
        assert_eq!(epa1["level"], json!("Entrustable"));
        assert_eq!(epa1["allGreen"], json!(true));
        assert_eq!(epa1["gauge"]["needleAngle"], json!(158));
        assert_eq!(epa1["keyFunctions"].as_array().unwrap().len(), 3);
        assert_eq!(epa1["keyFunctions"][0]["count"], json!(3));
        assert_eq!(epa1["series"][0]["label"], json!("Jan '24"));
        assert_eq!(epa1["series"][1]["label"], json!("Apr '24"));
        assert_eq!(epa1["stats"]["assessments"], json!(3));
        assert_eq!(epa1["stats"]["daysSinceLast"], json!(29));
        assert_eq!(epa1["stats"]["assessors"], json!(2));
        assert_eq!(epa1["stats"]["settings"], json!(["Clinic", "Inpatient"]));
        assert_eq!(
            epa1["comments"],
            json!(["Complete history", "Focused exam", "Efficient"])
        );

        let epa2 = &epas[1];
        let kfs: Vec<&str> = epa2["keyFunctions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|k| k["kf"].as_str().unwrap())
            .collect();
        assert_eq!(kfs, vec!["2.1", "2.10"]);
        assert_eq!(epa2["keyFunctions"][0]["level"], json!("Early-Developing"));
        assert_eq!(epa2["level"], json!("Developing"));
        assert_eq!(epa2["allGreen"], json!(false));
        assert_eq!(epa2["lifetimeLevel"], json!("Early-Developing"));
        assert_eq!(epa2["keyFunctionTable"][1]["kf"], json!("2.2"));
        assert_eq!(epa2["keyFunctionTable"][1]["level"], json!("No Data"));
        assert_eq!(
            epa2["comments"],
            json!(["Consider broader differential", "Clear reasoning"])
        );

        let reports = js["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["timeWindow"], json!("3m"));
        assert_eq!(
            reports[0]["epaLevels"],
            json!([
                {"epa": 1, "level": "Entrustable"},
                {"epa": 2, "level": "Early-Developing"}
            ])
        );
        assert_eq!(reports[0]["kfLevels"][2]["kf"], json!("2.10"));
    }

    #[test]
    fn time_window_override() {
        let js = report(&JobOverrides {
            time_window: Some("3".to_string()),
            ..JobOverrides::default()
        });
        let epa1 = &js["epas"][0];
        // Only the evaluation of May is in the window.
        assert_eq!(epa1["keyFunctions"].as_array().unwrap().len(), 2);
        assert_eq!(epa1["level"], json!("Entrustable"));
        assert_eq!(epa1["allGreen"], json!(false));
        assert_eq!(epa1["stats"]["assessments"], json!(1));
        // The series always covers the whole history.
        assert_eq!(epa1["series"].as_array().unwrap().len(), 2);
        // Only the comments of the evaluation of May are kept.
        assert_eq!(epa1["comments"], json!([]));
        assert_eq!(js["epas"][1]["comments"], json!(["Clear reasoning"]));
    }

    #[test]
    fn csv_and_json_scores_agree() {
        let _ = env_logger::builder().is_test(true).try_init();
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata");
        let config = read_config(&test_path("report_csv_config.json")).unwrap();
        let from_csv = read_score_rows(&root, &config.score_sources[0]).unwrap();
        let config = read_config(&test_path("report_config.json")).unwrap();
        let from_json = read_score_rows(&root, &config.score_sources[0]).unwrap();
        let a: Vec<Assessment> = from_csv.iter().flat_map(|r| r.assessments()).collect();
        let b: Vec<Assessment> = from_json.iter().flat_map(|r| r.assessments()).collect();
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);

        let js_csv = compute_summary(&test_path("report_csv_config.json"), &JobOverrides::default())
            .unwrap()
            .1;
        assert_eq!(js_csv["epas"][1]["level"], json!("Developing"));
    }

    #[test]
    fn drafts_keep_their_metadata() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = std::env::temp_dir().join(format!("cccalc-job-{}", std::process::id()));
        fs::create_dir_all(dir.join("drafts")).unwrap();
        let config_p = dir.join("draft_config.json").display().to_string();
        let config = json!({
            "outputSettings": {"jobName": "Draft"},
            "task": "aggregate",
            "questionBank": {"provider": "json", "filePath": test_path("bank.json")},
            "answers": {"provider": "json", "filePath": test_path("answers.json")},
            "draft": {"directory": "drafts", "requestId": "req-1"}
        });
        fs::write(&config_p, config.to_string()).unwrap();

        // Without any metadata, the submission is refused and nothing is saved.
        let res = compute_summary(&config_p, &JobOverrides::default());
        assert!(matches!(
            res.map_err(|e| *e),
            Err(CalcError::Scoring {
                source: ScoringErrors::MissingMetadata(_)
            })
        ));
        let draft_p = dir.join("drafts").join("req-1.json");
        assert!(!draft_p.exists());

        let saved = json!({
            "metadata": {"student_id": "stu-042", "rater_id": "rat-007"},
            "response": {"1": {"1.1": {"text": ["stale"]}}}
        });
        fs::write(&draft_p, saved.to_string()).unwrap();
        let (_, js) = compute_summary(&config_p, &JobOverrides::default()).unwrap();
        assert_eq!(js["submission"]["metadata"]["rater_id"], json!("rat-007"));

        let doc: ResponseDocument =
            serde_json::from_str(&fs::read_to_string(&draft_p).unwrap()).unwrap();
        assert_eq!(doc.metadata.student_id, "stu-042");
        assert_eq!(doc.epas(), vec![1, 2, 10]);
        assert_eq!(
            doc.key_functions(1)[0].1.text,
            vec![
                "Missed social history".to_string(),
                "Well structured".to_string()
            ]
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bad_configurations() {
        let res = compute_summary(
            &test_path("aggregate_config.json"),
            &JobOverrides {
                task: Some("tally".to_string()),
                ..JobOverrides::default()
            },
        );
        assert!(matches!(res.map_err(|e| *e), Err(CalcError::Whatever { .. })));

        let res = compute_summary(
            &test_path("aggregate_config.json"),
            &JobOverrides {
                task: Some("stats".to_string()),
                ..JobOverrides::default()
            },
        );
        assert!(matches!(
            res.map_err(|e| *e),
            Err(CalcError::MissingSource { .. })
        ));

        let res = compute_summary(
            &test_path("report_config.json"),
            &JobOverrides {
                now: Some("yesterday".to_string()),
                ..JobOverrides::default()
            },
        );
        assert!(matches!(
            res.map_err(|e| *e),
            Err(CalcError::Scoring {
                source: ScoringErrors::InvalidTimestamp(_)
            })
        ));
    }
}
