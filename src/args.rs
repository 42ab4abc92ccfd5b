use clap::Parser;

/// This is a calculator of clinical competency levels, from rater evaluations.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file describing the job, in JSON format.
    /// For more information about the file format, read the documentation of the competency_scoring crate.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the expected summary in JSON format. If provided, cccalc will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format to the given
    /// location. Setting this option overrides the output directory that may be specified in the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (aggregate, report or stats) Overrides the task of the configuration.
    #[clap(long, value_parser)]
    pub task: Option<String>,

    /// (date or timestamp) The reference date of the report. Defaults to the current time.
    #[clap(long, value_parser)]
    pub now: Option<String>,

    /// (3m, 6m, 12m or all) Overrides the time window of the configuration.
    #[clap(long, value_parser)]
    pub time_window: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
