mod args;
mod calc;

use clap::Parser;
use log::{info, LevelFilter};
use snafu::ErrorCompat;

use crate::args::Args;
use crate::calc::{run_job, JobOverrides};

fn main() {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
    info!("args {:?}", args);

    let overrides = JobOverrides {
        task: args.task.clone(),
        now: args.now.clone(),
        time_window: args.time_window.clone(),
        out: args.out.clone(),
    };

    let res = run_job(&args.config, args.reference.clone(), &overrides);
    if let Err(e) = res {
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&*e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
