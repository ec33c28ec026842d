use std::process::ExitCode;

use clap::Parser;
use drawing_progress_monitor::cli::{self, WatchArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let args = WatchArgs::parse();
    match cli::run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("progress-watch: {e:#}");
            ExitCode::FAILURE
        }
    }
}
