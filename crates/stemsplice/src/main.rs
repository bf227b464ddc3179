//! stemsplice CLI entry point

use clap::Parser;
use std::process::ExitCode;

use stemsplice::cli::Cli;
use stemsplice::commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("stemsplice {} starting", env!("CARGO_PKG_VERSION"));

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("main: {}", e);
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
