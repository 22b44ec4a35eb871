use std::process::ExitCode;

use clap::Parser;
use sockcap_cli::{run, Cli};

fn main() -> ExitCode {
    run(Cli::parse()).map_or_else(
        |error| {
            eprintln!("sockcap: {error}");
            ExitCode::from(error.exit_code())
        },
        |()| ExitCode::SUCCESS,
    )
}
