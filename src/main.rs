use std::process::ExitCode;

use clap::Parser;
use console::style;
use themesmith::{Command, Theme};

/// Build pipeline for WordPress themes. Reads `themesmith.toml` from the
/// working directory.
#[derive(Parser, Debug)]
#[command(name = "themesmith", version, about)]
struct Args {
    #[clap(value_enum, index = 1, default_value = "default")]
    command: Command,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = themesmith::init_logging() {
        eprintln!("couldn't set up logging: {e}");
    }

    eprintln!(
        "{} {}",
        style("themesmith").bold().magenta(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );

    let report = match Theme::open(".").and_then(|theme| theme.run(args.command)) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            return ExitCode::FAILURE;
        }
    };

    eprint!("{report}");

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
