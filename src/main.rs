use colored::*;
use fleetboot::cli::{self, Invocation};
use fleetboot::commands::execute_command;
use fleetboot::error::BootError;
use std::process;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .init();
}

fn report(err: &BootError) -> ! {
    match err {
        BootError::Usage(usage) => eprintln!("{}", usage),
        other => eprintln!("{} {}", "Error:".bright_red().bold(), other),
    }
    process::exit(err.exit_code());
}

fn main() {
    // Parse command line arguments
    let cli = match cli::parse_from(std::env::args_os()) {
        Ok(Invocation::Run(cli)) => cli,
        Ok(Invocation::Informational(text)) => {
            print!("{}", text);
            process::exit(0);
        }
        Err(e) => report(&e),
    };

    // Set up colored output
    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.verbose);

    // Handle the command; `up` only returns here on failure
    if let Err(e) = execute_command(cli) {
        report(&e);
    }
}
