use std::process::ExitCode;

use anstream::eprintln;
use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;

use untangle_settings::FilesystemOptions;

use crate::cli::{Cli, Commands};
use crate::commands::ExitStatus;
use crate::logging::Level;
use crate::settings::ResolveSettings;

mod cli;
mod commands;
mod logging;
mod settings;

fn run(cli: Cli) -> Result<ExitStatus> {
    logging::setup_logging(Level::from_args(cli.quiet, cli.verbose))?;

    match cli.command {
        Commands::Resolve(args) => {
            let filesystem = if args.no_config {
                None
            } else if let Some(config_file) = &args.config_file {
                Some(FilesystemOptions::from_file(config_file)?)
            } else {
                FilesystemOptions::from_directory(&std::env::current_dir()?)?
            };
            commands::resolve(ResolveSettings::resolve(args, filesystem)?)
        }
        Commands::BuildRequirements(args) => commands::build_requirements(&args.sdist),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("{}: {err}", "error".red().bold());
            for cause in err.chain().skip(1) {
                eprintln!("  {}: {cause}", "Caused by".red().bold());
            }
            ExitStatus::Error.into()
        }
    }
}
