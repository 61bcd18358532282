// Module declarations
mod analyze;
mod checks;
mod cli;
mod config;
mod inspect;
mod logging;

// Re-export all module items at crate root so cross-module references work.
#[allow(unused_imports)]
pub(crate) use analyze::*;
#[allow(unused_imports)]
pub(crate) use checks::*;
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use inspect::*;
#[allow(unused_imports)]
pub(crate) use logging::*;

use std::io::{self, Write};

use clap::Parser;
use clustercap_core::Reader;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Analyze {
            archive,
            examples,
            all_examples,
            config,
            very_verbose,
        } => {
            let config = load_analyze_config(config.as_deref())?;
            let mut reader = Reader::open(&archive)?;
            for warning in reader.integrity_warnings() {
                eprintln!("warning: {warning}");
            }

            let limit = if all_examples { 0 } else { examples };
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let outcomes = Analyzer::new(&reader, &config)
                .examples_limit(limit)
                .very_verbose(very_verbose)
                .run(&mut out)?;

            let flagged = outcomes
                .iter()
                .filter(|outcome| outcome.status != CheckStatus::Pass)
                .count();
            writeln!(
                out,
                "\n{} checks, {} passed, {flagged} flagged",
                outcomes.len(),
                outcomes.len() - flagged
            )?;
            if let Err(err) = reader.close() {
                eprintln!("Failed to close archive reader: {err}");
            }
            Ok(())
        }

        Command::Inspect { archive, json } => {
            let reader = Reader::open(&archive)?;
            let report = build_report(&archive, &reader)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                write_report(&mut out, &report)?;
            }
            Ok(())
        }

        Command::Query {
            archive,
            filter,
            list,
        } => {
            let reader = Reader::open(&archive)?;
            let stdout = io::stdout();
            run_query(&mut stdout.lock(), &reader, &filter, list)
        }

        Command::Cat { archive, path } => {
            let reader = Reader::open(&archive)?;
            let stdout = io::stdout();
            cat_entry(&mut stdout.lock(), &reader, &path)?;
            Ok(())
        }
    }
}
