use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use ucdbg::cli::{Cli, Command, OutputFormat};
use ucdbg::dump::{write_events, Summary};
use ucdbg::reader::EventReader;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn dump(file: &std::path::Path, format: OutputFormat, summary: bool) -> Result<()> {
    let input = File::open(file).with_context(|| format!("Cannot open {}", file.display()))?;
    let mut reader = EventReader::new(BufReader::new(input));
    let events = reader
        .read_all()
        .with_context(|| format!("Cannot read records from {}", file.display()))?;
    let stats = reader.stats();
    tracing::debug!(records = stats.records, skipped = stats.skipped, "stream decoded");

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if summary {
        Summary::from_events(&events).write(&mut out, &stats)?;
    } else {
        write_events(&mut out, &events, matches!(format, OutputFormat::Json))?;
        if stats.skipped > 0 {
            eprintln!("{} record(s) skipped (unsupported format)", stats.skipped);
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    match args.command {
        Command::Dump {
            file,
            format,
            summary,
        } => dump(&file, format, summary)?,
    }

    Ok(())
}
