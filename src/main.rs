use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use refit::cli::{Cli, OutputFormat};
use refit::container::DockerCli;
use refit::pipeline::{self, AnalyzeRequest, CycleReport, Pipeline};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Print one diagnostic per line with its anchor and repair availability
fn print_text_report(report: &CycleReport) {
    if report.diagnostics.is_empty() {
        println!("No problems found.");
        return;
    }

    for diagnostic in &report.diagnostics {
        let repairable = report
            .repairs
            .iter()
            .any(|repair| repair.code == diagnostic.code);
        let marker = if repairable { "fixable" } else { "manual" };
        println!(
            "{}:{} [{}] ({}) {}",
            diagnostic.range.start.line + 1,
            diagnostic.range.start.character + 1,
            diagnostic.code,
            marker,
            diagnostic.message
        );
    }
    println!();
    println!(
        "{} problem(s), {} with automatic repairs",
        report.diagnostics.len(),
        report.repairs.len()
    );
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let mut request = AnalyzeRequest::new(&args.path);
    request.start_command = args.command.clone();
    request.duration = Duration::from_secs(args.time);
    request.live_container = args.container.clone();
    request.static_only = args.static_only;

    let engine = DockerCli::new();
    let mut pipeline = Pipeline::new(&engine);
    let report = pipeline.analyze(&request)?;

    match args.format {
        OutputFormat::Text => print_text_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if args.dump_alternative {
        if let Some(alternative) = &report.alternative {
            let path = request.workspace.join("Dockerfile.refit");
            std::fs::write(&path, alternative)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("alternative written to {}", path.display());
        } else {
            eprintln!("no alternative to dump; run without --static-only");
        }
    }

    if args.fix {
        pipeline::apply_repairs(&request.dockerfile, &report)
            .with_context(|| format!("repairing {}", request.dockerfile.display()))?;
        eprintln!(
            "applied {} repair(s) to {}",
            report.repairs.len(),
            request.dockerfile.display()
        );
    }

    Ok(())
}
