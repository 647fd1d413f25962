//! Analysis pipeline: trace, extract, synthesize, reconcile, repair
//!
//! One `analyze` call is one bounded cycle. Static rules always run; the
//! trace-driven stages run unless the caller asked for static analysis
//! only or the pipeline is stopped. The synthesized alternative lives in a
//! single-slot cache owned here: it is overwritten on every successful
//! trace, read as an immutable snapshot by reconciliation and repair, and
//! dropped on stop/restart. There is no ambient global state and no
//! on-disk handoff between stages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::container::ContainerEngine;
use crate::diagnostics::{RepairDiagnostic, RepairEdit};
use crate::dockerfile::Dockerfile;
use crate::document::Document;
use crate::error::{RefitError, Result};
use crate::features::{self, Features};
use crate::reconcile;
use crate::repair::{self, RepairContext};
use crate::rules;
use crate::synthesize::{self, SynthesizedDockerfile};
use crate::syscall_log;
use crate::trace_driver::{TraceDriver, TraceRequest, DEFAULT_TRACE_DURATION_SECS};

/// What to analyze and how.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    /// Source tree root; also the image build context.
    pub workspace: PathBuf,
    /// The Dockerfile under analysis, usually `<workspace>/Dockerfile`.
    pub dockerfile: PathBuf,
    /// Explicit start command; defaults to the file's CMD/ENTRYPOINT.
    pub start_command: Option<String>,
    pub duration: Duration,
    /// Re-trace this live container instead of building an image.
    pub live_container: Option<String>,
    /// Skip the trace-driven stages entirely.
    pub static_only: bool,
}

impl AnalyzeRequest {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let dockerfile = workspace.join("Dockerfile");
        Self {
            workspace,
            dockerfile,
            start_command: None,
            duration: Duration::from_secs(DEFAULT_TRACE_DURATION_SECS),
            live_container: None,
            static_only: false,
        }
    }
}

/// One generated repair, keyed by the diagnostic code that produced it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Repair {
    pub code: String,
    pub edit: RepairEdit,
}

/// Everything one analysis cycle produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CycleReport {
    pub diagnostics: Vec<RepairDiagnostic>,
    pub repairs: Vec<Repair>,
    /// Text of the synthesized alternative, when a trace ran.
    pub alternative: Option<String>,
}

pub struct Pipeline<'a> {
    engine: &'a dyn ContainerEngine,
    /// Most recent successful trace's alternative; single slot,
    /// overwritten per cycle.
    cache: Option<SynthesizedDockerfile>,
    stopped: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self {
            engine,
            cache: None,
            stopped: false,
        }
    }

    /// Run one analysis cycle.
    pub fn analyze(&mut self, request: &AnalyzeRequest) -> Result<CycleReport> {
        if !request.dockerfile.is_file() {
            return Err(RefitError::MissingDockerfile(request.dockerfile.clone()));
        }
        let text = std::fs::read_to_string(&request.dockerfile)?;
        let document = Document::new(text);
        let parsed = Dockerfile::parse(document.text());
        if parsed.is_empty() {
            warn!(path = %request.dockerfile.display(), "Dockerfile has no instructions");
        }

        let mut diagnostics = rules::check(&parsed);

        if !request.static_only {
            if self.stopped {
                warn!("pipeline is stopped; skipping trace stages until restart");
            } else {
                let alternative = self.run_trace_cycle(&document, &parsed, request)?;
                self.cache = Some(alternative);
            }
        }

        if let Some(alternative) = &self.cache {
            diagnostics.extend(reconcile::reconcile(&parsed, alternative.dockerfile()));
        }

        let context = RepairContext {
            alternative: self.cache.as_ref().map(SynthesizedDockerfile::text),
        };
        let repairs = diagnostics
            .iter()
            .filter_map(|diagnostic| {
                repair::generate(diagnostic, &document, &context).map(|edit| Repair {
                    code: diagnostic.code.clone(),
                    edit,
                })
            })
            .collect();

        Ok(CycleReport {
            diagnostics,
            repairs,
            alternative: self.cache.as_ref().map(|alt| alt.text().to_string()),
        })
    }

    /// Trace the application and synthesize the alternative Dockerfile.
    fn run_trace_cycle(
        &self,
        document: &Document,
        parsed: &Dockerfile,
        request: &AnalyzeRequest,
    ) -> Result<SynthesizedDockerfile> {
        let start_words = start_command_words(parsed, request.start_command.as_deref());
        let profile = features::inspect_language(&request.workspace, &start_words);

        let driver = TraceDriver::new(self.engine);
        let trace_request = TraceRequest {
            source_root: request.workspace.clone(),
            dockerfile_text: document.text().to_string(),
            start_command: request.start_command.clone(),
            duration: request.duration,
            live_container: request.live_container.clone(),
            ignored_paths: profile
                .ignored_paths
                .iter()
                .map(|path| path.to_string())
                .collect(),
        };
        let outcome = driver.trace(&trace_request)?;

        let ports = features::extract_ports(syscall_log::parse(&outcome.log_text));
        let packages = match &outcome.package_listing {
            Some(listing) => {
                features::filter_baseline(features::parse_package_listing(listing))
            }
            None => Vec::new(),
        };
        info!(
            ports = ports.len(),
            packages = packages.len(),
            "extracted runtime features"
        );

        let observed = Features { ports, packages };
        Ok(synthesize::synthesize(document.text(), &observed, &profile))
    }

    /// Tear down trace state and refuse new trace cycles until restarted.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.cache = None;
    }

    /// Dispose the previous cycle's state and allow tracing again.
    pub fn restart(&mut self) {
        self.stopped = false;
        self.cache = None;
    }

    pub fn alternative(&self) -> Option<&SynthesizedDockerfile> {
        self.cache.as_ref()
    }
}

/// The words of the service start command, preferring the caller's
/// explicit command over the file's CMD/ENTRYPOINT.
fn start_command_words(parsed: &Dockerfile, explicit: Option<&str>) -> Vec<String> {
    if let Some(command) = explicit {
        return command.split_whitespace().map(str::to_string).collect();
    }
    for keyword in ["CMD", "ENTRYPOINT"] {
        if let Some(instruction) = parsed.instructions_with_keyword(keyword).first() {
            let words = instruction.command_words();
            if !words.is_empty() {
                return words;
            }
        }
    }
    Vec::new()
}

/// Write the repaired text: every edit from one report applied to the
/// snapshot it was computed against.
pub fn apply_repairs(dockerfile: &Path, report: &CycleReport) -> Result<()> {
    let text = std::fs::read_to_string(dockerfile)?;
    let document = Document::new(text);
    let edits: Vec<RepairEdit> = report.repairs.iter().map(|r| r.edit.clone()).collect();
    let repaired = crate::document::apply_edits(&document, &edits);
    std::fs::write(dockerfile, repaired)?;
    Ok(())
}
