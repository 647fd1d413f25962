//! Trace driver: build an instrumented image, run it, recover the log
//!
//! The driver takes the user's Dockerfile, derives an instrumented variant
//! that wraps the start command in strace, builds it under a fresh random
//! tag, lets the container run for a bounded duration, and pulls the
//! syscall log back out. When a live container is named it attaches the
//! tracer to that container instead of rebuilding. Every temporary
//! artifact — scratch directory, instrumented build file, ignore file,
//! container, image — is released on every exit path; only the log text
//! (and the package listing captured before teardown) survive the cycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::container::{BindMount, ContainerEngine};
use crate::dockerfile::{Distro, Dockerfile};
use crate::error::Result;

/// Bounded trace window used when the caller does not specify one.
pub const DEFAULT_TRACE_DURATION_SECS: u64 = 5;

const SYSCALL_LOG_NAME: &str = "syscall.log";
const INSTRUMENTED_DOCKERFILE_NAME: &str = "Dockerfile.strace";
/// Mount point of the scratch directory inside the traced container.
const CONTAINER_SCRATCH_DIR: &str = "/tmp/refit";

/// What to trace and for how long.
#[derive(Debug, Clone)]
pub struct TraceRequest {
    pub source_root: PathBuf,
    pub dockerfile_text: String,
    /// Explicit start command; when absent the Dockerfile's CMD/ENTRYPOINT
    /// is wrapped instead.
    pub start_command: Option<String>,
    pub duration: Duration,
    /// Attach to this live container instead of building an image.
    pub live_container: Option<String>,
    /// Patterns the ignore-file should exclude from the build context.
    pub ignored_paths: Vec<String>,
}

/// What a trace cycle hands to the next stage. The syscall log may be
/// partial (a short trace window is expected); the package listing is
/// captured before the image is torn down and is None when the query
/// failed.
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    pub log_text: String,
    pub package_listing: Option<String>,
}

/// Removes containers, images and the ignore-file when the cycle ends,
/// on success and failure alike.
struct CycleGuard<'a> {
    engine: &'a dyn ContainerEngine,
    container: Option<String>,
    image: Option<String>,
    dockerignore: Option<PathBuf>,
}

impl<'a> CycleGuard<'a> {
    fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self {
            engine,
            container: None,
            image: None,
            dockerignore: None,
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if let Some(container) = self.container.take() {
            if let Err(err) = self.engine.remove_container(&container) {
                warn!(%container, %err, "failed to remove traced container");
            }
        }
        if let Some(image) = self.image.take() {
            if let Err(err) = self.engine.remove_image(&image) {
                warn!(%image, %err, "failed to remove instrumented image");
            }
        }
        if let Some(path) = self.dockerignore.take() {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), %err, "failed to remove ignore-file");
            }
        }
    }
}

pub struct TraceDriver<'a> {
    engine: &'a dyn ContainerEngine,
}

impl<'a> TraceDriver<'a> {
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self { engine }
    }

    /// Run one bounded trace cycle.
    ///
    /// Fails fast when the engine is unreachable and surfaces image build
    /// errors as build failures. A trace that produced no log degrades to
    /// an empty log rather than failing: partial data is valid data.
    pub fn trace(&self, request: &TraceRequest) -> Result<TraceOutcome> {
        self.engine.ping()?;

        match &request.live_container {
            Some(container) => self.trace_live(container, request.duration),
            None => self.trace_fresh(request),
        }
    }

    fn trace_fresh(&self, request: &TraceRequest) -> Result<TraceOutcome> {
        let scratch = tempfile::tempdir()?;
        let mut guard = CycleGuard::new(self.engine);

        let dockerfile = Dockerfile::parse(&request.dockerfile_text);
        let distro = dockerfile.distro();

        let instrumented = instrument_dockerfile(
            &request.dockerfile_text,
            &dockerfile,
            distro,
            request.start_command.as_deref(),
        );
        let instrumented_path = scratch.path().join(INSTRUMENTED_DOCKERFILE_NAME);
        std::fs::write(&instrumented_path, &instrumented)?;

        guard.dockerignore = write_dockerignore(&request.source_root, &request.ignored_paths)?;

        let tag = fresh_image_tag();
        info!(%tag, "building instrumented image");
        self.engine
            .build_image(&request.source_root, &instrumented_path, &tag)?;
        guard.image = Some(tag.clone());

        let mounts = [BindMount {
            host_path: scratch.path().to_string_lossy().into_owned(),
            container_path: CONTAINER_SCRATCH_DIR.to_string(),
        }];
        let container = self.engine.run_detached(&tag, None, &mounts)?;
        guard.container = Some(container.clone());

        debug!(%container, seconds = request.duration.as_secs(), "tracing");
        std::thread::sleep(request.duration);

        // The trace window simply elapsed; a stop error here usually means
        // the process already exited, which is fine.
        if let Err(err) = self.engine.stop(&container) {
            debug!(%err, "container already stopped");
        }

        let log_text = read_log(&scratch.path().join(SYSCALL_LOG_NAME));
        let package_listing = self.query_packages(&tag, distro);

        Ok(TraceOutcome {
            log_text,
            package_listing,
        })
    }

    /// Attach the tracer to an already-running container without rebuilding.
    fn trace_live(&self, container: &str, duration: Duration) -> Result<TraceOutcome> {
        let scratch = tempfile::tempdir()?;
        let seconds = duration.as_secs().max(1).to_string();
        let log_in_container = format!("{CONTAINER_SCRATCH_DIR}/{SYSCALL_LOG_NAME}");
        let command = format!(
            "mkdir -p {CONTAINER_SCRATCH_DIR} && timeout {seconds} strace -f -T -s 256 -o {log_in_container} -p 1"
        );

        // timeout(1) exits nonzero when it kills the tracer; the log is
        // still there, so only log the condition.
        if let Err(err) = self.engine.exec(container, &["sh", "-c", &command]) {
            debug!(%err, "tracer window closed");
        }

        let host_log = scratch.path().join(SYSCALL_LOG_NAME);
        if let Err(err) = self.engine.copy_from(container, &log_in_container, &host_log) {
            warn!(%err, "could not copy syscall log from live container");
        }

        let package_listing = self
            .engine
            .exec(container, &["sh", "-c", "apt list --installed 2>/dev/null || apk info"])
            .map_err(|err| {
                warn!(%err, "package query failed in live container");
                err
            })
            .ok();

        Ok(TraceOutcome {
            log_text: read_log(&host_log),
            package_listing,
        })
    }

    fn query_packages(&self, image: &str, distro: Distro) -> Option<String> {
        let command: &[&str] = match distro {
            Distro::Debian => &["sh", "-c", "apt list --installed"],
            Distro::Alpine => &["sh", "-c", "apk info"],
        };
        match self.engine.run_capture(image, command) {
            Ok(output) => Some(output),
            Err(err) => {
                warn!(%err, "package query failed, degrading to no package data");
                None
            }
        }
    }
}

/// A missing or unreadable log degrades to empty: the trace window may
/// have closed before the tracer flushed anything.
fn read_log(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), %err, "syscall log unreadable, continuing without trace data");
            String::new()
        }
    }
}

/// Random lowercase image tag so concurrent or crashed runs never collide.
fn fresh_image_tag() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    format!("refit-{}", suffix.to_lowercase())
}

/// Derive the instrumented Dockerfile: the original steps, a tracer
/// install, and a CMD that runs the start command under strace writing to
/// the mounted scratch directory.
fn instrument_dockerfile(
    original_text: &str,
    dockerfile: &Dockerfile,
    distro: Distro,
    start_command: Option<&str>,
) -> String {
    let newline = if original_text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    };

    let mut out = original_text.trim_end().to_string();
    out.push_str(newline);

    match distro {
        Distro::Debian => {
            out.push_str("RUN apt-get update && apt-get install -y strace");
        }
        Distro::Alpine => {
            out.push_str("RUN apk add --no-cache strace");
        }
    }
    out.push_str(newline);

    let target = match start_command {
        Some(command) => command.to_string(),
        None => wrapped_start_command(dockerfile),
    };
    out.push_str(&format!(
        "CMD mkdir -p {CONTAINER_SCRATCH_DIR} && strace -f -T -s 256 -o {CONTAINER_SCRATCH_DIR}/{SYSCALL_LOG_NAME} {target}"
    ));
    out.push_str(newline);
    out
}

/// Recover the original start command from CMD (preferred) or ENTRYPOINT.
fn wrapped_start_command(dockerfile: &Dockerfile) -> String {
    for keyword in ["CMD", "ENTRYPOINT"] {
        if let Some(instruction) = dockerfile.instructions_with_keyword(keyword).first() {
            let words = instruction.command_words();
            if !words.is_empty() {
                return words.join(" ");
            }
        }
    }
    // Nothing to wrap; trace the shell so at least startup syscalls land.
    "sh".to_string()
}

/// Write the ignore-file when the project has none; returns the path to
/// delete afterwards, or None when a user file already existed.
fn write_dockerignore(source_root: &Path, ignored_paths: &[String]) -> Result<Option<PathBuf>> {
    let path = source_root.join(".dockerignore");
    if path.exists() {
        return Ok(None);
    }
    let mut content = String::from(".git\n");
    for pattern in ignored_paths {
        content.push_str(pattern);
        content.push('\n');
    }
    std::fs::write(&path, content)?;
    Ok(Some(path))
}
