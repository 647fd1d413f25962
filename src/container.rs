//! Container engine client
//!
//! The pipeline consumes a small build/run/exec/remove surface through the
//! [`ContainerEngine`] trait; [`DockerCli`] implements it by shelling out
//! to the `docker` binary. A missing binary or unreachable daemon maps to
//! [`RefitError::EngineUnavailable`] so the caller can fail the cycle fast,
//! while per-operation failures keep their stderr for context.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::error::{RefitError, Result};

/// Bind mount from a host path into the container.
#[derive(Debug, Clone)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
}

/// The container-engine operations the trace driver and feature extractor
/// need. Kept narrow so tests can substitute a scripted fake.
pub trait ContainerEngine {
    /// Fails fast when the engine binary or daemon is unreachable.
    fn ping(&self) -> Result<()>;

    /// Build an image from `context` using the given Dockerfile (which may
    /// live outside the context), tagging it `tag`.
    fn build_image(&self, context: &Path, dockerfile: &Path, tag: &str) -> Result<()>;

    /// Start a container detached; returns the container id.
    fn run_detached(
        &self,
        image: &str,
        command: Option<&[String]>,
        mounts: &[BindMount],
    ) -> Result<String>;

    /// Run a command in a fresh container of `image` and capture stdout.
    fn run_capture(&self, image: &str, command: &[&str]) -> Result<String>;

    /// Run a command inside a live container and capture stdout.
    fn exec(&self, container: &str, command: &[&str]) -> Result<String>;

    /// Copy a file out of a container to a host path.
    fn copy_from(&self, container: &str, source: &str, dest: &Path) -> Result<()>;

    fn stop(&self, container: &str) -> Result<()>;

    fn remove_container(&self, container: &str) -> Result<()>;

    fn remove_image(&self, image: &str) -> Result<()>;
}

/// `docker` CLI implementation of [`ContainerEngine`].
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Use an alternative engine binary (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, operation: &str, args: &[&str]) -> Result<Output> {
        debug!(engine = %self.binary, ?args, "engine invocation");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    RefitError::EngineUnavailable(format!("{} not found in PATH", self.binary))
                } else {
                    RefitError::ContainerOp {
                        operation: operation.to_string(),
                        detail: err.to_string(),
                    }
                }
            })?;
        Ok(output)
    }

    fn run_checked(&self, operation: &str, args: &[&str]) -> Result<Output> {
        let output = self.run(operation, args)?;
        if !output.status.success() {
            return Err(RefitError::ContainerOp {
                operation: operation.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine for DockerCli {
    fn ping(&self) -> Result<()> {
        let output = self.run("ping", &["info", "--format", "{{.ServerVersion}}"])?;
        if !output.status.success() {
            return Err(RefitError::EngineUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    fn build_image(&self, context: &Path, dockerfile: &Path, tag: &str) -> Result<()> {
        let context = context.to_string_lossy();
        let dockerfile = dockerfile.to_string_lossy();
        let output = self.run(
            "build",
            &[
                "build",
                "--force-rm",
                "-q",
                "-t",
                tag,
                "-f",
                &dockerfile,
                &context,
            ],
        )?;
        if !output.status.success() {
            // A failed build is the user's Dockerfile failing, not ours.
            return Err(RefitError::BuildFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    fn run_detached(
        &self,
        image: &str,
        command: Option<&[String]>,
        mounts: &[BindMount],
    ) -> Result<String> {
        let mut args: Vec<String> = vec!["run".to_string(), "-d".to_string()];
        for mount in mounts {
            args.push("-v".to_string());
            args.push(format!("{}:{}", mount.host_path, mount.container_path));
        }
        args.push(image.to_string());
        if let Some(command) = command {
            args.extend(command.iter().cloned());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_checked("run", &arg_refs)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_capture(&self, image: &str, command: &[&str]) -> Result<String> {
        let mut args = vec!["run", "--rm", image];
        args.extend_from_slice(command);
        let output = self.run_checked("run", &args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn exec(&self, container: &str, command: &[&str]) -> Result<String> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        let output = self.run_checked("exec", &args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn copy_from(&self, container: &str, source: &str, dest: &Path) -> Result<()> {
        let from = format!("{container}:{source}");
        let dest = dest.to_string_lossy();
        self.run_checked("cp", &["cp", &from, &dest])?;
        Ok(())
    }

    fn stop(&self, container: &str) -> Result<()> {
        self.run_checked("stop", &["stop", "-t", "2", container])?;
        Ok(())
    }

    fn remove_container(&self, container: &str) -> Result<()> {
        self.run_checked("rm", &["rm", "-f", container])?;
        Ok(())
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        self.run_checked("rmi", &["rmi", "-f", image])?;
        Ok(())
    }
}
