//! Error taxonomy for the trace-and-repair pipeline
//!
//! Three classes matter to callers: the container engine being unreachable
//! (fatal, nothing useful can run), an image build failure (fatal for the
//! cycle, the user's Dockerfile is broken), and degraded extraction (a
//! single feature could not be computed; the cycle continues without it).

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the refit pipeline.
#[derive(Debug, Error)]
pub enum RefitError {
    /// The container engine binary or daemon is unreachable. Fatal for the
    /// current cycle; no partial diagnostics are emitted.
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The instrumented image failed to build. The user's Dockerfile (or its
    /// dependencies) is broken; the cycle is aborted without reusing stale
    /// trace data.
    #[error("image build failed: {0}")]
    BuildFailed(String),

    /// A container-level operation (run, exec, stop, remove, copy) failed.
    #[error("container operation '{operation}' failed: {detail}")]
    ContainerOp { operation: String, detail: String },

    /// A specific feature extraction degraded to "no data". Recoverable:
    /// the caller substitutes an empty feature value and continues.
    #[error("feature extraction degraded ({feature}): {detail}")]
    ExtractionDegraded { feature: String, detail: String },

    #[error("no Dockerfile found at {0}")]
    MissingDockerfile(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RefitError>;

impl RefitError {
    /// True for errors that abort the whole cycle rather than degrading a
    /// single feature.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RefitError::ExtractionDegraded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_is_not_fatal() {
        let err = RefitError::ExtractionDegraded {
            feature: "ports".to_string(),
            detail: "log unreadable".to_string(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_engine_unavailable_is_fatal() {
        let err = RefitError::EngineUnavailable("docker not found".to_string());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("docker not found"));
    }
}
