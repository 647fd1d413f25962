//! Diagnostic and edit types shared by the reconciliation engine, the
//! static rule checks and the repair synthesizer
//!
//! Diagnostic codes are the wire contract with external consumers: stable,
//! untranslated strings. Every code maps to exactly one repair generator in
//! [`crate::repair`].

use serde::{Deserialize, Serialize};

/// Zero-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open range over a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Empty range at a single position (pure insertion point).
    pub fn collapsed(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }
}

/// Diagnostic severity, mirroring the editor protocol values we emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Which analysis produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticSource {
    /// Static best-practice rule over the declared instructions.
    StaticRule,
    /// Diff against the trace-derived alternative Dockerfile.
    TraceReconciliation,
}

/// A repairable problem anchored to a range in the original document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairDiagnostic {
    pub range: Range,
    pub message: String,
    /// Stable code identifying both the problem class and its repair
    /// generator, e.g. `R:HERMITPORTS`.
    pub code: String,
    pub severity: Severity,
    pub source: DiagnosticSource,
}

impl RepairDiagnostic {
    /// Build a warning diagnostic with the standard `R:` code prefix.
    pub fn new(
        range: Range,
        message: impl Into<String>,
        code_suffix: &str,
        source: DiagnosticSource,
    ) -> Self {
        Self {
            range,
            message: message.into(),
            code: format!("R:{code_suffix}"),
            severity: Severity::Warning,
            source,
        }
    }
}

/// A deterministic text replacement over the original document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairEdit {
    pub range: Range,
    pub replacement: String,
}

/// Stable diagnostic codes. External consumers dispatch repair generation
/// purely on these strings; never rename them.
pub mod codes {
    pub const HERMIT_DEPS: &str = "R:HERMITDEPS";
    pub const HERMIT_PORTS: &str = "R:HERMITPORTS";
    pub const HERMIT_LANG_DEPS: &str = "R:HERMITLANGDEPS";
    pub const NO_ROOT_USER: &str = "R:NOROOTUSER";
    pub const SINGLE_COPY: &str = "R:SINGLECOPY";
    pub const APT_LIST: &str = "R:APTLIST";
    pub const CONSECUTIVE_RUN: &str = "R:CONSECUTIVERUN";
    pub const NO_IMAGE_PIN: &str = "R:NOIMAGEPIN";
    pub const NO_CACHE: &str = "R:NOCACHE";
    pub const F_CURL: &str = "R:FCURL";
    pub const NO_HTTP_URL: &str = "R:NOHTTPURL";
    pub const NO_CD: &str = "R:NOCD";
    pub const NO_ADD: &str = "R:NOADD";
    pub const NO_MAINTAINER: &str = "R:NOMAINTAINER";
    pub const NO_ROOT_DIR: &str = "R:NOROOTDIR";
    pub const NO_INSTALL_RECOMMENDS: &str = "R:NOINSTALLRECOMMENDS";
    pub const UPDATE_BEFORE_INSTALL: &str = "R:UPDATEBEFOREINSTALL";
    pub const CONFIRM_INSTALL: &str = "R:CONFIRMINSTALL";

    /// All codes with a repair generator, in no particular order.
    pub const ALL: &[&str] = &[
        HERMIT_DEPS,
        HERMIT_PORTS,
        HERMIT_LANG_DEPS,
        NO_ROOT_USER,
        SINGLE_COPY,
        APT_LIST,
        CONSECUTIVE_RUN,
        NO_IMAGE_PIN,
        NO_CACHE,
        F_CURL,
        NO_HTTP_URL,
        NO_CD,
        NO_ADD,
        NO_MAINTAINER,
        NO_ROOT_DIR,
        NO_INSTALL_RECOMMENDS,
        UPDATE_BEFORE_INSTALL,
        CONFIRM_INSTALL,
    ];
}
