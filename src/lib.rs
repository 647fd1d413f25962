//! Refit - Trace-driven Dockerfile analysis and repair
//!
//! This library builds an instrumented variant of a Dockerfile, traces the
//! containerized application's system calls for a bounded interval, and
//! reconciles what the application actually needs (ports, OS packages,
//! language dependencies) against what the Dockerfile declares. Problems
//! surface as range-anchored diagnostics with stable codes, each paired
//! with a deterministic text repair.

pub mod cli;
pub mod container;
pub mod diagnostics;
pub mod dockerfile;
pub mod document;
pub mod error;
pub mod features;
pub mod language;
pub mod pipeline;
pub mod reconcile;
pub mod repair;
pub mod rules;
pub mod synthesize;
pub mod syscall_log;
pub mod trace_driver;
