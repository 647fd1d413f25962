//! Reconciliation engine: diff the declared Dockerfile against the
//! trace-derived alternative
//!
//! Three independent comparisons, each yielding at most one diagnostic:
//! OS-package dependencies, exposed ports, and language package-manager
//! install commands. Ranges are always computed over the original
//! document, and every check degrades to "no diagnostic" when its anchor
//! instruction does not exist. The engine is pure: given its two parsed
//! inputs it performs no I/O, so every case is unit-testable.

use crate::diagnostics::{DiagnosticSource, Range, RepairDiagnostic};
use crate::dockerfile::{Distro, Dockerfile, Instruction, Runtime};

const DEPS_MISSING_MSG: &str =
    "Some dependencies that are missing from this Dockerfile have been detected.";
const DEPS_MISMATCH_MSG: &str = "The dependencies being installed don't match the detected ones.";
const DEPS_UNNECESSARY_MSG: &str = "Some dependencies are being installed unnecessarily. No dependencies need to be installed using the system's package manager.";
const DEPS_SUFFIX: &str = "HERMITDEPS";

const PORTS_MISSING_MSG: &str = "Some ports that could be exposed were detected.";
const PORTS_MISMATCH_MSG: &str = "Some mistakes were detected with the ports being exposed.";
const PORTS_SUFFIX: &str = "HERMITPORTS";

const LANG_DEPS_MSG: &str = "Some commands that are needed to install dependencies from the language's package manager are missing.";
const LANG_DEPS_SUFFIX: &str = "HERMITLANGDEPS";

/// Diff the original against the synthesized alternative.
pub fn reconcile(original: &Dockerfile, synthesized: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    if let Some(problem) = check_dependencies(original, synthesized) {
        problems.push(problem);
    }
    if let Some(problem) = check_ports(original, synthesized) {
        problems.push(problem);
    }
    if let Some(problem) = check_language_deps(original, synthesized) {
        problems.push(problem);
    }

    problems
}

fn trace_diagnostic(range: Range, message: String, suffix: &str) -> RepairDiagnostic {
    RepairDiagnostic::new(range, message, suffix, DiagnosticSource::TraceReconciliation)
}

/// Compare OS-package dependency sets.
fn check_dependencies(
    original: &Dockerfile,
    synthesized: &Dockerfile,
) -> Option<RepairDiagnostic> {
    let distro = original.distro();
    let keyword = distro.package_manager_keyword();

    let original_instructions = original.run_instructions_with_arg(keyword);
    let synthesized_instructions = synthesized.run_instructions_with_arg(keyword);

    let original_deps = gather_from_instructions(&original_instructions, distro);
    let synthesized_deps = gather_from_instructions(&synthesized_instructions, distro);

    if !synthesized_instructions.is_empty() && original_instructions.is_empty() {
        let range = original.range_after_from()?;
        if synthesized_deps.is_empty() {
            return None;
        }
        return Some(trace_diagnostic(
            range,
            format!(
                "{DEPS_MISSING_MSG} The following dependencies should be installed: {}.",
                synthesized_deps.join(",")
            ),
            DEPS_SUFFIX,
        ));
    }

    if !synthesized_instructions.is_empty() && !original_instructions.is_empty() {
        if deps_reconciled(&original_deps, &synthesized_deps, original) {
            return None;
        }
        let first = original_instructions.first()?;
        let last = original_instructions.last()?;
        let range = restrict_range(first, keyword)
            .unwrap_or_else(|| Range::new(first.range().start, last.range().end));
        return Some(trace_diagnostic(
            range,
            format!(
                "{DEPS_MISMATCH_MSG} The following dependencies should be installed: {}.",
                synthesized_deps.join(",")
            ),
            DEPS_SUFFIX,
        ));
    }

    if synthesized_instructions.is_empty() && !original_instructions.is_empty() {
        if deps_reconciled(&original_deps, &synthesized_deps, original) {
            return None;
        }
        let first = original_instructions.first()?;
        let last = original_instructions.last()?;
        let range = Range::new(first.range().start, last.range().end);
        return Some(trace_diagnostic(
            range,
            DEPS_UNNECESSARY_MSG.to_string(),
            DEPS_SUFFIX,
        ));
    }

    None
}

/// Compare exposed port sets.
fn check_ports(original: &Dockerfile, synthesized: &Dockerfile) -> Option<RepairDiagnostic> {
    let original_exposes = original.exposes();
    let synthesized_exposes = synthesized.exposes();

    let first_args = |instructions: &[&Instruction]| -> Option<Vec<String>> {
        instructions
            .iter()
            .map(|instruction| {
                instruction
                    .arguments()
                    .first()
                    .map(|arg| arg.value().to_string())
            })
            .collect()
    };

    if !synthesized_exposes.is_empty() && original_exposes.is_empty() {
        let range = original.range_before_end()?;
        let ports = first_args(&synthesized_exposes)?;
        if ports.is_empty() {
            return None;
        }
        return Some(trace_diagnostic(
            range,
            format!(
                "{PORTS_MISSING_MSG} The following port(s) should be exposed: {}.",
                ports.join(",")
            ),
            PORTS_SUFFIX,
        ));
    }

    if !synthesized_exposes.is_empty() && !original_exposes.is_empty() {
        let original_ports = first_args(&original_exposes)?;
        let synthesized_ports = first_args(&synthesized_exposes)?;
        if original_ports.is_empty() || synthesized_ports.is_empty() {
            return None;
        }

        let mismatched = synthesized_ports
            .iter()
            .any(|port| !original_ports.contains(port))
            || original_ports
                .iter()
                .any(|port| !synthesized_ports.contains(port));

        if mismatched {
            let range = Range::new(
                original_exposes.first()?.range().start,
                original_exposes.last()?.range().end,
            );
            return Some(trace_diagnostic(
                range,
                format!(
                    "{PORTS_MISMATCH_MSG} The following port(s) should be exposed: {}.",
                    synthesized_ports.join(",")
                ),
                PORTS_SUFFIX,
            ));
        }
    }

    None
}

/// Compare language-level package-manager install commands.
fn check_language_deps(
    original: &Dockerfile,
    synthesized: &Dockerfile,
) -> Option<RepairDiagnostic> {
    let keywords: &[&str] = match original.runtime() {
        Runtime::Node => &["npm"],
        Runtime::Python => &["pip", "pip3"],
    };

    let mut original_instructions = Vec::new();
    let mut synthesized_instructions = Vec::new();
    for keyword in keywords {
        original_instructions.extend(original.run_instructions_with_arg(keyword));
        synthesized_instructions.extend(synthesized.run_instructions_with_arg(keyword));
    }

    let range = original.range_after_copy()?;

    if original_instructions.is_empty() && !synthesized_instructions.is_empty() {
        return Some(trace_diagnostic(
            range,
            LANG_DEPS_MSG.to_string(),
            LANG_DEPS_SUFFIX,
        ));
    }

    None
}

/// Gather the semantic package list from a set of package-manager RUN
/// instructions.
pub fn gather_from_instructions(instructions: &[&Instruction], distro: Distro) -> Vec<String> {
    let mut deps = Vec::new();
    for instruction in instructions {
        let args: Vec<&str> = instruction.arg_values().collect();
        deps.extend(gather_packages(&args, distro));
    }
    deps
}

/// Shell-token walk shared by both sides of the diff: start gathering
/// right after `apt-get install` / `apk add`, stop at `&&`, skip
/// `-`-prefixed flags and the `apt-get update` sub-invocation.
pub fn gather_packages(args: &[&str], distro: Distro) -> Vec<String> {
    let keyword = distro.package_manager_keyword();
    let install = distro.install_keyword();

    let mut deps = Vec::new();
    let mut gathering = false;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i];

        if arg == "&&" {
            gathering = false;
        }

        if arg.starts_with('-') {
            i += 1;
            continue;
        }

        if gathering {
            deps.push(arg.to_string());
        }

        if arg == keyword && args.get(i + 1).copied() == Some(install) {
            gathering = true;
            i += 1;
        }

        i += 1;
    }

    deps
}

/// Order-insensitive set equality.
fn sets_equal(left: &[String], right: &[String]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    left.sort();
    right.sort();
    left == right
}

/// True when no dependency diagnostic is needed: the sets already match,
/// or every declared package is independently referenced by another RUN
/// command. The latter is a heuristic against flagging build-time-only
/// tooling that never shows up in the trace.
fn deps_reconciled(
    original_deps: &[String],
    synthesized_deps: &[String],
    original: &Dockerfile,
) -> bool {
    let some_declared_dep_needed = original_deps
        .iter()
        .any(|dep| is_dependency_needed(dep, original));

    some_declared_dep_needed || sets_equal(original_deps, synthesized_deps)
}

/// A declared dependency counts as needed when any RUN argument in command
/// position (first token, or right after `&&`) is a substring of its name.
fn is_dependency_needed(dependency: &str, dockerfile: &Dockerfile) -> bool {
    for instruction in dockerfile.instructions_with_keyword("RUN") {
        let args: Vec<&str> = instruction.arg_values().collect();
        for (i, arg) in args.iter().enumerate() {
            if !dependency.contains(arg) {
                continue;
            }
            if i == 0 || args[i - 1] == "&&" {
                return true;
            }
        }
    }
    false
}

/// Narrow a package-manager RUN's range to the span from the keyword in
/// command position up to the following `&&` (or the end of the
/// instruction).
pub fn restrict_range(instruction: &Instruction, keyword: &str) -> Option<Range> {
    let args = instruction.arguments();

    let mut in_span = false;
    let mut start = None;
    let mut end = None;

    for (i, arg) in args.iter().enumerate() {
        if arg.value() == "&&" && in_span {
            in_span = false;
            end = Some(args[i - 1].range().end);
        }

        if arg.value() == keyword && (i == 0 || args[i - 1].value() == "&&") {
            in_span = true;
            start = Some(arg.range().start);
        }
    }

    if in_span {
        end = args.last().map(|arg| arg.range().end);
    }

    Some(Range::new(start?, end?))
}
