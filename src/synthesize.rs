//! Alternative-Dockerfile synthesis
//!
//! Merges the user's Dockerfile with the features observed at runtime and
//! the active language profile into a complete alternative build
//! description. The result is a comparison oracle for one reconciliation
//! cycle, not a recommended final artifact: it is diffed against the
//! original and then discarded.
//!
//! Synthesis is idempotent with respect to the original: an instruction
//! that is already functionally present (an install RUN for the same
//! package manager, an EXPOSE for the same port, an identical ENV) is
//! never emitted a second time, so running the cycle against an
//! already-repaired file produces a diff-free alternative.

use tracing::debug;

use crate::dockerfile::{Distro, Dockerfile};
use crate::features::Features;
use crate::language::LanguageProfile;

/// The alternative build description, kept both as text (repairs copy
/// instruction lines out of it verbatim) and parsed (the reconciliation
/// diff uses the same accessors on both sides).
#[derive(Debug, Clone)]
pub struct SynthesizedDockerfile {
    text: String,
    dockerfile: Dockerfile,
}

impl SynthesizedDockerfile {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn dockerfile(&self) -> &Dockerfile {
        &self.dockerfile
    }
}

/// Build the alternative Dockerfile from the original plus observed
/// features and the language profile.
pub fn synthesize(
    original_text: &str,
    features: &Features,
    profile: &LanguageProfile,
) -> SynthesizedDockerfile {
    let original = Dockerfile::parse(original_text);
    let distro = original.distro();
    let newline = if original_text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    };

    let mut lines: Vec<String> = original_text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }

    // Inserts are collected as (line index, text) against the original
    // line numbering and applied bottom-up.
    let mut inserts: Vec<(usize, String)> = Vec::new();

    if let Some(install) = os_install_line(&original, features, profile, distro) {
        inserts.push((after_from_line(&original), install));
    }

    for env_var in &profile.env_vars {
        let line = format!("ENV {env_var}");
        if !lines.iter().any(|existing| existing.trim() == line) {
            inserts.push((after_from_line(&original), line));
        }
    }

    for command in language_install_lines(&original, profile) {
        inserts.push((after_copy_line(&original), command));
    }

    for port in missing_expose_ports(&original, features) {
        inserts.push((before_end_line(&original, &lines), format!("EXPOSE {port}")));
    }

    debug!(count = inserts.len(), "synthesizing alternative instructions");

    // Stable-sort ascending, then apply in reverse so indices stay valid
    // and inserts targeting the same line keep their emission order.
    inserts.sort_by_key(|(line, _)| *line);
    for (line, text) in inserts.into_iter().rev() {
        let line = line.min(lines.len());
        lines.insert(line, text);
    }

    let mut text = lines.join(newline);
    text.push_str(newline);

    let dockerfile = Dockerfile::parse(&text);
    SynthesizedDockerfile { text, dockerfile }
}

/// The OS-package install RUN, distro-templated; None when there is
/// nothing to install or the original already installs through the same
/// package manager.
fn os_install_line(
    original: &Dockerfile,
    features: &Features,
    profile: &LanguageProfile,
    distro: Distro,
) -> Option<String> {
    let mut packages: Vec<&str> = Vec::new();
    for pkg in features.packages.iter().chain(profile.os_packages.iter()) {
        if !packages.contains(&pkg.as_str()) {
            packages.push(pkg);
        }
    }
    if packages.is_empty() {
        return None;
    }

    let already_installs = !original
        .run_instructions_with_arg(distro.package_manager_keyword())
        .is_empty();
    if already_installs {
        return None;
    }

    let joined = packages.join(" ");
    Some(match distro {
        Distro::Debian => format!("RUN apt-get update && apt-get install -y {joined}"),
        Distro::Alpine => format!("RUN apk add --no-cache {joined}"),
    })
}

/// Language-level install RUNs absent from the original. A command is
/// functionally present when the original already has a RUN mentioning its
/// leading binary (npm / pip / pip3).
fn language_install_lines(original: &Dockerfile, profile: &LanguageProfile) -> Vec<String> {
    profile
        .install_commands
        .iter()
        .filter(|command| {
            let Some(binary) = command.split_whitespace().next() else {
                return false;
            };
            original.run_instructions_with_arg(binary).is_empty()
        })
        .map(|command| format!("RUN {command}"))
        .collect()
}

/// Observed ports the original does not expose, first-seen order.
fn missing_expose_ports(original: &Dockerfile, features: &Features) -> Vec<u16> {
    let declared: Vec<String> = original
        .exposes()
        .iter()
        .filter_map(|expose| expose.arguments().first())
        .map(|arg| arg.value().to_string())
        .collect();

    features
        .ports
        .iter()
        .copied()
        .filter(|port| !declared.iter().any(|d| d == &port.to_string()))
        .collect()
}

fn after_from_line(original: &Dockerfile) -> usize {
    original
        .froms()
        .first()
        .map(|from| from.range().end.line as usize + 1)
        .unwrap_or(0)
}

fn after_copy_line(original: &Dockerfile) -> usize {
    original
        .copys()
        .first()
        .map(|copy| copy.range().end.line as usize + 1)
        .unwrap_or_else(|| after_from_line(original))
}

/// Line of the final instruction, so inserts land right before CMD or
/// ENTRYPOINT; appends at the end when the file has no instructions.
fn before_end_line(original: &Dockerfile, lines: &[String]) -> usize {
    original
        .instructions()
        .last()
        .map(|last| last.range().start.line as usize)
        .unwrap_or(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::profile_for_extension;

    const ORIGINAL: &str = "FROM python:3.11-slim\nWORKDIR /app\nCOPY . .\nCMD [\"python\", \"app.py\"]\n";

    fn python_profile() -> LanguageProfile {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        profile_for_extension("py", dir.path())
    }

    #[test]
    fn test_synthesize_adds_expose_before_last_instruction() {
        let features = Features {
            ports: vec![5000, 3000],
            packages: Vec::new(),
        };
        let profile = profile_for_extension("none", std::path::Path::new("."));

        let alternative = synthesize(ORIGINAL, &features, &profile);
        let exposes = alternative.dockerfile().exposes();
        assert_eq!(exposes.len(), 2);
        assert_eq!(exposes[0].arguments()[0].value(), "5000");
        assert_eq!(exposes[1].arguments()[0].value(), "3000");

        // Both land before CMD.
        let last = alternative.dockerfile().instructions().last().unwrap();
        assert_eq!(last.keyword(), "CMD");
    }

    #[test]
    fn test_synthesize_skips_exposed_ports() {
        let original = "FROM python\nEXPOSE 5000\nCMD python app.py\n";
        let features = Features {
            ports: vec![5000],
            packages: Vec::new(),
        };
        let profile = profile_for_extension("none", std::path::Path::new("."));

        let alternative = synthesize(original, &features, &profile);
        assert_eq!(alternative.dockerfile().exposes().len(), 1);
    }

    #[test]
    fn test_synthesize_debian_install_run() {
        let features = Features {
            ports: Vec::new(),
            packages: vec!["curl".to_string(), "ffmpeg".to_string()],
        };
        let profile = profile_for_extension("none", std::path::Path::new("."));

        let alternative = synthesize(ORIGINAL, &features, &profile);
        assert!(alternative
            .text()
            .contains("RUN apt-get update && apt-get install -y curl ffmpeg"));
    }

    #[test]
    fn test_synthesize_alpine_install_run() {
        let original = "FROM python:3.11-alpine\nCOPY . .\nCMD python app.py\n";
        let features = Features {
            ports: Vec::new(),
            packages: vec!["curl".to_string()],
        };
        let profile = profile_for_extension("none", std::path::Path::new("."));

        let alternative = synthesize(original, &features, &profile);
        assert!(alternative.text().contains("RUN apk add --no-cache curl"));
    }

    #[test]
    fn test_synthesize_does_not_duplicate_install_run() {
        let original =
            "FROM python\nRUN apt-get update && apt-get install -y curl\nCMD python app.py\n";
        let features = Features {
            ports: Vec::new(),
            packages: vec!["curl".to_string()],
        };
        let profile = profile_for_extension("none", std::path::Path::new("."));

        let alternative = synthesize(original, &features, &profile);
        assert_eq!(
            alternative
                .dockerfile()
                .run_instructions_with_arg("apt-get")
                .len(),
            1
        );
    }

    #[test]
    fn test_synthesize_language_installs_and_env() {
        let features = Features::default();
        let profile = python_profile();

        let alternative = synthesize(ORIGINAL, &features, &profile);
        assert!(alternative.text().contains("RUN pip3 install --upgrade pip"));
        assert!(alternative
            .text()
            .contains("RUN pip install -r ./requirements.txt --target local-site-packages"));
        assert!(alternative
            .text()
            .contains("ENV PYTHONPATH=./local-site-packages"));
        // The profile's native build packages surface in the install RUN.
        assert!(alternative.text().contains("build-essential"));
    }

    #[test]
    fn test_synthesize_skips_present_language_install() {
        let original = "FROM python\nCOPY . .\nRUN pip install -r requirements.txt\nCMD python app.py\n";
        let alternative = synthesize(original, &Features::default(), &python_profile());
        assert_eq!(
            alternative
                .dockerfile()
                .run_instructions_with_arg("pip")
                .len(),
            1
        );
    }

    #[test]
    fn test_synthesize_preserves_crlf() {
        let original = "FROM python\r\nCOPY . .\r\nCMD python app.py\r\n";
        let features = Features {
            ports: vec![8080],
            packages: Vec::new(),
        };
        let profile = profile_for_extension("none", std::path::Path::new("."));

        let alternative = synthesize(original, &features, &profile);
        assert!(!alternative.text().replace("\r\n", "").contains('\n'));
        assert!(alternative.text().contains("EXPOSE 8080"));
    }
}
