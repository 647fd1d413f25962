//! Feature extraction: what the traced application actually needs
//!
//! Three independent extractors feed the synthesizer: listening ports read
//! from `bind` syscall records, OS packages installed in the traced image
//! (queried through the package manager and filtered against the stock
//! base-image baseline), and the language profile chosen from the start
//! command. Each extractor degrades to "no data" on its own failure so one
//! missing feature never blocks the others.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::language::{profile_for_extension, LanguageProfile};
use crate::syscall_log::SyscallRecord;

/// Packages preinstalled in the stock debian-slim base images; these are
/// never reported as trace-derived dependencies.
const DEBIAN_BASE_PACKAGES: &str = include_str!("../resources/debian_base_packages.txt");

/// Observed runtime features, all independently optional.
#[derive(Debug, Clone, Default)]
pub struct Features {
    /// Listening ports in first-seen order, deduplicated, never 0.
    pub ports: Vec<u16>,
    /// OS packages beyond the base image, in first-seen order.
    pub packages: Vec<String>,
}

/// Scan `bind` records for listening ports.
///
/// Reads the port sub-field of the socket-address argument (IPv6
/// `sin6_port` first, IPv4 `sin_port` as fallback); values arrive either as
/// bare numbers or as `htons(n)` helper calls. Port 0 is wildcard noise and
/// is dropped, duplicates are dropped, first-observation order is kept.
pub fn extract_ports<I>(records: I) -> Vec<u16>
where
    I: IntoIterator<Item = SyscallRecord>,
{
    let mut ports = Vec::new();
    let mut seen = HashSet::new();

    for record in records {
        if record.name != "bind" {
            continue;
        }
        let Some(addr) = record.args.get(1) else {
            continue;
        };
        let field = addr.field("sin6_port").or_else(|| addr.field("sin_port"));
        let Some(value) = field.and_then(|f| f.first_param()) else {
            continue;
        };
        let Ok(port) = value.trim().parse::<u32>() else {
            continue;
        };
        if port == 0 || port > u16::MAX as u32 {
            continue;
        }
        let port = port as u16;
        if seen.insert(port) {
            ports.push(port);
        }
    }

    ports
}

/// Parse `apt list --installed` / `apk info` output into package names.
///
/// One package per output line; ANSI color codes and terminal decoration
/// are stripped, and only the token before the first `/` (distro metadata
/// separator) is kept.
pub fn parse_package_listing(output: &str) -> Vec<String> {
    let ansi = Regex::new("\u{1b}\\[[0-9;]*m").ok();

    let mut packages = Vec::new();
    let mut seen = HashSet::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.contains("Listing...") || line.starts_with("WARNING") {
            continue;
        }
        let clean = match &ansi {
            Some(re) => re.replace_all(line, "").into_owned(),
            None => line.to_string(),
        };
        let Some(first) = clean.split_whitespace().next() else {
            continue;
        };
        let name = first.split('/').next().unwrap_or(first).to_string();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.clone()) {
            packages.push(name);
        }
    }
    packages
}

/// Drop packages that ship with the stock base image, leaving only what
/// the application itself pulled in.
pub fn filter_baseline(packages: Vec<String>) -> Vec<String> {
    let baseline: HashSet<&str> = DEBIAN_BASE_PACKAGES
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    packages
        .into_iter()
        .filter(|pkg| !baseline.contains(pkg.as_str()))
        .collect()
}

/// Choose the language profile from the declared start command (the file
/// extension of its entrypoint script) and run its static inspection hook.
pub fn inspect_language(source_root: &Path, start_command: &[String]) -> LanguageProfile {
    let extension = start_command
        .iter()
        .rev()
        .find_map(|word| entrypoint_extension(word))
        .unwrap_or_default();

    debug!(extension = %extension, "selecting language profile");
    profile_for_extension(&extension, source_root)
}

fn entrypoint_extension(word: &str) -> Option<String> {
    let name = word.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
