//! Language profile registry
//!
//! Each supported runtime ecosystem contributes one [`LanguageProfile`]:
//! candidate base images (most specific first), the commands that install
//! its dependencies, environment variables, accepted runtime binaries, and
//! a static inspection hook that refines the profile from the source tree
//! (manifest files, declared interpreter versions, native-extension hints).
//!
//! Profiles are selected by the file extension of the entrypoint and
//! resolved through a static match rather than dynamic loading, so the set
//! of supported languages is enumerable and testable.

use std::path::Path;

use regex::Regex;
use tracing::warn;

const PYTHON_SITE_PACKAGES: &str = "local-site-packages";

/// Everything the synthesizer needs to know about one runtime ecosystem.
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    /// Language tag (`python`, `javascript`, `generic`).
    pub name: &'static str,
    /// Candidate base images, most specific first; the first entry is the
    /// one the synthesizer uses.
    pub images: Vec<String>,
    /// Shell commands that install language-level dependencies, in order.
    pub install_commands: Vec<String>,
    /// `KEY=value` environment variables to set in the build.
    pub env_vars: Vec<String>,
    /// Binary names accepted as this language's runtime.
    pub runtimes: Vec<&'static str>,
    /// Name of the bundled OS-package supplement list for this language.
    pub packages_list: &'static str,
    /// Path patterns to leave out of the build context.
    pub ignored_paths: Vec<&'static str>,
    /// OS packages this language needs on top of the traced set (filled in
    /// by the static inspection hook).
    pub os_packages: Vec<String>,
}

impl LanguageProfile {
    /// True when the profile carries no install knowledge (the generic
    /// fallback).
    pub fn is_generic(&self) -> bool {
        self.install_commands.is_empty() && self.images.is_empty()
    }

    pub fn base_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Extensions with a dedicated profile.
pub fn supported_extensions() -> &'static [&'static str] {
    &["py", "js", "mjs", "cjs"]
}

/// Resolve the profile for an entrypoint extension and run its static
/// inspection hook against the source tree. Unsupported extensions warn
/// and fall back to the generic profile.
pub fn profile_for_extension(extension: &str, source_root: &Path) -> LanguageProfile {
    match extension {
        "py" => python_profile(source_root),
        "js" | "mjs" | "cjs" => javascript_profile(source_root),
        other => {
            warn!(
                extension = other,
                supported = ?supported_extensions(),
                "no language profile for extension, using generic profile"
            );
            generic_profile()
        }
    }
}

fn generic_profile() -> LanguageProfile {
    LanguageProfile {
        name: "generic",
        images: Vec::new(),
        install_commands: Vec::new(),
        env_vars: Vec::new(),
        runtimes: Vec::new(),
        packages_list: "",
        ignored_paths: Vec::new(),
        os_packages: Vec::new(),
    }
}

fn python_profile(source_root: &Path) -> LanguageProfile {
    let mut profile = LanguageProfile {
        name: "python",
        images: vec![
            "python:3.11-slim".to_string(),
            "gcr.io/distroless/python3".to_string(),
        ],
        install_commands: vec![
            "pip3 install --upgrade pip".to_string(),
            format!("pip install -r ./requirements.txt --target {PYTHON_SITE_PACKAGES}"),
        ],
        env_vars: vec![format!("PYTHONPATH=./{PYTHON_SITE_PACKAGES}")],
        runtimes: vec!["python", "python3"],
        packages_list: "pythonpackages.txt",
        ignored_paths: vec!["__pycache__"],
        os_packages: Vec::new(),
    };
    inspect_python(&mut profile, source_root);
    profile
}

/// Native build packages a compiled Python extension is likely to need.
const PYTHON_BUILD_PACKAGES: &[&str] = &["python3-dev", "build-essential", "pkg-config", "cmake"];

fn inspect_python(profile: &mut LanguageProfile, source_root: &Path) {
    let requirements = source_root.join("requirements.txt");
    let pipfile = source_root.join("Pipfile");

    if requirements.exists() {
        profile
            .os_packages
            .extend(PYTHON_BUILD_PACKAGES.iter().map(|pkg| pkg.to_string()));
    } else if pipfile.exists() {
        // Pipenv projects declare no requirements.txt; generate one so the
        // pip-based install sequence still applies.
        profile.install_commands.insert(
            0,
            "pip install pipenv && pipenv lock -r > requirements.txt".to_string(),
        );

        if let Ok(content) = std::fs::read_to_string(&pipfile) {
            let version = Regex::new(r#"python_version = "(.*?)""#)
                .ok()
                .and_then(|re| re.captures(&content))
                .map(|caps| caps[1].to_string())
                .unwrap_or_else(|| "3.8".to_string());
            profile.images[0] = format!("python:{version}-slim");
        }

        profile
            .os_packages
            .extend(PYTHON_BUILD_PACKAGES.iter().map(|pkg| pkg.to_string()));
    }
}

fn javascript_profile(source_root: &Path) -> LanguageProfile {
    let mut profile = LanguageProfile {
        name: "javascript",
        images: vec!["node:18-slim".to_string()],
        install_commands: vec!["npm install".to_string()],
        env_vars: Vec::new(),
        runtimes: vec!["node", "nodejs"],
        packages_list: "nodepackages.txt",
        ignored_paths: vec!["node_modules"],
        os_packages: Vec::new(),
    };
    inspect_javascript(&mut profile, source_root);
    profile
}

fn inspect_javascript(profile: &mut LanguageProfile, source_root: &Path) {
    // A lockfile makes reproducible installs possible; prefer npm ci.
    if source_root.join("package-lock.json").exists() {
        profile.install_commands = vec!["npm ci".to_string()];
    }
}
