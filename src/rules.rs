//! Static best-practice checks over the declared Dockerfile
//!
//! These run without any trace data and cover package-manager hygiene,
//! layer efficiency, deprecated instructions and privilege reduction.
//! Every diagnostic produced here carries a code with a matching repair
//! generator.

use crate::diagnostics::{DiagnosticSource, Position, Range, RepairDiagnostic};
use crate::dockerfile::{Dockerfile, Instruction};

const NO_ROOT_USER_MSG: &str = "A user other than root should be used. Running applications as root could lead to security problems if vulnerabilities in the project are exploited.";

const NO_ROOT_DIR_MSG: &str = "A working directory other than / should be used. This makes the directory structure more organized and keeps other files separate from the application's code.";

const SINGLE_COPY_MSG: &str = "Two COPY instructions should be used, one to copy the files required for installing dependencies and another to copy the rest of the source code files. This way Docker's layer caching can be used.";

const NO_IMAGE_PIN_MSG: &str =
    "The version of the base image should be pinned to improve stability, speed and security.";

const NO_CACHE_MSG: &str = "The --no-cache option should be used when installing packages with APK. This prevents APK from storing a cache, making the container smaller.";

const F_CURL_MSG: &str =
    "The -f option should be used with curl to avoid errors if the request fails.";

const NO_HTTP_URL_MSG: &str = "HTTPS URLs should be used instead of HTTP URLs. HTTPS provides encryption, making the connection more secure.";

const NO_CD_MSG: &str =
    "The working directory is not preserved between RUN instruction. Use the WORKDIR instruction instead.";

const NO_ADD_MSG: &str = "The COPY instruction should be used instead of the ADD instruction, if possible. The ADD instruction has more features which can make its usage harder to understand.";

const NO_MAINTAINER_MSG: &str = "The MAINTAINER instruction has been deprecated.";

const CONSECUTIVE_RUN_MSG: &str =
    "Consecutive RUN instructions should be merged to minimize the number of layers.";

const APT_LIST_MSG: &str = "The list of packages should be removed after performing an installation to reduce wasted space.";

const NO_INSTALL_RECOMMENDS_MSG: &str = "The --no-install-recommends option should be used with apt-get install. This keeps recommended packages from being installed, reducing wasted space.";

const UPDATE_BEFORE_INSTALL_MSG: &str = "The apt-get update command should be executed before apt-get install. This allows APT to update the list of packages.";

const CONFIRM_INSTALL_MSG: &str = "The -y option should be used with apt-get install. This allows packages to be installed without prompting the user for confirmation.";

/// Run every static rule over the parsed file.
pub fn check(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    problems.extend(check_apt_problems(dockerfile));
    problems.extend(check_consecutive_runs(dockerfile));
    problems.extend(check_unsuitable_instructions(dockerfile));
    problems.extend(check_cd_usage(dockerfile));
    problems.extend(check_network_utils(dockerfile));
    problems.extend(check_apk_problems(dockerfile));
    problems.extend(check_version_pinning(dockerfile));
    problems.extend(check_copys(dockerfile));
    problems.extend(check_workdir_presence(dockerfile));
    problems.extend(check_user_presence(dockerfile));

    problems
}

fn rule_diagnostic(range: Range, message: &str, suffix: &str) -> RepairDiagnostic {
    RepairDiagnostic::new(range, message, suffix, DiagnosticSource::StaticRule)
}

/// apt-get install hygiene: --no-install-recommends, update-before-install,
/// -y confirmation, and list cleanup.
fn check_apt_problems(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    for instruction in dockerfile.run_instructions_with_arg("apt-get") {
        let args = instruction.arguments();

        let pair = args.windows(2).find(|pair| {
            pair[0].value() == "apt-get" && pair[1].value() == "install"
        });
        let Some(pair) = pair else {
            continue;
        };
        let range = Range::new(pair[0].range().start, pair[1].range().end);

        if !instruction.has_arg("--no-install-recommends") {
            problems.push(rule_diagnostic(
                range,
                NO_INSTALL_RECOMMENDS_MSG,
                "NOINSTALLRECOMMENDS",
            ));
        }

        if !instruction.has_arg("update") && instruction.has_arg("-y") {
            problems.push(rule_diagnostic(
                range,
                UPDATE_BEFORE_INSTALL_MSG,
                "UPDATEBEFOREINSTALL",
            ));
        }

        if !instruction.has_arg("-y") {
            problems.push(rule_diagnostic(range, CONFIRM_INSTALL_MSG, "CONFIRMINSTALL"));
        }

        if let Some(problem) = check_apt_list_removal(instruction) {
            problems.push(problem);
        }
    }

    problems
}

fn check_apt_list_removal(instruction: &Instruction) -> Option<RepairDiagnostic> {
    let joined = instruction.arg_values().collect::<Vec<_>>().join(" ");
    if joined.contains("rm -rf /var/lib/apt/lists/*") {
        return None;
    }
    Some(rule_diagnostic(instruction.range(), APT_LIST_MSG, "APTLIST"))
}

/// apk add without --no-cache.
fn check_apk_problems(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    for instruction in dockerfile.run_instructions_with_arg("apk") {
        let args = instruction.arguments();
        let apk = args.iter().find(|arg| arg.value() == "apk");
        let add = args.iter().find(|arg| arg.value() == "add");
        let (Some(apk), Some(add)) = (apk, add) else {
            continue;
        };

        if !instruction.has_arg("--no-cache") {
            let range = Range::new(apk.range().start, add.range().end);
            problems.push(rule_diagnostic(range, NO_CACHE_MSG, "NOCACHE"));
        }
    }

    problems
}

/// curl without -f, and plain-http URLs passed to curl or wget.
fn check_network_utils(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    let curl_instructions = dockerfile.run_instructions_with_arg("curl");
    let mut url_check_targets: Vec<&Instruction> = dockerfile.run_instructions_with_arg("wget");

    for instruction in curl_instructions {
        let args = instruction.arguments();

        for (i, arg) in args.iter().enumerate() {
            if arg.value() != "curl" {
                continue;
            }
            // Only curl in command position (start or after &&).
            if i != 0 && args[i - 1].value() != "&&" {
                continue;
            }

            let url_index = args
                .iter()
                .rposition(|candidate| candidate.value().starts_with("http"));
            let Some(url_index) = url_index else {
                continue;
            };
            if url_index <= i {
                continue;
            }

            url_check_targets.push(instruction);

            let has_fail_flag = args[i..url_index]
                .iter()
                .any(|between| between.value() == "-f");
            if !has_fail_flag {
                problems.push(rule_diagnostic(arg.range(), F_CURL_MSG, "FCURL"));
            }
        }
    }

    for instruction in url_check_targets {
        let url = instruction
            .arguments()
            .iter()
            .find(|arg| arg.value().contains("http"));
        let Some(url) = url else {
            continue;
        };
        if !url.value().contains("https") {
            problems.push(rule_diagnostic(url.range(), NO_HTTP_URL_MSG, "NOHTTPURL"));
        }
    }

    problems
}

/// `RUN cd <dir>`: the directory change does not survive the layer.
fn check_cd_usage(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    for instruction in dockerfile.instructions_with_keyword("RUN") {
        let args = instruction.arguments();
        if args.len() != 2 || !instruction.has_arg("cd") {
            continue;
        }
        let range = Range::new(instruction.range().start, args[0].range().end);
        problems.push(rule_diagnostic(range, NO_CD_MSG, "NOCD"));
    }

    problems
}

/// ADD and MAINTAINER usage.
fn check_unsuitable_instructions(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    for instruction in dockerfile.instructions() {
        match instruction.keyword() {
            "ADD" => {
                let start = instruction.range().start;
                let range = Range::new(start, Position::new(start.line, start.character + 3));
                problems.push(rule_diagnostic(range, NO_ADD_MSG, "NOADD"));
            }
            "MAINTAINER" => {
                problems.push(rule_diagnostic(
                    instruction.range(),
                    NO_MAINTAINER_MSG,
                    "NOMAINTAINER",
                ));
            }
            _ => {}
        }
    }

    problems
}

fn check_consecutive_runs(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let mut problems = Vec::new();

    for pair in dockerfile.instructions().windows(2) {
        if pair[0].keyword() == "RUN" && pair[1].keyword() == "RUN" {
            let range = Range::new(pair[0].range().start, pair[1].range().end);
            problems.push(rule_diagnostic(range, CONSECUTIVE_RUN_MSG, "CONSECUTIVERUN"));
        }
    }

    problems
}

/// FROM without a pinned tag.
fn check_version_pinning(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    dockerfile
        .froms()
        .iter()
        .filter(|from| from.image_tag().is_none())
        .map(|from| rule_diagnostic(from.range(), NO_IMAGE_PIN_MSG, "NOIMAGEPIN"))
        .collect()
}

/// A single COPY defeats layer caching for dependency installs. Files
/// ending in a COPY are exempt (nothing to cache after it).
fn check_copys(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    let instructions = dockerfile.instructions();
    let Some(last) = instructions.last() else {
        return Vec::new();
    };
    if last.keyword() == "COPY" {
        return Vec::new();
    }

    let copys = dockerfile.copys();
    if copys.len() == 1 {
        return vec![rule_diagnostic(copys[0].range(), SINGLE_COPY_MSG, "SINGLECOPY")];
    }
    Vec::new()
}

fn check_workdir_presence(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    if !dockerfile.instructions_with_keyword("WORKDIR").is_empty() {
        return Vec::new();
    }
    match dockerfile.range_after_from() {
        Some(range) => vec![rule_diagnostic(range, NO_ROOT_DIR_MSG, "NOROOTDIR")],
        None => Vec::new(),
    }
}

fn check_user_presence(dockerfile: &Dockerfile) -> Vec<RepairDiagnostic> {
    if !dockerfile.instructions_with_keyword("USER").is_empty() {
        return Vec::new();
    }
    match dockerfile.range_before_end() {
        Some(range) => vec![rule_diagnostic(range, NO_ROOT_USER_MSG, "NOROOTUSER")],
        None => Vec::new(),
    }
}
