//! Repair generation: one deterministic text edit per diagnostic code
//!
//! Every code has exactly one generator, enforced by the single exhaustive
//! dispatch in [`generate`]. All ranges and replacement texts are computed
//! against one immutable [`Document`] snapshot, so applying repairs in any
//! order (or twice) cannot corrupt the file. Inserted multi-line text
//! always uses the document's own newline sequence. A generator returns
//! `None` when its anchor cannot be located in the current snapshot, for
//! example when the document changed after the diagnostic was computed.

use crate::diagnostics::{codes, Position, Range, RepairDiagnostic, RepairEdit};
use crate::dockerfile::Runtime;
use crate::document::Document;

/// Per-cycle context a few generators need beyond the document itself: the
/// trace-reconciliation repairs copy instruction text out of the
/// synthesized alternative.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairContext<'a> {
    pub alternative: Option<&'a str>,
}

/// Generate the edit for one diagnostic, or `None` when the repair is not
/// applicable to the current document.
pub fn generate(
    diagnostic: &RepairDiagnostic,
    document: &Document,
    context: &RepairContext<'_>,
) -> Option<RepairEdit> {
    let range = diagnostic.range;

    match diagnostic.code.as_str() {
        codes::NO_INSTALL_RECOMMENDS => Some(replace(
            range,
            "apt-get install --no-install-recommends",
        )),
        codes::CONFIRM_INSTALL => Some(replace(range, "apt-get install -y")),
        codes::UPDATE_BEFORE_INSTALL => Some(replace(range, "apt-get update && apt-get install")),
        codes::NO_ADD => Some(replace(range, "COPY")),
        codes::NO_MAINTAINER => Some(replace(range, "")),
        codes::NO_CD => Some(replace(range, "WORKDIR")),
        codes::F_CURL => Some(replace(range, "curl -f")),
        codes::NO_CACHE => Some(replace(range, "apk add --no-cache")),
        codes::APT_LIST => Some(apt_list_cleanup(document, range)),
        codes::CONSECUTIVE_RUN => merge_consecutive_runs(document, range),
        codes::NO_HTTP_URL => Some(upgrade_url(document, range)),
        codes::NO_ROOT_DIR => Some(insert_workdir(document, range)),
        codes::NO_IMAGE_PIN => Some(pin_image(document, range)),
        codes::NO_ROOT_USER => Some(introduce_user(document, range)),
        codes::SINGLE_COPY => split_copy(document),
        codes::HERMIT_DEPS => hermit_dependencies(document, range, context),
        codes::HERMIT_PORTS => hermit_ports(document, range, context),
        codes::HERMIT_LANG_DEPS => hermit_language_deps(document, range, context),
        _ => None,
    }
}

fn replace(range: Range, replacement: &str) -> RepairEdit {
    RepairEdit {
        range,
        replacement: replacement.to_string(),
    }
}

/// Anchor-style diagnostics carry a small marker range over existing text.
/// Turn it into a pure insertion point at the start of that line; ranges
/// that already cover only whitespace are used as-is.
fn process_range(document: &Document, range: Range) -> Range {
    if !document.slice(range).trim().is_empty() {
        return Range::collapsed(Position::new(range.start.line, 0));
    }
    range
}

/// Runtime family as the repair side sees it: a `FROM node...` image is a
/// node project, everything else is treated as python. Intentionally
/// looser than the parsed-instruction accessor, since repairs must work on
/// documents that drifted from the diagnosed snapshot.
fn project_runtime(document: &Document) -> Runtime {
    let text = document.text();
    let is_node = text
        .find("FROM ")
        .is_some_and(|from| text[from + "FROM ".len()..].starts_with("node"));
    if is_node {
        Runtime::Node
    } else {
        Runtime::Python
    }
}

fn is_node_project(document: &Document) -> bool {
    project_runtime(document) == Runtime::Node
}

fn apt_list_cleanup(document: &Document, range: Range) -> RepairEdit {
    let newline = document.newline();
    let instruction = document.slice(range);
    RepairEdit {
        range,
        replacement: format!("{instruction} \\{newline}\t&& rm -rf /var/lib/apt/lists/*"),
    }
}

/// Fold the second RUN into the first behind a line continuation.
fn merge_consecutive_runs(document: &Document, range: Range) -> Option<RepairEdit> {
    let newline = document.newline();
    let text = document.slice(range);
    let second_run = text.rfind("RUN")?;

    let head = text[..second_run].trim_end();
    let tail = text.get(second_run + "RUN ".len()..)?;
    Some(RepairEdit {
        range,
        replacement: format!("{head} \\{newline}\t&& {tail}"),
    })
}

fn upgrade_url(document: &Document, range: Range) -> RepairEdit {
    let url = document.slice(range);
    RepairEdit {
        range,
        replacement: url.replacen("http", "https", 1),
    }
}

fn insert_workdir(document: &Document, range: Range) -> RepairEdit {
    let newline = document.newline();
    RepairEdit {
        range: Range::collapsed(range.start),
        replacement: format!("{newline}WORKDIR /app{newline}"),
    }
}

fn pin_image(document: &Document, range: Range) -> RepairEdit {
    let image = project_runtime(document).pinned_image();
    RepairEdit {
        range,
        replacement: format!("FROM {image}"),
    }
}

/// Introduce a non-root user. Runtimes without a stock service account get
/// a `useradd` step first, and when the file copies sources more than once
/// the last COPY is rewritten with `--chown` so the new user owns what it
/// runs (an already-chowned COPY is left as it is).
fn introduce_user(document: &Document, range: Range) -> RepairEdit {
    let text = document.text();
    let newline = document.newline();
    let runtime = project_runtime(document);
    let user = runtime.service_user();

    let mut replacement = newline.to_string();
    if runtime == Runtime::Python {
        replacement.push_str("RUN useradd python");
        replacement.push_str(newline);
    }
    replacement.push_str(&format!("USER {user}{newline}"));

    let first_copy = text.find("COPY");
    let last_copy = text.rfind("COPY");
    let has_two_copys = matches!((first_copy, last_copy), (Some(a), Some(b)) if a != b);

    if !has_two_copys {
        return RepairEdit {
            range: process_range(document, range),
            replacement,
        };
    }

    // Rewrite the final COPY alongside the USER insertion.
    let last_copy = last_copy.unwrap_or(0);
    let line_end = text[last_copy..]
        .find(newline)
        .map(|i| i + last_copy)
        .unwrap_or(text.len());
    let copy_args = text[last_copy + "COPY".len()..line_end].trim();

    let chown = if copy_args.contains("--chown") {
        String::new()
    } else {
        format!("--chown={user}:{user} ")
    };
    replacement.push_str(&format!("{newline}COPY {chown}{copy_args}{newline}"));

    let end_offset = (line_end + document.newline_len()).min(text.len());
    RepairEdit {
        range: Range::new(
            document.position_at(last_copy),
            document.position_at(end_offset),
        ),
        replacement,
    }
}

/// Split a lone COPY into a manifest copy (before the install steps) and a
/// chown-aware source copy right before the final CMD/ENTRYPOINT.
fn split_copy(document: &Document) -> Option<RepairEdit> {
    let text = document.text();
    let newline = document.newline();

    let copy_start = text.find("COPY")?;
    let copy_line_end = text[copy_start..].find(newline)? + copy_start;
    let copy_content = text[copy_start..copy_line_end].replacen("  ", " ", 1);

    let components: Vec<&str> = copy_content.split(' ').collect();
    if components.len() < 3 {
        return None;
    }
    let destination = components[2];

    let after_copy = copy_line_end + document.newline_len();
    let last_instruction = text.find("CMD").or_else(|| text.find("ENTRYPOINT"))?;
    let before_last = last_instruction.checked_sub(document.newline_len())?;
    if before_last < after_copy {
        return None;
    }
    let maintained = &text[after_copy..before_last];

    let is_node = is_node_project(document);
    let manifest = if is_node {
        "package*.json"
    } else {
        "requirements.txt"
    };

    // Reuse an already-declared USER for ownership of the source copy.
    let chown = text
        .find("USER")
        .and_then(|user_idx| {
            let user_end = text[user_idx..].find(newline)? + user_idx;
            let user = &text[user_idx + "USER ".len()..user_end];
            Some(format!("--chown={user}:{user} "))
        })
        .unwrap_or_default();

    let trailing_slash = if destination.ends_with('/') { "" } else { "/" };
    let first_copy = format!("COPY {manifest} {destination}{trailing_slash}{newline}");
    let second_copy = format!("{newline}COPY {chown}. .{newline}");

    Some(RepairEdit {
        range: Range::new(
            document.position_at(copy_start),
            document.position_at(before_last),
        ),
        replacement: format!("{first_copy}{maintained}{second_copy}"),
    })
}

/// Copy one instruction's text out of the alternative Dockerfile: the
/// instruction of kind `name` whose arguments contain `keyword`, spanning
/// until the next uppercase keyword.
fn instruction_text_from(content: &str, name: &str, keyword: &str, newline: &str) -> String {
    let Some(keyword_index) = content.find(keyword) else {
        return String::new();
    };
    let Some(start) = content[..keyword_index].rfind(name) else {
        return String::new();
    };

    let offset = start + name.len();
    // The instruction runs until the next line that opens with a keyword.
    let bytes = content.as_bytes();
    let mut end = content.len();
    let mut i = offset;
    while i < bytes.len() {
        if bytes[i] == b'\n' && bytes.get(i + 1).is_some_and(u8::is_ascii_uppercase) {
            end = i + 1;
            break;
        }
        i += 1;
    }

    content[start..end]
        .replacen(&format!("{newline}#"), "", 1)
        .trim()
        .to_string()
}

/// Trace-derived dependency repair: replace the flagged install span with
/// the alternative's install command, or insert a whole install RUN when
/// the diagnostic marks a bare anchor. An empty alternative install means
/// the declared one is unnecessary and is removed.
fn hermit_dependencies(
    document: &Document,
    range: Range,
    context: &RepairContext<'_>,
) -> Option<RepairEdit> {
    let alternative = context.alternative?;
    let newline = document.newline();

    // The stripped and re-prepended prefix must match the alternative's
    // package manager: apk installs carry no update sub-command.
    let (keyword, run_prefix) = if alternative.contains("alpine") || alternative.contains("apk") {
        ("apk", "RUN ")
    } else {
        ("apt-get", "RUN apt-get update && ")
    };
    let content = instruction_text_from(alternative, "RUN", keyword, newline);

    let range_is_instruction = document.range_len(range) > 3;
    let target = if range_is_instruction {
        range
    } else {
        process_range(document, range)
    };

    if content.is_empty() {
        return Some(RepairEdit {
            range: target,
            replacement: String::new(),
        });
    }

    let processed = content
        .get(run_prefix.len()..)
        .unwrap_or("")
        .replace(['\n', '\\'], "")
        .replacen('\t', "", 1)
        .trim()
        .to_string();

    let replacement = if range_is_instruction {
        processed
    } else {
        format!("{run_prefix}{processed}{newline}")
    };

    Some(RepairEdit {
        range: target,
        replacement,
    })
}

/// Trace-derived port repair: carry every EXPOSE line of the alternative
/// into the original, replacing the flagged EXPOSE span or inserting at
/// the anchor.
fn hermit_ports(
    document: &Document,
    range: Range,
    context: &RepairContext<'_>,
) -> Option<RepairEdit> {
    let alternative = context.alternative?;
    let newline = document.newline();

    let mut replacement = newline.to_string();
    for line in alternative.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with("EXPOSE") {
            replacement.push_str(line);
            replacement.push_str(newline);
        }
    }

    let target = if document.range_len(range) > 3 {
        range
    } else {
        process_range(document, range)
    };

    Some(RepairEdit {
        range: target,
        replacement,
    })
}

/// Trace-derived language-install repair: copy the alternative's install
/// RUNs (and PYTHONPATH for python projects) in after the first COPY.
fn hermit_language_deps(
    document: &Document,
    range: Range,
    context: &RepairContext<'_>,
) -> Option<RepairEdit> {
    let alternative = context.alternative?;
    let newline = document.newline();

    let mut replacement = newline.to_string();
    if is_node_project(document) {
        replacement.push_str(&instruction_text_from(alternative, "RUN", "npm", newline));
        replacement.push_str(newline);
    } else {
        replacement.push_str(&instruction_text_from(alternative, "RUN", "pip3", newline));
        replacement.push_str(newline);
        replacement.push_str(&instruction_text_from(alternative, "RUN", "pip ", newline));
        replacement.push_str(newline);
        replacement.push_str(&instruction_text_from(
            alternative,
            "ENV",
            "PYTHONPATH",
            newline,
        ));
        replacement.push_str(newline);
    }

    Some(RepairEdit {
        range: process_range(document, range),
        replacement,
    })
}
