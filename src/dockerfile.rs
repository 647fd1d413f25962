//! Instruction-level Dockerfile model
//!
//! This is deliberately not a full Dockerfile grammar: it splits a build
//! description into instructions (keyword + whitespace-separated argument
//! tokens, each with a source range) and exposes the accessors the
//! reconciliation and repair stages need — FROM/COPY/EXPOSE lookups, image
//! name/tag splitting, RUN argument scans. Line continuations and comment
//! lines are handled; quoting subtleties are not, since every consumer
//! matches whole shell tokens (`&&`, `apk`, `-y`, ...).

use crate::diagnostics::{Position, Range};

/// One argument token with its range in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    value: String,
    range: Range,
}

impl Argument {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn range(&self) -> Range {
        self.range
    }
}

/// One instruction: keyword plus argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    keyword: String,
    args: Vec<Argument>,
    range: Range,
}

impl Instruction {
    /// Uppercased instruction keyword (`FROM`, `RUN`, ...).
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.args
    }

    pub fn arg_values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|arg| arg.value())
    }

    pub fn has_arg(&self, value: &str) -> bool {
        self.args.iter().any(|arg| arg.value() == value)
    }

    /// Range from the keyword through the last argument.
    pub fn range(&self) -> Range {
        self.range
    }

    /// Image reference of a FROM instruction, without tag or digest.
    pub fn image(&self) -> Option<&str> {
        if self.keyword != "FROM" {
            return None;
        }
        let reference = self.args.first()?.value();
        Some(split_image_reference(reference).0)
    }

    /// Tag of a FROM instruction's image, if pinned.
    pub fn image_tag(&self) -> Option<&str> {
        if self.keyword != "FROM" {
            return None;
        }
        let reference = self.args.first()?.value();
        split_image_reference(reference).1
    }

    /// Argument tokens with JSON (exec) form unwrapped, so
    /// `CMD ["python", "app.py"]` and `CMD python app.py` both yield
    /// `["python", "app.py"]`.
    pub fn command_words(&self) -> Vec<String> {
        let raw = self
            .args
            .iter()
            .map(|arg| arg.value())
            .collect::<Vec<_>>()
            .join(" ");
        if raw.trim_start().starts_with('[') {
            if let Ok(words) = serde_json::from_str::<Vec<String>>(raw.trim()) {
                return words;
            }
        }
        self.args.iter().map(|arg| arg.value().to_string()).collect()
    }
}

/// Split `name:tag` into (name, Some(tag)); digests and registry ports are
/// handled by only splitting after the last path segment.
fn split_image_reference(reference: &str) -> (&str, Option<&str>) {
    if let Some(at) = reference.find('@') {
        return (&reference[..at], None);
    }
    let last_segment_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[last_segment_start..].find(':') {
        Some(colon) => {
            let split = last_segment_start + colon;
            (&reference[..split], Some(&reference[split + 1..]))
        }
        None => (reference, None),
    }
}

/// Base-image distro family, which decides the package-manager templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distro {
    Debian,
    Alpine,
}

impl Distro {
    pub fn package_manager_keyword(self) -> &'static str {
        match self {
            Distro::Debian => "apt-get",
            Distro::Alpine => "apk",
        }
    }

    pub fn install_keyword(self) -> &'static str {
        match self {
            Distro::Debian => "install",
            Distro::Alpine => "add",
        }
    }
}

/// Runtime family detected from the first FROM image. Anything that is not
/// a python image is treated as node, matching the repair conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Node,
    Python,
}

impl Runtime {
    pub fn service_user(self) -> &'static str {
        match self {
            Runtime::Node => "node",
            Runtime::Python => "python",
        }
    }

    pub fn pinned_image(self) -> &'static str {
        match self {
            Runtime::Node => "node:18-slim",
            Runtime::Python => "python:3.11-slim",
        }
    }
}

/// A parsed Dockerfile.
#[derive(Debug, Clone, Default)]
pub struct Dockerfile {
    instructions: Vec<Instruction>,
}

impl Dockerfile {
    /// Parse a Dockerfile into instructions. Never fails: unrecognized lines
    /// simply become instructions with whatever keyword they start with, and
    /// blank/comment lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut instructions = Vec::new();

        let lines: Vec<&str> = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect();
        let mut line_idx = 0;

        while line_idx < lines.len() {
            let line = lines[line_idx];
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                line_idx += 1;
                continue;
            }

            let keyword_col = (line.len() - trimmed.len()) as u32;
            let start = Position::new(line_idx as u32, keyword_col);

            let mut keyword = String::new();
            let mut args = Vec::new();
            let mut end = start;
            let mut current = line_idx;
            let mut continued = true;

            while continued && current < lines.len() {
                let raw = lines[current];
                let content = raw.trim_end();
                continued = content.ends_with('\\');
                let content = if continued {
                    &content[..content.len() - 1]
                } else {
                    content
                };

                // Comment lines inside a continuation are ignored.
                if current != line_idx && content.trim_start().starts_with('#') {
                    current += 1;
                    continue;
                }

                for (col, token) in tokenize_line(content) {
                    let token_range = Range::new(
                        Position::new(current as u32, col as u32),
                        Position::new(current as u32, (col + token.len()) as u32),
                    );
                    if keyword.is_empty() {
                        keyword = token.to_uppercase();
                        end = token_range.end;
                    } else {
                        end = token_range.end;
                        args.push(Argument {
                            value: token.to_string(),
                            range: token_range,
                        });
                    }
                }
                current += 1;
            }

            instructions.push(Instruction {
                keyword,
                args,
                range: Range::new(start, end),
            });
            line_idx = current;
        }

        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions_with_keyword(&self, keyword: &str) -> Vec<&Instruction> {
        self.instructions
            .iter()
            .filter(|instruction| instruction.keyword() == keyword)
            .collect()
    }

    pub fn froms(&self) -> Vec<&Instruction> {
        self.instructions_with_keyword("FROM")
    }

    pub fn copys(&self) -> Vec<&Instruction> {
        self.instructions_with_keyword("COPY")
    }

    pub fn exposes(&self) -> Vec<&Instruction> {
        self.instructions_with_keyword("EXPOSE")
    }

    /// RUN instructions mentioning the given shell token anywhere in their
    /// arguments.
    pub fn run_instructions_with_arg(&self, arg: &str) -> Vec<&Instruction> {
        self.instructions_with_keyword("RUN")
            .into_iter()
            .filter(|instruction| instruction.has_arg(arg))
            .collect()
    }

    /// Distro family: alpine when the FROM tag mentions alpine or any
    /// instruction invokes apk, debian otherwise.
    pub fn distro(&self) -> Distro {
        let froms = self.froms();
        if let Some(from) = froms.first() {
            if let Some(tag) = from.image_tag() {
                if tag.contains("alpine") {
                    return Distro::Alpine;
                }
            }
            if from
                .arguments()
                .first()
                .is_some_and(|arg| arg.value().contains("alpine"))
            {
                return Distro::Alpine;
            }
        }
        let mentions_apk = self
            .instructions
            .iter()
            .any(|instruction| instruction.has_arg("apk"));
        if mentions_apk {
            Distro::Alpine
        } else {
            Distro::Debian
        }
    }

    /// Runtime family from the first FROM image; defaults to node when no
    /// FROM exists or the image is not python.
    pub fn runtime(&self) -> Runtime {
        match self.froms().first().and_then(|from| from.image()) {
            Some("python") => Runtime::Python,
            _ => Runtime::Node,
        }
    }

    /// Insertion anchor on the line after the first FROM, or None when the
    /// file has no FROM or fewer than two instructions.
    pub fn range_after_from(&self) -> Option<Range> {
        let froms = self.froms();
        let from = froms.first()?;
        if self.instructions.len() <= 1 {
            return None;
        }
        let line = from.range().start.line + 1;
        Some(Range::new(Position::new(line, 0), Position::new(line, 3)))
    }

    /// Insertion anchor on the line before the final instruction, or None
    /// when the file has at most one instruction.
    pub fn range_before_end(&self) -> Option<Range> {
        if self.instructions.len() <= 1 {
            return None;
        }
        let last = self.instructions.last()?;
        let line = last.range().start.line.checked_sub(1)?;
        Some(Range::new(Position::new(line, 0), Position::new(line, 3)))
    }

    /// Insertion anchor on the line after the first COPY, or None when the
    /// file has no COPY or fewer than two instructions.
    pub fn range_after_copy(&self) -> Option<Range> {
        let copys = self.copys();
        let copy = copys.first()?;
        if self.instructions.len() <= 1 {
            return None;
        }
        let line = copy.range().start.line + 1;
        Some(Range::new(Position::new(line, 0), Position::new(line, 3)))
    }
}

/// Whitespace tokenizer returning (column, token) pairs.
fn tokenize_line(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    for chunk in line.split_whitespace() {
        // split_whitespace drops positions, so recover each token's column.
        let col = line[offset..]
            .find(chunk)
            .map(|i| i + offset)
            .unwrap_or(offset);
        tokens.push((col, chunk));
        offset = col + chunk.len();
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "FROM python:3.11-slim\nWORKDIR /app\nCOPY . .\nRUN apt-get update && apt-get install -y curl\nEXPOSE 5000\nCMD [\"python\", \"app.py\"]\n";

    #[test]
    fn test_parse_counts_instructions() {
        let dockerfile = Dockerfile::parse(SAMPLE);
        assert_eq!(dockerfile.instructions().len(), 6);
        assert_eq!(dockerfile.froms().len(), 1);
        assert_eq!(dockerfile.copys().len(), 1);
        assert_eq!(dockerfile.exposes().len(), 1);
    }

    #[test]
    fn test_image_and_tag() {
        let dockerfile = Dockerfile::parse(SAMPLE);
        let from = dockerfile.froms()[0];
        assert_eq!(from.image(), Some("python"));
        assert_eq!(from.image_tag(), Some("3.11-slim"));

        let unpinned = Dockerfile::parse("FROM node\n");
        assert_eq!(unpinned.froms()[0].image(), Some("node"));
        assert_eq!(unpinned.froms()[0].image_tag(), None);
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        let dockerfile = Dockerfile::parse("FROM registry.example:5000/team/app\n");
        let from = dockerfile.froms()[0];
        assert_eq!(from.image(), Some("registry.example:5000/team/app"));
        assert_eq!(from.image_tag(), None);
    }

    #[test]
    fn test_line_continuation() {
        let text = "RUN apt-get update && \\\n\tapt-get install -y \\\n\tcurl vim\n";
        let dockerfile = Dockerfile::parse(text);
        let run = &dockerfile.instructions()[0];
        assert_eq!(run.keyword(), "RUN");
        let values: Vec<&str> = run.arg_values().collect();
        assert_eq!(
            values,
            vec!["apt-get", "update", "&&", "apt-get", "install", "-y", "curl", "vim"]
        );
        assert_eq!(run.range().start.line, 0);
        assert_eq!(run.range().end.line, 2);
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let text = "# build stage\n\nFROM node:18-slim\n# install\nRUN npm install\n";
        let dockerfile = Dockerfile::parse(text);
        assert_eq!(dockerfile.instructions().len(), 2);
        assert_eq!(dockerfile.instructions()[0].range().start.line, 2);
    }

    #[test]
    fn test_command_words_json_form() {
        let dockerfile = Dockerfile::parse(SAMPLE);
        let cmd = &dockerfile.instructions()[5];
        assert_eq!(cmd.command_words(), vec!["python", "app.py"]);
    }

    #[test]
    fn test_command_words_shell_form() {
        let dockerfile = Dockerfile::parse("CMD node server.js\n");
        assert_eq!(
            dockerfile.instructions()[0].command_words(),
            vec!["node", "server.js"]
        );
    }

    #[test]
    fn test_distro_detection() {
        assert_eq!(Dockerfile::parse(SAMPLE).distro(), Distro::Debian);
        assert_eq!(
            Dockerfile::parse("FROM python:3.11-alpine\n").distro(),
            Distro::Alpine
        );
        assert_eq!(
            Dockerfile::parse("FROM node\nRUN apk add --no-cache curl\n").distro(),
            Distro::Alpine
        );
    }

    #[test]
    fn test_runtime_detection() {
        assert_eq!(Dockerfile::parse(SAMPLE).runtime(), Runtime::Python);
        assert_eq!(Dockerfile::parse("FROM node:18\n").runtime(), Runtime::Node);
        assert_eq!(Dockerfile::parse("").runtime(), Runtime::Node);
    }

    #[test]
    fn test_anchor_ranges() {
        let dockerfile = Dockerfile::parse(SAMPLE);
        let after_from = dockerfile.range_after_from().unwrap();
        assert_eq!(after_from.start, Position::new(1, 0));
        let before_end = dockerfile.range_before_end().unwrap();
        assert_eq!(before_end.start, Position::new(4, 0));
        let after_copy = dockerfile.range_after_copy().unwrap();
        assert_eq!(after_copy.start, Position::new(3, 0));
    }

    #[test]
    fn test_anchors_degrade_to_none() {
        let empty = Dockerfile::parse("");
        assert!(empty.range_after_from().is_none());
        assert!(empty.range_before_end().is_none());
        assert!(empty.range_after_copy().is_none());

        let single = Dockerfile::parse("FROM python\n");
        assert!(single.range_after_from().is_none());
        assert!(single.range_before_end().is_none());
    }

    #[test]
    fn test_crlf_parsing() {
        let dockerfile = Dockerfile::parse("FROM node\r\nEXPOSE 3000\r\n");
        assert_eq!(dockerfile.instructions().len(), 2);
        assert_eq!(dockerfile.exposes()[0].arguments()[0].value(), "3000");
    }

    #[test]
    fn test_run_instructions_with_arg() {
        let dockerfile = Dockerfile::parse(SAMPLE);
        assert_eq!(dockerfile.run_instructions_with_arg("apt-get").len(), 1);
        assert!(dockerfile.run_instructions_with_arg("apk").is_empty());
    }
}
