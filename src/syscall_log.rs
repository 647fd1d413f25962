//! Parser for the strace-format syscall log produced inside the
//! instrumented container
//!
//! Each useful line has the fixed layout
//!
//! ```text
//! 21 bind(18, {sa_family=AF_INET6, sin6_port=htons(5000), sin6_scope_id=0}, 28) = 0 <0.000073>
//! ```
//!
//! i.e. pid, syscall name, a parenthesized argument list whose struct-typed
//! arguments appear as `{key=value, ...}` groups, `= result`, and timing.
//! The tracer also emits signal lines, exit markers and truncated
//! `<unfinished ...>` fragments; those are noise and are skipped instead of
//! failing the batch. Records come back in file order as a lazy,
//! single-pass iterator.

/// Value of a struct field inside a syscall argument. Kernel helpers such as
/// `htons(5000)` keep their parameters so extraction code can read
/// `sin6_port`'s first parameter without decoding the C struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    Call { func: String, params: Vec<String> },
}

impl FieldValue {
    /// First usable parameter: the scalar itself, or the first argument of
    /// a helper call. Ports arrive either way depending on tracer version.
    pub fn first_param(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            FieldValue::Call { params, .. } => params.first().map(String::as_str),
        }
    }
}

/// One top-level syscall argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Scalar(String),
    /// A struct-typed argument, keeping field order.
    Struct(Vec<(String, FieldValue)>),
}

impl ArgValue {
    /// Look up a named field of a struct-typed argument.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        match self {
            ArgValue::Struct(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            ArgValue::Scalar(_) => None,
        }
    }
}

/// One parsed syscall invocation. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallRecord {
    pub pid: u32,
    pub name: String,
    pub args: Vec<ArgValue>,
    pub result: i64,
    /// Time spent in the syscall, microseconds. Zero when the tracer did
    /// not emit timing.
    pub timing_micros: u64,
}

impl SyscallRecord {
    /// Record kind tag kept for wire compatibility with consumers of the
    /// raw trace.
    pub fn kind(&self) -> &'static str {
        "SYSCALL"
    }
}

/// Parse a full log lazily, in file order, skipping malformed lines.
pub fn parse(text: &str) -> impl Iterator<Item = SyscallRecord> + '_ {
    text.lines().filter_map(parse_line)
}

/// Parse a single log line; None for tracer noise (signal notes, exit
/// markers, unfinished/resumed fragments, truncation).
pub fn parse_line(line: &str) -> Option<SyscallRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("---") || line.starts_with("+++") {
        return None;
    }
    if line.contains("<unfinished") || line.contains("resumed>") {
        return None;
    }

    // Optional pid prefix (strace -f).
    let (pid, rest) = match line.split_once(char::is_whitespace) {
        Some((first, rest)) if first.chars().all(|c| c.is_ascii_digit()) => {
            (first.parse().ok()?, rest.trim_start())
        }
        _ => (0, line),
    };

    let open = rest.find('(')?;
    let name = &rest[..open];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let close = matching_paren(rest, open)?;
    let args_text = &rest[open + 1..close];
    let tail = rest[close + 1..].trim_start();

    let result_text = tail.strip_prefix('=')?.trim_start();
    let result_token = result_text.split_whitespace().next()?;
    let result: i64 = result_token.parse().ok().or_else(|| {
        // Hex results (mmap-style addresses) still count as success.
        i64::from_str_radix(result_token.trim_start_matches("0x"), 16).ok()
    })?;

    let timing_micros = result_text
        .rfind('<')
        .and_then(|start| {
            let end = result_text[start..].find('>')? + start;
            result_text[start + 1..end].parse::<f64>().ok()
        })
        .map(|seconds| (seconds * 1_000_000.0) as u64)
        .unwrap_or(0);

    Some(SyscallRecord {
        pid,
        name: name.to_string(),
        args: parse_args(args_text),
        result,
        timing_micros,
    })
}

/// Index of the parenthesis matching the one at `open`, respecting nesting
/// and double-quoted strings.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' if i == 0 || bytes[i - 1] != b'\\' => in_quotes = !in_quotes,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on top-level commas, respecting (), {}, [] nesting and quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' if i == 0 || bytes[i - 1] != b'\\' => in_quotes = !in_quotes,
            b'(' | b'{' | b'[' if !in_quotes => depth += 1,
            b')' | b'}' | b']' if !in_quotes => depth -= 1,
            b',' if !in_quotes && depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_args(text: &str) -> Vec<ArgValue> {
    split_top_level(text)
        .into_iter()
        .map(|part| {
            if part.starts_with('{') && part.ends_with('}') {
                ArgValue::Struct(parse_struct_fields(&part[1..part.len() - 1]))
            } else {
                ArgValue::Scalar(part.to_string())
            }
        })
        .collect()
}

fn parse_struct_fields(text: &str) -> Vec<(String, FieldValue)> {
    split_top_level(text)
        .into_iter()
        .map(|field| {
            // key=value fields; bare helper calls such as
            // inet_pton(AF_INET6, "::", &sin6_addr) are keyed by function name.
            let eq = field
                .find('=')
                .filter(|&i| field[..i].chars().all(|c| c != '(' && c != '"'));
            match eq {
                Some(i) => (field[..i].to_string(), parse_field_value(&field[i + 1..])),
                None => match parse_field_value(field) {
                    FieldValue::Call { func, params } => {
                        (func.clone(), FieldValue::Call { func, params })
                    }
                    FieldValue::Scalar(value) => (value.clone(), FieldValue::Scalar(value)),
                },
            }
        })
        .collect()
}

fn parse_field_value(text: &str) -> FieldValue {
    if let Some(open) = text.find('(') {
        if text.ends_with(')') && text[..open].chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            let func = text[..open].to_string();
            if !func.is_empty() {
                let params = split_top_level(&text[open + 1..text.len() - 1])
                    .into_iter()
                    .map(|param| param.trim_matches('"').to_string())
                    .collect();
                return FieldValue::Call { func, params };
            }
        }
    }
    FieldValue::Scalar(text.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIND_V6: &str = "21 bind(18, {sa_family=AF_INET6, sin6_port=htons(5000), inet_pton(AF_INET6, \"::\", &sin6_addr), sin6_flowinfo=htonl(0), sin6_scope_id=0}, 28) = 0 <0.000073>";

    #[test]
    fn test_parse_bind_line() {
        let record = parse_line(BIND_V6).unwrap();
        assert_eq!(record.pid, 21);
        assert_eq!(record.name, "bind");
        assert_eq!(record.result, 0);
        assert_eq!(record.timing_micros, 73);
        assert_eq!(record.kind(), "SYSCALL");
        assert_eq!(record.args.len(), 3);

        let port = record.args[1].field("sin6_port").unwrap();
        assert_eq!(port.first_param(), Some("5000"));
    }

    #[test]
    fn test_parse_ipv4_scalar_port() {
        let line = "8 bind(3, {sa_family=AF_INET, sin_port=8080, sin_addr=0}, 16) = 0";
        let record = parse_line(line).unwrap();
        let port = record.args[1].field("sin_port").unwrap();
        assert_eq!(port.first_param(), Some("8080"));
        assert_eq!(record.timing_micros, 0);
    }

    #[test]
    fn test_parse_without_pid_prefix() {
        let line = "openat(AT_FDCWD, \"/etc/hosts\", O_RDONLY) = 3 <0.000010>";
        let record = parse_line(line).unwrap();
        assert_eq!(record.pid, 0);
        assert_eq!(record.name, "openat");
        assert_eq!(record.result, 3);
    }

    #[test]
    fn test_negative_result_with_errno() {
        let line = "12 connect(5, {sa_family=AF_INET, sin_port=htons(80)}, 16) = -1 EINPROGRESS (Operation now in progress) <0.000041>";
        let record = parse_line(line).unwrap();
        assert_eq!(record.result, -1);
    }

    #[test]
    fn test_noise_lines_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("21 --- SIGCHLD {si_signo=SIGCHLD} ---").is_none());
        assert!(parse_line("+++ exited with 0 +++").is_none());
        assert!(parse_line("18 accept4(6, <unfinished ...>").is_none());
        assert!(parse_line("18 <... accept4 resumed>) = 9").is_none());
        assert!(parse_line("garbage line with no syscall").is_none());
    }

    #[test]
    fn test_truncated_line_skipped_without_failing_batch() {
        let log = format!("{BIND_V6}\n21 bind(18, {{sa_family=AF_IN");
        let records: Vec<_> = parse(&log).collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_batch_preserves_file_order() {
        let log = "1 socket(AF_INET6, SOCK_STREAM, 0) = 18 <0.000020>\n\
                   1 bind(18, {sa_family=AF_INET6, sin6_port=htons(3000)}, 28) = 0 <0.000015>\n\
                   1 listen(18, 128) = 0 <0.000009>\n";
        let names: Vec<String> = parse(log).map(|r| r.name).collect();
        assert_eq!(names, vec!["socket", "bind", "listen"]);
    }

    #[test]
    fn test_quoted_commas_do_not_split_args() {
        let line = "7 write(1, \"a,b,c\", 5) = 5";
        let record = parse_line(line).unwrap();
        assert_eq!(record.args.len(), 3);
        assert_eq!(record.args[1], ArgValue::Scalar("\"a,b,c\"".to_string()));
    }
}
