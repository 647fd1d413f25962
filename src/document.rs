//! Line-addressable text document used for range computation and edits
//!
//! Diagnostics and repairs address the Dockerfile through line/character
//! positions over a single immutable snapshot. The newline sequence is
//! detected per document (`\r\n` counts as length 2) and reused for every
//! inserted multi-line replacement so edits never mix line endings.

use crate::diagnostics::{Position, Range, RepairEdit};

/// An immutable text snapshot with precomputed line offsets.
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    /// Byte offset of the first character of each line.
    line_starts: Vec<usize>,
    newline: &'static str,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };

        let mut line_starts = vec![0];
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\n' {
                line_starts.push(i + 1);
            }
            i += 1;
        }

        Self {
            text,
            line_starts,
            newline,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Newline sequence used by this document.
    pub fn newline(&self) -> &'static str {
        self.newline
    }

    /// Length in characters of the document's newline sequence.
    pub fn newline_len(&self) -> usize {
        self.newline.len()
    }

    /// Byte offset of a position. Positions past the end of a line or past
    /// the last line clamp rather than fail, matching editor semantics.
    pub fn offset_at(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return self.text.len();
        }
        let start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text.len());
        (start + position.character as usize).min(line_end)
    }

    /// Position of a byte offset.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Position {
            line: line as u32,
            character: (offset - self.line_starts[line]) as u32,
        }
    }

    /// Text covered by a range.
    pub fn slice(&self, range: Range) -> &str {
        let start = self.offset_at(range.start);
        let end = self.offset_at(range.end).max(start);
        &self.text[start..end]
    }

    /// Character length of a range.
    pub fn range_len(&self, range: Range) -> usize {
        let start = self.offset_at(range.start);
        self.offset_at(range.end).saturating_sub(start)
    }
}

/// Apply a set of edits to one snapshot.
///
/// All ranges were computed against the same snapshot, never against
/// intermediate results, and edits are applied back-to-front so earlier
/// ranges stay valid. Two edits with overlapping ranges cannot both be
/// honored against one snapshot: the later one is dropped and a following
/// cycle regenerates it against the already-repaired text.
pub fn apply_edits(document: &Document, edits: &[RepairEdit]) -> String {
    let mut ordered: Vec<(usize, usize, &RepairEdit)> = edits
        .iter()
        .map(|edit| {
            let start = document.offset_at(edit.range.start);
            let end = document.offset_at(edit.range.end).max(start);
            (start, end, edit)
        })
        .collect();
    ordered.sort_by_key(|(start, end, _)| (*start, *end));

    let mut selected: Vec<(usize, usize, &RepairEdit)> = Vec::new();
    for (start, end, edit) in ordered {
        let overlaps = selected.iter().any(|&(s, e, _)| start < e && s < end);
        if !overlaps {
            selected.push((start, end, edit));
        }
    }

    let mut text = document.text().to_string();
    for (start, end, edit) in selected.into_iter().rev() {
        text.replace_range(start..end, &edit.replacement);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Position, Range};

    #[test]
    fn test_newline_detection() {
        assert_eq!(Document::new("a\nb\n").newline(), "\n");
        assert_eq!(Document::new("a\r\nb\r\n").newline(), "\r\n");
        assert_eq!(Document::new("no newline").newline(), "\n");
    }

    #[test]
    fn test_offset_and_position_round_trip() {
        let doc = Document::new("FROM python\nEXPOSE 5000\n");
        let pos = Position {
            line: 1,
            character: 7,
        };
        let offset = doc.offset_at(pos);
        assert_eq!(&doc.text()[offset..offset + 4], "5000");
        assert_eq!(doc.position_at(offset), pos);
    }

    #[test]
    fn test_slice() {
        let doc = Document::new("FROM python\nEXPOSE 5000\n");
        let range = Range {
            start: Position {
                line: 0,
                character: 0,
            },
            end: Position {
                line: 0,
                character: 4,
            },
        };
        assert_eq!(doc.slice(range), "FROM");
    }

    #[test]
    fn test_apply_edits_back_to_front() {
        let doc = Document::new("FROM python\nEXPOSE 5000\n");
        let edits = vec![
            RepairEdit {
                range: Range {
                    start: Position {
                        line: 0,
                        character: 5,
                    },
                    end: Position {
                        line: 0,
                        character: 11,
                    },
                },
                replacement: "python:3.11-slim".to_string(),
            },
            RepairEdit {
                range: Range {
                    start: Position {
                        line: 1,
                        character: 7,
                    },
                    end: Position {
                        line: 1,
                        character: 11,
                    },
                },
                replacement: "8080".to_string(),
            },
        ];
        let result = apply_edits(&doc, &edits);
        assert_eq!(result, "FROM python:3.11-slim\nEXPOSE 8080\n");
    }

    #[test]
    fn test_apply_edits_drops_edit_inside_replaced_span() {
        let doc = Document::new("FROM node\nCOPY . .\nRUN npm install\nCMD node app.js\n");
        let edits = vec![
            // Replacement spanning the COPY and RUN lines.
            RepairEdit {
                range: Range {
                    start: Position {
                        line: 1,
                        character: 0,
                    },
                    end: Position {
                        line: 2,
                        character: 15,
                    },
                },
                replacement: "COPY package*.json ./\nRUN npm install\nCOPY . .".to_string(),
            },
            // Insertion anchored inside that span; stale once the span is
            // rewritten, so it must not be spliced in.
            RepairEdit {
                range: Range {
                    start: Position {
                        line: 2,
                        character: 0,
                    },
                    end: Position {
                        line: 2,
                        character: 0,
                    },
                },
                replacement: "\nUSER node\n".to_string(),
            },
        ];
        let result = apply_edits(&doc, &edits);
        assert_eq!(
            result,
            "FROM node\nCOPY package*.json ./\nRUN npm install\nCOPY . .\nCMD node app.js\n"
        );
        assert!(!result.contains("USER"));
    }

    #[test]
    fn test_apply_edits_keeps_adjacent_edits() {
        let doc = Document::new("RUN curl http://example.com/x.sh\n");
        let edits = vec![
            RepairEdit {
                range: Range {
                    start: Position {
                        line: 0,
                        character: 4,
                    },
                    end: Position {
                        line: 0,
                        character: 8,
                    },
                },
                replacement: "curl -f".to_string(),
            },
            RepairEdit {
                range: Range {
                    start: Position {
                        line: 0,
                        character: 9,
                    },
                    end: Position {
                        line: 0,
                        character: 32,
                    },
                },
                replacement: "https://example.com/x.sh".to_string(),
            },
        ];
        assert_eq!(
            apply_edits(&doc, &edits),
            "RUN curl -f https://example.com/x.sh\n"
        );
    }
}
