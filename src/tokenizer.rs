//! Line-classifying scanner for pipe-delimited tables embedded in free text.
//!
//! Each line is classified on its own as one of [`LineKind`]. A table block is a
//! header candidate, immediately followed by a separator, followed by at least one
//! more piped line. Consumption is greedy and stops at the first blank or
//! non-piped line, or at a row missing the outer pipes the header has.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

/// Separator-like fragments that survived table substitution.
static RESIDUAL_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|\s*:?-+\s*\|").expect("valid residual-separator regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Contains `|` and is not a separator. Becomes a header or a data row depending on position.
    HeaderCandidate,
    /// Only `|`, `-`, `:` and whitespace, with at least one `|` and one `-`.
    Separator,
    Blank,
    Other,
}

pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if !trimmed.contains('|') {
        return LineKind::Other;
    }
    let separator_chars = trimmed
        .chars()
        .all(|c| c == '|' || c == '-' || c == ':' || c.is_whitespace());
    if separator_chars && trimmed.contains('-') {
        LineKind::Separator
    } else {
        LineKind::HeaderCandidate
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock<'a> {
    /// Byte offset of the header line in the scanned text.
    pub start: usize,
    /// Byte offset just past the last consumed line, excluding its newline.
    pub end: usize,
    /// Zero-based index of the header line.
    pub first_line: usize,
    /// Header, separator and every consumed row line.
    pub line_count: usize,
    pub header: &'a str,
    pub data: Vec<&'a str>,
    /// Separator-only lines found among the data rows and skipped.
    pub skipped_separators: usize,
}

/// Finds every table block in `text`. Lines are split on `\n` only.
pub fn scan_tables(text: &str) -> Vec<TableBlock<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        lines.push((offset, line, classify_line(line)));
        offset += line.len() + 1;
    }

    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let is_start = lines[i].2 == LineKind::HeaderCandidate
            && lines.get(i + 1).is_some_and(|l| l.2 == LineKind::Separator);
        if !is_start {
            i += 1;
            continue;
        }

        let mut j = i + 2;
        let mut data = Vec::new();
        let mut skipped_separators = 0;
        let header = lines[i].1;
        while let Some(&(_, line, kind)) = lines.get(j) {
            match kind {
                LineKind::HeaderCandidate if framed_like(header, line) => data.push(line),
                LineKind::HeaderCandidate => break,
                LineKind::Separator => skipped_separators += 1,
                LineKind::Blank | LineKind::Other => break,
            }
            j += 1;
        }

        if data.is_empty() {
            debug!("Header at line {} has a separator but no data rows", i + 1);
            i = j;
            continue;
        }

        let (last_offset, last_line, _) = lines[j - 1];
        blocks.push(TableBlock {
            start: lines[i].0,
            end: last_offset + last_line.len(),
            first_line: i,
            line_count: j - i,
            header,
            data,
            skipped_separators,
        });
        i = j;
    }

    blocks
}

/// A data row must carry the outer pipes its header carries, so prose such as
/// `Revenue grew | see note` right under a table ends it.
fn framed_like(header: &str, line: &str) -> bool {
    let (header, line) = (header.trim(), line.trim());
    (!header.starts_with('|') || line.starts_with('|'))
        && (!header.ends_with('|') || line.ends_with('|'))
}

/// Splits one table line into trimmed cells.
///
/// `||` stands for an empty cell and is rewritten to `| |` first. The enclosing
/// pipes, when present, do not produce cells.
pub fn split_row(line: &str) -> Vec<String> {
    let mut row = line.trim().to_string();
    if row.is_empty() || row == "|" {
        return Vec::new();
    }

    while row.contains("||") {
        row = row.replace("||", "| |");
    }

    let inner = row.strip_prefix('|').unwrap_or(&row);
    let inner = inner.strip_suffix('|').unwrap_or(inner);

    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

pub fn count_residual_separators(text: &str) -> usize {
    RESIDUAL_SEPARATOR.find_iter(text).count()
}
