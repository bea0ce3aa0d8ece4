use crate::classifier::{CellAnnotation, CellClassifier, CellTag};
use crate::tokenizer::{classify_line, split_row, LineKind};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Headers plus rows, every row exactly as wide as `headers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableRecord {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|row| row.len() == self.headers.len())
    }

    /// Pipe-table text that assembles back into this record.
    pub fn to_markdown(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(pipe_line(&self.headers));
        lines.push(pipe_line(&vec!["---".to_string(); self.width()]));
        for row in &self.rows {
            lines.push(pipe_line(row));
        }
        lines.join("\n")
    }
}

fn pipe_line(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledTable {
    pub record: TableRecord,
    /// Rows that were right-padded with empty cells.
    pub padded_rows: usize,
    /// Rows whose cells beyond the header width were dropped.
    pub truncated_rows: usize,
}

/// Builds a table from a header line and its data lines.
///
/// Returns `None` when the header or every data row parses to nothing; the
/// caller then leaves the source text as it was.
pub fn assemble(header_line: &str, data_lines: &[&str]) -> Option<AssembledTable> {
    let headers = split_row(header_line);
    if headers.is_empty() {
        warn!("Table header could not be parsed: {}", header_line);
        return None;
    }

    let width = headers.len();
    let mut rows = Vec::with_capacity(data_lines.len());
    let mut padded_rows = 0;
    let mut truncated_rows = 0;

    for line in data_lines {
        let mut row = split_row(line);
        if row.is_empty() {
            continue;
        }
        let original_len = row.len();
        row.resize(width, String::new());

        // Checked after normalization so a row never re-serializes into a separator.
        if classify_line(&pipe_line(&row)) == LineKind::Separator {
            continue;
        }
        if original_len < width {
            padded_rows += 1;
        } else if original_len > width {
            truncated_rows += 1;
        }
        rows.push(row);
    }

    if rows.is_empty() {
        warn!(
            "Table with {} header cell(s) has no parsable data rows",
            headers.len()
        );
        return None;
    }

    debug!("Assembled table: {} columns x {} rows", width, rows.len());

    Some(AssembledTable {
        record: TableRecord { headers, rows },
        padded_rows,
        truncated_rows,
    })
}

/// A table block together with the classification of each data cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTable {
    pub record: TableRecord,
    /// Same shape as `record.rows`.
    pub annotations: Vec<Vec<CellAnnotation>>,
}

impl RenderedTable {
    pub fn annotate(record: TableRecord, classifier: &CellClassifier) -> Self {
        let width = record.width();
        let annotations = record
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(column, cell)| classifier.classify(cell, column, width))
                    .collect()
            })
            .collect();

        Self {
            record,
            annotations,
        }
    }

    pub fn tag_at(&self, row: usize, column: usize) -> Option<CellTag> {
        self.annotations
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(|annotation| annotation.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_basic() {
        let table = assemble("| A | B |", &["| 1 | +5% |"]).unwrap();
        assert_eq!(table.record.headers, vec!["A", "B"]);
        assert_eq!(table.record.rows, vec![vec!["1", "+5%"]]);
        assert_eq!(table.padded_rows, 0);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = assemble("| A | B | C | D | E |", &["| x | y | z |"]).unwrap();
        assert_eq!(table.record.rows[0], vec!["x", "y", "z", "", ""]);
        assert_eq!(table.padded_rows, 1);
        assert!(table.record.is_rectangular());
    }

    #[test]
    fn test_long_rows_are_truncated() {
        let table = assemble("| A | B |", &["| 1 | 2 | 3 |", "| 4 | 5 |"]).unwrap();
        assert_eq!(table.record.rows[0], vec!["1", "2"]);
        assert_eq!(table.truncated_rows, 1);
        assert!(table.record.is_rectangular());
    }

    #[test]
    fn test_empty_header_or_rows_rejected() {
        assert!(assemble("|", &["| 1 |"]).is_none());
        assert!(assemble("| A |", &["|", "| --- |"]).is_none());
    }

    #[test]
    fn test_to_markdown_reassembles() {
        let record = TableRecord {
            headers: vec!["Metric".into(), "".into(), "FY24".into()],
            rows: vec![vec!["Revenue".into(), "".into(), "+12%".into()]],
        };
        let markdown = record.to_markdown();
        let mut lines = markdown.lines();
        let header = lines.next().unwrap();
        let data: Vec<&str> = lines.skip(1).collect();
        let reassembled = assemble(header, &data).unwrap();
        assert_eq!(reassembled.record, record);
    }

    #[test]
    fn test_annotate_matches_shape() {
        let table = assemble("| Item | Change | Note |", &["| +5% | +5% | stable |"]).unwrap();
        let rendered = RenderedTable::annotate(table.record, &CellClassifier::default());
        assert_eq!(rendered.tag_at(0, 0), Some(CellTag::Plain));
        assert_eq!(rendered.tag_at(0, 1), Some(CellTag::Positive));
        assert_eq!(rendered.tag_at(0, 2), Some(CellTag::Neutral));
        assert_eq!(rendered.tag_at(1, 0), None);
    }
}
