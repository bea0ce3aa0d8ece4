use crate::table::RenderedTable;
use crate::utils::{count_case_insensitive, strip_html_tags};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid strong regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Strong(String),
}

/// Splits `**bold**` spans out of running text.
pub fn parse_inline(text: &str) -> Vec<Inline> {
    let mut inlines = Vec::new();
    let mut cursor = 0;

    for caps in STRONG.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            inlines.push(Inline::Text(text[cursor..whole.start()].to_string()));
        }
        inlines.push(Inline::Strong(inner.as_str().to_string()));
        cursor = whole.end();
    }

    if cursor < text.len() {
        inlines.push(Inline::Text(text[cursor..].to_string()));
    }

    inlines
}

pub fn inline_to_markdown(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) => text.clone(),
            Inline::Strong(text) => format!("**{}**", text),
        })
        .collect()
}

pub fn inline_plain_text(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) | Inline::Strong(text) => text.as_str(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// `level` is the number of `#` markers in the source.
    Heading { level: u8, content: Vec<Inline> },
    Paragraph { content: Vec<Inline> },
    Table(RenderedTable),
    List {
        ordered: bool,
        items: Vec<Vec<Inline>>,
    },
    /// Content that already arrived as block-level HTML; passed through untouched.
    Html { markup: String },
}

impl Block {
    pub fn to_markdown(&self) -> String {
        match self {
            Block::Heading { level, content } => format!(
                "{} {}",
                "#".repeat(usize::from(*level)),
                inline_to_markdown(content)
            ),
            Block::Paragraph { content } => inline_to_markdown(content),
            Block::Table(table) => table.record.to_markdown(),
            Block::List { ordered, items } => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    if *ordered {
                        format!("{}. {}", i + 1, inline_to_markdown(item))
                    } else {
                        format!("- {}", inline_to_markdown(item))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Block::Html { markup } => markup.clone(),
        }
    }

    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading { content, .. } | Block::Paragraph { content } => {
                inline_plain_text(content)
            }
            Block::Table(table) => std::iter::once(&table.record.headers)
                .chain(table.record.rows.iter())
                .map(|cells| cells.join(" "))
                .collect::<Vec<_>>()
                .join("\n"),
            Block::List { items, .. } => items
                .iter()
                .map(|item| inline_plain_text(item))
                .collect::<Vec<_>>()
                .join("\n"),
            Block::Html { markup } => strip_html_tags(markup),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSection {
    pub blocks: Vec<Block>,
}

impl StructuredSection {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Re-serializes into the markdown-like source grammar. Rendering the result
    /// again yields an equal section.
    pub fn to_markdown(&self) -> String {
        self.blocks
            .iter()
            .map(Block::to_markdown)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Text with every structural marker removed.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::plain_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tables(&self) -> impl Iterator<Item = &RenderedTable> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Table(table) => Some(table),
            _ => None,
        })
    }

    /// Parsed tables plus `<table` elements inside passed-through HTML.
    pub fn table_count(&self) -> usize {
        self.tables().count() + self.count_in_html("<table")
    }

    pub fn chart_count(&self) -> usize {
        self.count_in_html("class=\"chart-container\"")
    }

    pub fn headings(&self) -> impl Iterator<Item = (u8, String)> + '_ {
        self.blocks.iter().filter_map(|block| match block {
            Block::Heading { level, content } => Some((*level, inline_plain_text(content))),
            _ => None,
        })
    }

    fn count_in_html(&self, needle: &str) -> usize {
        self.blocks
            .iter()
            .map(|block| match block {
                Block::Html { markup } => count_case_insensitive(markup, needle),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderDiagnostic {
    RowsPadded { table: usize, rows: usize },
    RowsTruncated { table: usize, rows: usize },
    TableRejected { line: usize },
    ResidualSeparators { count: usize },
    DuplicateBlocksRemoved { title: String, removed: usize },
    PassLimitReached { passes: usize },
}

impl fmt::Display for RenderDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderDiagnostic::RowsPadded { table, rows } => {
                write!(f, "Table #{}: padded {} short row(s) to header width", table, rows)
            }
            RenderDiagnostic::RowsTruncated { table, rows } => {
                write!(f, "Table #{}: truncated {} long row(s) to header width", table, rows)
            }
            RenderDiagnostic::TableRejected { line } => {
                write!(f, "Table block at line {} could not be parsed; kept as text", line)
            }
            RenderDiagnostic::ResidualSeparators { count } => {
                write!(f, "{} unconverted table separator(s) remain", count)
            }
            RenderDiagnostic::DuplicateBlocksRemoved { title, removed } => {
                write!(f, "Removed {} duplicate '{}' block(s)", removed, title)
            }
            RenderDiagnostic::PassLimitReached { passes } => {
                write!(f, "Table substitution still changing after {} passes", passes)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSection {
    pub section: StructuredSection,
    pub diagnostics: Vec<RenderDiagnostic>,
}
