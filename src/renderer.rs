//! Turns one raw section into a [`StructuredSection`].
//!
//! The steps run in a fixed order over the whole section:
//!
//! 1. Pipe tables are substituted until a pass converts nothing, capped at
//!    `max_table_passes`. Leftover separator fragments trigger bounded re-scans,
//!    then a warning.
//! 2. `#` lines become headings.
//! 3. Blank-line separated runs become paragraphs, unless they already open with a
//!    block-level HTML tag.
//! 4. `**bold**` becomes a strong span.
//! 5. List marker lines are grouped into lists.
//! 6. Trailing whitespace and blank runs disappear.
//! 7. Repeats of a configured title block are dropped, keeping the first. Blocks are
//!    compared once built, so spacing differences do not hide a repeat.
//!
//! Every step recognises its own output, so rendering
//! [`StructuredSection::to_markdown`] again yields the same section.

use crate::classifier::CellClassifier;
use crate::config::FormatterConfig;
use crate::document::{
    inline_plain_text, parse_inline, Block, Inline, RenderDiagnostic, RenderedSection,
    StructuredSection,
};
use crate::table::{assemble, RenderedTable};
use crate::tokenizer::{count_residual_separators, scan_tables};
use crate::utils::{normalize_line_endings, starts_with_structural_tag, strip_html_tags};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(#{1,6})\s+(.*\S)\s*$").expect("valid heading regex"));

static UNORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*+]\s+(.*\S)\s*$").expect("valid unordered-item regex"));

static ORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s+(.*\S)\s*$").expect("valid ordered-item regex"));

/// First heading element inside passed-through HTML.
static HTML_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]\s*>").expect("valid html-heading regex")
});

/// Bold-line and HTML titles rank below every heading level.
const SUBHEADING_RANK: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Line(String),
    Table(RenderedTable),
}

#[derive(Debug, Clone)]
pub struct SectionRenderer {
    classifier: CellClassifier,
    max_table_passes: usize,
    max_residual_rescans: usize,
    dedup_titles: Vec<String>,
}

impl SectionRenderer {
    pub fn new(config: &FormatterConfig) -> Self {
        Self {
            classifier: CellClassifier::new(&config.keywords, config.ambiguity),
            max_table_passes: config.max_table_passes.max(1),
            max_residual_rescans: config.max_residual_rescans,
            dedup_titles: config
                .dedup_titles
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn classifier(&self) -> &CellClassifier {
        &self.classifier
    }

    pub fn render(&self, raw: &str) -> RenderedSection {
        let text = normalize_line_endings(raw);
        let mut diagnostics = Vec::new();

        let items = self.substitute_tables(&text, &mut diagnostics);
        let blocks = self.remove_duplicate_blocks(build_blocks(items), &mut diagnostics);

        debug!(
            "Rendered section into {} block(s) with {} diagnostic(s)",
            blocks.len(),
            diagnostics.len()
        );

        RenderedSection {
            section: StructuredSection { blocks },
            diagnostics,
        }
    }

    fn substitute_tables(&self, text: &str, diagnostics: &mut Vec<RenderDiagnostic>) -> Vec<Item> {
        let mut items: Vec<Item> = text
            .split('\n')
            .map(|line| Item::Line(line.trim_end().to_string()))
            .collect();
        let mut tables_seen = 0;

        let mut passes = 0;
        loop {
            let (next, converted) =
                self.table_pass(items, &mut tables_seen, diagnostics, passes == 0);
            items = next;
            passes += 1;
            if converted == 0 {
                break;
            }
            if passes >= self.max_table_passes {
                warn!("Table substitution still converting after {} passes", passes);
                diagnostics.push(RenderDiagnostic::PassLimitReached { passes });
                break;
            }
        }
        debug!(
            "Table substitution finished after {} pass(es), {} table(s)",
            passes, tables_seen
        );

        let mut residual = residual_separators(&items);
        let mut rescans = 0;
        while residual > 0 && rescans < self.max_residual_rescans {
            let (next, converted) = self.table_pass(items, &mut tables_seen, diagnostics, false);
            items = next;
            rescans += 1;
            residual = residual_separators(&items);
            if converted == 0 {
                break;
            }
        }

        if residual > 0 {
            warn!(
                "{} possibly unconverted table separator(s) remain after {} re-scan(s); passing text through",
                residual, rescans
            );
            diagnostics.push(RenderDiagnostic::ResidualSeparators { count: residual });
        }

        items
    }

    fn table_pass(
        &self,
        items: Vec<Item>,
        tables_seen: &mut usize,
        diagnostics: &mut Vec<RenderDiagnostic>,
        first_pass: bool,
    ) -> (Vec<Item>, usize) {
        let mut out = Vec::with_capacity(items.len());
        let mut run = Vec::new();
        let mut converted = 0;

        for item in items {
            match item {
                Item::Line(line) => run.push(line),
                table @ Item::Table(_) => {
                    converted += self.convert_run(
                        std::mem::take(&mut run),
                        &mut out,
                        tables_seen,
                        diagnostics,
                        first_pass,
                    );
                    out.push(table);
                }
            }
        }
        converted += self.convert_run(run, &mut out, tables_seen, diagnostics, first_pass);

        (out, converted)
    }

    fn convert_run(
        &self,
        lines: Vec<String>,
        out: &mut Vec<Item>,
        tables_seen: &mut usize,
        diagnostics: &mut Vec<RenderDiagnostic>,
        first_pass: bool,
    ) -> usize {
        if lines.is_empty() {
            return 0;
        }

        let text = lines.join("\n");
        let blocks = scan_tables(&text);
        let mut converted = 0;
        let mut cursor = 0;

        for block in &blocks {
            let end = block.first_line + block.line_count;
            out.extend(lines[cursor..block.first_line].iter().cloned().map(Item::Line));

            match assemble(block.header, &block.data) {
                Some(assembled) => {
                    *tables_seen += 1;
                    converted += 1;
                    if assembled.padded_rows > 0 {
                        warn!(
                            "Table #{}: {} row(s) shorter than the header, padded",
                            tables_seen, assembled.padded_rows
                        );
                        diagnostics.push(RenderDiagnostic::RowsPadded {
                            table: *tables_seen,
                            rows: assembled.padded_rows,
                        });
                    }
                    if assembled.truncated_rows > 0 {
                        warn!(
                            "Table #{}: {} row(s) wider than the header, truncated",
                            tables_seen, assembled.truncated_rows
                        );
                        diagnostics.push(RenderDiagnostic::RowsTruncated {
                            table: *tables_seen,
                            rows: assembled.truncated_rows,
                        });
                    }
                    out.push(Item::Table(RenderedTable::annotate(
                        assembled.record,
                        &self.classifier,
                    )));
                }
                None => {
                    if first_pass {
                        diagnostics.push(RenderDiagnostic::TableRejected {
                            line: block.first_line + 1,
                        });
                    }
                    out.extend(lines[block.first_line..end].iter().cloned().map(Item::Line));
                }
            }

            cursor = end;
        }

        out.extend(lines[cursor..].iter().cloned().map(Item::Line));
        converted
    }

    /// Returns the configured title and its rank if `block` opens a dedup block.
    ///
    /// Headings rank by level. A paragraph whose first line is only `**Title**`, and an
    /// HTML block whose first `<hN>` carries the title, rank below every heading.
    fn title_of(&self, block: &Block) -> Option<(usize, String)> {
        let (rank, text) = match block {
            Block::Heading { level, content } => (usize::from(*level), inline_plain_text(content)),
            Block::Paragraph { content } => match content.as_slice() {
                [Inline::Strong(title)] => (SUBHEADING_RANK, title.clone()),
                [Inline::Strong(title), Inline::Text(rest), ..]
                    if rest
                        .split('\n')
                        .next()
                        .unwrap_or_default()
                        .trim()
                        .trim_start_matches([':', '：'])
                        .is_empty() =>
                {
                    (SUBHEADING_RANK, title.clone())
                }
                _ => return None,
            },
            Block::Html { markup } => {
                let caps = HTML_HEADING.captures(markup)?;
                (SUBHEADING_RANK, strip_html_tags(&caps[1]))
            }
            Block::Table(_) | Block::List { .. } => return None,
        };

        let title = text
            .trim()
            .trim_end_matches([':', '：'])
            .trim()
            .to_lowercase();

        self.dedup_titles
            .iter()
            .find(|t| **t == title)
            .map(|t| (rank, t.clone()))
    }

    /// Drops later title blocks that repeat a kept block of the same title exactly.
    ///
    /// Runs on built blocks, so copies that differ only in spacing or blank lines
    /// compare equal, as they would after re-rendering.
    fn remove_duplicate_blocks(
        &self,
        blocks: Vec<Block>,
        diagnostics: &mut Vec<RenderDiagnostic>,
    ) -> Vec<Block> {
        if self.dedup_titles.is_empty() {
            return blocks;
        }

        let mut keep = vec![true; blocks.len()];
        let mut kept_bodies: Vec<(String, usize, usize)> = Vec::new();
        let mut removed: BTreeMap<String, usize> = BTreeMap::new();

        let mut i = 0;
        while i < blocks.len() {
            let Some((rank, title)) = self.title_of(&blocks[i]) else {
                i += 1;
                continue;
            };

            let duplicate_len = kept_bodies
                .iter()
                .filter(|(t, _, _)| *t == title)
                .map(|&(_, start, end)| &blocks[start..end])
                .find(|body| blocks[i..].starts_with(body))
                .map(<[Block]>::len);

            if let Some(len) = duplicate_len {
                keep[i..i + len].iter_mut().for_each(|k| *k = false);
                *removed.entry(title).or_default() += 1;
                i += len;
                continue;
            }

            let end = self.block_end(&blocks, i, rank);
            kept_bodies.push((title, i, end));
            i = end;
        }

        for (title, count) in removed {
            info!("Removed {} duplicate '{}' block(s)", count, title);
            diagnostics.push(RenderDiagnostic::DuplicateBlocksRemoved {
                title,
                removed: count,
            });
        }

        blocks
            .into_iter()
            .zip(keep)
            .filter_map(|(block, keep)| keep.then_some(block))
            .collect()
    }

    /// A title block runs until the next heading of the same or higher rank, or the
    /// next title block.
    fn block_end(&self, blocks: &[Block], start: usize, rank: usize) -> usize {
        blocks[start + 1..]
            .iter()
            .position(|block| {
                matches!(block, Block::Heading { level, .. } if usize::from(*level) <= rank)
                    || self.title_of(block).is_some()
            })
            .map_or(blocks.len(), |offset| start + 1 + offset)
    }
}

impl Default for SectionRenderer {
    fn default() -> Self {
        Self::new(&FormatterConfig::default())
    }
}

fn residual_separators(items: &[Item]) -> usize {
    items
        .iter()
        .map(|item| match item {
            Item::Line(line) => count_residual_separators(line),
            Item::Table(_) => 0,
        })
        .sum()
}

fn list_item(line: &str) -> Option<(bool, &str)> {
    if let Some(caps) = UNORDERED_ITEM.captures(line) {
        return caps.get(1).map(|m| (false, m.as_str()));
    }
    ORDERED_ITEM
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| (true, m.as_str()))
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    paragraph: Vec<String>,
    list: Option<(bool, Vec<Vec<Inline>>)>,
}

impl BlockBuilder {
    fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            self.flush();
            return;
        }

        if let Some(caps) = HEADING.captures(line) {
            self.flush();
            self.blocks.push(Block::Heading {
                level: caps[1].len() as u8,
                content: parse_inline(&caps[2]),
            });
            return;
        }

        if let Some((ordered, text)) = list_item(line) {
            self.flush_paragraph();
            if !matches!(&self.list, Some((kind, _)) if *kind == ordered) {
                self.flush_list();
                self.list = Some((ordered, Vec::new()));
            }
            if let Some((_, items)) = &mut self.list {
                items.push(parse_inline(text));
            }
            return;
        }

        self.flush_list();
        self.paragraph.push(line.to_string());
    }

    fn push_table(&mut self, table: RenderedTable) {
        self.flush();
        self.blocks.push(Block::Table(table));
    }

    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_list();
    }

    fn flush_paragraph(&mut self) {
        if self.paragraph.is_empty() {
            return;
        }
        let joined = self.paragraph.join("\n");
        self.paragraph.clear();

        let text = joined.trim();
        if text.is_empty() {
            return;
        }
        if starts_with_structural_tag(text) {
            self.blocks.push(Block::Html {
                markup: text.to_string(),
            });
        } else {
            self.blocks.push(Block::Paragraph {
                content: parse_inline(text),
            });
        }
    }

    fn flush_list(&mut self) {
        if let Some((ordered, items)) = self.list.take() {
            self.blocks.push(Block::List { ordered, items });
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

fn build_blocks(items: Vec<Item>) -> Vec<Block> {
    let mut builder = BlockBuilder::default();
    for item in items {
        match item {
            Item::Line(line) => builder.push_line(&line),
            Item::Table(table) => builder.push_table(table),
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CellTag;

    fn render(text: &str) -> RenderedSection {
        SectionRenderer::default().render(text)
    }

    #[test]
    fn test_single_table() {
        let rendered = render("| A | B |\n| --- | --- |\n| 1 | +5% |");
        assert_eq!(rendered.section.blocks.len(), 1);
        let Block::Table(table) = &rendered.section.blocks[0] else {
            panic!("expected a table block");
        };
        assert_eq!(table.record.headers, vec!["A", "B"]);
        assert_eq!(table.record.rows, vec![vec!["1", "+5%"]]);
        assert_eq!(table.tag_at(0, 0), Some(CellTag::Plain));
        assert_eq!(table.tag_at(0, 1), Some(CellTag::Positive));
        assert!(rendered.diagnostics.is_empty());
    }

    #[test]
    fn test_headings_paragraphs_and_emphasis() {
        let rendered = render("## Overview\nRevenue **rose** sharply.\nSecond line.\n\n### Detail\n\nClosing.");
        let blocks = &rendered.section.blocks;
        assert_eq!(blocks.len(), 4);
        assert!(matches!(&blocks[0], Block::Heading { level: 2, .. }));
        assert_eq!(
            blocks[1],
            Block::Paragraph {
                content: vec![
                    Inline::Text("Revenue ".into()),
                    Inline::Strong("rose".into()),
                    Inline::Text(" sharply.\nSecond line.".into()),
                ]
            }
        );
        assert!(matches!(&blocks[2], Block::Heading { level: 3, .. }));
        assert!(matches!(&blocks[3], Block::Paragraph { .. }));
    }

    #[test]
    fn test_lists_are_grouped_by_kind() {
        let rendered = render("- one\n* two\n+ three\n1. first\n2) second\nAfter");
        let blocks = &rendered.section.blocks;
        assert_eq!(blocks.len(), 3);
        match &blocks[0] {
            Block::List { ordered, items } => {
                assert!(!ordered);
                assert_eq!(items.len(), 3);
            }
            other => panic!("unexpected block: {:?}", other),
        }
        match &blocks[1] {
            Block::List { ordered, items } => {
                assert!(ordered);
                assert_eq!(items[1], vec![Inline::Text("second".into())]);
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_bold_paragraph_is_not_a_list() {
        let rendered = render("**Revenue** grew\n-5% is a paragraph too");
        assert_eq!(rendered.section.blocks.len(), 1);
        assert!(matches!(&rendered.section.blocks[0], Block::Paragraph { .. }));
    }

    #[test]
    fn test_html_is_passed_through() {
        let html = "<div class=\"chart-container\">\n<h4>Chart</h4>\n</div>";
        let rendered = render(&format!("{}\n\nText **b**", html));
        assert_eq!(
            rendered.section.blocks[0],
            Block::Html {
                markup: html.to_string()
            }
        );
        assert_eq!(rendered.section.chart_count(), 1);
    }

    #[test]
    fn test_padding_is_reported() {
        let rendered = render("| A | B | C |\n|---|---|---|\n| x |");
        assert_eq!(
            rendered.diagnostics,
            vec![RenderDiagnostic::RowsPadded { table: 1, rows: 1 }]
        );
    }

    #[test]
    fn test_residual_separator_passes_through() {
        let rendered = render("| A | B |\n| --- | --- |\n\nText");
        assert_eq!(rendered.section.table_count(), 0);
        assert_eq!(
            rendered.diagnostics,
            vec![RenderDiagnostic::ResidualSeparators { count: 1 }]
        );
        assert_eq!(rendered.section.blocks.len(), 2);
    }

    #[test]
    fn test_rejected_block_stays_text() {
        let rendered = render("Intro\n|\n|---|\n| 1 |");
        assert!(rendered
            .diagnostics
            .contains(&RenderDiagnostic::TableRejected { line: 2 }));
        assert_eq!(rendered.section.table_count(), 0);
    }

    #[test]
    fn test_duplicate_profile_blocks_removed() {
        let block = "### Investment Risk-Return Profile\n\n| Metric | Value |\n| --- | --- |\n| Upside | +25% |\n\nBalanced profile.\n\n";
        let text = format!("## Valuation\n\n{}{}{}## Conclusion\n\nDone.", block, block, block);
        let rendered = render(&text);

        let profiles = rendered
            .section
            .headings()
            .filter(|(_, title)| title == "Investment Risk-Return Profile")
            .count();
        assert_eq!(profiles, 1);
        assert_eq!(rendered.section.table_count(), 1);
        assert!(rendered.diagnostics.contains(&RenderDiagnostic::DuplicateBlocksRemoved {
            title: "investment risk-return profile".into(),
            removed: 2,
        }));
        assert!(rendered.section.headings().any(|(_, t)| t == "Conclusion"));
    }

    #[test]
    fn test_duplicate_followed_by_trailing_text() {
        let text = "**Investment Risk-Return Profile**\nLow risk.\n\n**Investment Risk-Return Profile**\nLow risk.\n\nTail paragraph.";
        let rendered = render(text);
        assert_eq!(rendered.section.blocks.len(), 2);
        assert!(rendered.section.plain_text().ends_with("Tail paragraph."));
    }

    #[test]
    fn test_differing_profile_blocks_are_kept() {
        let text = "### Investment Risk-Return Profile\nA\n\n### Investment Risk-Return Profile\nB";
        let rendered = render(text);
        assert_eq!(rendered.section.headings().count(), 2);
        assert!(rendered.diagnostics.is_empty());
    }

    #[test]
    fn test_duplicates_differing_only_in_spacing_removed() {
        let inputs = [
            ("### Investment Risk-Return Profile\nLow risk.\n\n###  Investment Risk-Return Profile\nLow risk.", 2),
            ("### Investment Risk-Return Profile\nLow risk.\n\n### Investment Risk-Return Profile\n\nLow risk.", 2),
            ("**Investment Risk-Return Profile**\nLow risk.   \n\n\n**Investment Risk-Return Profile**  \nLow risk.", 1),
        ];
        for (input, expected_blocks) in inputs {
            let first = render(input);
            assert_eq!(first.section.blocks.len(), expected_blocks, "input: {:?}", input);
            assert_eq!(
                first.diagnostics,
                vec![RenderDiagnostic::DuplicateBlocksRemoved {
                    title: "investment risk-return profile".into(),
                    removed: 1,
                }]
            );

            let second = render(&first.section.to_markdown());
            assert_eq!(first.section, second.section, "input: {:?}", input);
        }
    }

    #[test]
    fn test_duplicate_html_profile_blocks_removed() {
        let block = "<div class=\"chart-container\">\n<h4>Investment Risk-Return Profile</h4>\n<div class=\"risk-grid\"><span>Upside +25%</span></div>\n</div>\n\n";
        let text = format!("Intro.\n\n{}{}{}Closing remarks.", block, block, block);
        let rendered = render(&text);

        assert_eq!(rendered.section.chart_count(), 1);
        assert_eq!(
            rendered.section.to_markdown().matches("Investment Risk-Return Profile").count(),
            1
        );
        assert!(rendered.section.plain_text().ends_with("Closing remarks."));
        assert!(rendered.diagnostics.contains(&RenderDiagnostic::DuplicateBlocksRemoved {
            title: "investment risk-return profile".into(),
            removed: 2,
        }));

        let again = render(&rendered.section.to_markdown()).section;
        assert_eq!(rendered.section, again);
    }

    #[test]
    fn test_chinese_html_title_matches() {
        let block = "<div class=\"chart-container\"><h4 class=\"title\">投资风险收益概况</h4><p>中性</p></div>\n\n";
        let rendered = render(&block.repeat(2));
        assert_eq!(rendered.section.blocks.len(), 1);
    }

    #[test]
    fn test_render_is_idempotent() {
        let text = "## Core Metrics\n\n| Metric | FY24 | YoY |\n|:--|--:|--:|\n| Revenue | 120 | +12% |\n| Margin || -1.5% |\n\nMargins **declined** slightly.\n- Point one\n- Point two\n\n1. First\n2. Second\n\n<div class=\"chart-container\"><h4>Trend</h4></div>\n\n数据来源: company filings";
        let first = render(text).section;
        let second = render(&first.to_markdown()).section;
        assert_eq!(first, second);
    }

    #[test]
    fn test_crlf_and_trailing_whitespace() {
        let rendered = render("Line one   \r\nLine two\r\n\r\n\r\n\r\nNext");
        assert_eq!(
            rendered.section.blocks,
            vec![
                Block::Paragraph {
                    content: vec![Inline::Text("Line one\nLine two".into())]
                },
                Block::Paragraph {
                    content: vec![Inline::Text("Next".into())]
                },
            ]
        );
    }
}
