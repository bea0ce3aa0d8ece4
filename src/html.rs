//! HTML output for rendered sections, in the markup the report pages style:
//! `metric-table` tables whose cells carry `positive`/`negative`/`neutral`/`ambiguous`
//! spans, with `$...$` math spans coloured one by one.

use crate::classifier::CellAnnotation;
use crate::document::{parse_inline, Block, Inline, StructuredSection};
use crate::schema::{RenderedReport, SectionKey};
use crate::table::RenderedTable;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HtmlOptions {
    /// Added to each heading level; `##` renders as `<h3>` by default.
    pub heading_offset: u8,
    pub table_class: String,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            heading_offset: 1,
            table_class: "metric-table".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    options: HtmlOptions,
}

impl HtmlRenderer {
    pub fn new(options: HtmlOptions) -> Self {
        Self { options }
    }

    pub fn render_report(&self, report: &RenderedReport) -> BTreeMap<SectionKey, String> {
        report
            .sections
            .iter()
            .map(|(key, section)| (*key, self.render_section(section)))
            .collect()
    }

    pub fn render_section(&self, section: &StructuredSection) -> String {
        section
            .blocks
            .iter()
            .map(|block| self.render_block(block))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_block(&self, block: &Block) -> String {
        match block {
            Block::Heading { level, content } => {
                let level = level.saturating_add(self.options.heading_offset).clamp(1, 6);
                format!("<h{0}>{1}</h{0}>", level, inlines_to_html(content))
            }
            Block::Paragraph { content } => format!("<p>{}</p>", inlines_to_html(content)),
            Block::Table(table) => self.render_table(table),
            Block::List { ordered, items } => {
                let tag = if *ordered { "ol" } else { "ul" };
                let items: String = items
                    .iter()
                    .map(|item| format!("<li>{}</li>", inlines_to_html(item)))
                    .collect();
                format!("<{0}>{1}</{0}>", tag, items)
            }
            Block::Html { markup } => markup.clone(),
        }
    }

    fn render_table(&self, table: &RenderedTable) -> String {
        let mut html = format!(
            "<table class=\"{}\">\n<thead>\n<tr>",
            encode_double_quoted_attribute(&self.options.table_class)
        );
        for header in &table.record.headers {
            html.push_str(&format!("<th>{}</th>", inlines_to_html(&parse_inline(header))));
        }
        html.push_str("</tr>\n</thead>\n<tbody>\n");

        for (row_index, row) in table.record.rows.iter().enumerate() {
            html.push_str("<tr>");
            for (column, cell) in row.iter().enumerate() {
                let cell_html = match table
                    .annotations
                    .get(row_index)
                    .and_then(|cells| cells.get(column))
                {
                    Some(annotation) => cell_to_html(cell, annotation),
                    None => inlines_to_html(&parse_inline(cell)),
                };
                html.push_str(&format!("<td>{}</td>", cell_html));
            }
            html.push_str("</tr>\n");
        }

        html.push_str("</tbody>\n</table>");
        html
    }
}

fn inlines_to_html(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) => encode_text(text).into_owned(),
            Inline::Strong(text) => format!("<strong>{}</strong>", encode_text(text)),
        })
        .collect()
}

fn wrap(class: Option<&str>, html: String) -> String {
    match class {
        Some(class) => format!("<span class=\"{}\">{}</span>", class, html),
        None => html,
    }
}

fn cell_to_html(cell: &str, annotation: &CellAnnotation) -> String {
    let coloured_math = annotation
        .math_spans
        .iter()
        .any(|span| span.tag.css_class().is_some());

    if !coloured_math {
        return wrap(
            annotation.tag.css_class(),
            inlines_to_html(&parse_inline(cell)),
        );
    }

    let mut html = String::new();
    let mut cursor = 0;
    for span in &annotation.math_spans {
        let (Some(before), Some(math)) = (cell.get(cursor..span.start), cell.get(span.start..span.end))
        else {
            continue;
        };
        html.push_str(&inlines_to_html(&parse_inline(before)));
        html.push_str(&wrap(span.tag.css_class(), encode_text(math).into_owned()));
        cursor = span.end;
    }
    if let Some(rest) = cell.get(cursor..) {
        html.push_str(&inlines_to_html(&parse_inline(rest)));
    }
    html
}
