use anyhow::Result;
use equity_report_formatter::*;
use serde_json::json;

const ATTRIBUTION: &str = "数据来源: company filings, Wind";

fn analysis_body() -> String {
    "Operating leverage improved as gross margin expanded and opex ratios fell. ".repeat(8)
}

fn section_text(title: &str, tables: usize) -> String {
    let mut text = format!("## {}\n\n", title);
    for i in 0..tables {
        text.push_str(&format!(
            "### Table {}\n\n| Metric | FY23 | FY24 | YoY |\n|:---|---:|---:|---:|\n| Revenue | 1,020 | 1,143 | +12.1% |\n| Net margin | 8.2% | 7.9% | -0.3pct |\n| Capex | 210 | 210 | 持平 |\n\n",
            i + 1
        ));
    }
    text.push_str(&analysis_body());
    text.push_str("\n\n");
    text.push_str(ATTRIBUTION);
    text
}

fn complete_raw() -> RawReport {
    RawReport::default()
        .with_section(SectionKey::FundamentalAnalysis, section_text("Fundamentals", 2))
        .with_section(SectionKey::BusinessSegments, section_text("Segments", 2))
        .with_section(SectionKey::GrowthCatalysts, section_text("Catalysts", 2))
        .with_section(SectionKey::ValuationAnalysis, section_text("Valuation", 3))
}

#[test]
fn test_single_table_cells_classified() {
    let rendered = render_section("| A | B |\n| --- | --- |\n| 1 | +5% |");
    let tables: Vec<_> = rendered.section.tables().collect();
    assert_eq!(tables.len(), 1);

    let table = tables[0];
    assert_eq!(table.record.headers, vec!["A", "B"]);
    assert_eq!(table.record.rows, vec![vec!["1".to_string(), "+5%".to_string()]]);
    assert_eq!(table.tag_at(0, 1), Some(CellTag::Positive));
    assert_eq!(table.tag_at(0, 0), Some(CellTag::Plain));
}

#[test]
fn test_double_pipe_header_inserts_empty_cells() {
    let text = "Peer comparison:\n\n| Revenue || UBTECH || Xiaomi |\n| --- | --- | --- | --- | --- |\n| FY24 | 1.3bn | | 366bn | |";
    let rendered = render_section(text);
    let table = rendered.section.tables().next().expect("table parsed");
    assert_eq!(table.record.headers, vec!["Revenue", "", "UBTECH", "", "Xiaomi"]);
    assert!(table.record.is_rectangular());
}

#[test]
fn test_missing_section_reported_once() {
    let formatter = ReportFormatter::default();
    let complete = formatter.render_report(&complete_raw());

    let mut missing = complete.clone();
    missing.sections.remove(&SectionKey::GrowthCatalysts);

    let result = formatter.validate(&missing);
    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("growthCatalysts"));

    let baseline = formatter.validate(&complete);
    for key in [
        SectionKey::FundamentalAnalysis,
        SectionKey::BusinessSegments,
        SectionKey::ValuationAnalysis,
    ] {
        assert_eq!(result.errors_for(key), baseline.errors_for(key));
    }
}

#[test]
fn test_repeated_profile_blocks_collapse() {
    let profile = "### Investment Risk-Return Profile\n\n| Dimension | Assessment |\n| --- | --- |\n| Upside | +35% |\n| Downside | -15% |\n\nRisk-reward skews positive.\n\n";
    let text = format!(
        "## Valuation\n\n{}{}{}## Peer Multiples\n\nSee below.",
        profile, profile, profile
    );
    let rendered = render_section(&text);

    let count = rendered
        .section
        .headings()
        .filter(|(_, title)| title == "Investment Risk-Return Profile")
        .count();
    assert_eq!(count, 1);
    assert_eq!(rendered.section.table_count(), 1);
    assert!(rendered
        .section
        .headings()
        .any(|(_, title)| title == "Peer Multiples"));
}

#[test]
fn test_repeated_html_profile_blocks_collapse() {
    let profile = "<div class=\"chart-container\">\n<h4>Investment Risk-Return Profile</h4>\n<div class=\"risk-return-grid\"><div>Expected return: +18%</div><div>Max drawdown: -22%</div></div>\n</div>\n\n";
    let text = format!(
        "## Valuation\n\n{}{}{}Conclusion: fairly valued.",
        profile, profile, profile
    );
    let rendered = render_section(&text);

    assert_eq!(rendered.section.chart_count(), 1);
    assert_eq!(
        rendered
            .section
            .to_markdown()
            .matches("Investment Risk-Return Profile")
            .count(),
        1
    );
    assert!(rendered.section.plain_text().ends_with("Conclusion: fairly valued."));
}

#[test]
fn test_prose_under_table_is_not_a_row() {
    let rendered = render_section("| A | B |\n| --- | --- |\n| 1 | 2 |\nRevenue grew | see note");
    let table = rendered.section.tables().next().expect("table parsed");
    assert_eq!(table.record.rows.len(), 1);
    assert!(rendered.diagnostics.is_empty());
    assert!(rendered.section.plain_text().ends_with("Revenue grew | see note"));
}

#[test]
fn test_short_row_padded_to_header_width() {
    let rendered = render_section("| A | B | C | D | E |\n| --- | --- | --- | --- | --- |\n| x | y | z |");
    let table = rendered.section.tables().next().expect("table parsed");
    assert_eq!(table.record.rows[0], vec!["x", "y", "z", "", ""]);
    assert_eq!(
        rendered.diagnostics,
        vec![RenderDiagnostic::RowsPadded { table: 1, rows: 1 }]
    );
}

#[test]
fn test_rendering_is_idempotent() {
    let inputs = [
        section_text("Fundamentals", 2),
        "| Revenue || UBTECH || Xiaomi |\n|---|---|---|---|---|\n| a | b |\n| 1 | 2 | 3 | 4 | 5 | 6 | 7 |".to_string(),
        "**Investment Risk-Return Profile**\nBalanced.\n\n**Investment Risk-Return Profile**\nBalanced.\n\n- up\n- down\n3. three\n\n<div class=\"chart-container\"><canvas></canvas></div>".to_string(),
        "Text with a stray |---| separator\r\n\r\n\r\n## Heading   \n1) one\n2) two".to_string(),
        "### Investment Risk-Return Profile\nLow risk.\n\n###  Investment Risk-Return Profile\nLow risk.".to_string(),
        "### Investment Risk-Return Profile\nLow risk.\n\n### Investment Risk-Return Profile\n\nLow risk.".to_string(),
        "<div class=\"chart-container\">\n<h4>Investment Risk-Return Profile</h4>\n</div>\n\n<div class=\"chart-container\">\n<h4>Investment Risk-Return Profile</h4>\n</div>".to_string(),
        "| A | B |\n| --- | --- |\n| 1 | 2 |\nRevenue grew | see note".to_string(),
    ];

    for input in &inputs {
        let first = render_section(input).section;
        let second = render_section(&first.to_markdown()).section;
        assert_eq!(first, second, "not idempotent for input: {:?}", input);
    }
}

#[test]
fn test_every_row_matches_header_width() {
    let text = "| A | B | C |\n| --- | --- | --- |\n| 1 |\n| 1 | 2 | 3 | 4 | 5 |\n|| x ||\n| --- |\n| last | row | here |";
    let rendered = render_section(text);
    for table in rendered.section.tables() {
        assert!(table.record.is_rectangular());
        for (row, annotations) in table.record.rows.iter().zip(&table.annotations) {
            assert_eq!(row.len(), annotations.len());
        }
    }
}

#[test]
fn test_first_column_always_plain() {
    let rendered = render_section(
        "| Change | Value |\n| --- | --- |\n| +20% growth | +20% |\n| Decline | -4% |\n| 下降 | 持平 |",
    );
    let table = rendered.section.tables().next().expect("table parsed");
    for row in 0..table.record.rows.len() {
        assert_eq!(table.tag_at(row, 0), Some(CellTag::Plain));
    }
    assert_eq!(table.tag_at(0, 1), Some(CellTag::Positive));
    assert_eq!(table.tag_at(1, 1), Some(CellTag::Negative));
    assert_eq!(table.tag_at(2, 1), Some(CellTag::Neutral));
}

#[test]
fn test_adding_section_only_removes_missing_error() {
    let formatter = ReportFormatter::default();
    let mut report = formatter.render_report(&complete_raw());
    let catalysts = report
        .sections
        .remove(&SectionKey::GrowthCatalysts)
        .expect("catalysts rendered");
    let before = formatter.validate(&report);

    report.insert(SectionKey::GrowthCatalysts, catalysts);
    let after = formatter.validate(&report);

    for error in &after.errors {
        assert!(before.errors.contains(error), "new error appeared: {}", error);
    }
    assert!(after.errors.len() < before.errors.len());
}

#[test]
fn test_mixed_signals_can_be_flagged() -> Result<()> {
    let config = FormatterConfig::from_json_str(r#"{ "ambiguity": "flag" }"#)?;
    let formatter = ReportFormatter::new(config)?;
    let rendered = formatter.render_section(
        SectionKey::ValuationAnalysis,
        "| Item | Change |\n| --- | --- |\n| Margin | +2% revenue, -1% margin |",
    );
    let table = rendered.section.tables().next().expect("table parsed");
    assert_eq!(table.tag_at(0, 1), Some(CellTag::Ambiguous));
    assert!(table.annotations[0][1].mixed_signal);

    let default_tag = render_section("| Item | Change |\n| --- | --- |\n| Margin | +2% revenue, -1% margin |")
        .section
        .tables()
        .next()
        .and_then(|t| t.tag_at(0, 1));
    assert_eq!(default_tag, Some(CellTag::Positive));
    Ok(())
}

#[test]
fn test_full_pipeline_from_json() -> Result<()> {
    let mut value = serde_json::to_value(complete_raw())?;
    value["aiInsights"] = json!("**Key takeaway**: margins stabilise in 2H.");
    let raw = RawReport::from_json_str(&value.to_string())?;

    let outcome = ReportFormatter::default().process(&raw);
    assert!(outcome.validation.is_valid, "errors: {:?}", outcome.validation.errors);
    assert_eq!(outcome.validation.score, 100);

    let document = outcome.accept()?;
    assert_eq!(document.valuation_analysis.table_count(), 3);
    assert!(document.ai_insights.is_some());

    let json = serde_json::to_string(&document)?;
    assert!(json.contains("\"valuationAnalysis\""));
    Ok(())
}

#[test]
fn test_non_string_section_rejected() {
    let result = RawReport::from_json_str(r#"{ "fundamentalAnalysis": 42 }"#);
    assert!(matches!(
        result,
        Err(ReportFormatError::SectionTypeMismatch { ref section, .. }) if section == "fundamentalAnalysis"
    ));
}

#[test]
fn test_response_schema_is_flat() -> Result<()> {
    let schema = RawReport::response_schema()?;
    let text = schema.to_string();
    assert!(!text.contains("$ref"));
    assert!(!text.contains("definitions"));
    assert!(schema["properties"]["valuationAnalysis"].is_object());
    Ok(())
}

#[test]
fn test_retry_accepts_first_valid_report() -> Result<()> {
    let formatter = ReportFormatter::default();
    let outcome = formatter.generate_with_retry(3, |attempt| {
        if attempt == 1 {
            Ok(RawReport::default().with_section(SectionKey::FundamentalAnalysis, section_text("Only", 2)))
        } else {
            Ok(complete_raw())
        }
    })?;
    assert_eq!(outcome.attempt, 2);
    Ok(())
}

#[test]
fn test_html_output_for_report() {
    let report = render_report(&complete_raw());
    let pages = HtmlRenderer::default().render_report(&report);
    assert_eq!(pages.len(), 4);

    let html = &pages[&SectionKey::FundamentalAnalysis];
    assert!(html.contains("<h3>Fundamentals</h3>"));
    assert!(html.contains("<table class=\"metric-table\">"));
    assert!(html.contains("<span class=\"positive\">+12.1%</span>"));
    assert!(html.contains("<span class=\"negative\">-0.3pct</span>"));
    assert!(html.contains("<span class=\"neutral\">持平</span>"));
}
