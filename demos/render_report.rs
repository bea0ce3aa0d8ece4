use equity_report_formatter::*;

const FUNDAMENTALS: &str = "## Core Financial Metrics

| Metric | FY2023 | FY2024 | YoY |
|:---|---:|---:|---:|
| Revenue (bn) | 10.2 | 11.4 | +12.1% |
| Gross margin | 41.0% | 39.8% | -1.2pct |
| Net cash | 3.1 | 3.1 | 持平 |

Revenue **grew steadily** on the back of overseas expansion, while gross margin
declined slightly as the product mix shifted toward hardware.

| Ratio | Company | Peer || Industry |
| --- | --- | --- | --- | --- |
| ROE | 14.2% | 12.0% | | 10.5% |
| Debt/Equity | 0.35 | 0.52 |

- Cash conversion stayed above 90%
- Capex guidance unchanged

数据来源: company annual reports, Wind";

const VALUATION: &str = "## Valuation

| Method | Value | vs Price |
| --- | --- | --- |
| DCF | 58.0 | $+18\\%$ |

### Investment Risk-Return Profile

| Dimension | Assessment |
| --- | --- |
| Upside | +25% |

### Investment Risk-Return Profile

| Dimension | Assessment |
| --- | --- |
| Upside | +25% |

Data Source: analyst estimates";

fn main() {
    env_logger::init();

    println!("📄 Equity Report Formatter Demo\n");

    let raw = RawReport::default()
        .with_section(SectionKey::FundamentalAnalysis, FUNDAMENTALS)
        .with_section(SectionKey::ValuationAnalysis, VALUATION);

    let formatter = ReportFormatter::default();
    let outcome = formatter.process(&raw);

    for (key, section) in &outcome.report.sections {
        println!("=== {} ({} table(s)) ===", key, section.table_count());
        println!("{}\n", section.to_markdown());

        if let Some(diagnostics) = outcome.report.diagnostics.get(key) {
            for diagnostic in diagnostics {
                println!("  ⚠️  {}", diagnostic);
            }
        }
    }

    println!("\n🔎 Validation (score {}/100)", outcome.validation.score);
    println!("   Valid: {}", outcome.validation.is_valid);
    for error in &outcome.validation.errors {
        println!("   ❌ {}", error);
    }
    for warning in &outcome.validation.warnings {
        println!("   ⚠️  {}", warning);
    }

    let html = HtmlRenderer::default().render_report(&outcome.report);
    if let Some(page) = html.get(&SectionKey::FundamentalAnalysis) {
        println!("\n🌐 HTML for {}:\n{}", SectionKey::FundamentalAnalysis, page);
    }

    match outcome.report.to_json() {
        Ok(json) => println!("\n✅ Structured JSON: {} bytes", json.len()),
        Err(e) => eprintln!("❌ Failed to serialize report: {}", e),
    }
}
