//! # Equity Report Formatter
//!
//! Turns the free-form, LLM-generated sections of an equity research report into
//! structured documents and checks them against per-section requirements.
//!
//! ## Core Concepts
//!
//! - **Raw report**: up to four required sections (plus optional AI insights) of
//!   markdown-like text, as returned by the generator
//! - **Tables**: pipe-delimited blocks are tokenized line by line, assembled into
//!   rectangular records and every data cell is tagged positive, negative, neutral or plain
//! - **Rendering**: headings, paragraphs, bold spans and lists become typed blocks;
//!   repeated profile blocks are dropped; rendering is idempotent
//! - **Validation**: missing sections, thin content, too few tables and missing
//!   data-source attributions are reported without stopping at the first problem
//!
//! ## Example
//!
//! ```rust
//! use equity_report_formatter::*;
//!
//! let raw = RawReport::default().with_section(
//!     SectionKey::FundamentalAnalysis,
//!     "## Core Metrics\n\n| Metric | YoY |\n| --- | --- |\n| Revenue | +12% |\n\n数据来源: annual report",
//! );
//!
//! let formatter = ReportFormatter::default();
//! let outcome = formatter.process(&raw);
//!
//! let section = outcome.report.section(SectionKey::FundamentalAnalysis).unwrap();
//! assert_eq!(section.table_count(), 1);
//! assert!(!outcome.validation.is_valid);
//! ```

pub mod classifier;
pub mod config;
pub mod document;
pub mod error;
pub mod html;
pub mod keywords;
pub mod renderer;
pub mod schema;
pub mod table;
pub mod tokenizer;
pub mod utils;
pub mod validator;

pub use classifier::{AmbiguityPolicy, CellAnnotation, CellClassifier, CellTag, MathSpan};
pub use config::{FormatterConfig, SectionRequirement};
pub use document::{Block, Inline, RenderDiagnostic, RenderedSection, StructuredSection};
pub use error::{ReportFormatError, Result};
pub use html::{HtmlOptions, HtmlRenderer};
pub use keywords::{KeywordEntry, KeywordTable};
pub use renderer::SectionRenderer;
pub use schema::{RawReport, RenderedReport, ReportDocument, SectionKey};
pub use table::{RenderedTable, TableRecord};
pub use validator::{FormatValidator, ValidationResult};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

/// A rendered report with its validation verdict.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub report: RenderedReport,
    pub validation: ValidationResult,
    pub validated_at: DateTime<Utc>,
    /// 1-based generation attempt that produced this report.
    pub attempt: usize,
}

impl ReportOutcome {
    /// Converts a valid outcome into a complete [`ReportDocument`].
    pub fn accept(self) -> Result<ReportDocument> {
        if !self.validation.is_valid {
            return Err(ReportFormatError::NoAcceptableReport {
                attempts: self.attempt,
                last_errors: self.validation.errors.join("; "),
            });
        }
        ReportDocument::try_from(self.report)
    }
}

pub struct ReportFormatter {
    config: FormatterConfig,
    renderer: SectionRenderer,
}

impl ReportFormatter {
    pub fn new(config: FormatterConfig) -> Result<Self> {
        config.validate()?;
        let renderer = SectionRenderer::new(&config);
        Ok(Self { config, renderer })
    }

    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    pub fn render_section(&self, key: SectionKey, raw: &str) -> RenderedSection {
        let rendered = self.renderer.render(raw);
        for diagnostic in &rendered.diagnostics {
            debug!("{}: {}", key, diagnostic);
        }
        rendered
    }

    pub fn render_report(&self, raw: &RawReport) -> RenderedReport {
        let mut report = RenderedReport::default();

        for (key, text) in raw.sections() {
            if text.trim().is_empty() {
                debug!("Section {} is blank, treating as absent", key);
                continue;
            }
            let rendered = self.render_section(key, text);
            if !rendered.diagnostics.is_empty() {
                report.diagnostics.insert(key, rendered.diagnostics);
            }
            report.insert(key, rendered.section);
        }

        info!(
            "Rendered report: {} section(s), {} table(s)",
            report.sections.len(),
            report
                .sections
                .values()
                .map(StructuredSection::table_count)
                .sum::<usize>()
        );

        report
    }

    pub fn validate(&self, report: &RenderedReport) -> ValidationResult {
        FormatValidator::new(&self.config).validate(report)
    }

    pub fn process(&self, raw: &RawReport) -> ReportOutcome {
        self.process_attempt(raw, 1)
    }

    /// Calls `generate` until one of its reports validates, at most `max_attempts` times.
    ///
    /// Generator errors count as failed attempts.
    pub fn generate_with_retry<F>(&self, max_attempts: usize, mut generate: F) -> Result<ReportOutcome>
    where
        F: FnMut(usize) -> Result<RawReport>,
    {
        let mut last_errors = String::from("no attempts made");

        for attempt in 1..=max_attempts {
            let raw = match generate(attempt) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Generation attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last_errors = e.to_string();
                    continue;
                }
            };

            let outcome = self.process_attempt(&raw, attempt);
            if outcome.validation.is_valid {
                info!(
                    "Report accepted on attempt {}/{} (score {})",
                    attempt, max_attempts, outcome.validation.score
                );
                return Ok(outcome);
            }

            warn!(
                "Attempt {}/{} rejected with {} error(s)",
                attempt,
                max_attempts,
                outcome.validation.errors.len()
            );
            last_errors = outcome.validation.errors.join("; ");
        }

        Err(ReportFormatError::NoAcceptableReport {
            attempts: max_attempts,
            last_errors,
        })
    }

    fn process_attempt(&self, raw: &RawReport, attempt: usize) -> ReportOutcome {
        let report = self.render_report(raw);
        let validation = self.validate(&report);
        for warning in &validation.warnings {
            debug!("Validation warning: {}", warning);
        }

        ReportOutcome {
            report,
            validation,
            validated_at: Utc::now(),
            attempt,
        }
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        let config = FormatterConfig::default();
        let renderer = SectionRenderer::new(&config);
        Self { config, renderer }
    }
}

pub fn render_section(raw: &str) -> RenderedSection {
    SectionRenderer::default().render(raw)
}

pub fn render_report(raw: &RawReport) -> RenderedReport {
    ReportFormatter::default().render_report(raw)
}

pub fn validate_report(report: &RenderedReport) -> ValidationResult {
    ReportFormatter::default().validate(report)
}
