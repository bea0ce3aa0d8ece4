use crate::config::{FormatterConfig, SectionRequirement};
use crate::document::StructuredSection;
use crate::schema::{RenderedReport, SectionKey};
use crate::utils::char_count;
use log::debug;
use serde::{Deserialize, Serialize};

const SECTION_POINTS: i32 = 25;
const SHORT_CONTENT_PENALTY: i32 = 5;
const TABLE_PENALTY: i32 = 5;
const CHART_PENALTY: i32 = 5;
const ATTRIBUTION_PENALTY: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 0 to 100; every present section is worth 25 points before penalties.
    pub score: u8,
}

impl ValidationResult {
    /// Errors that mention `section` by its JSON name.
    pub fn errors_for(&self, section: SectionKey) -> Vec<&str> {
        let name = section.as_str();
        self.errors
            .iter()
            .filter(|e| e.contains(name))
            .map(String::as_str)
            .collect()
    }
}

/// Checks a rendered report against the configured section requirements.
///
/// Every check runs; nothing short-circuits. The report is only read.
pub struct FormatValidator<'a> {
    config: &'a FormatterConfig,
}

impl<'a> FormatValidator<'a> {
    pub fn new(config: &'a FormatterConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, report: &RenderedReport) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut score = 0i32;

        for key in SectionKey::REQUIRED {
            let Some(section) = report.section(key) else {
                errors.push(format!("Missing required section: {}", key));
                continue;
            };

            score += SECTION_POINTS;
            let requirement = self
                .config
                .requirement(key)
                .cloned()
                .unwrap_or_else(|| SectionRequirement::new(key, 0));
            score -= self.check_section(key, section, &requirement, &mut errors, &mut warnings);
        }

        let score = score.clamp(0, 100) as u8;
        debug!(
            "Validation finished: {} error(s), {} warning(s), score {}",
            errors.len(),
            warnings.len(),
            score
        );

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            score,
        }
    }

    /// Returns the penalty for this section.
    fn check_section(
        &self,
        key: SectionKey,
        section: &StructuredSection,
        requirement: &SectionRequirement,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> i32 {
        let mut penalty = 0;

        let length = char_count(&section.plain_text());
        if length < requirement.min_chars {
            warnings.push(format!(
                "{}: Content too short ({}/{})",
                key, length, requirement.min_chars
            ));
            penalty += SHORT_CONTENT_PENALTY;
        }

        let tables = section.table_count();
        if tables < requirement.min_tables {
            errors.push(format!(
                "{}: Expected at least {} tables, found {}",
                key, requirement.min_tables, tables
            ));
            penalty += TABLE_PENALTY;
        }

        if requirement.min_charts > 0 {
            let charts = section.chart_count();
            if charts < requirement.min_charts {
                errors.push(format!(
                    "{}: Expected at least {} charts, found {}",
                    key, requirement.min_charts, charts
                ));
                penalty += CHART_PENALTY;
            }
        }

        if !self.config.attribution_markers.is_empty() {
            let markdown = section.to_markdown();
            let attributed = self
                .config
                .attribution_markers
                .iter()
                .any(|marker| markdown.contains(marker.as_str()));
            if !attributed {
                errors.push(format!("{}: Missing data source attribution", key));
                penalty += ATTRIBUTION_PENALTY;
            }
        }

        penalty
    }
}
