use crate::classifier::AmbiguityPolicy;
use crate::error::{ReportFormatError, Result};
use crate::keywords::KeywordTable;
use crate::schema::SectionKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_MAX_TABLE_PASSES: usize = 5;
pub const DEFAULT_MAX_RESIDUAL_RESCANS: usize = 5;
pub const DEFAULT_MIN_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectionRequirement {
    pub section: SectionKey,

    #[schemars(description = "Minimum plain-text length in characters. Shorter sections get a warning.")]
    pub min_chars: usize,

    #[schemars(description = "Minimum number of tables. Fewer is an error.")]
    pub min_tables: usize,

    #[serde(default)]
    #[schemars(description = "Minimum number of chart-container blocks. 0 disables the check.")]
    pub min_charts: usize,
}

impl SectionRequirement {
    pub fn new(section: SectionKey, min_tables: usize) -> Self {
        Self {
            section,
            min_chars: DEFAULT_MIN_CHARS,
            min_tables,
            min_charts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatterConfig {
    #[schemars(description = "Upper bound on table-substitution passes over one section.")]
    pub max_table_passes: usize,

    #[schemars(description = "Upper bound on re-scans while separator fragments remain after substitution.")]
    pub max_residual_rescans: usize,

    #[schemars(description = "Titles of blocks that are dropped when repeated byte-for-byte within a section.")]
    pub dedup_titles: Vec<String>,

    pub keywords: KeywordTable,

    pub ambiguity: AmbiguityPolicy,

    pub requirements: Vec<SectionRequirement>,

    #[schemars(description = "Literal markers that count as a data-source attribution. Empty disables the check.")]
    pub attribution_markers: Vec<String>,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            max_table_passes: DEFAULT_MAX_TABLE_PASSES,
            max_residual_rescans: DEFAULT_MAX_RESIDUAL_RESCANS,
            dedup_titles: vec![
                "Investment Risk-Return Profile".to_string(),
                "投资风险收益概况".to_string(),
            ],
            keywords: KeywordTable::bilingual(),
            ambiguity: AmbiguityPolicy::Priority,
            requirements: vec![
                SectionRequirement::new(SectionKey::FundamentalAnalysis, 2),
                SectionRequirement::new(SectionKey::BusinessSegments, 2),
                SectionRequirement::new(SectionKey::GrowthCatalysts, 2),
                SectionRequirement::new(SectionKey::ValuationAnalysis, 3),
            ],
            attribution_markers: vec![
                "数据来源".to_string(),
                "Data Source".to_string(),
                "Source:".to_string(),
            ],
        }
    }
}

impl FormatterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn requirement(&self, section: SectionKey) -> Option<&SectionRequirement> {
        self.requirements.iter().find(|r| r.section == section)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_table_passes == 0 {
            return Err(ReportFormatError::InvalidPassLimit {
                name: "max_table_passes",
                value: self.max_table_passes,
            });
        }
        if self.max_residual_rescans == 0 {
            return Err(ReportFormatError::InvalidPassLimit {
                name: "max_residual_rescans",
                value: self.max_residual_rescans,
            });
        }

        self.keywords.validate()?;

        if self.attribution_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(ReportFormatError::InvalidKeyword(
                "attribution marker must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for requirement in &self.requirements {
            if !seen.insert(requirement.section) {
                return Err(ReportFormatError::DuplicateRequirement(
                    requirement.section.to_string(),
                ));
            }
        }

        Ok(())
    }
}
