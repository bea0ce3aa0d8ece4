use crate::classifier::CellTag;
use crate::error::{ReportFormatError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordEntry {
    #[schemars(description = "Word or phrase to look for in a table cell. Matching ignores ASCII case.")]
    pub keyword: String,

    #[schemars(description = "Classification applied when the keyword is found (positive, negative or neutral).")]
    pub tag: CellTag,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Optional locale label, e.g. 'en' or 'zh'. Informational only.")]
    pub locale: Option<String>,
}

/// Keyword to tag table used by the cell classifier.
///
/// Locales are plain data: adding one never touches the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordTable {
    pub entries: Vec<KeywordEntry>,
}

const ENGLISH: &[(&str, CellTag)] = &[
    ("positive", CellTag::Positive),
    ("improved", CellTag::Positive),
    ("improving", CellTag::Positive),
    ("increased", CellTag::Positive),
    ("increase", CellTag::Positive),
    ("growth", CellTag::Positive),
    ("narrowed", CellTag::Positive),
    ("outperform", CellTag::Positive),
    ("outperformed", CellTag::Positive),
    ("negative", CellTag::Negative),
    ("declined", CellTag::Negative),
    ("decline", CellTag::Negative),
    ("decreased", CellTag::Negative),
    ("decrease", CellTag::Negative),
    ("reduced", CellTag::Negative),
    ("deteriorated", CellTag::Negative),
    ("underperform", CellTag::Negative),
    ("underperformed", CellTag::Negative),
    ("neutral", CellTag::Neutral),
    ("stable", CellTag::Neutral),
    ("maintained", CellTag::Neutral),
    ("unchanged", CellTag::Neutral),
    ("flat", CellTag::Neutral),
];

const CHINESE: &[(&str, CellTag)] = &[
    ("增长", CellTag::Positive),
    ("上升", CellTag::Positive),
    ("提高", CellTag::Positive),
    ("增加", CellTag::Positive),
    ("高于", CellTag::Positive),
    ("优于", CellTag::Positive),
    ("超出", CellTag::Positive),
    ("提升", CellTag::Positive),
    ("改善", CellTag::Positive),
    ("下降", CellTag::Negative),
    ("降低", CellTag::Negative),
    ("减少", CellTag::Negative),
    ("亏损", CellTag::Negative),
    ("低于", CellTag::Negative),
    ("劣于", CellTag::Negative),
    ("下滑", CellTag::Negative),
    ("恶化", CellTag::Negative),
    ("负增长", CellTag::Negative),
    ("中性", CellTag::Neutral),
    ("持平", CellTag::Neutral),
    ("稳定", CellTag::Neutral),
    ("不变", CellTag::Neutral),
    ("维持", CellTag::Neutral),
];

impl KeywordTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// English and Chinese descriptors seen in generated equity reports.
    pub fn bilingual() -> Self {
        let mut table = Self::empty();
        table.extend_locale("en", ENGLISH);
        table.extend_locale("zh", CHINESE);
        table
    }

    pub fn extend_locale(&mut self, locale: &str, entries: &[(&str, CellTag)]) {
        self.entries
            .extend(entries.iter().map(|(keyword, tag)| KeywordEntry {
                keyword: (*keyword).to_string(),
                tag: *tag,
                locale: Some(locale.to_string()),
            }));
    }

    #[must_use]
    pub fn with_entry(mut self, keyword: impl Into<String>, tag: CellTag) -> Self {
        self.entries.push(KeywordEntry {
            keyword: keyword.into(),
            tag,
            locale: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            if entry.keyword.trim().is_empty() {
                return Err(ReportFormatError::InvalidKeyword(
                    "keyword must not be empty".to_string(),
                ));
            }
            if matches!(entry.tag, CellTag::Plain | CellTag::Ambiguous) {
                return Err(ReportFormatError::InvalidKeyword(format!(
                    "'{}' maps to {:?}; only positive, negative or neutral are allowed",
                    entry.keyword, entry.tag
                )));
            }
        }
        Ok(())
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::bilingual()
    }
}
