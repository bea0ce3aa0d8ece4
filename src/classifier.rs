use crate::keywords::KeywordTable;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A sign only counts at the start of a token, so `2023-2024` or `Q1-25` stay unsigned.
static SIGNED_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s(\[（:：=,，;；/])([+＋\-－−])\.?\d").expect("valid signed-number regex")
});

static MATH_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([^$]+)\$").expect("valid math-span regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CellTag {
    Positive,
    Negative,
    Neutral,
    Plain,
    /// Both positive and negative evidence, reported only under [`AmbiguityPolicy::Flag`].
    Ambiguous,
}

impl CellTag {
    pub fn css_class(&self) -> Option<&'static str> {
        match self {
            CellTag::Positive => Some("positive"),
            CellTag::Negative => Some("negative"),
            CellTag::Neutral => Some("neutral"),
            CellTag::Ambiguous => Some("ambiguous"),
            CellTag::Plain => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    #[default]
    #[schemars(description = "Resolve conflicting evidence by fixed priority: positive, then negative, then neutral.")]
    Priority,

    #[schemars(description = "Tag cells carrying both positive and negative evidence as 'ambiguous'.")]
    Flag,
}

/// A `$...$` span inside a cell, classified on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathSpan {
    /// Byte offset of the opening `$` in the cell text.
    pub start: usize,
    /// Byte offset just past the closing `$`.
    pub end: usize,
    pub inner: String,
    pub tag: CellTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAnnotation {
    pub tag: CellTag,
    /// Set whenever positive and negative evidence were both present, whatever the policy.
    pub mixed_signal: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub math_spans: Vec<MathSpan>,
}

impl CellAnnotation {
    pub fn plain() -> Self {
        Self {
            tag: CellTag::Plain,
            mixed_signal: false,
            math_spans: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evidence {
    pub positive: bool,
    pub negative: bool,
    pub neutral: bool,
}

impl Evidence {
    fn record(&mut self, tag: CellTag) {
        match tag {
            CellTag::Positive => self.positive = true,
            CellTag::Negative => self.negative = true,
            CellTag::Neutral => self.neutral = true,
            CellTag::Plain | CellTag::Ambiguous => {}
        }
    }

    fn merge(&mut self, other: Evidence) {
        self.positive |= other.positive;
        self.negative |= other.negative;
        self.neutral |= other.neutral;
    }
}

#[derive(Debug, Clone)]
struct PreparedKeyword {
    needle: String,
    tag: CellTag,
    ascii: bool,
}

#[derive(Debug, Clone)]
pub struct CellClassifier {
    keywords: Vec<PreparedKeyword>,
    policy: AmbiguityPolicy,
}

impl CellClassifier {
    pub fn new(table: &KeywordTable, policy: AmbiguityPolicy) -> Self {
        let mut keywords: Vec<PreparedKeyword> = table
            .entries
            .iter()
            .map(|entry| {
                let needle = entry.keyword.trim().to_lowercase();
                PreparedKeyword {
                    ascii: needle.is_ascii(),
                    needle,
                    tag: entry.tag,
                }
            })
            .filter(|k| !k.needle.is_empty())
            .collect();

        // Longest first, so compounds like 负增长 claim their span before 增长 can.
        keywords.sort_by(|a, b| b.needle.chars().count().cmp(&a.needle.chars().count()));

        Self { keywords, policy }
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    /// Classifies one data cell. Column 0 is a row label and is always plain.
    pub fn classify(&self, text: &str, column: usize, column_count: usize) -> CellAnnotation {
        if column == 0 || column >= column_count {
            return CellAnnotation::plain();
        }

        let mut evidence = Evidence::default();
        let mut math_spans = Vec::new();
        let mut outside = String::with_capacity(text.len());
        let mut cursor = 0;

        for caps in MATH_SPAN.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let inner = inner.as_str().trim();
            let span_evidence = sign_evidence(inner);
            evidence.merge(span_evidence);
            math_spans.push(MathSpan {
                start: whole.start(),
                end: whole.end(),
                inner: inner.to_string(),
                tag: self.resolve(span_evidence).0,
            });

            outside.push_str(&text[cursor..whole.start()]);
            outside.push(' ');
            cursor = whole.end();
        }
        outside.push_str(&text[cursor..]);

        evidence.merge(sign_evidence(&outside));
        evidence.merge(self.scan_keywords(&outside));

        let (tag, mixed_signal) = self.resolve(evidence);
        if mixed_signal {
            debug!("Cell '{}' carries mixed signals, tagged {:?}", text, tag);
        }

        CellAnnotation {
            tag,
            mixed_signal,
            math_spans,
        }
    }

    fn resolve(&self, evidence: Evidence) -> (CellTag, bool) {
        let mixed = evidence.positive && evidence.negative;

        let tag = if mixed && self.policy == AmbiguityPolicy::Flag {
            CellTag::Ambiguous
        } else if evidence.positive {
            CellTag::Positive
        } else if evidence.negative {
            CellTag::Negative
        } else if evidence.neutral {
            CellTag::Neutral
        } else {
            CellTag::Plain
        };

        (tag, mixed)
    }

    fn scan_keywords(&self, text: &str) -> Evidence {
        let lowered = text.to_lowercase();
        let mut consumed = vec![false; lowered.len()];
        let mut evidence = Evidence::default();

        for keyword in &self.keywords {
            for (start, _) in lowered.match_indices(keyword.needle.as_str()) {
                let end = start + keyword.needle.len();
                if consumed[start..end].iter().any(|&c| c) {
                    continue;
                }
                if keyword.ascii && !on_word_boundary(&lowered, start, end) {
                    continue;
                }
                consumed[start..end].iter_mut().for_each(|c| *c = true);
                evidence.record(keyword.tag);
            }
        }

        evidence
    }
}

impl Default for CellClassifier {
    fn default() -> Self {
        Self::new(&KeywordTable::bilingual(), AmbiguityPolicy::default())
    }
}

fn sign_evidence(text: &str) -> Evidence {
    let mut evidence = Evidence::default();
    for caps in SIGNED_NUMBER.captures_iter(text) {
        match caps.get(1).map(|m| m.as_str()) {
            Some("+") | Some("＋") => evidence.positive = true,
            Some(_) => evidence.negative = true,
            None => {}
        }
    }
    evidence
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_alphanumeric())
        && !after.is_some_and(|c| c.is_ascii_alphanumeric())
}
