use crate::document::{RenderDiagnostic, StructuredSection};
use crate::error::{ReportFormatError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum SectionKey {
    FundamentalAnalysis,
    BusinessSegments,
    GrowthCatalysts,
    ValuationAnalysis,
    /// Optional commentary; rendered when present, never required.
    AiInsights,
}

impl SectionKey {
    pub const REQUIRED: [SectionKey; 4] = [
        SectionKey::FundamentalAnalysis,
        SectionKey::BusinessSegments,
        SectionKey::GrowthCatalysts,
        SectionKey::ValuationAnalysis,
    ];

    pub const ALL: [SectionKey; 5] = [
        SectionKey::FundamentalAnalysis,
        SectionKey::BusinessSegments,
        SectionKey::GrowthCatalysts,
        SectionKey::ValuationAnalysis,
        SectionKey::AiInsights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::FundamentalAnalysis => "fundamentalAnalysis",
            SectionKey::BusinessSegments => "businessSegments",
            SectionKey::GrowthCatalysts => "growthCatalysts",
            SectionKey::ValuationAnalysis => "valuationAnalysis",
            SectionKey::AiInsights => "aiInsights",
        }
    }

    pub fn is_required(&self) -> bool {
        !matches!(self, SectionKey::AiInsights)
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The section texts of one LLM response, before any formatting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(
        description = "Fundamental analysis: financial metrics, profitability and peer comparison. Markdown with pipe tables, ending with a data-source line."
    )]
    pub fundamental_analysis: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(
        description = "Business segments: revenue structure, segment performance, regional split. Markdown with pipe tables, ending with a data-source line."
    )]
    pub business_segments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(
        description = "Growth catalysts: drivers, product pipeline, market opportunities. Markdown with pipe tables, ending with a data-source line."
    )]
    pub growth_catalysts: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(
        description = "Valuation analysis: DCF, comparable companies, intrinsic value summary. Markdown with pipe tables, ending with a data-source line."
    )]
    pub valuation_analysis: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Optional free-form commentary.")]
    pub ai_insights: Option<String>,
}

impl RawReport {
    pub fn section(&self, key: SectionKey) -> Option<&str> {
        match key {
            SectionKey::FundamentalAnalysis => self.fundamental_analysis.as_deref(),
            SectionKey::BusinessSegments => self.business_segments.as_deref(),
            SectionKey::GrowthCatalysts => self.growth_catalysts.as_deref(),
            SectionKey::ValuationAnalysis => self.valuation_analysis.as_deref(),
            SectionKey::AiInsights => self.ai_insights.as_deref(),
        }
    }

    pub fn set_section(&mut self, key: SectionKey, text: impl Into<String>) {
        let slot = match key {
            SectionKey::FundamentalAnalysis => &mut self.fundamental_analysis,
            SectionKey::BusinessSegments => &mut self.business_segments,
            SectionKey::GrowthCatalysts => &mut self.growth_catalysts,
            SectionKey::ValuationAnalysis => &mut self.valuation_analysis,
            SectionKey::AiInsights => &mut self.ai_insights,
        };
        *slot = Some(text.into());
    }

    #[must_use]
    pub fn with_section(mut self, key: SectionKey, text: impl Into<String>) -> Self {
        self.set_section(key, text);
        self
    }

    /// Present sections in [`SectionKey::ALL`] order.
    pub fn sections(&self) -> impl Iterator<Item = (SectionKey, &str)> {
        SectionKey::ALL
            .into_iter()
            .filter_map(move |key| self.section(key).map(|text| (key, text)))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(&value)
    }

    /// Reads the known section keys out of an untrusted JSON value.
    ///
    /// `null` counts as absent; any other non-string value is a contract violation.
    /// Unknown keys are ignored.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ReportFormatError::SectionTypeMismatch {
                section: "<report>".to_string(),
                found: json_type_name(value).to_string(),
            })?;

        let mut report = RawReport::default();
        for key in SectionKey::ALL {
            match object.get(key.as_str()) {
                None | Some(Value::Null) => {}
                Some(Value::String(text)) => report.set_section(key, text.clone()),
                Some(other) => {
                    return Err(ReportFormatError::SectionTypeMismatch {
                        section: key.to_string(),
                        found: json_type_name(other).to_string(),
                    })
                }
            }
        }

        Ok(report)
    }

    /// JSON schema for structured LLM output, flattened for providers that reject
    /// `$ref`, `$schema` and `definitions`.
    pub fn response_schema() -> serde_json::Result<Value> {
        let root = schemars::schema_for!(RawReport);
        clean_schema(serde_json::to_value(root)?)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn clean_schema(mut root: Value) -> serde_json::Result<Value> {
    let definitions = root
        .as_object_mut()
        .and_then(|object| object.remove("definitions"))
        .and_then(|defs| match defs {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    if let Some(object) = root.as_object_mut() {
        object.remove("$schema");
    }

    Ok(inline_schema(root, &definitions))
}

fn inline_schema(value: Value, definitions: &Map<String, Value>) -> Value {
    match value {
        Value::Object(mut object) => {
            if let Some(Value::String(reference)) = object.get("$ref") {
                let name = reference.trim_start_matches("#/definitions/");
                if let Some(definition) = definitions.get(name) {
                    return inline_schema(definition.clone(), definitions);
                }
            }

            // ["string", "null"] becomes "string" + nullable.
            if let Some(Value::Array(types)) = object.get("type") {
                let non_null: Vec<Value> = types
                    .iter()
                    .filter(|t| t.as_str() != Some("null"))
                    .cloned()
                    .collect();
                if non_null.len() == 1 && types.len() == 2 {
                    object.insert("type".to_string(), non_null[0].clone());
                    object.insert("nullable".to_string(), Value::Bool(true));
                }
            }

            Value::Object(
                object
                    .into_iter()
                    .map(|(k, v)| (k, inline_schema(v, definitions)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| inline_schema(v, definitions))
                .collect(),
        ),
        other => other,
    }
}

/// Whatever sections rendered, keyed by section. Input to the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedReport {
    pub sections: BTreeMap<SectionKey, StructuredSection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub diagnostics: BTreeMap<SectionKey, Vec<RenderDiagnostic>>,
}

impl RenderedReport {
    pub fn section(&self, key: SectionKey) -> Option<&StructuredSection> {
        self.sections.get(&key)
    }

    pub fn insert(&mut self, key: SectionKey, section: StructuredSection) {
        self.sections.insert(key, section);
    }

    pub fn missing_required(&self) -> Vec<SectionKey> {
        SectionKey::REQUIRED
            .into_iter()
            .filter(|key| !self.sections.contains_key(key))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A complete report: all four required sections rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub fundamental_analysis: StructuredSection,
    pub business_segments: StructuredSection,
    pub growth_catalysts: StructuredSection,
    pub valuation_analysis: StructuredSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<StructuredSection>,
}

impl ReportDocument {
    pub fn section(&self, key: SectionKey) -> Option<&StructuredSection> {
        match key {
            SectionKey::FundamentalAnalysis => Some(&self.fundamental_analysis),
            SectionKey::BusinessSegments => Some(&self.business_segments),
            SectionKey::GrowthCatalysts => Some(&self.growth_catalysts),
            SectionKey::ValuationAnalysis => Some(&self.valuation_analysis),
            SectionKey::AiInsights => self.ai_insights.as_ref(),
        }
    }
}

impl TryFrom<RenderedReport> for ReportDocument {
    type Error = ReportFormatError;

    fn try_from(report: RenderedReport) -> Result<Self> {
        let mut sections = report.sections;
        let ai_insights = sections.remove(&SectionKey::AiInsights);
        let mut take = |key: SectionKey| {
            sections
                .remove(&key)
                .ok_or_else(|| ReportFormatError::MissingSection(key.to_string()))
        };

        Ok(Self {
            fundamental_analysis: take(SectionKey::FundamentalAnalysis)?,
            business_segments: take(SectionKey::BusinessSegments)?,
            growth_catalysts: take(SectionKey::GrowthCatalysts)?,
            valuation_analysis: take(SectionKey::ValuationAnalysis)?,
            ai_insights,
        })
    }
}
