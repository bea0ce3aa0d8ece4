use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportFormatError {
    #[error("Invalid pass limit for {name}: {value} (must be at least 1)")]
    InvalidPassLimit { name: &'static str, value: usize },

    #[error("Invalid keyword entry: {0}")]
    InvalidKeyword(String),

    #[error("Duplicate requirement for section: {0}")]
    DuplicateRequirement(String),

    #[error("Section {section} must be a string, got {found}")]
    SectionTypeMismatch { section: String, found: String },

    #[error("Report is missing required section: {0}")]
    MissingSection(String),

    #[error("No acceptable report after {attempts} attempt(s): {last_errors}")]
    NoAcceptableReport { attempts: usize, last_errors: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportFormatError>;
