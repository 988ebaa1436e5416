// Pipeline errors
// Fatal kinds abort the run; Selection and CapabilityUnavailable only skip one output.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("schema error in {source_label}: missing required column '{column}'")]
    Schema { source_label: String, column: String },

    #[error("invalid year '{raw}' for {source_label}")]
    Year { source_label: String, raw: String },

    #[error("invalid value in {source_label} line {line}, column '{column}': {message}")]
    Value {
        source_label: String,
        line: usize,
        column: String,
        message: String,
    },

    #[error("aggregation error: corpus is empty, no years present")]
    Aggregation,

    #[error("selection error: year {year} is not present in the corpus")]
    Selection { year: i32 },

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors that degrade a single output section instead of aborting the run
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            PipelineError::Selection { .. } | PipelineError::CapabilityUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
