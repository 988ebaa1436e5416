// ⚙️ Pipeline configuration
// Defaults mirror the published outputs (top 5 per year, top 10 for one year).

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// COLUMN ALIASES
// ============================================================================

/// Accepted header names for each canonical column.
///
/// Matching is case-insensitive and ignores surrounding whitespace, so
/// `"Total_Amount "` matches the alias `"total_amount"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub region_name: Vec<String>,
    pub total_amount: Vec<String>,
    pub recipient_count: Vec<String>,
    pub region_code: Vec<String>,
    pub year: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        ColumnAliases {
            region_name: strings(&["region_name", "state", "region", "recipient_state"]),
            total_amount: strings(&[
                "total_amount",
                "total_amount_of_payment_usdollars",
                "total",
                "amount",
            ]),
            recipient_count: strings(&[
                "recipient_count",
                "number_of_recipients",
                "recipients",
                "count",
            ]),
            region_code: strings(&["region_code", "state_code", "abbreviation"]),
            year: strings(&["year", "program_year"]),
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows kept per year in the per-recipient ranking
    pub per_year_top_k: usize,

    /// Rows kept in the raw-total ranking of the selected year
    pub selected_top_k: usize,

    /// Year for the raw-total ranking and geo join (None = latest year in the corpus)
    pub selected_year: Option<i32>,

    /// Parse sources on worker threads (only with the `parallel` feature)
    pub parallel_load: bool,

    /// GeoJSON feature property holding the region name
    pub geo_name_property: String,

    /// Relative tolerance for the national aggregate consistency check
    pub consistency_tolerance: f64,

    pub columns: ColumnAliases,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            per_year_top_k: 5,
            selected_top_k: 10,
            selected_year: None,
            parallel_load: true,
            geo_name_property: "name".to_string(),
            consistency_tolerance: 1e-6,
            columns: ColumnAliases::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.per_year_top_k == 0 {
            return Err(PipelineError::Config(
                "per_year_top_k must be at least 1".to_string(),
            ));
        }
        if self.selected_top_k == 0 {
            return Err(PipelineError::Config(
                "selected_top_k must be at least 1".to_string(),
            ));
        }
        if self.consistency_tolerance.is_nan() || self.consistency_tolerance < 0.0 {
            return Err(PipelineError::Config(format!(
                "consistency_tolerance must be non-negative, got {}",
                self.consistency_tolerance
            )));
        }

        let columns = [
            ("region_name", &self.columns.region_name),
            ("total_amount", &self.columns.total_amount),
            ("recipient_count", &self.columns.recipient_count),
        ];
        for (name, aliases) in columns {
            if aliases.is_empty() {
                return Err(PipelineError::Config(format!(
                    "no header aliases configured for required column '{}'",
                    name
                )));
            }
        }

        Ok(())
    }
}
