// 📐 Row Schema - canonical shape of one yearly-regional record
// Header resolution, year coercion and per-field value parsing live here so the
// loader only has to walk records.

use crate::config::ColumnAliases;
use crate::error::{PipelineError, Result};
use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// REGIONAL RECORD
// ============================================================================

/// One row of one yearly extract.
///
/// `recipient_count` is `None` when the source left it blank or marked it as
/// not available. `Some(0)` is kept as-is; the metric deriver treats it like
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalRecord {
    pub year: i32,
    pub region_name: String,
    pub total_amount: f64,
    pub recipient_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,

    // Provenance
    pub source_label: String,
    pub line_number: usize,
}

impl RegionalRecord {
    pub fn new(
        year: i32,
        region_name: impl Into<String>,
        total_amount: f64,
        recipient_count: Option<u64>,
    ) -> Self {
        RegionalRecord {
            year,
            region_name: region_name.into(),
            total_amount,
            recipient_count,
            region_code: None,
            source_label: String::new(),
            line_number: 0,
        }
    }

    pub fn with_region_code(mut self, code: impl Into<String>) -> Self {
        self.region_code = Some(code.into());
        self
    }

    pub fn with_provenance(mut self, source_label: impl Into<String>, line_number: usize) -> Self {
        self.source_label = source_label.into();
        self.line_number = line_number;
        self
    }

    /// Recipient count usable as a divisor (present and non-zero)
    pub fn divisor(&self) -> Option<u64> {
        self.recipient_count.filter(|&c| c > 0)
    }

    /// Join key: lowercased, trimmed region name
    pub fn region_key(&self) -> String {
        normalize_region_key(&self.region_name)
    }
}

pub fn normalize_region_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// COLUMNS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    TotalAmount,
    RecipientCount,
    RegionName,
    RegionCode,
    Year,
}

impl Column {
    pub const REQUIRED: [Column; 3] = [
        Column::TotalAmount,
        Column::RecipientCount,
        Column::RegionName,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::TotalAmount => "total_amount",
            Column::RecipientCount => "recipient_count",
            Column::RegionName => "region_name",
            Column::RegionCode => "region_code",
            Column::Year => "year",
        }
    }

    pub fn is_required(&self) -> bool {
        Column::REQUIRED.contains(self)
    }

    fn aliases<'a>(&self, aliases: &'a ColumnAliases) -> &'a [String] {
        match self {
            Column::TotalAmount => &aliases.total_amount,
            Column::RecipientCount => &aliases.recipient_count,
            Column::RegionName => &aliases.region_name,
            Column::RegionCode => &aliases.region_code,
            Column::Year => &aliases.year,
        }
    }
}

/// Column positions for one source, resolved from its header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    pub total_amount: usize,
    pub recipient_count: usize,
    pub region_name: usize,
    pub region_code: Option<usize>,
    pub year: Option<usize>,
}

impl HeaderMap {
    /// Resolve canonical columns against a header row.
    ///
    /// Fails with `PipelineError::Schema` on the first required column that
    /// has no matching header. Optional columns simply resolve to `None`.
    pub fn resolve(
        headers: &StringRecord,
        aliases: &ColumnAliases,
        source_label: &str,
    ) -> Result<HeaderMap> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();

        let find = |column: Column| -> Option<usize> {
            column.aliases(aliases).iter().find_map(|alias| {
                let alias = alias.trim().to_lowercase();
                normalized.iter().position(|h| *h == alias)
            })
        };

        let require = |column: Column| -> Result<usize> {
            find(column).ok_or_else(|| PipelineError::Schema {
                source_label: source_label.to_string(),
                column: column.name().to_string(),
            })
        };

        Ok(HeaderMap {
            total_amount: require(Column::TotalAmount)?,
            recipient_count: require(Column::RecipientCount)?,
            region_name: require(Column::RegionName)?,
            region_code: find(Column::RegionCode),
            year: find(Column::Year),
        })
    }
}

// ============================================================================
// YEAR COERCION
// ============================================================================

/// Program year as handed over by a source provider: text or a number
#[derive(Debug, Clone, PartialEq)]
pub enum YearLabel {
    Numeric(f64),
    Text(String),
}

impl YearLabel {
    pub fn resolve(&self, source_label: &str) -> Result<i32> {
        let coerced = match self {
            YearLabel::Numeric(n) => coerce_numeric_year(*n),
            YearLabel::Text(s) => coerce_year(s),
        };
        coerced.ok_or_else(|| PipelineError::Year {
            source_label: source_label.to_string(),
            raw: self.to_string(),
        })
    }
}

impl std::fmt::Display for YearLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YearLabel::Numeric(n) => write!(f, "{}", n),
            YearLabel::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for YearLabel {
    fn from(year: i32) -> Self {
        YearLabel::Numeric(year as f64)
    }
}

impl From<f64> for YearLabel {
    fn from(year: f64) -> Self {
        YearLabel::Numeric(year)
    }
}

impl From<&str> for YearLabel {
    fn from(year: &str) -> Self {
        YearLabel::Text(year.to_string())
    }
}

impl From<String> for YearLabel {
    fn from(year: String) -> Self {
        YearLabel::Text(year)
    }
}

fn coerce_numeric_year(n: f64) -> Option<i32> {
    if n.is_finite() && n.fract() == 0.0 && (1.0..=9999.0).contains(&n) {
        Some(n as i32)
    } else {
        None
    }
}

const YEAR_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Coerce a textual year into an integer.
///
/// Accepts `"2023"`, `"2023.0"`, `" 2023 "` and full dates such as
/// `"2023-06-30"` or `"06/30/2023"`.
pub fn coerce_year(raw: &str) -> Option<i32> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }

    if let Ok(year) = s.parse::<i32>() {
        return (1..=9999).contains(&year).then_some(year);
    }

    if let Ok(n) = s.parse::<f64>() {
        return coerce_numeric_year(n);
    }

    YEAR_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .map(|date| date.year())
}

// ============================================================================
// VALUE PARSING
// ============================================================================

const MISSING_MARKERS: [&str; 6] = ["", "na", "n/a", "null", "none", "-"];

fn is_missing(s: &str) -> bool {
    MISSING_MARKERS.contains(&s.to_lowercase().as_str())
}

/// Parse a non-negative decimal amount such as `1234.5` or `"$1,234.50"`
pub fn parse_amount(raw: &str) -> std::result::Result<f64, String> {
    let cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();

    if is_missing(&cleaned) {
        return Err("amount is required".to_string());
    }

    let value: f64 = cleaned
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw.trim()))?;

    if !value.is_finite() {
        return Err(format!("'{}' is not a finite number", raw.trim()));
    }
    if value < 0.0 {
        return Err(format!("amount must be non-negative, got {}", value));
    }

    // "-0" parses to -0.0, which total_cmp orders below 0.0
    Ok(if value == 0.0 { 0.0 } else { value })
}

/// Parse a recipient count. Blank and not-available markers become `None`.
pub fn parse_count(raw: &str) -> std::result::Result<Option<u64>, String> {
    let cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let cleaned = cleaned.trim();

    if is_missing(cleaned) {
        return Ok(None);
    }

    if let Ok(count) = cleaned.parse::<u64>() {
        return Ok(Some(count));
    }

    // Exports sometimes write integer columns as floats ("12.0")
    if let Some((whole, fraction)) = cleaned.split_once('.') {
        let integral = !whole.is_empty()
            && whole.bytes().all(|b| b.is_ascii_digit())
            && fraction.bytes().all(|b| b == b'0');
        if integral {
            return whole
                .parse::<u64>()
                .map(Some)
                .map_err(|_| format!("count '{}' is out of range", raw.trim()));
        }
    }

    // Exponent notation and integers beyond u64 are errors, never clamped
    match cleaned.parse::<f64>() {
        Ok(n) if n < 0.0 => Err(format!("count must be non-negative, got {}", n)),
        Ok(n) if n.is_finite() && n.fract() == 0.0 => Err(format!(
            "count '{}' must be a plain whole number within range",
            raw.trim()
        )),
        Ok(n) => Err(format!("count must be a whole number, got {}", n)),
        Err(_) => Err(format!("'{}' is not a count", raw.trim())),
    }
}
