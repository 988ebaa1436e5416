// 📂 Dataset Loader - yearly extracts → Regional Records
// Each source is parsed on its own; batches come back in input order.

use crate::config::ColumnAliases;
use crate::error::{PipelineError, Result};
use crate::schema::{coerce_year, parse_amount, parse_count, HeaderMap, RegionalRecord, YearLabel};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ============================================================================
// SOURCES
// ============================================================================

/// Where the bytes of one yearly extract come from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Path(PathBuf),
    Inline(String),
}

/// One (year, tabular source) pair handed over by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct YearlySource {
    pub year: YearLabel,
    pub label: String,
    pub data: SourceData,
}

impl YearlySource {
    pub fn from_path(year: impl Into<YearLabel>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();
        YearlySource {
            year: year.into(),
            label,
            data: SourceData::Path(path),
        }
    }

    pub fn inline(
        year: impl Into<YearLabel>,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        YearlySource {
            year: year.into(),
            label: label.into(),
            data: SourceData::Inline(content.into()),
        }
    }
}

/// All records parsed from one source, tagged with the resolved year
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    pub year: i32,
    pub source_label: String,
    pub records: Vec<RegionalRecord>,
}

impl SourceBatch {
    pub fn missing_count_rows(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.divisor().is_none())
            .count()
    }
}

// ============================================================================
// LOADER
// ============================================================================

pub struct DatasetLoader {
    columns: ColumnAliases,
}

impl DatasetLoader {
    pub fn new(columns: ColumnAliases) -> Self {
        DatasetLoader { columns }
    }

    /// Load every source. Output order matches input order, parallel or not.
    ///
    /// The first failing source aborts the whole load: downstream steps
    /// assume one consistent schema across years.
    pub fn load_all(&self, sources: &[YearlySource], parallel: bool) -> Result<Vec<SourceBatch>> {
        info!(sources = sources.len(), parallel, "loading yearly sources");

        #[cfg(feature = "parallel")]
        if parallel {
            return sources
                .par_iter()
                .map(|source| self.load_source(source))
                .collect();
        }

        #[cfg(not(feature = "parallel"))]
        if parallel {
            debug!("built without the `parallel` feature, loading sequentially");
        }

        sources
            .iter()
            .map(|source| self.load_source(source))
            .collect()
    }

    pub fn load_source(&self, source: &YearlySource) -> Result<SourceBatch> {
        let year = source.year.resolve(&source.label)?;

        match &source.data {
            SourceData::Path(path) => {
                let file = File::open(path)?;
                self.load_reader(year, &source.label, BufReader::new(file))
            }
            SourceData::Inline(content) => {
                self.load_reader(year, &source.label, Cursor::new(content.as_bytes()))
            }
        }
    }

    /// Parse one CSV stream into records tagged with `year`
    #[tracing::instrument(level = "debug", skip(self, reader), fields(source = %label))]
    pub fn load_reader<R: Read>(&self, year: i32, label: &str, reader: R) -> Result<SourceBatch> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let map = HeaderMap::resolve(&headers, &self.columns, label)?;
        debug!(?map, "resolved header columns");

        let mut records = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (idx, result) in rdr.records().enumerate() {
            let row = result?;
            // +2: 1-indexed plus the header row
            let line = row
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 2);

            let record = self.parse_row(&row, &map, year, label, line)?;

            if !seen.insert(record.region_key()) {
                // Reported once per corpus by Pipeline::load_corpus
                debug!(
                    source = label,
                    year,
                    region = %record.region_name,
                    line,
                    "duplicate region within one source, keeping both rows"
                );
            }

            records.push(record);
        }

        let batch = SourceBatch {
            year,
            source_label: label.to_string(),
            records,
        };

        info!(
            source = label,
            year,
            rows = batch.records.len(),
            missing_counts = batch.missing_count_rows(),
            "loaded source"
        );

        Ok(batch)
    }

    fn parse_row(
        &self,
        row: &StringRecord,
        map: &HeaderMap,
        year: i32,
        label: &str,
        line: usize,
    ) -> Result<RegionalRecord> {
        let value_error = |column: &str, message: String| PipelineError::Value {
            source_label: label.to_string(),
            line,
            column: column.to_string(),
            message,
        };

        let region_name = row.get(map.region_name).unwrap_or("").to_string();
        if region_name.is_empty() {
            return Err(value_error(
                "region_name",
                "region name is required".to_string(),
            ));
        }

        let total_amount = parse_amount(row.get(map.total_amount).unwrap_or(""))
            .map_err(|m| value_error("total_amount", m))?;

        let recipient_count = parse_count(row.get(map.recipient_count).unwrap_or(""))
            .map_err(|m| value_error("recipient_count", m))?;

        if let Some(raw) = map.year.and_then(|i| row.get(i)).filter(|s| !s.is_empty()) {
            match coerce_year(raw) {
                Some(row_year) if row_year == year => {}
                Some(row_year) => {
                    return Err(value_error(
                        "year",
                        format!("row year {} does not match source year {}", row_year, year),
                    ))
                }
                None => return Err(value_error("year", format!("'{}' is not a year", raw))),
            }
        }

        let mut record = RegionalRecord::new(year, region_name, total_amount, recipient_count)
            .with_provenance(label, line);

        if let Some(code) = map
            .region_code
            .and_then(|i| row.get(i))
            .filter(|s| !s.is_empty())
        {
            record = record.with_region_code(code);
        }

        Ok(record)
    }
}

impl Default for DatasetLoader {
    fn default() -> Self {
        DatasetLoader::new(ColumnAliases::default())
    }
}
