// 🔄 Pipeline - load → combine → derive → aggregate → rank → geo join
//
// Fatal errors (schema, values, empty corpus) abort the run. A missing
// selected year or geo reference only skips the matching output section.

use crate::aggregate::{check_consistency, summarize_by_year, NationalYearSummary};
use crate::combine::{combine, Corpus};
use crate::config::PipelineConfig;
use crate::derive::{derive_metrics, DerivedRecord};
use crate::error::{PipelineError, Result};
use crate::geo::{enrich, GeoJoin, GeoReference};
use crate::loader::DatasetLoader;
use crate::provider::SourceProvider;
use crate::rank::{top_per_recipient_by_year, top_total_for_year, RankedRecord, YearRanking};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

// ============================================================================
// SECTION OUTCOME
// ============================================================================

/// An output that may be skipped without failing the run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Ready { value: T },
    Skipped { reason: String },
}

impl<T> Section<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Section::Ready { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Section::Ready { value } => Some(value),
            Section::Skipped { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Section::Ready { .. } => None,
            Section::Skipped { reason } => Some(reason),
        }
    }

    /// Turn a soft error into `Skipped`; hard errors still propagate
    fn from_result(result: Result<T>) -> Result<Self> {
        match result {
            Ok(value) => Ok(Section::Ready { value }),
            Err(e) if e.is_soft() => {
                warn!(reason = %e, "output section skipped");
                Ok(Section::Skipped {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// PIPELINE OUTPUT
// ============================================================================

/// The result tables handed to renderers and exporters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub national_summary: Vec<NationalYearSummary>,
    pub top_per_year: Vec<RankedRecord>,
    pub top_selected: Section<YearRanking>,
    pub geo_joined: Section<GeoJoin>,
}

impl PipelineOutput {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hex SHA-256 of the compact JSON form; equal inputs give equal fingerprints
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json()?.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn summary(&self) -> String {
        let years = self.national_summary.len();
        let selected = match &self.top_selected {
            Section::Ready { value } => format!("top {} for {}", value.rows.len(), value.year),
            Section::Skipped { .. } => "selected ranking skipped".to_string(),
        };
        let geo = match &self.geo_joined {
            Section::Ready { value } => format!(
                "geo {}/{} polygons matched",
                value.matched_count(),
                value.rows.len()
            ),
            Section::Skipped { .. } => "geo skipped".to_string(),
        };
        format!(
            "{} years, {} per-year ranked rows, {}, {}",
            years,
            self.top_per_year.len(),
            selected,
            geo
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
    loader: DatasetLoader,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let loader = DatasetLoader::new(config.columns.clone());
        Ok(Pipeline { config, loader })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load every source from `provider` and combine into one corpus
    #[tracing::instrument(level = "info", skip_all)]
    pub fn load_corpus(&self, provider: &dyn SourceProvider) -> Result<Corpus> {
        let sources = provider.sources()?;
        let batches = self.loader.load_all(&sources, self.config.parallel_load)?;
        let corpus = combine(batches);

        for dup in corpus.duplicate_keys() {
            warn!(
                year = dup.year,
                region = %dup.region_key,
                occurrences = dup.occurrences,
                "region appears more than once in a year"
            );
        }

        info!(rows = corpus.len(), years = ?corpus.years(), "corpus combined");
        Ok(corpus)
    }

    /// Full run: provider in, result tables out
    pub fn run(
        &self,
        provider: &dyn SourceProvider,
        geo: Option<&GeoReference>,
    ) -> Result<PipelineOutput> {
        let corpus = self.load_corpus(provider)?;
        self.run_corpus(&corpus, geo)
    }

    /// Everything after loading. Pure apart from logging.
    #[tracing::instrument(level = "info", skip_all, fields(rows = corpus.len()))]
    pub fn run_corpus(&self, corpus: &Corpus, geo: Option<&GeoReference>) -> Result<PipelineOutput> {
        let derived: Vec<DerivedRecord> = derive_metrics(corpus.records());

        let national_summary = summarize_by_year(&derived)?;
        for issue in check_consistency(&national_summary, self.config.consistency_tolerance) {
            warn!(
                year = issue.year,
                difference = issue.difference,
                "national metric does not reproduce the year total"
            );
        }

        let top_per_year = top_per_recipient_by_year(&derived, self.config.per_year_top_k);

        let selected_year = self.selected_year(corpus)?;
        let top_selected = Section::from_result(top_total_for_year(
            &derived,
            selected_year,
            self.config.selected_top_k,
        ))?;
        // No data for the year means no map, not a map of empty polygons
        let geo_result = if corpus.contains_year(selected_year) {
            enrich(&derived, selected_year, geo)
        } else {
            Err(PipelineError::Selection {
                year: selected_year,
            })
        };
        let geo_joined = Section::from_result(geo_result)?;

        let output = PipelineOutput {
            national_summary,
            top_per_year,
            top_selected,
            geo_joined,
        };
        info!(selected_year, "{}", output.summary());
        Ok(output)
    }

    /// Configured year, else the latest year present
    fn selected_year(&self, corpus: &Corpus) -> Result<i32> {
        match self.config.selected_year {
            Some(year) => Ok(year),
            None => corpus.latest_year().ok_or(PipelineError::Aggregation),
        }
    }
}
