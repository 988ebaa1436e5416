// Disclosure Rollup - Core Library
// Yearly regional extracts → national summaries and per-year rankings

pub mod error;
pub mod config;
pub mod logging;
pub mod schema;     // Row Schema
pub mod loader;     // Dataset Loader
pub mod provider;   // (year, source) providers
pub mod combine;    // Corpus Combiner
pub mod derive;     // Metric Deriver
pub mod aggregate;  // National Aggregator
pub mod rank;       // Ranker
pub mod geo;        // Geo Enricher
pub mod pipeline;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use config::{ColumnAliases, PipelineConfig};
pub use schema::{coerce_year, RegionalRecord, YearLabel};
pub use loader::{DatasetLoader, SourceBatch, SourceData, YearlySource};
pub use provider::{DirectoryProvider, SourceProvider, StaticProvider};
pub use combine::{combine, Corpus, DuplicateKey};
pub use derive::{derive_metrics, DerivedRecord};
pub use aggregate::{check_consistency, summarize_by_year, ConsistencyIssue, NationalYearSummary};
pub use rank::{top_per_recipient_by_year, top_total_for_year, RankedRecord, YearRanking};
pub use geo::{enrich, GeoJoin, GeoJoinedRow, GeoReference, RegionPolygon};
pub use pipeline::{Pipeline, PipelineOutput, Section};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
