// ⚖️ National Aggregator - year-level totals
//
// national_per_recipient = total_amount_sum / recipient_count_sum
//
// The metric is a ratio of sums (a recipient-weighted average), NOT the mean
// of the per-region metrics. The two differ whenever regions have different
// recipient counts.

use crate::derive::DerivedRecord;
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ============================================================================
// NATIONAL YEAR SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NationalYearSummary {
    pub year: i32,
    pub total_amount_sum: f64,
    pub recipient_count_sum: f64,
    /// None when no row of the year has a usable recipient count
    #[serde(rename = "national_per_recipient_metric")]
    pub national_per_recipient: Option<f64>,
    pub region_count: usize,
    pub regions_missing_recipients: usize,
}

impl NationalYearSummary {
    pub fn summary(&self) -> String {
        let metric = match self.national_per_recipient {
            Some(m) => format!("{:.2}", m),
            None => "n/a".to_string(),
        };
        format!(
            "{}: {} regions, total {:.2}, recipients {:.0}, per recipient {}",
            self.year, self.region_count, self.total_amount_sum, self.recipient_count_sum, metric
        )
    }
}

#[derive(Default)]
struct YearAccumulator {
    total_amount_sum: f64,
    recipient_count_sum: f64,
    region_count: usize,
    regions_missing_recipients: usize,
}

impl YearAccumulator {
    fn add(&mut self, row: &DerivedRecord) {
        self.total_amount_sum += row.record.total_amount;
        self.region_count += 1;

        match row.record.recipient_count {
            Some(count) => self.recipient_count_sum += count as f64,
            None => self.regions_missing_recipients += 1,
        }
    }

    fn finish(self, year: i32) -> NationalYearSummary {
        let national_per_recipient = if self.recipient_count_sum > 0.0 {
            Some(self.total_amount_sum / self.recipient_count_sum)
        } else {
            None
        };

        NationalYearSummary {
            year,
            total_amount_sum: self.total_amount_sum,
            recipient_count_sum: self.recipient_count_sum,
            national_per_recipient,
            region_count: self.region_count,
            regions_missing_recipients: self.regions_missing_recipients,
        }
    }
}

/// Group derived rows by year and reduce to one summary per year, ascending.
///
/// Rows with an undefined per-recipient metric still add their total. Missing
/// recipient counts are left out of the count sum rather than read as zero.
pub fn summarize_by_year(rows: &[DerivedRecord]) -> Result<Vec<NationalYearSummary>> {
    if rows.is_empty() {
        return Err(PipelineError::Aggregation);
    }

    let mut by_year: BTreeMap<i32, YearAccumulator> = BTreeMap::new();
    for row in rows {
        by_year.entry(row.year()).or_default().add(row);
    }

    let summaries: Vec<NationalYearSummary> = by_year
        .into_iter()
        .map(|(year, acc)| acc.finish(year))
        .collect();

    for s in &summaries {
        if s.national_per_recipient.is_none() {
            warn!(year = s.year, "no recipient counts for year, national metric undefined");
        }
        debug!("{}", s.summary());
    }

    Ok(summaries)
}

// ============================================================================
// CONSISTENCY CHECK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyIssue {
    pub year: i32,
    pub expected_total: f64,
    pub reconstructed_total: f64,
    pub difference: f64,
}

/// Verify metric × count_sum ≈ total_sum for every year with a defined metric.
///
/// `tolerance` is relative to the year's total (absolute when the total is 0).
pub fn check_consistency(
    summaries: &[NationalYearSummary],
    tolerance: f64,
) -> Vec<ConsistencyIssue> {
    summaries
        .iter()
        .filter_map(|s| {
            let metric = s.national_per_recipient?;
            let reconstructed = metric * s.recipient_count_sum;
            let difference = (reconstructed - s.total_amount_sum).abs();
            let allowed = tolerance * s.total_amount_sum.abs().max(1.0);

            (difference > allowed).then(|| ConsistencyIssue {
                year: s.year,
                expected_total: s.total_amount_sum,
                reconstructed_total: reconstructed,
                difference,
            })
        })
        .collect()
}
