// ➗ Metric Deriver - per-recipient amount for every row
// Row-wise map step; grouping happens later in aggregate/rank.

use crate::schema::RegionalRecord;
use serde::Serialize;

/// Regional record plus its per-recipient metric.
///
/// `per_recipient` is `None` when the recipient count is missing or zero.
/// It is never infinity and never a stand-in zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRecord {
    #[serde(flatten)]
    pub record: RegionalRecord,
    #[serde(rename = "per_recipient_metric")]
    pub per_recipient: Option<f64>,
}

impl DerivedRecord {
    pub fn from_record(record: RegionalRecord) -> Self {
        let per_recipient = per_recipient_metric(&record);
        DerivedRecord {
            record,
            per_recipient,
        }
    }

    pub fn year(&self) -> i32 {
        self.record.year
    }

    pub fn region_name(&self) -> &str {
        &self.record.region_name
    }

    pub fn total_amount(&self) -> f64 {
        self.record.total_amount
    }

    pub fn has_metric(&self) -> bool {
        self.per_recipient.is_some()
    }
}

pub fn per_recipient_metric(record: &RegionalRecord) -> Option<f64> {
    record
        .divisor()
        .map(|count| record.total_amount / count as f64)
}

/// Derive metrics for a whole corpus, preserving row order
pub fn derive_metrics(records: &[RegionalRecord]) -> Vec<DerivedRecord> {
    records
        .iter()
        .cloned()
        .map(DerivedRecord::from_record)
        .collect()
}
