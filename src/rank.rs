// 🏆 Ranker - top-K tables
// Descending by key; ties keep corpus order (Vec::sort_by is stable).

use crate::derive::DerivedRecord;
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRecord {
    /// 1-based position within its group
    pub rank: usize,
    #[serde(flatten)]
    pub row: DerivedRecord,
}

/// Raw-total ranking of one selected year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRanking {
    pub year: i32,
    pub rows: Vec<RankedRecord>,
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

fn take_ranked(sorted: Vec<&DerivedRecord>, k: usize) -> impl Iterator<Item = RankedRecord> + '_ {
    sorted
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, row)| RankedRecord {
            rank: i + 1,
            row: row.clone(),
        })
}

/// Per-recipient top-K for every year, years ascending.
///
/// Rows with an undefined metric are excluded. A year with fewer than `k`
/// eligible rows yields what it has; a year with none yields nothing.
pub fn top_per_recipient_by_year(rows: &[DerivedRecord], k: usize) -> Vec<RankedRecord> {
    let mut by_year: BTreeMap<i32, Vec<(&DerivedRecord, f64)>> = BTreeMap::new();
    for row in rows {
        if let Some(metric) = row.per_recipient {
            by_year.entry(row.year()).or_default().push((row, metric));
        }
    }

    let mut ranked = Vec::new();
    for (_, mut group) in by_year {
        group.sort_by(|a, b| descending(a.1, b.1));
        let sorted: Vec<&DerivedRecord> = group.into_iter().map(|(row, _)| row).collect();
        ranked.extend(take_ranked(sorted, k));
    }
    ranked
}

/// Raw-total top-K for one year. Rows without a metric still take part.
pub fn top_total_for_year(rows: &[DerivedRecord], year: i32, k: usize) -> Result<YearRanking> {
    let mut group: Vec<&DerivedRecord> = rows.iter().filter(|r| r.year() == year).collect();
    if group.is_empty() {
        return Err(PipelineError::Selection { year });
    }

    group.sort_by(|a, b| descending(a.total_amount(), b.total_amount()));

    Ok(YearRanking {
        year,
        rows: take_ranked(group, k).collect(),
    })
}
