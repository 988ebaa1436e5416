// 🔗 Corpus Combiner - per-source batches → one longitudinal table
// Pure concatenation. Duplicates are reported, never removed.

use crate::loader::SourceBatch;
use crate::schema::RegionalRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Corpus {
    records: Vec<RegionalRecord>,
}

/// A (year, region) pair seen more than once in the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKey {
    pub year: i32,
    pub region_key: String,
    pub occurrences: usize,
}

/// Concatenate batches in the order given, keeping intra-source order
pub fn combine(batches: Vec<SourceBatch>) -> Corpus {
    let total: usize = batches.iter().map(|b| b.records.len()).sum();
    let mut records = Vec::with_capacity(total);
    for batch in batches {
        records.extend(batch.records);
    }
    Corpus { records }
}

impl Corpus {
    pub fn from_records(records: Vec<RegionalRecord>) -> Self {
        Corpus { records }
    }

    pub fn records(&self) -> &[RegionalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct years, ascending
    pub fn years(&self) -> Vec<i32> {
        self.records
            .iter()
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.records.iter().map(|r| r.year).max()
    }

    pub fn contains_year(&self, year: i32) -> bool {
        self.records.iter().any(|r| r.year == year)
    }

    /// (year, region) pairs occurring more than once, ordered by year then key
    pub fn duplicate_keys(&self) -> Vec<DuplicateKey> {
        let mut counts: BTreeMap<(i32, String), usize> = BTreeMap::new();
        for record in &self.records {
            *counts.entry((record.year, record.region_key())).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|((year, region_key), occurrences)| DuplicateKey {
                year,
                region_key,
                occurrences,
            })
            .collect()
    }
}
