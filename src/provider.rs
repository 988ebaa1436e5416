// Source providers - hand the pipeline its (year, source) pairs
//
// The core never looks at the file system itself. Tests use StaticProvider;
// the CLI uses DirectoryProvider.

use crate::error::{PipelineError, Result};
use crate::loader::YearlySource;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait SourceProvider {
    /// Ordered (year, source) pairs. Order is preserved through the corpus.
    fn sources(&self) -> Result<Vec<YearlySource>>;
}

/// In-memory provider, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    sources: Vec<YearlySource>,
}

impl StaticProvider {
    pub fn new(sources: Vec<YearlySource>) -> Self {
        StaticProvider { sources }
    }

    pub fn with_source(mut self, source: YearlySource) -> Self {
        self.sources.push(source);
        self
    }
}

impl SourceProvider for StaticProvider {
    fn sources(&self) -> Result<Vec<YearlySource>> {
        Ok(self.sources.clone())
    }
}

/// Every `*.csv` file in one directory whose name carries a four-digit year,
/// e.g. `payments_2023.csv`. Sources are ordered by year, then file name.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryProvider { dir: dir.into() }
    }
}

const YEAR_PATTERN: &str = r"(?:19|20)\d{2}";

fn year_in_file_name(path: &Path, pattern: &Regex) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    // last match wins: "extract_v2_2023" → 2023
    pattern
        .find_iter(stem)
        .last()
        .map(|m| m.as_str().to_string())
}

impl SourceProvider for DirectoryProvider {
    fn sources(&self) -> Result<Vec<YearlySource>> {
        let pattern = Regex::new(YEAR_PATTERN).map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut found: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !path.is_file() || !is_csv {
                continue;
            }

            match year_in_file_name(&path, &pattern) {
                Some(year) => found.push((year, path)),
                None => warn!(path = %path.display(), "no year in file name, skipping"),
            }
        }

        found.sort();
        debug!(dir = %self.dir.display(), sources = found.len(), "discovered yearly sources");

        Ok(found
            .into_iter()
            .map(|(year, path)| YearlySource::from_path(year, path))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SourceData;
    use crate::schema::YearLabel;
    use tempfile::tempdir;

    #[test]
    fn test_static_provider_keeps_order() {
        let provider = StaticProvider::default()
            .with_source(YearlySource::inline(2024, "b", ""))
            .with_source(YearlySource::inline(2023, "a", ""));
        let labels: Vec<String> = provider
            .sources()
            .unwrap()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec!["b", "a"]);
    }

    #[test]
    fn test_directory_provider_discovers_yearly_csvs() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("payments_2024.csv"), "x")?;
        fs::write(dir.path().join("payments_2022.CSV"), "x")?;
        fs::write(dir.path().join("notes_2023.txt"), "x")?;
        fs::write(dir.path().join("readme.csv"), "x")?;
        fs::create_dir(dir.path().join("archive_2021.csv"))?;

        let sources = DirectoryProvider::new(dir.path()).sources()?;

        let found: Vec<(YearLabel, String)> = sources
            .iter()
            .map(|s| (s.year.clone(), s.label.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                (YearLabel::from("2022"), "payments_2022.CSV".to_string()),
                (YearLabel::from("2024"), "payments_2024.csv".to_string()),
            ]
        );
        assert!(matches!(sources[0].data, SourceData::Path(_)));
        Ok(())
    }

    #[test]
    fn test_year_in_file_name_takes_last_match() {
        let pattern = Regex::new(YEAR_PATTERN).unwrap();
        assert_eq!(
            year_in_file_name(Path::new("extract_1999_rev_2023.csv"), &pattern),
            Some("2023".to_string())
        );
        assert_eq!(year_in_file_name(Path::new("summary.csv"), &pattern), None);
    }
}
