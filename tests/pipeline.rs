use disclosure_rollup::{
    DirectoryProvider, GeoReference, Pipeline, PipelineConfig, PipelineError, RegionPolygon,
    StaticProvider, YearlySource,
};
use serde_json::{json, Value};
use std::fs;
use tempfile::tempdir;

const HEADER: &str = "region_name,total_amount,recipient_count\n";

fn csv(rows: &str) -> String {
    format!("{}{}", HEADER, rows)
}

fn scenario() -> StaticProvider {
    StaticProvider::new(vec![
        YearlySource::inline("2023", "2023.csv", csv("A,100,10\nB,50,0\n")),
        YearlySource::inline(2024, "2024.csv", csv("A,200,20\n")),
    ])
}

/// Five years of fifteen regions, some with missing or zero counts
fn wide_provider() -> StaticProvider {
    let mut sources = Vec::new();
    for year in 2019..=2023 {
        let mut rows = String::new();
        for i in 0..15u32 {
            let total = ((i * 7919 + year as u32 * 31) % 1000) as f64 + 0.25;
            let count = match (i + year as u32) % 6 {
                0 => String::new(),
                1 => "0".to_string(),
                n => (n * (i + 1)).to_string(),
            };
            rows.push_str(&format!("Region {},{},{}\n", i, total, count));
        }
        sources.push(YearlySource::inline(year, format!("{}.csv", year), csv(&rows)));
    }
    StaticProvider::new(sources)
}

fn run(provider: &StaticProvider, config: PipelineConfig) -> disclosure_rollup::PipelineOutput {
    Pipeline::new(config).unwrap().run(provider, None).unwrap()
}

// ============================================================================
// Worked scenario
// ============================================================================

#[test]
fn test_two_year_scenario_end_to_end() {
    let config = PipelineConfig {
        per_year_top_k: 1,
        selected_top_k: 1,
        selected_year: Some(2023),
        ..PipelineConfig::default()
    };
    let output = run(&scenario(), config);

    let summary: Vec<(i32, f64, f64, Option<f64>)> = output
        .national_summary
        .iter()
        .map(|s| {
            (
                s.year,
                s.total_amount_sum,
                s.recipient_count_sum,
                s.national_per_recipient,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (2023, 150.0, 10.0, Some(15.0)),
            (2024, 200.0, 20.0, Some(10.0)),
        ]
    );

    let top_2023: Vec<_> = output
        .top_per_year
        .iter()
        .filter(|r| r.row.year() == 2023)
        .collect();
    assert_eq!(top_2023.len(), 1);
    assert_eq!(top_2023[0].row.region_name(), "A");
    assert_eq!(top_2023[0].row.per_recipient, Some(10.0));

    let selected = output.top_selected.value().unwrap();
    assert_eq!(selected.rows.len(), 1);
    assert_eq!(selected.rows[0].row.region_name(), "A");
    assert_eq!(selected.rows[0].row.total_amount(), 100.0);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_one_summary_per_year_strictly_ascending() {
    let output = run(&wide_provider(), PipelineConfig::default());
    let years: Vec<i32> = output.national_summary.iter().map(|s| s.year).collect();
    assert_eq!(years, vec![2019, 2020, 2021, 2022, 2023]);
    assert!(years.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_national_metric_reproduces_total() {
    let output = run(&wide_provider(), PipelineConfig::default());
    for s in &output.national_summary {
        if s.recipient_count_sum > 0.0 {
            let metric = s.national_per_recipient.unwrap();
            let reconstructed = metric * s.recipient_count_sum;
            assert!((reconstructed - s.total_amount_sum).abs() <= 1e-9 * s.total_amount_sum.max(1.0));
        } else {
            assert_eq!(s.national_per_recipient, None);
        }
    }
}

#[test]
fn test_zero_count_rows_only_in_total_outputs() {
    let provider = StaticProvider::new(vec![YearlySource::inline(
        2023,
        "2023.csv",
        csv("Big,9000,0\nSmall,10,2\n"),
    )]);
    let output = run(&provider, PipelineConfig::default());

    assert!(output
        .top_per_year
        .iter()
        .all(|r| r.row.region_name() != "Big"));
    assert_eq!(output.national_summary[0].total_amount_sum, 9010.0);

    let selected = output.top_selected.value().unwrap();
    assert_eq!(selected.rows[0].row.region_name(), "Big");
}

#[test]
fn test_per_year_ranking_at_most_five_non_increasing() {
    let output = run(&wide_provider(), PipelineConfig::default());
    for year in 2019..=2023 {
        let group: Vec<_> = output
            .top_per_year
            .iter()
            .filter(|r| r.row.year() == year)
            .collect();
        assert!(group.len() <= 5);
        assert!(group.iter().all(|r| r.row.per_recipient.is_some()));
        for pair in group.windows(2) {
            assert!(pair[0].row.per_recipient.unwrap() >= pair[1].row.per_recipient.unwrap());
        }
    }
}

#[test]
fn test_idempotent_output() {
    let geo = GeoReference::new(vec![
        RegionPolygon::new("Region 1", json!({"type": "Point", "coordinates": [0, 0]})),
        RegionPolygon::new("Region 99", Value::Null),
    ]);
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();

    let first = pipeline.run(&wide_provider(), Some(&geo)).unwrap();
    let second = pipeline.run(&wide_provider(), Some(&geo)).unwrap();

    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
}

#[test]
fn test_parallel_and_sequential_loads_agree() {
    let parallel = run(&wide_provider(), PipelineConfig::default());
    let sequential = run(
        &wide_provider(),
        PipelineConfig {
            parallel_load: false,
            ..PipelineConfig::default()
        },
    );
    assert_eq!(parallel, sequential);
}

#[test]
fn test_absent_selected_year_leaves_other_outputs() {
    let config = PipelineConfig {
        selected_year: Some(2030),
        ..PipelineConfig::default()
    };
    let output = run(&scenario(), config);

    assert!(output
        .top_selected
        .skip_reason()
        .unwrap()
        .contains("selection error"));
    assert_eq!(output.national_summary.len(), 2);
    assert_eq!(output.top_per_year.len(), 2);
}

#[test]
fn test_output_field_names() {
    let output = run(&scenario(), PipelineConfig::default());
    let json: Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();

    assert_eq!(json["national_summary"][0]["national_per_recipient_metric"], json!(15.0));
    assert_eq!(json["top_per_year"][0]["per_recipient_metric"], json!(10.0));
    assert!(json["national_summary"][0].get("national_per_recipient").is_none());
}

#[test]
fn test_zero_totals_tie_in_source_order() {
    let provider = StaticProvider::new(vec![YearlySource::inline(
        2023,
        "2023.csv",
        csv("First,-0,1\nSecond,0,1\n"),
    )]);
    let output = run(&provider, PipelineConfig::default());

    let selected = output.top_selected.value().unwrap();
    let order: Vec<&str> = selected.rows.iter().map(|r| r.row.region_name()).collect();
    assert_eq!(order, vec!["First", "Second"]);
    assert!(!output.to_json().unwrap().contains("-0.0"));
}

#[test]
fn test_oversized_count_aborts_load() {
    let provider = StaticProvider::new(vec![YearlySource::inline(
        2023,
        "2023.csv",
        csv("A,100,99999999999999999999\n"),
    )]);
    let result = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&provider, None);
    assert!(matches!(result, Err(PipelineError::Value { .. })));
}

#[test]
fn test_geo_polygon_without_data_is_null_not_zero() {
    let geo = GeoReference::new(vec![
        RegionPolygon::new("A", Value::Null),
        RegionPolygon::new("Guam", Value::Null),
    ]);
    let output = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&scenario(), Some(&geo))
        .unwrap();

    let json: Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();
    let rows = json["geo_joined"]["value"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["per_recipient_metric"], json!(10.0));
    assert!(rows[1]["per_recipient_metric"].is_null());
    assert!(rows[1]["total_amount"].is_null());
}

// ============================================================================
// File-system provider
// ============================================================================

#[test]
fn test_directory_run() -> anyhow::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("disclosures_2024.csv"), csv("A,200,20\n"))?;
    fs::write(
        dir.path().join("disclosures_2023.csv"),
        "State,Total_Amount,Number_Of_Recipients\nA,\"$100.00\",10\nB,50,NA\n",
    )?;

    let output = Pipeline::new(PipelineConfig::default())?
        .run(&DirectoryProvider::new(dir.path()), None)?;

    assert_eq!(output.national_summary.len(), 2);
    assert_eq!(output.national_summary[0].year, 2023);
    assert_eq!(output.national_summary[0].total_amount_sum, 150.0);
    assert_eq!(output.national_summary[0].regions_missing_recipients, 1);
    Ok(())
}

#[test]
fn test_directory_with_broken_schema_fails() -> anyhow::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("2023.csv"), "region_name,total_amount\nA,1\n")?;

    let result = Pipeline::new(PipelineConfig::default())?
        .run(&DirectoryProvider::new(dir.path()), None);
    assert!(matches!(result, Err(PipelineError::Schema { .. })));
    Ok(())
}
