// 🗺️ Geo Enricher - attach one year's metrics to reference polygons
//
// Left outer join: every polygon survives. A polygon without data carries
// None metrics (rendered as a neutral fill downstream, never as zero).

use crate::derive::DerivedRecord;
use crate::error::{PipelineError, Result};
use crate::schema::normalize_region_key;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// REFERENCE POLYGONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionPolygon {
    pub name: String,
    /// Lowercased, trimmed name used as join key
    pub key: String,
    /// Geometry passed through untouched for the renderer
    pub geometry: Value,
}

impl RegionPolygon {
    pub fn new(name: impl Into<String>, geometry: Value) -> Self {
        let name = name.into();
        RegionPolygon {
            key: normalize_region_key(&name),
            name,
            geometry,
        }
    }
}

/// Externally supplied set of named region polygons
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoReference {
    pub regions: Vec<RegionPolygon>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Value,
}

impl GeoReference {
    pub fn new(regions: Vec<RegionPolygon>) -> Self {
        GeoReference { regions }
    }

    /// Parse a GeoJSON FeatureCollection, naming each polygon by `name_property`
    pub fn from_geojson_str(content: &str, name_property: &str) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(content)?;

        let regions = collection
            .features
            .into_iter()
            .enumerate()
            .map(|(i, feature)| -> Result<RegionPolygon> {
                let name = feature
                    .properties
                    .as_ref()
                    .and_then(|p| p.get(name_property))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        PipelineError::GeoJson(format!(
                            "feature #{} has no string property '{}'",
                            i, name_property
                        ))
                    })?;
                Ok(RegionPolygon::new(name, feature.geometry))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GeoReference { regions })
    }

    pub fn from_geojson_file(path: &Path, name_property: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let reference = Self::from_geojson_str(&content, name_property)?;
        info!(path = %path.display(), polygons = reference.regions.len(), "loaded geo reference");
        Ok(reference)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

// ============================================================================
// JOIN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJoinedRow {
    pub region_key: String,
    pub polygon_name: String,
    pub geometry: Value,
    pub matched: bool,
    pub total_amount: Option<f64>,
    pub recipient_count: Option<u64>,
    #[serde(rename = "per_recipient_metric")]
    pub per_recipient: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJoin {
    pub year: i32,
    pub rows: Vec<GeoJoinedRow>,
    /// Data regions of the year that no polygon matched
    pub unmatched_regions: Vec<String>,
}

impl GeoJoin {
    pub fn matched_count(&self) -> usize {
        self.rows.iter().filter(|r| r.matched).count()
    }
}

/// Left-join `year`'s rows onto every polygon of `reference`.
///
/// With no reference this reports `CapabilityUnavailable`; callers drop the
/// geo output and carry on. If a region appears twice in the year, the first
/// row wins.
pub fn enrich(
    rows: &[DerivedRecord],
    year: i32,
    reference: Option<&GeoReference>,
) -> Result<GeoJoin> {
    let reference = reference.ok_or_else(|| {
        PipelineError::CapabilityUnavailable("no geographic reference dataset supplied".to_string())
    })?;

    let mut by_key: HashMap<String, &DerivedRecord> = HashMap::new();
    let mut data_order: Vec<(String, &str)> = Vec::new();
    for row in rows.iter().filter(|r| r.year() == year) {
        let key = row.record.region_key();
        if by_key.contains_key(&key) {
            warn!(year, region = row.region_name(), "duplicate region in geo join, keeping first row");
            continue;
        }
        data_order.push((key.clone(), row.region_name()));
        by_key.insert(key, row);
    }

    let joined: Vec<GeoJoinedRow> = reference
        .regions
        .iter()
        .map(|polygon| {
            let hit = by_key.get(&polygon.key);
            GeoJoinedRow {
                region_key: polygon.key.clone(),
                polygon_name: polygon.name.clone(),
                geometry: polygon.geometry.clone(),
                matched: hit.is_some(),
                total_amount: hit.map(|r| r.total_amount()),
                recipient_count: hit.and_then(|r| r.record.recipient_count),
                per_recipient: hit.and_then(|r| r.per_recipient),
            }
        })
        .collect();

    let polygon_keys: HashSet<&str> =
        reference.regions.iter().map(|p| p.key.as_str()).collect();
    let unmatched_regions: Vec<String> = data_order
        .into_iter()
        .filter(|(key, _)| !polygon_keys.contains(key.as_str()))
        .map(|(_, name)| name.to_string())
        .collect();

    if !unmatched_regions.is_empty() {
        warn!(
            year,
            regions = ?unmatched_regions,
            "data regions without a reference polygon"
        );
    }

    let join = GeoJoin {
        year,
        rows: joined,
        unmatched_regions,
    };
    info!(
        year,
        polygons = join.rows.len(),
        matched = join.matched_count(),
        "geo join complete"
    );

    Ok(join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::derive_metrics;
    use crate::schema::RegionalRecord;
    use serde_json::json;

    fn square() -> Value {
        json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]})
    }

    fn derived() -> Vec<DerivedRecord> {
        derive_metrics(&[
            RegionalRecord::new(2023, "Texas", 100.0, Some(10)),
            RegionalRecord::new(2023, "Ohio", 50.0, Some(0)),
            RegionalRecord::new(2023, "Atlantis", 5.0, Some(1)),
            RegionalRecord::new(2024, "Maine", 7.0, Some(7)),
        ])
    }

    #[test]
    fn test_every_polygon_retained() {
        let reference = GeoReference::new(vec![
            RegionPolygon::new("TEXAS", square()),
            RegionPolygon::new("Ohio", square()),
            RegionPolygon::new("Maine", square()),
        ]);
        let join = enrich(&derived(), 2023, Some(&reference)).unwrap();

        assert_eq!(join.rows.len(), 3);
        assert_eq!(join.matched_count(), 2);

        let texas = &join.rows[0];
        assert!(texas.matched);
        assert_eq!(texas.region_key, "texas");
        assert_eq!(texas.polygon_name, "TEXAS");
        assert_eq!(texas.per_recipient, Some(10.0));

        // data row present but metric undefined
        let ohio = &join.rows[1];
        assert!(ohio.matched);
        assert_eq!(ohio.total_amount, Some(50.0));
        assert_eq!(ohio.per_recipient, None);
    }

    #[test]
    fn test_polygon_without_data_is_none_not_zero() {
        let reference = GeoReference::new(vec![RegionPolygon::new("Maine", square())]);
        let join = enrich(&derived(), 2023, Some(&reference)).unwrap();

        let maine = &join.rows[0];
        assert!(!maine.matched);
        assert_eq!(maine.per_recipient, None);
        assert_eq!(maine.total_amount, None);
        assert_eq!(maine.recipient_count, None);
        assert_eq!(maine.geometry, square());
    }

    #[test]
    fn test_unmatched_data_regions_reported() {
        let reference = GeoReference::new(vec![
            RegionPolygon::new("Texas", square()),
            RegionPolygon::new("Ohio", square()),
        ]);
        let join = enrich(&derived(), 2023, Some(&reference)).unwrap();
        assert_eq!(join.unmatched_regions, vec!["Atlantis".to_string()]);
    }

    #[test]
    fn test_missing_reference_is_capability_unavailable() {
        let err = enrich(&derived(), 2023, None).unwrap_err();
        assert!(matches!(err, PipelineError::CapabilityUnavailable(_)));
        assert!(err.is_soft());
    }

    #[test]
    fn test_parse_geojson() {
        let content = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "Texas", "density": 98.1},
                 "geometry": {"type": "Polygon", "coordinates": []}},
                {"type": "Feature", "properties": {"name": " New York "},
                 "geometry": null}
            ]
        }"#;
        let reference = GeoReference::from_geojson_str(content, "name").unwrap();

        assert_eq!(reference.len(), 2);
        assert_eq!(reference.regions[0].key, "texas");
        assert_eq!(reference.regions[1].key, "new york");
        assert!(reference.regions[1].geometry.is_null());
    }

    #[test]
    fn test_parse_geojson_custom_name_property() {
        let content = r#"{"features": [{"properties": {"NAME": "Utah"}, "geometry": null}]}"#;
        assert!(GeoReference::from_geojson_str(content, "name").is_err());

        let reference = GeoReference::from_geojson_str(content, "NAME").unwrap();
        assert_eq!(reference.regions[0].name, "Utah");
    }

    #[test]
    fn test_parse_geojson_rejects_non_collection() {
        let result = GeoReference::from_geojson_str("[1, 2, 3]", "name");
        assert!(matches!(result, Err(PipelineError::Json(_))));
    }
}
