#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the watermap server.
//!
//! These types are serialized to JSON for the REST API. Cluster responses
//! are `GeoJSON` feature collections so map clients can add them as a
//! source directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, feature::Id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use watermap_cluster_models::{ClusterId, ClusterNode, ClusterSummary};
use watermap_point_models::Point;
use watermap_search_models::{ResultCategory, SearchHit};

/// Query parameters for the clusters endpoint.
///
/// Everything arrives as a raw string so the handler can report exactly
/// which parameter is missing or malformed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterQueryParams {
    /// Bounding box as `west,south,east,north`.
    pub bbox: Option<String>,
    /// Current map zoom level.
    pub zoom: Option<String>,
    /// Cluster id to expand into its points.
    pub expand: Option<String>,
    /// Maximum number of points returned by an expansion.
    pub limit: Option<String>,
    /// Number of points to skip in an expansion.
    pub offset: Option<String>,
}

/// Query parameters for the search endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQueryParams {
    /// Free-text query.
    pub q: Option<String>,
}

/// Query parameters for the reload endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadParams {
    /// Wait for the rebuild to finish before responding.
    #[serde(default)]
    pub wait: bool,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether an index is built and serving.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Snapshot version of the serving index.
    pub generation: Option<u64>,
    /// Number of clustered points.
    pub point_count: usize,
    /// Number of gazetteer places.
    pub place_count: usize,
    /// When the serving index was built.
    pub built_at: Option<DateTime<Utc>>,
}

/// Error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable machine-readable code, e.g. `invalid_viewport`.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

/// Response of the expansion zoom endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiExpansionZoom {
    pub cluster_id: ClusterId,
    pub expansion_zoom: u8,
}

/// Response of the reload endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReload {
    /// `true` once the new index is serving; `false` if it is still
    /// building in the background.
    pub completed: bool,
    /// Generation serving at the time of the response.
    pub generation: Option<u64>,
}

/// Keys that a search result sets itself and attributes may not shadow.
const SEARCH_RESULT_FIELDS: &[&str] = &["type", "id", "name", "coordinates", "score", "description"];

/// A search result as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSearchResult {
    /// Catalog the result came from.
    #[serde(rename = "type")]
    pub category: ResultCategory,
    /// Point id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// `[longitude, latitude]`.
    pub coordinates: [f64; 2],
    /// Relevance score (40 to 100).
    pub score: u32,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Remaining point attributes.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl From<&SearchHit<'_>> for ApiSearchResult {
    fn from(hit: &SearchHit<'_>) -> Self {
        let point = hit.point;
        let mut attributes = point.attributes.clone();
        attributes.retain(|key, _| !SEARCH_RESULT_FIELDS.contains(&key.as_str()));

        Self {
            category: hit.category,
            id: point.id.clone(),
            name: point.name.clone(),
            coordinates: point.coordinates(),
            score: hit.score.value(),
            description: point.description.clone(),
            attributes,
        }
    }
}

/// Short label for a cluster size: `950`, `1.2k`, `15k`.
#[must_use]
pub fn point_count_abbreviated(count: usize) -> Value {
    if count >= 10_000 {
        Value::String(format!("{}k", (count + 500) / 1_000))
    } else if count >= 1_000 {
        let tenths = (count + 50) / 100;
        if tenths % 10 == 0 {
            Value::String(format!("{}k", tenths / 10))
        } else {
            Value::String(format!("{}.{}k", tenths / 10, tenths % 10))
        }
    } else {
        Value::from(count)
    }
}

fn point_geometry(coordinates: [f64; 2]) -> Geometry {
    Geometry::new(geojson::Value::Point(coordinates.to_vec()))
}

/// A single point as a `GeoJSON` feature.
///
/// The feature id is the point id. Properties hold the point's
/// attributes plus `id`, `name` and `description`.
#[must_use]
pub fn leaf_feature(point: &Point) -> Feature {
    let mut properties: JsonObject = point
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    properties.insert("id".to_string(), Value::String(point.id.clone()));
    properties.insert("name".to_string(), Value::String(point.name.clone()));
    if let Some(description) = &point.description {
        properties.insert("description".to_string(), Value::String(description.clone()));
    }

    Feature {
        bbox: None,
        geometry: Some(point_geometry(point.coordinates())),
        id: Some(Id::String(point.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// An aggregate cluster as a `GeoJSON` feature.
#[must_use]
pub fn cluster_feature(cluster: &ClusterSummary) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("cluster".to_string(), Value::Bool(true));
    properties.insert("cluster_id".to_string(), Value::from(cluster.id.raw()));
    properties.insert("point_count".to_string(), Value::from(cluster.point_count));
    properties.insert(
        "point_count_abbreviated".to_string(),
        point_count_abbreviated(cluster.point_count),
    );

    Feature {
        bbox: None,
        geometry: Some(point_geometry([cluster.longitude, cluster.latitude])),
        id: Some(Id::Number(cluster.id.raw().into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// A cluster index node as a `GeoJSON` feature.
#[must_use]
pub fn node_feature(node: &ClusterNode<'_>) -> Feature {
    match node {
        ClusterNode::Cluster(cluster) => cluster_feature(cluster),
        ClusterNode::Leaf(point) => leaf_feature(point),
    }
}

/// Wraps features in a `FeatureCollection`.
#[must_use]
pub fn feature_collection(features: impl IntoIterator<Item = Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: features.into_iter().collect(),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use watermap_search_models::MatchScore;

    use super::*;

    fn tahoe() -> Point {
        let mut point = Point::new("wb-1", "Lake Tahoe", -120.03, 39.09);
        point.description = Some("Alpine lake".to_string());
        point
            .attributes
            .insert("logoUrl".to_string(), json!("/img/tahoe.png"));
        point
    }

    #[test]
    fn abbreviates_large_counts() {
        assert_eq!(point_count_abbreviated(999), json!(999));
        assert_eq!(point_count_abbreviated(1_000), json!("1k"));
        assert_eq!(point_count_abbreviated(1_234), json!("1.2k"));
        assert_eq!(point_count_abbreviated(9_960), json!("10k"));
        assert_eq!(point_count_abbreviated(15_499), json!("15k"));
    }

    #[test]
    fn leaf_feature_carries_point_attributes() {
        let value = serde_json::to_value(leaf_feature(&tahoe())).unwrap();

        assert_eq!(value["type"], "Feature");
        assert_eq!(value["id"], "wb-1");
        assert_eq!(value["geometry"]["coordinates"], json!([-120.03, 39.09]));
        assert_eq!(value["properties"]["name"], "Lake Tahoe");
        assert_eq!(value["properties"]["description"], "Alpine lake");
        assert_eq!(value["properties"]["logoUrl"], "/img/tahoe.png");
        assert!(value["properties"].get("cluster").is_none());
    }

    #[test]
    fn cluster_feature_is_flagged() {
        let summary = ClusterSummary {
            id: ClusterId::new(3, 4_242),
            longitude: 10.0,
            latitude: 20.0,
            point_count: 1_500,
            zoom: 4,
        };
        let value = serde_json::to_value(cluster_feature(&summary)).unwrap();

        assert_eq!(value["properties"]["cluster"], true);
        assert_eq!(value["properties"]["cluster_id"], json!(summary.id.raw()));
        assert_eq!(value["properties"]["point_count"], 1_500);
        assert_eq!(value["properties"]["point_count_abbreviated"], "1.5k");
        assert_eq!(value["geometry"]["type"], "Point");
    }

    #[test]
    fn collection_serializes_with_type() {
        let point = tahoe();
        let value =
            serde_json::to_value(feature_collection([node_feature(&ClusterNode::Leaf(&point))]))
                .unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn search_result_flattens_attributes() {
        let mut point = tahoe();
        point.attributes.insert("type".to_string(), json!("lake"));
        let hit = SearchHit {
            category: ResultCategory::Entity,
            point: &point,
            score: MatchScore::Exact,
        };

        let value = serde_json::to_value(ApiSearchResult::from(&hit)).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "entity",
                "id": "wb-1",
                "name": "Lake Tahoe",
                "coordinates": [-120.03, 39.09],
                "score": 100,
                "description": "Alpine lake",
                "logoUrl": "/img/tahoe.png",
            })
        );
    }

    #[test]
    fn reload_wait_defaults_to_false() {
        let params: ReloadParams = serde_json::from_str("{}").unwrap();
        assert!(!params.wait);
    }
}
