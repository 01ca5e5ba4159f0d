//! HTTP handler functions for the watermap API.

use actix_web::{HttpResponse, web};
use serde::Serialize;
use watermap_cluster::ClusterId;
use watermap_point_models::BoundingBox;
use watermap_search::{Catalog, ResultCategory};
use watermap_server_models::{
    ApiExpansionZoom, ApiHealth, ApiReload, ApiSearchResult, ClusterQueryParams, ReloadParams,
    SearchQueryParams, feature_collection, leaf_feature, node_feature,
};

use crate::AppState;
use crate::error::ServiceError;

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => e.to_response(),
    }
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let current = state.cache.current();
    let body = ApiHealth {
        healthy: current.is_some(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: current.as_ref().map(|g| g.generation()),
        point_count: current.as_ref().map_or(0, |g| g.entities().len()),
        place_count: current.as_ref().map_or(0, |g| g.place_points().len()),
        built_at: current.as_ref().map(|g| g.built_at()),
    };

    if body.healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// `GET /api/clusters?bbox=W,S,E,N&zoom=Z`
/// `GET /api/clusters?expand=ID&zoom=Z[&limit=N&offset=N]`
///
/// Returns the clusters and points visible in a viewport, or the points of
/// one cluster, as a `GeoJSON` feature collection.
pub async fn clusters(
    state: web::Data<AppState>,
    params: web::Query<ClusterQueryParams>,
) -> HttpResponse {
    respond(cluster_features(&state, &params).await)
}

async fn cluster_features(
    state: &AppState,
    params: &ClusterQueryParams,
) -> Result<geojson::FeatureCollection, ServiceError> {
    let zoom = parse_zoom(required("zoom", params.zoom.as_deref())?)?;

    if let Some(expand) = params.expand.as_deref() {
        let id = parse_cluster_id("expand", expand)?;
        let limit = params.limit.as_deref().map(|v| parse_count("limit", v)).transpose()?;
        let offset = params
            .offset
            .as_deref()
            .map(|v| parse_count("offset", v))
            .transpose()?
            .unwrap_or(0);

        let generation = state.cache.get_or_build().await?;
        let leaves = generation.index().expand(id, limit, offset)?;
        return Ok(feature_collection(leaves.into_iter().map(leaf_feature)));
    }

    let bbox = parse_bbox(required("bbox", params.bbox.as_deref())?)?;

    let generation = state.cache.get_or_build().await?;
    let nodes = generation.index().query(&bbox, zoom)?;
    Ok(feature_collection(nodes.iter().map(node_feature)))
}

/// `GET /api/clusters/{id}/children`
pub async fn cluster_children(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let result = async {
        let id = parse_cluster_id("id", &path)?;
        let generation = state.cache.get_or_build().await?;
        let children = generation.index().children(id)?;
        Ok::<_, ServiceError>(feature_collection(children.iter().map(node_feature)))
    };
    respond(result.await)
}

/// `GET /api/clusters/{id}/expansion-zoom`
pub async fn cluster_expansion_zoom(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let result = async {
        let id = parse_cluster_id("id", &path)?;
        let generation = state.cache.get_or_build().await?;
        let expansion_zoom = generation.index().expansion_zoom(id)?;
        Ok::<_, ServiceError>(ApiExpansionZoom {
            cluster_id: id,
            expansion_zoom,
        })
    };
    respond(result.await)
}

/// Which catalogs a search request covers.
#[derive(Debug, Clone, Copy)]
enum SearchScope {
    All,
    Only(ResultCategory),
}

/// `GET /api/search?q=TEXT`
///
/// Places and entities together, each capped before merging.
pub async fn search(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HttpResponse {
    respond(search_results(&state, &params, SearchScope::All).await)
}

/// `GET /api/search/entities?q=TEXT`
pub async fn search_entities(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HttpResponse {
    respond(search_results(&state, &params, SearchScope::Only(ResultCategory::Entity)).await)
}

/// `GET /api/search/places?q=TEXT`
pub async fn search_places(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HttpResponse {
    respond(search_results(&state, &params, SearchScope::Only(ResultCategory::Place)).await)
}

async fn search_results(
    state: &AppState,
    params: &SearchQueryParams,
    scope: SearchScope,
) -> Result<Vec<ApiSearchResult>, ServiceError> {
    let query = params.q.as_deref().ok_or(ServiceError::MissingParameter("q"))?;
    watermap_search::normalize_query(query)?;

    let generation = state.cache.get_or_build().await?;
    let limits = state.limits;
    let entities = generation.entities().points();
    let places = generation.place_points();

    let catalogs = match scope {
        SearchScope::All => vec![
            Catalog::new(ResultCategory::Place, places, limits.place_cap),
            Catalog::new(ResultCategory::Entity, entities, limits.entity_cap),
        ],
        SearchScope::Only(ResultCategory::Entity) => vec![Catalog::new(
            ResultCategory::Entity,
            entities,
            limits.max_results,
        )],
        SearchScope::Only(ResultCategory::Place) => vec![Catalog::new(
            ResultCategory::Place,
            places,
            limits.max_results,
        )],
    };

    let hits = watermap_search::search(query, &catalogs, limits.max_results)?;
    Ok(hits.iter().map(ApiSearchResult::from).collect())
}

/// `POST /api/reload[?wait=true]`
///
/// Rebuilds the index from freshly loaded snapshots. Without `wait` the
/// rebuild runs in the background and the response reports the
/// generation still serving.
pub async fn reload(state: web::Data<AppState>, params: web::Query<ReloadParams>) -> HttpResponse {
    if params.wait {
        return match state.cache.reload().await {
            Ok(generation) => HttpResponse::Ok().json(ApiReload {
                completed: true,
                generation: Some(generation.generation()),
            }),
            Err(e) => {
                log::warn!("Reload failed, previous index stays published: {e}");
                e.to_response()
            }
        };
    }

    let cache = state.cache.clone();
    actix_rt::spawn(async move {
        if let Err(e) = cache.reload().await {
            log::warn!("Background reload failed, previous index stays published: {e}");
        }
    });

    HttpResponse::Accepted().json(ApiReload {
        completed: false,
        generation: state.cache.current().map(|g| g.generation()),
    })
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, ServiceError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::MissingParameter(name)),
    }
}

fn parse_zoom(value: &str) -> Result<f64, ServiceError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServiceError::InvalidParameter {
            name: "zoom",
            message: format!("'{value}' is not a number"),
        })
}

fn parse_cluster_id(name: &'static str, value: &str) -> Result<ClusterId, ServiceError> {
    value.parse().map_err(|_| ServiceError::InvalidParameter {
        name,
        message: format!("'{value}' is not a cluster id"),
    })
}

fn parse_count(name: &'static str, value: &str) -> Result<usize, ServiceError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServiceError::InvalidParameter {
            name,
            message: format!("'{value}' is not a non-negative integer"),
        })
}

/// Parses a bounding box string `"west,south,east,north"` into a
/// [`BoundingBox`].
fn parse_bbox(s: &str) -> Result<BoundingBox, ServiceError> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse())
        .collect::<Result<_, _>>()
        .map_err(|_| ServiceError::InvalidParameter {
            name: "bbox",
            message: format!("'{s}' is not a list of numbers"),
        })?;

    match parts[..] {
        [west, south, east, north] => Ok(BoundingBox::new(west, south, east, north)),
        _ => Err(ServiceError::InvalidParameter {
            name: "bbox",
            message: format!("expected west,south,east,north but got {} values", parts.len()),
        }),
    }
}
