#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the watermap application.
//!
//! Serves viewport cluster queries, cluster expansion and name search over
//! a point snapshot. The cluster index is built once at startup and
//! replaced wholesale on `POST /api/reload`; requests never wait on a
//! rebuild once an index is serving.

pub mod cache;
pub mod config;
pub mod error;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use watermap_search::SearchLimits;

pub use cache::{IndexCache, IndexGeneration};
pub use config::ServiceConfig;
pub use error::ServiceError;

/// Shared application state.
pub struct AppState {
    /// Serving index and the stores it is rebuilt from.
    pub cache: Arc<IndexCache>,
    /// Search result caps.
    pub limits: SearchLimits,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/clusters", web::get().to(handlers::clusters))
            .route(
                "/clusters/{id}/children",
                web::get().to(handlers::cluster_children),
            )
            .route(
                "/clusters/{id}/expansion-zoom",
                web::get().to(handlers::cluster_expansion_zoom),
            )
            .route("/search", web::get().to(handlers::search))
            .route("/search/entities", web::get().to(handlers::search_entities))
            .route("/search/places", web::get().to(handlers::search_places))
            .route("/reload", web::post().to(handlers::reload)),
    );
}

/// Starts the watermap API server with the configuration from
/// `WATERMAP_CONFIG` (or the embedded default).
///
/// This is a regular async function; the caller provides the runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration is invalid or
/// the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServiceConfig::load().map_err(std::io::Error::other)?;
    serve(config).await
}

/// Builds the index and serves `config` until shutdown.
///
/// A failed initial build is logged, not fatal: the server starts, reports
/// itself unhealthy and retries the build on the next request.
///
/// # Errors
///
/// Returns an `std::io::Result` error if a point source is misconfigured or
/// the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn serve(config: ServiceConfig) -> std::io::Result<()> {
    let cache = Arc::new(IndexCache::from_config(&config).map_err(std::io::Error::other)?);

    log::info!("Building cluster index...");
    if let Err(e) = cache.get_or_build().await {
        log::error!("Initial index build failed, will retry on demand: {e}");
    }

    let state = web::Data::new(AppState {
        cache,
        limits: config.search,
    });

    let bind_addr = config.server.bind_addr;
    let port = config.server.port;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test, web};
    use serde_json::Value;
    use watermap_cluster::ClusterOptions;
    use watermap_point_models::Point;
    use watermap_point_store::{MemoryPointStore, PointStore};

    use super::*;

    fn lakes() -> Vec<Point> {
        let mut points = vec![
            Point::new("tahoe", "Lake Tahoe", -120.0324, 39.0968),
            Point::new("fallen-leaf", "Fallen Leaf Lake", -120.0582, 38.9213),
            Point::new("emerald", "Emerald Bay", -120.1106, 38.9546),
            Point::new("mono", "Mono Lake", -119.009, 38.016),
            Point::new("superior", "Lake Superior", -87.5, 47.7),
            Point::new("fiji-lagoon", "Fiji Lagoon", 178.0, -17.0),
        ];
        points[0].description = Some("Alpine lake".to_string());
        points[0]
            .attributes
            .insert("logoUrl".to_string(), serde_json::json!("/img/tahoe.png"));
        points
    }

    fn cities() -> Vec<Point> {
        vec![
            Point::new("0", "South Lake Tahoe", -119.9772, 38.9399),
            Point::new("1", "Reno", -119.8138, 39.5296),
        ]
    }

    fn state_with(entities: Vec<Point>, places: Option<Vec<Point>>) -> web::Data<AppState> {
        let entities: Arc<dyn PointStore> = Arc::new(MemoryPointStore::new("entities", entities));
        let places = places.map(|p| Arc::new(MemoryPointStore::new("places", p)) as Arc<dyn PointStore>);
        web::Data::new(AppState {
            cache: Arc::new(IndexCache::new(entities, places, ClusterOptions::default())),
            limits: SearchLimits::default(),
        })
    }

    fn state() -> web::Data<AppState> {
        state_with(lakes(), Some(cities()))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure)).await
        };
    }

    macro_rules! get_json {
        ($app:expr, $uri:expr) => {{
            let req = test::TestRequest::get().uri($uri).to_request();
            let resp = test::call_service(&$app, req).await;
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }};
    }

    fn features(body: &Value) -> &Vec<Value> {
        body["features"].as_array().unwrap()
    }

    fn first_cluster_id(body: &Value) -> u64 {
        features(body)
            .iter()
            .find(|f| f["properties"]["cluster"] == true)
            .and_then(|f| f["properties"]["cluster_id"].as_u64())
            .unwrap()
    }

    #[actix_web::test]
    async fn clusters_at_low_zoom_aggregate_nearby_lakes() {
        let state = state();
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/clusters?bbox=-180,-85,180,85&zoom=3");

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "FeatureCollection");
        let total: u64 = features(&body)
            .iter()
            .map(|f| f["properties"]["point_count"].as_u64().unwrap_or(1))
            .sum();
        assert_eq!(total, 6);
        assert!(features(&body).iter().any(|f| f["properties"]["cluster"] == true));
    }

    #[actix_web::test]
    async fn high_zoom_returns_leaf_attributes() {
        let state = state();
        let app = app!(state);

        let (status, body) =
            get_json!(app, "/api/clusters?bbox=-120.1,39.0,-120.0,39.2&zoom=18");

        assert_eq!(status, StatusCode::OK);
        let features = features(&body);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["id"], "tahoe");
        assert_eq!(features[0]["properties"]["name"], "Lake Tahoe");
        assert_eq!(features[0]["properties"]["logoUrl"], "/img/tahoe.png");
    }

    #[actix_web::test]
    async fn expand_returns_cluster_points() {
        let state = state();
        let app = app!(state);

        let (_, body) = get_json!(app, "/api/clusters?bbox=-125,35,-115,42&zoom=5");
        let id = first_cluster_id(&body);

        let (status, body) = get_json!(app, &format!("/api/clusters?expand={id}&zoom=5"));
        assert_eq!(status, StatusCode::OK);
        let mut ids: Vec<&str> = features(&body)
            .iter()
            .map(|f| f["id"].as_str().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, ["emerald", "fallen-leaf", "tahoe"]);

        let (_, limited) =
            get_json!(app, &format!("/api/clusters?expand={id}&zoom=5&limit=2&offset=1"));
        assert_eq!(features(&limited).len(), 2);
    }

    #[actix_web::test]
    async fn children_and_expansion_zoom() {
        let state = state();
        let app = app!(state);

        let (_, body) = get_json!(app, "/api/clusters?bbox=-125,35,-115,42&zoom=5");
        let id = first_cluster_id(&body);

        let (status, children) = get_json!(app, &format!("/api/clusters/{id}/children"));
        assert_eq!(status, StatusCode::OK);
        assert!(features(&children).len() >= 2);

        let (status, zoom) = get_json!(app, &format!("/api/clusters/{id}/expansion-zoom"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(zoom["clusterId"], id);
        assert!(zoom["expansionZoom"].as_u64().unwrap() > 5);
    }

    #[actix_web::test]
    async fn missing_and_invalid_parameters_are_bad_requests() {
        let state = state();
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/clusters?bbox=-10,-10,10,10");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_parameter");

        let (status, body) = get_json!(app, "/api/clusters?zoom=4");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_parameter");

        let (status, body) = get_json!(app, "/api/clusters?bbox=10,-10,10,10&zoom=4");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_viewport");

        let (status, body) = get_json!(app, "/api/clusters?bbox=-10,-10,10,10&zoom=25");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_viewport");

        let (status, body) = get_json!(app, "/api/clusters?bbox=1,2,3&zoom=4");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_parameter");

        let (status, body) = get_json!(app, "/api/search");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_parameter");

        let (status, body) = get_json!(app, "/api/search?q=%20%20");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "empty_query");
    }

    #[actix_web::test]
    async fn unknown_cluster_is_not_found() {
        let state = state();
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/clusters?expand=12345&zoom=3");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_cluster");

        let (status, _) = get_json!(app, "/api/clusters/12345/children");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn ids_from_before_a_reload_are_rejected() {
        let state = state();
        let app = app!(state);

        let (_, body) = get_json!(app, "/api/clusters?bbox=-125,35,-115,42&zoom=5");
        let stale = first_cluster_id(&body);

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/reload?wait=true").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let reload: Value = test::read_body_json(resp).await;
        assert_eq!(reload["completed"], true);

        let (status, body) = get_json!(app, &format!("/api/clusters?expand={stale}&zoom=5"));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_cluster");
    }

    #[actix_web::test]
    async fn background_reload_is_accepted() {
        let state = state();
        let app = app!(state);

        let (_, health) = get_json!(app, "/api/clusters?bbox=-10,-10,10,10&zoom=1");
        assert_eq!(health["type"], "FeatureCollection");

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/reload").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["completed"], false);
        assert!(body["generation"].is_u64());
    }

    #[actix_web::test]
    async fn combined_search_ranks_across_catalogs() {
        let state = state();
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/search?q=Tahoe");

        assert_eq!(status, StatusCode::OK);
        let results = body.as_array().unwrap();
        let summary: Vec<(&str, &str, u64)> = results
            .iter()
            .map(|r| {
                (
                    r["type"].as_str().unwrap(),
                    r["name"].as_str().unwrap(),
                    r["score"].as_u64().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            [
                ("place", "South Lake Tahoe", 60),
                ("entity", "Lake Tahoe", 60),
            ]
        );
        assert_eq!(results[1]["coordinates"], serde_json::json!([-120.0324, 39.0968]));
        assert_eq!(results[1]["description"], "Alpine lake");
    }

    #[actix_web::test]
    async fn single_catalog_search() {
        let state = state();
        let app = app!(state);

        let (_, entities) = get_json!(app, "/api/search/entities?q=lake");
        assert!(entities
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["type"] == "entity"));
        assert_eq!(entities[0]["name"], "Lake Tahoe");
        assert_eq!(entities[0]["score"], 80);

        let (_, places) = get_json!(app, "/api/search/places?q=reno");
        assert_eq!(places.as_array().unwrap().len(), 1);
        assert_eq!(places[0]["score"], 100);
    }

    #[actix_web::test]
    async fn search_without_place_source_returns_entities_only() {
        let state = state_with(lakes(), None);
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/search?q=mono");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = get_json!(app, "/api/search/places?q=mono");
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn health_reports_serving_generation() {
        let state = state();
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/health");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["healthy"], false);

        state.cache.get_or_build().await.unwrap();

        let (status, body) = get_json!(app, "/api/health");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["pointCount"], 6);
        assert_eq!(body["placeCount"], 2);
        assert!(body["generation"].is_u64());
    }

    #[actix_web::test]
    async fn schema_errors_surface_as_server_errors() {
        let state = state_with(vec![Point::new("x", "Broken", 200.0, 0.0)], None);
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/clusters?bbox=-10,-10,10,10&zoom=3");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "schema_error");
    }

    #[actix_web::test]
    async fn wrapped_viewport_crosses_the_antimeridian() {
        let state = state();
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/clusters?bbox=170,-30,-170,0&zoom=10");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(features(&body).len(), 1);
    }

    #[actix_web::test]
    async fn unreadable_source_fails_the_build_with_server_error() {
        let entities = watermap_point_store::open(
            "entities",
            &watermap_point_models::SourceConfig::JsonFile {
                path: "/nonexistent/water-bodies.json".into(),
                generate_ids: false,
            },
        )
        .unwrap();
        let state = web::Data::new(AppState {
            cache: Arc::new(IndexCache::new(entities, None, ClusterOptions::default())),
            limits: SearchLimits::default(),
        });
        let app = app!(state);

        let (status, body) = get_json!(app, "/api/clusters?bbox=-10,-10,10,10&zoom=3");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "source_unavailable");
        assert!(state.cache.current().is_none());
    }
}
