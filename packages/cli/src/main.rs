#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for watermap.
//!
//! `serve` runs the HTTP API. The other subcommands build the index from
//! the same configuration in-process and print the result as JSON, which
//! is handy for checking a dataset without starting the server.
//!
//! Cluster ids belong to the index that produced them, and every run
//! builds its own index, so `expand` finds its clusters by viewport in the
//! same run rather than taking an id from an earlier one.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use watermap_cluster::ClusterNode;
use watermap_point_models::BoundingBox;
use watermap_search::{Catalog, ResultCategory};
use watermap_server::{IndexCache, ServiceConfig};
use watermap_server_models::{ApiSearchResult, feature_collection, leaf_feature, node_feature};

#[derive(Parser)]
#[command(name = "watermap", about = "Map point clustering and search")]
struct Cli {
    /// Configuration file (defaults to `WATERMAP_CONFIG`, then the
    /// built-in configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve,
    /// Print the clusters visible in a viewport as `GeoJSON`
    Clusters {
        /// Viewport as `west,south,east,north`
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: BoundingBox,
        /// Zoom level
        #[arg(long)]
        zoom: f64,
    },
    /// Print the points of every cluster visible in a viewport, keyed by
    /// cluster id
    Expand {
        /// Viewport as `west,south,east,north`
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: BoundingBox,
        /// Zoom level
        #[arg(long)]
        zoom: f64,
        /// Maximum number of points per cluster
        #[arg(long)]
        limit: Option<usize>,
        /// Number of points to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Search entity and place names
    Search {
        /// Free-text query
        query: String,
    },
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid bbox '{s}': {e}"))?;

    match parts[..] {
        [west, south, east, north] => Ok(BoundingBox::new(west, south, east, north)),
        _ => Err(format!("expected west,south,east,north, got '{s}'")),
    }
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::load()?,
    };

    if matches!(cli.command, Commands::Serve) {
        watermap_server::serve(config).await?;
        return Ok(());
    }

    let cache = IndexCache::from_config(&config)?;
    let generation = cache.get_or_build().await?;
    let index = generation.index();

    match cli.command {
        Commands::Serve => {}
        Commands::Clusters { bbox, zoom } => {
            let nodes = index.query(&bbox, zoom)?;
            log::info!("{} nodes at zoom {zoom}", nodes.len());
            print_json(&feature_collection(nodes.iter().map(node_feature)))?;
        }
        Commands::Expand {
            bbox,
            zoom,
            limit,
            offset,
        } => {
            let mut expanded = BTreeMap::new();
            for node in index.query(&bbox, zoom)? {
                if let ClusterNode::Cluster(cluster) = node {
                    let leaves = index.expand(cluster.id, limit, offset)?;
                    expanded.insert(
                        cluster.id.raw(),
                        feature_collection(leaves.into_iter().map(leaf_feature)),
                    );
                }
            }
            log::info!("Expanded {} clusters at zoom {zoom}", expanded.len());
            print_json(&expanded)?;
        }
        Commands::Search { query } => {
            let limits = config.search;
            let catalogs = [
                Catalog::new(
                    ResultCategory::Place,
                    generation.place_points(),
                    limits.place_cap,
                ),
                Catalog::new(
                    ResultCategory::Entity,
                    generation.entities().points(),
                    limits.entity_cap,
                ),
            ];
            let hits = watermap_search::search(&query, &catalogs, limits.max_results)?;
            let results: Vec<ApiSearchResult> = hits.iter().map(ApiSearchResult::from).collect();
            print_json(&results)?;
        }
    }

    Ok(())
}
