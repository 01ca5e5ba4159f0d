#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Lexical name search over point catalogs.
//!
//! Names are matched case-insensitively against a trimmed query and scored
//! by match quality (see [`MatchScore`]). Equal scores keep catalog order,
//! so identical inputs always rank identically.
//!
//! Several catalogs can be searched together. Each is capped on its own
//! before the merge so one large catalog cannot crowd the others out of
//! the combined list.

use watermap_point_models::Point;

pub use watermap_search_models::{MatchScore, ResultCategory, SearchHit, SearchLimits};

/// Errors from the search ranker.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    /// The query is empty after trimming.
    #[error("Search query is empty")]
    EmptyQuery,
}

/// A set of points searched under one category, with its own result cap.
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    pub category: ResultCategory,
    pub points: &'a [Point],
    pub cap: usize,
}

impl<'a> Catalog<'a> {
    #[must_use]
    pub const fn new(category: ResultCategory, points: &'a [Point], cap: usize) -> Self {
        Self {
            category,
            points,
            cap,
        }
    }
}

/// Trims and lower-cases a raw query.
///
/// # Errors
///
/// Returns [`SearchError::EmptyQuery`] if nothing is left after trimming.
pub fn normalize_query(query: &str) -> Result<String, SearchError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    Ok(trimmed.to_lowercase())
}

/// Scores `name` against an already normalized query. `None` means no match.
#[must_use]
pub fn score_name(name: &str, query: &str) -> Option<MatchScore> {
    let name = name.to_lowercase();

    if name == query {
        Some(MatchScore::Exact)
    } else if name.starts_with(query) {
        Some(MatchScore::Prefix)
    } else if name.contains(query) {
        Some(MatchScore::Contains)
    } else if name.split_whitespace().any(|word| word.starts_with(query)) {
        Some(MatchScore::WordPrefix)
    } else {
        None
    }
}

/// Ranks one catalog: matches only, strongest first, at most `cap`.
fn rank_catalog<'a>(query: &str, catalog: &Catalog<'a>) -> Vec<SearchHit<'a>> {
    let mut hits: Vec<SearchHit<'a>> = catalog
        .points
        .iter()
        .filter_map(|point| {
            score_name(&point.name, query).map(|score| SearchHit {
                category: catalog.category,
                point,
                score,
            })
        })
        .collect();

    // `sort_by` is stable, which keeps first-seen order among equal scores.
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(catalog.cap);
    hits
}

/// Searches `catalogs` for `query` and returns at most `max_results` hits.
///
/// Each catalog is ranked and capped independently. The capped lists are
/// concatenated in catalog order, re-sorted by score (stable, so earlier
/// catalogs win ties) and truncated.
///
/// # Errors
///
/// Returns [`SearchError::EmptyQuery`] if the query is blank.
pub fn search<'a>(
    query: &str,
    catalogs: &[Catalog<'a>],
    max_results: usize,
) -> Result<Vec<SearchHit<'a>>, SearchError> {
    let query = normalize_query(query)?;

    let mut hits: Vec<SearchHit<'a>> = catalogs
        .iter()
        .flat_map(|catalog| rank_catalog(&query, catalog))
        .collect();

    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(max_results);

    log::debug!("Search '{query}' -> {} hits", hits.len());

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&str]) -> Vec<Point> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Point::new(i.to_string(), *name, 0.0, 0.0))
            .collect()
    }

    fn names<'a>(hits: &[SearchHit<'a>]) -> Vec<&'a str> {
        hits.iter().map(|h| h.point.name.as_str()).collect()
    }

    #[test]
    fn exact_match_ranks_first() {
        let points = named(&["LakeA", "LakeA Annex", "North LakeA Reservoir", "Other"]);
        let catalogs = [Catalog::new(ResultCategory::Entity, &points, 25)];

        let hits = search("lakea", &catalogs, 25).unwrap();

        assert_eq!(names(&hits), ["LakeA", "LakeA Annex", "North LakeA Reservoir"]);
        let scores: Vec<u32> = hits.iter().map(|h| h.score.value()).collect();
        assert_eq!(scores, [100, 80, 60]);
    }

    #[test]
    fn query_is_trimmed_and_case_folded() {
        let points = named(&["Crater Lake"]);
        let catalogs = [Catalog::new(ResultCategory::Entity, &points, 25)];

        let hits = search("  CRATER lake \t", &catalogs, 25).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, MatchScore::Exact);
    }

    #[test]
    fn blank_queries_are_rejected() {
        let points = named(&["Anything"]);
        let catalogs = [Catalog::new(ResultCategory::Entity, &points, 25)];
        assert_eq!(search("", &catalogs, 25), Err(SearchError::EmptyQuery));
        assert_eq!(search("   \n", &catalogs, 25), Err(SearchError::EmptyQuery));
    }

    #[test]
    fn scoring_levels() {
        assert_eq!(score_name("Mono Lake", "mono lake"), Some(MatchScore::Exact));
        assert_eq!(score_name("Mono Lake", "mono"), Some(MatchScore::Prefix));
        assert_eq!(score_name("Mono Lake", "o la"), Some(MatchScore::Contains));
        assert_eq!(score_name("Mono Lake", "lake"), Some(MatchScore::Contains));
        assert_eq!(score_name("Mono Lake", "tahoe"), None);
    }

    #[test]
    fn ties_keep_input_order() {
        let points = named(&["Blue Lake", "Big Blue", "Blue Pond", "Blue Creek"]);
        let catalogs = [Catalog::new(ResultCategory::Entity, &points, 25)];

        let hits = search("blue", &catalogs, 25).unwrap();

        assert_eq!(names(&hits), ["Blue Lake", "Blue Pond", "Blue Creek", "Big Blue"]);
    }

    #[test]
    fn repeated_searches_are_identical() {
        let points = named(&["Lake One", "Lake Two", "Twin Lakes", "Lake One"]);
        let catalogs = [Catalog::new(ResultCategory::Entity, &points, 25)];
        let first = search("lake", &catalogs, 25).unwrap();
        for _ in 0..10 {
            assert_eq!(search("lake", &catalogs, 25).unwrap(), first);
        }
    }

    #[test]
    fn combined_search_caps_each_catalog_before_merging() {
        let places: Vec<Point> = (0..30)
            .map(|i| Point::new(format!("c{i}"), format!("Springfield {i}"), 0.0, 0.0))
            .collect();
        let entities: Vec<Point> = (0..30)
            .map(|i| Point::new(format!("e{i}"), format!("Springfield Lake {i}"), 0.0, 0.0))
            .collect();
        let limits = SearchLimits::default();
        let catalogs = [
            Catalog::new(ResultCategory::Place, &places, limits.place_cap),
            Catalog::new(ResultCategory::Entity, &entities, limits.entity_cap),
        ];

        let hits = search("springfield", &catalogs, limits.max_results).unwrap();

        assert_eq!(hits.len(), 25);
        let place_count = hits
            .iter()
            .filter(|h| h.category == ResultCategory::Place)
            .count();
        assert_eq!(place_count, 5);
        assert_eq!(hits.len() - place_count, 20);
    }

    #[test]
    fn weaker_catalog_is_not_starved_by_stronger_one() {
        let places = named(&["Old Reno Road"]);
        let entities: Vec<Point> = (0..30)
            .map(|i| Point::new(format!("e{i}"), format!("Reno {i}"), 0.0, 0.0))
            .collect();
        let catalogs = [
            Catalog::new(ResultCategory::Place, &places, 5),
            Catalog::new(ResultCategory::Entity, &entities, 20),
        ];

        let hits = search("reno", &catalogs, 25).unwrap();

        assert_eq!(hits.len(), 21);
        assert_eq!(hits[20].category, ResultCategory::Place);
        assert_eq!(hits[20].score, MatchScore::Contains);
    }

    #[test]
    fn higher_scores_cross_catalog_boundaries() {
        let places = named(&["Tahoe City", "Tahoe"]);
        let entities = named(&["Lake Tahoe", "Tahoe"]);
        let catalogs = [
            Catalog::new(ResultCategory::Place, &places, 5),
            Catalog::new(ResultCategory::Entity, &entities, 20),
        ];

        let hits = search("tahoe", &catalogs, 3).unwrap();

        let summary: Vec<(ResultCategory, &str)> = hits
            .iter()
            .map(|h| (h.category, h.point.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            [
                (ResultCategory::Place, "Tahoe"),
                (ResultCategory::Entity, "Tahoe"),
                (ResultCategory::Place, "Tahoe City"),
            ]
        );
    }

    #[test]
    fn concurrent_searches_match_sequential_results() {
        let points: Vec<Point> = (0..500)
            .map(|i| Point::new(i.to_string(), format!("Lake {i}"), 0.0, 0.0))
            .collect();
        let catalogs = [Catalog::new(ResultCategory::Entity, &points, 20)];
        let queries = ["lake 1", "lake", "7", "lake 49"];
        let expected: Vec<_> = queries
            .iter()
            .map(|q| search(q, &catalogs, 25).unwrap())
            .collect();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for (q, expected) in queries.iter().zip(&expected) {
                        assert_eq!(&search(q, &catalogs, 25).unwrap(), expected);
                    }
                });
            }
        });
    }
}
