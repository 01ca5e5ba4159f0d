#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Types shared by the text search ranker and its callers.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use watermap_point_models::Point;

/// Which catalog a search result came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResultCategory {
    /// A clustered map entity (water body, company, ...).
    Entity,
    /// A gazetteer place such as a city.
    Place,
}

/// How a display name matched the query.
///
/// Variants are declared from weakest to strongest so the derived ordering
/// agrees with [`MatchScore::value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MatchScore {
    /// Some whitespace-delimited word starts with the query.
    WordPrefix,
    /// The query appears anywhere in the name.
    Contains,
    /// The name starts with the query.
    Prefix,
    /// The whole name equals the query.
    Exact,
}

impl MatchScore {
    /// Numeric relevance reported to clients.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Self::Exact => 100,
            Self::Prefix => 80,
            Self::Contains => 60,
            Self::WordPrefix => 40,
        }
    }
}

impl Serialize for MatchScore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.value())
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit<'a> {
    /// Catalog the point came from.
    pub category: ResultCategory,
    /// The matched point.
    pub point: &'a Point,
    /// Relevance of the match.
    pub score: MatchScore,
}

/// Result count limits for search requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    /// Overall cap on returned results.
    pub max_results: usize,
    /// Cap on entity results before merging.
    pub entity_cap: usize,
    /// Cap on place results before merging.
    pub place_cap: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_results: 25,
            entity_cap: 20,
            place_cap: 5,
        }
    }
}
