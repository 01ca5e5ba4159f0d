//! Service error taxonomy and its HTTP mapping.

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use watermap_cluster::IndexError;
use watermap_point_store::PointStoreError;
use watermap_search::SearchError;
use watermap_server_models::ApiError;

/// Any failure a request or index build can produce.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] PointStoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Search(#[from] SearchError),

    /// The build task itself failed (panicked or was cancelled).
    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },
}

impl ServiceError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Index(IndexError::InvalidViewport { .. })
            | Self::Search(SearchError::EmptyQuery)
            | Self::MissingParameter(_)
            | Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::Index(IndexError::UnknownCluster(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Index(_) | Self::IndexBuild(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Store(PointStoreError::SourceUnavailable { .. }) => "source_unavailable",
            Self::Store(PointStoreError::Schema { .. }) => "schema_error",
            Self::Index(IndexError::InvalidViewport { .. }) => "invalid_viewport",
            Self::Index(IndexError::UnknownCluster(_)) => "unknown_cluster",
            Self::Search(SearchError::EmptyQuery) => "empty_query",
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::Store(_) | Self::Index(_) | Self::IndexBuild(_) => "index_unavailable",
        }
    }

    /// Builds the JSON error response, logging the cause.
    #[must_use]
    pub fn to_response(&self) -> HttpResponse {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed ({}): {self}", self.code());
        } else {
            log::debug!("Rejected request ({}): {self}", self.code());
        }

        HttpResponse::build(status).json(ApiError {
            error: self.code().to_string(),
            message: self.to_string(),
        })
    }
}
