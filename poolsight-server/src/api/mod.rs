//! Query API handlers.
//!
//! # Endpoints
//!
//! - `GET /block/latest`                     – last committed block
//! - `GET /pools`                            – every pool at the latest block
//! - `GET /pools/{pool}`                     – one pool at the latest block
//! - `GET /pools/{pool}/history?from=&to=`   – depth changes within a window
//! - `GET /pools/{pool}/status?at=`          – pool status at a moment
//! - `GET /depths?at=`                       – every pool at a moment

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use poolsight_core::query::QueryError;
use poolsight_sdk::objects::pool::ErrorResponse;

use crate::state::AppState;

mod pools;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/block/latest", get(pools::latest_block))
        .route("/pools", get(pools::list_pools))
        .route("/pools/{pool}", get(pools::get_pool))
        .route("/pools/{pool}/history", get(pools::depth_history))
        .route("/pools/{pool}/status", get(pools::pool_status))
        .route("/depths", get(pools::depths_at))
}

/// Errors returned by query handlers.
#[derive(Debug)]
pub(crate) struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            QueryError::BeyondLastBlock { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            QueryError::PoolNotFound(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidWindow { .. } => StatusCode::BAD_REQUEST,
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let error = match &self.0 {
            QueryError::Store(e) => {
                tracing::error!(error = %e, "query API storage error");
                "internal server error".to_owned()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolsight_core::store::StoreError;
    use poolsight_core::utils::Nano;

    #[test]
    fn test_query_errors_map_to_status_codes() {
        let beyond = ApiError::from(QueryError::BeyondLastBlock {
            requested: Nano(2),
            last: Nano(1),
        });
        assert_eq!(beyond.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            ApiError::from(QueryError::PoolNotFound("BTC.BTC".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(QueryError::InvalidWindow {
                from: Nano(2),
                to: Nano(1)
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
        let store = ApiError::from(QueryError::Store(StoreError::Rejected("down".into())));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            store.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
