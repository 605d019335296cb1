use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use poolsight_core::aggregate::PoolDepth;
use poolsight_core::store::{DepthChangeRow, TimeWindow};
use poolsight_core::utils::Nano;
use poolsight_sdk::objects::pool::{
    DepthHistoryItem, DepthHistoryResponse, HistoryQuery, LatestBlockResponse, MomentQuery,
    PoolDepthResponse, PoolStatusResponse, PoolsResponse,
};

use super::ApiError;
use crate::state::AppState;

fn to_response(pool: &str, depth: &PoolDepth) -> PoolDepthResponse {
    PoolDepthResponse {
        pool: pool.to_owned(),
        asset_depth: depth.asset_depth,
        rune_depth: depth.rune_depth,
        synth_depth: depth.synth_depth,
        units: depth.units,
        asset_price: depth.asset_price(),
    }
}

fn to_history_item(row: DepthChangeRow) -> DepthHistoryItem {
    DepthHistoryItem {
        asset_depth: row.asset_e8,
        rune_depth: row.rune_e8,
        synth_depth: row.synth_e8,
        units: row.units,
        timestamp: row.block_timestamp.0,
    }
}

fn moment(query: MomentQuery) -> Nano {
    Nano(query.at.unwrap_or_default())
}

/// `GET /block/latest`
pub(super) async fn latest_block(State(state): State<AppState>) -> impl IntoResponse {
    let meta = state.query.latest_block();
    Json(LatestBlockResponse {
        height: meta.height,
        timestamp: meta.timestamp.0,
        hash: hex::encode(&meta.hash),
    })
}

/// `GET /pools`
pub(super) async fn list_pools(State(state): State<AppState>) -> impl IntoResponse {
    let (height, pools) = state.query.pools();
    Json(PoolsResponse {
        height,
        pools: pools
            .iter()
            .map(|(pool, depth)| to_response(pool, depth))
            .collect(),
    })
}

/// `GET /pools/{pool}`
pub(super) async fn get_pool(
    State(state): State<AppState>,
    Path(pool): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let depth = state.query.pool_depth(&pool)?;
    Ok(Json(to_response(&pool, &depth)))
}

/// `GET /pools/{pool}/history?from=&to=`
pub(super) async fn depth_history(
    State(state): State<AppState>,
    Path(pool): Path<String>,
    Query(window): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .query
        .depth_history(&pool, TimeWindow::new(Nano(window.from), Nano(window.to)))
        .await?;
    Ok(Json(DepthHistoryResponse {
        pool,
        items: rows.into_iter().map(to_history_item).collect(),
    }))
}

/// `GET /pools/{pool}/status?at=`
pub(super) async fn pool_status(
    State(state): State<AppState>,
    Path(pool): Path<String>,
    Query(at): Query<MomentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.query.pool_status(&pool, moment(at)).await?;
    Ok(Json(PoolStatusResponse { pool, status }))
}

/// `GET /depths?at=`
///
/// The height in the response is the latest committed one, even when `at`
/// points further back.
pub(super) async fn depths_at(
    State(state): State<AppState>,
    Query(at): Query<MomentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let depths = state.query.depths_at(moment(at)).await?;
    Ok(Json(PoolsResponse {
        height: state.query.latest_block().height,
        pools: depths
            .iter()
            .map(|(pool, depth)| to_response(pool, depth))
            .collect(),
    }))
}
