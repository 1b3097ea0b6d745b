use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use super::types::*;
use super::AppState;
use crate::aggregate::{self, FlowGraph, MultiNetworkSummary, TimelineEntry};
use crate::pipeline::DiscoveredAccount;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse { error: msg.into() }),
    )
}

fn validate_address(address: &str) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if !address.starts_with("0x") || address.len() != 42 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid account address '{}'", address),
        ));
    }
    Ok(())
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        networks: state.pipeline.registry().len(),
    })
}

pub async fn list_networks(State(state): State<Arc<AppState>>) -> Json<NetworksResponse> {
    Json(NetworksResponse {
        networks: state.pipeline.registry().all().to_vec(),
    })
}

pub async fn discover(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Vec<DiscoveredAccount>> {
    validate_address(&address)?;
    Ok(Json(state.pipeline.discover_accounts(&address).await))
}

pub async fn timeline(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Vec<TimelineEntry>> {
    validate_address(&address)?;
    let discovered = state.pipeline.discover_accounts(&address).await;
    let bundles = state.pipeline.fetch_all_bundles(&address, &discovered).await;
    Ok(Json(aggregate::build_timeline(&bundles)))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<MultiNetworkSummary> {
    validate_address(&address)?;
    let discovered = state.pipeline.discover_accounts(&address).await;
    let bundles = state.pipeline.fetch_all_bundles(&address, &discovered).await;
    Ok(Json(aggregate::build_multi_network_summary(
        &bundles, &address,
    )))
}

pub async fn flow_graph(
    State(state): State<Arc<AppState>>,
    Path((address, network_id)): Path<(String, u64)>,
) -> ApiResult<FlowGraph> {
    validate_address(&address)?;
    state
        .pipeline
        .registry()
        .get(network_id)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let bundle = state
        .pipeline
        .fetch_network_bundle(&address, network_id)
        .await
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))?;

    Ok(Json(aggregate::build_flow_graph(&bundle, &address)))
}
