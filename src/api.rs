//! The daemon's client-facing surface: one endpoint that runs a full
//! auction batch against the configured fleet.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::auction::fetch::{fetch_zones, CellHandle};
use crate::auction::scheduler::Scheduler;
use crate::auction::types::{AuctionRequest, AuctionResults};
use crate::clock::Clock;
use crate::error::{AuctioneerError, Result};
use crate::workpool::WorkPool;

#[derive(Clone)]
pub struct ApiState {
    pub work_pool: Arc<WorkPool>,
    pub clock: Arc<dyn Clock>,
    pub cells: Arc<Vec<CellHandle>>,
}

pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/auctions", post(auction_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the shutdown token fires.
pub async fn run_api(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = api_router(state);

    tracing::info!(addr = %addr, "Starting auctioneer API");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AuctioneerError::Internal(format!("failed to bind {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AuctioneerError::Internal(format!("API server failed: {e}")))
}

/// One batch: gather fleet state, run the auction, return the results.
async fn auction_handler(
    State(state): State<ApiState>,
    Json(request): Json<AuctionRequest>,
) -> Json<AuctionResults> {
    tracing::info!(
        lrps = request.lrps.len(),
        tasks = request.tasks.len(),
        "Received auction batch"
    );

    let zones = fetch_zones(&state.work_pool, state.cells.iter().cloned()).await;
    let scheduler = Scheduler::new(state.work_pool.clone(), zones, state.clock.clone());
    Json(scheduler.schedule(request).await)
}
