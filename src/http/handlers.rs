//! The cell-side HTTP surface: serves `GET /state` and `POST /work` for a
//! rep so a scheduler can reach it through `HttpCellClient`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::auction::types::{CellClient, Work};
use crate::http::routes;

/// Build the rep router around any `CellClient` implementation.
pub fn rep_router(rep: Arc<dyn CellClient>) -> Router {
    Router::new()
        .route(routes::STATE, get(state_handler))
        .route(routes::PERFORM, post(perform_handler))
        .with_state(rep)
}

async fn state_handler(State(rep): State<Arc<dyn CellClient>>) -> Response {
    match rep.state().await {
        Ok(state) => Json(state).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch rep state");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn perform_handler(
    State(rep): State<Arc<dyn CellClient>>,
    Json(work): Json<Work>,
) -> Response {
    match rep.perform(work).await {
        Ok(rejected) => Json(rejected).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Rep failed to perform work");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
