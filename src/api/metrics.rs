use axum::extract::State;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::Context;
use crate::error::ApiError;
use crate::store::metrics::Metrics;

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Aggregate and per-schedule metrics", body = Metrics)),
    tag = "metrics",
)]
#[tracing::instrument(name = "get_metrics", skip(ctx))]
async fn get_metrics(State(ctx): State<Context>) -> Result<axum::Json<Metrics>, ApiError> {
    let metrics = ctx.store.metrics().await.map_err(ApiError::from)?;
    Ok(axum::Json(metrics))
}

pub fn init_router() -> OpenApiRouter<Context> {
    OpenApiRouter::new().routes(routes!(get_metrics))
}
