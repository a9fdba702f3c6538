use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::Context;
use crate::error::{ApiError, ApiListResponse};
use crate::store::models::{Run, RunStatus, RunWithAttempts};
use crate::store::runs::RunFilters;

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListRunsQuery {
    pub schedule_id: Option<String>,
    pub status: Option<RunStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl From<ListRunsQuery> for RunFilters {
    fn from(query: ListRunsQuery) -> Self {
        RunFilters {
            schedule_id: query.schedule_id,
            status: query.status,
            start_time: query.start_time,
            end_time: query.end_time,
            limit: query.limit,
            offset: query.offset,
        }
    }
}

#[utoipa::path(
    get,
    path = "/runs",
    params(ListRunsQuery),
    responses((status = 200, description = "List runs", body = ApiListResponse<Run>)),
    tag = "runs",
)]
#[tracing::instrument(name = "list_runs", skip(ctx))]
async fn list_runs(
    State(ctx): State<Context>,
    Query(query): Query<ListRunsQuery>,
) -> Result<ApiListResponse<Run>, ApiError> {
    if !(1..=1000).contains(&query.limit) {
        return Err(ApiError::bad_request("limit must be between 1 and 1000"));
    }
    if query.offset < 0 {
        return Err(ApiError::bad_request("offset must be >= 0"));
    }

    let limit = query.limit;
    let offset = query.offset;
    let filters: RunFilters = query.into();

    let data = ctx.store.list_runs(&filters).await.map_err(ApiError::from)?;

    let count = data.len();
    Ok(ApiListResponse {
        data,
        count,
        limit,
        offset,
    })
}

#[utoipa::path(
    get,
    path = "/runs/{id}",
    params(("id" = String, Path, description = "Run id")),
    responses(
        (status = 200, description = "Run with its attempts", body = RunWithAttempts),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "runs",
)]
#[tracing::instrument(name = "get_run", skip(ctx))]
async fn get_run(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<axum::Json<RunWithAttempts>, ApiError> {
    let run = ctx.store.get_run_with_attempts(&id).await?;
    Ok(axum::Json(run))
}

pub fn init_router() -> OpenApiRouter<Context> {
    OpenApiRouter::new().routes(routes!(list_runs)).routes(routes!(get_run))
}
