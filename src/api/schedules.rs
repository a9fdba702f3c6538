use axum::extract::{Path, State};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::Context;
use crate::error::{ApiError, ApiListResponse};
use crate::store::models::{Schedule, ScheduleType};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSchedule {
    pub target_id: String,
    pub schedule_type: ScheduleType,
    pub interval_seconds: i64,
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub max_retries: i64,
    pub request_timeout_seconds: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/schedules",
    request_body = CreateSchedule,
    responses(
        (status = 201, description = "Schedule created", body = Schedule),
        (status = 400, description = "Invalid schedule", body = ApiError),
        (status = 404, description = "Target not found", body = ApiError),
    ),
    tag = "schedules",
)]
#[tracing::instrument(name = "create_schedule", skip(ctx, body))]
async fn create_schedule(
    State(ctx): State<Context>,
    crate::error::JsonBody(body): crate::error::JsonBody<CreateSchedule>,
) -> Result<(http::StatusCode, axum::Json<Schedule>), ApiError> {
    if body.interval_seconds < 1 {
        return Err(ApiError::bad_request("interval_seconds must be >= 1"));
    }
    let timeout = body.request_timeout_seconds.unwrap_or(ctx.default_request_timeout as i64);
    if timeout < 1 {
        return Err(ApiError::bad_request("request_timeout_seconds must be >= 1"));
    }
    if body.schedule_type == ScheduleType::Window && body.duration_seconds.is_none() {
        return Err(ApiError::bad_request(
            "duration_seconds is required for WINDOW schedules",
        ));
    }

    let schedule = ctx
        .store
        .create_schedule(
            body.target_id,
            body.schedule_type,
            body.interval_seconds,
            body.duration_seconds,
            body.max_retries,
            timeout,
        )
        .await?;

    Ok((http::StatusCode::CREATED, axum::Json(schedule)))
}

#[utoipa::path(
    get,
    path = "/schedules",
    responses((status = 200, description = "List schedules", body = ApiListResponse<Schedule>)),
    tag = "schedules",
)]
#[tracing::instrument(name = "list_schedules", skip(ctx))]
async fn list_schedules(State(ctx): State<Context>) -> Result<ApiListResponse<Schedule>, ApiError> {
    let schedules = ctx.store.list_schedules().await.map_err(ApiError::from)?;
    let count = schedules.len();
    Ok(ApiListResponse {
        data: schedules,
        count,
        limit: count as i64,
        offset: 0,
    })
}

#[utoipa::path(
    get,
    path = "/schedules/{id}",
    params(("id" = String, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Schedule", body = Schedule),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "schedules",
)]
#[tracing::instrument(name = "get_schedule", skip(ctx))]
async fn get_schedule(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<axum::Json<Schedule>, ApiError> {
    let schedule = ctx.store.get_schedule(&id).await?;
    Ok(axum::Json(schedule))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/pause",
    params(("id" = String, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Schedule paused", body = Schedule),
        (status = 400, description = "Schedule is not ACTIVE", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "schedules",
)]
#[tracing::instrument(name = "pause_schedule", skip(ctx))]
async fn pause_schedule(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<axum::Json<Schedule>, ApiError> {
    let schedule = ctx.store.pause_schedule(&id).await?;
    Ok(axum::Json(schedule))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/resume",
    params(("id" = String, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Schedule resumed", body = Schedule),
        (status = 400, description = "Schedule is not PAUSED", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "schedules",
)]
#[tracing::instrument(name = "resume_schedule", skip(ctx))]
async fn resume_schedule(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<axum::Json<Schedule>, ApiError> {
    let schedule = ctx.store.resume_schedule(&id).await?;
    Ok(axum::Json(schedule))
}

#[utoipa::path(
    delete,
    path = "/schedules/{id}",
    params(("id" = String, Path, description = "Schedule id")),
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "schedules",
)]
#[tracing::instrument(name = "delete_schedule", skip(ctx))]
async fn delete_schedule(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<http::StatusCode, ApiError> {
    ctx.store.delete_schedule(&id).await?;
    Ok(http::StatusCode::NO_CONTENT)
}

pub fn init_router() -> OpenApiRouter<Context> {
    OpenApiRouter::new()
        .routes(routes!(create_schedule, list_schedules))
        .routes(routes!(get_schedule, delete_schedule))
        .routes(routes!(pause_schedule))
        .routes(routes!(resume_schedule))
}
