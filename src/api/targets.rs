use std::collections::HashMap;

use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::Context;
use crate::error::{ApiError, ApiListResponse, JsonBody};
use crate::store::models::Target;

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

fn validate_url(url: &str) -> Result<(), ApiError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "url must start with http:// or https://",
        ))
    }
}

fn validate_method(method: &str) -> Result<String, ApiError> {
    let upper = method.to_uppercase();
    if ALLOWED_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ApiError::bad_request(format!(
            "method must be one of {ALLOWED_METHODS:?}"
        )))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTarget {
    pub name: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body_template: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateTarget {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub body_template: Option<Value>,
}

#[utoipa::path(
    post,
    path = "/targets",
    request_body = CreateTarget,
    responses(
        (status = 201, description = "Target created", body = Target),
        (status = 400, description = "Invalid target", body = ApiError),
    ),
    tag = "targets",
)]
#[tracing::instrument(name = "create_target", skip(ctx, body))]
async fn create_target(
    State(ctx): State<Context>,
    JsonBody(body): JsonBody<CreateTarget>,
) -> Result<(http::StatusCode, axum::Json<Target>), ApiError> {
    validate_url(&body.url)?;
    let method = validate_method(&body.method)?;

    let target = ctx
        .store
        .create_target(body.name, body.url, method, body.headers, body.body_template)
        .await?;

    Ok((http::StatusCode::CREATED, axum::Json(target)))
}

#[utoipa::path(
    get,
    path = "/targets",
    responses((status = 200, description = "List targets", body = ApiListResponse<Target>)),
    tag = "targets",
)]
#[tracing::instrument(name = "list_targets", skip(ctx))]
async fn list_targets(State(ctx): State<Context>) -> Result<ApiListResponse<Target>, ApiError> {
    let targets = ctx.store.list_targets().await.map_err(ApiError::from)?;
    let count = targets.len();
    Ok(ApiListResponse {
        data: targets,
        count,
        limit: count as i64,
        offset: 0,
    })
}

#[utoipa::path(
    get,
    path = "/targets/{id}",
    params(("id" = String, Path, description = "Target id")),
    responses(
        (status = 200, description = "Target", body = Target),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "targets",
)]
#[tracing::instrument(name = "get_target", skip(ctx))]
async fn get_target(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<axum::Json<Target>, ApiError> {
    let target = ctx.store.get_target(&id).await?;
    Ok(axum::Json(target))
}

#[utoipa::path(
    put,
    path = "/targets/{id}",
    params(("id" = String, Path, description = "Target id")),
    request_body = UpdateTarget,
    responses(
        (status = 200, description = "Target updated", body = Target),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "targets",
)]
#[tracing::instrument(name = "update_target", skip(ctx, body))]
async fn update_target(
    State(ctx): State<Context>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateTarget>,
) -> Result<axum::Json<Target>, ApiError> {
    if let Some(url) = &body.url {
        validate_url(url)?;
    }
    let method = body.method.map(|m| validate_method(&m)).transpose()?;
    let body_template = body.body_template.map(|v| if v.is_null() { None } else { Some(v) });

    let target = ctx
        .store
        .update_target(&id, body.name, body.url, method, body.headers, body_template)
        .await?;

    Ok(axum::Json(target))
}

#[utoipa::path(
    delete,
    path = "/targets/{id}",
    params(("id" = String, Path, description = "Target id")),
    responses(
        (status = 204, description = "Target deleted"),
        (status = 404, description = "Not found", body = ApiError),
    ),
    tag = "targets",
)]
#[tracing::instrument(name = "delete_target", skip(ctx))]
async fn delete_target(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<http::StatusCode, ApiError> {
    ctx.store.delete_target(&id).await?;
    Ok(http::StatusCode::NO_CONTENT)
}

pub fn init_router() -> OpenApiRouter<Context> {
    OpenApiRouter::new()
        .routes(routes!(create_target, list_targets))
        .routes(routes!(get_target, update_target, delete_target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_url_without_scheme() {
        assert!(validate_url("example.com").is_err());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("https://example.com").is_ok());
    }

    #[test]
    fn uppercases_and_validates_method() {
        assert_eq!(validate_method("get").unwrap(), "GET");
        assert!(validate_method("TRACE").is_err());
    }
}
