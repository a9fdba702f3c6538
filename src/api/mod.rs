mod metrics;
mod runs;
mod schedules;
mod targets;

use axum::{Json, Router, routing::get};
use serde_json::Value;
use utoipa::OpenApi;
use utoipa::openapi::OpenApi as OpenApiSpec;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

use crate::ApiOptions;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct Config {
    port: u16,
    store: Store,
    default_request_timeout: u64,
}

impl Config {
    pub async fn from_cli(options: ApiOptions, store: Store) -> Self {
        Self {
            port: options.port,
            store,
            default_request_timeout: options.default_request_timeout,
        }
    }
}

#[derive(OpenApi)]
#[openapi(info(title = "api-scheduler"))]
struct MyOpenApiSpec;

#[derive(Debug, Clone)]
pub struct Context {
    pub store: Store,
    pub default_request_timeout: u64,
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    let context = Context {
        store: config.store,
        default_request_timeout: config.default_request_timeout,
    };

    let router = create_router();
    let spec = create_spec();
    let scalar = Scalar::with_url("/docs", spec);

    let app = router
        .route("/docs/openapi.json", get(openapi_json))
        .merge(scalar)
        .with_state(context);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_router() -> OpenApiRouter<Context> {
    OpenApiRouter::new()
        .route("/health", get(health))
        .merge(targets::init_router())
        .merge(schedules::init_router())
        .merge(runs::init_router())
        .merge(metrics::init_router())
}

fn create_router() -> Router<Context> {
    let (router, _) = init_router().split_for_parts();
    router
}

fn create_spec() -> OpenApiSpec {
    let (_, spec) = init_router().split_for_parts();
    MyOpenApiSpec::openapi().merge_from(spec)
}

async fn openapi_json() -> Json<Value> {
    Json(serde_json::to_value(create_spec()).unwrap())
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_route_returns_ok() {
        let store = Store::in_memory("api_router_health").await.unwrap();
        let context = Context {
            store,
            default_request_timeout: 30,
        };
        let router = create_router().with_state(context);

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
    }
}
