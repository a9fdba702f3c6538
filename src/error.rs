use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    response::IntoResponse,
};
use http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

/// Internal error type shared by the store, executor, and scheduler engine.
#[derive(Debug)]
pub enum CoreError {
    NotFound,
    InvalidState(String),
    Other(anyhow::Error),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::NotFound => write!(f, "not found"),
            CoreError::InvalidState(msg) => write!(f, "{msg}"),
            CoreError::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(value: sqlx::Error) -> Self {
        if matches!(value, sqlx::Error::RowNotFound) {
            return CoreError::NotFound;
        }
        CoreError::Other(value.into())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(value: anyhow::Error) -> Self {
        CoreError::Other(value)
    }
}

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    #[serde(skip_serializing)]
    #[schema(ignore)]
    code: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.code, Json(self)).into_response()
    }
}

impl ApiError {
    pub fn internal_server_error(message: Option<&str>) -> Self {
        ApiError {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.unwrap_or("internal server error").to_string(),
        }
    }

    pub fn not_found() -> Self {
        ApiError {
            code: StatusCode::NOT_FOUND,
            message: "not found".to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            code: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        match value {
            JsonRejection::JsonDataError(e) => ApiError::bad_request(e.body_text()),
            JsonRejection::JsonSyntaxError(e) => ApiError::bad_request(e.body_text()),
            JsonRejection::MissingJsonContentType(e) => ApiError::bad_request(e.body_text()),
            JsonRejection::BytesRejection(e) => ApiError::bad_request(e.body_text()),
            _ => ApiError::bad_request("invalid request body"),
        }
    }
}

impl From<String> for ApiError {
    fn from(value: String) -> Self {
        ApiError::internal_server_error(Some(&value))
    }
}

impl From<&str> for ApiError {
    fn from(value: &str) -> Self {
        ApiError::internal_server_error(Some(value))
    }
}

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::NotFound => ApiError::not_found(),
            CoreError::InvalidState(msg) => ApiError::bad_request(msg),
            CoreError::Other(err) => {
                tracing::error!(error = ?err, "internal error");
                ApiError::internal_server_error(None)
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        ApiError::from(CoreError::from(value))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        ApiError::from(CoreError::from(value))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiListResponse<T: Serialize + ToSchema> {
    pub data: Vec<T>,
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
}

impl<T> IntoResponse for ApiListResponse<T>
where
    T: Serialize + ToSchema,
{
    fn into_response(self) -> axum::response::Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
