use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleType {
    Interval,
    Window,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleType::Interval => write!(f, "INTERVAL"),
            ScheduleType::Window => write!(f, "WINDOW"),
        }
    }
}

impl FromStr for ScheduleType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTERVAL" => Ok(ScheduleType::Interval),
            "WINDOW" => Ok(ScheduleType::Window),
            other => Err(anyhow::anyhow!("unknown schedule_type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Completed,
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleStatus::Active => write!(f, "ACTIVE"),
            ScheduleStatus::Paused => write!(f, "PAUSED"),
            ScheduleStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ScheduleStatus::Active),
            "PAUSED" => Ok(ScheduleStatus::Paused),
            "COMPLETED" => Ok(ScheduleStatus::Completed),
            other => Err(anyhow::anyhow!("unknown schedule status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "PENDING"),
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RunStatus::Pending),
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(anyhow::anyhow!("unknown run status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorType {
    Timeout,
    Dns,
    Connection,
    Http4xx,
    Http5xx,
    Unknown,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorType::Timeout => write!(f, "TIMEOUT"),
            ErrorType::Dns => write!(f, "DNS"),
            ErrorType::Connection => write!(f, "CONNECTION"),
            ErrorType::Http4xx => write!(f, "HTTP_4XX"),
            ErrorType::Http5xx => write!(f, "HTTP_5XX"),
            ErrorType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FromStr for ErrorType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TIMEOUT" => Ok(ErrorType::Timeout),
            "DNS" => Ok(ErrorType::Dns),
            "CONNECTION" => Ok(ErrorType::Connection),
            "HTTP_4XX" => Ok(ErrorType::Http4xx),
            "HTTP_5XX" => Ok(ErrorType::Http5xx),
            "UNKNOWN" => Ok(ErrorType::Unknown),
            other => Err(anyhow::anyhow!("unknown error_type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body_template: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TargetRow {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: String,
    pub body_template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TargetRow> for Target {
    type Error = anyhow::Error;

    fn try_from(row: TargetRow) -> Result<Self, Self::Error> {
        Ok(Target {
            id: row.id,
            name: row.name,
            url: row.url,
            method: row.method,
            headers: serde_json::from_str(&row.headers)?,
            body_template: row
                .body_template
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    pub id: String,
    pub target_id: String,
    pub schedule_type: ScheduleType,
    pub interval_seconds: i64,
    pub duration_seconds: Option<i64>,
    pub status: ScheduleStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub max_retries: i64,
    pub request_timeout_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScheduleRow {
    pub id: String,
    pub target_id: String,
    pub schedule_type: String,
    pub interval_seconds: i64,
    pub duration_seconds: Option<i64>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub max_retries: i64,
    pub request_timeout_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = anyhow::Error;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Schedule {
            id: row.id,
            target_id: row.target_id,
            schedule_type: row.schedule_type.parse()?,
            interval_seconds: row.interval_seconds,
            duration_seconds: row.duration_seconds,
            status: row.status.parse()?,
            started_at: row.started_at,
            expires_at: row.expires_at,
            last_run_at: row.last_run_at,
            max_retries: row.max_retries,
            request_timeout_seconds: row.request_timeout_seconds,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleWithTarget {
    pub schedule: Schedule,
    pub target: Target,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Run {
    pub id: String,
    pub schedule_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub id: String,
    pub schedule_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for Run {
    type Error = anyhow::Error;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(Run {
            id: row.id,
            schedule_id: row.schedule_id,
            status: row.status.parse()?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attempt {
    pub id: String,
    pub run_id: String,
    pub attempt_number: i64,
    pub status_code: Option<i64>,
    pub latency_ms: Option<f64>,
    pub response_size_bytes: Option<i64>,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: String,
    pub run_id: String,
    pub attempt_number: i64,
    pub status_code: Option<i64>,
    pub latency_ms: Option<f64>,
    pub response_size_bytes: Option<i64>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = anyhow::Error;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            run_id: row.run_id,
            attempt_number: row.attempt_number,
            status_code: row.status_code,
            latency_ms: row.latency_ms,
            response_size_bytes: row.response_size_bytes,
            error_type: row.error_type.map(|s| s.parse()).transpose()?,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunWithAttempts {
    #[serde(flatten)]
    pub run: Run,
    pub attempts: Vec<Attempt>,
}
