use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use utoipa::ToSchema;

use crate::store::Store;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduleMetrics {
    pub schedule_id: String,
    pub total_runs: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_latency_ms: Option<f64>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Metrics {
    pub total_schedules: i64,
    pub active_schedules: i64,
    pub paused_schedules: i64,
    pub total_runs: i64,
    pub total_success: i64,
    pub total_failures: i64,
    pub avg_latency_ms: Option<f64>,
    pub schedules: Vec<ScheduleMetrics>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Store {
    pub async fn metrics(&self) -> anyhow::Result<Metrics> {
        let schedule_counts = self.count_schedules().await?;
        let run_counts = self.count_runs(None).await?;
        let avg_latency_ms = self.avg_latency(None).await?;
        let schedules = self.per_schedule_metrics().await?;

        Ok(Metrics {
            total_schedules: schedule_counts.0,
            active_schedules: schedule_counts.1,
            paused_schedules: schedule_counts.2,
            total_runs: run_counts.0,
            total_success: run_counts.1,
            total_failures: run_counts.2,
            avg_latency_ms,
            schedules,
        })
    }

    async fn count_schedules(&self) -> anyhow::Result<(i64, i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                SUM(CASE WHEN status = 'ACTIVE' THEN 1 ELSE 0 END) as active,
                SUM(CASE WHEN status = 'PAUSED' THEN 1 ELSE 0 END) as paused
            FROM schedules
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((
            row.try_get::<i64, _>("total")?,
            row.try_get::<Option<i64>, _>("active")?.unwrap_or(0),
            row.try_get::<Option<i64>, _>("paused")?.unwrap_or(0),
        ))
    }

    async fn count_runs(&self, schedule_id: Option<&str>) -> anyhow::Result<(i64, i64, i64)> {
        let sql = match schedule_id {
            Some(_) => {
                r#"
                SELECT
                    COUNT(*) as total,
                    SUM(CASE WHEN status = 'SUCCESS' THEN 1 ELSE 0 END) as success,
                    SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END) as failure
                FROM runs
                WHERE schedule_id = $1
                "#
            }
            None => {
                r#"
                SELECT
                    COUNT(*) as total,
                    SUM(CASE WHEN status = 'SUCCESS' THEN 1 ELSE 0 END) as success,
                    SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END) as failure
                FROM runs
                "#
            }
        };

        let mut query = sqlx::query(sql);
        if let Some(id) = schedule_id {
            query = query.bind(id);
        }
        let row = query.fetch_one(&self.pool).await?;

        Ok((
            row.try_get::<i64, _>("total")?,
            row.try_get::<Option<i64>, _>("success")?.unwrap_or(0),
            row.try_get::<Option<i64>, _>("failure")?.unwrap_or(0),
        ))
    }

    async fn avg_latency(&self, schedule_id: Option<&str>) -> anyhow::Result<Option<f64>> {
        let sql = match schedule_id {
            Some(_) => {
                r#"
                SELECT AVG(a.latency_ms) as avg_latency
                FROM attempts a
                JOIN runs r ON r.id = a.run_id
                WHERE r.schedule_id = $1
                "#
            }
            None => r#"SELECT AVG(latency_ms) as avg_latency FROM attempts"#,
        };

        let mut query = sqlx::query(sql);
        if let Some(id) = schedule_id {
            query = query.bind(id);
        }
        let row = query.fetch_one(&self.pool).await?;

        Ok(row
            .try_get::<Option<f64>, _>("avg_latency")?
            .map(round2))
    }

    async fn last_run_at(&self, schedule_id: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(r#"SELECT last_run_at FROM schedules WHERE id = $1"#)
            .bind(schedule_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<Option<DateTime<Utc>>, _>("last_run_at")?)
    }

    async fn per_schedule_metrics(&self) -> anyhow::Result<Vec<ScheduleMetrics>> {
        let schedules = self.list_schedules().await?;
        let mut out = Vec::with_capacity(schedules.len());

        for schedule in schedules {
            let (total_runs, success_count, failure_count) =
                self.count_runs(Some(&schedule.id)).await?;
            let avg_latency_ms = self.avg_latency(Some(&schedule.id)).await?;
            let last_run_at = self.last_run_at(&schedule.id).await?;

            out.push(ScheduleMetrics {
                schedule_id: schedule.id,
                total_runs,
                success_count,
                failure_count,
                avg_latency_ms,
                last_run_at,
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{RunStatus, ScheduleType};
    use std::collections::HashMap;

    #[tokio::test]
    async fn metrics_aggregate_counts_and_latency() -> anyhow::Result<()> {
        let store = Store::in_memory("metrics_aggregate").await?;

        let target = store
            .create_target(
                "svc".to_string(),
                "http://example.com".to_string(),
                "GET".to_string(),
                HashMap::new(),
                None,
            )
            .await?;

        let schedule = store
            .create_schedule(target.id, ScheduleType::Interval, 5, None, 0, 30)
            .await?;

        let run = store.create_run(&schedule.id, Utc::now()).await?;
        store
            .add_attempt(
                &run.id,
                1,
                Some(200),
                Some(10.0),
                Some(3),
                None,
                None,
                Utc::now(),
                Some(Utc::now()),
            )
            .await?;
        store.complete_run(&run.id, RunStatus::Success).await?;

        let metrics = store.metrics().await?;
        assert_eq!(metrics.total_schedules, 1);
        assert_eq!(metrics.active_schedules, 1);
        assert_eq!(metrics.total_runs, 1);
        assert_eq!(metrics.total_success, 1);
        assert_eq!(metrics.avg_latency_ms, Some(10.0));
        assert_eq!(metrics.schedules.len(), 1);
        assert_eq!(metrics.schedules[0].total_runs, 1);
        Ok(())
    }

    #[tokio::test]
    async fn metrics_with_no_runs_has_null_latency() -> anyhow::Result<()> {
        let store = Store::in_memory("metrics_no_runs").await?;
        let metrics = store.metrics().await?;
        assert_eq!(metrics.total_runs, 0);
        assert_eq!(metrics.avg_latency_ms, None);
        Ok(())
    }
}
