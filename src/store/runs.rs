use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use crate::error::CoreError;
use crate::id;
use crate::store::Store;
use crate::store::models::{
    Attempt, AttemptRow, ErrorType, Run, RunRow, RunStatus, RunWithAttempts,
};

#[derive(Debug, Default, Clone)]
pub struct RunFilters {
    pub schedule_id: Option<String>,
    pub status: Option<RunStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Store {
    pub async fn create_run(&self, schedule_id: &str, started_at: DateTime<Utc>) -> anyhow::Result<Run> {
        let id = id::generate("run");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO runs (id, schedule_id, status, started_at, completed_at, created_at)
            VALUES ($1, $2, 'PENDING', $3, NULL, $4)
            "#,
        )
        .bind(&id)
        .bind(schedule_id)
        .bind(started_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(self.get_run(&id).await?)
    }

    /// Same insert as `create_run`, against an ambient transaction.
    pub async fn create_run_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        schedule_id: &str,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<Run> {
        let id = id::generate("run");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO runs (id, schedule_id, status, started_at, completed_at, created_at)
            VALUES ($1, $2, 'PENDING', $3, NULL, $4)
            "#,
        )
        .bind(&id)
        .bind(schedule_id)
        .bind(started_at)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(self.get_run_tx(tx, &id).await?)
    }

    pub async fn get_run(&self, id: &str) -> Result<Run, CoreError> {
        let row: RunRow = sqlx::query_as(r#"SELECT * FROM runs WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Run::try_from(row)?)
    }

    pub async fn get_run_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> Result<Run, CoreError> {
        let row: RunRow = sqlx::query_as(r#"SELECT * FROM runs WHERE id = $1"#)
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(Run::try_from(row)?)
    }

    pub async fn get_run_with_attempts(&self, id: &str) -> Result<RunWithAttempts, CoreError> {
        let run = self.get_run(id).await?;
        let attempts = self.list_attempts(id).await.map_err(CoreError::Other)?;
        Ok(RunWithAttempts { run, attempts })
    }

    pub async fn complete_run(&self, id: &str, status: RunStatus) -> anyhow::Result<Run> {
        let now = Utc::now();
        sqlx::query(r#"UPDATE runs SET status = $1, completed_at = $2 WHERE id = $3"#)
            .bind(status.to_string())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(self.get_run(id).await?)
    }

    pub async fn complete_run_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        status: RunStatus,
    ) -> anyhow::Result<Run> {
        let now = Utc::now();
        sqlx::query(r#"UPDATE runs SET status = $1, completed_at = $2 WHERE id = $3"#)
            .bind(status.to_string())
            .bind(now)
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(self.get_run_tx(tx, id).await?)
    }

    pub async fn list_runs(&self, filters: &RunFilters) -> anyhow::Result<Vec<Run>> {
        let mut sql = String::from("SELECT * FROM runs WHERE 1=1");
        if filters.schedule_id.is_some() {
            sql.push_str(" AND schedule_id = ?");
        }
        if filters.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filters.start_time.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if filters.end_time.is_some() {
            sql.push_str(" AND created_at <= ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, RunRow>(&sql);
        if let Some(schedule_id) = &filters.schedule_id {
            query = query.bind(schedule_id);
        }
        if let Some(status) = &filters.status {
            query = query.bind(status.to_string());
        }
        if let Some(start_time) = filters.start_time {
            query = query.bind(start_time);
        }
        if let Some(end_time) = filters.end_time {
            query = query.bind(end_time);
        }
        query = query.bind(filters.limit).bind(filters.offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Run::try_from).collect()
    }

    pub async fn add_attempt(
        &self,
        run_id: &str,
        attempt_number: i64,
        status_code: Option<i64>,
        latency_ms: Option<f64>,
        response_size_bytes: Option<i64>,
        error_type: Option<ErrorType>,
        error_message: Option<String>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Attempt> {
        let id = id::generate("attempt");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO attempts
                (id, run_id, attempt_number, status_code, latency_ms, response_size_bytes,
                 error_type, error_message, started_at, completed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&id)
        .bind(run_id)
        .bind(attempt_number)
        .bind(status_code)
        .bind(latency_ms)
        .bind(response_size_bytes)
        .bind(error_type.map(|e| e.to_string()))
        .bind(error_message)
        .bind(started_at)
        .bind(completed_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row: AttemptRow = sqlx::query_as(r#"SELECT * FROM attempts WHERE id = $1"#)
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Attempt::try_from(row)?)
    }

    /// Same insert as `add_attempt`, against an ambient transaction — used by
    /// the retry loop so every attempt in a Run commits together with the
    /// Run it belongs to.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_attempt_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        run_id: &str,
        attempt_number: i64,
        status_code: Option<i64>,
        latency_ms: Option<f64>,
        response_size_bytes: Option<i64>,
        error_type: Option<ErrorType>,
        error_message: Option<String>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Attempt> {
        let id = id::generate("attempt");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO attempts
                (id, run_id, attempt_number, status_code, latency_ms, response_size_bytes,
                 error_type, error_message, started_at, completed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&id)
        .bind(run_id)
        .bind(attempt_number)
        .bind(status_code)
        .bind(latency_ms)
        .bind(response_size_bytes)
        .bind(error_type.map(|e| e.to_string()))
        .bind(error_message)
        .bind(started_at)
        .bind(completed_at)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let row: AttemptRow = sqlx::query_as(r#"SELECT * FROM attempts WHERE id = $1"#)
            .bind(&id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(Attempt::try_from(row)?)
    }

    pub async fn list_attempts(&self, run_id: &str) -> anyhow::Result<Vec<Attempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"SELECT * FROM attempts WHERE run_id = $1 ORDER BY attempt_number ASC"#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Attempt::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::store::models::ScheduleType;

    async fn seed_schedule(store: &Store) -> anyhow::Result<String> {
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
            .create_schedule(target.id, ScheduleType::Interval, 5, None, 1, 30)
            .await?;
        Ok(schedule.id)
    }

    #[tokio::test]
    async fn run_lifecycle_pending_to_success() -> anyhow::Result<()> {
        let store = Store::in_memory("runs_lifecycle").await?;
        let schedule_id = seed_schedule(&store).await?;

        let run = store.create_run(&schedule_id, Utc::now()).await?;
        assert_eq!(run.status, RunStatus::Pending);

        store
            .add_attempt(
                &run.id,
                1,
                Some(200),
                Some(12.5),
                Some(3),
                None,
                None,
                Utc::now(),
                Some(Utc::now()),
            )
            .await?;

        let completed = store.complete_run(&run.id, RunStatus::Success).await?;
        assert_eq!(completed.status, RunStatus::Success);
        assert!(completed.completed_at.is_some());

        let with_attempts = store.get_run_with_attempts(&run.id).await?;
        assert_eq!(with_attempts.attempts.len(), 1);
        assert_eq!(with_attempts.attempts[0].attempt_number, 1);
        Ok(())
    }

    #[tokio::test]
    async fn attempt_numbers_are_contiguous() -> anyhow::Result<()> {
        let store = Store::in_memory("runs_attempt_numbers").await?;
        let schedule_id = seed_schedule(&store).await?;
        let run = store.create_run(&schedule_id, Utc::now()).await?;

        for n in 1..=3 {
            store
                .add_attempt(
                    &run.id,
                    n,
                    None,
                    Some(5.0),
                    None,
                    Some(ErrorType::Timeout),
                    Some("timed out".to_string()),
                    Utc::now(),
                    Some(Utc::now()),
                )
                .await?;
        }

        let attempts = store.list_attempts(&run.id).await?;
        let numbers: Vec<i64> = attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn list_runs_filters_by_schedule_and_status() -> anyhow::Result<()> {
        let store = Store::in_memory("runs_list_filters").await?;
        let schedule_id = seed_schedule(&store).await?;

        let run_a = store.create_run(&schedule_id, Utc::now()).await?;
        store.complete_run(&run_a.id, RunStatus::Success).await?;

        let run_b = store.create_run(&schedule_id, Utc::now()).await?;
        store.complete_run(&run_b.id, RunStatus::Failed).await?;

        let filters = RunFilters {
            schedule_id: Some(schedule_id.clone()),
            status: Some(RunStatus::Success),
            start_time: None,
            end_time: None,
            limit: 100,
            offset: 0,
        };

        let results = store.list_runs(&filters).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, run_a.id);
        Ok(())
    }
}
