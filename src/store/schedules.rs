use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{Sqlite, Transaction};

use crate::error::CoreError;
use crate::id;
use crate::store::Store;
use crate::store::models::{Schedule, ScheduleRow, ScheduleStatus, ScheduleType, ScheduleWithTarget};

impl Store {
    pub async fn create_schedule(
        &self,
        target_id: String,
        schedule_type: ScheduleType,
        interval_seconds: i64,
        duration_seconds: Option<i64>,
        max_retries: i64,
        request_timeout_seconds: i64,
    ) -> Result<Schedule, CoreError> {
        // Validates the target exists before creating a dangling schedule.
        self.get_target(&target_id).await?;

        let now = Utc::now();
        let id = id::generate("schedule");

        let (started_at, expires_at) = if schedule_type == ScheduleType::Window {
            let duration = duration_seconds.ok_or_else(|| {
                CoreError::InvalidState("duration_seconds is required for WINDOW schedules".to_string())
            })?;
            (Some(now), Some(now + ChronoDuration::seconds(duration)))
        } else {
            (None, None)
        };

        sqlx::query(
            r#"
            INSERT INTO schedules
                (id, target_id, schedule_type, interval_seconds, duration_seconds, status,
                 started_at, expires_at, last_run_at, max_retries, request_timeout_seconds,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'ACTIVE', $6, $7, NULL, $8, $9, $10, $10)
            "#,
        )
        .bind(&id)
        .bind(&target_id)
        .bind(schedule_type.to_string())
        .bind(interval_seconds)
        .bind(duration_seconds)
        .bind(started_at)
        .bind(expires_at)
        .bind(max_retries)
        .bind(request_timeout_seconds)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_schedule(&id).await
    }

    pub async fn get_schedule(&self, id: &str) -> Result<Schedule, CoreError> {
        let row: ScheduleRow = sqlx::query_as(r#"SELECT * FROM schedules WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Schedule::try_from(row)?)
    }

    pub async fn get_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> Result<Schedule, CoreError> {
        let row: ScheduleRow = sqlx::query_as(r#"SELECT * FROM schedules WHERE id = $1"#)
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(Schedule::try_from(row)?)
    }

    pub async fn list_schedules(&self) -> anyhow::Result<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> =
            sqlx::query_as(r#"SELECT * FROM schedules ORDER BY created_at DESC"#)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Schedule::try_from).collect()
    }

    /// Returns every ACTIVE schedule together with its target, the set the
    /// scheduler tick evaluates each poll. Issues one query per schedule to
    /// fetch its target; the active set is small enough that this is simpler
    /// than hand-splitting a joined row.
    pub async fn list_active_schedules_with_target(&self) -> anyhow::Result<Vec<ScheduleWithTarget>> {
        let rows: Vec<ScheduleRow> =
            sqlx::query_as(r#"SELECT * FROM schedules WHERE status = 'ACTIVE'"#)
                .fetch_all(&self.pool)
                .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let schedule = Schedule::try_from(row)?;
            let target = self.get_target(&schedule.target_id).await?;
            out.push(ScheduleWithTarget { schedule, target });
        }

        Ok(out)
    }

    /// Same selection as `list_active_schedules_with_target`, run against the
    /// ambient tick transaction so the read and the dispatch writes that
    /// follow it commit atomically.
    pub async fn list_active_schedules_with_target_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> anyhow::Result<Vec<ScheduleWithTarget>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(r#"SELECT * FROM schedules WHERE status = 'ACTIVE'"#)
            .fetch_all(&mut **tx)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let schedule = Schedule::try_from(row)?;
            let target = self.get_target_tx(tx, &schedule.target_id).await?;
            out.push(ScheduleWithTarget { schedule, target });
        }

        Ok(out)
    }

    pub async fn pause_schedule(&self, id: &str) -> Result<Schedule, CoreError> {
        let schedule = self.get_schedule(id).await?;
        if schedule.status != ScheduleStatus::Active {
            return Err(CoreError::InvalidState(
                "schedule is not ACTIVE, cannot pause".to_string(),
            ));
        }
        self.set_schedule_status(id, ScheduleStatus::Paused).await
    }

    pub async fn resume_schedule(&self, id: &str) -> Result<Schedule, CoreError> {
        let schedule = self.get_schedule(id).await?;
        if schedule.status != ScheduleStatus::Paused {
            return Err(CoreError::InvalidState(
                "schedule is not PAUSED, cannot resume".to_string(),
            ));
        }
        self.set_schedule_status(id, ScheduleStatus::Active).await
    }

    async fn set_schedule_status(
        &self,
        id: &str,
        status: ScheduleStatus,
    ) -> Result<Schedule, CoreError> {
        let now = Utc::now();
        sqlx::query(r#"UPDATE schedules SET status = $1, updated_at = $2 WHERE id = $3"#)
            .bind(status.to_string())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.get_schedule(id).await
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query(r#"DELETE FROM schedules WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }

        Ok(())
    }

    /// Marks every loaded WINDOW schedule whose `expires_at` has passed as
    /// COMPLETED. Called once at the top of each scheduler tick.
    pub async fn expire_windows(&self, now: chrono::DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET status = 'COMPLETED', updated_at = $1
            WHERE status = 'ACTIVE' AND schedule_type = 'WINDOW' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn expire_windows_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET status = 'COMPLETED', updated_at = $1
            WHERE status = 'ACTIVE' AND schedule_type = 'WINDOW' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Sets `last_run_at` to `now` for a dispatched schedule. Part of the same
    /// tick transaction that selected the schedule as due.
    pub async fn mark_dispatched(&self, id: &str, now: chrono::DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE schedules SET last_run_at = $1, updated_at = $1 WHERE id = $2"#)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn mark_dispatched_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE schedules SET last_run_at = $1, updated_at = $1 WHERE id = $2"#)
            .bind(now)
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn seed_target(store: &Store) -> anyhow::Result<String> {
        let target = store
            .create_target(
                "svc".to_string(),
                "http://example.com".to_string(),
                "GET".to_string(),
                HashMap::new(),
                None,
            )
            .await?;
        Ok(target.id)
    }

    #[tokio::test]
    async fn window_schedule_sets_expiry() -> anyhow::Result<()> {
        let store = Store::in_memory("schedules_window_expiry").await?;
        let target_id = seed_target(&store).await?;

        let schedule = store
            .create_schedule(target_id, ScheduleType::Window, 1, Some(10), 0, 30)
            .await?;

        assert!(schedule.started_at.is_some());
        assert!(schedule.expires_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn interval_schedule_requires_no_duration() -> anyhow::Result<()> {
        let store = Store::in_memory("schedules_interval_no_duration").await?;
        let target_id = seed_target(&store).await?;

        let schedule = store
            .create_schedule(target_id, ScheduleType::Interval, 5, None, 0, 30)
            .await?;

        assert!(schedule.expires_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn pause_then_resume_preserves_fields() -> anyhow::Result<()> {
        let store = Store::in_memory("schedules_pause_resume").await?;
        let target_id = seed_target(&store).await?;

        let schedule = store
            .create_schedule(target_id, ScheduleType::Interval, 5, None, 0, 30)
            .await?;

        let paused = store.pause_schedule(&schedule.id).await?;
        assert_eq!(paused.status, ScheduleStatus::Paused);

        let resumed = store.resume_schedule(&schedule.id).await?;
        assert_eq!(resumed.status, ScheduleStatus::Active);
        assert_eq!(resumed.interval_seconds, schedule.interval_seconds);
        assert_eq!(resumed.last_run_at, schedule.last_run_at);
        Ok(())
    }

    #[tokio::test]
    async fn pausing_non_active_schedule_is_rejected() -> anyhow::Result<()> {
        let store = Store::in_memory("schedules_pause_rejected").await?;
        let target_id = seed_target(&store).await?;

        let schedule = store
            .create_schedule(target_id, ScheduleType::Interval, 5, None, 0, 30)
            .await?;

        store.pause_schedule(&schedule.id).await?;
        assert!(store.pause_schedule(&schedule.id).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn expire_windows_marks_completed() -> anyhow::Result<()> {
        let store = Store::in_memory("schedules_expire_windows").await?;
        let target_id = seed_target(&store).await?;

        let schedule = store
            .create_schedule(target_id, ScheduleType::Window, 1, Some(0), 0, 30)
            .await?;

        let now = schedule.expires_at.unwrap();
        store.expire_windows(now).await?;

        let reloaded = store.get_schedule(&schedule.id).await?;
        assert_eq!(reloaded.status, ScheduleStatus::Completed);
        Ok(())
    }
}
