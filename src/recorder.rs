use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use crate::store::Store;
use crate::store::models::{Attempt, Run, RunStatus};

/// Thin, stateless wrapper around the store's Run/Attempt operations. Exists
/// so the scheduler engine names these three operations the way the design
/// describes them, instead of reaching into store internals directly. Every
/// method takes the caller's ambient transaction and never commits it —
/// the caller owns the commit (or rollback) once the full sequence succeeds.
#[derive(Debug, Clone)]
pub struct Recorder<'a> {
    store: &'a Store,
}

impl<'a> Recorder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub async fn create_run(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        schedule_id: &str,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<Run> {
        self.store.create_run_tx(tx, schedule_id, started_at).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_attempt(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        run_id: &str,
        attempt_number: i64,
        attempt: &Attempt,
    ) -> anyhow::Result<Attempt> {
        self.store
            .add_attempt_tx(
                tx,
                run_id,
                attempt_number,
                attempt.status_code,
                attempt.latency_ms,
                attempt.response_size_bytes,
                attempt.error_type,
                attempt.error_message.clone(),
                attempt.started_at,
                attempt.completed_at,
            )
            .await
    }

    pub async fn complete_run(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        run_id: &str,
        status: RunStatus,
    ) -> anyhow::Result<Run> {
        self.store.complete_run_tx(tx, run_id, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::ScheduleType;
    use std::collections::HashMap;

    #[tokio::test]
    async fn create_add_complete_round_trip() -> anyhow::Result<()> {
        let store = Store::in_memory("recorder_round_trip").await?;
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

        let recorder = Recorder::new(&store);
        let mut tx = store.begin().await?;
        let run = recorder.create_run(&mut tx, &schedule.id, Utc::now()).await?;
        assert_eq!(run.status, RunStatus::Pending);

        let attempt = Attempt {
            id: "attempt_placeholder".to_string(),
            run_id: String::new(),
            attempt_number: 0,
            status_code: Some(200),
            latency_ms: Some(1.0),
            response_size_bytes: Some(0),
            error_type: None,
            error_message: None,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            created_at: Utc::now(),
        };

        recorder.add_attempt(&mut tx, &run.id, 1, &attempt).await?;
        let completed = recorder.complete_run(&mut tx, &run.id, RunStatus::Success).await?;
        assert_eq!(completed.status, RunStatus::Success);
        tx.commit().await?;

        let reloaded = store.get_run(&run.id).await?;
        assert_eq!(reloaded.status, RunStatus::Success);
        Ok(())
    }
}
