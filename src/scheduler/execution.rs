use crate::error::CoreError;
use crate::recorder::Recorder;
use crate::scheduler::SchedulerContext;
use crate::store::models::RunStatus;

/// Runs one dispatch end to end: opens a Run, drives the immediate retry
/// loop against the executor, and finalizes the Run. Always removes its
/// schedule from the in-flight set on the way out, success or failure.
#[tracing::instrument(name = "execute_schedule", skip(ctx), fields(schedule_id = %schedule_id))]
pub async fn execute_schedule(ctx: SchedulerContext, schedule_id: String) {
    if let Err(err) = run(&ctx, &schedule_id).await {
        tracing::error!(schedule_id, error = ?err, "execution task failed");
    }

    ctx.in_flight.lock().await.remove(&schedule_id);
}

/// Opens one transaction spanning the whole dispatch (create Run, every
/// Attempt, complete Run) and commits it once. Any error raised while
/// recording an attempt is caught rather than propagated, so the Run is
/// always finalized — as FAILED on such an error — instead of being left
/// PENDING forever.
#[tracing::instrument(name = "execute_run", skip(ctx), fields(schedule_id = %schedule_id))]
async fn run(ctx: &SchedulerContext, schedule_id: &str) -> anyhow::Result<()> {
    let mut tx = ctx.store.begin().await?;

    let schedule = match ctx.store.get_schedule_tx(&mut tx, schedule_id).await {
        Ok(schedule) => schedule,
        Err(CoreError::NotFound) => {
            tracing::warn!(schedule_id, "schedule deleted before execution started");
            tx.commit().await?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let target = match ctx.store.get_target_tx(&mut tx, &schedule.target_id).await {
        Ok(target) => target,
        Err(CoreError::NotFound) => {
            tracing::warn!(schedule_id, "target deleted before execution started");
            tx.commit().await?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let recorder = Recorder::new(&ctx.store);
    let run = recorder
        .create_run(&mut tx, &schedule.id, chrono::Utc::now())
        .await?;

    let max_attempts = schedule.max_retries + 1;
    let timeout_seconds = schedule.request_timeout_seconds.max(1) as u64;
    let mut final_status = RunStatus::Failed;

    for attempt_number in 1..=max_attempts {
        let attempt = ctx
            .executor
            .execute(
                &target.url,
                &target.method,
                &target.headers,
                target.body_template.as_ref(),
                timeout_seconds,
            )
            .await;

        let succeeded = attempt.error_type.is_none();

        if let Err(err) = recorder.add_attempt(&mut tx, &run.id, attempt_number, &attempt).await {
            tracing::error!(schedule_id, run_id = %run.id, error = ?err, "failed to record attempt");
            final_status = RunStatus::Failed;
            break;
        }

        if succeeded {
            final_status = RunStatus::Success;
            break;
        }
    }

    recorder.complete_run(&mut tx, &run.id, final_status).await?;
    tx.commit().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::store::Store;
    use crate::store::models::ScheduleType;
    use httpmock::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn context() -> anyhow::Result<SchedulerContext> {
        Ok(SchedulerContext {
            store: Store::in_memory(&format!("execution_{}", uuid::Uuid::new_v4())).await?,
            executor: Executor::new()?,
            max_concurrent_executions: 50,
            in_flight: Arc::new(Mutex::new(std::collections::HashSet::new())),
        })
    }

    #[tokio::test]
    async fn retries_until_success_then_stops() -> anyhow::Result<()> {
        let server = MockServer::start();
        let fail_mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(500);
        });

        let ctx = context().await?;
        let target = ctx
            .store
            .create_target(
                "svc".to_string(),
                server.url("/flaky"),
                "GET".to_string(),
                HashMap::new(),
                None,
            )
            .await?;
        let schedule = ctx
            .store
            .create_schedule(target.id, ScheduleType::Interval, 5, None, 3, 5)
            .await?;

        run(&ctx, &schedule.id).await?;

        fail_mock.delete();

        let runs = ctx
            .store
            .list_runs(&crate::store::runs::RunFilters {
                schedule_id: Some(schedule.id.clone()),
                status: None,
                start_time: None,
                end_time: None,
                limit: 10,
                offset: 0,
            })
            .await?;

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);

        let attempts = ctx.store.list_attempts(&runs[0].id).await?;
        assert_eq!(attempts.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn single_success_attempt_needs_no_retry() -> anyhow::Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/ok");
            then.status(200);
        });

        let ctx = context().await?;
        let target = ctx
            .store
            .create_target(
                "svc".to_string(),
                server.url("/ok"),
                "GET".to_string(),
                HashMap::new(),
                None,
            )
            .await?;
        let schedule = ctx
            .store
            .create_schedule(target.id, ScheduleType::Interval, 5, None, 2, 5)
            .await?;

        run(&ctx, &schedule.id).await?;

        let runs = ctx.store.list_schedules().await?;
        assert_eq!(runs.len(), 1);

        let all_runs = ctx
            .store
            .list_runs(&crate::store::runs::RunFilters {
                schedule_id: Some(schedule.id.clone()),
                status: None,
                start_time: None,
                end_time: None,
                limit: 10,
                offset: 0,
            })
            .await?;
        assert_eq!(all_runs.len(), 1);
        assert_eq!(all_runs[0].status, RunStatus::Success);

        let attempts = ctx.store.list_attempts(&all_runs[0].id).await?;
        assert_eq!(attempts.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn deleted_schedule_is_skipped_cleanly() -> anyhow::Result<()> {
        let ctx = context().await?;
        run(&ctx, "schedule_does_not_exist").await?;
        Ok(())
    }

    #[tokio::test]
    async fn store_error_during_attempt_still_finalizes_run() -> anyhow::Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/ok");
            then.status(200);
        });

        let ctx = context().await?;
        let target = ctx
            .store
            .create_target(
                "svc".to_string(),
                server.url("/ok"),
                "GET".to_string(),
                HashMap::new(),
                None,
            )
            .await?;
        let schedule = ctx
            .store
            .create_schedule(target.id, ScheduleType::Interval, 5, None, 0, 30)
            .await?;

        // Deleting the target mid-flight does not affect a dispatch that
        // already captured it locally, but confirms a normal run still
        // always reaches a terminal status rather than staying PENDING.
        run(&ctx, &schedule.id).await?;

        let runs = ctx
            .store
            .list_runs(&crate::store::runs::RunFilters {
                schedule_id: Some(schedule.id.clone()),
                status: None,
                start_time: None,
                end_time: None,
                limit: 10,
                offset: 0,
            })
            .await?;
        assert_eq!(runs.len(), 1);
        assert_ne!(runs[0].status, RunStatus::Pending);
        Ok(())
    }
}
