use chrono::Utc;

use crate::scheduler::SchedulerContext;
use crate::scheduler::execution;

/// One iteration of the poll loop: expire windows, select due schedules, and
/// dispatch them. Ticks never overlap — `start` awaits this function to
/// completion before sleeping and starting the next one. The read-modify-write
/// sequence (expire, select, mark dispatched) runs in a single transaction so
/// a schedule is never selected as due by two overlapping ticks.
#[tracing::instrument(name = "scheduler_tick", skip(ctx))]
pub async fn tick(ctx: &SchedulerContext) -> anyhow::Result<()> {
    let now = Utc::now();

    let mut tx = ctx.store.begin().await?;

    let expired = ctx.store.expire_windows_tx(&mut tx, now).await?;
    if expired > 0 {
        tracing::info!(expired, "windows expired");
    }

    let active = ctx.store.list_active_schedules_with_target_tx(&mut tx).await?;

    let mut dispatched_ids = Vec::new();

    {
        let mut in_flight = ctx.in_flight.lock().await;

        for entry in active {
            if in_flight.len() >= ctx.max_concurrent_executions {
                break;
            }

            if in_flight.contains(&entry.schedule.id) {
                continue;
            }

            let due = match entry.schedule.last_run_at {
                None => true,
                Some(last_run_at) => {
                    last_run_at + chrono::Duration::seconds(entry.schedule.interval_seconds) <= now
                }
            };

            if !due {
                continue;
            }

            ctx.store
                .mark_dispatched_tx(&mut tx, &entry.schedule.id, now)
                .await?;
            in_flight.insert(entry.schedule.id.clone());
            dispatched_ids.push(entry.schedule.id.clone());
        }
    }

    tx.commit().await?;

    for schedule_id in dispatched_ids {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            execution::execute_schedule(ctx, schedule_id).await;
        });
    }

    Ok(())
}
