mod execution;
mod tick;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::SchedulerOptions;
use crate::executor::Executor;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct Config {
    store: Store,
    poll_interval: Duration,
    max_concurrent_executions: usize,
}

impl Config {
    pub async fn from_cli(options: SchedulerOptions, store: Store) -> Self {
        Self {
            store,
            poll_interval: Duration::from_secs_f64(options.scheduler_poll_seconds.max(0.0)),
            max_concurrent_executions: options.max_concurrent_executions,
        }
    }
}

/// Shared, cloneable handle passed into every tick and every spawned
/// execution task. `in_flight` is the process-local set guarding against
/// overlapping dispatch of the same schedule (§5 of the design).
#[derive(Debug, Clone)]
pub struct SchedulerContext {
    store: Store,
    executor: Executor,
    max_concurrent_executions: usize,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    let context = SchedulerContext {
        store: config.store,
        executor: Executor::new()?,
        max_concurrent_executions: config.max_concurrent_executions,
        in_flight: Arc::new(Mutex::new(HashSet::new())),
    };

    loop {
        if let Err(err) = tick::tick(&context).await {
            tracing::error!(error = ?err, "scheduler tick failed");
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
