pub mod metrics;
pub mod models;
pub mod runs;
mod schedules;
mod targets;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Utc;
use sqlx::{
    Pool, Sqlite, Transaction,
    migrate,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

#[derive(Debug, Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    async fn run_migrations(&self) -> anyhow::Result<()> {
        migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| anyhow!("error running store migrations: {err:?}"))?;
        Ok(())
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        self.run_migrations().await
    }

    /// Opens a transaction spanning multiple store calls — used wherever a
    /// caller needs several writes (or a read-then-write sequence) to commit
    /// or roll back together, such as one scheduler tick or one execution task.
    pub async fn begin(&self) -> anyhow::Result<Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    fn connect_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
    }

    /// Connects to the store described by `database_url`. Accepts both
    /// `sqlite:///./path.db` DSNs and bare filesystem paths.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let path = database_url
            .strip_prefix("sqlite://")
            .unwrap_or(database_url);

        if let Some(parent) = PathBuf::from(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("creating parent directory for database file")?;
            }
        }

        let options = Self::connect_options().filename(path);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn in_memory(name: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .create_if_missing(true)
            .foreign_keys(true)
            .filename(format!("file:in_memory_{name}"))
            .in_memory(true)
            .shared_cache(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Finalizes, as FAILED, any Run left PENDING by an uncleanly terminated
    /// previous process. The in-flight set always starts empty on restart, so
    /// the owning Schedule becomes eligible for redispatch on the next due tick.
    pub async fn sweep_stale_runs(&self) -> anyhow::Result<usize> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = 'FAILED', completed_at = $1
            WHERE status = 'PENDING'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let swept = result.rows_affected() as usize;
        if swept > 0 {
            tracing::warn!(swept, "swept stale pending runs on startup");
        }

        Ok(swept)
    }
}
