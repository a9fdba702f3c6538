use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use sqlx::{Sqlite, Transaction};

use crate::error::CoreError;
use crate::id;
use crate::store::Store;
use crate::store::models::{Target, TargetRow};

impl Store {
    pub async fn create_target(
        &self,
        name: String,
        url: String,
        method: String,
        headers: HashMap<String, String>,
        body_template: Option<Value>,
    ) -> anyhow::Result<Target> {
        let now = Utc::now();
        let id = id::generate("target");
        let headers_json = serde_json::to_string(&headers)?;
        let body_template_json = body_template.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO targets (id, name, url, method, headers, body_template, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&id)
        .bind(&name)
        .bind(&url)
        .bind(&method)
        .bind(&headers_json)
        .bind(&body_template_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_target(&id).await.map_err(anyhow::Error::from)
    }

    pub async fn get_target(&self, id: &str) -> Result<Target, CoreError> {
        let row: TargetRow = sqlx::query_as(r#"SELECT * FROM targets WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Target::try_from(row)?)
    }

    /// Same read as `get_target`, but against an ambient transaction instead
    /// of the pool directly, so it can participate in a caller's transaction.
    pub async fn get_target_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> Result<Target, CoreError> {
        let row: TargetRow = sqlx::query_as(r#"SELECT * FROM targets WHERE id = $1"#)
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(Target::try_from(row)?)
    }

    pub async fn list_targets(&self) -> anyhow::Result<Vec<Target>> {
        let rows: Vec<TargetRow> =
            sqlx::query_as(r#"SELECT * FROM targets ORDER BY created_at DESC"#)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Target::try_from).collect()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_target(
        &self,
        id: &str,
        name: Option<String>,
        url: Option<String>,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
        body_template: Option<Option<Value>>,
    ) -> Result<Target, CoreError> {
        let existing = self.get_target(id).await?;
        let now = Utc::now();

        let name = name.unwrap_or(existing.name);
        let url = url.unwrap_or(existing.url);
        let method = method.unwrap_or(existing.method);
        let headers = headers.unwrap_or(existing.headers);
        let body_template = body_template.unwrap_or(existing.body_template);

        let headers_json = serde_json::to_string(&headers).map_err(anyhow::Error::from)?;
        let body_template_json = body_template
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(anyhow::Error::from)?;

        sqlx::query(
            r#"
            UPDATE targets
            SET name = $1, url = $2, method = $3, headers = $4, body_template = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&name)
        .bind(&url)
        .bind(&method)
        .bind(&headers_json)
        .bind(&body_template_json)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_target(id).await
    }

    pub async fn delete_target(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query(r#"DELETE FROM targets WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }

        Ok(())
    }
}
