use std::{fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};

use shared::domain::{ExamRecord, RecordId};

/// Create/scan seam over the exam table. The dispatcher only sees this
/// trait, never the backing engine.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record under a caller-supplied fresh id. Not idempotent.
    async fn create(&self, record: &ExamRecord) -> Result<()>;

    /// Return every record, unfiltered, in store order. Single-page
    /// semantics: a paginating backend would surface only its first page.
    async fn scan_all(&self) -> Result<Vec<ExamRecord>>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    table: String,
}

impl Storage {
    pub async fn new(database_url: &str, table: &str) -> Result<Self> {
        anyhow::ensure!(
            !table.is_empty()
                && table
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "table name '{table}' must be a plain identifier"
        );
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self {
            pool,
            table: table.to_string(),
        };
        storage.ensure_table().await?;
        Ok(storage)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_table(&self) -> Result<()> {
        // Table name is validated in `new`, so formatting it is safe.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                date       TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to ensure table '{}' exists", self.table))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Storage {
    async fn create(&self, record: &ExamRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (id, name, date, created_at) VALUES (?1, ?2, ?3, ?4)",
            self.table
        ))
        .bind(&record.id.0)
        .bind(&record.name)
        .bind(&record.date)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("failed to insert exam record")?;
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<ExamRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT id, name, date, created_at FROM {}",
            self.table
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to scan exam records")?;

        rows.into_iter()
            .map(|row| {
                Ok(ExamRecord {
                    id: RecordId(row.try_get("id")?),
                    name: row.try_get("name")?,
                    date: row.try_get("date")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect()
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    let Some(parent) = Path::new(path).parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
