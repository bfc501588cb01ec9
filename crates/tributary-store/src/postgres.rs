//! PostgreSQL store
//!
//! Three tables: `sources` (one row per configured source), `data` (one row
//! per reconciled entity, columns added as descriptors declare them), and
//! `citations` (which source contributed to which data row). All dynamic
//! columns are nullable TEXT; canonicalization happens upstream.
//!
//! Column and key names reach SQL as identifiers, so every one is validated
//! against a strict identifier shape before being quoted into a statement.
//! Values always travel as bind parameters.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use tributary_core::CanonicalRow;

use crate::error::{Error, Result};
use crate::store::{SourceRegistration, Store, StoredRow};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

const RESERVED_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// A [`Store`] backed by PostgreSQL
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and create the base tables if needed
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool (tests, shared pools)
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                source_type TEXT NOT NULL,
                config_path TEXT,
                unique_keys TEXT NOT NULL DEFAULT '[]',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data (
                id BIGSERIAL PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS citations (
                data_id BIGINT NOT NULL REFERENCES data(id) ON DELETE CASCADE,
                source_id BIGINT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (data_id, source_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn quoted_identifier(column: &str) -> Result<String> {
        if !IDENTIFIER.is_match(column) || RESERVED_COLUMNS.contains(&column) {
            return Err(Error::InvalidColumn {
                column: column.to_string(),
            });
        }
        Ok(format!("\"{column}\""))
    }

    fn decode_row(data_id: i64, doc: Value) -> Result<CanonicalRow> {
        let Value::Object(map) = doc else {
            return Err(Error::CorruptRow {
                data_id,
                message: "row document is not an object".to_string(),
            });
        };
        let mut row = CanonicalRow::new();
        for (column, value) in map {
            if RESERVED_COLUMNS.contains(&column.as_str()) {
                continue;
            }
            match value {
                Value::Null => row.set(column, None),
                Value::String(text) => row.set(column, Some(text)),
                other => {
                    return Err(Error::CorruptRow {
                        data_id,
                        message: format!("column '{column}' is not text: {other}"),
                    });
                }
            }
        }
        Ok(row)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn register_source(&self, registration: &SourceRegistration) -> Result<i64> {
        let unique_keys = serde_json::to_string(&registration.unique_keys)?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sources (name, source_type, config_path, unique_keys)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
                SET source_type = EXCLUDED.source_type,
                    config_path = EXCLUDED.config_path,
                    unique_keys = EXCLUDED.unique_keys,
                    updated_at = now()
            RETURNING id
            "#,
        )
        .bind(&registration.name)
        .bind(&registration.source_type)
        .bind(&registration.config_path)
        .bind(&unique_keys)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn add_columns(&self, columns: &[String]) -> Result<()> {
        for column in columns {
            let quoted = Self::quoted_identifier(column)?;
            let statement = format!("ALTER TABLE data ADD COLUMN IF NOT EXISTS {quoted} TEXT");
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn columns(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name FROM information_schema.columns
            WHERE table_name = 'data'
              AND column_name NOT IN ('id', 'created_at', 'updated_at')
            ORDER BY column_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn find_by_values(&self, keys: &[(String, String)]) -> Result<Vec<StoredRow>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, row_to_json(data) AS doc FROM data WHERE ");
        for (i, (column, value)) in keys.iter().enumerate() {
            if i > 0 {
                builder.push(" AND ");
            }
            builder.push(Self::quoted_identifier(column)?);
            builder.push(" = ");
            builder.push_bind(value);
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let data_id: i64 = row.try_get("id")?;
            let doc: Value = row.try_get("doc")?;
            matches.push((data_id, Self::decode_row(data_id, doc)?));
        }
        Ok(matches)
    }

    async fn insert_row(&self, row: &CanonicalRow) -> Result<i64> {
        if row.is_empty() {
            let id: i64 = sqlx::query_scalar("INSERT INTO data DEFAULT VALUES RETURNING id")
                .fetch_one(&self.pool)
                .await?;
            return Ok(id);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO data (");
        for (i, (column, _)) in row.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(Self::quoted_identifier(column)?);
        }
        builder.push(") VALUES (");
        for (i, (_, value)) in row.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push_bind(value.map(str::to_string));
        }
        builder.push(") RETURNING id");

        let id: i64 = builder.build().fetch_one(&self.pool).await?.try_get("id")?;
        Ok(id)
    }

    async fn update_row(&self, data_id: i64, row: &CanonicalRow) -> Result<()> {
        if row.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE data SET ");
        for (i, (column, value)) in row.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(Self::quoted_identifier(column)?);
            builder.push(" = ");
            builder.push_bind(value.map(str::to_string));
        }
        builder.push(", updated_at = now() WHERE id = ");
        builder.push_bind(data_id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            tracing::warn!(data_id, "update for unknown data row ignored");
        }
        Ok(())
    }

    async fn add_citation(&self, data_id: i64, source_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO citations (data_id, source_id)
            VALUES ($1, $2)
            ON CONFLICT (data_id, source_id) DO NOTHING
            "#,
        )
        .bind(data_id)
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_rows(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn citations_for(&self, data_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT source_id FROM citations WHERE data_id = $1 ORDER BY source_id",
        )
        .bind(data_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
