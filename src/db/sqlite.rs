use crate::db::{Row, Storage, quote_ident};
use crate::error::{Result, RoostError};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Error as SqlxError, Pool, Row as _, Sqlite, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::debug;

pub type SqlitePool = Pool<Sqlite>;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Open (creating if missing) the SQLite database at `database_url`.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
    Ok(pool)
}

pub struct SqliteStorage {
    pool: SqlitePool,
    columns: RwLock<HashMap<String, Vec<String>>>,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            columns: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    async fn run_in_transaction(&self, statements: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for stmt in statements {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            debug!(sql = %s, "execute");
            sqlx::query(s).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn where_clause(filter: &Row) -> String {
        if filter.is_empty() {
            return String::new();
        }
        let conds: Vec<String> = filter
            .keys()
            .map(|k| format!("{} = ?", quote_ident(k)))
            .collect();
        format!(" WHERE {}", conds.join(" AND "))
    }

    fn row_to_map(row: &SqliteRow) -> Result<Row> {
        let mut map = Row::new();
        for column in row.columns() {
            let idx = column.ordinal();
            let (is_null, kind) = {
                let raw = row.try_get_raw(idx)?;
                (raw.is_null(), raw.type_info().name().to_string())
            };
            let value = if is_null {
                Value::Null
            } else {
                match kind.as_str() {
                    "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
                    "REAL" => Value::from(row.try_get_unchecked::<f64, _>(idx)?),
                    "BLOB" => {
                        let bytes: Vec<u8> = row.try_get_unchecked(idx)?;
                        Value::from(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    _ => Value::from(row.try_get_unchecked::<String, _>(idx)?),
                }
            };
            map.insert(column.name().to_string(), value);
        }
        Ok(map)
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn is_unique_violation(err: &SqlxError) -> Option<String> {
    match err {
        SqlxError::Database(db)
            if db.is_unique_violation() || db.message().starts_with("UNIQUE constraint failed") =>
        {
            Some(db.message().to_string())
        }
        _ => None,
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn execute(&self, statements: &[String]) -> Result<()> {
        let result = self.run_in_transaction(statements).await;
        // Any statement may be DDL; drop metadata only once the outcome is settled.
        self.columns.write().await.clear();
        result
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn load_schema_metadata(&self) -> Result<()> {
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut loaded = HashMap::with_capacity(tables.len());
        for (table,) in tables {
            let cols = self.fetch_columns(&table).await?;
            loaded.insert(table, cols);
        }
        *self.columns.write().await = loaded;
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        if let Some(cols) = self.columns.read().await.get(table) {
            return Ok(cols.iter().any(|c| c.eq_ignore_ascii_case(column)));
        }
        let cols = self.fetch_columns(table).await?;
        let exists = cols.iter().any(|c| c.eq_ignore_ascii_case(column));
        // Unknown tables are not cached so a later create is observed.
        if !cols.is_empty() {
            self.columns.write().await.insert(table.to_string(), cols);
        }
        Ok(exists)
    }

    async fn select(&self, table: &str, filter: &Row) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {}{}",
            quote_ident(table),
            Self::where_clause(filter)
        );
        let mut query = sqlx::query(&sql);
        for value in filter.values() {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_map).collect()
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<u64> {
        let cols: Vec<String> = row.keys().map(|k| quote_ident(k)).collect();
        let placeholders = vec!["?"; cols.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            cols.join(", "),
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for value in row.values() {
            query = bind_value(query, value);
        }
        match query.execute(&self.pool).await {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => match is_unique_violation(&e) {
                Some(msg) => Err(RoostError::Duplicate(msg)),
                None => Err(e.into()),
            },
        }
    }

    async fn update(&self, table: &str, changes: &Row, filter: &Row) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let sets: Vec<String> = changes
            .keys()
            .map(|k| format!("{} = ?", quote_ident(k)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_ident(table),
            sets.join(", "),
            Self::where_clause(filter)
        );
        let mut query = sqlx::query(&sql);
        for value in changes.values().chain(filter.values()) {
            query = bind_value(query, value);
        }
        let done = query.execute(&self.pool).await.map_err(|e| {
            match is_unique_violation(&e) {
                Some(msg) => RoostError::Duplicate(msg),
                None => e.into(),
            }
        })?;
        Ok(done.rows_affected())
    }
}
