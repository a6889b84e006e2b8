#![allow(dead_code)]

use async_trait::async_trait;
use roost::config::{HashingConfig, UsersConfig};
use roost::db::{Row, SqliteStorage, Storage};
use roost::error::{Result, RoostError};
use roost::service::{Argon2Hashing, CredentialManager, MemorySessionStore};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Mutex;

pub type TestManager = CredentialManager<SqliteStorage, MemorySessionStore, Argon2Hashing>;

pub async fn memory_storage() -> SqliteStorage {
    // One connection: every pooled connection to `:memory:` is a separate database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");
    SqliteStorage::new(pool)
}

pub fn cheap_hasher(memory_kib: u32, iterations: u32) -> Argon2Hashing {
    Argon2Hashing::new(&HashingConfig {
        memory_kib,
        iterations,
        parallelism: 1,
    })
    .expect("valid argon2 params")
}

pub async fn manager() -> TestManager {
    manager_with(memory_storage().await, cheap_hasher(64, 1)).await
}

pub async fn manager_with(storage: SqliteStorage, hasher: Argon2Hashing) -> TestManager {
    let mgr = CredentialManager::new(
        storage,
        MemorySessionStore::new(),
        hasher,
        UsersConfig::default(),
    );
    mgr.ensure_user_table()
        .await
        .expect("failed to reconcile user table");
    mgr
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("expected a JSON object")
}

pub async fn raw(storage: &SqliteStorage, sql: &str) {
    sqlx::query(sql)
        .execute(storage.pool())
        .await
        .expect("raw statement failed");
}

pub async fn columns(storage: &SqliteStorage, table: &str) -> Vec<String> {
    let names: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(storage.pool())
        .await
        .expect("pragma_table_info failed");
    names.into_iter().map(|(n,)| n).collect()
}

/// Records every statement group passed to `execute` and can fail groups that
/// mention a given fragment.
pub struct InstrumentedStorage {
    pub inner: SqliteStorage,
    pub executed: Mutex<Vec<Vec<String>>>,
    pub fail_on: Mutex<Option<String>>,
}

impl InstrumentedStorage {
    pub fn new(inner: SqliteStorage) -> Self {
        Self {
            inner,
            executed: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
        }
    }

    pub fn fail_when_containing(&self, fragment: Option<&str>) {
        *self.fail_on.lock().unwrap() = fragment.map(str::to_string);
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

#[async_trait]
impl Storage for InstrumentedStorage {
    async fn execute(&self, statements: &[String]) -> Result<()> {
        let fail = self.fail_on.lock().unwrap().clone();
        if let Some(fragment) = fail
            && statements.iter().any(|s| s.contains(&fragment))
        {
            return Err(RoostError::DatabaseError(sqlx::Error::Protocol(format!(
                "injected failure on {fragment}"
            ))));
        }
        self.executed.lock().unwrap().push(statements.to_vec());
        self.inner.execute(statements).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.inner.table_exists(table).await
    }

    async fn load_schema_metadata(&self) -> Result<()> {
        self.inner.load_schema_metadata().await
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        self.inner.column_exists(table, column).await
    }

    async fn select(&self, table: &str, filter: &Row) -> Result<Vec<Row>> {
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<u64> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, changes: &Row, filter: &Row) -> Result<u64> {
        self.inner.update(table, changes, filter).await
    }
}
