//! Database module: storage contract, user rows and schema reconciliation.
//!
//! Layout:
//! - `models.rs`: `UserRecord` and conversions to/from generic rows
//! - `schema.rs`: expected user table as data, plus the reconciler
//! - `sqlite.rs`: `Storage` implementation over a sqlx SQLite pool

pub mod models;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

pub use models::UserRecord;
pub use schema::{ReconcileOutcome, ensure_user_table};
pub use sqlite::{SqlitePool, SqliteStorage};

/// Column name to value, as exchanged with the storage backend.
pub type Row = Map<String, Value>;

/// Capabilities the credential core needs from a relational store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Run a group of statements atomically.
    async fn execute(&self, statements: &[String]) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Drop and reload any cached column metadata.
    async fn load_schema_metadata(&self) -> Result<()>;

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool>;

    /// Rows matching every `filter` entry by equality. An empty filter selects all rows.
    async fn select(&self, table: &str, filter: &Row) -> Result<Vec<Row>>;

    /// Returns the inserted row count. Uniqueness violations are `RoostError::Duplicate`.
    async fn insert(&self, table: &str, row: &Row) -> Result<u64>;

    /// Returns the number of rows affected.
    async fn update(&self, table: &str, changes: &Row, filter: &Row) -> Result<u64>;
}

/// Quote an identifier for SQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
