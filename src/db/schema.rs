//! Expected shape of the users table and the reconciler that enforces it.
//! SQLite-first; the repair fragments work within `ALTER TABLE ADD COLUMN` limits.

use crate::config::{EMAIL_MAX_LEN, HASH_MAX_LEN, UsersConfig};
use crate::db::{Storage, quote_ident};
use crate::error::{Result, RoostError};
use tracing::{debug, info, warn};

/// One expected column: its fresh-create definition and the statements that
/// add it to an existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub definition: String,
    pub repair: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    /// Columns added, in the order they were repaired.
    Repaired(Vec<String>),
    UpToDate,
}

/// Columns in reconciliation order: identifier, email, hash, last_login, created.
///
/// SQLite cannot add PRIMARY KEY/UNIQUE columns or `CURRENT_TIMESTAMP`
/// defaults through `ALTER TABLE`, so repairs add a nullable column, then a
/// unique index or a timestamp backfill.
pub fn expected_columns(users: &UsersConfig) -> Vec<ColumnSpec> {
    let table = quote_ident(&users.table);
    let unique_index = |column: &str| {
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table} ({})",
            quote_ident(&format!("{}_{column}_unique", users.table)),
            quote_ident(column)
        )
    };
    let backfill = |column: &str| {
        let col = quote_ident(column);
        format!("UPDATE {table} SET {col} = CURRENT_TIMESTAMP WHERE {col} IS NULL")
    };
    let add = |column: &str, ty: &str| {
        format!("ALTER TABLE {table} ADD COLUMN {} {ty}", quote_ident(column))
    };

    let id_ty = format!("VARCHAR({})", users.identifier_max_len);
    let email_ty = format!("VARCHAR({EMAIL_MAX_LEN})");
    let hash_ty = format!("VARCHAR({HASH_MAX_LEN})");
    let last_login = UsersConfig::LAST_LOGIN_COLUMN;
    let created = UsersConfig::CREATED_COLUMN;

    vec![
        ColumnSpec {
            name: users.identifier_column.clone(),
            definition: format!("{id_ty} NOT NULL PRIMARY KEY"),
            repair: vec![
                add(&users.identifier_column, &id_ty),
                unique_index(&users.identifier_column),
            ],
        },
        ColumnSpec {
            name: users.email_column.clone(),
            definition: format!("{email_ty} NOT NULL UNIQUE"),
            repair: vec![
                add(&users.email_column, &email_ty),
                unique_index(&users.email_column),
            ],
        },
        ColumnSpec {
            name: users.hash_column.clone(),
            definition: format!("{hash_ty} NOT NULL"),
            repair: vec![add(&users.hash_column, &hash_ty)],
        },
        ColumnSpec {
            name: last_login.to_string(),
            definition: "TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string(),
            repair: vec![add(last_login, "TIMESTAMP"), backfill(last_login)],
        },
        ColumnSpec {
            name: created.to_string(),
            definition: "TIMESTAMP DEFAULT CURRENT_TIMESTAMP".to_string(),
            repair: vec![add(created, "TIMESTAMP"), backfill(created)],
        },
    ]
}

pub fn create_table_sql(users: &UsersConfig) -> String {
    let defs: Vec<String> = expected_columns(users)
        .into_iter()
        .map(|c| format!("    {} {}", quote_ident(&c.name), c.definition))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote_ident(&users.table),
        defs.join(",\n")
    )
}

/// Create the users table, or add whichever expected columns it lacks.
///
/// Each column repair runs as one atomic statement group. The first failing
/// repair aborts the call; a later call retries only what is still missing.
pub async fn ensure_user_table<S>(storage: &S, users: &UsersConfig) -> Result<ReconcileOutcome>
where
    S: Storage + ?Sized,
{
    let table = users.table.as_str();

    if !storage.table_exists(table).await? {
        storage
            .execute(&[create_table_sql(users)])
            .await
            .map_err(|e| RoostError::SchemaCreate {
                table: table.to_string(),
                source: Box::new(e),
            })?;
        info!(table, "user table created");
        return Ok(ReconcileOutcome::Created);
    }

    storage.load_schema_metadata().await?;

    let mut repaired = Vec::new();
    for spec in expected_columns(users) {
        if storage.column_exists(table, &spec.name).await? {
            continue;
        }
        debug!(table, column = %spec.name, "adding missing column");
        if let Err(e) = storage.execute(&spec.repair).await {
            warn!(table, column = %spec.name, error = %e, "column repair failed");
            return Err(RoostError::SchemaColumn {
                column: spec.name,
                source: Box::new(e),
            });
        }
        info!(table, column = %spec.name, "missing column added");
        repaired.push(spec.name);
    }

    if repaired.is_empty() {
        Ok(ReconcileOutcome::UpToDate)
    } else {
        Ok(ReconcileOutcome::Repaired(repaired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_columns_follow_configured_names_in_order() {
        let users = UsersConfig {
            identifier_column: "login".to_string(),
            identifier_max_len: 32,
            ..UsersConfig::default()
        };
        let names: Vec<String> = expected_columns(&users).into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["login", "email", "hashword", "last_login", "created"]
        );
    }

    #[test]
    fn create_sql_carries_keys_and_defaults() {
        let sql = create_table_sql(&UsersConfig::default());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"roost_users\""));
        assert!(sql.contains("\"username\" VARCHAR(64) NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"email\" VARCHAR(320) NOT NULL UNIQUE"));
        assert!(sql.contains("\"hashword\" VARCHAR(128) NOT NULL"));
        assert!(sql.contains("\"last_login\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn email_repair_adds_unique_index_in_same_group() {
        let cols = expected_columns(&UsersConfig::default());
        let email = &cols[1];
        assert_eq!(email.repair.len(), 2);
        assert!(email.repair[0].contains("ADD COLUMN \"email\" VARCHAR(320)"));
        assert!(email.repair[1].starts_with("CREATE UNIQUE INDEX IF NOT EXISTS"));
    }
}
