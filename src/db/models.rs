use crate::config::UsersConfig;
use crate::db::Row;
use crate::error::{Result, RoostError};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text form SQLite's `CURRENT_TIMESTAMP` produces (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub identifier: String,
    pub email: String,
    pub password_hash: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    /// Columns outside the expected five, kept as stored.
    #[serde(default)]
    pub extra: Row,
}

impl UserRecord {
    /// Build a record from a storage row using the configured column names.
    pub fn from_row(mut row: Row, cols: &UsersConfig) -> Result<Self> {
        // Columns added by a repair are NULL on legacy rows; they decode as "".
        // A row without a hash cannot log in.
        let identifier = take_string(&mut row, &cols.identifier_column)?;
        let email = take_string(&mut row, &cols.email_column)?;
        let password_hash = take_string(&mut row, &cols.hash_column)?;
        let last_login = take_timestamp(&mut row, UsersConfig::LAST_LOGIN_COLUMN)?;
        let created = take_timestamp(&mut row, UsersConfig::CREATED_COLUMN)?;

        Ok(Self {
            identifier,
            email,
            password_hash,
            last_login,
            created,
            extra: row,
        })
    }

    /// Flatten back into a row keyed by the configured column names.
    pub fn to_row(&self, cols: &UsersConfig) -> Row {
        let mut row = Row::new();
        row.insert(
            cols.identifier_column.clone(),
            Value::from(self.identifier.clone()),
        );
        row.insert(cols.email_column.clone(), Value::from(self.email.clone()));
        row.insert(
            cols.hash_column.clone(),
            Value::from(self.password_hash.clone()),
        );
        row.insert(
            UsersConfig::LAST_LOGIN_COLUMN.to_string(),
            timestamp_value(self.last_login),
        );
        row.insert(
            UsersConfig::CREATED_COLUMN.to_string(),
            timestamp_value(self.created),
        );
        for (k, v) in &self.extra {
            row.entry(k.clone()).or_insert_with(|| v.clone());
        }
        row
    }
}

/// Current time at the resolution the database stores.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn timestamp_value(ts: Option<DateTime<Utc>>) -> Value {
    ts.map(|t| Value::from(format_timestamp(t)))
        .unwrap_or(Value::Null)
}

/// Remove `column` from `row`, matching names the way SQLite does (ASCII case-insensitive).
fn take_column(row: &mut Row, column: &str) -> Option<Value> {
    if let Some(v) = row.remove(column) {
        return Some(v);
    }
    let key = row
        .keys()
        .find(|k| k.eq_ignore_ascii_case(column))
        .cloned()?;
    row.remove(&key)
}

fn take_string(row: &mut Row, column: &str) -> Result<String> {
    match take_column(row, column) {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Null) | None => Ok(String::new()),
        Some(_) => Err(RoostError::MalformedRow(column.to_string())),
    }
}

fn take_timestamp(row: &mut Row, column: &str) -> Result<Option<DateTime<Utc>>> {
    match take_column(row, column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| RoostError::MalformedRow(column.to_string())),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(Some)
            .ok_or_else(|| RoostError::MalformedRow(column.to_string())),
        Some(_) => Err(RoostError::MalformedRow(column.to_string())),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn cols() -> UsersConfig {
        UsersConfig::default()
    }

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 12:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn from_row_keeps_unknown_columns_as_extra() {
        let row = json!({
            "username": "alice",
            "email": "a@x.com",
            "hashword": "$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA",
            "last_login": "2024-05-01 12:30:00",
            "created": null,
            "display_name": "Alice"
        })
        .as_object()
        .cloned()
        .unwrap();

        let rec = UserRecord::from_row(row, &cols()).unwrap();
        assert_eq!(rec.identifier, "alice");
        assert!(rec.created.is_none());
        assert_eq!(rec.extra.get("display_name"), Some(&json!("Alice")));

        let back = rec.to_row(&cols());
        assert_eq!(back["last_login"], json!("2024-05-01 12:30:00"));
        assert_eq!(back["display_name"], json!("Alice"));
        assert_eq!(back.len(), 6);
    }

    #[test]
    fn from_row_decodes_null_repaired_columns_as_empty() {
        let row = json!({"username": "old", "email": null, "hashword": null})
            .as_object()
            .cloned()
            .unwrap();
        let rec = UserRecord::from_row(row, &cols()).unwrap();
        assert_eq!(rec.identifier, "old");
        assert!(rec.email.is_empty());
        assert!(rec.password_hash.is_empty());
        assert!(rec.extra.is_empty());
    }

    #[test]
    fn from_row_matches_column_names_case_insensitively() {
        let row = json!({"Username": "old", "EMAIL": "o@x.com", "hashword": "h"})
            .as_object()
            .cloned()
            .unwrap();
        let rec = UserRecord::from_row(row, &cols()).unwrap();
        assert_eq!(rec.identifier, "old");
        assert_eq!(rec.email, "o@x.com");
        assert!(rec.extra.is_empty());
    }

    #[test]
    fn from_row_rejects_non_text_identifier() {
        let row = json!({"username": 7, "email": "a@x.com"})
            .as_object()
            .cloned()
            .unwrap();
        let err = UserRecord::from_row(row, &cols()).unwrap_err();
        assert!(matches!(err, RoostError::MalformedRow(c) if c == "username"));
    }
}
