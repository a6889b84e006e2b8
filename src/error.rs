use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, RoostError>;

#[derive(Debug, ThisError)]
pub enum RoostError {
    #[error("failed to create table '{table}': {source}")]
    SchemaCreate {
        table: String,
        #[source]
        source: Box<RoostError>,
    },

    #[error("failed to add column '{column}': {source}")]
    SchemaColumn {
        column: String,
        #[source]
        source: Box<RoostError>,
    },

    #[error("invalid user input: {0}")]
    Validation(#[from] ValidationError),

    #[error("user already exists: {0}")]
    Duplicate(String),

    #[error("more than one user has the same identifier '{0}'")]
    Integrity(String),

    /// Shared by unknown identifiers and wrong passwords.
    #[error("invalid username or password")]
    Auth,

    #[error("failed to update password hash for '{identifier}': {affected} rows affected")]
    Update { identifier: String, affected: u64 },

    #[error("malformed user row: column '{0}'")]
    MalformedRow(String),

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),
}

impl RoostError {
    /// True for both schema failure kinds (table create and column repair).
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            RoostError::SchemaCreate { .. } | RoostError::SchemaColumn { .. }
        )
    }
}

/// Reasons a registration is rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ValidationError {
    #[error("missing identifier")]
    MissingIdentifier,

    #[error("identifier too long ({len} > {max})")]
    IdentifierTooLong { len: usize, max: usize },

    #[error("missing email")]
    MissingEmail,

    #[error("email too long ({len} > {max})")]
    EmailTooLong { len: usize, max: usize },

    #[error("empty password provided")]
    EmptyPassword,
}
