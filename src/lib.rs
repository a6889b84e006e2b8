pub mod config;
pub mod db;
pub mod error;
pub mod service;

pub use db::{Row, SqliteStorage, Storage, UserRecord};
pub use error::{RoostError, ValidationError};
pub use service::CredentialManager;
