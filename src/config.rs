use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::RoostError;

/// Upper bound on stored email length (RFC 5321 / RFC 5322).
pub const EMAIL_MAX_LEN: usize = 320;

/// Width of the hash column. Argon2id PHC strings fit comfortably.
pub const HASH_MAX_LEN: usize = 128;

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: failed to load configuration"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub loglevel: String,
    pub users: UsersConfig,
    pub hashing: HashingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://roost.sqlite".to_string(),
            loglevel: "info".to_string(),
            users: UsersConfig::default(),
            hashing: HashingConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then `config.toml`, then `ROOST_*` environment variables.
    pub fn load() -> Result<Self, RoostError> {
        Self::figment().extract().map_err(RoostError::from)
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("ROOST_").split("__"))
    }
}

/// Names and limits of the users relation plus the session namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UsersConfig {
    pub table: String,
    pub identifier_column: String,
    pub email_column: String,
    pub hash_column: String,
    pub identifier_max_len: usize,
    pub session_key: String,
}

impl UsersConfig {
    pub const LAST_LOGIN_COLUMN: &'static str = "last_login";
    pub const CREATED_COLUMN: &'static str = "created";
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            table: "roost_users".to_string(),
            identifier_column: "username".to_string(),
            email_column: "email".to_string(),
            hash_column: "hashword".to_string(),
            identifier_max_len: 64,
            session_key: "user_data".to_string(),
        }
    }
}

/// Argon2id cost parameters. Stored digests with different parameters are
/// rehashed on the next successful login.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}
