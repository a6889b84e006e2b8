use crate::config::{EMAIL_MAX_LEN, UsersConfig};
use crate::db::models::{format_timestamp, now};
use crate::db::schema::{self, ReconcileOutcome};
use crate::db::{Row, Storage, UserRecord};
use crate::error::{Result, RoostError, ValidationError};
use crate::service::password::PasswordHashing;
use crate::service::session::SessionStore;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Key in registration attributes that may carry the password.
pub const PASSWORD_ATTRIBUTE: &str = "password";

/// Registration, login and session projection over the users table.
///
/// The table must have been reconciled (see [`CredentialManager::ensure_user_table`])
/// before any other operation is used.
pub struct CredentialManager<S, K, H> {
    storage: S,
    session: K,
    hasher: H,
    users: UsersConfig,
}

impl<S, K, H> CredentialManager<S, K, H>
where
    S: Storage,
    K: SessionStore,
    H: PasswordHashing,
{
    pub fn new(storage: S, session: K, hasher: H, users: UsersConfig) -> Self {
        Self {
            storage,
            session,
            hasher,
            users,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn session(&self) -> &K {
        &self.session
    }

    pub fn users_config(&self) -> &UsersConfig {
        &self.users
    }

    pub async fn ensure_user_table(&self) -> Result<ReconcileOutcome> {
        schema::ensure_user_table(&self.storage, &self.users).await
    }

    /// Insert a new user and return the inserted row count.
    ///
    /// A `"password"` attribute is used when `password` is `None` and is never
    /// stored. Attributes that do not name an existing column are dropped.
    pub async fn register_user(&self, mut attributes: Row, password: Option<&str>) -> Result<u64> {
        let attr_password = match attributes.remove(PASSWORD_ATTRIBUTE) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let password = password.or(attr_password.as_deref()).unwrap_or_default();

        let table = self.users.table.as_str();
        let mut params = Row::new();
        for (col, val) in attributes {
            if self.storage.column_exists(table, &col).await? {
                params.insert(col, val);
            } else {
                debug!(table, column = %col, "dropping unknown registration attribute");
            }
        }

        let identifier = match params.get(&self.users.identifier_column) {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(ValidationError::MissingIdentifier.into()),
        };
        let id_len = identifier.chars().count();
        if id_len > self.users.identifier_max_len {
            return Err(ValidationError::IdentifierTooLong {
                len: id_len,
                max: self.users.identifier_max_len,
            }
            .into());
        }

        let email_len = match params.get(&self.users.email_column) {
            Some(Value::String(s)) => s.chars().count(),
            _ => return Err(ValidationError::MissingEmail.into()),
        };
        if email_len > EMAIL_MAX_LEN {
            return Err(ValidationError::EmailTooLong {
                len: email_len,
                max: EMAIL_MAX_LEN,
            }
            .into());
        }

        if password.trim().is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }

        let digest = self.hasher.hash(password)?;
        params.insert(self.users.hash_column.clone(), Value::from(digest));
        let ts = Value::from(format_timestamp(now()));
        params.insert(UsersConfig::LAST_LOGIN_COLUMN.to_string(), ts.clone());
        params.insert(UsersConfig::CREATED_COLUMN.to_string(), ts);

        let inserted = self.storage.insert(table, &params).await.inspect_err(|e| {
            if matches!(e, RoostError::Duplicate(_)) {
                info!(identifier = %identifier, "registration rejected: duplicate user");
            }
        })?;
        if inserted == 1 {
            info!(identifier = %identifier, "user registered");
        } else {
            warn!(identifier = %identifier, inserted, "user insert affected unexpected row count");
        }
        Ok(inserted)
    }

    /// Exact identifier lookup. More than one match is an integrity fault.
    pub async fn get_user(&self, identifier: &str) -> Result<Option<UserRecord>> {
        let mut filter = Row::new();
        filter.insert(self.users.identifier_column.clone(), Value::from(identifier));

        let mut rows = self.storage.select(&self.users.table, &filter).await?;
        match rows.len() {
            0 => Ok(None),
            1 => {
                let row = rows.remove(0);
                UserRecord::from_row(row, &self.users).map(Some)
            }
            n => {
                warn!(identifier, matches = n, "identifier is not unique in user table");
                Err(RoostError::Integrity(identifier.to_string()))
            }
        }
    }

    /// Authenticate and return the user with its refreshed `last_login`.
    ///
    /// Outdated digests are replaced with a fresh one before returning.
    pub async fn login_user(
        &self,
        identifier: &str,
        password: &str,
        load_to_session: bool,
    ) -> Result<UserRecord> {
        let mut user = match self.get_user(identifier).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!(identifier, "login failed: unknown identifier");
                return Err(RoostError::Auth);
            }
            Err(RoostError::MalformedRow(column)) => {
                warn!(identifier, column = %column, "login failed: unusable user row");
                return Err(RoostError::Auth);
            }
            Err(e) => return Err(e),
        };

        if user.password_hash.is_empty() || !self.hasher.verify(password, &user.password_hash) {
            debug!(identifier, "login failed: password mismatch");
            return Err(RoostError::Auth);
        }

        if self.hasher.needs_rehash(&user.password_hash) {
            user.password_hash = self.store_new_hash(&user.identifier, password).await?;
            info!(identifier, "password hash upgraded on login");
        }

        let logged_in = now();
        let mut changes = Row::new();
        changes.insert(
            UsersConfig::LAST_LOGIN_COLUMN.to_string(),
            Value::from(format_timestamp(logged_in)),
        );
        let affected = self.update_user(&user.identifier, changes).await?;
        if affected != 1 {
            warn!(identifier, affected, "last_login update affected unexpected row count");
        }
        user.last_login = Some(logged_in);

        if load_to_session {
            self.load_user_session(&user).await?;
        }

        info!(identifier, "user logged in");
        Ok(user)
    }

    /// Pass-through update filtered by identifier. No column whitelist.
    pub async fn update_user(&self, identifier: &str, changes: Row) -> Result<u64> {
        let mut filter = Row::new();
        filter.insert(self.users.identifier_column.clone(), Value::from(identifier));
        self.storage
            .update(&self.users.table, &changes, &filter)
            .await
    }

    pub async fn change_password(&self, identifier: &str, new_password: &str) -> Result<()> {
        self.store_new_hash(identifier, new_password).await?;
        info!(identifier, "password changed");
        Ok(())
    }

    async fn store_new_hash(&self, identifier: &str, password: &str) -> Result<String> {
        let digest = self.hasher.hash(password)?;
        let mut changes = Row::new();
        changes.insert(self.users.hash_column.clone(), Value::from(digest.clone()));

        let affected = self.update_user(identifier, changes).await?;
        if affected != 1 {
            return Err(RoostError::Update {
                identifier: identifier.to_string(),
                affected,
            });
        }
        Ok(digest)
    }

    /// Copy every field of `user` into the configured session namespace.
    pub async fn load_user_session(&self, user: &UserRecord) -> Result<()> {
        for (key, value) in user.to_row(&self.users) {
            self.session
                .set(&self.users.session_key, &key, value)
                .await?;
        }
        Ok(())
    }

    pub async fn logout_user(&self) -> Result<()> {
        self.session.clear(&self.users.session_key).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        self.storage
            .select(&self.users.table, &Row::new())
            .await?
            .into_iter()
            .map(|row| UserRecord::from_row(row, &self.users))
            .collect()
    }

    /// Email confirmation is not implemented; nobody is verified.
    pub fn verify_email(&self) -> bool {
        false
    }
}
