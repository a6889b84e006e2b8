//! Credential lifecycle: the manager and the collaborators it is composed of.

pub mod credential_manager;
pub mod password;
pub mod session;

pub use credential_manager::CredentialManager;
pub use password::{Argon2Hashing, PasswordHashing};
pub use session::{MemorySessionStore, SessionStore};
