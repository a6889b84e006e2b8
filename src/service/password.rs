use crate::config::HashingConfig;
use crate::error::{Result, RoostError};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Password digest primitive used by the credential manager.
pub trait PasswordHashing: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// False for mismatches and for digests that cannot be parsed.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;

    /// True when `digest` was not produced with the current algorithm and cost.
    fn needs_rehash(&self, digest: &str) -> bool;
}

/// Argon2id with configurable cost parameters.
#[derive(Debug, Clone)]
pub struct Argon2Hashing {
    params: Params,
}

impl Argon2Hashing {
    pub fn new(cfg: &HashingConfig) -> Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| RoostError::Hashing(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHashing for Argon2Hashing {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| RoostError::Hashing(e.to_string()))?
            .to_string();
        Ok(digest)
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        // Verification reads algorithm and params from the digest itself.
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    fn needs_rehash(&self, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident()
            || parsed.version != Some(Version::V0x13 as u32)
        {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}
