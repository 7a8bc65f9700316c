//! htpasswd-style user database
//!
//! Records look like `alice:{SHA}<base64(sha1(password))>`. Only the
//! `{SHA}` scheme is understood; entries in any other scheme never
//! authenticate.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::Path;
use subtle::ConstantTimeEq;

use super::dbfile::parse_records;
use crate::error::Result;

const SHA_PREFIX: &str = "{SHA}";

/// User ↔ password-hash lookup
#[derive(Debug, Clone, Default)]
pub struct UsersFile {
    users: HashMap<String, String>,
}

impl UsersFile {
    /// Load the database from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let users = Self::parse(&contents, &path.display().to_string())?;
        tracing::info!("Loaded {} users", users.len());
        Ok(users)
    }

    /// Parse database contents
    pub fn parse(contents: &str, source: &str) -> Result<Self> {
        let users = parse_records(contents, source)?
            .into_iter()
            .map(|r| (r.key.to_string(), r.value.trim_end().to_string()))
            .collect();
        Ok(Self { users })
    }

    /// Check a password against the stored hash in constant time
    pub fn check_password(&self, user: &str, password: &str) -> bool {
        let Some(entry) = self.users.get(user) else {
            return false;
        };
        let Some(expected) = entry.strip_prefix(SHA_PREFIX) else {
            return false;
        };

        let actual = STANDARD.encode(Sha1::digest(password.as_bytes()));
        actual.as_bytes().ct_eq(expected.as_bytes()).into()
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the database has no users
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Produce a `{SHA}` htpasswd entry value for a password
pub fn sha_entry(password: &str) -> String {
    format!("{}{}", SHA_PREFIX, STANDARD.encode(Sha1::digest(password.as_bytes())))
}
