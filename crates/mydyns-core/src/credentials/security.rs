// # Security-Secret Deriver
//
// Each user may have a secret seed in the security database. The security
// value embedded into a token is `HMAC-SHA256(seed, user)`. Editing a
// user's seed and reloading changes the derived value, which revokes every
// token previously issued to that user and nobody else.
//
// Users without a seed have no rotation configured. Whether an empty
// security value is then acceptable is an explicit policy decision made
// by the caller of `check()`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::path::Path;
use subtle::ConstantTimeEq;

use super::dbfile::parse_records;
use crate::error::Result;

type HmacSha256 = Hmac<Sha256>;

/// User ↔ rotating-secret-seed lookup
#[derive(Clone, Default)]
pub struct SecurityFile {
    seeds: HashMap<String, Vec<u8>>,
}

impl std::fmt::Debug for SecurityFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityFile")
            .field("entries", &self.seeds.len())
            .finish()
    }
}

impl SecurityFile {
    /// Load the database from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let security = Self::parse(&contents, &path.display().to_string())?;
        tracing::info!("Loaded {} security entries", security.len());
        Ok(security)
    }

    /// Parse database contents
    pub fn parse(contents: &str, source: &str) -> Result<Self> {
        let seeds = parse_records(contents, source)?
            .into_iter()
            .map(|r| (r.key.to_string(), r.value.trim_matches(' ').as_bytes().to_vec()))
            .collect();
        Ok(Self { seeds })
    }

    /// Whether the user has a non-empty seed
    pub fn has_seed(&self, user: &str) -> bool {
        self.seeds.get(user).is_some_and(|seed| !seed.is_empty())
    }

    /// Derive the security value for a user
    ///
    /// Returns raw digest bytes, or an empty vector when the user has no
    /// seed configured.
    pub fn secret(&self, user: &str) -> Vec<u8> {
        let Some(seed) = self.seeds.get(user).filter(|seed| !seed.is_empty()) else {
            return Vec::new();
        };

        // HMAC accepts keys of any length
        let mut mac = match HmacSha256::new_from_slice(seed) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(user.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Check a submitted security value
    ///
    /// An empty value from a user without a seed passes only when
    /// `allow_unseeded` is set. Everything else is compared against the
    /// freshly derived value in constant time; any length or content
    /// mismatch fails.
    pub fn check(&self, submitted: &[u8], user: &str, allow_unseeded: bool) -> bool {
        if !self.has_seed(user) {
            return allow_unseeded && submitted.is_empty();
        }

        let expected = self.secret(user);
        submitted.ct_eq(&expected).into()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Whether the database has no entries
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}
