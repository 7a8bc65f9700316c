//! Host database: which users may update which hostname
//!
//! Records look like `example:alice,bob`.

use std::collections::HashMap;
use std::path::Path;

use super::dbfile::parse_records;
use crate::error::Result;

/// Host ↔ allowed-user-set lookup
#[derive(Debug, Clone, Default)]
pub struct HostsFile {
    hosts: HashMap<String, Vec<String>>,
}

impl HostsFile {
    /// Load the database from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let hosts = Self::parse(&contents, &path.display().to_string())?;
        tracing::info!("Loaded {} hosts", hosts.len());
        Ok(hosts)
    }

    /// Parse database contents
    pub fn parse(contents: &str, source: &str) -> Result<Self> {
        let hosts = parse_records(contents, source)?
            .into_iter()
            .map(|r| {
                let users = r
                    .value
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect();
                (r.key.to_string(), users)
            })
            .collect();
        Ok(Self { hosts })
    }

    /// Whether `user` may update `host`
    pub fn check_user(&self, host: &str, user: &str) -> bool {
        self.hosts
            .get(host)
            .is_some_and(|users| users.iter().any(|u| u == user))
    }

    /// Number of hosts
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the database has no hosts
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
