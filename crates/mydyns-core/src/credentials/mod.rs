// # Credential Stores
//
// The three flat authorization databases and the snapshot that holds them.
//
// ## Reloading
//
// Handlers take the read lock for the duration of their lookups. A reload
// loads all three databases first and only then takes the write lock to
// swap them in together, so no request can observe one database from
// before a reload and another from after it. A reload that fails to load
// any database leaves the current snapshot in service.

pub mod hosts;
pub mod security;
pub mod users;

mod dbfile;

pub use hosts::HostsFile;
pub use security::SecurityFile;
pub use users::{UsersFile, sha_entry};

use tokio::sync::{RwLock, RwLockReadGuard};

use crate::config::CredentialPaths;
use crate::error::Result;

/// One consistent generation of all three databases
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// User ↔ password hash
    pub users: UsersFile,
    /// Host ↔ allowed users
    pub hosts: HostsFile,
    /// User ↔ security seed
    pub security: SecurityFile,
}

impl Credentials {
    /// Load all three databases
    pub async fn load(paths: &CredentialPaths) -> Result<Self> {
        Ok(Self {
            users: UsersFile::load(&paths.users).await?,
            hosts: HostsFile::load(&paths.hosts).await?,
            security: SecurityFile::load(&paths.security).await?,
        })
    }
}

/// Reloadable credential snapshot shared by all request handlers
#[derive(Debug)]
pub struct CredentialDb {
    paths: CredentialPaths,
    current: RwLock<Credentials>,
}

impl CredentialDb {
    /// Load the databases from their configured paths
    pub async fn open(paths: CredentialPaths) -> Result<Self> {
        let credentials = Credentials::load(&paths).await?;
        Ok(Self::new(paths, credentials))
    }

    /// Wrap already loaded credentials
    pub fn new(paths: CredentialPaths, credentials: Credentials) -> Self {
        Self {
            paths,
            current: RwLock::new(credentials),
        }
    }

    /// Acquire the current snapshot for reading
    pub async fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.current.read().await
    }

    /// Reload all databases from disk and swap them in
    pub async fn reload(&self) -> Result<()> {
        tracing::info!("Reloading databases ...");
        let fresh = Credentials::load(&self.paths).await?;

        let mut current = self.current.write().await;
        *current = fresh;
        Ok(())
    }
}
