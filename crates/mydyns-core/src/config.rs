//! Configuration types for the mydyns system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listen address (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Capability token settings
    pub token: TokenConfig,

    /// Paths of the three credential databases
    pub credentials: CredentialPaths,

    /// External updater settings
    pub nsupdate: NsUpdateConfig,

    /// Batching worker settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Client IP resolution settings
    #[serde(default)]
    pub ip: IpConfig,

    /// Authorization policy switches
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Read/write deadline applied to every HTTP request (in seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl ServiceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.listen.is_empty() {
            return Err(crate::Error::config("Listen address cannot be empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(crate::Error::config("HTTP timeout must be > 0"));
        }

        self.token.validate()?;
        self.credentials.validate()?;
        self.nsupdate.validate()?;
        self.worker.validate()?;

        Ok(())
    }
}

/// Capability token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// File holding the signing secret (32 or 64 bytes recommended)
    pub secret_file: PathBuf,

    /// Maximum token age in seconds; 0 disables expiry
    ///
    /// Revocation normally relies on the per-user security seed, so the
    /// default never expires tokens.
    #[serde(default)]
    pub max_age_secs: u64,
}

impl TokenConfig {
    /// Validate the token configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.secret_file.as_os_str().is_empty() {
            return Err(crate::Error::config("Token secret file cannot be empty"));
        }
        Ok(())
    }
}

/// Locations of the flat credential databases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPaths {
    /// htpasswd-style user database (`user:{SHA}hash`)
    pub users: PathBuf,
    /// Host database (`host:user1,user2`)
    pub hosts: PathBuf,
    /// Security seed database (`user:seed`)
    pub security: PathBuf,
}

impl CredentialPaths {
    /// Validate the credential paths
    pub fn validate(&self) -> Result<(), crate::Error> {
        for (name, path) in [
            ("users", &self.users),
            ("hosts", &self.hosts),
            ("security", &self.security),
        ] {
            if path.as_os_str().is_empty() {
                return Err(crate::Error::config(format!(
                    "Credential database path '{}' cannot be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// nsupdate dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsUpdateConfig {
    /// Path to the nsupdate executable
    #[serde(default = "default_nsupdate_exe")]
    pub exe: PathBuf,

    /// DNS server receiving the updates
    pub server: String,

    /// Shared-secret key file passed with `-k`
    pub keyfile: PathBuf,

    /// Zone where updates are made (e.g., "dyn.example.org")
    pub zone: String,

    /// TTL for the written records
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Upper bound for one nsupdate invocation (in seconds)
    #[serde(default = "default_nsupdate_timeout_secs")]
    pub timeout_secs: u64,
}

impl NsUpdateConfig {
    /// Validate the nsupdate configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.server.trim().is_empty() {
            return Err(crate::Error::config("DNS server cannot be empty"));
        }
        if self.zone.trim_end_matches('.').is_empty() {
            return Err(crate::Error::config("Zone cannot be empty"));
        }
        // Both values end up verbatim in the instruction script
        if self.server.contains(char::is_whitespace) || self.zone.contains(char::is_whitespace) {
            return Err(crate::Error::config(
                "DNS server and zone must not contain whitespace",
            ));
        }
        if self.keyfile.as_os_str().is_empty() {
            return Err(crate::Error::config("Key file cannot be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("nsupdate timeout must be > 0"));
        }
        Ok(())
    }

    /// Zone name without a trailing dot
    pub fn zone_name(&self) -> &str {
        self.zone.trim_end_matches('.')
    }
}

/// Batching worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Capacity of the bounded update queue
    ///
    /// When full, new updates are rejected immediately with a
    /// backpressure error instead of blocking the request.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Interval between flushes (in seconds)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Capacity of the worker event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl WorkerConfig {
    /// Validate the worker configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.queue_capacity == 0 {
            return Err(crate::Error::config("Update queue capacity must be > 0"));
        }
        if self.flush_interval_secs == 0 {
            return Err(crate::Error::config("Flush interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            flush_interval_secs: default_flush_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Client IP resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpConfig {
    /// Header carrying the client address when fronted by a local proxy
    ///
    /// Only consulted when the peer address is loopback.
    #[serde(default = "default_proxy_header")]
    pub proxy_header: String,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            proxy_header: default_proxy_header(),
        }
    }
}

/// Authorization policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Accept tokens with an empty security value for users without a seed
    ///
    /// Users that have a seed are always checked, regardless of this flag.
    #[serde(default = "default_allow_unseeded_users")]
    pub allow_unseeded_users: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow_unseeded_users: default_allow_unseeded_users(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_nsupdate_exe() -> PathBuf {
    PathBuf::from("/usr/bin/nsupdate")
}

fn default_ttl() -> u32 {
    300
}

fn default_nsupdate_timeout_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_proxy_header() -> String {
    "X-Real-IP".to_string()
}

fn default_allow_unseeded_users() -> bool {
    true
}
