//! Request-level operations: issuing tokens and applying updates
//!
//! Transport-agnostic. The daemon's HTTP layer extracts parameters and maps
//! the returned errors onto status codes.

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::credentials::CredentialDb;
use crate::error::{Error, Result};
use crate::ip::{self, ClientAddress};
use crate::token::{TokenCodec, TokenData, UPDATE_TOKEN_PURPOSE};
use crate::worker::{PendingUpdate, UpdateQueue};

const MAX_LABEL_LEN: usize = 63;

/// Decoded HTTP Basic credentials
#[derive(Debug, Clone, Copy)]
pub struct BasicAuth<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

/// Parameters of an update request
#[derive(Debug, Clone, Copy)]
pub struct UpdateRequest<'a> {
    /// Capability token
    pub token: Option<&'a str>,
    /// Requested address, `auto` or empty for detection
    pub myip: Option<&'a str>,
    /// Legacy alias for `myip`; wins when both are given
    pub address: Option<&'a str>,
    /// Resolve the address only, without enqueuing
    pub check: bool,
    /// Peer address of the connection
    pub remote: IpAddr,
    /// Value of the trusted proxy header
    pub forwarded: Option<&'a str>,
}

/// Result of a successful update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was handed to the worker
    Accepted { hostname: String, ip: IpAddr },
    /// Check-only request; nothing was enqueued
    Checked(IpAddr),
}

/// The dynamic DNS service
pub struct DynDns {
    codec: TokenCodec,
    credentials: Arc<CredentialDb>,
    queue: UpdateQueue,
    allow_unseeded_users: bool,
}

impl DynDns {
    pub fn new(
        codec: TokenCodec,
        credentials: Arc<CredentialDb>,
        queue: UpdateQueue,
        allow_unseeded_users: bool,
    ) -> Self {
        Self {
            codec,
            credentials,
            queue,
            allow_unseeded_users,
        }
    }

    /// Shared credential snapshot, for reloading
    pub fn credentials(&self) -> &Arc<CredentialDb> {
        &self.credentials
    }

    /// Issue an update token for `hostname`
    ///
    /// The caller must hold valid Basic credentials and be listed for the
    /// host. The token embeds the user's current security value, so
    /// rotating the user's seed revokes it.
    pub async fn issue_token(
        &self,
        auth: Option<BasicAuth<'_>>,
        hostname: Option<&str>,
    ) -> Result<String> {
        let db = self.credentials.read().await;

        let auth = auth.ok_or_else(|| Error::auth("missing credentials"))?;
        if !db.users.check_password(auth.user, auth.password) {
            return Err(Error::auth("bad credentials"));
        }

        let hostname = hostname
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::invalid_input("missing hostname"))?;
        validate_hostname(hostname)?;

        if !db.hosts.check_user(hostname, auth.user) {
            return Err(Error::access_denied(format!(
                "user {} may not update {}",
                auth.user, hostname
            )));
        }

        let data = TokenData {
            host: hostname.to_string(),
            user: auth.user.to_string(),
            security: db.security.secret(auth.user),
        };
        drop(db);

        let token = self.codec.encode(UPDATE_TOKEN_PURPOSE, &data)?;
        info!("Issued token for {} to {}", data.host, data.user);
        Ok(token)
    }

    /// Verify a token and enqueue (or just resolve) the address update
    pub async fn apply_update(&self, request: UpdateRequest<'_>) -> Result<UpdateOutcome> {
        let token = request
            .token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::invalid_input("missing token"))?;
        let data: TokenData = self.codec.decode(UPDATE_TOKEN_PURPOSE, token)?;

        {
            let db = self.credentials.read().await;
            if !db
                .security
                .check(&data.security, &data.user, self.allow_unseeded_users)
            {
                return Err(Error::access_denied("security check failed"));
            }
            if !db.hosts.check_user(&data.host, &data.user) {
                return Err(Error::access_denied(format!(
                    "user {} may not update {}",
                    data.user, data.host
                )));
            }
        }

        let explicit = request
            .address
            .filter(|a| !a.trim().is_empty())
            .or(request.myip);
        let ip = ip::resolve(ClientAddress {
            explicit,
            remote: request.remote,
            forwarded: request.forwarded,
        })?;

        if request.check {
            debug!("Check for {} resolved {}", data.host, ip);
            return Ok(UpdateOutcome::Checked(ip));
        }

        self.queue.update(PendingUpdate::new(data.host.clone(), ip))?;
        info!("Accepted update {} -> {} from {}", data.host, ip, data.user);

        Ok(UpdateOutcome::Accepted {
            hostname: data.host,
            ip,
        })
    }
}

/// Accept a single DNS label only
///
/// Hostnames are written verbatim into the nsupdate script, so anything but
/// letters, digits and inner hyphens is refused.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let valid = !hostname.is_empty()
        && hostname.len() <= MAX_LABEL_LEN
        && !hostname.starts_with('-')
        && !hostname.ends_with('-')
        && hostname
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-');

    if valid {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("invalid hostname: {}", hostname)))
    }
}
