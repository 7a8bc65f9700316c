//! Client IP resolution and validation
//!
//! The address to publish is taken from an explicit request parameter when
//! one is given, otherwise from the connection's peer. A loopback peer means
//! a local reverse proxy is in front of us, in which case the proxy's
//! forwarded-for header is trusted instead.
//!
//! Whatever the source, the result must be a global unicast address outside
//! the private ranges `10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16` and
//! `fd00::/8`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};

/// Parameter value requesting auto-detection
pub const AUTO: &str = "auto";

/// Where the address for an update comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddress<'a> {
    /// Explicit `myip`/`address` parameter, if any
    pub explicit: Option<&'a str>,
    /// Peer address of the connection
    pub remote: IpAddr,
    /// Value of the trusted proxy header, if present
    pub forwarded: Option<&'a str>,
}

/// Resolve and validate the address for an update
pub fn resolve(source: ClientAddress<'_>) -> Result<IpAddr> {
    let ip = match source.explicit.map(str::trim) {
        Some(explicit) if !explicit.is_empty() && explicit != AUTO => parse(explicit)?,
        _ => detect(source.remote, source.forwarded)?,
    };
    validate(ip)
}

/// Peer address, or the proxy header when the peer is loopback
fn detect(remote: IpAddr, forwarded: Option<&str>) -> Result<IpAddr> {
    let remote = remote.to_canonical();
    if !remote.is_loopback() {
        return Ok(remote);
    }

    // X-Forwarded-For style lists put the originating client first
    match forwarded
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(value) => parse(value),
        None => Ok(remote),
    }
}

fn parse(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| Error::invalid_input("invalid ip"))
}

/// Enforce the address policy
pub fn validate(ip: IpAddr) -> Result<IpAddr> {
    let ip = ip.to_canonical();
    if !is_global_unicast(ip) {
        return Err(Error::invalid_input("invalid ip"));
    }
    if is_private_network(ip) {
        return Err(Error::invalid_input("private ip not allowed"));
    }
    Ok(ip)
}

/// Any unicast address that is not unspecified, loopback, link-local or broadcast
pub fn is_global_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_unspecified()
                || v4.is_loopback()
                || v4.is_multicast()
                || v4.is_link_local()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            !(v6.is_unspecified()
                || v6.is_loopback()
                || v6.is_multicast()
                || is_v6_link_local(&v6))
        }
    }
}

/// Whether the address is inside one of the rejected private ranges
pub fn is_private_network(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_v4_private(&v4),
        IpAddr::V6(v6) => v6.octets()[0] == 0xfd,
    }
}

fn is_v4_private(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 10 || (a == 172 && (b & 0xf0) == 16) || (a == 192 && b == 168)
}

fn is_v6_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}
