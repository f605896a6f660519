use std::fmt;
use std::net::{IpAddr, SocketAddr};

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::ResolveError;

/// A hostname bound to the single address every probe of a scan connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    hostname: String,
    ip: IpAddr,
}

impl Target {
    pub fn new(hostname: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            ip,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.ip, port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.ip)
    }
}

/// Resolves `hostname` once. Literal addresses skip the system resolver;
/// for names with several addresses the first one returned wins.
pub async fn resolve(hostname: &str) -> Result<Target, ResolveError> {
    let host = hostname.trim();
    if host.is_empty() {
        return Err(ResolveError::EmptyHostname);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Target::new(host, ip));
    }

    let mut addrs = lookup_host((host, 0))
        .await
        .map_err(|source| ResolveError::Lookup {
            hostname: host.to_string(),
            source,
        })?;

    let addr = addrs.next().ok_or_else(|| ResolveError::NoAddress {
        hostname: host.to_string(),
    })?;

    debug!(hostname = host, ip = %addr.ip(), "resolved target");
    Ok(Target::new(host, addr.ip()))
}
