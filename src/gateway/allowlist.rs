//! Client admission by address and network

use std::io;
use std::net::{IpAddr, ToSocketAddrs};

use ipnet::IpNet;
use tracing::{debug, warn};

/// IPv4-mapped IPv6 addresses compare as plain IPv4
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
        IpAddr::V4(_) => addr,
    }
}

/// One classified allowlist entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowlistEntry {
    /// A single trusted address
    Host(IpAddr),
    /// A trusted network, host bits masked off
    Network(IpNet),
}

/// The set of client addresses and networks allowed to open sessions.
///
/// Built once at startup and never mutated afterwards, so it can be shared
/// between connection threads without locking.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    hosts: Vec<IpAddr>,
    networks: Vec<IpNet>,
}

impl Allowlist {
    /// Build an allowlist, resolving hostnames with the system resolver
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_hosts_with(hosts, resolve_host)
    }

    /// Build an allowlist with a custom hostname resolver.
    ///
    /// Each entry is tried as a network (`10.0.0.0/8`), then as a literal
    /// address, then as a hostname. Hostnames that fail to resolve are
    /// dropped with a warning.
    pub fn from_hosts_with<I, S, R>(hosts: I, mut resolve: R) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        R: FnMut(&str) -> io::Result<Vec<IpAddr>>,
    {
        let mut allowlist = Allowlist::default();

        for host in hosts {
            let host = host.as_ref().trim();

            if let Ok(network) = host.parse::<IpNet>() {
                allowlist.push(AllowlistEntry::Network(network.trunc()));
                continue;
            }

            if let Ok(addr) = host.parse::<IpAddr>() {
                allowlist.push(AllowlistEntry::Host(addr));
                continue;
            }

            match resolve(host) {
                Ok(addrs) if !addrs.is_empty() => {
                    debug!(host, count = addrs.len(), "Resolved allowed host");
                    for addr in addrs {
                        allowlist.push(AllowlistEntry::Host(addr));
                    }
                }
                Ok(_) => warn!(host, "Allowed host resolved to no addresses, ignoring"),
                Err(e) => warn!(host, error = %e, "Cannot resolve allowed host, ignoring"),
            }
        }

        allowlist
    }

    fn push(&mut self, entry: AllowlistEntry) {
        match entry {
            AllowlistEntry::Host(addr) => self.hosts.push(canonical(addr)),
            AllowlistEntry::Network(range) => self.networks.push(range),
        }
    }

    /// Check if a client address is trusted
    pub fn is_allowed(&self, client: IpAddr) -> bool {
        let client = canonical(client);

        if self.hosts.contains(&client) {
            debug!(%client, "Connection allowed by hosts");
            return true;
        }

        if let Some(network) = self.networks.iter().find(|n| n.contains(&client)) {
            debug!(%client, %network, "Connection allowed by network");
            return true;
        }

        debug!(%client, "Connection rejected");
        false
    }

    pub fn hosts(&self) -> &[IpAddr] {
        &self.hosts
    }

    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.networks.is_empty()
    }
}

fn resolve_host(host: &str) -> io::Result<Vec<IpAddr>> {
    Ok((host, 0)
        .to_socket_addrs()?
        .map(|addr| addr.ip())
        .collect())
}
