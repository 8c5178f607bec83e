//! DNS resolver implementation (C2): hostname -> IP list lookups, used to
//! fill in an [`Address`](crate::address::Address)'s `ip_list` before a
//! relay dials out.

use super::DnsCache;
use crate::address::Address;
use crate::{Error, Result};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// DNS resolver with a small LRU cache in front of the system/public
/// upstream.
pub struct Resolver {
    resolver: TokioAsyncResolver,
    cache: Arc<DnsCache>,
}

impl Resolver {
    /// Build a resolver from the system's configured nameservers, falling
    /// back to the public resolver config if none can be read.
    pub fn new() -> Result<Self> {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(r) => r,
            Err(_) => TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        };
        Ok(Resolver {
            resolver,
            cache: Arc::new(DnsCache::default()),
        })
    }

    /// Resolve `hostname` and atomically install the result onto `addr`.
    /// Leaves `addr` untouched on failure.
    pub async fn lookup_into(&self, hostname: &str, addr: &mut Address) -> Result<()> {
        let ips = self.resolve_all(hostname).await?;
        addr.set_ip_address(ips);
        Ok(())
    }

    /// Resolve domain to a single IP (first result).
    pub async fn resolve(&self, domain: &str) -> Result<IpAddr> {
        let ips = self.resolve_all(domain).await?;
        Ok(ips[0])
    }

    /// Resolve domain to every A/AAAA record it has.
    pub async fn resolve_all(&self, domain: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = domain.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some(entry) = self.cache.get(domain) {
            debug!("dns {} -> {:?} (cache)", domain, entry.all_ips());
            return Ok(entry.all_ips().to_vec());
        }

        let response = self
            .resolver
            .lookup_ip(domain)
            .await
            .map_err(|e| Error::dns(format!("{domain}: {e}")))?;
        let ips: Vec<IpAddr> = response.iter().collect();

        if ips.is_empty() {
            return Err(Error::dns(format!("no records for {domain}")));
        }

        self.cache.put(domain.to_string(), ips.clone());
        debug!("dns {} -> {:?}", domain, ips);
        Ok(ips)
    }

    /// Drop all cached entries.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn resolve_ip_passthrough() {
        let resolver = Resolver::new().unwrap();
        let ip = resolver.resolve("8.8.8.8").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[tokio::test]
    async fn lookup_into_literal_ip_installs_single_entry() {
        let resolver = Resolver::new().unwrap();
        let mut addr = Address::new("127.0.0.1", 80);
        resolver.lookup_into("127.0.0.1", &mut addr).await.unwrap();
        assert_eq!(addr.ip_list(), &[IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))]);
    }
}
