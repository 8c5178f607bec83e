//! Anti-probing ban registry (C9): tracks IPs and IVs seen on malformed
//! headers and escalates repeat offenders to an outright ban. Process-wide,
//! guarded by short-held `parking_lot::RwLock`s.

use std::collections::HashSet;
use std::net::IpAddr;

use parking_lot::RwLock;
use tracing::warn;

/// Process-wide registry of banned IPs and the IVs/IPs already seen on one
/// prior failure.
#[derive(Default)]
pub struct BanRegistry {
    banned: RwLock<HashSet<IpAddr>>,
    failed_ivs: RwLock<HashSet<Vec<u8>>>,
    failed_ips: RwLock<HashSet<IpAddr>>,
}

impl BanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_banned(&self, ip: &IpAddr) -> bool {
        self.banned.read().contains(ip)
    }

    /// Directly ban an IP, bypassing the failure escalation (e.g. an
    /// operator-configured blocklist).
    pub fn ban(&self, ip: IpAddr) {
        if self.banned.write().insert(ip) {
            warn!("banned {ip}");
        }
    }

    pub fn unban(&self, ip: &IpAddr) {
        self.banned.write().remove(ip);
        self.failed_ips.write().remove(ip);
    }

    /// Record one failure (bad header, failed IV/tag) from `ip`, carrying
    /// whatever IV bytes the decrypt side had recovered before it failed.
    ///
    /// Escalates to a full ban on the *second* failure seen against either
    /// the IV or the IP, not on a strike count: if this exact IV has failed
    /// before, ban outright; otherwise remember the IV, and if this IP has
    /// also failed before, ban; otherwise remember the IP and let it go
    /// once.
    pub fn record_failure(&self, ip: IpAddr, iv: &[u8]) {
        let mut ban_this_ip = false;

        {
            let mut failed_ivs = self.failed_ivs.write();
            if failed_ivs.contains(iv) {
                ban_this_ip = true;
            } else {
                failed_ivs.insert(iv.to_vec());
                let mut failed_ips = self.failed_ips.write();
                if failed_ips.contains(&ip) {
                    ban_this_ip = true;
                } else {
                    failed_ips.insert(ip);
                }
            }
        }

        if ban_this_ip {
            self.ban(ip);
        }
    }

    pub fn banned_count(&self) -> usize {
        self.banned.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn first_failure_is_not_banned() {
        let registry = BanRegistry::new();
        registry.record_failure(ip(1), b"iv-a");
        assert!(!registry.is_banned(&ip(1)));
    }

    #[test]
    fn repeating_the_same_iv_bans_on_second_failure() {
        let registry = BanRegistry::new();
        registry.record_failure(ip(1), b"iv-a");
        registry.record_failure(ip(1), b"iv-a");
        assert!(registry.is_banned(&ip(1)));
    }

    #[test]
    fn repeating_the_same_ip_with_a_fresh_iv_bans_on_second_failure() {
        let registry = BanRegistry::new();
        registry.record_failure(ip(1), b"iv-a");
        registry.record_failure(ip(1), b"iv-b");
        assert!(registry.is_banned(&ip(1)));
    }

    #[test]
    fn distinct_ip_and_iv_pairs_do_not_ban() {
        let registry = BanRegistry::new();
        registry.record_failure(ip(1), b"iv-a");
        registry.record_failure(ip(2), b"iv-b");
        assert!(!registry.is_banned(&ip(1)));
        assert!(!registry.is_banned(&ip(2)));
    }

    #[test]
    fn unrelated_ips_are_not_banned() {
        let registry = BanRegistry::new();
        registry.record_failure(ip(1), b"iv-a");
        registry.record_failure(ip(1), b"iv-a");
        assert!(!registry.is_banned(&ip(2)));
    }

    #[test]
    fn unban_clears_state() {
        let registry = BanRegistry::new();
        registry.ban(ip(3));
        assert!(registry.is_banned(&ip(3)));
        registry.unban(&ip(3));
        assert!(!registry.is_banned(&ip(3)));
    }
}
