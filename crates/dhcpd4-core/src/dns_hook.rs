/*  DNS update hook, spec.md §6. The server treats dynamic DNS as an
 *  external collaborator behind a trait boundary rather than a built-in
 *  concern: a real deployment wires in something that talks to a DNS
 *  server (RFC 2136 or a vendor API); the `NullDnsUpdater` keeps the
 *  workspace runnable when no such backend is configured.
 */
use crate::lease::Lease;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsUpdateKind {
    /// New forward+reverse mapping for a freshly committed lease.
    Add,
    /// The lease that owned this mapping has gone away.
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnsUpdate {
    pub kind: DnsUpdateKind,
    pub hostname: String,
    pub address: Ipv4Addr,
}

#[async_trait::async_trait]
pub trait DnsUpdater: Send + Sync {
    async fn apply(&self, update: &DnsUpdate) -> Result<(), DnsUpdateError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsUpdateError(pub String);

impl std::fmt::Display for DnsUpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DNS update failed: {}", self.0)
    }
}

impl std::error::Error for DnsUpdateError {}

/// Builds the update a committed lease implies, if it carries a hostname
/// worth publishing — used by the server loop after `handle_request`
/// commits an `Active` lease.
pub fn update_for_commit(lease: &Lease) -> Option<DnsUpdate> {
    let hostname = lease.hostname.clone()?;
    Some(DnsUpdate { kind: DnsUpdateKind::Add, hostname, address: lease.address })
}

pub fn update_for_release(lease: &Lease) -> Option<DnsUpdate> {
    let hostname = lease.hostname.clone()?;
    Some(DnsUpdate { kind: DnsUpdateKind::Remove, hostname, address: lease.address })
}

/// Discards updates; the default when no DNS backend is configured.
pub struct NullDnsUpdater;

#[async_trait::async_trait]
impl DnsUpdater for NullDnsUpdater {
    async fn apply(&self, _update: &DnsUpdate) -> Result<(), DnsUpdateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::Lease;
    use std::time::{Duration, SystemTime};

    #[test]
    fn commit_without_hostname_produces_no_update() {
        let mut lease = Lease::free("10.0.0.5".parse().unwrap());
        lease.commit(dhcpd4_net::HwAddr::ethernet([0; 6]), None, None, SystemTime::UNIX_EPOCH, Duration::from_secs(60));
        assert_eq!(update_for_commit(&lease), None);
    }

    #[test]
    fn commit_with_hostname_produces_an_add_update() {
        let mut lease = Lease::free("10.0.0.5".parse().unwrap());
        lease.commit(
            dhcpd4_net::HwAddr::ethernet([0; 6]),
            None,
            Some("host1".into()),
            SystemTime::UNIX_EPOCH,
            Duration::from_secs(60),
        );
        let update = update_for_commit(&lease).unwrap();
        assert_eq!(update.kind, DnsUpdateKind::Add);
        assert_eq!(update.hostname, "host1");
    }
}
